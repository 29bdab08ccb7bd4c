use std::{
    fmt::{self, Display},
    sync::atomic::{AtomicU8, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum InstanceStatus {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Crashed = 3,
}

impl InstanceStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => InstanceStatus::Starting,
            2 => InstanceStatus::Running,
            3 => InstanceStatus::Crashed,
            _ => InstanceStatus::Stopped,
        }
    }
}

impl Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            InstanceStatus::Stopped => write!(f, "stopped"),
            InstanceStatus::Starting => write!(f, "starting"),
            InstanceStatus::Running => write!(f, "running"),
            InstanceStatus::Crashed => write!(f, "crashed"),
        }
    }
}

/// Atomic home of an instance's [`InstanceStatus`].
///
/// Only the transition code in `handle.rs` writes it.
#[derive(Debug)]
pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub(crate) fn new(status: InstanceStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub(crate) fn load(&self) -> InstanceStatus {
        InstanceStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, status: InstanceStatus) {
        self.0.store(status as u8, Ordering::Release);
    }

    /// Moves `current -> new` if the cell still holds `current`.
    pub(crate) fn transition(&self, current: InstanceStatus, new: InstanceStatus) -> bool {
        self.0
            .compare_exchange(current as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlayerInfo {
    pub current: u32,
    pub max: u32,
}

/// Point-in-time view of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub config: ServerConfig,
    pub state: InstanceStatus,
    /// 0 when no process is attached.
    pub pid: u32,
    pub uptime_sec: u64,
    /// Empty when the last run ended cleanly.
    pub last_exit_err: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<PlayerInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_transition_only_from_expected_state() {
        let cell = StatusCell::new(InstanceStatus::Stopped);
        assert!(!cell.transition(InstanceStatus::Running, InstanceStatus::Starting));
        assert!(cell.transition(InstanceStatus::Stopped, InstanceStatus::Starting));
        assert_eq!(cell.load(), InstanceStatus::Starting);
        cell.store(InstanceStatus::Crashed);
        assert_eq!(cell.load(), InstanceStatus::Crashed);
    }

    #[test]
    fn info_serializes_camel_case() {
        let info = ServerInfo {
            config: ServerConfig::default(),
            state: InstanceStatus::Running,
            pid: 7,
            uptime_sec: 3,
            last_exit_err: String::new(),
            players: Some(PlayerInfo { current: 1, max: 20 }),
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["state"], "running");
        assert_eq!(value["uptimeSec"], 3);
        assert_eq!(value["lastExitErr"], "");
        assert_eq!(value["players"]["max"], 20);
    }
}
