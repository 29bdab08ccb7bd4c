//! Player counts recovered from server log output.

use std::{collections::HashSet, io, path::Path, sync::LazyLock};

use regex::Regex;

use crate::config::stream::LogMeta;

static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)there are (\d+) of a max of (\d+) players online").expect("valid regex")
});
static ONLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[SERVER\].*?(\d+) players? online").expect("valid regex"));
static JOIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+) joined the game").expect("valid regex"));
static LEAVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+) left the game").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// Output of the `list` command.
    Count { online: u32, max: u32 },
    /// A bare "N players online" line.
    Online(u32),
    Joined(String),
    Left(String),
}

impl LogMeta {
    pub fn parse_player_event(&self) -> Option<PlayerEvent> {
        if !self.is_server_info() {
            return None;
        }
        if let Some(caps) = JOIN_RE.captures(&self.msg) {
            return Some(PlayerEvent::Joined(caps[1].to_string()));
        }
        if let Some(caps) = LEAVE_RE.captures(&self.msg) {
            return Some(PlayerEvent::Left(caps[1].to_string()));
        }
        None
    }
}

pub fn parse_line(line: &str) -> Option<PlayerEvent> {
    if let Some(caps) = COUNT_RE.captures(line) {
        return Some(PlayerEvent::Count {
            online: caps[1].parse().ok()?,
            max: caps[2].parse().ok()?,
        });
    }
    if let Some(caps) = ONLINE_RE.captures(line) {
        return Some(PlayerEvent::Online(caps[1].parse().ok()?));
    }
    LogMeta::new(line)?.parse_player_event()
}

/// Folds player events into a running count.
///
/// A count line sets an absolute baseline; joins and leaves after it move the
/// count. A bare "N players online" line only counts until the first exact
/// `list` output. Without any count line the result is the set of players
/// that joined and have not left.
#[derive(Debug, Default)]
pub struct PlayerTracker {
    current: u32,
    max: u32,
    baseline: bool,
    exact: bool,
    online: HashSet<String>,
}

impl PlayerTracker {
    pub fn observe(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::Count { online, max } => {
                self.current = online;
                self.max = max;
                self.baseline = true;
                self.exact = true;
                self.online.clear();
            }
            PlayerEvent::Online(_) if self.exact => {}
            PlayerEvent::Online(online) => {
                self.current = online;
                self.baseline = true;
                self.online.clear();
            }
            PlayerEvent::Joined(name) => {
                if self.online.insert(name) {
                    self.current += 1;
                }
            }
            PlayerEvent::Left(name) => {
                if self.online.remove(&name) || self.baseline {
                    self.current = self.current.saturating_sub(1);
                }
            }
        }
    }

    /// `(current, max)`, or `None` when the log carried no signal.
    pub fn snapshot(&self) -> Option<(u32, u32)> {
        (self.current > 0 || self.max > 0).then_some((self.current, self.max))
    }
}

pub fn count_players(content: &str) -> Option<(u32, u32)> {
    let mut tracker = PlayerTracker::default();
    for event in content.lines().filter_map(parse_line) {
        tracker.observe(event);
    }
    tracker.snapshot()
}

pub async fn read_players_from_log(path: &Path) -> io::Result<Option<(u32, u32)>> {
    let bytes = tokio::fs::read(path).await?;
    Ok(count_players(&String::from_utf8_lossy(&bytes)))
}
