use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ServerConfig;

use super::line::StreamLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum EventKind {
    #[serde(rename = "server.created")]
    Created,
    #[serde(rename = "server.started")]
    Started,
    #[serde(rename = "server.exited")]
    Exited,
    #[serde(rename = "server.log")]
    Log,
    #[serde(rename = "server.deleted")]
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match *self {
            EventKind::Created => "server.created",
            EventKind::Started => "server.started",
            EventKind::Exited => "server.exited",
            EventKind::Log => "server.log",
            EventKind::Deleted => "server.deleted",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific event data.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    /// `{stream, line}` of a `server.log` event.
    Log(StreamLine),
    /// Configuration snapshot of a `server.created` event.
    Config(Box<ServerConfig>),
}

/// An immutable lifecycle or log record published on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,

    #[serde(rename = "type")]
    pub kind: EventKind,

    /// Empty for global events.
    pub server_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EventPayload>,

    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new<S: Into<String>>(kind: EventKind, server_id: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            server_id: server_id.into(),
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.data = Some(payload);
        self
    }

    pub fn created(config: &ServerConfig) -> Self {
        Self::new(EventKind::Created, config.id.clone())
            .with_payload(EventPayload::Config(Box::new(config.clone())))
    }

    pub fn log<S: Into<String>>(server_id: S, line: StreamLine) -> Self {
        Self::new(EventKind::Log, server_id).with_payload(EventPayload::Log(line))
    }

    pub fn is(&self, kind: EventKind, server_id: &str) -> bool {
        self.kind == kind && self.server_id == server_id
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}]", self.timestamp, self.kind, self.server_id)?;
        match &self.data {
            Some(EventPayload::Log(line)) => write!(f, " {}", line),
            Some(EventPayload::Config(cfg)) => write!(f, " {} {}", cfg.mc_type, cfg.version),
            None => Ok(()),
        }
    }
}
