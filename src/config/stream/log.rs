use std::fmt::{self, Display};

/// The bracketed header of a server log line: `[time] [thread/LEVEL]: msg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMeta {
    pub time: String,
    pub thread: String,
    pub level: LogLevel,
    pub msg: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Other,
}

impl LogMeta {
    /// Splits a log line into its header fields; `None` for lines without one.
    pub fn new(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('[') {
            return None;
        }

        let time_end = line.find(']')?;
        let time = line[1..time_end].to_string();

        let meta_start = time_end + 1 + line[time_end + 1..].find('[')?;
        let msg_sep = meta_start + line[meta_start..].find("]: ")?;

        let meta = &line[(meta_start + 1)..msg_sep];
        let msg = line[(msg_sep + 3)..].to_string();

        let (thread, level_str) = meta.split_once('/')?;

        let level = match level_str {
            "INFO" => LogLevel::Info,
            "WARN" => LogLevel::Warn,
            "ERROR" => LogLevel::Error,
            _ => LogLevel::Other,
        };

        Some(LogMeta {
            time,
            thread: thread.to_string(),
            level,
            msg,
        })
    }

    pub fn is_server_info(&self) -> bool {
        self.thread == "Server thread" && self.level == LogLevel::Info
    }
}

impl Display for LogMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Time: {}\nThread: {}\nLevel: {}\nMessage: {}",
            self.time, self.thread, self.level, self.msg
        )
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Other => write!(f, "OTHER"),
        }
    }
}
