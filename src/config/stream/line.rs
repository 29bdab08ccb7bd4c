use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Identifies which process stream produced a line of output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl StreamSource {
    pub fn as_str(&self) -> &'static str {
        match *self {
            StreamSource::Stdout => "stdout",
            StreamSource::Stderr => "stderr",
        }
    }
}

impl Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single line of process output along with its origin stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StreamLine {
    #[serde(rename = "stream")]
    pub source: StreamSource,
    pub line: String,
}

impl StreamLine {
    pub fn new<S: Into<String>>(line: S, source: StreamSource) -> Self {
        Self {
            line: line.into(),
            source,
        }
    }

    pub fn stdout<S: Into<String>>(line: S) -> Self {
        Self::new(line, StreamSource::Stdout)
    }

    pub fn stderr<S: Into<String>>(line: S) -> Self {
        Self::new(line, StreamSource::Stderr)
    }
}

impl Display for StreamLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.source, self.line)
    }
}
