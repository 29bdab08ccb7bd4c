mod event;
mod line;
mod log;

pub use event::{Event, EventKind, EventPayload};
pub use line::{StreamLine, StreamSource};
pub use log::{LogLevel, LogMeta};
