use thiserror::Error;

use crate::config::MinecraftType;

#[derive(Debug, Clone, Error)]
pub enum ServerError {
    #[error("Server is not running")]
    NotRunning,

    #[error("Failed to run java command: {0}")]
    CommandFailed(String),

    #[error("Failed to access child stdout pipe")]
    NoStdoutPipe,

    #[error("Failed to access child stdin pipe")]
    NoStdinPipe,

    #[error("Failed to access child stderr pipe")]
    NoStderrPipe,

    #[error("Failed to write to stdin: {0}")]
    StdinWriteFailed(String),

    #[error("File IO error: {0}")]
    FileIO(String),
}

#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("Failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("Status query timed out")]
    Timeout,

    #[error("Status query IO error: {0}")]
    Io(String),

    #[error("Connection closed before a full packet was read")]
    ShortRead,

    #[error("VarInt is longer than 5 bytes")]
    VarIntTooLong,

    #[error("Invalid length prefix: {0}")]
    InvalidLength(i32),

    #[error("Unexpected packet id: {0}")]
    UnexpectedPacket(i32),

    #[error("Malformed status JSON: {0}")]
    Json(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store IO error: {0}")]
    Io(String),

    #[error("Store serialization error: {0}")]
    Json(String),
}

#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("No builds available for {0}")]
    NoBuilds(String),

    #[error("Server type {0} requires an explicit jar URL")]
    MissingUrl(MinecraftType),

    #[error("Artifact IO error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Error)]
pub enum ManagerError {
    #[error("Server not found: {0}")]
    NotFound(String),

    #[error("Server is running: {0}")]
    Running(String),

    #[error("Server already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid server directory: {0}")]
    DirectoryError(String),

    #[error("Failed to pick a free port: {0}")]
    PortError(String),

    #[error("Failed to ensure server jar: {0}")]
    Artifact(#[from] ResolveError),
}
