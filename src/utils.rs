use std::{io, net::TcpListener, path::Path};

use uuid::Uuid;

/// Short random server ID (12 hex chars).
pub fn random_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// Asks the OS for a currently unused TCP port.
pub fn pick_free_port() -> io::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

/// Last `lines` lines of a text file.
pub async fn tail_file(path: &Path, lines: usize) -> io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    let text = String::from_utf8_lossy(&bytes);
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].join("\n"))
}
