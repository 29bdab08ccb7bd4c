//! Client for the handshake/status subset of the Minecraft protocol.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::{io::AsyncWriteExt, net::TcpStream, time::timeout};

use crate::error::QueryError;

pub mod codec;

use codec::{frame, io_error, read_packet, read_varint, write_string, write_varint};

/// Protocol number sent in the handshake (1.20.x).
pub const PROTOCOL_VERSION: i32 = 762;
const NEXT_STATE_STATUS: i32 = 1;
const HANDSHAKE_ID: i32 = 0x00;
const STATUS_REQUEST_ID: i32 = 0x00;
const STATUS_RESPONSE_ID: i32 = 0x00;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerStatus {
    #[serde(default)]
    pub version: VersionInfo,
    #[serde(default)]
    pub players: Players,
    #[serde(default)]
    pub description: Description,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct VersionInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub protocol: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Players {
    #[serde(default)]
    pub max: u32,
    #[serde(default)]
    pub online: u32,
}

/// The MOTD, either a bare string or a chat component.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Description {
    Text(String),
    Component {
        #[serde(default)]
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        extra: Vec<Description>,
    },
}

impl Default for Description {
    fn default() -> Self {
        Description::Text(String::new())
    }
}

impl Description {
    /// Plain text with component children flattened in order.
    pub fn text(&self) -> String {
        match self {
            Description::Text(text) => text.clone(),
            Description::Component { text, extra } => {
                let mut out = text.clone();
                for child in extra {
                    out.push_str(&child.text());
                }
                out
            }
        }
    }
}

/// Queries `host:port` for its status over a fresh connection.
///
/// `limit` bounds the connect and the wait for the response. The socket is
/// dropped, and so closed, on every return path.
pub async fn ping(host: &str, port: u16, limit: Duration) -> Result<ServerStatus, QueryError> {
    let addr = format!("{host}:{port}");
    let mut stream = timeout(limit, TcpStream::connect(&addr))
        .await
        .map_err(|_| QueryError::Timeout)?
        .map_err(|e| QueryError::Connect {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;

    stream.write_all(&handshake(host, port)).await.map_err(io_error)?;
    stream.write_all(&status_request()).await.map_err(io_error)?;

    let packet = timeout(limit, read_packet(&mut stream))
        .await
        .map_err(|_| QueryError::Timeout)??;

    let _ = stream.shutdown().await;
    decode_status(&packet)
}

fn handshake(host: &str, port: u16) -> Vec<u8> {
    let mut body = Vec::new();
    write_varint(&mut body, HANDSHAKE_ID);
    write_varint(&mut body, PROTOCOL_VERSION);
    write_string(&mut body, host);
    body.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut body, NEXT_STATE_STATUS);
    frame(&body)
}

fn status_request() -> Vec<u8> {
    let mut body = Vec::new();
    write_varint(&mut body, STATUS_REQUEST_ID);
    frame(&body)
}

fn decode_status(packet: &[u8]) -> Result<ServerStatus, QueryError> {
    let mut rest = packet;
    let id = read_varint(&mut rest)?;
    if id != STATUS_RESPONSE_ID {
        return Err(QueryError::UnexpectedPacket(id));
    }

    let json_len = read_varint(&mut rest)?;
    if json_len < 0 || json_len as usize > rest.len() {
        return Err(QueryError::InvalidLength(json_len));
    }

    serde_json::from_slice(&rest[..json_len as usize]).map_err(|e| QueryError::Json(e.to_string()))
}
