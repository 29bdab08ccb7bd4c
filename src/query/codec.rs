//! VarInt and length-prefixed packet framing of the status protocol.
//!
//! A VarInt stores 7 bits per byte, least significant group first; a set
//! high bit means another byte follows. Negative values use their two's
//! complement and always take 5 bytes.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::QueryError;

pub const MAX_VARINT_LEN: usize = 5;

/// Upper bound accepted for a response packet.
pub const MAX_PACKET_LEN: i32 = 2 * 1024 * 1024;

pub fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut v = value as u32;
    loop {
        let mut byte = (v & 0x7F) as u8;
        v >>= 7;
        if v != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if v == 0 {
            break;
        }
    }
}

/// Reads a VarInt from the front of `bytes`, advancing it.
pub fn read_varint(bytes: &mut &[u8]) -> Result<i32, QueryError> {
    let mut result: u32 = 0;
    for i in 0..MAX_VARINT_LEN {
        let (&byte, rest) = bytes.split_first().ok_or(QueryError::ShortRead)?;
        *bytes = rest;
        result |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(result as i32);
        }
    }
    Err(QueryError::VarIntTooLong)
}

pub async fn read_varint_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32, QueryError> {
    let mut result: u32 = 0;
    for i in 0..MAX_VARINT_LEN {
        let byte = reader.read_u8().await.map_err(io_error)?;
        result |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(result as i32);
        }
    }
    Err(QueryError::VarIntTooLong)
}

pub fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_varint(buf, s.len() as i32);
    buf.extend_from_slice(s.as_bytes());
}

/// Prefixes `payload` with its length.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + MAX_VARINT_LEN);
    write_varint(&mut out, payload.len() as i32);
    out.extend_from_slice(payload);
    out
}

/// Reads one length-prefixed packet body.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, QueryError> {
    let len = read_varint_from(reader).await?;
    if !(1..=MAX_PACKET_LEN).contains(&len) {
        return Err(QueryError::InvalidLength(len));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await.map_err(io_error)?;
    Ok(body)
}

pub(crate) fn io_error(err: std::io::Error) -> QueryError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        QueryError::ShortRead
    } else {
        QueryError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        write_varint(&mut buf, value);
        buf
    }

    #[test]
    fn boundary_values_round_trip() {
        for value in [0, 1, 127, 128, 255, 2_097_151, 2_097_152, i32::MAX] {
            let buf = encoded(value);
            let mut slice = buf.as_slice();
            assert_eq!(read_varint(&mut slice).unwrap(), value);
            assert!(slice.is_empty(), "trailing bytes for {value}");
        }
    }

    #[test]
    fn matches_reference_encoding() {
        assert_eq!(encoded(0), [0x00]);
        assert_eq!(encoded(127), [0x7F]);
        assert_eq!(encoded(128), [0x80, 0x01]);
        assert_eq!(encoded(25565), [0xDD, 0xC7, 0x01]);
        assert_eq!(encoded(i32::MAX), [0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
        assert_eq!(encoded(-1), [0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn whole_range_round_trips_on_a_stride() {
        let mut value: i64 = 0;
        while value <= i64::from(i32::MAX) {
            let v = value as i32;
            let buf = encoded(v);
            assert_eq!(read_varint(&mut buf.as_slice()).unwrap(), v);
            value += 65_521;
        }
    }

    #[test]
    fn rejects_overlong_and_truncated_input() {
        let overlong = [0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(matches!(
            read_varint(&mut overlong.as_slice()),
            Err(QueryError::VarIntTooLong)
        ));

        let truncated = [0x80, 0x80];
        assert!(matches!(
            read_varint(&mut truncated.as_slice()),
            Err(QueryError::ShortRead)
        ));
    }

    #[tokio::test]
    async fn read_packet_checks_length_prefix() {
        let mut negative: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
        assert!(matches!(
            read_packet(&mut negative).await,
            Err(QueryError::InvalidLength(-1))
        ));

        let mut short: &[u8] = &[0x05, 0x00, 0x01];
        assert!(matches!(read_packet(&mut short).await, Err(QueryError::ShortRead)));

        let framed = frame(&[0x00, 0x02, b'{', b'}']);
        assert_eq!(read_packet(&mut framed.as_slice()).await.unwrap(), [0x00, 0x02, b'{', b'}']);
    }
}
