//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Request Encoding
//! ```text
//! SET key value  →  *3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n
//! ```
//!
//! ## Reply Decoding
//! [`decode_reply`] works on a growing buffer and returns the reply together
//! with the number of bytes consumed, or `None` while the frame is still
//! incomplete. [`read_reply`] is the blocking counterpart for streams.

use std::io::{BufRead, Read, Write};

use crate::error::{ClientError, Result};
use super::{Reply, Request};

/// Longest status/error/length line accepted before the CRLF shows up
pub const MAX_LINE_SIZE: usize = 64 * 1024;

/// Nesting limit for arrays of arrays
const MAX_DEPTH: usize = 32;

const CRLF: &[u8] = b"\r\n";

// =============================================================================
// Request Encoding
// =============================================================================

/// Encode a request as an array of bulk strings
pub fn encode_request(request: &Request) -> Vec<u8> {
    let args = request.args();
    let payload_len: usize = args.iter().map(|a| a.len() + 16).sum();

    let mut message = Vec::with_capacity(16 + payload_len);
    message.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        message.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        message.extend_from_slice(arg);
        message.extend_from_slice(CRLF);
    }

    message
}

/// Write a request to a stream
pub fn write_request<W: Write>(writer: &mut W, request: &Request) -> Result<()> {
    writer.write_all(&encode_request(request))?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Reply Encoding
// =============================================================================

/// Encode a reply to bytes
pub fn encode_reply(reply: &Reply) -> Vec<u8> {
    let mut message = Vec::new();
    encode_reply_into(reply, &mut message);
    message
}

fn encode_reply_into(reply: &Reply, out: &mut Vec<u8>) {
    match reply {
        Reply::Status(line) => {
            out.push(b'+');
            out.extend_from_slice(line.as_bytes());
            out.extend_from_slice(CRLF);
        }
        Reply::Error(line) => {
            out.push(b'-');
            out.extend_from_slice(line.as_bytes());
            out.extend_from_slice(CRLF);
        }
        Reply::Integer(n) => {
            out.extend_from_slice(format!(":{}\r\n", n).as_bytes());
        }
        Reply::Bulk(bytes) => {
            out.extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
            out.extend_from_slice(bytes);
            out.extend_from_slice(CRLF);
        }
        Reply::Nil => out.extend_from_slice(b"$-1\r\n"),
        Reply::Array(items) => {
            out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                encode_reply_into(item, out);
            }
        }
    }
}

// =============================================================================
// Reply Decoding
// =============================================================================

/// Decode one reply from the front of `bytes`
///
/// Returns `Ok(None)` if more bytes are needed, otherwise the reply and the
/// number of bytes it occupied. `max_size` caps bulk lengths and array counts.
pub fn decode_reply(bytes: &[u8], max_size: usize) -> Result<Option<(Reply, usize)>> {
    decode_at(bytes, 0, max_size, 0)
}

fn decode_at(
    bytes: &[u8],
    pos: usize,
    max_size: usize,
    depth: usize,
) -> Result<Option<(Reply, usize)>> {
    if depth > MAX_DEPTH {
        return Err(ClientError::Protocol(format!(
            "Reply nested deeper than {} levels",
            MAX_DEPTH
        )));
    }

    let (line, next) = match find_line(bytes, pos)? {
        Some(found) => found,
        None => return Ok(None),
    };

    let (&marker, payload) = line
        .split_first()
        .ok_or_else(|| ClientError::Protocol("Empty reply line".to_string()))?;

    match marker {
        b'+' => Ok(Some((Reply::Status(lossy(payload)), next))),
        b'-' => Ok(Some((Reply::Error(lossy(payload)), next))),
        b':' => Ok(Some((Reply::Integer(parse_int(payload)?), next))),
        b'$' => {
            let len = match checked_len(parse_int(payload)?, max_size, "Bulk string")? {
                Some(len) => len,
                None => return Ok(Some((Reply::Nil, next))),
            };

            let end = next + len;
            if bytes.len() < end + CRLF.len() {
                return Ok(None);
            }
            if &bytes[end..end + CRLF.len()] != CRLF {
                return Err(ClientError::Protocol(
                    "Bulk string not terminated by CRLF".to_string(),
                ));
            }

            Ok(Some((Reply::Bulk(bytes[next..end].to_vec()), end + CRLF.len())))
        }
        b'*' => {
            let count = match checked_len(parse_int(payload)?, max_size, "Array")? {
                Some(count) => count,
                None => return Ok(Some((Reply::Nil, next))),
            };

            let mut items = Vec::with_capacity(count.min(1024));
            let mut cursor = next;
            for _ in 0..count {
                match decode_at(bytes, cursor, max_size, depth + 1)? {
                    Some((item, after)) => {
                        items.push(item);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }

            Ok(Some((Reply::Array(items), cursor)))
        }
        _ => Err(ClientError::Protocol(format!(
            "Unknown reply type: 0x{:02x}",
            marker
        ))),
    }
}

/// Locate the CRLF-terminated line starting at `pos`
fn find_line(bytes: &[u8], pos: usize) -> Result<Option<(&[u8], usize)>> {
    let rest = &bytes[pos..];
    match rest.windows(CRLF.len()).position(|w| w == CRLF) {
        Some(i) => Ok(Some((&rest[..i], pos + i + CRLF.len()))),
        None if rest.len() > MAX_LINE_SIZE => Err(ClientError::Protocol(format!(
            "Reply line exceeds {} bytes",
            MAX_LINE_SIZE
        ))),
        None => Ok(None),
    }
}

/// Validate a length header; `None` means the nil marker (-1)
fn checked_len(len: i64, max_size: usize, what: &str) -> Result<Option<usize>> {
    if len == -1 {
        return Ok(None);
    }
    if len < 0 {
        return Err(ClientError::Protocol(format!("{} length {} is negative", what, len)));
    }
    if len as u64 > max_size as u64 {
        return Err(ClientError::Protocol(format!(
            "{} too large: {} (max {})",
            what, len, max_size
        )));
    }
    Ok(Some(len as usize))
}

fn parse_int(payload: &[u8]) -> Result<i64> {
    std::str::from_utf8(payload)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            ClientError::Protocol(format!(
                "Invalid integer: {:?}",
                String::from_utf8_lossy(payload)
            ))
        })
}

fn lossy(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete reply from a buffered stream
///
/// Blocks until a complete reply is received or an error occurs
pub fn read_reply<R: BufRead>(reader: &mut R, max_size: usize) -> Result<Reply> {
    read_reply_at(reader, max_size, 0)
}

fn read_reply_at<R: BufRead>(reader: &mut R, max_size: usize, depth: usize) -> Result<Reply> {
    if depth > MAX_DEPTH {
        return Err(ClientError::Protocol(format!(
            "Reply nested deeper than {} levels",
            MAX_DEPTH
        )));
    }

    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line)? == 0 {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    if !line.ends_with(CRLF) {
        return Err(ClientError::Protocol("Reply line not terminated by CRLF".to_string()));
    }
    line.truncate(line.len() - CRLF.len());

    let (&marker, payload) = line
        .split_first()
        .ok_or_else(|| ClientError::Protocol("Empty reply line".to_string()))?;

    match marker {
        b'+' => Ok(Reply::Status(lossy(payload))),
        b'-' => Ok(Reply::Error(lossy(payload))),
        b':' => Ok(Reply::Integer(parse_int(payload)?)),
        b'$' => {
            let len = match checked_len(parse_int(payload)?, max_size, "Bulk string")? {
                Some(len) => len,
                None => return Ok(Reply::Nil),
            };

            let mut data = vec![0u8; len + CRLF.len()];
            reader.read_exact(&mut data)?;
            if !data.ends_with(CRLF) {
                return Err(ClientError::Protocol(
                    "Bulk string not terminated by CRLF".to_string(),
                ));
            }
            data.truncate(len);
            Ok(Reply::Bulk(data))
        }
        b'*' => {
            let count = match checked_len(parse_int(payload)?, max_size, "Array")? {
                Some(count) => count,
                None => return Ok(Reply::Nil),
            };

            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(read_reply_at(reader, max_size, depth + 1)?);
            }
            Ok(Reply::Array(items))
        }
        _ => Err(ClientError::Protocol(format!(
            "Unknown reply type: 0x{:02x}",
            marker
        ))),
    }
}
