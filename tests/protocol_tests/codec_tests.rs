//! Codec Tests
//!
//! Tests for request encoding and reply decoding.

use std::io::Cursor;

use atlaskv_client::protocol::{
    decode_reply, encode_reply, encode_request, read_reply, write_request, Reply, Request,
    MAX_LINE_SIZE,
};
use atlaskv_client::ClientError;

const MAX: usize = 512 * 1024 * 1024;

fn decode_all(bytes: &[u8]) -> Reply {
    let (reply, used) = decode_reply(bytes, MAX).unwrap().unwrap();
    assert_eq!(used, bytes.len());
    reply
}

// =============================================================================
// Request Encoding Tests
// =============================================================================

#[test]
fn test_encode_plain_request() {
    let encoded = encode_request(&Request::new("SET key value"));
    assert_eq!(encoded, b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n");
}

#[test]
fn test_encode_binary_segment_keeps_crlf() {
    let encoded = encode_request(&Request::new("SET k \"a\r\nb\""));
    assert_eq!(encoded, b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$4\r\na\r\nb\r\n");
}

#[test]
fn test_write_request_to_stream() {
    let mut out = Vec::new();
    write_request(&mut out, &Request::new("PING")).unwrap();
    assert_eq!(out, b"*1\r\n$4\r\nPING\r\n");
}

// =============================================================================
// Reply Decoding Tests
// =============================================================================

#[test]
fn test_decode_scalars() {
    assert_eq!(decode_all(b"+OK\r\n"), Reply::Status("OK".to_string()));
    assert_eq!(
        decode_all(b"-ERR unknown command\r\n"),
        Reply::Error("ERR unknown command".to_string())
    );
    assert_eq!(decode_all(b":-42\r\n"), Reply::Integer(-42));
    assert_eq!(decode_all(b"$5\r\nhello\r\n"), Reply::Bulk(b"hello".to_vec()));
    assert_eq!(decode_all(b"$0\r\n\r\n"), Reply::Bulk(Vec::new()));
}

#[test]
fn test_decode_nil_bulk_and_nil_array() {
    assert_eq!(decode_all(b"$-1\r\n"), Reply::Nil);
    assert_eq!(decode_all(b"*-1\r\n"), Reply::Nil);
}

#[test]
fn test_decode_bulk_with_embedded_crlf() {
    assert_eq!(decode_all(b"$4\r\na\r\nb\r\n"), Reply::Bulk(b"a\r\nb".to_vec()));
}

#[test]
fn test_decode_nested_array() {
    let reply = decode_all(b"*3\r\n$1\r\na\r\n:1\r\n*2\r\n+x\r\n$-1\r\n");
    assert_eq!(
        reply,
        Reply::Array(vec![
            Reply::Bulk(b"a".to_vec()),
            Reply::Integer(1),
            Reply::Array(vec![Reply::Status("x".to_string()), Reply::Nil]),
        ])
    );
}

#[test]
fn test_decode_reports_consumed_bytes() {
    let bytes = b"+OK\r\n:7\r\n";
    let (first, used) = decode_reply(bytes, MAX).unwrap().unwrap();
    assert_eq!(first, Reply::Status("OK".to_string()));
    assert_eq!(used, 5);

    let (second, used2) = decode_reply(&bytes[used..], MAX).unwrap().unwrap();
    assert_eq!(second, Reply::Integer(7));
    assert_eq!(used + used2, bytes.len());
}

#[test]
fn test_decode_incomplete_frame_needs_more() {
    let frame = b"*2\r\n$5\r\nhello\r\n$5\r\nworld\r\n";
    for cut in 0..frame.len() {
        assert!(
            decode_reply(&frame[..cut], MAX).unwrap().is_none(),
            "prefix of {} bytes decoded",
            cut
        );
    }
    assert!(decode_reply(frame, MAX).unwrap().is_some());
}

// =============================================================================
// Malformed Reply Tests
// =============================================================================

#[test]
fn test_decode_unknown_marker() {
    let err = decode_reply(b"?what\r\n", MAX).unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

#[test]
fn test_decode_bad_integer() {
    let err = decode_reply(b":12x\r\n", MAX).unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

#[test]
fn test_decode_bulk_over_limit() {
    let err = decode_reply(b"$100\r\n", 10).unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

#[test]
fn test_decode_negative_length() {
    let err = decode_reply(b"$-5\r\n", MAX).unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

#[test]
fn test_decode_missing_bulk_terminator() {
    let err = decode_reply(b"$3\r\nabcXY", MAX).unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

#[test]
fn test_decode_line_too_long() {
    let mut bytes = vec![b'+'];
    bytes.extend(std::iter::repeat(b'a').take(MAX_LINE_SIZE + 1));
    let err = decode_reply(&bytes, MAX).unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

// =============================================================================
// Stream-based I/O Tests
// =============================================================================

#[test]
fn test_read_reply_from_stream() {
    let mut cursor = Cursor::new(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n+OK\r\n".to_vec());

    let request = read_reply(&mut cursor, MAX).unwrap();
    assert_eq!(
        request,
        Reply::Array(vec![Reply::Bulk(b"GET".to_vec()), Reply::Bulk(b"k".to_vec())])
    );
    assert_eq!(read_reply(&mut cursor, MAX).unwrap(), Reply::Status("OK".to_string()));
}

#[test]
fn test_read_reply_eof() {
    let mut cursor = Cursor::new(Vec::new());
    let err = read_reply(&mut cursor, MAX).unwrap_err();
    assert!(matches!(err, ClientError::Io(_)));
}

#[test]
fn test_encode_reply_is_readable() {
    let reply = Reply::Array(vec![
        Reply::Status("OK".to_string()),
        Reply::Error("ERR nope".to_string()),
        Reply::Integer(3),
        Reply::Bulk(b"x y".to_vec()),
        Reply::Nil,
    ]);
    let encoded = encode_reply(&reply);
    assert_eq!(decode_all(&encoded), reply);
}
