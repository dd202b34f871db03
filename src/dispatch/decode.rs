//! Reply validation
//!
//! One function, one match on the expected kind.

use std::collections::{BTreeSet, HashSet};

use crate::error::CommandError;
use crate::protocol::Reply;
use super::{ExpectedReply, ReplyKind, Value};

/// Validate `reply` against `expected` and decode it
///
/// Never coerces: an integer is not a string, a status line is not an
/// integer, and a list with one non-string element is rejected whole.
pub fn decode(expected: ExpectedReply, reply: Reply) -> Result<Value, CommandError> {
    match reply {
        Reply::Error(message) => Err(CommandError::ErrorReply(message)),
        Reply::Nil if expected.nullable => Ok(Value::Absent),
        reply => decode_shape(expected.kind, reply),
    }
}

fn decode_shape(kind: ReplyKind, reply: Reply) -> Result<Value, CommandError> {
    match (kind, reply) {
        (ReplyKind::Raw, reply) => Ok(Value::Raw(reply)),

        (ReplyKind::Nil, Reply::Nil) => Ok(Value::Nil),
        (_, Reply::Nil) => Err(CommandError::NilReply),

        (ReplyKind::String, Reply::Status(line)) => Ok(Value::String(line)),
        (ReplyKind::String, Reply::Bulk(bytes)) => String::from_utf8(bytes)
            .map(Value::String)
            .map_err(|_| wrong_type(kind, "non-UTF-8 string")),

        (ReplyKind::Bytes, Reply::Status(line)) => Ok(Value::Bytes(line.into_bytes())),
        (ReplyKind::Bytes, Reply::Bulk(bytes)) => Ok(Value::Bytes(bytes)),

        (ReplyKind::Int32, Reply::Integer(n)) => i32::try_from(n)
            .map(Value::Int32)
            .map_err(|_| wrong_type(kind, "integer out of 32-bit range")),
        (ReplyKind::Int64, Reply::Integer(n)) => Ok(Value::Int64(n)),

        (ReplyKind::StringList, Reply::Array(items)) => {
            collect_strings::<Vec<String>>(kind, items).map(Value::List)
        }
        (ReplyKind::OrderedSet, Reply::Array(items)) => {
            collect_strings::<BTreeSet<String>>(kind, items).map(Value::OrderedSet)
        }
        (ReplyKind::UnorderedSet, Reply::Array(items)) => {
            collect_strings::<HashSet<String>>(kind, items).map(Value::UnorderedSet)
        }

        (kind, other) => Err(wrong_type(kind, other.type_name())),
    }
}

/// Collect array elements as strings, failing on the first non-string
fn collect_strings<C>(kind: ReplyKind, items: Vec<Reply>) -> Result<C, CommandError>
where
    C: FromIterator<String>,
{
    items
        .into_iter()
        .map(|item| match item {
            Reply::Status(line) => Ok(line),
            Reply::Bulk(bytes) => String::from_utf8(bytes)
                .map_err(|_| wrong_type(kind, "array containing non-UTF-8 string")),
            other => Err(wrong_type(kind, element_name(&other))),
        })
        .collect()
}

fn element_name(reply: &Reply) -> &'static str {
    match reply {
        Reply::Integer(_) => "array containing integer",
        Reply::Nil => "array containing nil",
        Reply::Array(_) => "array containing array",
        Reply::Error(_) => "array containing error",
        Reply::Status(_) | Reply::Bulk(_) => "array containing string",
    }
}

fn wrong_type(expected: ReplyKind, found: &'static str) -> CommandError {
    CommandError::WrongType { expected, found }
}

/// [`decode`] plus logging, keyed by the request text
pub fn dispatch_reply(
    text: &str,
    expected: ExpectedReply,
    reply: Reply,
) -> Result<Value, CommandError> {
    let outcome = decode(expected, reply);

    match &outcome {
        Ok(_) => tracing::trace!("{}: {} reply decoded", text, expected),
        Err(CommandError::ErrorReply(message)) => tracing::error!("{}: {}", text, message),
        Err(CommandError::NilReply) => tracing::warn!("{}: Nil reply", text),
        Err(e) => tracing::error!("{}: {}", text, e),
    }

    outcome
}
