//! Reply kinds
//!
//! The shape a command expects back, fixed when the command is created.

use std::fmt;

/// Expected reply shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    /// Any reply, delivered as the parsed node
    Raw,

    /// Status or bulk string, valid UTF-8
    String,

    /// Status or bulk string, raw bytes
    Bytes,

    /// Integer that fits in 32 bits
    Int32,

    /// Integer
    Int64,

    /// Nil and nothing else
    Nil,

    /// Array of strings, in reply order
    StringList,

    /// Array of strings, sorted and deduplicated
    OrderedSet,

    /// Array of strings, deduplicated
    UnorderedSet,
}

impl ReplyKind {
    /// Every kind, in declaration order
    pub const ALL: [ReplyKind; 9] = [
        ReplyKind::Raw,
        ReplyKind::String,
        ReplyKind::Bytes,
        ReplyKind::Int32,
        ReplyKind::Int64,
        ReplyKind::Nil,
        ReplyKind::StringList,
        ReplyKind::OrderedSet,
        ReplyKind::UnorderedSet,
    ];
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplyKind::Raw => "raw reply",
            ReplyKind::String => "string",
            ReplyKind::Bytes => "byte string",
            ReplyKind::Int32 => "32-bit integer",
            ReplyKind::Int64 => "integer",
            ReplyKind::Nil => "nil",
            ReplyKind::StringList => "string list",
            ReplyKind::OrderedSet => "ordered string set",
            ReplyKind::UnorderedSet => "string set",
        };
        f.write_str(name)
    }
}

/// Kind plus nil tolerance
///
/// A nullable expectation turns a nil reply into an explicit absent value
/// instead of a `NilReply` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExpectedReply {
    pub kind: ReplyKind,
    pub nullable: bool,
}

impl ExpectedReply {
    pub fn new(kind: ReplyKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    pub fn nullable(kind: ReplyKind) -> Self {
        Self {
            kind,
            nullable: true,
        }
    }
}

impl fmt::Display for ExpectedReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "optional {}", self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}
