//! Reply definitions
//!
//! Represents parsed replies from the server.

/// A parsed reply node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Status line (`+OK`)
    Status(String),

    /// Error line (`-ERR ...`)
    Error(String),

    /// Integer (`:42`)
    Integer(i64),

    /// Bulk string, binary safe
    Bulk(Vec<u8>),

    /// Null bulk string or null array
    Nil,

    /// Array of nested replies
    Array(Vec<Reply>),
}

impl Reply {
    /// Short name of the reply type, used in errors and logs
    pub fn type_name(&self) -> &'static str {
        match self {
            Reply::Status(_) => "status",
            Reply::Error(_) => "error",
            Reply::Integer(_) => "integer",
            Reply::Bulk(_) => "string",
            Reply::Nil => "nil",
            Reply::Array(_) => "array",
        }
    }

    /// Create an error reply
    pub fn error(message: &str) -> Self {
        Reply::Error(message.to_string())
    }

    /// Create a bulk reply
    pub fn bulk(bytes: impl Into<Vec<u8>>) -> Self {
        Reply::Bulk(bytes.into())
    }

    /// Create a status reply
    pub fn status(line: &str) -> Self {
        Reply::Status(line.to_string())
    }
}
