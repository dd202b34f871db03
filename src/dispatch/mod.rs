//! Dispatch Module
//!
//! Turns raw replies into typed values.
//!
//! ## Responsibilities
//! - Tag every command with the reply shape it expects ([`ReplyKind`])
//! - Validate a reply against that tag, without coercion
//! - Hand typed values to callbacks through [`FromReply`]
//!
//! ## Outcomes
//! ```text
//! error reply            → CommandError::ErrorReply
//! nil, nullable          → Value::Absent
//! nil, kind Nil          → Value::Nil
//! nil, otherwise         → CommandError::NilReply
//! wrong shape            → CommandError::WrongType
//! array for list/set     → every element string-shaped, or WrongType
//! anything else          → decoded scalar
//! ```

mod kind;
mod value;
mod decode;

pub use kind::{ExpectedReply, ReplyKind};
pub use value::{FromReply, Value};
pub use decode::{decode, dispatch_reply};
