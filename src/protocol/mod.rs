//! Protocol Module
//!
//! Wire format for client-server communication (RESP2).
//!
//! ## Request Format
//! Every request goes out as an array of bulk strings:
//! ```text
//! *<argc>\r\n
//! $<len>\r\n<arg bytes>\r\n      (repeated argc times)
//! ```
//!
//! ## Reply Format
//! The first byte selects the reply type:
//! - `+` status line
//! - `-` error line
//! - `:` integer
//! - `$` bulk string (`$-1` is nil)
//! - `*` array of replies (`*-1` is nil)
//!
//! The codec is incremental: a partial frame decodes to `None` and the caller
//! keeps buffering.

mod request;
mod reply;
mod codec;

pub use request::Request;
pub use reply::Reply;
pub use codec::{
    decode_reply, encode_reply, encode_request, read_reply, write_request, MAX_LINE_SIZE,
};
