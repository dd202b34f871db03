//! Typed values
//!
//! [`Value`] is what the dispatcher produces; [`FromReply`] lets callers ask
//! for a concrete Rust type and ties that type to its [`ReplyKind`].

use std::collections::{BTreeSet, HashSet};

use crate::protocol::Reply;
use super::{ExpectedReply, ReplyKind};

/// A reply decoded according to its expected kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Raw(Reply),
    String(String),
    Bytes(Vec<u8>),
    Int32(i32),
    Int64(i64),
    Nil,
    List(Vec<String>),
    OrderedSet(BTreeSet<String>),
    UnorderedSet(HashSet<String>),

    /// Nil delivered to a nullable expectation
    Absent,
}

/// Types a command can be declared to return
///
/// | Type                  | Kind           |
/// |-----------------------|----------------|
/// | `Reply`               | `Raw`          |
/// | `String`              | `String`       |
/// | `Vec<u8>`             | `Bytes`        |
/// | `i32`                 | `Int32`        |
/// | `i64`                 | `Int64`        |
/// | `()`                  | `Nil`          |
/// | `Vec<String>`         | `StringList`   |
/// | `BTreeSet<String>`    | `OrderedSet`   |
/// | `HashSet<String>`     | `UnorderedSet` |
/// | `Option<T>`           | `T`'s, nullable |
pub trait FromReply: Sized + Send + 'static {
    const KIND: ReplyKind;
    const NULLABLE: bool = false;

    /// Extract `Self` from a value produced for `Self::KIND`
    ///
    /// Returns `None` only if the value was produced for a different kind.
    fn from_value(value: Value) -> Option<Self>;

    fn expected() -> ExpectedReply {
        ExpectedReply {
            kind: Self::KIND,
            nullable: Self::NULLABLE,
        }
    }
}

macro_rules! impl_from_reply {
    ($ty:ty, $kind:ident, $variant:ident) => {
        impl FromReply for $ty {
            const KIND: ReplyKind = ReplyKind::$kind;

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_from_reply!(Reply, Raw, Raw);
impl_from_reply!(String, String, String);
impl_from_reply!(Vec<u8>, Bytes, Bytes);
impl_from_reply!(i32, Int32, Int32);
impl_from_reply!(i64, Int64, Int64);
impl_from_reply!(Vec<String>, StringList, List);
impl_from_reply!(BTreeSet<String>, OrderedSet, OrderedSet);
impl_from_reply!(HashSet<String>, UnorderedSet, UnorderedSet);

impl FromReply for () {
    const KIND: ReplyKind = ReplyKind::Nil;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Nil => Some(()),
            _ => None,
        }
    }
}

impl<T: FromReply> FromReply for Option<T> {
    const KIND: ReplyKind = T::KIND;
    const NULLABLE: bool = true;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Absent => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}
