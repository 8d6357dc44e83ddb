//! Backend-neutral script replies

use crate::error::{StoreError, StoreResult};

/// Marker returned by a successful conditional set
pub const OK_MARKER: &str = "OK";

/// Reply of an atomic script, independent of the backend's wire types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptReply {
    /// Absent value (Lua `nil` or `false`)
    Nil,
    /// Bare `+OK` status reply
    Okay,
    /// Any other status reply
    Status(String),
    Int(i64),
    Bulk(Vec<u8>),
    Array(Vec<ScriptReply>),
}

impl ScriptReply {
    /// True for the success marker of a conditional set, however the backend
    /// chose to encode it.
    pub fn is_ok_marker(&self) -> bool {
        match self {
            ScriptReply::Okay => true,
            ScriptReply::Status(s) => s == OK_MARKER,
            ScriptReply::Bulk(b) => b.as_slice() == OK_MARKER.as_bytes(),
            _ => false,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, ScriptReply::Nil)
    }

    /// Interpret the reply as an integer.
    pub fn as_int(&self) -> StoreResult<i64> {
        match self {
            ScriptReply::Int(v) => Ok(*v),
            ScriptReply::Bulk(b) => std::str::from_utf8(b)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| StoreError::UnexpectedReply(format!("{:?}", self))),
            other => Err(StoreError::UnexpectedReply(format!("{:?}", other))),
        }
    }
}

impl TryFrom<::redis::Value> for ScriptReply {
    type Error = StoreError;

    fn try_from(value: ::redis::Value) -> Result<Self, Self::Error> {
        use ::redis::Value;

        match value {
            Value::Nil => Ok(ScriptReply::Nil),
            Value::Okay => Ok(ScriptReply::Okay),
            Value::SimpleString(s) => Ok(ScriptReply::Status(s)),
            Value::Int(v) => Ok(ScriptReply::Int(v)),
            Value::BulkString(b) => Ok(ScriptReply::Bulk(b)),
            // RESP3 maps Lua booleans through; false is the absent value
            Value::Boolean(false) => Ok(ScriptReply::Nil),
            Value::Boolean(true) => Ok(ScriptReply::Int(1)),
            Value::Array(items) => items
                .into_iter()
                .map(ScriptReply::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(ScriptReply::Array),
            Value::ServerError(err) => Err(StoreError::Script(format!("{:?}", err))),
            other => Err(StoreError::UnexpectedReply(format!("{:?}", other))),
        }
    }
}
