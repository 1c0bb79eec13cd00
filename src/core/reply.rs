//! Reply Values
//!
//! Tagged-union result produced on the worker thread and read on the owner
//! thread. Arrays own their children and may nest arbitrarily deep.
//!
//! Exactly one representation is active at a time: every setter replaces
//! whatever was stored before. Typed getters never fail; they return a
//! default (`false`, `0`, empty) when the stored kind does not match, so
//! callers check the kind first.

use std::fmt;

use crate::core::error::{ConnectorError, ErrorCode};

/// Kind tag of a [`ReplyValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// No value.
    Nil,
    /// Boolean.
    Bool,
    /// Integer.
    Int,
    /// Float.
    Double,
    /// Error text.
    Error,
    /// Byte string.
    Str,
    /// Nested values.
    Array,
}

/// Result of one dispatched request. Move-only.
#[derive(Debug, Default, PartialEq)]
pub enum ReplyValue {
    /// No value.
    #[default]
    Nil,
    /// Boolean result.
    Bool(bool),
    /// Integer result.
    Int(i64),
    /// Float result.
    Double(f64),
    /// Error text.
    Error(Vec<u8>),
    /// Byte string.
    Str(Vec<u8>),
    /// Array of replies.
    Array(Vec<ReplyValue>),
}

impl ReplyValue {
    /// Build an error reply from a framework error (`"CODE: message"`).
    pub fn from_error(err: &ConnectorError) -> Self {
        ReplyValue::Error(format!("{}: {}", err.code(), err).into_bytes())
    }

    /// Build a string reply.
    pub fn str(value: impl Into<Vec<u8>>) -> Self {
        ReplyValue::Str(value.into())
    }

    /// Build an error reply from raw text.
    pub fn error(text: impl Into<Vec<u8>>) -> Self {
        ReplyValue::Error(text.into())
    }

    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Set to nil.
    pub fn set_nil(&mut self) {
        *self = ReplyValue::Nil;
    }

    /// Set to a boolean.
    pub fn set_bool(&mut self, value: bool) {
        *self = ReplyValue::Bool(value);
    }

    /// Set to an integer.
    pub fn set_int(&mut self, value: i64) {
        *self = ReplyValue::Int(value);
    }

    /// Set to a float.
    pub fn set_double(&mut self, value: f64) {
        *self = ReplyValue::Double(value);
    }

    /// Set to an error.
    pub fn set_error(&mut self, text: impl Into<Vec<u8>>) {
        *self = ReplyValue::Error(text.into());
    }

    /// Set to a byte string.
    pub fn set_str(&mut self, value: impl Into<Vec<u8>>) {
        *self = ReplyValue::Str(value.into());
    }

    /// Set to an empty array with room for `n` children.
    pub fn reserve_array(&mut self, n: usize) {
        *self = ReplyValue::Array(Vec::with_capacity(n));
    }

    /// Append a child. A non-array value is first replaced by an empty array.
    pub fn append_array(&mut self, child: ReplyValue) {
        if !self.is_array() {
            self.reserve_array(1);
        }
        if let ReplyValue::Array(children) = self {
            children.push(child);
        }
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Active kind.
    pub fn kind(&self) -> ReplyKind {
        match self {
            ReplyValue::Nil => ReplyKind::Nil,
            ReplyValue::Bool(_) => ReplyKind::Bool,
            ReplyValue::Int(_) => ReplyKind::Int,
            ReplyValue::Double(_) => ReplyKind::Double,
            ReplyValue::Error(_) => ReplyKind::Error,
            ReplyValue::Str(_) => ReplyKind::Str,
            ReplyValue::Array(_) => ReplyKind::Array,
        }
    }

    /// True for `Nil`.
    pub fn is_nil(&self) -> bool {
        matches!(self, ReplyValue::Nil)
    }

    /// True for `Bool`.
    pub fn is_bool(&self) -> bool {
        matches!(self, ReplyValue::Bool(_))
    }

    /// True for `Int`.
    pub fn is_int(&self) -> bool {
        matches!(self, ReplyValue::Int(_))
    }

    /// True for `Double`.
    pub fn is_double(&self) -> bool {
        matches!(self, ReplyValue::Double(_))
    }

    /// True for `Error`.
    pub fn is_error(&self) -> bool {
        matches!(self, ReplyValue::Error(_))
    }

    /// True for `Str`.
    pub fn is_str(&self) -> bool {
        matches!(self, ReplyValue::Str(_))
    }

    /// True for `Array`.
    pub fn is_array(&self) -> bool {
        matches!(self, ReplyValue::Array(_))
    }

    /// Boolean value, or `false`.
    pub fn get_bool(&self) -> bool {
        match self {
            ReplyValue::Bool(v) => *v,
            _ => false,
        }
    }

    /// Integer value, or `0`.
    pub fn get_int(&self) -> i64 {
        match self {
            ReplyValue::Int(v) => *v,
            _ => 0,
        }
    }

    /// Float value, or `0.0`.
    pub fn get_double(&self) -> f64 {
        match self {
            ReplyValue::Double(v) => *v,
            _ => 0.0,
        }
    }

    /// Error text, or empty.
    pub fn get_error(&self) -> &[u8] {
        match self {
            ReplyValue::Error(v) => v,
            _ => &[],
        }
    }

    /// String bytes, or empty.
    pub fn get_str(&self) -> &[u8] {
        match self {
            ReplyValue::Str(v) => v,
            _ => &[],
        }
    }

    /// Array children, or empty.
    pub fn get_array(&self) -> &[ReplyValue] {
        match self {
            ReplyValue::Array(v) => v,
            _ => &[],
        }
    }

    /// Number of array children (0 for non-arrays).
    pub fn array_len(&self) -> usize {
        self.get_array().len()
    }

    /// Framework error code, if this is an error reply produced by the connector.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            ReplyValue::Error(text) => ErrorCode::from_reply(text),
            _ => None,
        }
    }

    /// Take ownership of the array children (empty for any other kind).
    pub fn into_array(self) -> Vec<ReplyValue> {
        match self {
            ReplyValue::Array(v) => v,
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for ReplyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyValue::Nil => f.write_str("(nil)"),
            ReplyValue::Bool(v) => write!(f, "{v}"),
            ReplyValue::Int(v) => write!(f, "(integer) {v}"),
            ReplyValue::Double(v) => write!(f, "(double) {v}"),
            ReplyValue::Error(v) => write!(f, "(error) {}", String::from_utf8_lossy(v)),
            ReplyValue::Str(v) => write!(f, "\"{}\"", String::from_utf8_lossy(v)),
            ReplyValue::Array(children) => {
                f.write_str("[")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str("]")
            }
        }
    }
}
