//! Tagged value tree shared by metadata, JSON bodies and ntinydb blobs.
//!
//! Mirrors the four-variant sum described by the original `dpl_value_t`:
//! a length-prefixed string (never a C-string — embedded zero bytes are
//! legal), a sub-dictionary, an ordered vector, and an opaque blob. Every
//! container owns its values; cloning is always a deep copy.

use std::fmt;

use crate::dict::Dict;

/// A value in the tagged value tree.
///
/// `String` carries raw bytes rather than `std::string::String` because
/// the original format allows embedded NUL bytes in values (e.g. binary
/// ntinydb payloads); callers that know the value is text can use
/// [`Value::as_str`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A length-prefixed byte string.
    String(Vec<u8>),
    /// A nested dictionary of values.
    SubDict(Dict),
    /// An ordered sequence of values.
    Vector(Vec<Value>),
    /// An opaque, backend-specific blob that is never interpreted by the
    /// value tree itself (the C original's void pointer).
    Opaque(Vec<u8>),
}

impl Value {
    /// Builds a string value from anything convertible to bytes.
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Value::String(bytes.into())
    }

    /// Returns the value as UTF-8 text if it is a `String` variant and
    /// valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Returns the underlying bytes for `String` and `Opaque` variants.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(b) | Value::Opaque(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::SubDict(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_vector(&self) -> Option<&[Value]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Value::SubDict(d) => write!(f, "{d}"),
            Value::Vector(v) => {
                write!(f, "[")?;
                for (i, item) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Opaque(_) => write!(f, "<opaque>"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into_bytes())
    }
}
