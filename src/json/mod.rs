//! Hand-written JSON support for the wire protocol.
//!
//! The request and response bodies of the completion API are decoded
//! and encoded here rather than with a serialization framework: the
//! scanner ([`scanner`]) tokenizes a size-limited byte stream, the
//! parser ([`parser`]) builds a [`Value`] by recursive descent, and
//! the printer is the [`std::fmt::Display`] impl on [`Value`].
//!
//! Strings carry their bytes verbatim: no escape sequences are
//! recognized or produced.

pub mod parser;
pub mod scanner;

use std::fmt;
use std::io::{self, BufRead, Cursor};

use indexmap::IndexMap;
use thiserror::Error;

use crate::json::parser::Parser;

/// A JSON value. Objects keep insertion order and overwrite on
/// duplicate keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

/// The tag of a [`Value`], used in type-mismatch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Nil,
    Bool,
    Num,
    Str,
    Array,
    Obj,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Nil => "NIL",
            Kind::Bool => "BOOL",
            Kind::Num => "NUM",
            Kind::Str => "STR",
            Kind::Array => "ARRAY",
            Kind::Obj => "OBJ",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("wrong type: want {want}, got {got}")]
    Type { want: Kind, got: Kind },

    #[error("{0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Null => Kind::Nil,
            Value::Bool(_) => Kind::Bool,
            Value::Num(_) => Kind::Num,
            Value::Str(_) => Kind::Str,
            Value::Array(_) => Kind::Array,
            Value::Object(_) => Kind::Obj,
        }
    }

    fn mismatch(&self, want: Kind) -> Error {
        Error::Type {
            want,
            got: self.kind(),
        }
    }

    pub fn as_number(&self) -> Result<f64, Error> {
        match self {
            Value::Num(n) => Ok(*n),
            other => Err(other.mismatch(Kind::Num)),
        }
    }

    pub fn as_boolean(&self) -> Result<bool, Error> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(other.mismatch(Kind::Bool)),
        }
    }

    pub fn as_string(&self) -> Result<&str, Error> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(other.mismatch(Kind::Str)),
        }
    }

    pub fn as_array(&self) -> Result<&[Value], Error> {
        match self {
            Value::Array(values) => Ok(values),
            other => Err(other.mismatch(Kind::Array)),
        }
    }

    pub fn as_object(&self) -> Result<&IndexMap<String, Value>, Error> {
        match self {
            Value::Object(members) => Ok(members),
            other => Err(other.mismatch(Kind::Obj)),
        }
    }

    /// Looks up a key in an object value.
    pub fn get(&self, key: &str) -> Result<&Value, Error> {
        self.as_object()?
            .get(key)
            .ok_or_else(|| Error::Parse(format!("missing key: {key}")))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Num(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::Array(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
            Value::Object(members) => {
                f.write_str("{")?;
                for (i, (key, value)) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "\"{key}\": {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Parses a complete JSON document from a string.
pub fn parse(input: &str) -> Result<Value, Error> {
    let mut cursor = Cursor::new(input.as_bytes());
    parse_stream(&mut cursor, input.len())
}

/// Parses one JSON value from the next `size` bytes of `input`.
///
/// The stream is consumed byte by byte and never read past `size`,
/// so it stays positioned for whoever owns the rest of it. Anything
/// other than whitespace after the value is an error.
pub fn parse_stream(input: &mut dyn BufRead, size: usize) -> Result<Value, Error> {
    let mut parser = Parser::new(input, size);
    let value = parser.value()?;
    parser.expect_end()?;
    Ok(value)
}
