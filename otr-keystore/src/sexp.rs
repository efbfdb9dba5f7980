//! S-expression tree and atom types

use base64::prelude::{Engine, BASE64_STANDARD};
use num_bigint::BigUint;
use std::borrow::Cow;
use std::fmt;

/// S-expression tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SExp {
    /// Leaf value
    Atom(Atom),
    /// List of S-expressions
    List(Vec<SExp>),
}

/// Leaf value types
///
/// Length-prefixed forms keep their declared length so the tree can be
/// written back the way it was read. The parser has already checked that a
/// declared length matches the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    /// `5:bytes`
    Raw {
        declared_len: Option<usize>,
        bytes: Vec<u8>,
    },
    /// Bare word
    Token(String),
    /// `|base64 words|`, optionally length-prefixed
    Base64 {
        declared_len: Option<usize>,
        decoded: Vec<u8>,
    },
    /// `#hex digits#`
    Hex(BigUint),
    /// `"text"`, optionally length-prefixed
    QuotedString {
        declared_len: Option<usize>,
        text: String,
    },
}

impl fmt::Display for SExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SExp::Atom(atom) => write!(f, "{}", atom),
            SExp::List(elements) => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Raw { bytes, .. } => {
                write!(f, "{}:{}", bytes.len(), String::from_utf8_lossy(bytes))
            }
            Atom::Token(text) => write!(f, "{}", text),
            Atom::Base64 { declared_len, decoded } => {
                if let Some(len) = declared_len {
                    write!(f, "{}", len)?;
                }
                write!(f, "|{}|", BASE64_STANDARD.encode(decoded))
            }
            Atom::Hex(value) => write!(f, "#{:X}#", value),
            Atom::QuotedString { declared_len, text } => {
                if let Some(len) = declared_len {
                    write!(f, "{}", len)?;
                }
                write!(f, "\"{}\"", text)
            }
        }
    }
}

impl SExp {
    /// Shorthand for a bare token
    pub fn token(text: impl Into<String>) -> Self {
        SExp::Atom(Atom::Token(text.into()))
    }

    /// Returns true if this S-expression is an atom
    pub fn is_atom(&self) -> bool {
        matches!(self, SExp::Atom(_))
    }

    /// Returns true if this S-expression is a list
    pub fn is_list(&self) -> bool {
        matches!(self, SExp::List(_))
    }

    /// Get the nth element of a list, if this is a list
    pub fn get(&self, index: usize) -> Option<&SExp> {
        match self {
            SExp::List(elements) => elements.get(index),
            _ => None,
        }
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            SExp::Atom(atom) => Some(atom),
            SExp::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SExp]> {
        match self {
            SExp::List(elements) => Some(elements),
            SExp::Atom(_) => None,
        }
    }

    /// The tag of a tagged list such as `(name "alice")`: the text of its
    /// first element when that element is an atom
    pub fn tag(&self) -> Option<Cow<'_, str>> {
        self.get(0).and_then(SExp::as_atom).and_then(Atom::as_text)
    }

    /// The element following the tag of a tagged list
    pub fn tagged_value(&self) -> Option<&SExp> {
        self.get(1)
    }
}

impl Atom {
    /// Textual view of the atom. Byte payloads must be valid UTF-8; hex
    /// integers have no textual view.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Atom::Token(text) | Atom::QuotedString { text, .. } => Some(Cow::Borrowed(text)),
            Atom::Raw { bytes, .. } | Atom::Base64 { decoded: bytes, .. } => {
                std::str::from_utf8(bytes).ok().map(Cow::Borrowed)
            }
            Atom::Hex(_) => None,
        }
    }

    /// Numeric view of the atom. Byte payloads are read as big-endian
    /// unsigned magnitudes.
    pub fn as_uint(&self) -> Option<BigUint> {
        match self {
            Atom::Hex(value) => Some(value.clone()),
            Atom::Raw { bytes, .. } | Atom::Base64 { decoded: bytes, .. } => {
                Some(BigUint::from_bytes_be(bytes))
            }
            Atom::Token(_) | Atom::QuotedString { .. } => None,
        }
    }

    /// Payload length used for the declared-length check
    pub fn payload_len(&self) -> usize {
        match self {
            Atom::Raw { bytes, .. } | Atom::Base64 { decoded: bytes, .. } => bytes.len(),
            Atom::QuotedString { text, .. } => text.len(),
            Atom::Token(text) => text.len(),
            Atom::Hex(value) => ((value.bits() + 7) / 8) as usize,
        }
    }

    /// The declared length of a length-prefixed form
    pub fn declared_len(&self) -> Option<usize> {
        match self {
            Atom::Raw { declared_len, .. }
            | Atom::Base64 { declared_len, .. }
            | Atom::QuotedString { declared_len, .. } => *declared_len,
            Atom::Token(_) | Atom::Hex(_) => None,
        }
    }
}
