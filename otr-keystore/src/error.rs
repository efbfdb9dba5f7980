//! Error types for key store and fingerprint table operations

use thiserror::Error;

/// Main error type for key store operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KeystoreError {
    #[error("Malformed input at line {line}, column {column}: {message}")]
    MalformedInput {
        pos: usize,
        line: usize,
        column: usize,
        line_text: String,
        message: String,
    },

    #[error("Incomplete account record {account:?}: missing {}", .missing.join(", "))]
    IncompleteRecord {
        account: Option<String>,
        missing: Vec<&'static str>,
    },

    #[error("Record {name:?} has no {field}")]
    MissingField { name: String, field: &'static str },

    #[error("Record {name:?}: {field} does not fit in {width} hex digits")]
    OversizedValue {
        name: String,
        field: &'static str,
        width: usize,
    },

    #[error("Malformed fingerprint row at line {line}: {message}")]
    MalformedRow { line: usize, message: String },
}

impl KeystoreError {
    /// Build a `MalformedInput` error, resolving `pos` to its line and column
    pub fn malformed(input: &str, pos: usize, message: impl Into<String>) -> Self {
        let pos = pos.min(input.len());
        let line_start = input[..pos].rfind('\n').map_or(0, |i| i + 1);
        let line_end = input[pos..].find('\n').map_or(input.len(), |i| pos + i);
        let line = input[..pos].matches('\n').count() + 1;

        KeystoreError::MalformedInput {
            pos,
            line,
            column: pos - line_start + 1,
            line_text: input[line_start..line_end].trim_end_matches('\r').to_string(),
            message: message.into(),
        }
    }

    /// The failing line with a `>!<` marker inserted at the failing column
    pub fn marked_line(&self) -> Option<String> {
        match self {
            KeystoreError::MalformedInput { line_text, column, .. } => {
                let mut split = (column - 1).min(line_text.len());
                while !line_text.is_char_boundary(split) {
                    split -= 1;
                }
                Some(format!("{}>!<{}", &line_text[..split], &line_text[split..]))
            }
            _ => None,
        }
    }

    /// Fatal errors abort the whole operation; the rest only drop one record
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            KeystoreError::IncompleteRecord { .. } | KeystoreError::MissingField { .. }
        )
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, KeystoreError>;
