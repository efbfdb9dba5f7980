//! Recursive-descent S-expression parser
//!
//! Grammar of the key store files:
//!
//! ```text
//! sexp    := list | value
//! list    := "(" sexp* ")"
//! value   := display? simple
//! display := "[" simple "]"
//! simple  := raw | token | base64 | hex | qstring
//! raw     := DECIMAL ":" BYTES
//! base64  := DECIMAL? "|" B64WORD+ "|"
//! hex     := "#" HEXWORD+ "#"
//! qstring := DECIMAL? '"' TEXT '"'
//! token   := [A-Za-z0-9-./_:*+=]+
//! ```
//!
//! Every `simple` alternative is decided by its first character, plus a
//! one-byte lookahead past a length prefix, so the parser never backtracks.

use crate::error::{KeystoreError, Result};
use crate::sexp::{Atom, SExp};
use base64::prelude::{Engine, BASE64_STANDARD};
use num_bigint::BigUint;
use tracing::debug;

/// Deepest list nesting accepted before the input is rejected
pub const MAX_DEPTH: usize = 256;

/// S-expression parser over a whole in-memory document
pub struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    position: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser for the given input
    pub fn new(input: &'a str) -> Self {
        Parser {
            input,
            bytes: input.as_bytes(),
            position: 0,
            depth: 0,
        }
    }

    /// Parse exactly one S-expression; only whitespace may follow it
    pub fn parse(&mut self) -> Result<SExp> {
        self.skip_whitespace();
        if self.peek().is_none() {
            return Err(self.error_at(self.position, "expected an S-expression, found end of input"));
        }

        let result = self.parse_sexp()?;
        self.skip_whitespace();

        match self.peek() {
            None => {
                debug!(bytes = self.input.len(), "parsed S-expression");
                Ok(result)
            }
            Some(b')') => Err(self.error_at(self.position, "unbalanced ')'")),
            Some(_) => Err(self.error_at(self.position, "unexpected input after S-expression")),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.position).copied()
    }

    fn peek_at(&self, pos: usize) -> Option<u8> {
        self.bytes.get(pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.position += 1;
        }
    }

    fn scan_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let input = self.input;
        let start = self.position;
        while matches!(self.peek(), Some(b) if pred(b)) {
            self.position += 1;
        }
        &input[start..self.position]
    }

    fn error_at(&self, pos: usize, message: impl Into<String>) -> KeystoreError {
        KeystoreError::malformed(self.input, pos, message)
    }

    fn unexpected(&self, pos: usize, expected: &str) -> KeystoreError {
        match self.input.get(pos..).and_then(|rest| rest.chars().next()) {
            Some(ch) => self.error_at(pos, format!("expected {expected}, found {ch:?}")),
            None => self.error_at(pos, format!("expected {expected}, found end of input")),
        }
    }

    fn parse_sexp(&mut self) -> Result<SExp> {
        self.skip_whitespace();

        match self.peek() {
            Some(b'(') => self.parse_list(),
            Some(b')') => Err(self.error_at(self.position, "unbalanced ')'")),
            Some(_) => self.parse_value(),
            None => Err(self.unexpected(self.position, "an S-expression")),
        }
    }

    fn parse_list(&mut self) -> Result<SExp> {
        let open = self.position;
        if self.depth >= MAX_DEPTH {
            return Err(self.error_at(open, format!("nesting too deep (limit {MAX_DEPTH})")));
        }
        self.position += 1;
        self.depth += 1;
        let mut elements = Vec::new();

        loop {
            self.skip_whitespace();

            match self.peek() {
                Some(b')') => {
                    self.position += 1;
                    break;
                }
                Some(_) => elements.push(self.parse_sexp()?),
                None => return Err(self.error_at(open, "unterminated list")),
            }
        }

        self.depth -= 1;
        Ok(SExp::List(elements))
    }

    fn parse_value(&mut self) -> Result<SExp> {
        if self.peek() == Some(b'[') {
            self.parse_display()?;
            self.skip_whitespace();
        }
        Ok(SExp::Atom(self.parse_simple()?))
    }

    /// `[simple]` display hint; parsed and dropped
    fn parse_display(&mut self) -> Result<()> {
        self.position += 1;
        self.skip_whitespace();
        let hint = self.parse_simple()?;
        self.skip_whitespace();

        if self.peek() != Some(b']') {
            return Err(self.unexpected(self.position, "']' closing display hint"));
        }
        self.position += 1;
        debug!(hint = %hint, "skipping display hint");
        Ok(())
    }

    fn parse_simple(&mut self) -> Result<Atom> {
        let start = self.position;

        let atom = match self.peek() {
            Some(b'1'..=b'9') => {
                let digits_end = start
                    + self.bytes[start..]
                        .iter()
                        .take_while(|b| b.is_ascii_digit())
                        .count();
                match self.peek_at(digits_end) {
                    // `1:` with nothing raw after it is an ordinary token
                    Some(b':') if !self.peek_at(digits_end + 1).is_some_and(is_raw_byte) => {
                        self.parse_token()?
                    }
                    Some(b':') => {
                        let len = self.parse_decimal()?;
                        self.parse_raw(len)?
                    }
                    Some(b'|') => {
                        let len = self.parse_decimal()?;
                        self.parse_base64(Some(len))?
                    }
                    Some(b'"') => {
                        let len = self.parse_decimal()?;
                        self.parse_qstring(Some(len))?
                    }
                    _ => self.parse_token()?,
                }
            }
            Some(b'|') => self.parse_base64(None)?,
            Some(b'#') => self.parse_hex()?,
            Some(b'"') => self.parse_qstring(None)?,
            Some(b) if is_token_byte(b) => self.parse_token()?,
            _ => return Err(self.unexpected(start, "an atom")),
        };

        self.verify_len(atom, start)
    }

    /// Check a length-prefixed atom against its payload
    fn verify_len(&self, atom: Atom, start: usize) -> Result<Atom> {
        match atom.declared_len() {
            Some(expected) if expected != atom.payload_len() => Err(self.error_at(
                start,
                format!(
                    "invalid data of length {}, expected {}",
                    atom.payload_len(),
                    expected
                ),
            )),
            _ => Ok(atom),
        }
    }

    fn parse_decimal(&mut self) -> Result<usize> {
        let start = self.position;
        let digits = self.scan_while(|b| b.is_ascii_digit());
        digits
            .parse::<usize>()
            .map_err(|_| self.error_at(start, format!("length prefix {digits} out of range")))
    }

    fn parse_raw(&mut self, declared_len: usize) -> Result<Atom> {
        // consume ':'
        self.position += 1;
        let start = self.position;
        let payload = self.scan_while(is_raw_byte);

        if payload.is_empty() {
            return Err(self.unexpected(start, "raw bytes after ':'"));
        }

        Ok(Atom::Raw {
            declared_len: Some(declared_len),
            bytes: payload.as_bytes().to_vec(),
        })
    }

    fn parse_token(&mut self) -> Result<Atom> {
        let start = self.position;
        let token = self.scan_while(is_token_byte);

        if token.is_empty() {
            return Err(self.unexpected(start, "a token"));
        }

        Ok(Atom::Token(token.to_string()))
    }

    fn parse_base64(&mut self, declared_len: Option<usize>) -> Result<Atom> {
        let open = self.position;
        self.position += 1;
        let mut encoded = String::new();

        loop {
            self.skip_whitespace();

            match self.peek() {
                Some(b'|') => {
                    self.position += 1;
                    break;
                }
                Some(b) if is_base64_byte(b) => encoded.push_str(self.scan_while(is_base64_byte)),
                Some(_) => return Err(self.unexpected(self.position, "base64 data or '|'")),
                None => return Err(self.error_at(open, "unterminated base64 block")),
            }
        }

        if encoded.is_empty() {
            return Err(self.error_at(open, "empty base64 block"));
        }

        let decoded = BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| self.error_at(open, format!("invalid base64 data: {e}")))?;

        Ok(Atom::Base64 { declared_len, decoded })
    }

    fn parse_hex(&mut self) -> Result<Atom> {
        let open = self.position;
        self.position += 1;
        let mut digits = String::new();

        loop {
            self.skip_whitespace();

            match self.peek() {
                Some(b'#') => {
                    self.position += 1;
                    break;
                }
                Some(b) if b.is_ascii_hexdigit() => {
                    digits.push_str(self.scan_while(|b| b.is_ascii_hexdigit()))
                }
                Some(_) => return Err(self.unexpected(self.position, "hex digits or '#'")),
                None => return Err(self.error_at(open, "unterminated hex block")),
            }
        }

        BigUint::parse_bytes(digits.as_bytes(), 16)
            .map(Atom::Hex)
            .ok_or_else(|| self.error_at(open, "empty hex block"))
    }

    fn parse_qstring(&mut self, declared_len: Option<usize>) -> Result<Atom> {
        let open = self.position;
        self.position += 1;
        let content_start = self.position;

        loop {
            match self.peek() {
                Some(b'"') => break,
                Some(b'\\') if !matches!(self.peek_at(self.position + 1), None | Some(b'\n' | b'\r')) => {
                    self.position += 2;
                }
                Some(b'\n' | b'\r') | None => {
                    return Err(self.error_at(open, "unterminated quoted string"));
                }
                Some(_) => self.position += 1,
            }
        }

        let text = self.input[content_start..self.position].to_string();
        // consume closing quote
        self.position += 1;

        Ok(Atom::QuotedString { declared_len, text })
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"-./_:*+=".contains(&b)
}

fn is_raw_byte(b: u8) -> bool {
    b.is_ascii_graphic() && !b"()[]".contains(&b)
}

fn is_base64_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"+/=".contains(&b)
}

/// Convenience function for parsing a whole document
pub fn parse(input: &str) -> Result<SExp> {
    Parser::new(input).parse()
}
