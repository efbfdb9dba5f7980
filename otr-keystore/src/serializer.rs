//! Private key store writer
//!
//! Renders key records back into the `(privkeys (account ...))` grammar read
//! by [`crate::parser`]. Only records holding a private exponent are written.
//! Numbers use fixed-width uppercase hex: 258 digits for `p`, `g` and `y`,
//! 42 digits for `q` and `x`.

use crate::error::{KeystoreError, Result};
use crate::extract::{KeyMap, KeyRecord};
use base64::prelude::{Engine, BASE64_STANDARD};
use num_bigint::BigUint;
use tracing::{debug, warn};

/// Hex width of the modulus, generator and public value
pub const WIDE_HEX_DIGITS: usize = 258;
/// Hex width of the subgroup order and private exponent
pub const NARROW_HEX_DIGITS: usize = 42;

/// Serialize every record that holds a private key; public-only records are
/// skipped
pub fn serialize(records: &KeyMap) -> Result<String> {
    let mut out = String::from("(privkeys\n");

    for record in records.values() {
        match serialize_record(record) {
            Ok(account) => {
                debug!(name = %record.name, "serialized key");
                out.push_str(&account);
            }
            Err(e @ KeystoreError::MissingField { .. }) => {
                warn!("skipping record: {}", e);
            }
            Err(e) => return Err(e),
        }
    }

    out.push_str(")\n");
    Ok(out)
}

/// Render one `(account ...)` block
pub fn serialize_record(record: &KeyRecord) -> Result<String> {
    let x = record.x.as_ref().ok_or_else(|| KeystoreError::MissingField {
        name: record.name.clone(),
        field: "x",
    })?;

    let fields = [
        ("p", &record.p, WIDE_HEX_DIGITS),
        ("q", &record.q, NARROW_HEX_DIGITS),
        ("g", &record.g, WIDE_HEX_DIGITS),
        ("y", &record.y, WIDE_HEX_DIGITS),
        ("x", x, NARROW_HEX_DIGITS),
    ];

    let mut dsa = String::new();
    for (field, value, width) in fields {
        let digits = fixed_hex(&record.name, field, value, width)?;
        dsa.push_str(&format!("    ({} #{}#)\n", field, digits));
    }

    let mut out = String::from(" (account\n");
    out.push_str(&format!("  (name {})\n", text_atom(&record.full_name())));
    out.push_str(&format!("  (protocol {})\n", protocol_atom(&record.protocol)));
    out.push_str("  (private-key\n   (dsa\n");
    out.push_str(&dsa);
    out.push_str("   )\n  )\n )\n");

    Ok(out)
}

/// Zero-padded uppercase hex, rejecting values wider than `width`
fn fixed_hex(name: &str, field: &'static str, value: &BigUint, width: usize) -> Result<String> {
    let digits = format!("{:X}", value);
    if digits.len() > width {
        return Err(KeystoreError::OversizedValue {
            name: name.to_string(),
            field,
            width,
        });
    }
    Ok(format!("{:0>width$}", digits, width = width))
}

/// Quoted string when the text survives quoting unchanged, base64 otherwise
fn text_atom(text: &str) -> String {
    let quotable = !text.contains(['"', '\n', '\r']) && !text.ends_with('\\');
    if quotable {
        format!("\"{}\"", text)
    } else {
        format!("{}|{}|", text.len(), BASE64_STANDARD.encode(text))
    }
}

fn protocol_atom(protocol: &str) -> String {
    let is_token = !protocol.is_empty()
        && !protocol.starts_with(|c: char| c.is_ascii_digit())
        && protocol
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-./_:*+=".contains(&b));
    if is_token {
        protocol.to_string()
    } else {
        text_atom(protocol)
    }
}
