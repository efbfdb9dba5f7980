//! Peer fingerprint table
//!
//! Tab-separated rows without a header:
//! `name \t account \t protocol \t fingerprint [\t verification]`.
//! The account column is not kept; it is regenerated from a list of account
//! aliases when the table is written.

use crate::error::{KeystoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Parsed records keyed by peer name
pub type FingerprintMap = BTreeMap<String, FingerprintRecord>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub name: String,
    pub protocol: String,
    pub fingerprint: String,
    pub verification: Option<String>,
}

impl FingerprintRecord {
    fn from_row(line: usize, row: &str) -> Result<Self> {
        let columns: Vec<&str> = row.split('\t').map(str::trim).collect();
        if columns.len() < 4 {
            return Err(KeystoreError::MalformedRow {
                line,
                message: format!("expected at least 4 columns, found {}", columns.len()),
            });
        }

        Ok(FingerprintRecord {
            name: columns[0].to_string(),
            protocol: columns[2].to_string(),
            fingerprint: columns[3].to_string(),
            verification: columns.get(4).map(|v| v.to_string()),
        })
    }

    fn push_row(&self, account: &str, out: &mut String) {
        out.push_str(&[self.name.as_str(), account, self.protocol.as_str(), self.fingerprint.as_str()].join("\t"));
        if let Some(verification) = &self.verification {
            out.push('\t');
            out.push_str(verification);
        }
        out.push('\n');
    }
}

/// Parse the table; a later row for the same name replaces the earlier one
pub fn parse_table(input: &str) -> Result<FingerprintMap> {
    input
        .lines()
        .enumerate()
        .filter(|(_, row)| !row.trim().is_empty())
        .try_fold(FingerprintMap::new(), |mut records, (index, row)| -> Result<FingerprintMap> {
            let record = FingerprintRecord::from_row(index + 1, row)?;
            if let Some(previous) = records.insert(record.name.clone(), record) {
                debug!(name = %previous.name, "replacing earlier fingerprint row");
            }
            Ok(records)
        })
}

/// Write one row per account alias for every record with a fingerprint
pub fn write_table<S: AsRef<str>>(records: &FingerprintMap, accounts: &[S]) -> String {
    let mut out = String::new();
    for record in records.values().filter(|r| !r.fingerprint.is_empty()) {
        for account in accounts {
            record.push_row(account.as_ref(), &mut out);
        }
    }
    out
}
