//! OTR identity material interchange
//!
//! Reads and writes the two textual stores OTR messaging clients keep on disk:
//! the nested S-expression private key file and the tab-delimited peer
//! fingerprint table.

pub mod sexp;
pub mod parser;
pub mod extract;
pub mod serializer;
pub mod fingerprint;
pub mod table;
pub mod error;

pub use sexp::{SExp, Atom};
pub use parser::{parse, Parser};
pub use extract::{extract, extract_with_rejects, parse_keys, DsaPublic, KeyMap, KeyRecord, KeyType};
pub use serializer::{serialize, serialize_record};
pub use fingerprint::{Fingerprinter, OtrFingerprinter};
pub use table::{parse_table, write_table, FingerprintMap, FingerprintRecord};
pub use error::{KeystoreError, Result};
