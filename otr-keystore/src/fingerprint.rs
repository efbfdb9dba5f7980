//! Fingerprints of DSA public keys

use crate::extract::DsaPublic;
use num_bigint::BigUint;
use sha1::{Digest, Sha1};

/// Computes the human-readable fingerprint of a public key.
///
/// Implementations must be deterministic and depend only on `(y, g, p, q)`.
pub trait Fingerprinter {
    fn fingerprint(&self, key: &DsaPublic) -> String;
}

impl<F> Fingerprinter for F
where
    F: Fn(&DsaPublic) -> String,
{
    fn fingerprint(&self, key: &DsaPublic) -> String {
        self(key)
    }
}

/// The fingerprint OTR clients display: SHA-1 over the MPI encoding of
/// `p, q, g, y`, as 40 lowercase hex digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtrFingerprinter;

impl OtrFingerprinter {
    pub fn new() -> Self {
        OtrFingerprinter
    }

    /// Serialized public key without the leading key-type field
    pub fn public_key_bytes(key: &DsaPublic) -> Vec<u8> {
        let mut buffer = Vec::new();
        for value in [&key.p, &key.q, &key.g, &key.y] {
            write_mpi(value, &mut buffer);
        }
        buffer
    }
}

impl Fingerprinter for OtrFingerprinter {
    fn fingerprint(&self, key: &DsaPublic) -> String {
        let mut hasher = Sha1::new();
        hasher.update(Self::public_key_bytes(key));
        hex::encode(hasher.finalize())
    }
}

/// 4-byte big-endian length followed by the minimal big-endian magnitude
fn write_mpi(value: &BigUint, buffer: &mut Vec<u8>) {
    let bytes = if value.bits() == 0 {
        Vec::new()
    } else {
        value.to_bytes_be()
    };
    buffer.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buffer.extend_from_slice(&bytes);
}
