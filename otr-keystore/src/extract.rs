//! Key records extracted from a parsed private key store
//!
//! The store is a root list of tagged sub-lists. Only `account` entries are
//! read:
//!
//! ```text
//! (privkeys
//!  (account
//!   (name "alice@jabber.org/Home")
//!   (protocol prpl-jabber)
//!   (private-key (dsa (p #..#) (q #..#) (g #..#) (y #..#) (x #..#)))))
//! ```
//!
//! Within an account, `name` must come first: each `name` tag starts a fresh
//! record, and fields seen before any `name` are dropped. Within `dsa`, only
//! the first five forms are examined; each one fills the field named by its
//! own tag.

use crate::error::{KeystoreError, Result};
use crate::fingerprint::Fingerprinter;
use crate::parser::parse;
use crate::sexp::{Atom, SExp};
use num_bigint::BigUint;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Extracted records keyed by account name (without resource)
pub type KeyMap = BTreeMap<String, KeyRecord>;

/// Number of forms inside `(dsa ...)` that are read
const DSA_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Dsa,
}

/// Public part of a DSA key; the fingerprint input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsaPublic {
    pub y: BigUint,
    pub g: BigUint,
    pub p: BigUint,
    pub q: BigUint,
}

/// One account's key material
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub name: String,
    pub resource: String,
    pub protocol: String,
    pub key_type: KeyType,
    pub p: BigUint,
    pub q: BigUint,
    pub g: BigUint,
    pub y: BigUint,
    /// Private exponent; absent for public-only records
    pub x: Option<BigUint>,
    pub fingerprint: String,
}

impl KeyRecord {
    /// Build a DSA record, deriving its fingerprint from the public part.
    /// Name and resource are trimmed, matching what extraction produces.
    pub fn new(
        name: impl Into<String>,
        resource: impl Into<String>,
        protocol: impl Into<String>,
        public: DsaPublic,
        x: Option<BigUint>,
        fingerprinter: &dyn Fingerprinter,
    ) -> Self {
        let fingerprint = fingerprinter.fingerprint(&public);
        let DsaPublic { y, g, p, q } = public;
        KeyRecord {
            name: name.into().trim().to_string(),
            resource: resource.into().trim().to_string(),
            protocol: protocol.into(),
            key_type: KeyType::Dsa,
            p,
            q,
            g,
            y,
            x,
            fingerprint,
        }
    }

    pub fn public(&self) -> DsaPublic {
        DsaPublic {
            y: self.y.clone(),
            g: self.g.clone(),
            p: self.p.clone(),
            q: self.q.clone(),
        }
    }

    pub fn has_secret(&self) -> bool {
        self.x.is_some()
    }

    /// `name/resource`, or just `name` when there is no resource
    pub fn full_name(&self) -> String {
        if self.resource.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.name, self.resource)
        }
    }
}

/// Split `name/resource` on the first `/`
pub fn split_name(full: &str) -> (String, String) {
    match full.split_once('/') {
        Some((name, resource)) => (name.trim().to_string(), resource.trim().to_string()),
        None => (full.trim().to_string(), String::new()),
    }
}

/// Fields collected for a named account
#[derive(Debug, Default)]
struct PartialRecord {
    name: String,
    resource: String,
    protocol: Option<String>,
    key_type: Option<KeyType>,
    p: Option<BigUint>,
    q: Option<BigUint>,
    g: Option<BigUint>,
    y: Option<BigUint>,
    x: Option<BigUint>,
}

impl PartialRecord {
    fn named(full: &str) -> Self {
        let (name, resource) = split_name(full);
        PartialRecord {
            name,
            resource,
            ..Default::default()
        }
    }

    fn apply_private_key(&mut self, key: &SExp) {
        if key.tag().as_deref() != Some("dsa") {
            debug!(account = %self.name, "ignoring non-DSA private key");
            return;
        }
        self.key_type = Some(KeyType::Dsa);

        let forms = key.as_list().unwrap_or_default();
        for form in forms.iter().skip(1).take(DSA_WINDOW) {
            let value = form.tagged_value().and_then(SExp::as_atom).and_then(Atom::as_uint);
            let slot = match form.tag().as_deref() {
                Some("p") => &mut self.p,
                Some("q") => &mut self.q,
                Some("g") => &mut self.g,
                Some("y") => &mut self.y,
                Some("x") => &mut self.x,
                _ => continue,
            };
            if value.is_some() {
                *slot = value;
            }
        }
    }

    fn finish(self, fingerprinter: &dyn Fingerprinter) -> Result<KeyRecord> {
        let mut missing = Vec::new();
        if self.protocol.is_none() {
            missing.push("protocol");
        }
        if self.key_type.is_none() {
            missing.push("private-key");
        }
        for (field, value) in [("p", &self.p), ("q", &self.q), ("g", &self.g), ("y", &self.y)] {
            if value.is_none() {
                missing.push(field);
            }
        }

        match (self.protocol, self.p, self.q, self.g, self.y) {
            (Some(protocol), Some(p), Some(q), Some(g), Some(y)) if missing.is_empty() => {
                Ok(KeyRecord::new(
                    self.name,
                    self.resource,
                    protocol,
                    DsaPublic { y, g, p, q },
                    self.x,
                    fingerprinter,
                ))
            }
            _ => Err(KeystoreError::IncompleteRecord {
                account: Some(self.name),
                missing,
            }),
        }
    }
}

/// Per-account scan state: fields only attach once a name has been seen
#[derive(Debug)]
enum AccountState {
    NoName,
    Named(PartialRecord),
}

impl AccountState {
    fn accept(self, field: &SExp) -> Self {
        let tag = field.tag();
        match (self, tag.as_deref()) {
            (state, Some("name")) => match field_text(field) {
                Some(full) => AccountState::Named(PartialRecord::named(&full)),
                None => {
                    warn!("account name is not text; ignoring it");
                    state
                }
            },
            (AccountState::NoName, Some(tag)) => {
                debug!(tag, "dropping field that precedes the account name");
                AccountState::NoName
            }
            (AccountState::Named(mut record), Some("protocol")) => {
                record.protocol = field_text(field);
                AccountState::Named(record)
            }
            (AccountState::Named(mut record), Some("private-key")) => {
                if let Some(key) = field.tagged_value() {
                    record.apply_private_key(key);
                }
                AccountState::Named(record)
            }
            (state, _) => state,
        }
    }

    fn finish(self, fingerprinter: &dyn Fingerprinter) -> Result<KeyRecord> {
        match self {
            AccountState::NoName => Err(KeystoreError::IncompleteRecord {
                account: None,
                missing: vec!["name"],
            }),
            AccountState::Named(record) => record.finish(fingerprinter),
        }
    }
}

fn field_text(field: &SExp) -> Option<String> {
    field
        .tagged_value()
        .and_then(SExp::as_atom)
        .and_then(Atom::as_text)
        .map(|text| text.into_owned())
}

fn extract_account(account: &SExp, fingerprinter: &dyn Fingerprinter) -> Result<KeyRecord> {
    account
        .as_list()
        .unwrap_or_default()
        .iter()
        .skip(1)
        .fold(AccountState::NoName, AccountState::accept)
        .finish(fingerprinter)
}

/// Extract every complete `account` record, also returning the errors for
/// the accounts that were dropped
pub fn extract_with_rejects(
    tree: &SExp,
    fingerprinter: &dyn Fingerprinter,
) -> (KeyMap, Vec<KeystoreError>) {
    let mut records = KeyMap::new();
    let mut rejects = Vec::new();

    let children = tree.as_list().unwrap_or_default();
    for account in children.iter().filter(|c| c.is_list() && c.tag().as_deref() == Some("account")) {
        match extract_account(account, fingerprinter) {
            Ok(record) => {
                debug!(name = %record.name, fingerprint = %record.fingerprint, "extracted key");
                if records.insert(record.name.clone(), record).is_some() {
                    debug!("later account replaced an earlier one with the same name");
                }
            }
            Err(e) => {
                warn!("dropping account: {}", e);
                rejects.push(e);
            }
        }
    }

    (records, rejects)
}

/// Extract every complete `account` record from a parsed key store
pub fn extract(tree: &SExp, fingerprinter: &dyn Fingerprinter) -> KeyMap {
    extract_with_rejects(tree, fingerprinter).0
}

/// Parse a private key store document and extract its records
pub fn parse_keys(input: &str, fingerprinter: &dyn Fingerprinter) -> Result<KeyMap> {
    let tree = parse(input)?;
    Ok(extract(&tree, fingerprinter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::OtrFingerprinter;

    fn fp(key: &DsaPublic) -> String {
        format!("{:x}-{:x}-{:x}-{:x}", key.y, key.g, key.p, key.q)
    }

    const ACCOUNT: &str = r#"
(privkeys
 (account
  (name "alice@jabber.org/Laptop")
  (protocol prpl-jabber)
  (private-key
   (dsa
    (p #17#)
    (q #0B#)
    (g #04#)
    (y #09#)
    (x #03#)))))
"#;

    #[test]
    fn test_extract_account() {
        let keys = parse_keys(ACCOUNT, &fp).unwrap();
        let record = &keys["alice@jabber.org"];
        assert_eq!(record.name, "alice@jabber.org");
        assert_eq!(record.resource, "Laptop");
        assert_eq!(record.protocol, "prpl-jabber");
        assert_eq!(record.key_type, KeyType::Dsa);
        assert_eq!(record.p, BigUint::from(0x17u32));
        assert_eq!(record.q, BigUint::from(0x0bu32));
        assert_eq!(record.g, BigUint::from(4u32));
        assert_eq!(record.y, BigUint::from(9u32));
        assert_eq!(record.x, Some(BigUint::from(3u32)));
        assert_eq!(record.fingerprint, "9-4-17-b");
        assert_eq!(record.full_name(), "alice@jabber.org/Laptop");
    }

    #[test]
    fn test_public_only_record() {
        let input = ACCOUNT.replace("(x #03#)", "");
        let keys = parse_keys(&input, &fp).unwrap();
        assert!(!keys["alice@jabber.org"].has_secret());
    }

    #[test]
    fn test_fields_before_name_are_dropped() {
        let input = r#"(privkeys (account (protocol prpl-jabber) (name "bob")
            (private-key (dsa (p #1#) (q #2#) (g #3#) (y #4#)))))"#;
        let tree = parse(input).unwrap();
        let (keys, rejects) = extract_with_rejects(&tree, &fp);
        assert!(keys.is_empty());
        assert_eq!(
            rejects,
            vec![KeystoreError::IncompleteRecord {
                account: Some("bob".to_string()),
                missing: vec!["protocol"],
            }]
        );
    }

    #[test]
    fn test_second_name_restarts_record() {
        let input = r#"(privkeys (account (name "first") (protocol prpl-irc) (name "second")
            (protocol prpl-msn) (private-key (dsa (p #1#) (q #2#) (g #3#) (y #4#)))))"#;
        let keys = parse_keys(input, &fp).unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys["second"].protocol, "prpl-msn");
    }

    #[test]
    fn test_incomplete_record_is_isolated() {
        let input = r#"(privkeys
            (account (name "broken") (protocol prpl-jabber) (private-key (dsa (p #1#) (q #2#))))
            (account (name "nameless-fields-only"))
            (account (protocol prpl-jabber))
            (account (name "ok") (protocol prpl-jabber) (private-key (dsa (p #1#) (q #2#) (g #3#) (y #4#)))))"#;
        let tree = parse(input).unwrap();
        let (keys, rejects) = extract_with_rejects(&tree, &fp);

        assert_eq!(keys.keys().collect::<Vec<_>>(), vec!["ok"]);
        assert_eq!(rejects.len(), 3);
        assert_eq!(
            rejects[0],
            KeystoreError::IncompleteRecord {
                account: Some("broken".to_string()),
                missing: vec!["g", "y"],
            }
        );
        assert_eq!(
            rejects[2],
            KeystoreError::IncompleteRecord {
                account: None,
                missing: vec!["name"],
            }
        );
        assert!(rejects.iter().all(|e| !e.is_fatal()));
    }

    #[test]
    fn test_dsa_window_is_five_forms() {
        let input = r#"(privkeys (account (name "w") (protocol p)
            (private-key (dsa (y #4#) (comment "c") (p #1#) (q #2#) (g #3#) (x #5#)))))"#;
        let keys = parse_keys(input, &fp).unwrap();
        let record = &keys["w"];
        // the sixth form falls outside the window
        assert_eq!(record.x, None);
        assert_eq!(record.y, BigUint::from(4u32));
        assert_eq!(record.g, BigUint::from(3u32));
    }

    #[test]
    fn test_non_dsa_key_is_incomplete() {
        let input = r#"(privkeys (account (name "r") (protocol p) (private-key (rsa (n #1#) (e #2#)))))"#;
        let tree = parse(input).unwrap();
        let (keys, rejects) = extract_with_rejects(&tree, &fp);
        assert!(keys.is_empty());
        assert!(matches!(
            &rejects[0],
            KeystoreError::IncompleteRecord { missing, .. } if missing.contains(&"private-key")
        ));
    }

    #[test]
    fn test_non_account_children_are_ignored() {
        let input = r#"(privkeys (version 2) token (account (name "a") (protocol p)
            (private-key (dsa (p #1#) (q #2#) (g #3#) (y #4#)))))"#;
        let keys = parse_keys(input, &fp).unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn test_duplicate_names_last_wins() {
        let input = r#"(privkeys
            (account (name "a/one") (protocol first) (private-key (dsa (p #1#) (q #2#) (g #3#) (y #4#))))
            (account (name "a/two") (protocol second) (private-key (dsa (p #1#) (q #2#) (g #3#) (y #4#)))))"#;
        let keys = parse_keys(input, &fp).unwrap();
        assert_eq!(keys["a"].protocol, "second");
        assert_eq!(keys["a"].resource, "two");
    }

    #[test]
    fn test_name_split() {
        assert_eq!(split_name("a@b.org"), ("a@b.org".to_string(), String::new()));
        assert_eq!(split_name(" a@b.org / Home "), ("a@b.org".to_string(), "Home".to_string()));
        assert_eq!(split_name("a/b/c"), ("a".to_string(), "b/c".to_string()));
    }

    #[test]
    fn test_fingerprint_ignores_secret() {
        let with_x = parse_keys(ACCOUNT, &OtrFingerprinter).unwrap();
        let without_x = parse_keys(&ACCOUNT.replace("(x #03#)", "(x #FF#)"), &OtrFingerprinter).unwrap();
        assert_eq!(
            with_x["alice@jabber.org"].fingerprint,
            without_x["alice@jabber.org"].fingerprint
        );
    }

    #[test]
    fn test_raw_and_base64_numbers() {
        let input = r#"(privkeys (account (name 5:carol) (protocol prpl-jabber)
            (private-key (dsa (p 1:A) (q |AQ==|) (g #3#) (y #4#)))))"#;
        let keys = parse_keys(input, &fp).unwrap();
        assert_eq!(keys["carol"].p, BigUint::from(0x41u32));
        assert_eq!(keys["carol"].q, BigUint::from(1u32));
    }
}
