use num_bigint::BigUint;
use otr_keystore::extract::split_name;
use otr_keystore::serializer::{NARROW_HEX_DIGITS, WIDE_HEX_DIGITS};
use otr_keystore::{
    extract, extract_with_rejects, parse, parse_keys, serialize, DsaPublic, Fingerprinter,
    KeyMap, KeyRecord, KeystoreError, OtrFingerprinter,
};

fn hex(digits: &str) -> BigUint {
    BigUint::parse_bytes(digits.as_bytes(), 16).unwrap()
}

fn p() -> BigUint {
    hex(&"F7E1A085D69B3DDE".repeat(16))
}

fn q() -> BigUint {
    hex("9760508F15230BCCB292B982A2EB840BF0581CF5")
}

fn g() -> BigUint {
    hex(&"0F7E1A085D69B3DD".repeat(16))
}

fn y() -> BigUint {
    hex(&"1C4E3BB2A6D9F0E7".repeat(16))
}

fn x() -> BigUint {
    hex("4C0AC2E3EB5E3F6DA1E0B4C9D8F7A6B5C4D3E2F1")
}

fn public() -> DsaPublic {
    DsaPublic { y: y(), g: g(), p: p(), q: q() }
}

/// A key store laid out the way OTR clients write it
fn client_key_store() -> String {
    format!(
        "(privkeys\n (account\n(name \"alice@jabber.org/Laptop\")\n(protocol prpl-jabber)\n\
         (private-key \n (dsa \n  (p #00{p:X}#)\n  (q #00{q:X}#)\n  (g #00{g:X}#)\n  (y #{y:X}#)\n  (x #{x:X}#)\n  )\n )\n )\n\
         (account\n(name \"bob@irc.example.net\")\n(protocol prpl-irc)\n\
         (private-key \n (dsa \n  (p #{p:X}#)\n  (q #{q:X}#)\n  (g #{g:X}#)\n  (y #{y:X}#)\n  )\n )\n )\n)\n",
        p = p(),
        q = q(),
        g = g(),
        y = y(),
        x = x(),
    )
}

#[test]
fn test_client_key_store() {
    let keys = parse_keys(&client_key_store(), &OtrFingerprinter).unwrap();
    assert_eq!(keys.len(), 2);

    let alice = &keys["alice@jabber.org"];
    assert_eq!(alice.resource, "Laptop");
    assert_eq!(alice.protocol, "prpl-jabber");
    assert_eq!(alice.p, p());
    assert_eq!(alice.q, q());
    assert_eq!(alice.x, Some(x()));
    assert_eq!(alice.fingerprint, OtrFingerprinter.fingerprint(&public()));

    let bob = &keys["bob@irc.example.net"];
    assert!(!bob.has_secret());
    // same public key, same fingerprint
    assert_eq!(bob.fingerprint, alice.fingerprint);
}

#[test]
fn test_round_trip() {
    let record = KeyRecord::new("alice@jabber.org", "", "prpl-jabber", public(), Some(x()), &OtrFingerprinter);
    let mut records = KeyMap::new();
    records.insert(record.name.clone(), record.clone());

    let text = serialize(&records).unwrap();
    let restored = extract(&parse(&text).unwrap(), &OtrFingerprinter);

    assert_eq!(restored.len(), 1);
    assert_eq!(restored["alice@jabber.org"], record);
}

#[test]
fn test_round_trip_of_client_store_keeps_private_accounts() {
    let keys = parse_keys(&client_key_store(), &OtrFingerprinter).unwrap();
    let text = serialize(&keys).unwrap();

    assert_eq!(text.matches("(account").count(), 1);
    let restored = parse_keys(&text, &OtrFingerprinter).unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored["alice@jabber.org"], keys["alice@jabber.org"]);
}

#[test]
fn test_serialized_widths() {
    let record = KeyRecord::new("w", "", "prpl-jabber", public(), Some(x()), &OtrFingerprinter);
    let mut records = KeyMap::new();
    records.insert(record.name.clone(), record);
    let text = serialize(&records).unwrap();

    for line in text.lines().map(str::trim).filter(|l| l.contains('#')) {
        let digits = line.split('#').nth(1).unwrap();
        let expected = match &line[1..2] {
            "p" | "g" | "y" => WIDE_HEX_DIGITS,
            "q" | "x" => NARROW_HEX_DIGITS,
            other => panic!("unexpected field {other}"),
        };
        assert_eq!(digits.len(), expected, "{line}");
        assert!(digits.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }
}

#[test]
fn test_length_invariant() {
    let cases = [
        ("(name 4:alice)", false),
        ("(name 6:alice)", false),
        ("(name 5:alice)", true),
        ("(name 4\"alice\")", false),
        ("(name 6\"alice\")", false),
        ("(name 5\"alice\")", true),
        ("(blob 4|aGVsbG8=|)", false),
        ("(blob 6|aGVsbG8=|)", false),
        ("(blob 5|aGVsbG8=|)", true),
    ];

    for (input, ok) in cases {
        match parse(input) {
            Ok(_) => assert!(ok, "{input} should fail"),
            Err(KeystoreError::MalformedInput { .. }) => assert!(!ok, "{input} should parse"),
            Err(other) => panic!("unexpected error for {input}: {other:?}"),
        }
    }
}

#[test]
fn test_protocol_before_name_is_lost() {
    let input = format!(
        "(privkeys (account (protocol prpl-jabber) (name \"carol\") \
         (private-key (dsa (p #{:X}#) (q #{:X}#) (g #{:X}#) (y #{:X}#)))))",
        p(),
        q(),
        g(),
        y()
    );
    let (keys, rejects) = extract_with_rejects(&parse(&input).unwrap(), &OtrFingerprinter);

    assert!(keys.is_empty());
    assert_eq!(
        rejects,
        vec![KeystoreError::IncompleteRecord {
            account: Some("carol".to_string()),
            missing: vec!["protocol"],
        }]
    );
}

#[test]
fn test_fingerprint_depends_on_public_part_only() {
    let fp = OtrFingerprinter;
    let base = fp.fingerprint(&public());
    assert_eq!(base, fp.fingerprint(&public()));

    let variants = [
        DsaPublic { y: y() + 1u32, ..public() },
        DsaPublic { g: g() + 1u32, ..public() },
        DsaPublic { p: p() + 1u32, ..public() },
        DsaPublic { q: q() + 1u32, ..public() },
    ];
    for variant in &variants {
        assert_ne!(fp.fingerprint(variant), base);
    }

    let with_x = KeyRecord::new("a", "", "p", public(), Some(x()), &fp);
    let without_x = KeyRecord::new("a", "", "p", public(), None, &fp);
    assert_eq!(with_x.fingerprint, without_x.fingerprint);
}

#[test]
fn test_custom_fingerprinter() {
    let short = |key: &DsaPublic| format!("{:x}", &key.q % 65536u32);
    let keys = parse_keys(&client_key_store(), &short).unwrap();
    assert_eq!(keys["alice@jabber.org"].fingerprint, "1cf5");
}

#[test]
fn test_malformed_store_aborts() {
    let mut text = client_key_store();
    text.push(')');
    assert!(matches!(
        parse_keys(&text, &OtrFingerprinter),
        Err(KeystoreError::MalformedInput { .. })
    ));

    let truncated = &client_key_store()[..100];
    assert!(parse_keys(truncated, &OtrFingerprinter).unwrap_err().is_fatal());
}

#[test]
fn test_name_resource_split() {
    assert_eq!(split_name("alice@jabber.org/Laptop"), ("alice@jabber.org".into(), "Laptop".into()));
    assert_eq!(split_name("alice@jabber.org"), ("alice@jabber.org".into(), String::new()));
}

#[test]
fn test_padded_name_round_trips() {
    let record = KeyRecord::new(" alice ", " Home ", "prpl-jabber", public(), Some(x()), &OtrFingerprinter);
    assert_eq!((record.name.as_str(), record.resource.as_str()), ("alice", "Home"));

    let mut records = KeyMap::new();
    records.insert(record.name.clone(), record.clone());
    let restored = extract(&parse(&serialize(&records).unwrap()).unwrap(), &OtrFingerprinter);
    assert_eq!(restored["alice"], record);
}
