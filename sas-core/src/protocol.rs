//! SAS null-data record codec
//!
//! Attestation records are carried in a null-data (OP_RETURN) output:
//!
//! ```text
//! ┌───────┬─────────┬──────────┬─────────────────────────────┐
//! │ MAGIC │ VERSION │  OPCODE  │            BODY             │
//! │ "SAS" │  0x01   │   0x01   │   content id / revocation   │
//! ├───────┼─────────┼──────────┼─────────────────────────────┤
//! │3 bytes│ 1 byte  │  1 byte  │        variable, <= 75      │
//! └───────┴─────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! REVOKE bodies are `txid(32) || vout(u16 BE)` optionally followed by a
//! one-byte reason code, optionally followed by a 32-byte replacement txid.
//! Only the exact lengths 34, 35 and 67 are accepted; anything in between is
//! a truncated record and decodes to `None`.

use thiserror::Error;

use crate::constants::{HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// Three-byte system tag at the start of every record.
pub const MAGIC: [u8; 3] = *b"SAS";

/// Current record version.
pub const VERSION: u8 = 0x01;

pub const OP_ATTEST: u8 = 0x01;
pub const OP_REVOKE: u8 = 0x02;
pub const OP_UPDATE: u8 = 0x03;
pub const OP_DELEGATE: u8 = 0x10;
pub const OP_UNDELEGATE: u8 = 0x11;

/// Revocation reason codes carried in the optional REVOKE extension byte.
const REASON_NAMES: &[(u8, &str)] = &[
    (1, "DATA_ERROR"),
    (2, "DUPLICATE"),
    (3, "FRAUD_SUSPECTED"),
    (4, "FRAUD_CONFIRMED"),
    (5, "HOLDER_REQUEST"),
    (6, "REISSUE_REPLACEMENT"),
    (7, "ADMINISTRATIVE"),
    (8, "LEGAL_ORDER"),
    (9, "KEY_COMPROMISE"),
    (10, "SUSPENDED"),
    (11, "CRYPTO_DEPRECATED"),
    (12, "PROCESS_ERROR"),
];

/// Name of a well-known revocation reason code.
pub fn reason_name(code: u8) -> Option<&'static str> {
    REASON_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PayloadError {
    #[error("{what} is {size} bytes, exceeds the {max}-byte null-data body limit")]
    TooLarge {
        what: &'static str,
        size: usize,
        max: usize,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// A decoded SAS record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Attest {
        cid: String,
    },
    Revoke {
        txid: String,
        vout: u32,
        reason_code: Option<u8>,
        replacement_txid: Option<String>,
    },
    Update {
        cid: String,
    },
}

impl Payload {
    /// Content id, for ATTEST and UPDATE records.
    pub fn cid(&self) -> Option<&str> {
        match self {
            Payload::Attest { cid } | Payload::Update { cid } => Some(cid),
            Payload::Revoke { .. } => None,
        }
    }
}

fn header(opcode: u8) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_SIZE);
    bytes.extend_from_slice(&MAGIC);
    bytes.push(VERSION);
    bytes.push(opcode);
    bytes
}

/// A CID is carried as raw bytes when it parses as hex, else as UTF-8.
fn cid_bytes(cid: &str) -> Vec<u8> {
    if cid.len() % 2 == 0 && !cid.is_empty() {
        if let Ok(bytes) = hex::decode(cid) {
            return bytes;
        }
    }
    cid.as_bytes().to_vec()
}

fn check_body_size(what: &'static str, body: &[u8]) -> Result<(), PayloadError> {
    if body.len() > MAX_PAYLOAD_SIZE {
        return Err(PayloadError::TooLarge {
            what,
            size: body.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    Ok(())
}

fn txid_bytes(what: &str, txid: &str) -> Result<[u8; 32], PayloadError> {
    if txid.len() != 64 {
        return Err(PayloadError::InvalidArgument(format!(
            "{} must be 64 hex characters, got {}",
            what,
            txid.len()
        )));
    }
    let decoded = hex::decode(txid)
        .map_err(|_| PayloadError::InvalidArgument(format!("{} is not valid hex", what)))?;
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&decoded);
    Ok(bytes)
}

/// Encode an ATTEST record binding a certificate to a content id.
pub fn encode_attest(cid: &str) -> Result<Vec<u8>, PayloadError> {
    let body = cid_bytes(cid);
    check_body_size("CID", &body)?;
    let mut record = header(OP_ATTEST);
    record.extend_from_slice(&body);
    Ok(record)
}

/// Encode an UPDATE record carrying a certificate's new content id.
pub fn encode_update(cid: &str) -> Result<Vec<u8>, PayloadError> {
    let body = cid_bytes(cid);
    check_body_size("CID", &body)?;
    let mut record = header(OP_UPDATE);
    record.extend_from_slice(&body);
    Ok(record)
}

/// Encode a REVOKE record naming the certificate outpoint being revoked.
///
/// A replacement txid may only be given together with a reason code.
pub fn encode_revoke(
    txid: &str,
    vout: u32,
    reason_code: Option<u8>,
    replacement_txid: Option<&str>,
) -> Result<Vec<u8>, PayloadError> {
    if replacement_txid.is_some() && reason_code.is_none() {
        return Err(PayloadError::InvalidArgument(
            "replacement_txid requires reason_code".to_string(),
        ));
    }
    let vout: u16 = vout.try_into().map_err(|_| {
        PayloadError::InvalidArgument(format!("vout {} does not fit in two bytes", vout))
    })?;

    let mut body = Vec::with_capacity(67);
    body.extend_from_slice(&txid_bytes("txid", txid)?);
    body.extend_from_slice(&vout.to_be_bytes());
    if let Some(code) = reason_code {
        body.push(code);
    }
    if let Some(replacement) = replacement_txid {
        body.extend_from_slice(&txid_bytes("replacement_txid", replacement)?);
    }

    check_body_size("REVOKE body", &body)?;
    let mut record = header(OP_REVOKE);
    record.extend_from_slice(&body);
    Ok(record)
}

/// Decode a SAS record. Returns `None` on wrong magic, wrong version, an
/// unknown opcode, or a body length outside the canonical set for the opcode.
pub fn decode(data: &[u8]) -> Option<Payload> {
    if data.len() < HEADER_SIZE {
        return None;
    }
    if data[..3] != MAGIC {
        return None;
    }
    if data[3] != VERSION {
        return None;
    }
    let opcode = data[4];
    let body = &data[HEADER_SIZE..];

    match opcode {
        OP_ATTEST | OP_UPDATE => {
            let cid = match std::str::from_utf8(body) {
                Ok(text) => text.to_string(),
                Err(_) => hex::encode(body),
            };
            Some(match opcode {
                OP_ATTEST => Payload::Attest { cid },
                _ => Payload::Update { cid },
            })
        }
        OP_REVOKE => {
            // Accepted body lengths:
            //   34 = txid + vout
            //   35 = txid + vout + reason
            //   67 = txid + vout + reason + replacement txid
            // 36..=66 is a partial record and anything longer is garbage.
            let (reason_code, replacement_txid) = match body.len() {
                34 => (None, None),
                35 => (Some(body[34]), None),
                67 => (Some(body[34]), Some(hex::encode(&body[35..67]))),
                _ => return None,
            };
            let txid = hex::encode(&body[..32]);
            let vout = u16::from_be_bytes([body[32], body[33]]) as u32;
            Some(Payload::Revoke {
                txid,
                vout,
                reason_code,
                replacement_txid,
            })
        }
        _ => None,
    }
}

/// Decode a hex-encoded SAS record.
pub fn decode_hex(data: &str) -> Option<Payload> {
    decode(&hex::decode(data).ok()?)
}

/// Whether the data starts with a SAS header.
pub fn is_sas_payload(data: &[u8]) -> bool {
    data.len() >= HEADER_SIZE && data[..3] == MAGIC
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const TXID: &str = "dddddddddddddddddddddddddddddddddddddddddddddddddddddddddddddddd";
    const REPLACEMENT: &str = "eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

    #[test]
    fn test_attest_round_trip_utf8_cid() {
        let cid = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
        let record = encode_attest(cid).unwrap();
        assert_eq!(&record[..3], b"SAS");
        assert_eq!(record[3], VERSION);
        assert_eq!(record[4], OP_ATTEST);
        assert_eq!(decode(&record), Some(Payload::Attest { cid: cid.into() }));
    }

    #[test]
    fn test_attest_hex_cid_is_carried_raw() {
        let record = encode_attest("deadbeef").unwrap();
        assert_eq!(&record[HEADER_SIZE..], &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_attest_rejects_oversized_cid() {
        let cid = "Q".repeat(76);
        assert!(matches!(
            encode_attest(&cid),
            Err(PayloadError::TooLarge { size: 76, .. })
        ));
        // 75 bytes is the last accepted size.
        assert!(encode_attest(&"Q".repeat(75)).is_ok());
    }

    #[test]
    fn test_update_round_trip() {
        let record = encode_update("QmNewVersion").unwrap();
        assert_eq!(record[4], OP_UPDATE);
        assert_eq!(
            decode(&record),
            Some(Payload::Update {
                cid: "QmNewVersion".into()
            })
        );
    }

    #[test]
    fn test_revoke_round_trip_all_forms() {
        // txid + vout only: 34-byte body
        let record = encode_revoke(TXID, 1, None, None).unwrap();
        assert_eq!(record.len(), HEADER_SIZE + 34);
        assert_eq!(
            decode(&record),
            Some(Payload::Revoke {
                txid: TXID.into(),
                vout: 1,
                reason_code: None,
                replacement_txid: None,
            })
        );

        // with reason: 35-byte body
        let record = encode_revoke(TXID, 1, Some(6), None).unwrap();
        assert_eq!(record.len(), HEADER_SIZE + 35);

        // with reason + replacement: 67-byte body
        let record = encode_revoke(TXID, 1, Some(6), Some(REPLACEMENT)).unwrap();
        assert_eq!(record.len(), HEADER_SIZE + 67);
        assert_eq!(
            decode(&record),
            Some(Payload::Revoke {
                txid: TXID.into(),
                vout: 1,
                reason_code: Some(6),
                replacement_txid: Some(REPLACEMENT.into()),
            })
        );
    }

    #[test]
    fn test_revoke_replacement_requires_reason() {
        assert!(matches!(
            encode_revoke(TXID, 1, None, Some(REPLACEMENT)),
            Err(PayloadError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_revoke_rejects_malformed_txids() {
        assert!(encode_revoke("abcd", 0, None, None).is_err());
        assert!(encode_revoke(&"g".repeat(64), 0, None, None).is_err());
        assert!(encode_revoke(TXID, 0, Some(1), Some("ee")).is_err());
    }

    #[test]
    fn test_revoke_rejects_oversized_vout() {
        assert!(encode_revoke(TXID, 0x1_0000, None, None).is_err());
        assert!(encode_revoke(TXID, 0xffff, None, None).is_ok());
    }

    #[test]
    fn test_decode_rejects_partial_revoke_bodies() {
        // Lengths 36..=66 are truncated replacement records.
        for extra in 1..=32 {
            let mut record = encode_revoke(TXID, 1, Some(6), None).unwrap();
            record.extend(std::iter::repeat(0xee).take(extra));
            if record.len() == HEADER_SIZE + 67 {
                assert!(decode(&record).is_some());
            } else {
                assert_eq!(decode(&record), None, "body length {}", 35 + extra);
            }
        }
        // Shorter than the minimum 34-byte body.
        let mut record = header(OP_REVOKE);
        record.extend_from_slice(&[0u8; 33]);
        assert_eq!(decode(&record), None);
    }

    #[test]
    fn test_decode_strictness() {
        assert_eq!(decode(b"SAS\x01"), None); // too short
        assert_eq!(decode(b"XYZ\x01\x01abc"), None); // wrong magic
        assert_eq!(decode(b"SAS\x02\x01abc"), None); // wrong version
        assert_eq!(decode(b"SAS\x01\x7fabc"), None); // unknown opcode
        assert_eq!(decode_hex("zz"), None); // not hex at all
    }

    #[test]
    fn test_delegation_opcodes_are_reserved_not_decoded() {
        let mut record = header(OP_DELEGATE);
        record.extend_from_slice(b"pubkey");
        assert_eq!(decode(&record), None);
    }

    #[test]
    fn test_reason_names() {
        assert_eq!(reason_name(6), Some("REISSUE_REPLACEMENT"));
        assert_eq!(reason_name(200), None);
    }

    #[test]
    fn test_is_sas_payload() {
        assert!(is_sas_payload(&encode_attest("Qm").unwrap()));
        assert!(!is_sas_payload(b"SA"));
        assert!(!is_sas_payload(b"nope\x01"));
    }

    proptest! {
        #[test]
        fn prop_attest_round_trip(cid in "[a-zA-Z][a-zA-Z0-9]{0,74}") {
            // Alphanumeric CIDs starting with a letter never parse as hex,
            // so the body is the UTF-8 text and must survive the round trip.
            prop_assume!(cid.len() <= 75);
            let record = encode_attest(&cid).unwrap();
            prop_assert_eq!(decode(&record), Some(Payload::Attest { cid }));
        }

        #[test]
        fn prop_revoke_round_trip(
            txid_bytes in proptest::array::uniform32(any::<u8>()),
            vout in 0u32..=0xffff,
            reason in proptest::option::of(any::<u8>()),
            replacement in proptest::option::of(proptest::array::uniform32(any::<u8>())),
        ) {
            prop_assume!(reason.is_some() || replacement.is_none());
            let txid = hex::encode(txid_bytes);
            let replacement_hex = replacement.map(hex::encode);
            let record = encode_revoke(&txid, vout, reason, replacement_hex.as_deref()).unwrap();
            prop_assert_eq!(
                decode(&record),
                Some(Payload::Revoke {
                    txid,
                    vout,
                    reason_code: reason,
                    replacement_txid: replacement_hex,
                })
            );
        }
    }
}
