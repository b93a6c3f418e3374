//! Certificate issuance end to end against stub backends.

mod common;

use common::*;
use sas_core::models::{Role, Utxo};
use sas_core::{protocol, SasError};

const CID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

fn vault_utxo(value: u64) -> Utxo {
    Utxo::new("aa".repeat(32), 0, value)
}

#[test]
fn delegate_issuance_produces_covenant_output_set() {
    let engine = StubEngine::happy();
    let ledger = StubLedger::with_utxo(VAULT_ADDRESS, vault_utxo(100_000));
    let sas = client(Role::Delegate, engine.clone(), ledger.clone());

    let result = sas.issue_certificate(CID);
    assert!(result.success, "issue failed: {:?}", result.error());
    assert_eq!(result.txid.as_deref(), Some(broadcast_txid().as_str()));
    assert_eq!(result.raw_hex.as_deref(), Some("ab".repeat(64).as_str()));
    assert!(result
        .explorer_url
        .as_deref()
        .unwrap()
        .ends_with(&broadcast_txid()));

    // The full pipeline ran once, in order, and broadcast exactly once.
    assert_eq!(
        engine.call_names(),
        vec!["create", "bind", "dry-run", "verify-run", "finalize", "extract"]
    );
    assert_eq!(ledger.broadcast_count(), 1);

    // Covenant-enforced output order: change, certificate, null-data, fee.
    let outputs = engine.created_outputs.lock().unwrap()[0].clone();
    assert_eq!(outputs.len(), 4);

    assert_eq!(outputs[0].address, VAULT_ADDRESS);
    assert!((outputs[0].amount - 0.000_989_54).abs() < 1e-12); // 100000 - 546 - 500

    assert_eq!(outputs[1].address, CERT_ADDRESS);
    assert!((outputs[1].amount - 0.000_005_46).abs() < 1e-12);

    let payload_hex = outputs[2].address.strip_prefix("data:").unwrap();
    assert_eq!(outputs[2].amount, 0.0);
    match protocol::decode_hex(payload_hex) {
        Some(protocol::Payload::Attest { cid }) => assert_eq!(cid, CID),
        other => panic!("expected ATTEST record, got {:?}", other),
    }

    assert_eq!(outputs[3].address, "fee");
    assert!((outputs[3].amount - 0.000_005).abs() < 1e-12);
}

#[test]
fn delegate_signs_through_the_delegate_issue_path() {
    let engine = StubEngine::happy();
    let ledger = StubLedger::with_utxo(VAULT_ADDRESS, vault_utxo(100_000));
    let sas = client(Role::Delegate, engine.clone(), ledger);

    assert!(sas.issue_certificate(CID).success);

    // Right-Right tag: the real witness must start with bits 11.
    let witnesses = engine.verify_witnesses.lock().unwrap();
    let first_byte = u8::from_str_radix(&witnesses[0][..2], 16).unwrap();
    assert_eq!(first_byte & 0b1100_0000, 0b1100_0000);
}

#[test]
fn admin_signs_through_the_admin_issue_path() {
    let engine = StubEngine::happy();
    let ledger = StubLedger::with_utxo(VAULT_ADDRESS, vault_utxo(100_000));
    let sas = client(Role::Admin, engine.clone(), ledger);

    assert!(sas.issue_certificate(CID).success);

    // Right-Left tag: bits 10.
    let witnesses = engine.verify_witnesses.lock().unwrap();
    let first_byte = u8::from_str_radix(&witnesses[0][..2], 16).unwrap();
    assert_eq!(first_byte & 0b1100_0000, 0b1000_0000);
}

#[test]
fn insufficient_funds_fails_before_any_engine_call() {
    let engine = StubEngine::happy();
    let ledger = StubLedger::with_utxo(VAULT_ADDRESS, vault_utxo(1_591));
    let sas = client(Role::Delegate, engine.clone(), ledger.clone());

    let result = sas.issue_certificate(CID);
    assert!(!result.success);
    assert!(matches!(
        result.error(),
        Some(SasError::InsufficientFunds {
            required: 1592,
            available: 1591
        })
    ));
    assert!(engine.call_names().is_empty());
    assert_eq!(ledger.broadcast_count(), 0);
}

#[test]
fn empty_vault_fails_before_any_engine_call() {
    let engine = StubEngine::happy();
    let ledger = StubLedger::new();
    let sas = client(Role::Delegate, engine.clone(), ledger);

    let result = sas.issue_certificate(CID);
    assert!(matches!(
        result.error(),
        // The balance precondition trips first on an empty vault.
        Some(SasError::InsufficientFunds { available: 0, .. })
    ));
    assert!(engine.call_names().is_empty());
}

#[test]
fn oversized_cid_is_rejected() {
    let engine = StubEngine::happy();
    let ledger = StubLedger::with_utxo(VAULT_ADDRESS, vault_utxo(100_000));
    let sas = client(Role::Delegate, engine.clone(), ledger);

    let result = sas.issue_certificate(&"x".repeat(80));
    assert!(matches!(
        result.error(),
        Some(SasError::PayloadTooLarge { size: 80, max: 75 })
    ));
    assert!(engine.call_names().is_empty());
}

#[test]
fn failed_verification_run_never_broadcasts() {
    // Pre-broadcast atomicity: a step-7 failure leaves no on-chain state.
    let engine = StubEngine::failing_verification(&["bip_0340_verify"]);
    let ledger = StubLedger::with_utxo(VAULT_ADDRESS, vault_utxo(100_000));
    let sas = client(Role::Delegate, engine.clone(), ledger.clone());

    let result = sas.issue_certificate(CID);
    assert!(!result.success);
    match result.error() {
        Some(SasError::Engine(e)) => {
            assert!(e.to_string().contains("bip_0340_verify"), "got: {}", e)
        }
        other => panic!("expected engine error, got {:?}", other),
    }

    assert_eq!(ledger.broadcast_count(), 0);
    let calls = engine.call_names();
    assert!(!calls.contains(&"finalize"));
    assert!(!calls.contains(&"extract"));
}
