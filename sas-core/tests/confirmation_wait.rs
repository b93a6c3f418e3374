//! Confirmation tracking against stub ledgers.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use sas_core::confirmation::{ConfirmationError, ConfirmationTracker, TxState};
use sas_core::ledger::TxStatusInfo;
use sas_core::models::{Role, Utxo};

#[test]
fn wait_times_out_while_transaction_stays_pending() {
    let engine = StubEngine::happy();
    let ledger = Arc::new(StubLedger {
        always_pending: true,
        ..Default::default()
    });
    let sas = client(Role::Delegate, engine, ledger);

    let started = std::time::Instant::now();
    let err = sas
        .wait_for_confirmation(&"bb".repeat(32), 1, Some(Duration::from_secs(1)))
        .unwrap_err();

    assert!(started.elapsed() >= Duration::from_secs(1));
    match err {
        sas_core::SasError::ConfirmationTimeout {
            elapsed_secs,
            last_confirmations,
            ..
        } => {
            assert!(elapsed_secs >= 1);
            assert_eq!(last_confirmations, 0);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[test]
fn unknown_transaction_fails_after_three_polls() {
    let ledger = StubLedger::new();
    let tracker = ConfirmationTracker::with_poll_interval(ledger, Duration::from_millis(5));

    let err = tracker
        .wait_for_confirmation(&"bb".repeat(32), 1, Some(Duration::from_secs(30)))
        .unwrap_err();
    assert!(matches!(err, ConfirmationError::NotFound(_)));
}

#[test]
fn wait_returns_once_target_depth_is_reached() {
    let ledger = Arc::new(StubLedger {
        tip_height: 102,
        ..Default::default()
    });
    ledger.statuses.lock().unwrap().insert(
        "bb".repeat(32),
        TxStatusInfo {
            confirmed: true,
            block_height: Some(100),
            block_hash: Some("ff".repeat(32)),
            block_time: None,
        },
    );

    let tracker = ConfirmationTracker::with_poll_interval(ledger, Duration::from_millis(5));
    let status = tracker
        .wait_for_confirmation(&"bb".repeat(32), 3, Some(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(status.state, TxState::Confirmed);
    assert_eq!(status.confirmations, 3);
    assert_eq!(status.block_height, Some(100));
}

#[test]
fn status_of_unknown_transaction_is_not_found() {
    let engine = StubEngine::happy();
    let ledger = StubLedger::new();
    let sas = client(Role::Delegate, engine, ledger);

    let status = sas.confirmation_status(&"bb".repeat(32));
    assert_eq!(status.state, TxState::NotFound);
    assert_eq!(status.confirmations, 0);
}

#[test]
fn deep_confirmation_after_six_blocks() {
    let engine = StubEngine::happy();
    let ledger = Arc::new(StubLedger {
        tip_height: 105,
        ..Default::default()
    });
    ledger.statuses.lock().unwrap().insert(
        "bb".repeat(32),
        TxStatusInfo {
            confirmed: true,
            block_height: Some(100),
            block_hash: None,
            block_time: None,
        },
    );
    ledger
        .utxos
        .lock()
        .unwrap()
        .insert(VAULT_ADDRESS.to_string(), vec![Utxo::new("aa".repeat(32), 0, 2000)]);
    let sas = client(Role::Delegate, engine, ledger);

    let status = sas.confirmation_status(&"bb".repeat(32));
    assert_eq!(status.state, TxState::DeepConfirmed);
    assert_eq!(status.confirmations, 6);
}
