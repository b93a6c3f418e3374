//! Shared stubs for the integration suites: a scriptable ledger and contract
//! engine, plus deterministic keys and a ready-made test configuration.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sas_core::contract::engine::{
    ContractEngine, EngineError, InputBinding, PstInput, PstOutput, RunResult,
};
use sas_core::contract::ContractInfo;
use sas_core::ledger::{Ledger, LedgerError, Outspend, TxInfo, TxStatusInfo};
use sas_core::models::{Role, Utxo};
use sas_core::{FeePolicy, MemorySigner, Network, Sas, SasConfig};

// BIP340 test keys: secrets 1 and 3 with their x-only public keys.
pub const ADMIN_SECRET: &str =
    "0000000000000000000000000000000000000000000000000000000000000001";
pub const ADMIN_PUBKEY: &str =
    "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
pub const DELEGATE_SECRET: &str =
    "0000000000000000000000000000000000000000000000000000000000000003";
pub const DELEGATE_PUBKEY: &str =
    "f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9";

pub const VAULT_ADDRESS: &str = "tex1pvault";
pub const CERT_ADDRESS: &str = "tex1pcert";

pub const SIG_ALL_HASH: &str =
    "cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc";

pub fn broadcast_txid() -> String {
    "bb".repeat(32)
}

pub fn test_config() -> SasConfig {
    SasConfig {
        network: Network::LiquidTestnet,
        asset_id: "44".repeat(32),
        admin_pubkey: ADMIN_PUBKEY.to_string(),
        delegate_pubkey: DELEGATE_PUBKEY.to_string(),
        vault: ContractInfo {
            address: VAULT_ADDRESS.to_string(),
            cmr: "11".repeat(32),
            script_pubkey: format!("5120{}", "11".repeat(32)),
            program: "dkMHvQ==".to_string(),
        },
        certificate: ContractInfo {
            address: CERT_ADDRESS.to_string(),
            cmr: "22".repeat(32),
            script_pubkey: format!("5120{}", "22".repeat(32)),
            program: "dkMHvq==".to_string(),
        },
        internal_key: "50929b74c1a04954b78b4b6035e97a5e078a5a0f28ec96d547bfee9ace803ac0"
            .to_string(),
        engine_binary: None,
        api_base_url: None,
        fees: FeePolicy::default(),
    }
}

/// Contract engine stub recording every call.
pub struct StubEngine {
    /// Step names in invocation order.
    pub calls: Mutex<Vec<&'static str>>,
    /// Output sets handed to `pst_create`.
    pub created_outputs: Mutex<Vec<Vec<PstOutput>>>,
    /// Witnesses handed to non-dry runs.
    pub verify_witnesses: Mutex<Vec<String>>,
    pub sig_all_hash: String,
    pub verify_success: bool,
    pub failing_jets: Vec<String>,
    pub raw_hex: String,
}

impl StubEngine {
    pub fn happy() -> Arc<Self> {
        Arc::new(StubEngine {
            calls: Mutex::new(Vec::new()),
            created_outputs: Mutex::new(Vec::new()),
            verify_witnesses: Mutex::new(Vec::new()),
            sig_all_hash: SIG_ALL_HASH.to_string(),
            verify_success: true,
            failing_jets: Vec::new(),
            raw_hex: "ab".repeat(64),
        })
    }

    pub fn failing_verification(jets: &[&str]) -> Arc<Self> {
        Arc::new(StubEngine {
            calls: Mutex::new(Vec::new()),
            created_outputs: Mutex::new(Vec::new()),
            verify_witnesses: Mutex::new(Vec::new()),
            sig_all_hash: SIG_ALL_HASH.to_string(),
            verify_success: false,
            failing_jets: jets.iter().map(|j| j.to_string()).collect(),
            raw_hex: "ab".repeat(64),
        })
    }

    pub fn call_names(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, step: &'static str) {
        self.calls.lock().unwrap().push(step);
    }

    /// A dummy witness carries a zero signature: every hex digit after the
    /// leading tag byte is '0'.
    fn is_dummy_witness(witness_hex: &str) -> bool {
        witness_hex.chars().skip(2).all(|c| c == '0')
    }
}

impl ContractEngine for StubEngine {
    fn pst_create(
        &self,
        _inputs: &[PstInput],
        outputs: &[PstOutput],
    ) -> Result<String, EngineError> {
        self.record("create");
        self.created_outputs.lock().unwrap().push(outputs.to_vec());
        Ok("pst-created".to_string())
    }

    fn pst_bind_input(
        &self,
        _pst: &str,
        _index: u32,
        _binding: &InputBinding<'_>,
    ) -> Result<String, EngineError> {
        self.record("bind");
        Ok("pst-bound".to_string())
    }

    fn pst_run(
        &self,
        _pst: &str,
        _index: u32,
        _program: &str,
        witness_hex: &str,
    ) -> Result<RunResult, EngineError> {
        if Self::is_dummy_witness(witness_hex) {
            self.record("dry-run");
            return Ok(RunResult {
                success: true,
                jets: Vec::new(),
                sig_all_hash: Some(self.sig_all_hash.clone()),
            });
        }

        self.record("verify-run");
        self.verify_witnesses
            .lock()
            .unwrap()
            .push(witness_hex.to_string());
        Ok(RunResult {
            success: self.verify_success,
            jets: self
                .failing_jets
                .iter()
                .map(|jet| sas_core::contract::engine::JetResult {
                    jet: jet.clone(),
                    success: false,
                    output_value: None,
                })
                .collect(),
            sig_all_hash: None,
        })
    }

    fn pst_finalize(
        &self,
        _pst: &str,
        _index: u32,
        _program: &str,
        _witness_hex: &str,
    ) -> Result<String, EngineError> {
        self.record("finalize");
        Ok("pst-final".to_string())
    }

    fn pst_extract(&self, _pst: &str) -> Result<String, EngineError> {
        self.record("extract");
        Ok(self.raw_hex.clone())
    }
}

/// Ledger stub over in-memory maps.
#[derive(Default)]
pub struct StubLedger {
    pub utxos: Mutex<HashMap<String, Vec<Utxo>>>,
    pub transactions: Mutex<HashMap<String, TxInfo>>,
    pub statuses: Mutex<HashMap<String, TxStatusInfo>>,
    pub outspends: Mutex<HashMap<(String, u32), Outspend>>,
    pub broadcasts: Mutex<Vec<String>>,
    /// Report every transaction as unconfirmed, for timeout tests.
    pub always_pending: bool,
    /// Fail every request, for unreachable-ledger tests.
    pub unreachable: bool,
    pub tip_height: u64,
}

fn unreachable_error(endpoint: &str) -> LedgerError {
    LedgerError::Status {
        endpoint: endpoint.to_string(),
        status: 503,
    }
}

impl StubLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(StubLedger::default())
    }

    pub fn with_utxo(address: &str, utxo: Utxo) -> Arc<Self> {
        let ledger = StubLedger::default();
        ledger
            .utxos
            .lock()
            .unwrap()
            .insert(address.to_string(), vec![utxo]);
        Arc::new(ledger)
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.lock().unwrap().len()
    }
}

impl Ledger for StubLedger {
    fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, LedgerError> {
        if self.unreachable {
            return Err(unreachable_error("address/utxo"));
        }
        Ok(self
            .utxos
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    fn get_transaction(&self, txid: &str) -> Result<Option<TxInfo>, LedgerError> {
        if self.unreachable {
            return Err(unreachable_error("tx"));
        }
        Ok(self.transactions.lock().unwrap().get(txid).cloned())
    }

    fn get_tx_status(&self, txid: &str) -> Result<Option<TxStatusInfo>, LedgerError> {
        if self.always_pending {
            return Ok(Some(TxStatusInfo {
                confirmed: false,
                block_height: None,
                block_hash: None,
                block_time: None,
            }));
        }
        Ok(self.statuses.lock().unwrap().get(txid).cloned())
    }

    fn get_tip_height(&self) -> Result<u64, LedgerError> {
        Ok(self.tip_height)
    }

    fn get_outspend(&self, txid: &str, vout: u32) -> Result<Option<Outspend>, LedgerError> {
        if self.unreachable {
            return Err(unreachable_error("tx/outspend"));
        }
        Ok(self
            .outspends
            .lock()
            .unwrap()
            .get(&(txid.to_string(), vout))
            .cloned())
    }

    fn broadcast(&self, tx_hex: &str) -> Result<String, LedgerError> {
        self.broadcasts.lock().unwrap().push(tx_hex.to_string());
        Ok(broadcast_txid())
    }
}

pub fn client(role: Role, engine: Arc<StubEngine>, ledger: Arc<StubLedger>) -> Sas {
    let secret = match role {
        Role::Admin => ADMIN_SECRET,
        Role::Delegate => DELEGATE_SECRET,
    };
    let signer = MemorySigner::from_secret_hex(secret).unwrap();
    Sas::with_backends(test_config(), role, Box::new(signer), engine, ledger).unwrap()
}
