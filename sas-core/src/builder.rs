//! Transaction builder
//!
//! Drives the three vault operations (issue / revoke / drain) through the
//! same eight-step pipeline:
//!
//! 1. compose the operation's output set
//! 2. create the PST
//! 3. bind the spent UTXO's metadata to input 0
//! 4. dry-run the program with a dummy witness to reveal the signature digest
//! 5. sign the digest
//! 6. encode the spending-path witness
//! 7. re-run the program with the real witness; every jet must succeed
//! 8. finalize, extract the raw transaction and optionally broadcast
//!
//! Any failure before step 8 leaves no on-chain state; the caller can retry.
//! The prepare/finalize split cuts the pipeline after step 4 so an external
//! signer can produce the signature out of band.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::FeePolicy;
use crate::contract::engine::{
    format_btc, ContractEngine, EngineError, InputBinding, PstInput, PstOutput,
};
use crate::contract::witness::{SpendingPath, WitnessEncoder};
use crate::contract::{ContractInfo, ContractKind, ContractRegistry};
use crate::crypto::Signer;
use crate::error::{SasError, SasResult};
use crate::ledger::Ledger;
use crate::models::{Role, TransactionResult, Utxo};
use crate::protocol;
use crate::Network;

/// Optional parts of a revocation.
#[derive(Debug, Clone, Default)]
pub struct RevokeOptions {
    /// Where to send the certificate's value; burned as fee when absent.
    pub recipient: Option<String>,
    /// Reason code recorded in the on-chain REVOKE record.
    pub reason_code: Option<u8>,
    /// Replacement certificate txid; requires a reason code.
    pub replacement_txid: Option<String>,
}

/// Carrier state produced by a prepare call: everything finalize needs to
/// resume the pipeline at step 6.
#[derive(Debug)]
pub(crate) struct PreparedParts {
    pub pst: String,
    pub sig_hash: String,
    pub input_index: u32,
    pub program: String,
    pub path: SpendingPath,
}

/// Builds and executes vault and certificate transactions.
///
/// The builder exclusively owns intermediate PST state across pipeline steps;
/// it never hands out interior references.
pub struct TransactionBuilder {
    engine: Arc<dyn ContractEngine>,
    ledger: Arc<dyn Ledger>,
    registry: ContractRegistry,
    fees: FeePolicy,
    network: Network,
}

impl TransactionBuilder {
    pub fn new(
        engine: Arc<dyn ContractEngine>,
        ledger: Arc<dyn Ledger>,
        registry: ContractRegistry,
        fees: FeePolicy,
        network: Network,
    ) -> Self {
        TransactionBuilder {
            engine,
            ledger,
            registry,
            fees,
            network,
        }
    }

    pub fn fees(&self) -> &FeePolicy {
        &self.fees
    }

    // =========================================================================
    // Certificate issuance
    // =========================================================================

    /// Issue a certificate from the vault.
    ///
    /// Output order is covenant-enforced: change back to the vault, the
    /// certificate output, the ATTEST null-data record, the fee.
    pub fn issue_certificate(
        &self,
        vault_utxo: &Utxo,
        cid: &str,
        role: Role,
        signer: &dyn Signer,
        broadcast: bool,
    ) -> SasResult<TransactionResult> {
        let outputs = self.compose_issue_outputs(vault_utxo, cid)?;
        info!(cid, role = %role, outpoint = %vault_utxo.outpoint(), "issuing certificate");
        self.execute(
            vault_utxo,
            outputs,
            ContractKind::Vault,
            SpendingPath::vault_issue(role),
            signer,
            broadcast,
        )
    }

    /// Prepare an issuance for external signing: steps 1-4 only.
    pub(crate) fn prepare_issue_certificate(
        &self,
        vault_utxo: &Utxo,
        cid: &str,
        role: Role,
    ) -> SasResult<PreparedParts> {
        let outputs = self.compose_issue_outputs(vault_utxo, cid)?;
        self.prepare(
            vault_utxo,
            outputs,
            ContractKind::Vault,
            SpendingPath::vault_issue(role),
        )
    }

    fn compose_issue_outputs(&self, vault_utxo: &Utxo, cid: &str) -> SasResult<Vec<PstOutput>> {
        let min_issue = self.fees.min_issue_sats();
        if vault_utxo.value < min_issue {
            return Err(SasError::InsufficientFunds {
                required: min_issue,
                available: vault_utxo.value,
            });
        }
        let change_sats = vault_utxo.value - self.fees.fee_sats - self.fees.cert_dust_sats;

        let record = protocol::encode_attest(cid)?;
        let asset = self.registry.asset_id();
        Ok(vec![
            PstOutput::to_address(&self.registry.vault().address, asset, change_sats),
            PstOutput::to_address(
                &self.registry.certificate().address,
                asset,
                self.fees.cert_dust_sats,
            ),
            PstOutput::null_data(hex::encode(&record), asset),
            PstOutput::fee(asset, self.fees.fee_sats),
        ])
    }

    // =========================================================================
    // Certificate revocation
    // =========================================================================

    /// Revoke a certificate by spending its UTXO.
    ///
    /// With a recipient (and enough value to pay the fee) the certificate's
    /// value is forwarded; otherwise it is burned as fee. When a reason code
    /// or replacement is given, a REVOKE null-data record is included.
    pub fn revoke_certificate(
        &self,
        cert_utxo: &Utxo,
        role: Role,
        options: &RevokeOptions,
        signer: &dyn Signer,
        broadcast: bool,
    ) -> SasResult<TransactionResult> {
        let outputs = self.compose_revoke_outputs(cert_utxo, options)?;
        info!(
            outpoint = %cert_utxo.outpoint(),
            role = %role,
            reason = ?options.reason_code,
            "revoking certificate"
        );
        self.execute(
            cert_utxo,
            outputs,
            ContractKind::Certificate,
            SpendingPath::certificate_revoke(role),
            signer,
            broadcast,
        )
    }

    pub(crate) fn prepare_revoke_certificate(
        &self,
        cert_utxo: &Utxo,
        role: Role,
        options: &RevokeOptions,
    ) -> SasResult<PreparedParts> {
        let outputs = self.compose_revoke_outputs(cert_utxo, options)?;
        self.prepare(
            cert_utxo,
            outputs,
            ContractKind::Certificate,
            SpendingPath::certificate_revoke(role),
        )
    }

    fn compose_revoke_outputs(
        &self,
        cert_utxo: &Utxo,
        options: &RevokeOptions,
    ) -> SasResult<Vec<PstOutput>> {
        let asset = self.registry.asset_id();

        let record = if options.reason_code.is_some() || options.replacement_txid.is_some() {
            Some(protocol::encode_revoke(
                &cert_utxo.txid,
                cert_utxo.vout,
                options.reason_code,
                options.replacement_txid.as_deref(),
            )?)
        } else {
            None
        };

        let mut outputs = Vec::with_capacity(3);
        let forward = options
            .recipient
            .as_deref()
            .filter(|_| cert_utxo.value > self.fees.fee_sats);

        match forward {
            Some(recipient) => {
                outputs.push(PstOutput::to_address(
                    recipient,
                    asset,
                    cert_utxo.value - self.fees.fee_sats,
                ));
                if let Some(record) = &record {
                    outputs.push(PstOutput::null_data(hex::encode(record), asset));
                }
                outputs.push(PstOutput::fee(asset, self.fees.fee_sats));
            }
            None => {
                // Nothing left over: the whole certificate value becomes fee.
                outputs.push(PstOutput::fee(asset, cert_utxo.value));
                if let Some(record) = &record {
                    outputs.push(PstOutput::null_data(hex::encode(record), asset));
                }
            }
        }
        Ok(outputs)
    }

    // =========================================================================
    // Vault drain
    // =========================================================================

    /// Drain a vault UTXO to a recipient through the admin-unconditional
    /// path. Role gating lives in the facade; the covenant itself only
    /// accepts the admin key on this path.
    pub fn drain_vault(
        &self,
        vault_utxo: &Utxo,
        recipient: &str,
        signer: &dyn Signer,
        broadcast: bool,
    ) -> SasResult<TransactionResult> {
        let outputs = self.compose_drain_outputs(vault_utxo, recipient)?;
        info!(outpoint = %vault_utxo.outpoint(), recipient, "draining vault");
        self.execute(
            vault_utxo,
            outputs,
            ContractKind::Vault,
            SpendingPath::VaultAdminDrain,
            signer,
            broadcast,
        )
    }

    pub(crate) fn prepare_drain_vault(
        &self,
        vault_utxo: &Utxo,
        recipient: &str,
    ) -> SasResult<PreparedParts> {
        let outputs = self.compose_drain_outputs(vault_utxo, recipient)?;
        self.prepare(
            vault_utxo,
            outputs,
            ContractKind::Vault,
            SpendingPath::VaultAdminDrain,
        )
    }

    fn compose_drain_outputs(
        &self,
        vault_utxo: &Utxo,
        recipient: &str,
    ) -> SasResult<Vec<PstOutput>> {
        if vault_utxo.value <= self.fees.fee_sats {
            return Err(SasError::InsufficientFunds {
                required: self.fees.fee_sats + 1,
                available: vault_utxo.value,
            });
        }
        let asset = self.registry.asset_id();
        Ok(vec![
            PstOutput::to_address(recipient, asset, vault_utxo.value - self.fees.fee_sats),
            PstOutput::fee(asset, self.fees.fee_sats),
        ])
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    /// Steps 2-4: create the PST, bind the input, dry-run for the digest.
    fn assemble(
        &self,
        utxo: &Utxo,
        outputs: Vec<PstOutput>,
        kind: ContractKind,
        path: SpendingPath,
    ) -> SasResult<(String, String)> {
        let contract = self.registry.contract(kind);
        let inputs = [PstInput {
            txid: utxo.txid.clone(),
            vout: utxo.vout,
        }];

        let pst = self.engine.pst_create(&inputs, &outputs)?;
        debug!("pst created");

        let binding = InputBinding {
            script_pubkey: &contract.script_pubkey,
            asset: self.registry.asset_id(),
            amount_btc: format_btc(utxo.value),
            cmr: &contract.cmr,
            internal_key: self.registry.internal_key(),
        };
        let pst = self.engine.pst_bind_input(&pst, 0, &binding)?;
        debug!("input 0 bound");

        let dry_run = self
            .engine
            .pst_run(&pst, 0, &contract.program, &WitnessEncoder::dummy_hex(path))?;
        let sig_hash = dry_run
            .sig_all_hash
            .ok_or(EngineError::MissingSigAllHash)?;
        debug!(sig_hash = %sig_hash, "signature digest extracted");

        Ok((pst, sig_hash))
    }

    /// Steps 6-8: witness, verify run, finalize, extract, broadcast.
    fn complete(
        &self,
        pst: &str,
        input_index: u32,
        program: &str,
        path: SpendingPath,
        signature: &[u8; 64],
        broadcast: bool,
    ) -> SasResult<TransactionResult> {
        let witness = WitnessEncoder::encode_hex(path, signature)?;

        let verify = self.engine.pst_run(pst, input_index, program, &witness)?;
        if !verify.success {
            return Err(EngineError::VerificationFailed(verify.failed_jets()).into());
        }
        debug!("witness verified, all jets succeeded");

        let finalized = self
            .engine
            .pst_finalize(pst, input_index, program, &witness)?;
        let tx_hex = self.engine.pst_extract(&finalized)?;

        if !broadcast {
            return Ok(TransactionResult::assembled(tx_hex));
        }

        let txid = self.ledger.broadcast(&tx_hex)?;
        info!(txid = %txid, "transaction broadcast");
        Ok(TransactionResult::broadcast(txid, tx_hex, self.network))
    }

    /// The full in-process pipeline.
    fn execute(
        &self,
        utxo: &Utxo,
        outputs: Vec<PstOutput>,
        kind: ContractKind,
        path: SpendingPath,
        signer: &dyn Signer,
        broadcast: bool,
    ) -> SasResult<TransactionResult> {
        let (pst, sig_hash) = self.assemble(utxo, outputs, kind, path)?;

        let digest = decode_digest(&sig_hash)?;
        let signature = signer.sign(&digest)?;

        let contract = self.registry.contract(kind);
        self.complete(&pst, 0, &contract.program, path, &signature, broadcast)
    }

    /// Steps 1-4 for the external-signing flow.
    fn prepare(
        &self,
        utxo: &Utxo,
        outputs: Vec<PstOutput>,
        kind: ContractKind,
        path: SpendingPath,
    ) -> SasResult<PreparedParts> {
        let (pst, sig_hash) = self.assemble(utxo, outputs, kind, path)?;
        let contract = self.registry.contract(kind);
        Ok(PreparedParts {
            pst,
            sig_hash,
            input_index: 0,
            program: contract.program.clone(),
            path,
        })
    }

    /// Resume a prepared transaction with an externally produced signature.
    pub(crate) fn finalize_prepared(
        &self,
        pst: &str,
        input_index: u32,
        program: &str,
        path: SpendingPath,
        signature: &[u8; 64],
        broadcast: bool,
    ) -> SasResult<TransactionResult> {
        self.complete(pst, input_index, program, path, signature, broadcast)
    }

    pub(crate) fn contract(&self, kind: ContractKind) -> &ContractInfo {
        self.registry.contract(kind)
    }
}

fn decode_digest(sig_hash: &str) -> SasResult<[u8; 32]> {
    let decoded = hex::decode(sig_hash).map_err(|_| {
        SasError::Engine(EngineError::InvalidOutput {
            step: "pset run",
            detail: format!("sig_all_hash is not hex: {}", sig_hash),
        })
    })?;
    decoded.try_into().map_err(|_| {
        SasError::Engine(EngineError::InvalidOutput {
            step: "pset run",
            detail: "sig_all_hash is not 32 bytes".to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_digest() {
        assert_eq!(decode_digest(&"cc".repeat(32)).unwrap(), [0xcc; 32]);
        assert!(decode_digest("zz").is_err());
        assert!(decode_digest(&"cc".repeat(31)).is_err());
    }
}
