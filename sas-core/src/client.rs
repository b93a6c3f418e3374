//! High-level SAS facade
//!
//! `Sas` is the role-scoped entry point: construct it with `as_admin` or
//! `as_delegate` and a secret (or an external signer), then issue, revoke,
//! verify and drain with one call each. Construction asserts that the
//! signer's public key matches the key the configuration declares for the
//! role, so a wrong secret fails loudly instead of impersonating.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::builder::{RevokeOptions, TransactionBuilder};
use crate::confirmation::{ConfirmationStatus, ConfirmationTracker};
use crate::config::SasConfig;
use crate::contract::engine::ContractEngine;
use crate::contract::ContractKind;
use crate::crypto::{MemorySigner, Signer};
use crate::error::{SasError, SasResult};
use crate::fees::{FeeEstimate, FeeEstimator, FeeOperation, FeePriority};
use crate::ledger::{EsploraClient, Ledger};
use crate::models::{Certificate, CertificateStatus, Role, TransactionResult, Utxo, Vault};
use crate::prepared::{PreparedTransaction, TransactionType};
use crate::protocol;
use crate::SimplicityCli;

/// Role-scoped SDK entry point.
///
/// A single instance is safe to share across threads for read-only
/// operations. Writes against the same vault race on UTXO selection and must
/// be serialized by the caller.
pub struct Sas {
    config: SasConfig,
    role: Role,
    signer: Box<dyn Signer>,
    builder: TransactionBuilder,
    ledger: Arc<dyn Ledger>,
    confirmations: ConfirmationTracker,
    fees: FeeEstimator,
}

impl std::fmt::Debug for Sas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sas")
            .field("config", &self.config)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl Sas {
    /// Operate as admin: issue, revoke any certificate, drain the vault.
    pub fn as_admin(config: SasConfig, secret_hex: &str) -> SasResult<Self> {
        let signer = MemorySigner::from_secret_hex(secret_hex)?;
        Self::with_default_backends(config, Role::Admin, Box::new(signer))
    }

    /// Operate as delegate: issue and revoke certificates.
    pub fn as_delegate(config: SasConfig, secret_hex: &str) -> SasResult<Self> {
        let signer = MemorySigner::from_secret_hex(secret_hex)?;
        Self::with_default_backends(config, Role::Delegate, Box::new(signer))
    }

    /// Operate as admin with a caller-supplied signer (KMS, HSM wrapper).
    pub fn as_admin_with_signer(config: SasConfig, signer: Box<dyn Signer>) -> SasResult<Self> {
        Self::with_default_backends(config, Role::Admin, signer)
    }

    /// Operate as delegate with a caller-supplied signer.
    pub fn as_delegate_with_signer(config: SasConfig, signer: Box<dyn Signer>) -> SasResult<Self> {
        Self::with_default_backends(config, Role::Delegate, signer)
    }

    fn with_default_backends(
        config: SasConfig,
        role: Role,
        signer: Box<dyn Signer>,
    ) -> SasResult<Self> {
        let engine = SimplicityCli::new(config.engine_binary.clone(), config.network)?;
        let ledger = EsploraClient::new(config.api_base_url()).map_err(SasError::Network)?;
        Self::with_backends(config, role, signer, Arc::new(engine), Arc::new(ledger))
    }

    /// Construct with explicit engine and ledger backends.
    ///
    /// This is the seam integration tests and custom deployments use; the
    /// key/config binding check applies here too.
    pub fn with_backends(
        config: SasConfig,
        role: Role,
        signer: Box<dyn Signer>,
        engine: Arc<dyn ContractEngine>,
        ledger: Arc<dyn Ledger>,
    ) -> SasResult<Self> {
        config.validate()?;

        let expected = config.pubkey_for(role);
        let actual = signer.public_key_hex();
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(SasError::Configuration(format!(
                "private key does not match config: expected {} pubkey {}..., got {}...",
                role,
                &expected[..16.min(expected.len())],
                &actual[..16],
            )));
        }

        let registry = config.registry()?;
        let builder = TransactionBuilder::new(
            engine,
            Arc::clone(&ledger),
            registry,
            config.fees,
            config.network,
        );
        let confirmations = ConfirmationTracker::new(Arc::clone(&ledger));

        info!(role = %role, network = config.network.as_str(), "SAS client ready");
        Ok(Sas {
            config,
            role,
            signer,
            builder,
            ledger,
            confirmations,
            fees: FeeEstimator::new(),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &SasConfig {
        &self.config
    }

    /// Vault address, for funding.
    pub fn vault_address(&self) -> &str {
        &self.builder.contract(ContractKind::Vault).address
    }

    /// Address all certificates live at.
    pub fn certificate_address(&self) -> &str {
        &self.builder.contract(ContractKind::Certificate).address
    }

    // =========================================================================
    // Vault operations
    // =========================================================================

    /// Current vault state: balance and UTXO set.
    pub fn vault(&self) -> SasResult<Vault> {
        let address = self.vault_address().to_string();
        let utxos = self.ledger.get_utxos(&address)?;
        Ok(Vault::new(address, utxos))
    }

    /// Vault balance in satoshis.
    pub fn vault_balance(&self) -> SasResult<u64> {
        Ok(self.ledger.get_balance(self.vault_address())?)
    }

    /// Drain the vault to a recipient. Admin only; the delegate is rejected
    /// before any ledger or engine call.
    pub fn drain_vault(&self, recipient: &str) -> TransactionResult {
        self.try_drain(recipient)
            .unwrap_or_else(TransactionResult::failure)
    }

    fn try_drain(&self, recipient: &str) -> SasResult<TransactionResult> {
        self.require_admin("drain_vault")?;
        let utxo = self.first_vault_utxo()?;
        self.builder
            .drain_vault(&utxo, recipient, self.signer.as_ref(), true)
    }

    // =========================================================================
    // Certificate operations
    // =========================================================================

    /// Issue a certificate bound to a content id.
    pub fn issue_certificate(&self, cid: &str) -> TransactionResult {
        self.try_issue(cid).unwrap_or_else(TransactionResult::failure)
    }

    fn try_issue(&self, cid: &str) -> SasResult<TransactionResult> {
        let vault = self.vault()?;
        self.check_issue_funds(&vault)?;
        let utxo = vault
            .available_utxo()
            .cloned()
            .ok_or_else(|| SasError::VaultEmpty {
                address: vault.address.clone(),
            })?;
        self.builder
            .issue_certificate(&utxo, cid, self.role, self.signer.as_ref(), true)
    }

    /// Revoke a certificate by spending its UTXO.
    pub fn revoke_certificate(
        &self,
        txid: &str,
        vout: u32,
        options: RevokeOptions,
    ) -> TransactionResult {
        self.try_revoke(txid, vout, &options)
            .unwrap_or_else(TransactionResult::failure)
    }

    fn try_revoke(
        &self,
        txid: &str,
        vout: u32,
        options: &RevokeOptions,
    ) -> SasResult<TransactionResult> {
        let cert_utxo = self.find_certificate_utxo(txid, vout)?;
        self.builder.revoke_certificate(
            &cert_utxo,
            self.role,
            options,
            self.signer.as_ref(),
            true,
        )
    }

    /// Certificate validity: `Valid` while the UTXO is unspent, `Revoked`
    /// once spent, `Unknown` when the ledger cannot answer.
    pub fn verify_certificate(&self, txid: &str, vout: u32) -> CertificateStatus {
        match self.ledger.get_outspend(txid, vout) {
            Ok(Some(outspend)) if outspend.spent => CertificateStatus::Revoked,
            Ok(Some(_)) => CertificateStatus::Valid,
            Ok(None) => CertificateStatus::Unknown,
            Err(e) => {
                warn!(txid, vout, error = %e, "certificate verification unavailable");
                CertificateStatus::Unknown
            }
        }
    }

    /// Fetch a certificate with its content id recovered from the issuing
    /// transaction's null-data output.
    pub fn get_certificate(&self, txid: &str, vout: u32) -> SasResult<Option<Certificate>> {
        let Some(tx) = self.ledger.get_transaction(txid)? else {
            return Ok(None);
        };

        let cid = tx
            .vout
            .iter()
            .find(|out| out.scriptpubkey_type == "op_return")
            .and_then(|out| {
                // Skip the OP_RETURN opcode and the push-length byte.
                let hex_data = out.scriptpubkey.get(4..)?;
                protocol::decode_hex(hex_data)
            })
            .and_then(|payload| payload.cid().map(str::to_string));

        let value = tx
            .vout
            .get(vout as usize)
            .and_then(|out| out.value)
            .unwrap_or(self.config.fees.cert_dust_sats);

        let status = self.verify_certificate(txid, vout);
        let issued_at = tx.status.as_ref().and_then(|s| s.block_height);
        let revoked_at = if status == CertificateStatus::Revoked {
            self.ledger
                .get_outspend(txid, vout)?
                .and_then(|o| o.status)
                .and_then(|s| s.block_height)
        } else {
            None
        };

        Ok(Some(Certificate {
            txid: txid.to_string(),
            vout,
            cid,
            status,
            issued_at,
            revoked_at,
            value,
        }))
    }

    /// All currently valid (unspent) certificates.
    pub fn list_certificates(&self) -> SasResult<Vec<Certificate>> {
        let utxos = self.ledger.get_utxos(self.certificate_address())?;
        let mut certificates = Vec::with_capacity(utxos.len());
        for utxo in utxos {
            if let Some(cert) = self.get_certificate(&utxo.txid, utxo.vout)? {
                certificates.push(cert);
            }
        }
        Ok(certificates)
    }

    // =========================================================================
    // External signing (prepare / finalize)
    // =========================================================================

    /// Prepare an issuance for external signing: returns the digest to sign
    /// plus the state needed to finalize once the signature arrives.
    pub fn prepare_issue_certificate(&self, cid: &str) -> SasResult<PreparedTransaction> {
        let vault = self.vault()?;
        self.check_issue_funds(&vault)?;
        let utxo = vault
            .available_utxo()
            .cloned()
            .ok_or_else(|| SasError::VaultEmpty {
                address: vault.address.clone(),
            })?;

        let parts = self
            .builder
            .prepare_issue_certificate(&utxo, cid, self.role)?;

        let mut details = BTreeMap::new();
        details.insert("cid".to_string(), cid.to_string());
        details.insert("vault_utxo".to_string(), utxo.outpoint());
        details.insert("vault_balance".to_string(), vault.balance.to_string());

        Ok(PreparedTransaction::new(
            TransactionType::IssueCertificate,
            parts.sig_hash,
            self.role,
            self.config.pubkey_for(self.role).to_string(),
            parts.pst,
            parts.input_index,
            parts.program,
            parts.path,
            details,
        ))
    }

    /// Prepare a revocation for external signing.
    pub fn prepare_revoke_certificate(
        &self,
        txid: &str,
        vout: u32,
        options: RevokeOptions,
    ) -> SasResult<PreparedTransaction> {
        let cert_utxo = self.find_certificate_utxo(txid, vout)?;
        let parts = self
            .builder
            .prepare_revoke_certificate(&cert_utxo, self.role, &options)?;

        let mut details = BTreeMap::new();
        details.insert("certificate".to_string(), cert_utxo.outpoint());
        details.insert(
            "recipient".to_string(),
            options
                .recipient
                .clone()
                .unwrap_or_else(|| "(burn as fee)".to_string()),
        );
        if let Some(code) = options.reason_code {
            let reason = protocol::reason_name(code)
                .map(|name| format!("{} ({})", code, name))
                .unwrap_or_else(|| code.to_string());
            details.insert("reason".to_string(), reason);
        }
        if let Some(replacement) = &options.replacement_txid {
            details.insert("replacement_txid".to_string(), replacement.clone());
        }

        Ok(PreparedTransaction::new(
            TransactionType::RevokeCertificate,
            parts.sig_hash,
            self.role,
            self.config.pubkey_for(self.role).to_string(),
            parts.pst,
            parts.input_index,
            parts.program,
            parts.path,
            details,
        ))
    }

    /// Prepare a vault drain for external signing. Admin only.
    pub fn prepare_drain_vault(&self, recipient: &str) -> SasResult<PreparedTransaction> {
        self.require_admin("drain_vault")?;
        let vault = self.vault()?;
        let utxo = vault
            .available_utxo()
            .cloned()
            .ok_or_else(|| SasError::VaultEmpty {
                address: vault.address.clone(),
            })?;

        let parts = self.builder.prepare_drain_vault(&utxo, recipient)?;

        let mut details = BTreeMap::new();
        details.insert("vault_balance".to_string(), vault.balance.to_string());
        details.insert("recipient".to_string(), recipient.to_string());

        Ok(PreparedTransaction::new(
            TransactionType::DrainVault,
            parts.sig_hash,
            Role::Admin,
            self.config.pubkey_for(Role::Admin).to_string(),
            parts.pst,
            parts.input_index,
            parts.program,
            parts.path,
            details,
        ))
    }

    /// Finalize a prepared transaction with an externally produced
    /// signature. Consumes the prepared transaction: it cannot be finalized
    /// twice.
    pub fn finalize_transaction(
        &self,
        prepared: PreparedTransaction,
        signature: &[u8],
    ) -> TransactionResult {
        self.try_finalize(prepared, signature)
            .unwrap_or_else(TransactionResult::failure)
    }

    fn try_finalize(
        &self,
        prepared: PreparedTransaction,
        signature: &[u8],
    ) -> SasResult<TransactionResult> {
        let signature: &[u8; 64] = signature
            .try_into()
            .map_err(|_| SasError::InvalidSignature(signature.len()))?;
        if prepared.is_expired() {
            return Err(SasError::Expired);
        }

        self.builder.finalize_prepared(
            prepared.pst(),
            prepared.input_index(),
            prepared.program(),
            prepared.path(),
            signature,
            true,
        )
    }

    // =========================================================================
    // Confirmations & fees
    // =========================================================================

    /// Single confirmation-status query.
    pub fn confirmation_status(&self, txid: &str) -> ConfirmationStatus {
        self.confirmations.get_status(txid)
    }

    /// Block until `txid` has `target` confirmations.
    pub fn wait_for_confirmation(
        &self,
        txid: &str,
        target: u32,
        timeout: Option<Duration>,
    ) -> SasResult<ConfirmationStatus> {
        Ok(self.confirmations.wait_for_confirmation(txid, target, timeout)?)
    }

    /// Register a one-shot confirmation callback.
    pub fn on_confirmation<F>(&self, txid: &str, target: u32, callback: F)
    where
        F: FnOnce(ConfirmationStatus) + Send + 'static,
    {
        self.confirmations.on_confirmation(txid, target, callback)
    }

    pub fn confirmations(&self) -> &ConfirmationTracker {
        &self.confirmations
    }

    /// Advisory fee estimate for an operation.
    pub fn estimate_fee(&self, operation: FeeOperation, priority: FeePriority) -> FeeEstimate {
        self.fees.estimate(operation, priority)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn require_admin(&self, operation: &'static str) -> SasResult<()> {
        if self.role != Role::Admin {
            return Err(SasError::PermissionDenied {
                role: self.role,
                operation,
            });
        }
        Ok(())
    }

    fn check_issue_funds(&self, vault: &Vault) -> SasResult<()> {
        let required = self.config.fees.min_issue_sats();
        if vault.balance < required {
            return Err(SasError::InsufficientFunds {
                required,
                available: vault.balance,
            });
        }
        Ok(())
    }

    fn first_vault_utxo(&self) -> SasResult<Utxo> {
        let vault = self.vault()?;
        vault
            .available_utxo()
            .cloned()
            .ok_or(SasError::VaultEmpty {
                address: vault.address,
            })
    }

    fn find_certificate_utxo(&self, txid: &str, vout: u32) -> SasResult<Utxo> {
        let utxos = self.ledger.get_utxos(self.certificate_address())?;
        utxos
            .into_iter()
            .find(|u| u.txid == txid && u.vout == vout)
            .ok_or_else(|| SasError::CertificateNotFound {
                txid: txid.to_string(),
                vout,
            })
    }
}
