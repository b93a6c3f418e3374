//! Transactions prepared for external signing
//!
//! The prepare/finalize split lets a hardware wallet, multisig quorum or
//! approval workflow produce the Schnorr signature out of band. A
//! `PreparedTransaction` is the continuation object: it carries the digest to
//! sign, the role and public key expected to sign it, and the carrier state
//! needed to resume the pipeline. Finalize consumes it by value, so a
//! prepared transaction can be used exactly once.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::contract::witness::SpendingPath;
use crate::error::{SasError, SasResult};
use crate::models::Role;

/// The operation a prepared transaction will perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    IssueCertificate,
    RevokeCertificate,
    DrainVault,
}

/// A transaction pending an external signature.
///
/// The carrier fields (PST blob, program, spending path) never leave this
/// object: only [`PreparedTransaction::summary`] is serializable, for
/// approval UIs and transport to signing ceremonies.
#[derive(Debug)]
pub struct PreparedTransaction {
    tx_type: TransactionType,
    created_at: SystemTime,
    /// Hex-encoded 32-byte digest the signature must bind to.
    sig_hash: String,
    signer_role: Role,
    /// Hex x-only public key expected to produce the signature.
    required_pubkey: String,
    pst: String,
    input_index: u32,
    program: String,
    path: SpendingPath,
    details: BTreeMap<String, String>,
    expires_at: Option<SystemTime>,
}

/// Review-safe projection of a prepared transaction.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedSummary {
    pub tx_type: TransactionType,
    pub signer_role: Role,
    pub sig_hash: String,
    pub required_pubkey: String,
    /// Unix seconds.
    pub created_at: u64,
    pub expires_at: Option<u64>,
    pub details: BTreeMap<String, String>,
}

impl PreparedTransaction {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        tx_type: TransactionType,
        sig_hash: String,
        signer_role: Role,
        required_pubkey: String,
        pst: String,
        input_index: u32,
        program: String,
        path: SpendingPath,
        details: BTreeMap<String, String>,
    ) -> Self {
        PreparedTransaction {
            tx_type,
            created_at: SystemTime::now(),
            sig_hash,
            signer_role,
            required_pubkey,
            pst,
            input_index,
            program,
            path,
            details,
            expires_at: None,
        }
    }

    /// Set an expiry deadline relative to creation.
    pub fn with_expiry(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(self.created_at + ttl);
        self
    }

    pub fn tx_type(&self) -> TransactionType {
        self.tx_type
    }

    /// The digest to sign, hex-encoded.
    pub fn sig_hash(&self) -> &str {
        &self.sig_hash
    }

    /// The digest to sign, as bytes for a signer.
    pub fn sig_hash_bytes(&self) -> SasResult<[u8; 32]> {
        let decoded = hex::decode(&self.sig_hash)
            .map_err(|_| SasError::InvalidArgument("sig_hash is not valid hex".to_string()))?;
        decoded
            .try_into()
            .map_err(|_| SasError::InvalidArgument("sig_hash must be 32 bytes".to_string()))
    }

    pub fn signer_role(&self) -> Role {
        self.signer_role
    }

    pub fn required_pubkey(&self) -> &str {
        &self.required_pubkey
    }

    pub fn details(&self) -> &BTreeMap<String, String> {
        &self.details
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => SystemTime::now() > deadline,
            None => false,
        }
    }

    /// Time since creation.
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.created_at)
            .unwrap_or_default()
    }

    /// The projection safe to export for review and approval.
    pub fn summary(&self) -> PreparedSummary {
        PreparedSummary {
            tx_type: self.tx_type,
            signer_role: self.signer_role,
            sig_hash: self.sig_hash.clone(),
            required_pubkey: self.required_pubkey.clone(),
            created_at: unix_secs(self.created_at),
            expires_at: self.expires_at.map(unix_secs),
            details: self.details.clone(),
        }
    }

    // Carrier accessors for the finalize path. Crate-private: the PST blob
    // and program stay inside the pipeline.

    pub(crate) fn pst(&self) -> &str {
        &self.pst
    }

    pub(crate) fn input_index(&self) -> u32 {
        self.input_index
    }

    pub(crate) fn program(&self) -> &str {
        &self.program
    }

    pub(crate) fn path(&self) -> SpendingPath {
        self.path
    }
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
