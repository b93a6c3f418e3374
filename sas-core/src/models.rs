//! Core data model for the SAS SDK
//!
//! Certificates, vault state, UTXOs and operation results shared across the
//! transaction pipeline and the facade.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::MIN_ISSUE_SATS;
use crate::error::SasError;
use crate::Network;

/// An unspent transaction output as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    /// Value in satoshis.
    pub value: u64,
    /// Asset tag, when the ledger reports one.
    #[serde(default)]
    pub asset: Option<String>,
}

impl Utxo {
    pub fn new(txid: impl Into<String>, vout: u32, value: u64) -> Self {
        Utxo {
            txid: txid.into(),
            vout,
            value,
            asset: None,
        }
    }

    /// `txid:vout` form used in logs and error messages.
    pub fn outpoint(&self) -> String {
        format!("{}:{}", self.txid, self.vout)
    }
}

/// Caller role. Admin holds the root spending authority; the delegate holds
/// day-to-day issuance authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Delegate,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Delegate => "delegate",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Certificate validity as observed on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    /// The certificate UTXO is unspent.
    Valid,
    /// The certificate UTXO has been spent.
    Revoked,
    /// The ledger could not be reached or does not know the transaction.
    Unknown,
}

/// A certificate as a logical object: the UTXO plus the attestation record
/// recovered from the issuing transaction.
#[derive(Debug, Clone, Serialize)]
pub struct Certificate {
    pub txid: String,
    pub vout: u32,
    /// Content id from the ATTEST record, when it decoded.
    pub cid: Option<String>,
    pub status: CertificateStatus,
    /// Block height of issuance, once confirmed.
    pub issued_at: Option<u64>,
    /// Block height of the revoking transaction, if revoked.
    pub revoked_at: Option<u64>,
    /// Output value in satoshis.
    pub value: u64,
}

impl Certificate {
    pub fn outpoint(&self) -> String {
        format!("{}:{}", self.txid, self.vout)
    }

    pub fn is_valid(&self) -> bool {
        self.status == CertificateStatus::Valid
    }
}

/// Snapshot of the vault: its address and the UTXO set funding issuance.
#[derive(Debug, Clone)]
pub struct Vault {
    pub address: String,
    /// Sum of all UTXO values in satoshis.
    pub balance: u64,
    pub utxos: Vec<Utxo>,
}

impl Vault {
    pub fn new(address: impl Into<String>, utxos: Vec<Utxo>) -> Self {
        let balance = utxos.iter().map(|u| u.value).sum();
        Vault {
            address: address.into(),
            balance,
            utxos,
        }
    }

    /// Whether the vault can fund an issuance with the default dust/fee
    /// policy: certificate output + fee + non-zero change for the covenant.
    pub fn can_issue(&self) -> bool {
        self.balance >= MIN_ISSUE_SATS
    }

    /// First available UTXO for spending.
    pub fn available_utxo(&self) -> Option<&Utxo> {
        self.utxos.first()
    }
}

/// Outcome of a write operation: a broadcast (or assembled) transaction, or
/// the error that stopped the pipeline.
#[derive(Debug)]
pub struct TransactionResult {
    pub success: bool,
    pub txid: Option<String>,
    pub raw_hex: Option<String>,
    pub explorer_url: Option<String>,
    pub error: Option<SasError>,
}

impl TransactionResult {
    /// Successful broadcast.
    pub fn broadcast(txid: impl Into<String>, raw_hex: impl Into<String>, network: Network) -> Self {
        let txid = txid.into();
        let explorer_url = Some(network.explorer_tx_url(&txid));
        TransactionResult {
            success: true,
            txid: Some(txid),
            raw_hex: Some(raw_hex.into()),
            explorer_url,
            error: None,
        }
    }

    /// Successfully assembled but not broadcast.
    pub fn assembled(raw_hex: impl Into<String>) -> Self {
        TransactionResult {
            success: true,
            txid: None,
            raw_hex: Some(raw_hex.into()),
            explorer_url: None,
            error: None,
        }
    }

    pub fn failure(error: SasError) -> Self {
        TransactionResult {
            success: false,
            txid: None,
            raw_hex: None,
            explorer_url: None,
            error: Some(error),
        }
    }

    pub fn error(&self) -> Option<&SasError> {
        self.error.as_ref()
    }
}

impl From<SasError> for TransactionResult {
    fn from(error: SasError) -> Self {
        TransactionResult::failure(error)
    }
}
