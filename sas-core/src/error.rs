//! Error types for the SAS SDK
//!
//! Each subsystem defines its own error enum; `SasError` is the umbrella the
//! public surface reports. Precondition failures are raised before any I/O,
//! and every I/O failure carries enough context to identify the step that
//! produced it.

use thiserror::Error;

use crate::confirmation::ConfirmationError;
use crate::contract::engine::EngineError;
use crate::contract::witness::WitnessError;
use crate::crypto::SignerError;
use crate::ledger::LedgerError;
use crate::models::Role;
use crate::protocol::PayloadError;

/// Umbrella error for all SDK operations.
#[derive(Error, Debug)]
pub enum SasError {
    /// Malformed configuration or role/key mismatch.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed txid, hex, CID, reason code or option combination.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Attestation record body exceeds the null-data limit.
    #[error("payload too large: {size} bytes exceeds the {max}-byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    /// The vault cannot fund the requested operation.
    #[error("insufficient vault funds: {required} sats required, {available} available")]
    InsufficientFunds { required: u64, available: u64 },

    /// The vault has no spendable UTXOs at all.
    #[error("vault {address} has no spendable utxos")]
    VaultEmpty { address: String },

    /// No unspent certificate UTXO at the given outpoint.
    #[error("certificate utxo not found: {txid}:{vout}")]
    CertificateNotFound { txid: String, vout: u32 },

    /// The operation is not permitted for the caller's role.
    #[error("role '{role}' is not allowed to perform '{operation}'")]
    PermissionDenied { role: Role, operation: &'static str },

    #[error("signer error: {0}")]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Witness(#[from] WitnessError),

    #[error("contract engine error: {0}")]
    Engine(#[from] EngineError),

    /// The ledger rejected a raw transaction at broadcast.
    #[error("broadcast rejected: {message}")]
    Broadcast { message: String, tx_excerpt: String },

    /// Transport or HTTP failure talking to the ledger.
    #[error("network error: {0}")]
    Network(LedgerError),

    #[error("transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("confirmation timeout for {txid}: {elapsed_secs}s elapsed, {last_confirmations} confirmations")]
    ConfirmationTimeout {
        txid: String,
        elapsed_secs: u64,
        last_confirmations: u32,
    },

    /// A prepared transaction was finalized past its expiry.
    #[error("prepared transaction has expired")]
    Expired,

    /// A finalize signature with the wrong length.
    #[error("invalid signature: expected 64 bytes, got {0}")]
    InvalidSignature(usize),
}

pub type SasResult<T> = Result<T, SasError>;

impl From<LedgerError> for SasError {
    fn from(err: LedgerError) -> Self {
        // Broadcast rejections are their own failure kind; everything else
        // from the ledger is a transport problem.
        match err {
            LedgerError::Broadcast {
                message,
                tx_excerpt,
            } => SasError::Broadcast {
                message,
                tx_excerpt,
            },
            other => SasError::Network(other),
        }
    }
}

impl From<PayloadError> for SasError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::TooLarge { size, max, .. } => SasError::PayloadTooLarge { size, max },
            PayloadError::InvalidArgument(message) => SasError::InvalidArgument(message),
        }
    }
}

impl From<ConfirmationError> for SasError {
    fn from(err: ConfirmationError) -> Self {
        match err {
            ConfirmationError::NotFound(txid) => SasError::TransactionNotFound(txid),
            ConfirmationError::Timeout {
                txid,
                elapsed_secs,
                last_confirmations,
            } => SasError::ConfirmationTimeout {
                txid,
                elapsed_secs,
                last_confirmations,
            },
        }
    }
}
