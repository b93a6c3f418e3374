//! Protocol-wide constants for the SAS SDK
//!
//! Dust and fee values are policy, not protocol; `FeePolicy` in the
//! configuration can override them per deployment.

/// Flat transaction fee in satoshis.
pub const FEE_SATS: u64 = 500;

/// Certificate output value - the Liquid dust/relay minimum.
pub const CERT_DUST_SATS: u64 = 546;

/// Minimum vault balance required to issue a certificate.
///
/// Covers the certificate output, the fee, and a non-zero change output back
/// to the vault (the covenant requires all four outputs to be present).
pub const MIN_ISSUE_SATS: u64 = CERT_DUST_SATS + FEE_SATS + CERT_DUST_SATS;

/// Maximum size of a null-data (OP_RETURN) record.
pub const MAX_NULL_DATA_SIZE: usize = 80;

/// Size of the SAS record header: magic(3) + version(1) + opcode(1).
pub const HEADER_SIZE: usize = 5;

/// Maximum SAS record body size.
pub const MAX_PAYLOAD_SIZE: usize = MAX_NULL_DATA_SIZE - HEADER_SIZE;

/// Default ledger request timeout in seconds.
pub const LEDGER_TIMEOUT_SECS: u64 = 30;

/// Default confirmation poll interval in seconds.
pub const POLL_INTERVAL_SECS: u64 = 10;

/// Default confirmation wait timeout in seconds.
pub const CONFIRMATION_TIMEOUT_SECS: u64 = 600;

/// Confirmations at which a transaction counts as deeply confirmed.
pub const DEEP_CONFIRMATIONS: u32 = 6;
