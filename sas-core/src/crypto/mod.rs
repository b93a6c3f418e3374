//! Key management and Schnorr signing for SAS operations
//!
//! The `Signer` capability is deliberately tiny: expose an x-only public key
//! and sign a 32-byte digest. Secret material never leaves a signer; external
//! key custody (hardware wallets, multisig quorums) goes through the
//! prepare/finalize flow instead of implementing this trait in-process.

mod signer;

pub use signer::{EnvSigner, MemorySigner};

use thiserror::Error;

/// X-only public key length in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Schnorr signature length in bytes.
pub const SIGNATURE_SIZE: usize = 64;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("secret must be 64 hex characters (32 bytes)")]
    InvalidSecret,

    #[error("environment variable {0} is not set")]
    MissingEnvVar(String),

    #[error("digest must be 32 bytes, got {0}")]
    InvalidDigest(usize),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Capability to sign pipeline digests under a known public key.
pub trait Signer: Send + Sync {
    /// The signer's 32-byte x-only public key.
    fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE];

    /// Produce a 64-byte Schnorr signature over a 32-byte digest.
    fn sign(&self, digest: &[u8; 32]) -> Result<[u8; SIGNATURE_SIZE], SignerError>;

    /// Hex form of the public key, as it appears in configuration.
    fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }
}
