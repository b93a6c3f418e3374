//! Witness bit-encoder for Simplicity spending paths
//!
//! A witness is the spending-path tag bits, followed by the 512 signature
//! bits, followed by zero padding to the next byte boundary - always exactly
//! 65 bytes. Bits are packed MSB-first.
//!
//! The vault program is `Either<Sig, Either<Sig, Sig>>`:
//!
//! | path                      | tag  | semantic                         |
//! |---------------------------|------|----------------------------------|
//! | Left                      | `0`  | admin drains unconditionally     |
//! | Right-Left                | `10` | admin issues under the covenant  |
//! | Right-Right               | `11` | delegate issues under the covenant |
//!
//! The certificate program is `Either<Sig, Sig>`: Left (`0`) admin revoke,
//! Right (`1`) delegate revoke.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Role;

/// Length of every encoded witness in bytes.
pub const WITNESS_SIZE: usize = 65;

/// Schnorr signature length in bytes.
pub const SIGNATURE_SIZE: usize = 64;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WitnessError {
    #[error("signature must be {SIGNATURE_SIZE} bytes, got {0}")]
    InvalidSignatureLength(usize),
}

/// One branch of a contract's sum-typed spending choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendingPath {
    /// Vault Left: admin spends without the covenant.
    VaultAdminDrain,
    /// Vault Right-Left: admin issues, covenant enforces the output set.
    VaultAdminIssue,
    /// Vault Right-Right: delegate issues, covenant enforces the output set.
    VaultDelegateIssue,
    /// Certificate Left: admin revokes.
    CertificateAdminRevoke,
    /// Certificate Right: delegate revokes.
    CertificateDelegateRevoke,
}

impl SpendingPath {
    /// Tag bits for this path as `(value, bit_count)`, MSB-first.
    pub fn tag_bits(&self) -> (u8, u8) {
        match self {
            SpendingPath::VaultAdminDrain => (0b0, 1),
            SpendingPath::VaultAdminIssue => (0b10, 2),
            SpendingPath::VaultDelegateIssue => (0b11, 2),
            SpendingPath::CertificateAdminRevoke => (0b0, 1),
            SpendingPath::CertificateDelegateRevoke => (0b1, 1),
        }
    }

    /// Issue path for the given role.
    pub fn vault_issue(role: Role) -> Self {
        match role {
            Role::Admin => SpendingPath::VaultAdminIssue,
            Role::Delegate => SpendingPath::VaultDelegateIssue,
        }
    }

    /// Revoke path for the given role.
    pub fn certificate_revoke(role: Role) -> Self {
        match role {
            Role::Admin => SpendingPath::CertificateAdminRevoke,
            Role::Delegate => SpendingPath::CertificateDelegateRevoke,
        }
    }
}

/// Encodes spending-path witnesses.
pub struct WitnessEncoder;

impl WitnessEncoder {
    /// Encode a witness: tag bits, 512 signature bits, zero padding.
    pub fn encode(path: SpendingPath, signature: &[u8]) -> Result<[u8; WITNESS_SIZE], WitnessError> {
        if signature.len() != SIGNATURE_SIZE {
            return Err(WitnessError::InvalidSignatureLength(signature.len()));
        }

        let (tag, tag_len) = path.tag_bits();
        let mut out = [0u8; WITNESS_SIZE];
        let mut bit = 0usize;

        let mut push = |set: bool, out: &mut [u8; WITNESS_SIZE]| {
            if set {
                out[bit / 8] |= 0x80 >> (bit % 8);
            }
            bit += 1;
        };

        for i in (0..tag_len).rev() {
            push(tag >> i & 1 == 1, &mut out);
        }
        for byte in signature {
            for i in (0..8).rev() {
                push(byte >> i & 1 == 1, &mut out);
            }
        }
        // Remaining bits stay zero: the padding to the byte boundary.
        Ok(out)
    }

    /// Hex form consumed by the contract engine.
    pub fn encode_hex(path: SpendingPath, signature: &[u8]) -> Result<String, WitnessError> {
        Ok(hex::encode(Self::encode(path, signature)?))
    }

    /// Witness with a zero signature, used to drive the engine's dry run that
    /// reveals the signature digest before signing.
    pub fn dummy(path: SpendingPath) -> [u8; WITNESS_SIZE] {
        Self::encode(path, &[0u8; SIGNATURE_SIZE]).expect("zero signature has a valid length")
    }

    pub fn dummy_hex(path: SpendingPath) -> String {
        hex::encode(Self::dummy(path))
    }
}
