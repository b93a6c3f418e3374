//! Compiled contract registry
//!
//! Holds the vault and certificate covenant programs together with the
//! network parameters the transaction pipeline binds inputs against.
//! Read-only after construction.

pub mod engine;
pub mod witness;

use serde::{Deserialize, Serialize};

use crate::error::{SasError, SasResult};

/// A compiled Simplicity contract. All fields are public information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    /// Network-prefixed bech32m script address.
    pub address: String,
    /// Commitment Merkle root of the compiled program (32 bytes, hex).
    pub cmr: String,
    /// Script pubkey of the contract address (hex).
    pub script_pubkey: String,
    /// Base64-encoded program, as emitted by the compiler.
    pub program: String,
}

impl ContractInfo {
    fn validate(&self, name: &str) -> SasResult<()> {
        if self.address.is_empty() {
            return Err(SasError::Configuration(format!(
                "{} contract has an empty address",
                name
            )));
        }
        if self.cmr.len() != 64 || hex::decode(&self.cmr).is_err() {
            return Err(SasError::Configuration(format!(
                "{} contract cmr must be 32 bytes of hex",
                name
            )));
        }
        if self.script_pubkey.is_empty() || hex::decode(&self.script_pubkey).is_err() {
            return Err(SasError::Configuration(format!(
                "{} contract script_pubkey must be hex",
                name
            )));
        }
        if self.program.is_empty() {
            return Err(SasError::Configuration(format!(
                "{} contract program is empty",
                name
            )));
        }
        Ok(())
    }
}

/// The two contracts the SDK spends from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractKind {
    Vault,
    Certificate,
}

/// Compiled contracts plus the parameters shared by every input binding.
#[derive(Debug, Clone)]
pub struct ContractRegistry {
    asset_id: String,
    internal_key: String,
    vault: ContractInfo,
    certificate: ContractInfo,
}

impl ContractRegistry {
    pub fn new(
        asset_id: impl Into<String>,
        internal_key: impl Into<String>,
        vault: ContractInfo,
        certificate: ContractInfo,
    ) -> SasResult<Self> {
        let asset_id = asset_id.into();
        let internal_key = internal_key.into();
        if asset_id.len() != 64 || hex::decode(&asset_id).is_err() {
            return Err(SasError::Configuration(
                "asset_id must be 32 bytes of hex".to_string(),
            ));
        }
        if internal_key.len() != 64 || hex::decode(&internal_key).is_err() {
            return Err(SasError::Configuration(
                "internal_key must be a 32-byte x-only key in hex".to_string(),
            ));
        }
        vault.validate("vault")?;
        certificate.validate("certificate")?;
        Ok(ContractRegistry {
            asset_id,
            internal_key,
            vault,
            certificate,
        })
    }

    pub fn contract(&self, kind: ContractKind) -> &ContractInfo {
        match kind {
            ContractKind::Vault => &self.vault,
            ContractKind::Certificate => &self.certificate,
        }
    }

    pub fn vault(&self) -> &ContractInfo {
        &self.vault
    }

    pub fn certificate(&self) -> &ContractInfo {
        &self.certificate
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    /// Taproot internal key every input is bound with.
    pub fn internal_key(&self) -> &str {
        &self.internal_key
    }
}
