//! SDK configuration
//!
//! The configuration object carries only public information - network, asset,
//! contract data and the authorized public keys - and is safe to commit or
//! share. Secrets are supplied separately to the facade constructors and
//! never appear here.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{CERT_DUST_SATS, FEE_SATS};
use crate::contract::{ContractInfo, ContractRegistry};
use crate::error::{SasError, SasResult};
use crate::models::Role;
use crate::Network;

/// Dust and fee policy. Policy, not protocol: deployments may override the
/// defaults per network conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    #[serde(default = "default_fee_sats")]
    pub fee_sats: u64,
    #[serde(default = "default_cert_dust_sats")]
    pub cert_dust_sats: u64,
}

fn default_fee_sats() -> u64 {
    FEE_SATS
}

fn default_cert_dust_sats() -> u64 {
    CERT_DUST_SATS
}

impl Default for FeePolicy {
    fn default() -> Self {
        FeePolicy {
            fee_sats: FEE_SATS,
            cert_dust_sats: CERT_DUST_SATS,
        }
    }
}

impl FeePolicy {
    /// Minimum vault balance for an issuance: certificate output + fee +
    /// non-zero change (the covenant requires all four outputs).
    pub fn min_issue_sats(&self) -> u64 {
        self.cert_dust_sats + self.fee_sats + self.cert_dust_sats
    }
}

/// Public deployment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SasConfig {
    pub network: Network,
    /// 32-byte asset tag, hex.
    pub asset_id: String,
    /// Admin x-only public key, hex.
    pub admin_pubkey: String,
    /// Delegate x-only public key, hex.
    pub delegate_pubkey: String,
    pub vault: ContractInfo,
    pub certificate: ContractInfo,
    /// Taproot internal key shared by both contracts, hex.
    pub internal_key: String,
    /// Explicit path to the contract engine binary. Discovered on `PATH`
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_binary: Option<PathBuf>,
    /// Custom Esplora base URL; the network default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub fees: FeePolicy,
}

impl SasConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> SasResult<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| {
            SasError::Configuration(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: SasConfig = serde_json::from_str(&data).map_err(|e| {
            SasError::Configuration(format!("malformed config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to a JSON file. Contains no secrets.
    pub fn save(&self, path: impl AsRef<Path>) -> SasResult<()> {
        let path = path.as_ref();
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| SasError::Configuration(format!("cannot serialize config: {}", e)))?;
        fs::write(path, data).map_err(|e| {
            SasError::Configuration(format!("cannot write config {}: {}", path.display(), e))
        })
    }

    /// The public key declared for a role.
    pub fn pubkey_for(&self, role: Role) -> &str {
        match role {
            Role::Admin => &self.admin_pubkey,
            Role::Delegate => &self.delegate_pubkey,
        }
    }

    /// Esplora base URL, honoring the override.
    pub fn api_base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or_else(|| self.network.esplora_url())
    }

    pub fn validate(&self) -> SasResult<()> {
        for (name, key) in [
            ("admin_pubkey", &self.admin_pubkey),
            ("delegate_pubkey", &self.delegate_pubkey),
        ] {
            if key.len() != 64 || hex::decode(key).is_err() {
                return Err(SasError::Configuration(format!(
                    "{} must be a 32-byte x-only key in hex",
                    name
                )));
            }
        }
        // Registry construction validates the asset, internal key and both
        // contracts.
        self.registry().map(|_| ())
    }

    /// Build the contract registry from this configuration.
    pub fn registry(&self) -> SasResult<ContractRegistry> {
        ContractRegistry::new(
            self.asset_id.clone(),
            self.internal_key.clone(),
            self.vault.clone(),
            self.certificate.clone(),
        )
    }
}
