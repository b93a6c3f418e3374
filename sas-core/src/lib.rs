//! SAS Core Library - Simplicity attestation certificates on Liquid
//!
//! A client-side SDK for issuing, verifying and revoking on-chain attestation
//! certificates. Each certificate is an unspent transaction output held at a
//! dedicated covenant address: the certificate is valid while the UTXO is
//! unspent and revoked by the transaction that spends it.
//!
//! The SDK drives an external Simplicity toolchain (`hal-simplicity`) for
//! transaction assembly and an Esplora-style HTTP API for chain access. All
//! operations are synchronous; a single issue/revoke/drain call runs the full
//! pipeline to completion on the caller's thread.

use serde::{Deserialize, Serialize};

pub mod builder;
pub mod confirmation;
pub mod config;
pub mod constants;
pub mod contract;
pub mod crypto;
pub mod error;
pub mod fees;
pub mod ledger;
pub mod models;
pub mod prepared;
pub mod protocol;

mod client;

// Re-export common types
pub use builder::{RevokeOptions, TransactionBuilder};
pub use client::Sas;
pub use confirmation::{ConfirmationStatus, ConfirmationTracker, TxState};
pub use config::{FeePolicy, SasConfig};
pub use contract::engine::{ContractEngine, RunResult, SimplicityCli};
pub use contract::witness::{SpendingPath, WitnessEncoder};
pub use contract::{ContractInfo, ContractKind, ContractRegistry};
pub use crypto::{EnvSigner, MemorySigner, Signer};
pub use error::{SasError, SasResult};
pub use fees::{FeeEstimate, FeeEstimator, FeeOperation, FeePriority};
pub use ledger::{EsploraClient, Ledger};
pub use models::{Certificate, CertificateStatus, Role, TransactionResult, Utxo, Vault};
pub use prepared::{PreparedSummary, PreparedTransaction, TransactionType};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Liquid network the SDK operates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    #[serde(rename = "liquidtestnet")]
    LiquidTestnet,
    #[serde(rename = "liquid")]
    Liquid,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::LiquidTestnet => "liquidtestnet",
            Network::Liquid => "liquid",
        }
    }

    /// L-BTC asset id for this network.
    pub fn default_asset_id(&self) -> &'static str {
        match self {
            Network::LiquidTestnet => {
                "144c654344aa716d6f3abcc1ca90e5641e4e2a7f633bc09fe3baf64585819a49"
            }
            Network::Liquid => {
                "6f0279e9ed041c3d710a9f57d0c02928416460c4b722ae3457a11eec381c526d"
            }
        }
    }

    /// Base URL of the public Esplora API for this network.
    pub fn esplora_url(&self) -> &'static str {
        match self {
            Network::LiquidTestnet => "https://blockstream.info/liquidtestnet/api",
            Network::Liquid => "https://blockstream.info/liquid/api",
        }
    }

    /// Block explorer URL for a transaction.
    pub fn explorer_tx_url(&self, txid: &str) -> String {
        match self {
            Network::LiquidTestnet => format!("https://blockstream.info/liquidtestnet/tx/{}", txid),
            Network::Liquid => format!("https://blockstream.info/liquid/tx/{}", txid),
        }
    }

    /// Network flag passed to the contract engine CLI.
    pub fn engine_flag(&self) -> &'static str {
        "liquid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_round_trip() {
        let json = serde_json::to_string(&Network::LiquidTestnet).unwrap();
        assert_eq!(json, "\"liquidtestnet\"");
        let back: Network = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Network::LiquidTestnet);
    }

    #[test]
    fn test_explorer_url() {
        let url = Network::LiquidTestnet.explorer_tx_url("ab".repeat(32).as_str());
        assert!(url.starts_with("https://blockstream.info/liquidtestnet/tx/"));
        assert!(url.ends_with(&"ab".repeat(32)));
    }
}
