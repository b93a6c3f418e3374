//! Esplora ledger client
//!
//! Read UTXOs and transaction state, and submit raw transactions, against a
//! Blockstream Esplora-style HTTP API. The client owns its HTTP session and a
//! per-request timeout; every failure carries the endpoint that produced it.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::LEDGER_TIMEOUT_SECS;
use crate::models::Utxo;
use crate::Network;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("failed to construct HTTP client: {0}")]
    Client(reqwest::Error),

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("invalid response from {endpoint}: {detail}")]
    InvalidResponse { endpoint: String, detail: String },

    /// The broadcast endpoint returned something other than a txid.
    #[error("broadcast rejected: {message}")]
    Broadcast {
        message: String,
        tx_excerpt: String,
    },
}

/// Transaction confirmation state as reported by `GET /tx/{txid}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct TxStatusInfo {
    pub confirmed: bool,
    pub block_height: Option<u64>,
    pub block_hash: Option<String>,
    pub block_time: Option<u64>,
}

/// Spend state of one output, from `GET /tx/{txid}/outspend/{vout}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Outspend {
    pub spent: bool,
    /// Txid of the spending transaction, when spent.
    pub txid: Option<String>,
    pub vin: Option<u32>,
    pub status: Option<TxStatusInfo>,
}

/// One output of a fetched transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct TxOutInfo {
    pub scriptpubkey: String,
    #[serde(default)]
    pub scriptpubkey_type: String,
    pub value: Option<u64>,
    pub asset: Option<String>,
}

/// A transaction as returned by `GET /tx/{txid}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TxInfo {
    pub txid: String,
    #[serde(default)]
    pub vout: Vec<TxOutInfo>,
    pub status: Option<TxStatusInfo>,
}

/// Chain access used by the pipeline, the facade and the confirmation
/// tracker. `EsploraClient` is the production implementation; tests drive the
/// SDK through stub ledgers.
pub trait Ledger: Send + Sync {
    fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, LedgerError>;

    fn get_balance(&self, address: &str) -> Result<u64, LedgerError> {
        Ok(self.get_utxos(address)?.iter().map(|u| u.value).sum())
    }

    fn get_transaction(&self, txid: &str) -> Result<Option<TxInfo>, LedgerError>;

    fn get_tx_status(&self, txid: &str) -> Result<Option<TxStatusInfo>, LedgerError>;

    /// Current chain tip height, for confirmation depth.
    fn get_tip_height(&self) -> Result<u64, LedgerError>;

    fn get_outspend(&self, txid: &str, vout: u32) -> Result<Option<Outspend>, LedgerError>;

    fn is_utxo_spent(&self, txid: &str, vout: u32) -> Result<bool, LedgerError> {
        Ok(self
            .get_outspend(txid, vout)?
            .map(|o| o.spent)
            .unwrap_or(false))
    }

    /// Submit a raw transaction; returns the txid on acceptance.
    fn broadcast(&self, tx_hex: &str) -> Result<String, LedgerError>;
}

/// HTTP client for a Blockstream Esplora API.
pub struct EsploraClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl EsploraClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, LedgerError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(LEDGER_TIMEOUT_SECS))
            .build()
            .map_err(LedgerError::Client)?;
        Ok(EsploraClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn for_network(network: Network) -> Result<Self, LedgerError> {
        Self::new(network.esplora_url())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Option<T>, LedgerError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(endpoint, "ledger GET");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|source| LedgerError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(LedgerError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .map(Some)
            .map_err(|e| LedgerError::InvalidResponse {
                endpoint: endpoint.to_string(),
                detail: e.to_string(),
            })
    }

    fn get_text(&self, endpoint: &str) -> Result<String, LedgerError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|source| LedgerError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().map_err(|e| LedgerError::InvalidResponse {
            endpoint: endpoint.to_string(),
            detail: e.to_string(),
        })
    }
}

fn is_txid(body: &str) -> bool {
    body.len() == 64 && body.bytes().all(|b| b.is_ascii_hexdigit())
}

impl Ledger for EsploraClient {
    fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, LedgerError> {
        let endpoint = format!("address/{}/utxo", address);
        Ok(self.get_json(&endpoint)?.unwrap_or_default())
    }

    fn get_transaction(&self, txid: &str) -> Result<Option<TxInfo>, LedgerError> {
        self.get_json(&format!("tx/{}", txid))
    }

    fn get_tx_status(&self, txid: &str) -> Result<Option<TxStatusInfo>, LedgerError> {
        self.get_json(&format!("tx/{}/status", txid))
    }

    fn get_tip_height(&self) -> Result<u64, LedgerError> {
        let endpoint = "blocks/tip/height";
        let body = self.get_text(endpoint)?;
        body.trim()
            .parse()
            .map_err(|_| LedgerError::InvalidResponse {
                endpoint: endpoint.to_string(),
                detail: format!("expected a block height, got '{}'", body.trim()),
            })
    }

    fn get_outspend(&self, txid: &str, vout: u32) -> Result<Option<Outspend>, LedgerError> {
        self.get_json(&format!("tx/{}/outspend/{}", txid, vout))
    }

    fn broadcast(&self, tx_hex: &str) -> Result<String, LedgerError> {
        let endpoint = "tx";
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(bytes = tx_hex.len() / 2, "broadcasting raw transaction");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "text/plain")
            .body(tx_hex.to_string())
            .send()
            .map_err(|source| LedgerError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        // Esplora answers with the txid as plain text on success and a
        // free-text error otherwise, regardless of status code nuances.
        let body = response
            .text()
            .map_err(|e| LedgerError::InvalidResponse {
                endpoint: endpoint.to_string(),
                detail: e.to_string(),
            })?
            .trim()
            .to_string();

        if is_txid(&body) {
            Ok(body)
        } else {
            warn!(message = %body, "broadcast rejected by ledger");
            Err(LedgerError::Broadcast {
                message: body,
                tx_excerpt: tx_hex.chars().take(64).collect(),
            })
        }
    }
}
