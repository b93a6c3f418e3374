//! Contract engine adapter
//!
//! Typed driver for the external Simplicity toolchain (`hal-simplicity`).
//! Every operation shells out to a short-lived subprocess speaking JSON on
//! stdout; the wire details belong to the engine and are passed through
//! verbatim. The adapter only requires that the exit code signals success and
//! that a dry run exposes per-jet status plus the `sig_all_hash` digest.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::Network;

/// Default binary name looked up on `PATH`.
pub const DEFAULT_BINARY: &str = "hal-simplicity";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("contract engine binary not found at {}; install hal-simplicity or set engine_binary in the config", .0.display())]
    NotInstalled(PathBuf),

    #[error("engine '{step}' failed: {diagnostic}")]
    CommandFailed {
        step: &'static str,
        diagnostic: String,
    },

    #[error("engine '{step}' returned invalid output: {detail}")]
    InvalidOutput {
        step: &'static str,
        detail: String,
    },

    /// The signed witness did not satisfy the program.
    #[error("program verification failed, failing jets: {0:?}")]
    VerificationFailed(Vec<String>),

    /// The dry run completed but exposed no signature digest.
    #[error("dry run did not expose a sig_all_hash digest")]
    MissingSigAllHash,
}

/// A transaction input handed to `pst create`.
#[derive(Debug, Clone, Serialize)]
pub struct PstInput {
    pub txid: String,
    pub vout: u32,
}

/// A transaction output handed to `pst create`.
///
/// The engine recognizes two pseudo-addresses: `data:<hex>` for a null-data
/// output and `fee` for the explicit fee output. Amounts are denominated in
/// BTC.
#[derive(Debug, Clone, Serialize)]
pub struct PstOutput {
    pub address: String,
    pub asset: String,
    pub amount: f64,
}

impl PstOutput {
    pub fn to_address(address: impl Into<String>, asset: impl Into<String>, sats: u64) -> Self {
        PstOutput {
            address: address.into(),
            asset: asset.into(),
            amount: sats_to_btc(sats),
        }
    }

    pub fn null_data(payload_hex: impl AsRef<str>, asset: impl Into<String>) -> Self {
        PstOutput {
            address: format!("data:{}", payload_hex.as_ref()),
            asset: asset.into(),
            amount: 0.0,
        }
    }

    pub fn fee(asset: impl Into<String>, sats: u64) -> Self {
        PstOutput {
            address: "fee".to_string(),
            asset: asset.into(),
            amount: sats_to_btc(sats),
        }
    }

    /// Whether this is the null-data output.
    pub fn is_null_data(&self) -> bool {
        self.address.starts_with("data:")
    }
}

/// UTXO metadata bound to a PST input before running the program.
#[derive(Debug, Clone)]
pub struct InputBinding<'a> {
    pub script_pubkey: &'a str,
    pub asset: &'a str,
    /// Amount as an 8-decimal BTC string, e.g. `"0.00100000"`.
    pub amount_btc: String,
    pub cmr: &'a str,
    pub internal_key: &'a str,
}

pub fn sats_to_btc(sats: u64) -> f64 {
    sats as f64 / 100_000_000.0
}

/// 8-decimal BTC string for the engine's `update-input` amount field.
pub fn format_btc(sats: u64) -> String {
    format!("{:.8}", sats_to_btc(sats))
}

/// Result of executing a single jet.
#[derive(Debug, Clone)]
pub struct JetResult {
    pub jet: String,
    pub success: bool,
    pub output_value: Option<String>,
}

/// Result of running a Simplicity program against a transaction context.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub success: bool,
    pub jets: Vec<JetResult>,
    /// The 32-byte digest the contract requires the signature to bind to,
    /// hex-encoded without a `0x` prefix.
    pub sig_all_hash: Option<String>,
}

impl RunResult {
    pub fn from_value(data: &Value) -> Self {
        let mut jets = Vec::new();
        let mut sig_all_hash = None;

        if let Some(items) = data.get("jets").and_then(Value::as_array) {
            for item in items {
                let jet = JetResult {
                    jet: item
                        .get("jet")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    success: item.get("success").and_then(Value::as_bool).unwrap_or(true),
                    output_value: item
                        .get("output_value")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                };
                if jet.jet == "sig_all_hash" {
                    if let Some(value) = &jet.output_value {
                        sig_all_hash = Some(value.trim_start_matches("0x").to_string());
                    }
                }
                jets.push(jet);
            }
        }

        RunResult {
            success: data
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            jets,
            sig_all_hash,
        }
    }

    /// Names of the jets that failed, for diagnostics.
    pub fn failed_jets(&self) -> Vec<String> {
        self.jets
            .iter()
            .filter(|j| !j.success)
            .map(|j| j.jet.clone())
            .collect()
    }

    /// The signature digest as raw bytes.
    pub fn sig_all_hash_bytes(&self) -> Option<[u8; 32]> {
        let hex_digest = self.sig_all_hash.as_ref()?;
        let decoded = hex::decode(hex_digest).ok()?;
        decoded.try_into().ok()
    }
}

/// The five-operation contract every engine backend satisfies.
pub trait ContractEngine: Send + Sync {
    fn pst_create(
        &self,
        inputs: &[PstInput],
        outputs: &[PstOutput],
    ) -> Result<String, EngineError>;

    fn pst_bind_input(
        &self,
        pst: &str,
        index: u32,
        binding: &InputBinding<'_>,
    ) -> Result<String, EngineError>;

    fn pst_run(
        &self,
        pst: &str,
        index: u32,
        program: &str,
        witness_hex: &str,
    ) -> Result<RunResult, EngineError>;

    fn pst_finalize(
        &self,
        pst: &str,
        index: u32,
        program: &str,
        witness_hex: &str,
    ) -> Result<String, EngineError>;

    fn pst_extract(&self, pst: &str) -> Result<String, EngineError>;
}

/// Subprocess driver for the `hal-simplicity` CLI.
#[derive(Debug)]
pub struct SimplicityCli {
    binary: PathBuf,
    network_flag: String,
}

impl SimplicityCli {
    /// Create a driver, locating the binary by explicit path, on `PATH`, or
    /// in the cargo bin directory. An absent binary is rejected here rather
    /// than at first use.
    pub fn new(binary: Option<PathBuf>, network: Network) -> Result<Self, EngineError> {
        let binary = match binary {
            Some(path) => {
                if !path.exists() {
                    return Err(EngineError::NotInstalled(path));
                }
                path
            }
            None => Self::discover().ok_or_else(|| {
                EngineError::NotInstalled(PathBuf::from(DEFAULT_BINARY))
            })?,
        };

        Ok(SimplicityCli {
            binary,
            network_flag: format!("--{}", network.engine_flag()),
        })
    }

    fn discover() -> Option<PathBuf> {
        if let Some(paths) = env::var_os("PATH") {
            for dir in env::split_paths(&paths) {
                let candidate = dir.join(DEFAULT_BINARY);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        if let Some(home) = env::var_os("HOME") {
            let candidate = Path::new(&home).join(".cargo/bin").join(DEFAULT_BINARY);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn run_command(&self, step: &'static str, args: &[&str]) -> Result<String, EngineError> {
        debug!(step, "invoking contract engine");
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| EngineError::CommandFailed {
                step,
                diagnostic: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(EngineError::CommandFailed {
                step,
                diagnostic: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_json(&self, step: &'static str, args: &[&str]) -> Result<Value, EngineError> {
        let stdout = self.run_command(step, args)?;
        let value: Value =
            serde_json::from_str(&stdout).map_err(|e| EngineError::InvalidOutput {
                step,
                detail: format!("{}: {}", e, stdout),
            })?;
        if let Some(message) = value.get("error").and_then(Value::as_str) {
            return Err(EngineError::CommandFailed {
                step,
                diagnostic: message.to_string(),
            });
        }
        Ok(value)
    }

    fn pst_field(step: &'static str, value: &Value) -> Result<String, EngineError> {
        value
            .get("pset")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(EngineError::InvalidOutput {
                step,
                detail: "missing 'pset' field".to_string(),
            })
    }
}

impl ContractEngine for SimplicityCli {
    fn pst_create(
        &self,
        inputs: &[PstInput],
        outputs: &[PstOutput],
    ) -> Result<String, EngineError> {
        const STEP: &str = "pset create";
        let inputs_json =
            serde_json::to_string(inputs).map_err(|e| EngineError::CommandFailed {
                step: STEP,
                diagnostic: format!("cannot encode inputs: {}", e),
            })?;
        let outputs_json =
            serde_json::to_string(outputs).map_err(|e| EngineError::CommandFailed {
                step: STEP,
                diagnostic: format!("cannot encode outputs: {}", e),
            })?;
        let value = self.run_json(
            STEP,
            &[
                "simplicity",
                "pset",
                "create",
                &self.network_flag,
                &inputs_json,
                &outputs_json,
            ],
        )?;
        Self::pst_field(STEP, &value)
    }

    fn pst_bind_input(
        &self,
        pst: &str,
        index: u32,
        binding: &InputBinding<'_>,
    ) -> Result<String, EngineError> {
        const STEP: &str = "pset update-input";
        let index = index.to_string();
        let input_utxo = format!(
            "{}:{}:{}",
            binding.script_pubkey, binding.asset, binding.amount_btc
        );
        let value = self.run_json(
            STEP,
            &[
                "simplicity",
                "pset",
                "update-input",
                &self.network_flag,
                pst,
                &index,
                "--input-utxo",
                &input_utxo,
                "--cmr",
                binding.cmr,
                "--internal-key",
                binding.internal_key,
            ],
        )?;
        Self::pst_field(STEP, &value)
    }

    fn pst_run(
        &self,
        pst: &str,
        index: u32,
        program: &str,
        witness_hex: &str,
    ) -> Result<RunResult, EngineError> {
        const STEP: &str = "pset run";
        let index = index.to_string();
        let value = self.run_json(
            STEP,
            &[
                "simplicity",
                "pset",
                "run",
                &self.network_flag,
                pst,
                &index,
                program,
                witness_hex,
            ],
        )?;
        Ok(RunResult::from_value(&value))
    }

    fn pst_finalize(
        &self,
        pst: &str,
        index: u32,
        program: &str,
        witness_hex: &str,
    ) -> Result<String, EngineError> {
        const STEP: &str = "pset finalize";
        let index = index.to_string();
        let value = self.run_json(
            STEP,
            &[
                "simplicity",
                "pset",
                "finalize",
                &self.network_flag,
                pst,
                &index,
                program,
                witness_hex,
            ],
        )?;
        Self::pst_field(STEP, &value)
    }

    fn pst_extract(&self, pst: &str) -> Result<String, EngineError> {
        const STEP: &str = "pset extract";
        let stdout = self.run_command(
            STEP,
            &["simplicity", "pset", "extract", &self.network_flag, pst],
        )?;
        // The CLI prints the raw hex as a JSON string.
        Ok(stdout.trim_matches('"').to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_run_result_extracts_sig_all_hash() {
        let value = json!({
            "success": true,
            "jets": [
                {"jet": "version", "success": true, "output_value": "0x02"},
                {"jet": "sig_all_hash", "success": true, "output_value": format!("0x{}", "cc".repeat(32))},
                {"jet": "bip_0340_verify", "success": true},
            ]
        });
        let result = RunResult::from_value(&value);
        assert!(result.success);
        assert_eq!(result.jets.len(), 3);
        assert_eq!(result.sig_all_hash.as_deref(), Some("cc".repeat(32).as_str()));
        assert_eq!(result.sig_all_hash_bytes(), Some([0xcc; 32]));
        assert!(result.failed_jets().is_empty());
    }

    #[test]
    fn test_run_result_collects_failed_jets() {
        let value = json!({
            "success": false,
            "jets": [
                {"jet": "num_outputs", "success": true},
                {"jet": "bip_0340_verify", "success": false},
                {"jet": "output_script_hash", "success": false},
            ]
        });
        let result = RunResult::from_value(&value);
        assert!(!result.success);
        assert_eq!(
            result.failed_jets(),
            vec!["bip_0340_verify".to_string(), "output_script_hash".to_string()]
        );
        assert_eq!(result.sig_all_hash, None);
    }

    #[test]
    fn test_run_result_tolerates_missing_fields() {
        let result = RunResult::from_value(&json!({}));
        assert!(!result.success);
        assert!(result.jets.is_empty());
        assert_eq!(result.sig_all_hash_bytes(), None);
    }

    #[test]
    fn test_missing_binary_is_rejected_at_construction() {
        let err = SimplicityCli::new(
            Some(PathBuf::from("/nonexistent/hal-simplicity")),
            Network::LiquidTestnet,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::NotInstalled(_)));
    }

    #[test]
    fn test_output_spec_values() {
        let out = PstOutput::null_data("53415001", "44".repeat(32));
        assert_eq!(out.address, "data:53415001");
        assert_eq!(out.amount, 0.0);
        assert!(out.is_null_data());

        let fee = PstOutput::fee("44".repeat(32), 500);
        assert_eq!(fee.address, "fee");
        assert_eq!(fee.amount, 0.000_005);

        let pay = PstOutput::to_address("tex1q", "44".repeat(32), 98_954);
        assert!((pay.amount - 0.000_989_54).abs() < 1e-12);
    }

    #[test]
    fn test_format_btc_is_8_decimals() {
        assert_eq!(format_btc(546), "0.00000546");
        assert_eq!(format_btc(100_000), "0.00100000");
        assert_eq!(format_btc(0), "0.00000000");
    }
}
