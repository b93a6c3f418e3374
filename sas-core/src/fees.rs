//! Fee estimation for Liquid transactions
//!
//! Advisory only: the transaction builder spends the flat configured fee.
//! Liquid fees are very stable, so the estimator uses static per-priority
//! rates and per-operation size estimates.

use serde::{Deserialize, Serialize};

/// Target confirmation urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeePriority {
    Low,
    Medium,
    High,
    Urgent,
}

/// Operations with known typical sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeeOperation {
    /// Four outputs: change, certificate, null-data, fee.
    IssueCertificate,
    /// One or two outputs plus an optional null-data record.
    RevokeCertificate,
    /// Two outputs.
    DrainVault,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeEstimate {
    pub sat_per_vbyte: f64,
    pub total_sats: u64,
    pub priority: FeePriority,
    pub estimated_blocks: u32,
}

/// Minimum fee the network will relay.
pub const MIN_FEE_SATS: u64 = 100;

/// Static fee estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeeEstimator;

impl FeeEstimator {
    pub fn new() -> Self {
        FeeEstimator
    }

    fn rate(priority: FeePriority) -> f64 {
        match priority {
            FeePriority::Low => 0.10,
            FeePriority::Medium => 0.11,
            FeePriority::High => 0.15,
            FeePriority::Urgent => 0.20,
        }
    }

    fn blocks(priority: FeePriority) -> u32 {
        match priority {
            FeePriority::Low => 6,
            FeePriority::Medium => 2,
            FeePriority::High | FeePriority::Urgent => 1,
        }
    }

    fn vbytes(operation: FeeOperation) -> u64 {
        match operation {
            FeeOperation::IssueCertificate => 350,
            FeeOperation::RevokeCertificate => 200,
            FeeOperation::DrainVault => 200,
        }
    }

    /// Estimate the fee for an operation at a priority level.
    pub fn estimate(&self, operation: FeeOperation, priority: FeePriority) -> FeeEstimate {
        self.estimate_for_size(Self::vbytes(operation), priority)
    }

    /// Estimate the fee for a transaction of a known virtual size.
    pub fn estimate_for_size(&self, vbytes: u64, priority: FeePriority) -> FeeEstimate {
        let rate = Self::rate(priority);
        let total_sats = ((vbytes as f64 * rate) as u64).max(MIN_FEE_SATS);
        FeeEstimate {
            sat_per_vbyte: rate,
            total_sats,
            priority,
            estimated_blocks: Self::blocks(priority),
        }
    }
}
