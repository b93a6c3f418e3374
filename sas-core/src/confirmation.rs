//! Transaction confirmation tracking
//!
//! Polls the ledger for a submitted transaction and exposes its observable
//! state, either through a blocking wait or through fire-and-forget
//! callbacks served by a background worker thread. The worker starts lazily
//! with the first callback and terminates once none remain.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::{CONFIRMATION_TIMEOUT_SECS, DEEP_CONFIRMATIONS, POLL_INTERVAL_SECS};
use crate::ledger::Ledger;

/// Successive NOT_FOUND polls tolerated before giving up.
const MAX_NOT_FOUND_POLLS: u32 = 3;

#[derive(Error, Debug)]
pub enum ConfirmationError {
    #[error("transaction {0} not found after repeated polls")]
    NotFound(String),

    #[error("timed out waiting for {txid}: {elapsed_secs}s elapsed, {last_confirmations} confirmations")]
    Timeout {
        txid: String,
        elapsed_secs: u64,
        last_confirmations: u32,
    },
}

/// Observable state of a tracked transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Broadcast but not yet in a block.
    Pending,
    /// At least one confirmation.
    Confirmed,
    /// At least [`DEEP_CONFIRMATIONS`] confirmations.
    DeepConfirmed,
    /// The ledger does not know the transaction (or was unreachable).
    NotFound,
    /// Replaced by a conflicting transaction.
    Replaced,
}

#[derive(Debug, Clone)]
pub struct ConfirmationStatus {
    pub txid: String,
    pub state: TxState,
    pub confirmations: u32,
    pub block_height: Option<u64>,
    pub block_hash: Option<String>,
}

impl ConfirmationStatus {
    fn not_found(txid: &str) -> Self {
        ConfirmationStatus {
            txid: txid.to_string(),
            state: TxState::NotFound,
            confirmations: 0,
            block_height: None,
            block_hash: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmations >= 1
    }

    pub fn is_deep_confirmed(&self) -> bool {
        self.confirmations >= DEEP_CONFIRMATIONS
    }
}

type ConfirmationHandler = Box<dyn FnOnce(ConfirmationStatus) + Send + 'static>;

struct CallbackEntry {
    txid: String,
    target: u32,
    handler: ConfirmationHandler,
}

/// Tracks transaction confirmations against one ledger.
pub struct ConfirmationTracker {
    ledger: Arc<dyn Ledger>,
    poll_interval: Duration,
    callbacks: Arc<Mutex<Vec<CallbackEntry>>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ConfirmationTracker {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self::with_poll_interval(ledger, Duration::from_secs(POLL_INTERVAL_SECS))
    }

    pub fn with_poll_interval(ledger: Arc<dyn Ledger>, poll_interval: Duration) -> Self {
        ConfirmationTracker {
            ledger,
            poll_interval,
            callbacks: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Current confirmation state, from a single ledger query.
    pub fn get_status(&self, txid: &str) -> ConfirmationStatus {
        let status = match self.ledger.get_tx_status(txid) {
            Ok(Some(status)) => status,
            Ok(None) => return ConfirmationStatus::not_found(txid),
            Err(e) => {
                debug!(txid, error = %e, "status query failed");
                return ConfirmationStatus::not_found(txid);
            }
        };

        if !status.confirmed {
            return ConfirmationStatus {
                txid: txid.to_string(),
                state: TxState::Pending,
                confirmations: 0,
                block_height: status.block_height,
                block_hash: status.block_hash,
            };
        }

        // Depth from the chain tip; a confirmed transaction with an unknown
        // tip still counts as one confirmation.
        let confirmations = match (status.block_height, self.ledger.get_tip_height()) {
            (Some(height), Ok(tip)) if tip >= height => {
                (tip - height + 1).min(u32::MAX as u64) as u32
            }
            _ => 1,
        };

        let state = if confirmations >= DEEP_CONFIRMATIONS {
            TxState::DeepConfirmed
        } else {
            TxState::Confirmed
        };

        ConfirmationStatus {
            txid: txid.to_string(),
            state,
            confirmations,
            block_height: status.block_height,
            block_hash: status.block_hash,
        }
    }

    /// Block until the transaction has at least `target` confirmations.
    ///
    /// Tolerates up to three successive NOT_FOUND polls (propagation lag)
    /// before failing with `NotFound`.
    pub fn wait_for_confirmation(
        &self,
        txid: &str,
        target: u32,
        timeout: Option<Duration>,
    ) -> Result<ConfirmationStatus, ConfirmationError> {
        let timeout = timeout.unwrap_or(Duration::from_secs(CONFIRMATION_TIMEOUT_SECS));
        let started = Instant::now();
        let mut not_found_polls = 0u32;
        let mut last_confirmations = 0u32;

        loop {
            let status = self.get_status(txid);

            if status.state == TxState::NotFound {
                not_found_polls += 1;
                if not_found_polls >= MAX_NOT_FOUND_POLLS {
                    return Err(ConfirmationError::NotFound(txid.to_string()));
                }
            } else {
                not_found_polls = 0;
                last_confirmations = status.confirmations;
            }

            if status.confirmations >= target {
                return Ok(status);
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(ConfirmationError::Timeout {
                    txid: txid.to_string(),
                    elapsed_secs: elapsed.as_secs(),
                    last_confirmations,
                });
            }

            let remaining = timeout - elapsed;
            thread::sleep(self.poll_interval.min(remaining));
        }
    }

    /// Register a callback invoked exactly once when the transaction reaches
    /// `target` confirmations. Starts the background worker lazily.
    pub fn on_confirmation<F>(&self, txid: &str, target: u32, callback: F)
    where
        F: FnOnce(ConfirmationStatus) + Send + 'static,
    {
        self.callbacks.lock().unwrap().push(CallbackEntry {
            txid: txid.to_string(),
            target,
            handler: Box::new(callback),
        });
        self.spawn_worker_if_needed();
    }

    fn spawn_worker_if_needed(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let ledger = Arc::clone(&self.ledger);
        let callbacks = Arc::clone(&self.callbacks);
        let running = Arc::clone(&self.running);
        let poll_interval = self.poll_interval;

        let handle = thread::spawn(move || {
            debug!("confirmation worker started");
            while running.load(Ordering::SeqCst) {
                // Snapshot the tracked txids, then poll with no lock held.
                let txids: Vec<String> = {
                    let entries = callbacks.lock().unwrap();
                    if entries.is_empty() {
                        break;
                    }
                    let mut txids: Vec<String> =
                        entries.iter().map(|e| e.txid.clone()).collect();
                    txids.sort();
                    txids.dedup();
                    txids
                };

                let statuses: std::collections::HashMap<String, ConfirmationStatus> = txids
                    .into_iter()
                    .map(|txid| {
                        let status = poll_status(ledger.as_ref(), &txid);
                        (txid, status)
                    })
                    .collect();

                let mut due = Vec::new();
                {
                    let mut entries = callbacks.lock().unwrap();
                    let mut index = 0;
                    while index < entries.len() {
                        let reached = statuses
                            .get(&entries[index].txid)
                            .map(|s| s.confirmations >= entries[index].target)
                            .unwrap_or(false);
                        if reached {
                            let entry = entries.swap_remove(index);
                            let status = statuses[&entry.txid].clone();
                            due.push((entry, status));
                        } else {
                            index += 1;
                        }
                    }
                }

                // Callbacks run outside the lock; a panicking callback must
                // not take the worker down.
                for (entry, status) in due {
                    let txid = entry.txid;
                    if catch_unwind(AssertUnwindSafe(move || (entry.handler)(status))).is_err() {
                        warn!(txid = %txid, "confirmation callback panicked");
                    }
                }

                if callbacks.lock().unwrap().is_empty() {
                    break;
                }

                // Sleep in short slices so stop() returns promptly.
                let mut slept = Duration::ZERO;
                while slept < poll_interval && running.load(Ordering::SeqCst) {
                    let slice = Duration::from_millis(100).min(poll_interval - slept);
                    thread::sleep(slice);
                    slept += slice;
                }
            }
            running.store(false, Ordering::SeqCst);
            debug!("confirmation worker stopped");
        });

        *self.worker.lock().unwrap() = Some(handle);
    }

    /// Number of callbacks still waiting.
    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }

    /// Stop the background worker and join it.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ConfirmationTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Status poll used by the worker, sharing the depth logic of `get_status`
/// without borrowing the tracker into the thread.
fn poll_status(ledger: &dyn Ledger, txid: &str) -> ConfirmationStatus {
    let status = match ledger.get_tx_status(txid) {
        Ok(Some(status)) => status,
        _ => return ConfirmationStatus::not_found(txid),
    };
    if !status.confirmed {
        return ConfirmationStatus {
            txid: txid.to_string(),
            state: TxState::Pending,
            confirmations: 0,
            block_height: status.block_height,
            block_hash: status.block_hash,
        };
    }
    let confirmations = match (status.block_height, ledger.get_tip_height()) {
        (Some(height), Ok(tip)) if tip >= height => (tip - height + 1).min(u32::MAX as u64) as u32,
        _ => 1,
    };
    let state = if confirmations >= DEEP_CONFIRMATIONS {
        TxState::DeepConfirmed
    } else {
        TxState::Confirmed
    };
    ConfirmationStatus {
        txid: txid.to_string(),
        state,
        confirmations,
        block_height: status.block_height,
        block_hash: status.block_hash,
    }
}
