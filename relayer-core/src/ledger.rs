use crate::error::SubmissionError;
use crate::pipeline::RelayState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::signature::Signature;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub state: RelayState,
    pub signature: Option<String>,
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct LedgerInner {
    entries: HashMap<[u8; 32], LedgerEntry>,
    in_flight: HashSet<[u8; 32]>,
}

/// In-memory record of relay attempts per message hash. Serializes attempts
/// for the same message and refuses to start one after a submission.
#[derive(Clone, Default)]
pub struct RelayLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

impl RelayLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        // The map stays consistent across a panicking holder.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin(&self, message_hash: [u8; 32]) -> Result<InFlightGuard, SubmissionError> {
        let mut inner = self.lock();

        if let Some(entry) = inner.entries.get(&message_hash) {
            // A signature is only recorded once a transport accepted the
            // transaction, even if the attempt later failed.
            if entry.state.has_submitted() || entry.signature.is_some() {
                return Err(SubmissionError::AlreadySubmitted {
                    message_hash: hex::encode(message_hash),
                    signature: entry.signature.clone().unwrap_or_default(),
                });
            }
        }
        if !inner.in_flight.insert(message_hash) {
            return Err(SubmissionError::InFlight {
                message_hash: hex::encode(message_hash),
            });
        }

        debug!(message_hash = %hex::encode(message_hash), "relay slot taken");
        Ok(InFlightGuard {
            ledger: self.clone(),
            message_hash,
        })
    }

    /// Keeps the furthest state: a recorded submission is never replaced by a
    /// later non-submitted state.
    pub fn record(&self, message_hash: [u8; 32], state: RelayState, signature: Option<&Signature>) {
        let mut inner = self.lock();
        let now = Utc::now();

        let entry = inner
            .entries
            .entry(message_hash)
            .or_insert_with(|| LedgerEntry {
                state,
                signature: None,
                attempts: 0,
                updated_at: now,
            });

        entry.attempts += 1;
        entry.updated_at = now;
        if !entry.state.has_submitted() || state.has_submitted() {
            entry.state = state;
        }
        if let Some(signature) = signature {
            entry.signature = Some(signature.to_string());
        }
    }

    pub fn entry(&self, message_hash: &[u8; 32]) -> Option<LedgerEntry> {
        self.lock().entries.get(message_hash).cloned()
    }

    pub fn is_in_flight(&self, message_hash: &[u8; 32]) -> bool {
        self.lock().in_flight.contains(message_hash)
    }

    fn release(&self, message_hash: &[u8; 32]) {
        self.lock().in_flight.remove(message_hash);
    }
}

/// Holds the in-flight slot for one message hash until dropped.
pub struct InFlightGuard {
    ledger: RelayLedger,
    message_hash: [u8; 32],
}

impl InFlightGuard {
    pub fn message_hash(&self) -> [u8; 32] {
        self.message_hash
    }

    pub fn record(&self, state: RelayState, signature: Option<&Signature>) {
        self.ledger.record(self.message_hash, state, signature);
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ledger.release(&self.message_hash);
    }
}
