//! Per-attempt submission state machine:
//! `Building → BlockhashFetched → Signed → Submitted → {Confirmed | Failed}`.
//!
//! The recorded history is the only thing consulted when deciding whether a
//! transaction may be sent again. Once `Submitted` appears in it, nothing in
//! this module sends that attempt's transaction a second time.

use crate::error::{SignerError, SubmissionError, TransportError};
use crate::instruction::RelayInstructions;
use crate::message::AttestedMessage;
use crate::signer::SigningContext;
use crate::transport::{FinalityCheckpoint, LedgerRpc, LedgerStatus, RelayProxy};
use crate::utils::bytes_to_base64;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayState {
    Building,
    BlockhashFetched,
    Signed,
    Submitted,
    Confirmed,
    Failed,
}

impl RelayState {
    pub fn can_transition_to(self, next: RelayState) -> bool {
        use RelayState::*;
        matches!(
            (self, next),
            (Building, BlockhashFetched)
                | (BlockhashFetched, Signed)
                | (Signed, Submitted)
                | (Submitted, Confirmed)
                | (Building | BlockhashFetched | Signed | Submitted, Failed)
        )
    }

    /// The transaction has left this process.
    pub fn has_submitted(self) -> bool {
        matches!(self, RelayState::Submitted | RelayState::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RelayState::Confirmed | RelayState::Failed)
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayState::Building => "BUILDING",
            RelayState::BlockhashFetched => "BLOCKHASH_FETCHED",
            RelayState::Signed => "SIGNED",
            RelayState::Submitted => "SUBMITTED",
            RelayState::Confirmed => "CONFIRMED",
            RelayState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// One pass through the state machine.
#[derive(Debug, Clone)]
pub struct RelayAttempt {
    message_hash: [u8; 32],
    history: Vec<RelayState>,
    signature: Option<Signature>,
    error: Option<SubmissionError>,
    confirmation: Option<LedgerStatus>,
}

impl RelayAttempt {
    pub fn new(message_hash: [u8; 32]) -> Self {
        Self {
            message_hash,
            history: vec![RelayState::Building],
            signature: None,
            error: None,
            confirmation: None,
        }
    }

    pub fn message_hash(&self) -> [u8; 32] {
        self.message_hash
    }

    pub fn state(&self) -> RelayState {
        self.history
            .last()
            .copied()
            .unwrap_or(RelayState::Building)
    }

    pub fn history(&self) -> &[RelayState] {
        &self.history
    }

    pub fn reached(&self, state: RelayState) -> bool {
        self.history.contains(&state)
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn error(&self) -> Option<&SubmissionError> {
        self.error.as_ref()
    }

    pub fn confirmation(&self) -> Option<&LedgerStatus> {
        self.confirmation.as_ref()
    }

    /// False as soon as this attempt has handed its transaction to a
    /// transport, whatever happened afterwards.
    pub fn may_resend(&self) -> bool {
        !self.history.iter().any(|state| state.has_submitted())
    }

    fn advance(&mut self, next: RelayState) {
        debug_assert!(
            self.state().can_transition_to(next),
            "illegal relay transition {} -> {}",
            self.state(),
            next
        );
        info!(from = %self.state(), to = %next, "relay state");
        self.history.push(next);
    }

    fn fail(&mut self, error: SubmissionError) {
        warn!(state = %self.state(), error = %error, "relay attempt failed");
        self.advance(RelayState::Failed);
        self.error = Some(error);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub confirm: bool,
    pub confirmation_attempts: u32,
    pub confirmation_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confirm: false,
            confirmation_attempts: 30,
            confirmation_interval: Duration::from_secs(2),
        }
    }
}

/// Gets a built instruction set signed, sent and (optionally) confirmed.
#[derive(Clone)]
pub struct SubmissionPipeline {
    proxy: Option<Arc<dyn RelayProxy>>,
    direct: Arc<dyn LedgerRpc>,
    settings: PipelineSettings,
}

impl SubmissionPipeline {
    pub fn new(
        proxy: Option<Arc<dyn RelayProxy>>,
        direct: Arc<dyn LedgerRpc>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            proxy,
            direct,
            settings,
        }
    }

    /// Runs one attempt to completion. The returned attempt carries the
    /// state history, the signature once submitted, and the failure if any.
    pub async fn run(
        &self,
        message: &AttestedMessage,
        instructions: &RelayInstructions,
        payer: Pubkey,
        signer: &dyn SigningContext,
    ) -> RelayAttempt {
        let mut attempt = RelayAttempt::new(message.hash());

        let checkpoint = match self.fetch_checkpoint().await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                attempt.fail(e);
                return attempt;
            }
        };
        attempt.advance(RelayState::BlockhashFetched);

        let transaction = match self
            .sign(message, instructions, payer, checkpoint, signer)
            .await
        {
            Ok(transaction) => transaction,
            Err(e) => {
                attempt.fail(e);
                return attempt;
            }
        };
        attempt.advance(RelayState::Signed);

        match self.send(&transaction).await {
            Ok(signature) => {
                info!(%signature, "transaction submitted");
                attempt.signature = Some(signature);
                attempt.advance(RelayState::Submitted);
            }
            Err(e) => {
                attempt.fail(e);
                return attempt;
            }
        }

        if self.settings.confirm {
            self.confirm(&mut attempt).await;
        }
        attempt
    }

    /// Proxy first; any proxy failure falls through to the direct read.
    async fn fetch_checkpoint(&self) -> Result<FinalityCheckpoint, SubmissionError> {
        let mut proxy_error = None;
        if let Some(proxy) = &self.proxy {
            match proxy.fetch_blockhash().await {
                Ok(checkpoint) => {
                    debug!(blockhash = %checkpoint.blockhash, "blockhash from proxy");
                    return Ok(checkpoint);
                }
                Err(e) => {
                    warn!(error = %e, "proxy blockhash fetch failed, using direct rpc");
                    proxy_error = Some(e);
                }
            }
        }

        self.direct
            .latest_blockhash()
            .await
            .map_err(|direct| SubmissionError::Transient {
                stage: RelayState::BlockhashFetched,
                detail: match proxy_error {
                    Some(proxy) => format!("proxy: {proxy}; direct: {direct}"),
                    None => format!("direct: {direct}"),
                },
            })
    }

    async fn sign(
        &self,
        message: &AttestedMessage,
        instructions: &RelayInstructions,
        payer: Pubkey,
        checkpoint: FinalityCheckpoint,
        signer: &dyn SigningContext,
    ) -> Result<Transaction, SubmissionError> {
        // Read now, not when the instructions were built.
        let identity = signer
            .identity()
            .await
            .ok_or_else(|| SubmissionError::UserRejected {
                stage: RelayState::Signed,
                reason: SignerError::Disconnected.to_string(),
            })?;

        if identity != payer {
            return Err(SubmissionError::SignerChanged {
                expected: payer.to_string(),
                actual: identity.to_string(),
            });
        }

        if let Some(required) = message.destination_caller() {
            if required != identity {
                return Err(SubmissionError::CallerRestricted {
                    message: format!(
                        "message may only be relayed by {required}, connected signer is {identity}"
                    ),
                });
            }
        }

        let mut transaction = Transaction::new_with_payer(&instructions.to_vec(), Some(&payer));
        transaction.message.recent_blockhash = checkpoint.blockhash;

        let signed = signer.sign(transaction).await.map_err(|e| match e {
            SignerError::Rejected(reason) => SubmissionError::UserRejected {
                stage: RelayState::Signed,
                reason,
            },
            SignerError::Disconnected => SubmissionError::UserRejected {
                stage: RelayState::Signed,
                reason: SignerError::Disconnected.to_string(),
            },
            SignerError::Signing(message) => SubmissionError::Unknown {
                stage: RelayState::Signed,
                message,
                logs: Vec::new(),
            },
        })?;

        if !signed.is_signed() {
            return Err(SubmissionError::Unknown {
                stage: RelayState::Signed,
                message: "signer returned a transaction with missing signatures".to_string(),
                logs: Vec::new(),
            });
        }
        Ok(signed)
    }

    /// One send per transport. The direct path is only tried when the proxy
    /// could not be reached; a verdict from the ledger is final.
    async fn send(&self, transaction: &Transaction) -> Result<Signature, SubmissionError> {
        let mut proxy_error = None;
        if let Some(proxy) = &self.proxy {
            let wire = bincode::serialize(transaction).map_err(|e| SubmissionError::Unknown {
                stage: RelayState::Submitted,
                message: format!("failed to serialize transaction: {e}"),
                logs: Vec::new(),
            })?;

            match proxy.relay(&bytes_to_base64(&wire)).await {
                Ok(signature) => return Ok(signature),
                Err(TransportError::Unavailable(e)) => {
                    warn!(error = %e, "proxy relay unavailable, sending over direct rpc");
                    proxy_error = Some(e);
                }
                Err(e) => return Err(submission_error(e)),
            }
        }

        self.direct
            .send_transaction(transaction)
            .await
            .map_err(|e| match (e, proxy_error) {
                (TransportError::Unavailable(direct), Some(proxy)) => SubmissionError::Transient {
                    stage: RelayState::Submitted,
                    detail: format!("proxy: {proxy}; direct: {direct}"),
                },
                (e, _) => submission_error(e),
            })
    }

    /// Inconclusive polling leaves the attempt in `Submitted`.
    async fn confirm(&self, attempt: &mut RelayAttempt) {
        let Some(signature) = attempt.signature else {
            return;
        };

        for poll in 1..=self.settings.confirmation_attempts {
            match self.direct.signature_status(&signature).await {
                Ok(LedgerStatus::Finalized) => {
                    attempt.confirmation = Some(LedgerStatus::Finalized);
                    attempt.advance(RelayState::Confirmed);
                    return;
                }
                Ok(LedgerStatus::Failed(reason)) => {
                    attempt.confirmation = Some(LedgerStatus::Failed(reason.clone()));
                    attempt.fail(SubmissionError::Unknown {
                        stage: RelayState::Confirmed,
                        message: reason,
                        logs: Vec::new(),
                    });
                    return;
                }
                Ok(LedgerStatus::Pending) => {
                    debug!(poll, %signature, "transaction not final yet");
                    attempt.confirmation = Some(LedgerStatus::Pending);
                }
                Err(e) => {
                    debug!(poll, error = %e, "confirmation poll failed");
                }
            }

            if poll < self.settings.confirmation_attempts {
                tokio::time::sleep(self.settings.confirmation_interval).await;
            }
        }

        info!(%signature, "confirmation inconclusive, check the explorer");
    }
}

fn submission_error(error: TransportError) -> SubmissionError {
    match error {
        TransportError::Unavailable(detail) => SubmissionError::Transient {
            stage: RelayState::Submitted,
            detail,
        },
        TransportError::CallerRestricted(message) => SubmissionError::CallerRestricted { message },
        TransportError::Program { message, logs } => SubmissionError::Unknown {
            stage: RelayState::Submitted,
            message,
            logs,
        },
    }
}
