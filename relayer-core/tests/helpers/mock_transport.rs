use async_trait::async_trait;
use relayer_core::attestation::{AttestationBytes, AttestationSource, AttestationStatus};
use relayer_core::error::{AttestationError, PriceError, SignerError, TransportError};
use relayer_core::fee::PriceFeed;
use relayer_core::signer::{SignerIdentityChanged, SigningContext};
use relayer_core::transport::{FinalityCheckpoint, LedgerRpc, LedgerStatus, RelayProxy};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

#[derive(Clone, Debug)]
pub enum SignerBehavior {
    Approve,
    Reject(String),
    /// The first `identity()` read reports the held key, later reads report
    /// the given account, as if the user switched wallets mid-relay.
    SwitchAfterFirstRead(Pubkey),
}

pub struct StubSigner {
    keypair: Keypair,
    behavior: SignerBehavior,
    pub sign_calls: AtomicUsize,
    identity_reads: AtomicUsize,
    events: broadcast::Sender<SignerIdentityChanged>,
}

impl StubSigner {
    pub fn new(behavior: SignerBehavior) -> Self {
        let (events, _) = broadcast::channel(4);
        Self {
            keypair: Keypair::new(),
            behavior,
            sign_calls: AtomicUsize::new(0),
            identity_reads: AtomicUsize::new(0),
            events,
        }
    }

    pub fn approving() -> Self {
        Self::new(SignerBehavior::Approve)
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn sign_count(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SigningContext for StubSigner {
    async fn identity(&self) -> Option<Pubkey> {
        let reads = self.identity_reads.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            SignerBehavior::SwitchAfterFirstRead(other) if reads > 0 => Some(*other),
            _ => Some(self.keypair.pubkey()),
        }
    }

    async fn sign(&self, mut transaction: Transaction) -> Result<Transaction, SignerError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        if let SignerBehavior::Reject(reason) = &self.behavior {
            return Err(SignerError::Rejected(reason.clone()));
        }
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_sign(&[&self.keypair], blockhash)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        Ok(transaction)
    }

    fn subscribe(&self) -> broadcast::Receiver<SignerIdentityChanged> {
        self.events.subscribe()
    }
}

/// Primary transport with canned answers and call counters.
pub struct ScriptedProxy {
    blockhash: Result<FinalityCheckpoint, TransportError>,
    relay: Mutex<Option<Result<Signature, TransportError>>>,
    pub blockhash_calls: AtomicUsize,
    pub relay_calls: AtomicUsize,
    pub relayed: Mutex<Vec<String>>,
}

impl ScriptedProxy {
    /// `relay: None` echoes the transaction's own signature back.
    pub fn new(
        blockhash: Result<FinalityCheckpoint, TransportError>,
        relay: Option<Result<Signature, TransportError>>,
    ) -> Self {
        Self {
            blockhash,
            relay: Mutex::new(relay),
            blockhash_calls: AtomicUsize::new(0),
            relay_calls: AtomicUsize::new(0),
            relayed: Mutex::new(Vec::new()),
        }
    }

    pub fn healthy(checkpoint: FinalityCheckpoint) -> Self {
        Self::new(Ok(checkpoint), None)
    }

    pub fn relay_count(&self) -> usize {
        self.relay_calls.load(Ordering::SeqCst)
    }
}

fn first_signature(base64_tx: &str) -> Result<Signature, TransportError> {
    let bytes = relayer_core::utils::base64_to_bytes(base64_tx)
        .map_err(|e| TransportError::Unavailable(e.to_string()))?;
    let tx: Transaction =
        bincode::deserialize(&bytes).map_err(|e| TransportError::Unavailable(e.to_string()))?;
    tx.signatures
        .first()
        .copied()
        .ok_or_else(|| TransportError::Unavailable("unsigned".to_string()))
}

#[async_trait]
impl RelayProxy for ScriptedProxy {
    async fn fetch_blockhash(&self) -> Result<FinalityCheckpoint, TransportError> {
        self.blockhash_calls.fetch_add(1, Ordering::SeqCst);
        self.blockhash.clone()
    }

    async fn relay(&self, signed_transaction_base64: &str) -> Result<Signature, TransportError> {
        self.relay_calls.fetch_add(1, Ordering::SeqCst);
        self.relayed
            .lock()
            .unwrap()
            .push(signed_transaction_base64.to_string());
        match self.relay.lock().unwrap().clone() {
            Some(result) => result,
            None => first_signature(signed_transaction_base64),
        }
    }
}

/// Direct ledger path that counts every call.
pub struct CountingLedgerRpc {
    checkpoint: Result<FinalityCheckpoint, TransportError>,
    send_result: Option<Result<Signature, TransportError>>,
    statuses: Mutex<VecDeque<Result<LedgerStatus, TransportError>>>,
    pub blockhash_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
}

impl CountingLedgerRpc {
    pub fn new(checkpoint: FinalityCheckpoint) -> Self {
        Self {
            checkpoint: Ok(checkpoint),
            send_result: None,
            statuses: Mutex::new(VecDeque::new()),
            blockhash_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_blockhash_error(mut self, error: TransportError) -> Self {
        self.checkpoint = Err(error);
        self
    }

    pub fn with_send_result(mut self, result: Result<Signature, TransportError>) -> Self {
        self.send_result = Some(result);
        self
    }

    /// Answers for successive `signature_status` calls; `Pending` once
    /// exhausted.
    pub fn with_statuses(self, statuses: Vec<Result<LedgerStatus, TransportError>>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    pub fn blockhash_count(&self) -> usize {
        self.blockhash_calls.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn status_count(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerRpc for CountingLedgerRpc {
    async fn latest_blockhash(&self) -> Result<FinalityCheckpoint, TransportError> {
        self.blockhash_calls.fetch_add(1, Ordering::SeqCst);
        self.checkpoint.clone()
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, TransportError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        match &self.send_result {
            Some(result) => result.clone(),
            None => Ok(transaction.signatures[0]),
        }
    }

    async fn signature_status(&self, _signature: &Signature) -> Result<LedgerStatus, TransportError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(LedgerStatus::Pending))
    }
}

pub struct FixedPriceFeed(pub Result<f64, PriceError>);

#[async_trait]
impl PriceFeed for FixedPriceFeed {
    async fn sol_usd(&self) -> Result<f64, PriceError> {
        self.0.clone()
    }
}

/// Returns `Pending` for the first `pending_polls` fetches, then the
/// attestation.
pub struct ScriptedAttestationSource {
    attestation: AttestationBytes,
    pending_polls: usize,
    pub fetches: AtomicUsize,
}

impl ScriptedAttestationSource {
    pub fn new(attestation: AttestationBytes, pending_polls: usize) -> Arc<Self> {
        Arc::new(Self {
            attestation,
            pending_polls,
            fetches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AttestationSource for ScriptedAttestationSource {
    async fn fetch(&self, _message_hash: [u8; 32]) -> Result<AttestationStatus, AttestationError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst);
        if n < self.pending_polls {
            Ok(AttestationStatus::Pending("pending_confirmations".to_string()))
        } else {
            Ok(AttestationStatus::Complete(self.attestation.clone()))
        }
    }
}

/// Serves `app` on an ephemeral local port and returns its base URL.
pub async fn spawn_stub_server(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
