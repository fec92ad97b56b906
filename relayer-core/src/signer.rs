use crate::error::SignerError;
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::Transaction;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerIdentityChanged {
    pub previous: Option<Pubkey>,
    pub current: Option<Pubkey>,
}

/// The capability to sign relay transactions, passed into the pipeline per
/// invocation. The pipeline reads [`SigningContext::identity`] at the moment
/// of signing, so a subscription is only needed by callers that want to react
/// to account switches as they happen.
#[async_trait]
pub trait SigningContext: Send + Sync {
    /// `None` while no signer is connected.
    async fn identity(&self) -> Option<Pubkey>;

    async fn sign(&self, transaction: Transaction) -> Result<Transaction, SignerError>;

    fn subscribe(&self) -> broadcast::Receiver<SignerIdentityChanged>;
}

/// A local keypair. The held key can be swapped or removed at runtime.
pub struct KeypairSigner {
    keypair: RwLock<Option<Keypair>>,
    events: broadcast::Sender<SignerIdentityChanged>,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self::with_keypair(Some(keypair))
    }

    pub fn disconnected() -> Self {
        Self::with_keypair(None)
    }

    fn with_keypair(keypair: Option<Keypair>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            keypair: RwLock::new(keypair),
            events,
        }
    }

    /// Replaces the held keypair and notifies subscribers if the public key
    /// changed.
    pub async fn switch_identity(&self, keypair: Option<Keypair>) {
        let mut slot = self.keypair.write().await;
        let previous = slot.as_ref().map(|k| k.pubkey());
        let current = keypair.as_ref().map(|k| k.pubkey());
        *slot = keypair;
        drop(slot);

        if previous != current {
            info!(?previous, ?current, "signer identity changed");
            // No subscribers is fine.
            let _ = self.events.send(SignerIdentityChanged { previous, current });
        }
    }
}

#[async_trait]
impl SigningContext for KeypairSigner {
    async fn identity(&self) -> Option<Pubkey> {
        self.keypair.read().await.as_ref().map(|k| k.pubkey())
    }

    async fn sign(&self, mut transaction: Transaction) -> Result<Transaction, SignerError> {
        let slot = self.keypair.read().await;
        let keypair = slot.as_ref().ok_or(SignerError::Disconnected)?;
        let blockhash = transaction.message.recent_blockhash;

        transaction
            .try_sign(&[keypair], blockhash)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        Ok(transaction)
    }

    fn subscribe(&self) -> broadcast::Receiver<SignerIdentityChanged> {
        self.events.subscribe()
    }
}
