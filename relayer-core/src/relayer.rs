use crate::attestation::AttestationBytes;
use crate::config::RelayerConfig;
use crate::error::{RelayError, SubmissionError};
use crate::fee::{quote_fee, FeeQuote, FeeSettings, HttpPriceFeed, PriceFeed};
use crate::instruction::InstructionBuilder;
use crate::ledger::RelayLedger;
use crate::message::AttestedMessage;
use crate::pda::{AddressDeriver, DerivedAddressSet};
use crate::pipeline::{RelayAttempt, RelayState, SubmissionPipeline};
use crate::signer::SigningContext;
use crate::transport::{explorer_url, HttpRelayProxy, RelayProxy, SolanaLedgerRpc};
use crate::utils::bytes_to_hex;
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Serialize, Debug, Clone)]
pub struct RelayReport {
    pub message_hash: String,
    pub source_domain: u32,
    pub nonce: u64,
    pub amount: u64,
    pub history: Vec<RelayState>,
    pub state: RelayState,
    pub signature: Option<String>,
    pub explorer_url: Option<String>,
    pub error: Option<String>,
    pub logs: Vec<String>,
    pub may_resend: bool,
    pub fee: Option<FeeQuote>,
    pub addresses: DerivedAddressSet,
}

impl RelayReport {
    fn new(
        message: &AttestedMessage,
        addresses: DerivedAddressSet,
        fee: Option<FeeQuote>,
        attempt: &RelayAttempt,
    ) -> Self {
        let signature = attempt.signature().map(|s| s.to_string());
        Self {
            message_hash: bytes_to_hex(&attempt.message_hash()),
            source_domain: message.source_domain,
            nonce: message.nonce,
            amount: message.body.amount,
            history: attempt.history().to_vec(),
            state: attempt.state(),
            explorer_url: signature.as_deref().map(explorer_url),
            signature,
            error: attempt.error().map(|e| e.to_string()),
            logs: attempt
                .error()
                .map(|e| e.logs().to_vec())
                .unwrap_or_default(),
            may_resend: attempt.may_resend(),
            fee,
            addresses,
        }
    }
}

struct FeeContext {
    feed: Arc<dyn PriceFeed>,
    settings: FeeSettings,
}

/// Parse → derive → quote → build → submit, for messages addressed to this
/// relayer's domain.
pub struct Relayer {
    deriver: AddressDeriver,
    builder: InstructionBuilder,
    pipeline: SubmissionPipeline,
    ledger: RelayLedger,
    fee: Option<FeeContext>,
}

impl Relayer {
    pub fn new(
        deriver: AddressDeriver,
        builder: InstructionBuilder,
        pipeline: SubmissionPipeline,
        ledger: RelayLedger,
    ) -> Self {
        Self {
            deriver,
            builder,
            pipeline,
            ledger,
            fee: None,
        }
    }

    pub fn with_fee(mut self, feed: Arc<dyn PriceFeed>, settings: FeeSettings) -> Self {
        self.fee = Some(FeeContext { feed, settings });
        self
    }

    pub fn from_config(config: &RelayerConfig) -> Result<Self> {
        let programs = config.programs()?;
        let deriver = AddressDeriver::with_pins(programs, config.pins()?)
            .context("failed to derive fixed CCTP accounts")?;
        let builder = InstructionBuilder::new(programs, config.memo.prefix.clone());

        let timeout = config.http_timeout();
        let proxy = match &config.endpoints.proxy_url {
            Some(url) => Some(Arc::new(HttpRelayProxy::new(url.clone(), timeout)?) as Arc<dyn RelayProxy>),
            None => None,
        };
        let direct = Arc::new(SolanaLedgerRpc::new(config.endpoints.rpc_url.clone(), timeout));
        let pipeline = SubmissionPipeline::new(proxy, direct, config.pipeline_settings());

        let mut relayer = Self::new(deriver, builder, pipeline, RelayLedger::new());
        if let Some(settings) = config.fee_settings()? {
            let feed = HttpPriceFeed::new(config.endpoints.price_feed_url.clone(), timeout)?;
            relayer = relayer.with_fee(Arc::new(feed), settings);
        }
        Ok(relayer)
    }

    pub fn deriver(&self) -> &AddressDeriver {
        &self.deriver
    }

    pub fn ledger(&self) -> &RelayLedger {
        &self.ledger
    }

    /// Parses the message and derives its accounts without touching the
    /// network.
    pub fn prepare(&self, message_bytes: &[u8]) -> Result<(AttestedMessage, DerivedAddressSet), RelayError> {
        let message = AttestedMessage::parse(message_bytes)?;
        let local_domain = self.deriver.programs().local_domain;
        if message.destination_domain != local_domain {
            return Err(RelayError::WrongDestination {
                expected: local_domain,
                found: message.destination_domain,
            });
        }
        let addresses = self.deriver.derive_for(&message)?;
        Ok((message, addresses))
    }

    /// Errors cover everything before the pipeline starts. Pipeline failures
    /// are reported in the returned report's state and error.
    pub async fn relay(
        &self,
        message_bytes: &[u8],
        attestation: &AttestationBytes,
        signer: &dyn SigningContext,
    ) -> Result<RelayReport, RelayError> {
        let (message, addresses) = self.prepare(message_bytes)?;

        // The destination program is the judge of the attestation.
        match attestation.recover_attesters(message.hash()) {
            Ok(attesters) => debug!(
                attesters = ?attesters.iter().map(|a| bytes_to_hex(a)).collect::<Vec<_>>(),
                "attestation signatures recovered"
            ),
            Err(e) => warn!(error = %e, "attestation signatures did not recover"),
        }

        let guard = self.ledger.begin(message.hash())?;

        let payer = signer
            .identity()
            .await
            .ok_or_else(|| SubmissionError::UserRejected {
                stage: RelayState::Building,
                reason: "no signer connected".to_string(),
            })?;

        let fee = match &self.fee {
            Some(ctx) => Some(quote_fee(ctx.feed.as_ref(), &ctx.settings).await),
            None => None,
        };

        let instructions =
            self.builder
                .build(&message, attestation.as_bytes(), &addresses, payer, fee.as_ref())?;

        info!(
            source_domain = message.source_domain,
            nonce = message.nonce,
            amount = message.body.amount,
            %payer,
            "relaying message"
        );

        let attempt = self.pipeline.run(&message, &instructions, payer, signer).await;
        guard.record(attempt.state(), attempt.signature());

        Ok(RelayReport::new(&message, addresses, fee, &attempt))
    }
}
