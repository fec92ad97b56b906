use crate::error::PriceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use tracing::{debug, warn};

/// Source of the SOL/USD price used to size the relay fee.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn sol_usd(&self) -> Result<f64, PriceError>;
}

/// CoinGecko-style `simple/price` endpoint returning `{"solana":{"usd":<price>}}`.
pub struct HttpPriceFeed {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct SimplePriceResponse {
    solana: UsdPrice,
}

#[derive(Deserialize)]
struct UsdPrice {
    usd: f64,
}

impl HttpPriceFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PriceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PriceError::Http(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn sol_usd(&self) -> Result<f64, PriceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| PriceError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PriceError::Http(format!("status {}", response.status())));
        }

        let body: SimplePriceResponse = response
            .json()
            .await
            .map_err(|e| PriceError::InvalidPrice(e.to_string()))?;
        Ok(body.solana.usd)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeeSettings {
    pub fee_usd: f64,
    pub recipient: Pubkey,
    pub fallback_sol_usd: f64,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Live,
    Fallback,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FeeQuote {
    pub lamports: u64,
    #[serde(with = "crate::pda::pubkey_string")]
    pub recipient: Pubkey,
    pub price_usd: f64,
    pub source: PriceSource,
}

/// `ceil(fee_usd / price * 1e9)`.
pub fn fee_lamports(fee_usd: f64, sol_usd: f64) -> u64 {
    (fee_usd / sol_usd * LAMPORTS_PER_SOL as f64).ceil() as u64
}

fn usable(price: f64) -> Result<f64, PriceError> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(PriceError::InvalidPrice(price.to_string()))
    }
}

/// Never fails: a feed error or unusable price falls back to the configured
/// price.
pub async fn quote_fee(feed: &dyn PriceFeed, settings: &FeeSettings) -> FeeQuote {
    let (price_usd, source) = match feed.sol_usd().await.and_then(usable) {
        Ok(price) => (price, PriceSource::Live),
        Err(e) => {
            warn!(
                error = %e,
                fallback = settings.fallback_sol_usd,
                "price feed unavailable, using fallback SOL price"
            );
            (settings.fallback_sol_usd, PriceSource::Fallback)
        }
    };

    let lamports = fee_lamports(settings.fee_usd, price_usd);
    debug!(lamports, price_usd, ?source, "quoted relay fee");

    FeeQuote {
        lamports,
        recipient: settings.recipient,
        price_usd,
        source,
    }
}
