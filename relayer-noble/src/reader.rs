use base64::{engine::general_purpose::STANDARD, Engine};
use relayer_core::utils::base64_to_bytes;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const MESSAGE_SENT_EVENT: &str = "circle.cctp.v1.MessageSent";
pub const MESSAGE_ATTRIBUTE: &str = "message";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("request to Noble REST endpoint failed: {0}")]
    Http(String),

    #[error("Noble REST endpoint returned status {0}")]
    Status(u16),

    #[error("unexpected transaction response: {0}")]
    Malformed(String),

    #[error("no {MESSAGE_SENT_EVENT} event in transaction {tx_hash}")]
    MessageNotFound { tx_hash: String },
}

#[derive(Deserialize, Debug)]
struct TxEnvelope {
    tx_response: TxResponse,
}

#[derive(Deserialize, Debug)]
struct TxResponse {
    #[serde(default)]
    events: Vec<TxEvent>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TxEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct EventAttribute {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Older Cosmos SDK versions emit base64-encoded attribute keys.
fn attribute_key(raw: &str) -> String {
    if raw == MESSAGE_ATTRIBUTE {
        return raw.to_string();
    }
    STANDARD
        .decode(raw)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| raw.to_string())
}

/// The value is base64 of the message, possibly quoted, possibly base64
/// encoded a second time by the event encoder.
fn decode_message_value(raw: &str) -> Option<Vec<u8>> {
    let unquoted = raw.trim().trim_matches('"');
    let once = base64_to_bytes(unquoted).ok()?;

    let twice = std::str::from_utf8(&once)
        .ok()
        .map(|text| text.trim().trim_matches('"'))
        .and_then(|text| base64_to_bytes(text).ok());

    Some(twice.unwrap_or(once))
}

/// Finds the burn message in a transaction's events.
pub fn extract_message(events: &[TxEvent]) -> Option<Vec<u8>> {
    events
        .iter()
        .filter(|event| event.kind == MESSAGE_SENT_EVENT)
        .flat_map(|event| event.attributes.iter())
        .find(|attr| attribute_key(&attr.key) == MESSAGE_ATTRIBUTE)
        .and_then(|attr| decode_message_value(&attr.value))
}

/// Reads transactions from a Noble REST (LCD) endpoint.
pub struct NobleTxReader {
    client: reqwest::Client,
    rest_url: String,
}

impl NobleTxReader {
    pub fn new(rest_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Http(e.to_string()))?;
        Ok(Self {
            client,
            rest_url: rest_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn fetch_events(&self, tx_hash: &str) -> Result<Vec<TxEvent>, SourceError> {
        let url = format!("{}/cosmos/tx/v1beta1/txs/{}", self.rest_url, tx_hash.trim());
        debug!(%url, "fetching Noble transaction");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SourceError::Status(response.status().as_u16()));
        }

        let envelope: TxEnvelope = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;
        Ok(envelope.tx_response.events)
    }

    /// Raw message bytes from the transaction's `MessageSent` event.
    pub async fn fetch_message(&self, tx_hash: &str) -> Result<Vec<u8>, SourceError> {
        let events = self.fetch_events(tx_hash).await?;
        let message = extract_message(&events).ok_or_else(|| SourceError::MessageNotFound {
            tx_hash: tx_hash.to_string(),
        })?;

        info!(tx_hash, bytes = message.len(), "found MessageSent event");
        Ok(message)
    }
}
