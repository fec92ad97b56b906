use crate::error::AttestationError;
use crate::utils::{bytes_to_hex, decode_blob, keccak256};
use async_trait::async_trait;
use reqwest::StatusCode;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SIGNATURE_LEN: usize = 65;

/// Concatenated 65-byte `r || s || v` attester signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationBytes(Vec<u8>);

impl AttestationBytes {
    pub fn new(bytes: Vec<u8>) -> Result<Self, AttestationError> {
        if bytes.is_empty() || bytes.len() % SIGNATURE_LEN != 0 {
            return Err(AttestationError::Malformed(format!(
                "{} bytes is not a whole number of {SIGNATURE_LEN}-byte signatures",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    /// Accepts the `0x`-hex form the attester returns, bare hex, or base64.
    pub fn from_encoded(input: &str) -> Result<Self, AttestationError> {
        let bytes = decode_blob(input).map_err(|e| AttestationError::Malformed(e.to_string()))?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn signatures(&self) -> impl Iterator<Item = &[u8]> {
        self.0.chunks_exact(SIGNATURE_LEN)
    }

    /// Ethereum-style addresses of every attester that signed `message_hash`,
    /// in signature order.
    pub fn recover_attesters(&self, message_hash: [u8; 32]) -> Result<Vec<[u8; 20]>, AttestationError> {
        self.signatures()
            .map(|signature| recover_signer(message_hash, signature))
            .collect()
    }
}

pub fn recover_signer(message_hash: [u8; 32], signature: &[u8]) -> Result<[u8; 20], AttestationError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(AttestationError::Malformed(format!(
            "signature is {} bytes",
            signature.len()
        )));
    }
    let secp = Secp256k1::verification_only();
    let recovery_err = |e: secp256k1::Error| AttestationError::Recovery(e.to_string());

    let v = signature[64];
    let recovery_id = RecoveryId::from_i32(i32::from(if v >= 27 { v - 27 } else { v }))
        .map_err(recovery_err)?;

    let recoverable = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(recovery_err)?;
    let message = Message::from_digest_slice(&message_hash).map_err(recovery_err)?;
    let public_key = secp
        .recover_ecdsa(&message, &recoverable)
        .map_err(recovery_err)?;

    let hash = keccak256(&public_key.serialize_uncompressed()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..32]);
    Ok(address)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationStatus {
    /// Carries the attester's status text.
    Pending(String),
    Complete(AttestationBytes),
}

/// Anything that can answer "is the attestation for this hash ready yet".
#[async_trait]
pub trait AttestationSource: Send + Sync {
    async fn fetch(&self, message_hash: [u8; 32]) -> Result<AttestationStatus, AttestationError>;
}

/// Client for the Circle Iris `GET {base}/{0xhash}` attestation endpoint.
pub struct IrisAttestationClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct IrisResponse {
    status: String,
    attestation: Option<String>,
}

impl IrisAttestationClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AttestationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AttestationError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AttestationSource for IrisAttestationClient {
    async fn fetch(&self, message_hash: [u8; 32]) -> Result<AttestationStatus, AttestationError> {
        let url = format!("{}/{}", self.base_url, bytes_to_hex(&message_hash));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AttestationError::Http(e.to_string()))?;

        // The attester answers 404 until it has observed the burn.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(AttestationStatus::Pending("not_found".to_string()));
        }
        if !response.status().is_success() {
            return Err(AttestationError::Http(format!("status {}", response.status())));
        }

        let body: IrisResponse = response
            .json()
            .await
            .map_err(|e| AttestationError::Malformed(e.to_string()))?;

        match (body.status.as_str(), body.attestation) {
            ("complete", Some(attestation)) => {
                AttestationBytes::from_encoded(&attestation).map(AttestationStatus::Complete)
            }
            ("complete", None) => Err(AttestationError::Malformed(
                "complete status without attestation".to_string(),
            )),
            (status, _) => Ok(AttestationStatus::Pending(status.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 120,
        }
    }
}

/// Polls until the attestation is complete or the attempts run out. HTTP
/// failures count as a pending poll. Dropping the future cancels it.
pub async fn poll_attestation(
    source: &dyn AttestationSource,
    message_hash: [u8; 32],
    policy: &PollPolicy,
) -> Result<AttestationBytes, AttestationError> {
    let mut last_status = String::from("not_polled");

    for attempt in 1..=policy.max_attempts {
        match source.fetch(message_hash).await {
            Ok(AttestationStatus::Complete(attestation)) => {
                info!(
                    attempt,
                    signatures = attestation.signatures().count(),
                    "attestation complete"
                );
                return Ok(attestation);
            }
            Ok(AttestationStatus::Pending(status)) => {
                debug!(attempt, %status, "attestation pending");
                last_status = status;
            }
            Err(AttestationError::Http(e)) => {
                warn!(attempt, error = %e, "attestation poll failed");
                last_status = e;
            }
            Err(e) => return Err(e),
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(AttestationError::Exhausted {
        attempts: policy.max_attempts,
        last_status,
    })
}
