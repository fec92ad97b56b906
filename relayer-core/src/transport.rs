//! The two ways a relay reaches the destination ledger: the
//! credential-hiding proxy (primary) and a direct RPC endpoint (fallback).

use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_client::rpc_request::{RpcError, RpcResponseErrorData};
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::hash::Hash;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Machine-readable code the proxy attaches to caller-restriction failures.
pub const INVALID_DESTINATION_CALLER_CODE: &str = "INVALID_DESTINATION_CALLER";

pub fn explorer_url(signature: &str) -> String {
    format!("https://solscan.io/tx/{signature}")
}

/// True when program output names the destination-caller check.
pub fn mentions_caller_restriction(text: &str) -> bool {
    text.contains("InvalidDestinationCaller") || text.contains("Invalid destination caller")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalityCheckpoint {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockhashResponse {
    pub blockhash: String,
    pub last_valid_block_height: u64,
}

impl BlockhashResponse {
    pub fn into_checkpoint(self) -> Result<FinalityCheckpoint, TransportError> {
        let blockhash = Hash::from_str(&self.blockhash)
            .map_err(|e| TransportError::Unavailable(format!("bad blockhash: {e}")))?;
        Ok(FinalityCheckpoint {
            blockhash,
            last_valid_block_height: self.last_valid_block_height,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub signed_transaction: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub signature: String,
    pub explorer_url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProxyErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ProxyErrorBody {
    /// Program log lines carried in a JSON-RPC error's `data.logs`.
    pub fn logs(&self) -> Vec<String> {
        self.details
            .as_ref()
            .and_then(|details| details.pointer("/data/logs"))
            .and_then(Value::as_array)
            .map(|logs| {
                logs.iter()
                    .filter_map(|line| line.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn into_transport_error(self) -> TransportError {
        let logs = self.logs();
        let restricted = self.code.as_deref() == Some(INVALID_DESTINATION_CALLER_CODE)
            || mentions_caller_restriction(&self.error)
            || logs.iter().any(|line| mentions_caller_restriction(line));

        if restricted {
            TransportError::CallerRestricted(self.error)
        } else {
            TransportError::Program {
                message: self.error,
                logs,
            }
        }
    }
}

/// Primary transport.
#[async_trait]
pub trait RelayProxy: Send + Sync {
    async fn fetch_blockhash(&self) -> Result<FinalityCheckpoint, TransportError>;

    async fn relay(&self, signed_transaction_base64: &str) -> Result<Signature, TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerStatus {
    Pending,
    Finalized,
    Failed(String),
}

/// Direct, credential-free ledger access.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn latest_blockhash(&self) -> Result<FinalityCheckpoint, TransportError>;

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, TransportError>;

    async fn signature_status(&self, signature: &Signature) -> Result<LedgerStatus, TransportError>;
}

pub struct HttpRelayProxy {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRelayProxy {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn read_response<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| TransportError::Unavailable(format!("malformed proxy response: {e}")));
        }

        // Only a 400 carries the ledger's verdict; anything else is the
        // proxy itself failing.
        if status == StatusCode::BAD_REQUEST {
            if let Ok(body) = response.json::<ProxyErrorBody>().await {
                return Err(body.into_transport_error());
            }
        }
        Err(TransportError::Unavailable(format!("proxy returned {status}")))
    }
}

#[async_trait]
impl RelayProxy for HttpRelayProxy {
    async fn fetch_blockhash(&self) -> Result<FinalityCheckpoint, TransportError> {
        let response = self
            .client
            .get(format!("{}/api/blockhash", self.base_url))
            .send()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        // A blockhash read has no program verdict to preserve.
        let body: BlockhashResponse = Self::read_response(response)
            .await
            .map_err(|e| match e {
                TransportError::Unavailable(_) => e,
                other => TransportError::Unavailable(other.to_string()),
            })?;
        body.into_checkpoint()
    }

    async fn relay(&self, signed_transaction_base64: &str) -> Result<Signature, TransportError> {
        let response = self
            .client
            .post(format!("{}/api/relay", self.base_url))
            .json(&RelayRequest {
                signed_transaction: signed_transaction_base64.to_string(),
            })
            .send()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let body: RelayResponse = Self::read_response(response).await?;
        Signature::from_str(&body.signature)
            .map_err(|e| TransportError::Unavailable(format!("bad signature: {e}")))
    }
}

pub struct SolanaLedgerRpc {
    client: RpcClient,
}

impl SolanaLedgerRpc {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new_with_timeout(url.into(), timeout),
        }
    }
}

/// Splits RPC failures into "ledger said no" and "could not reach it".
pub fn classify_client_error(error: &ClientError) -> TransportError {
    match error.kind() {
        ClientErrorKind::RpcError(RpcError::RpcResponseError { message, data, .. }) => {
            let logs = match data {
                RpcResponseErrorData::SendTransactionPreflightFailure(simulation) => {
                    simulation.logs.clone().unwrap_or_default()
                }
                _ => Vec::new(),
            };
            if mentions_caller_restriction(message)
                || logs.iter().any(|line| mentions_caller_restriction(line))
            {
                TransportError::CallerRestricted(message.clone())
            } else {
                TransportError::Program {
                    message: message.clone(),
                    logs,
                }
            }
        }
        ClientErrorKind::TransactionError(e) => TransportError::Program {
            message: e.to_string(),
            logs: Vec::new(),
        },
        _ => TransportError::Unavailable(error.to_string()),
    }
}

#[async_trait]
impl LedgerRpc for SolanaLedgerRpc {
    async fn latest_blockhash(&self) -> Result<FinalityCheckpoint, TransportError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(CommitmentConfig::finalized())
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        Ok(FinalityCheckpoint {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, TransportError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Finalized),
            ..RpcSendTransactionConfig::default()
        };
        debug!(signature = ?transaction.signatures.first(), "sending over direct rpc");
        self.client
            .send_transaction_with_config(transaction, config)
            .await
            .map_err(|e| classify_client_error(&e))
    }

    async fn signature_status(&self, signature: &Signature) -> Result<LedgerStatus, TransportError> {
        let status = self
            .client
            .get_signature_status_with_commitment(signature, CommitmentConfig::finalized())
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        Ok(match status {
            None => LedgerStatus::Pending,
            Some(Ok(())) => LedgerStatus::Finalized,
            Some(Err(e)) => LedgerStatus::Failed(e.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_body_with_code_is_caller_restricted() {
        let body = ProxyErrorBody {
            error: "restricted".into(),
            details: None,
            code: Some(INVALID_DESTINATION_CALLER_CODE.into()),
        };
        assert_eq!(
            body.into_transport_error(),
            TransportError::CallerRestricted("restricted".into())
        );
    }

    #[test]
    fn test_error_body_logs_are_kept() {
        let body = ProxyErrorBody {
            error: "Transaction simulation failed".into(),
            details: Some(json!({
                "code": -32002,
                "data": { "logs": ["Program log: custom program error: 0x1"] }
            })),
            code: None,
        };
        assert_eq!(
            body.into_transport_error(),
            TransportError::Program {
                message: "Transaction simulation failed".into(),
                logs: vec!["Program log: custom program error: 0x1".into()],
            }
        );
    }

    #[test]
    fn test_caller_restriction_found_in_logs() {
        let body = ProxyErrorBody {
            error: "Transaction simulation failed".into(),
            details: Some(json!({
                "data": { "logs": ["Program log: AnchorError occurred. Error Code: InvalidDestinationCaller."] }
            })),
            code: None,
        };
        assert!(matches!(
            body.into_transport_error(),
            TransportError::CallerRestricted(_)
        ));
    }

    #[test]
    fn test_blockhash_response_uses_camel_case() {
        let body: BlockhashResponse = serde_json::from_value(json!({
            "blockhash": Hash::default().to_string(),
            "lastValidBlockHeight": 42
        }))
        .unwrap();
        let checkpoint = body.into_checkpoint().unwrap();
        assert_eq!(checkpoint.last_valid_block_height, 42);
    }
}
