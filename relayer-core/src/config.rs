use crate::attestation::PollPolicy;
use crate::fee::FeeSettings;
use crate::pda::{CctpPrograms, TokenRoutePin};
use crate::pipeline::PipelineSettings;
use crate::utils::hex_to_bytes;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

pub const MESSAGE_TRANSMITTER_PROGRAM: &str = "CCTPmbSD7gX1bxKPAmg77w8oFzNFpaQiQUWD43TKaecd";
pub const TOKEN_MESSENGER_MINTER_PROGRAM: &str = "CCTPiPYPc6AsJuwueEnWgSgucamXDZwBd53dQ11YiKX3";
pub const MAINNET_USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const SOLANA_DOMAIN: u32 = 5;
pub const NOBLE_DOMAIN: u32 = 4;

/// `uusdc` denom hash on Noble, as it appears in burn messages.
pub const NOBLE_USDC_BURN_TOKEN: &str =
    "487039debedbf32d260137b0a6f66b90962bec777250910d253781de326a716d";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RelayerConfig {
    pub programs: ProgramsConfig,
    pub endpoints: EndpointsConfig,
    pub fee: FeeConfig,
    #[serde(default)]
    pub memo: MemoConfig,
    #[serde(default)]
    pub attestation: AttestationConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub pinned_routes: Vec<PinnedRouteConfig>,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProgramsConfig {
    pub message_transmitter: String,
    pub token_messenger_minter: String,
    pub usdc_mint: String,
    #[serde(default = "default_local_domain")]
    pub local_domain: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EndpointsConfig {
    /// Base URL of the credential-hiding proxy. Unset means direct RPC only.
    #[serde(default)]
    pub proxy_url: Option<String>,
    pub rpc_url: String,
    pub attestation_url: String,
    pub noble_rest_url: String,
    pub price_feed_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FeeConfig {
    pub fee_usd: f64,
    /// No recipient, no fee transfer.
    #[serde(default)]
    pub recipient: Option<String>,
    pub fallback_sol_usd: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MemoConfig {
    pub prefix: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AttestationConfig {
    pub poll_interval_secs: u64,
    pub max_attempts: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub confirm: bool,
    pub confirmation_attempts: u32,
    pub confirmation_interval_secs: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PinnedRouteConfig {
    pub source_domain: u32,
    /// Hex, 32 bytes.
    pub burn_token: String,
    pub remote_token_messenger: String,
    pub local_token: String,
    pub token_pair: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    pub listen_address: String,
    pub allowed_origins: Vec<String>,
    /// Name of the environment variable holding the upstream RPC URL.
    pub upstream_rpc_env: String,
}

fn default_local_domain() -> u32 {
    SOLANA_DOMAIN
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            prefix: "CCTP Relay via cctp-relayer".to_string(),
        }
    }
}

impl Default for AttestationConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            poll_interval_secs: policy.interval.as_secs(),
            max_attempts: policy.max_attempts,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let settings = PipelineSettings::default();
        Self {
            confirm: settings.confirm,
            confirmation_attempts: settings.confirmation_attempts,
            confirmation_interval_secs: settings.confirmation_interval.as_secs(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:8080".to_string(),
            allowed_origins: vec![
                "http://localhost:8000".to_string(),
                "http://localhost:3000".to_string(),
                "http://localhost:8080".to_string(),
            ],
            upstream_rpc_env: "UPSTREAM_RPC_URL".to_string(),
        }
    }
}

fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value.trim()).with_context(|| format!("{field}: invalid address {value:?}"))
}

impl PinnedRouteConfig {
    pub fn to_pin(&self) -> Result<TokenRoutePin> {
        let bytes = hex_to_bytes(&self.burn_token).context("pinned route burn_token")?;
        let burn_token: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| anyhow!("pinned route burn_token is {} bytes, need 32", b.len()))?;

        Ok(TokenRoutePin {
            source_domain: self.source_domain,
            burn_token,
            remote_token_messenger: parse_pubkey(
                "remote_token_messenger",
                &self.remote_token_messenger,
            )?,
            local_token: parse_pubkey("local_token", &self.local_token)?,
            token_pair: parse_pubkey("token_pair", &self.token_pair)?,
        })
    }
}

impl RelayerConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("failed to read config {path}"))?;
        let config: RelayerConfig =
            toml::from_str(&content).with_context(|| format!("failed to parse config {path}"))?;
        Ok(config)
    }

    pub fn programs(&self) -> Result<CctpPrograms> {
        Ok(CctpPrograms {
            message_transmitter: parse_pubkey(
                "programs.message_transmitter",
                &self.programs.message_transmitter,
            )?,
            token_messenger_minter: parse_pubkey(
                "programs.token_messenger_minter",
                &self.programs.token_messenger_minter,
            )?,
            usdc_mint: parse_pubkey("programs.usdc_mint", &self.programs.usdc_mint)?,
            local_domain: self.programs.local_domain,
        })
    }

    pub fn pins(&self) -> Result<Vec<TokenRoutePin>> {
        self.pinned_routes.iter().map(PinnedRouteConfig::to_pin).collect()
    }

    pub fn fee_settings(&self) -> Result<Option<FeeSettings>> {
        let Some(recipient) = &self.fee.recipient else {
            return Ok(None);
        };
        Ok(Some(FeeSettings {
            fee_usd: self.fee.fee_usd,
            recipient: parse_pubkey("fee.recipient", recipient)?,
            fallback_sol_usd: self.fee.fallback_sol_usd,
        }))
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.attestation.poll_interval_secs),
            max_attempts: self.attestation.max_attempts,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            confirm: self.pipeline.confirm,
            confirmation_attempts: self.pipeline.confirmation_attempts,
            confirmation_interval: Duration::from_secs(self.pipeline.confirmation_interval_secs),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.endpoints.http_timeout_secs)
    }

    /// Production CCTP deployment with the recorded Noble route.
    pub fn mainnet_defaults() -> Self {
        Self {
            programs: ProgramsConfig {
                message_transmitter: MESSAGE_TRANSMITTER_PROGRAM.to_string(),
                token_messenger_minter: TOKEN_MESSENGER_MINTER_PROGRAM.to_string(),
                usdc_mint: MAINNET_USDC_MINT.to_string(),
                local_domain: SOLANA_DOMAIN,
            },
            endpoints: EndpointsConfig {
                proxy_url: None,
                rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
                attestation_url: "https://iris-api.circle.com/attestations".to_string(),
                noble_rest_url: "https://noble-api.polkachu.com".to_string(),
                price_feed_url:
                    "https://api.coingecko.com/api/v3/simple/price?ids=solana&vs_currencies=usd"
                        .to_string(),
                http_timeout_secs: default_http_timeout_secs(),
            },
            fee: FeeConfig {
                fee_usd: 0.01,
                recipient: None,
                fallback_sol_usd: 150.0,
            },
            memo: MemoConfig::default(),
            attestation: AttestationConfig::default(),
            pipeline: PipelineConfig::default(),
            pinned_routes: vec![PinnedRouteConfig {
                source_domain: NOBLE_DOMAIN,
                burn_token: NOBLE_USDC_BURN_TOKEN.to_string(),
                remote_token_messenger: "3LQBc39CVMtAMN84LP38LeFUdrVWrRkrsi8gBuPW1dER".to_string(),
                local_token: "72bvEFk2Usi2uYc1SnaTNhBcQPc6tiJWXr9oKk7rkd4C".to_string(),
                token_pair: "aCBB8tbji72cPuLLfB9KRBntwk1bejXY51Tx23eAFUi".to_string(),
            }],
            proxy: ProxyConfig::default(),
        }
    }

    pub fn default_test_config() -> Self {
        let mut config = Self::mainnet_defaults();
        config.endpoints = EndpointsConfig {
            proxy_url: Some("http://127.0.0.1:7071".to_string()),
            rpc_url: "http://127.0.0.1:8899".to_string(),
            attestation_url: "http://127.0.0.1:7072/attestations".to_string(),
            noble_rest_url: "http://127.0.0.1:1317".to_string(),
            price_feed_url: "http://127.0.0.1:7073/price".to_string(),
            http_timeout_secs: 5,
        };
        config.fee.recipient = Some("11111111111111111111111111111112".to_string());
        config.fee.fallback_sol_usd = 100.0;
        config.attestation = AttestationConfig {
            poll_interval_secs: 1,
            max_attempts: 3,
        };
        config
    }
}
