//! Program-derived addresses for the CCTP message transmitter and token
//! messenger minter programs.
//!
//! Two seed encodings coexist and must stay separate:
//!
//! * the used-nonces account and the remote token messenger take the source
//!   domain (and the bucket's first nonce) as **decimal text**;
//! * the token pair and local token take the source domain as a
//!   **fixed-width little-endian** `u32` next to the 32-byte burn token.
//!
//! Feeding the text seeds as binary integers still yields a valid-looking
//! address; the destination program only rejects it when the transaction
//! executes.

use crate::error::DerivationError;
use crate::message::AttestedMessage;
use serde::Serialize;
use solana_sdk::pubkey::{Pubkey, MAX_SEEDS, MAX_SEED_LEN};
use tracing::debug;

/// Nonces tracked by one used-nonces account.
pub const NONCES_PER_ACCOUNT: u64 = 6400;

/// Source domains at or above this id get a `-` between the domain and the
/// first-nonce seeds.
pub const DELIMITER_DOMAIN_THRESHOLD: u32 = 11;

pub const MESSAGE_TRANSMITTER_SEED: &[u8] = b"message_transmitter";
pub const AUTHORITY_SEED: &[u8] = b"message_transmitter_authority";
pub const EVENT_AUTHORITY_SEED: &[u8] = b"__event_authority";
pub const USED_NONCES_SEED: &[u8] = b"used_nonces";
pub const TOKEN_MESSENGER_SEED: &[u8] = b"token_messenger";
pub const TOKEN_MINTER_SEED: &[u8] = b"token_minter";
pub const REMOTE_TOKEN_MESSENGER_SEED: &[u8] = b"remote_token_messenger";
pub const LOCAL_TOKEN_SEED: &[u8] = b"local_token";
pub const TOKEN_PAIR_SEED: &[u8] = b"token_pair";
pub const CUSTODY_SEED: &[u8] = b"custody";

/// First nonce of the 1-indexed bucket holding `nonce`:
/// `floor((nonce - 1) / 6400) * 6400 + 1`.
pub fn bucket_first_nonce(nonce: u64) -> Result<u64, DerivationError> {
    if nonce == 0 {
        return Err(DerivationError::InvalidNonce);
    }
    Ok((nonce - 1) / NONCES_PER_ACCOUNT * NONCES_PER_ACCOUNT + 1)
}

pub fn used_nonces_delimiter(source_domain: u32) -> &'static [u8] {
    if source_domain < DELIMITER_DOMAIN_THRESHOLD {
        b""
    } else {
        b"-"
    }
}

/// `[tag, domain as text, delimiter, first nonce as text]`.
pub fn used_nonces_seeds(source_domain: u32, first_nonce: u64) -> [Vec<u8>; 4] {
    [
        USED_NONCES_SEED.to_vec(),
        source_domain.to_string().into_bytes(),
        used_nonces_delimiter(source_domain).to_vec(),
        first_nonce.to_string().into_bytes(),
    ]
}

/// Seed-checked wrapper around `Pubkey::try_find_program_address`.
pub fn find_address(seeds: &[&[u8]], program_id: &Pubkey) -> Result<Pubkey, DerivationError> {
    // The bump byte is appended as one more seed.
    if seeds.len() + 1 > MAX_SEEDS {
        return Err(DerivationError::TooManySeeds {
            count: seeds.len(),
            max: MAX_SEEDS - 1,
        });
    }
    if let Some((index, seed)) = seeds
        .iter()
        .enumerate()
        .find(|(_, seed)| seed.len() > MAX_SEED_LEN)
    {
        return Err(DerivationError::InvalidSeed {
            index,
            len: seed.len(),
            max: MAX_SEED_LEN,
        });
    }

    Pubkey::try_find_program_address(seeds, program_id)
        .map(|(address, _bump)| address)
        .ok_or(DerivationError::NoViableBump)
}

/// Fixed program identities of one CCTP deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CctpPrograms {
    pub message_transmitter: Pubkey,
    pub token_messenger_minter: Pubkey,
    pub usdc_mint: Pubkey,
    pub local_domain: u32,
}

/// Independently recorded token-route accounts for one
/// `(source_domain, burn_token)` pair, used instead of derived values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRoutePin {
    pub source_domain: u32,
    pub burn_token: [u8; 32],
    pub remote_token_messenger: Pubkey,
    pub local_token: Pubkey,
    pub token_pair: Pubkey,
}

/// Accounts that depend only on the program identities.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedAccounts {
    #[serde(with = "pubkey_string")]
    pub message_transmitter_state: Pubkey,
    #[serde(with = "pubkey_string")]
    pub authority_pda: Pubkey,
    #[serde(with = "pubkey_string")]
    pub message_transmitter_event_authority: Pubkey,
    #[serde(with = "pubkey_string")]
    pub token_messenger: Pubkey,
    #[serde(with = "pubkey_string")]
    pub token_minter: Pubkey,
    #[serde(with = "pubkey_string")]
    pub token_messenger_minter_event_authority: Pubkey,
    #[serde(with = "pubkey_string")]
    pub custody_token: Pubkey,
}

impl FixedAccounts {
    pub fn derive(programs: &CctpPrograms) -> Result<Self, DerivationError> {
        let mt = &programs.message_transmitter;
        let tmm = &programs.token_messenger_minter;

        Ok(Self {
            message_transmitter_state: find_address(&[MESSAGE_TRANSMITTER_SEED], mt)?,
            authority_pda: find_address(&[AUTHORITY_SEED, tmm.as_ref()], mt)?,
            message_transmitter_event_authority: find_address(&[EVENT_AUTHORITY_SEED], mt)?,
            token_messenger: find_address(&[TOKEN_MESSENGER_SEED], tmm)?,
            token_minter: find_address(&[TOKEN_MINTER_SEED], tmm)?,
            token_messenger_minter_event_authority: find_address(&[EVENT_AUTHORITY_SEED], tmm)?,
            custody_token: find_address(&[CUSTODY_SEED, programs.usdc_mint.as_ref()], tmm)?,
        })
    }
}

/// Every account a single relay needs, computed per message.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedAddressSet {
    #[serde(flatten)]
    pub fixed: FixedAccounts,
    pub first_nonce: u64,
    #[serde(with = "pubkey_string")]
    pub used_nonces: Pubkey,
    #[serde(with = "pubkey_string")]
    pub remote_token_messenger: Pubkey,
    #[serde(with = "pubkey_string")]
    pub local_token: Pubkey,
    #[serde(with = "pubkey_string")]
    pub token_pair: Pubkey,
    pub pinned: bool,
}

/// Derives relay accounts. The fixed-seed accounts are computed once at
/// construction and only read afterwards, so one deriver can be shared
/// across tasks.
#[derive(Debug, Clone)]
pub struct AddressDeriver {
    programs: CctpPrograms,
    fixed: FixedAccounts,
    pins: Vec<TokenRoutePin>,
}

impl AddressDeriver {
    pub fn new(programs: CctpPrograms) -> Result<Self, DerivationError> {
        Self::with_pins(programs, Vec::new())
    }

    pub fn with_pins(
        programs: CctpPrograms,
        pins: Vec<TokenRoutePin>,
    ) -> Result<Self, DerivationError> {
        let fixed = FixedAccounts::derive(&programs)?;
        Ok(Self {
            programs,
            fixed,
            pins,
        })
    }

    pub fn programs(&self) -> &CctpPrograms {
        &self.programs
    }

    pub fn fixed(&self) -> &FixedAccounts {
        &self.fixed
    }

    /// Used-nonces account for `nonce`, and the first nonce of its bucket.
    pub fn used_nonces(&self, source_domain: u32, nonce: u64) -> Result<(Pubkey, u64), DerivationError> {
        let first_nonce = bucket_first_nonce(nonce)?;
        let seeds = used_nonces_seeds(source_domain, first_nonce);
        let seed_refs: Vec<&[u8]> = seeds.iter().map(Vec::as_slice).collect();
        let address = find_address(&seed_refs, &self.programs.message_transmitter)?;
        Ok((address, first_nonce))
    }

    pub fn remote_token_messenger(&self, source_domain: u32) -> Result<Pubkey, DerivationError> {
        let domain = source_domain.to_string();
        find_address(
            &[REMOTE_TOKEN_MESSENGER_SEED, domain.as_bytes()],
            &self.programs.token_messenger_minter,
        )
    }

    pub fn token_pair(&self, source_domain: u32, burn_token: &[u8]) -> Result<Pubkey, DerivationError> {
        find_address(
            &[TOKEN_PAIR_SEED, &source_domain.to_le_bytes()[..], burn_token],
            &self.programs.token_messenger_minter,
        )
    }

    pub fn local_token(&self, source_domain: u32, burn_token: &[u8]) -> Result<Pubkey, DerivationError> {
        find_address(
            &[LOCAL_TOKEN_SEED, &source_domain.to_le_bytes()[..], burn_token],
            &self.programs.token_messenger_minter,
        )
    }

    fn pin_for(&self, source_domain: u32, burn_token: &[u8]) -> Option<&TokenRoutePin> {
        self.pins
            .iter()
            .find(|pin| pin.source_domain == source_domain && pin.burn_token[..] == *burn_token)
    }

    pub fn derive(
        &self,
        source_domain: u32,
        nonce: u64,
        burn_token: &[u8],
    ) -> Result<DerivedAddressSet, DerivationError> {
        let (used_nonces, first_nonce) = self.used_nonces(source_domain, nonce)?;

        let (remote_token_messenger, local_token, token_pair, pinned) =
            match self.pin_for(source_domain, burn_token) {
                Some(pin) => (pin.remote_token_messenger, pin.local_token, pin.token_pair, true),
                None => (
                    self.remote_token_messenger(source_domain)?,
                    self.local_token(source_domain, burn_token)?,
                    self.token_pair(source_domain, burn_token)?,
                    false,
                ),
            };

        debug!(
            source_domain,
            nonce,
            first_nonce,
            %used_nonces,
            pinned,
            "derived relay accounts"
        );

        Ok(DerivedAddressSet {
            fixed: self.fixed,
            first_nonce,
            used_nonces,
            remote_token_messenger,
            local_token,
            token_pair,
            pinned,
        })
    }

    pub fn derive_for(&self, message: &AttestedMessage) -> Result<DerivedAddressSet, DerivationError> {
        self.derive(message.source_domain, message.nonce, &message.body.burn_token)
    }
}

pub(crate) mod pubkey_string {
    use serde::Serializer;
    use solana_sdk::pubkey::Pubkey;

    pub fn serialize<S: Serializer>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(key)
    }
}
