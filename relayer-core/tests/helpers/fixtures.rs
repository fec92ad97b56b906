use relayer_core::attestation::AttestationBytes;
use relayer_core::config::{RelayerConfig, NOBLE_USDC_BURN_TOKEN};
use relayer_core::instruction::InstructionBuilder;
use relayer_core::pda::{AddressDeriver, CctpPrograms};
use relayer_core::transport::FinalityCheckpoint;
use relayer_core::utils::keccak256;
use secp256k1::{Message, Secp256k1, SecretKey};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

/// Ganache test keys standing in for Circle attesters.
pub const TEST_ATTESTER_KEYS: [&str; 2] = [
    "0x4f3edf983ac636a65a842ce7c78d9aa706d3b113bce9c46f30d7d21715b23b1d",
    "0x6cbed15c793ce57650b9877cf6fa156fbef513c4e6134f022a85b1ffdd59b2a1",
];

pub const TEST_ATTESTER_ADDRESSES: [&str; 2] = [
    "90f8bf6a479f320ead074411a4b0e7944ea8c9c1",
    "ffcf8fdee72ac11b5c542428b35eef5769c409f0",
];

/// Recorded mainnet account for Noble (domain 4) nonce 288574.
pub const KNOWN_USED_NONCES: &str = "3ewgRKdMT8WjPjExuVuZ9gZ7qDYwquefpwtL1SUkLCxf";

pub const KNOWN_STATE: &str = "BWrwSWjbikT3H7qHAkUEbLmwDQoB4ZDJ4wcSEhSPTZCu";
pub const KNOWN_AUTHORITY: &str = "CFtn7PC5NsaFAuG65LwvhcGVD2MiqSpMJ7yvpyhsgJwW";
pub const KNOWN_MT_EVENT_AUTHORITY: &str = "6mH8scevHQJsyyp1qxu8kyAapHuzEE67mtjFDJZjSbQW";
pub const KNOWN_TOKEN_MESSENGER: &str = "Afgq3BHEfCE7d78D2XE9Bfyu2ieDqvE24xX8KDwreBms";
pub const KNOWN_TOKEN_MINTER: &str = "DBD8hAwLDRQkTsu6EqviaYNGKPnsAMmQonxf7AH8ZcFY";
pub const KNOWN_TMM_EVENT_AUTHORITY: &str = "CNfZLeeL4RUxwfPnjA3tLiQt4y43jp4V7bMpga673jf9";
pub const KNOWN_CUSTODY: &str = "FSxJ85FXVsXSr51SeWf9ciJWTcRnqKFSmBgRDeL3KyWw";
pub const KNOWN_NOBLE_REMOTE_TOKEN_MESSENGER: &str = "3LQBc39CVMtAMN84LP38LeFUdrVWrRkrsi8gBuPW1dER";

pub fn pubkey(s: &str) -> Pubkey {
    Pubkey::from_str(s).unwrap()
}

pub fn noble_burn_token() -> [u8; 32] {
    hex::decode(NOBLE_USDC_BURN_TOKEN).unwrap().try_into().unwrap()
}

pub fn create_test_programs() -> CctpPrograms {
    RelayerConfig::mainnet_defaults().programs().unwrap()
}

/// Derives everything from seeds, without the recorded Noble pin.
pub fn create_test_deriver() -> AddressDeriver {
    AddressDeriver::new(create_test_programs()).unwrap()
}

pub fn create_pinned_deriver() -> AddressDeriver {
    let config = RelayerConfig::mainnet_defaults();
    AddressDeriver::with_pins(config.programs().unwrap(), config.pins().unwrap()).unwrap()
}

pub fn create_test_builder() -> InstructionBuilder {
    InstructionBuilder::new(create_test_programs(), "CCTP Relay test")
}

pub fn create_test_checkpoint() -> FinalityCheckpoint {
    FinalityCheckpoint {
        blockhash: Hash::new_unique(),
        last_valid_block_height: 300_000_000,
    }
}

pub fn sign_digest(key_hex: &str, digest: [u8; 32]) -> Vec<u8> {
    let secp = Secp256k1::new();
    let key = SecretKey::from_slice(&hex::decode(key_hex.trim_start_matches("0x")).unwrap()).unwrap();
    let message = Message::from_digest_slice(&digest).unwrap();
    let (recovery_id, compact) = secp
        .sign_ecdsa_recoverable(&message, &key)
        .serialize_compact();

    let mut signature = compact.to_vec();
    signature.push(27 + recovery_id.to_i32() as u8);
    signature
}

/// A 65-byte-per-attester attestation over `keccak256(message)`.
pub fn create_test_attestation(message: &[u8], keys: &[&str]) -> AttestationBytes {
    let digest = keccak256(message);
    let bytes = keys.iter().flat_map(|key| sign_digest(key, digest)).collect();
    AttestationBytes::new(bytes).unwrap()
}
