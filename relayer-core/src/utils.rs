use crate::error::CodecError;
use base64::{engine::general_purpose::STANDARD, Engine};
use sha3::{Digest, Keccak256};

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Attestation lookup key for a raw message.
pub fn message_hash(message: &[u8]) -> [u8; 32] {
    keccak256(message)
}

/// [`message_hash`], `0x`-prefixed.
pub fn message_hash_hex(message: &[u8]) -> String {
    bytes_to_hex(&message_hash(message))
}

/// Strips whitespace and an optional `0x`/`0X` prefix, lowercasing the rest.
pub fn normalize_hex(input: &str) -> String {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);
    digits.to_ascii_lowercase()
}

pub fn hex_to_bytes(input: &str) -> Result<Vec<u8>, CodecError> {
    hex::decode(normalize_hex(input)).map_err(|e| CodecError::InvalidHex(e.to_string()))
}

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn base64_to_bytes(input: &str) -> Result<Vec<u8>, CodecError> {
    STANDARD
        .decode(input.trim())
        .map_err(|e| CodecError::InvalidBase64(e.to_string()))
}

pub fn bytes_to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn base64_to_hex(input: &str) -> Result<String, CodecError> {
    base64_to_bytes(input).map(|bytes| bytes_to_hex(&bytes))
}

/// Decodes a blob pasted by an operator. `0x`-prefixed input is hex, as is
/// bare input made only of an even number of hex digits. Anything else is
/// base64 (the encoding the source chain emits).
pub fn decode_blob(input: &str) -> Result<Vec<u8>, CodecError> {
    let trimmed = input.trim();
    if trimmed.starts_with("0x") || trimmed.starts_with("0X") || is_bare_hex(trimmed) {
        hex_to_bytes(trimmed)
    } else {
        base64_to_bytes(trimmed)
    }
}

fn is_bare_hex(input: &str) -> bool {
    !input.is_empty() && input.len() % 2 == 0 && input.bytes().all(|b| b.is_ascii_hexdigit())
}
