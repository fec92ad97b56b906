//! CCTP v1 message layout.
//!
//! ```text
//! header (116 bytes)                      body (132 bytes)
//! 0   version            u32 BE           116 body version     u32 BE
//! 4   source domain      u32 BE           120 burn token       [u8; 32]
//! 8   destination domain u32 BE           152 mint recipient   [u8; 32]
//! 12  nonce              u64 BE           184 amount           u256 BE
//! 20  sender             [u8; 32]         216 message sender   [u8; 32]
//! 52  recipient          [u8; 32]
//! 84  destination caller [u8; 32]
//! ```
//!
//! Every integer on the wire is big-endian, even though the destination
//! ledger encodes its own integers little-endian.

use crate::error::ParseError;
use crate::utils::message_hash;
use byteorder::{BigEndian, ReadBytesExt};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::io::{Cursor, Read};

pub const HEADER_LEN: usize = 4 + 4 + 4 + 8 + 32 + 32 + 32;
pub const BODY_LEN: usize = 4 + 32 + 32 + 32 + 32;
pub const MIN_MESSAGE_LEN: usize = HEADER_LEN + BODY_LEN;

/// Byte offset of the mint recipient within a full message.
pub const MINT_RECIPIENT_OFFSET: usize = HEADER_LEN + 4 + 32;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BurnMessage {
    pub version: u32,
    pub burn_token: [u8; 32],
    pub mint_recipient: [u8; 32],
    pub amount: u64,
    pub message_sender: [u8; 32],
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AttestedMessage {
    pub version: u32,
    pub source_domain: u32,
    pub destination_domain: u32,
    pub nonce: u64,
    pub sender: [u8; 32],
    pub recipient: [u8; 32],
    pub destination_caller: [u8; 32],
    pub body: BurnMessage,
    #[serde(skip)]
    raw: Vec<u8>,
}

fn read_bytes32(cursor: &mut Cursor<&[u8]>) -> std::io::Result<[u8; 32]> {
    let mut out = [0u8; 32];
    cursor.read_exact(&mut out)?;
    Ok(out)
}

impl AttestedMessage {
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < MIN_MESSAGE_LEN {
            return Err(ParseError::TooShort {
                len: bytes.len(),
                min: MIN_MESSAGE_LEN,
            });
        }

        let too_short = |_| ParseError::TooShort {
            len: bytes.len(),
            min: MIN_MESSAGE_LEN,
        };
        let mut cursor = Cursor::new(bytes);

        let version = cursor.read_u32::<BigEndian>().map_err(too_short)?;
        let source_domain = cursor.read_u32::<BigEndian>().map_err(too_short)?;
        let destination_domain = cursor.read_u32::<BigEndian>().map_err(too_short)?;
        let nonce = cursor.read_u64::<BigEndian>().map_err(too_short)?;
        let sender = read_bytes32(&mut cursor).map_err(too_short)?;
        let recipient = read_bytes32(&mut cursor).map_err(too_short)?;
        let destination_caller = read_bytes32(&mut cursor).map_err(too_short)?;

        let body_version = cursor.read_u32::<BigEndian>().map_err(too_short)?;
        let burn_token = read_bytes32(&mut cursor).map_err(too_short)?;
        let mint_recipient = read_bytes32(&mut cursor).map_err(too_short)?;

        let mut amount_high = [0u8; 24];
        cursor.read_exact(&mut amount_high).map_err(too_short)?;
        if amount_high.iter().any(|b| *b != 0) {
            return Err(ParseError::AmountOverflow);
        }
        let amount = cursor.read_u64::<BigEndian>().map_err(too_short)?;
        let message_sender = read_bytes32(&mut cursor).map_err(too_short)?;

        Ok(Self {
            version,
            source_domain,
            destination_domain,
            nonce,
            sender,
            recipient,
            destination_caller,
            body: BurnMessage {
                version: body_version,
                burn_token,
                mint_recipient,
                amount,
                message_sender,
            },
            raw: bytes.to_vec(),
        })
    }

    /// Re-encodes the parsed fields, followed by any bytes past the fixed
    /// layout. Equal to [`Self::as_bytes`] for every parsed message.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.raw.len().max(MIN_MESSAGE_LEN));

        bytes.extend_from_slice(&self.version.to_be_bytes());
        bytes.extend_from_slice(&self.source_domain.to_be_bytes());
        bytes.extend_from_slice(&self.destination_domain.to_be_bytes());
        bytes.extend_from_slice(&self.nonce.to_be_bytes());
        bytes.extend_from_slice(&self.sender);
        bytes.extend_from_slice(&self.recipient);
        bytes.extend_from_slice(&self.destination_caller);

        bytes.extend_from_slice(&self.body.version.to_be_bytes());
        bytes.extend_from_slice(&self.body.burn_token);
        bytes.extend_from_slice(&self.body.mint_recipient);
        bytes.extend_from_slice(&[0u8; 24]);
        bytes.extend_from_slice(&self.body.amount.to_be_bytes());
        bytes.extend_from_slice(&self.body.message_sender);

        if self.raw.len() > MIN_MESSAGE_LEN {
            bytes.extend_from_slice(&self.raw[MIN_MESSAGE_LEN..]);
        }
        bytes
    }

    /// The exact bytes the attester signed.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn hash(&self) -> [u8; 32] {
        message_hash(&self.raw)
    }

    pub fn mint_recipient(&self) -> Pubkey {
        Pubkey::new_from_array(self.body.mint_recipient)
    }

    pub fn destination_caller(&self) -> Option<Pubkey> {
        if self.destination_caller == [0u8; 32] {
            None
        } else {
            Some(Pubkey::new_from_array(self.destination_caller))
        }
    }

    /// An all-zero destination caller lets anyone relay.
    pub fn permits_caller(&self, caller: &Pubkey) -> bool {
        self.destination_caller()
            .map_or(true, |required| required == *caller)
    }
}

/// Human-readable name for a CCTP domain id.
pub fn domain_name(domain: u32) -> &'static str {
    match domain {
        0 => "Ethereum",
        1 => "Avalanche",
        2 => "OP Mainnet",
        3 => "Arbitrum",
        4 => "Noble",
        5 => "Solana",
        6 => "Base",
        7 => "Polygon PoS",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut bytes = vec![0u8; MIN_MESSAGE_LEN];
        bytes[4..8].copy_from_slice(&4u32.to_be_bytes());
        bytes[8..12].copy_from_slice(&5u32.to_be_bytes());
        bytes[12..20].copy_from_slice(&288_574u64.to_be_bytes());
        bytes[MINT_RECIPIENT_OFFSET..MINT_RECIPIENT_OFFSET + 32].copy_from_slice(&[7u8; 32]);
        bytes[208..216].copy_from_slice(&1_000_000u64.to_be_bytes());
        bytes
    }

    #[test]
    fn test_layout_constants() {
        assert_eq!(HEADER_LEN, 116);
        assert_eq!(BODY_LEN, 132);
        assert_eq!(MIN_MESSAGE_LEN, 248);
    }

    #[test]
    fn test_parse_reads_big_endian_fields() {
        let message = AttestedMessage::parse(&sample()).unwrap();
        assert_eq!(message.source_domain, 4);
        assert_eq!(message.destination_domain, 5);
        assert_eq!(message.nonce, 288_574);
        assert_eq!(message.body.amount, 1_000_000);
        assert_eq!(message.mint_recipient(), Pubkey::new_from_array([7u8; 32]));
    }

    #[test]
    fn test_amount_high_bytes_rejected() {
        let mut bytes = sample();
        bytes[184] = 1;
        assert_eq!(AttestedMessage::parse(&bytes), Err(ParseError::AmountOverflow));
    }

    #[test]
    fn test_zero_destination_caller_permits_anyone() {
        let message = AttestedMessage::parse(&sample()).unwrap();
        assert!(message.destination_caller().is_none());
        assert!(message.permits_caller(&Pubkey::new_unique()));
    }
}
