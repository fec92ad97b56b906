//! Assembly of the `receive_message` call and the fee and memo instructions
//! that ride along with it. Pure: no network access.

use crate::error::RelayError;
use crate::fee::FeeQuote;
use crate::message::{domain_name, AttestedMessage};
use crate::pda::{CctpPrograms, DerivedAddressSet};
use borsh::BorshSerialize;
use sha2::{Digest, Sha256};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::{pubkey, system_instruction, system_program};

pub const RECEIVE_MESSAGE_DISCRIMINATOR: [u8; 8] = [38, 144, 127, 225, 31, 225, 238, 25];

pub const TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const MEMO_PROGRAM_ID: Pubkey = pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

/// Number of accounts `receive_message` expects, including the forwarded
/// token messenger minter accounts.
pub const RECEIVE_MESSAGE_ACCOUNT_COUNT: usize = 19;

/// First eight bytes of `sha256("global:<name>")`.
pub fn anchor_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{name}").as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

#[derive(BorshSerialize)]
struct ReceiveMessageParams<'a> {
    message: &'a [u8],
    attestation: &'a [u8],
}

/// Discriminator followed by `u32`-LE length-prefixed message and
/// attestation.
pub fn receive_message_data(message: &[u8], attestation: &[u8]) -> Result<Vec<u8>, RelayError> {
    let mut data = RECEIVE_MESSAGE_DISCRIMINATOR.to_vec();
    ReceiveMessageParams {
        message,
        attestation,
    }
    .serialize(&mut data)?;
    Ok(data)
}

/// Account list in the order the message transmitter reads it: its own
/// accounts, then the remaining accounts it forwards to the token messenger
/// minter's `handle_receive_message`.
pub fn receive_message_accounts(
    programs: &CctpPrograms,
    addresses: &DerivedAddressSet,
    mint_recipient: Pubkey,
    payer: Pubkey,
) -> Vec<AccountMeta> {
    let fixed = &addresses.fixed;
    vec![
        AccountMeta::new(payer, true),
        AccountMeta::new_readonly(payer, true),
        AccountMeta::new_readonly(fixed.authority_pda, false),
        AccountMeta::new_readonly(fixed.message_transmitter_state, false),
        AccountMeta::new(addresses.used_nonces, false),
        AccountMeta::new_readonly(programs.token_messenger_minter, false),
        AccountMeta::new_readonly(system_program::id(), false),
        AccountMeta::new_readonly(fixed.message_transmitter_event_authority, false),
        AccountMeta::new_readonly(programs.message_transmitter, false),
        // forwarded to the receiver
        AccountMeta::new_readonly(fixed.token_messenger, false),
        AccountMeta::new_readonly(addresses.remote_token_messenger, false),
        AccountMeta::new_readonly(fixed.token_minter, false),
        AccountMeta::new(addresses.local_token, false),
        AccountMeta::new_readonly(addresses.token_pair, false),
        AccountMeta::new(mint_recipient, false),
        AccountMeta::new(fixed.custody_token, false),
        AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        AccountMeta::new_readonly(fixed.token_messenger_minter_event_authority, false),
        AccountMeta::new_readonly(programs.token_messenger_minter, false),
    ]
}

pub fn memo_text(prefix: &str, message: &AttestedMessage) -> String {
    format!(
        "{} | {}→{} | nonce:{}",
        prefix,
        domain_name(message.source_domain),
        domain_name(message.destination_domain),
        message.nonce
    )
}

pub fn memo_instruction(text: &str, signer: Pubkey) -> Instruction {
    Instruction::new_with_bytes(
        MEMO_PROGRAM_ID,
        text.as_bytes(),
        vec![AccountMeta::new_readonly(signer, true)],
    )
}

/// The primary instruction plus its fee and memo companions, in
/// transaction order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayInstructions {
    pub receive_message: Instruction,
    pub fee_transfer: Option<Instruction>,
    pub memo: Instruction,
}

impl RelayInstructions {
    pub fn to_vec(&self) -> Vec<Instruction> {
        let mut out = Vec::with_capacity(3);
        out.push(self.receive_message.clone());
        if let Some(fee) = &self.fee_transfer {
            out.push(fee.clone());
        }
        out.push(self.memo.clone());
        out
    }
}

#[derive(Debug, Clone)]
pub struct InstructionBuilder {
    programs: CctpPrograms,
    memo_prefix: String,
}

impl InstructionBuilder {
    pub fn new(programs: CctpPrograms, memo_prefix: impl Into<String>) -> Self {
        Self {
            programs,
            memo_prefix: memo_prefix.into(),
        }
    }

    /// A zero-lamport quote, or none at all, omits the fee transfer.
    pub fn build(
        &self,
        message: &AttestedMessage,
        attestation: &[u8],
        addresses: &DerivedAddressSet,
        payer: Pubkey,
        fee: Option<&FeeQuote>,
    ) -> Result<RelayInstructions, RelayError> {
        let data = receive_message_data(message.as_bytes(), attestation)?;
        let accounts =
            receive_message_accounts(&self.programs, addresses, message.mint_recipient(), payer);

        let receive_message = Instruction {
            program_id: self.programs.message_transmitter,
            accounts,
            data,
        };

        let fee_transfer = fee
            .filter(|quote| quote.lamports > 0)
            .map(|quote| system_instruction::transfer(&payer, &quote.recipient, quote.lamports));

        let memo = memo_instruction(&memo_text(&self.memo_prefix, message), payer);

        Ok(RelayInstructions {
            receive_message,
            fee_transfer,
            memo,
        })
    }
}
