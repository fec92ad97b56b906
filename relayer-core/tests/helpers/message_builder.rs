use relayer_core::message::{HEADER_LEN, MIN_MESSAGE_LEN};

/// Builds raw CCTP v1 burn messages. Defaults to a Noble → Solana burn of
/// 1 USDC with nonce 1 and no destination caller.
pub struct MessageBuilder {
    version: u32,
    source_domain: u32,
    destination_domain: u32,
    nonce: u64,
    sender: [u8; 32],
    recipient: [u8; 32],
    destination_caller: [u8; 32],
    burn_token: [u8; 32],
    mint_recipient: [u8; 32],
    amount_high: [u8; 24],
    amount: u64,
    message_sender: [u8; 32],
    trailing: Vec<u8>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self {
            version: 0,
            source_domain: 4,
            destination_domain: 5,
            nonce: 1,
            sender: [0x11; 32],
            recipient: [0x22; 32],
            destination_caller: [0u8; 32],
            burn_token: super::noble_burn_token(),
            mint_recipient: [0x33; 32],
            amount_high: [0u8; 24],
            amount: 1_000_000,
            message_sender: [0x44; 32],
            trailing: Vec::new(),
        }
    }

    pub fn with_source_domain(mut self, domain: u32) -> Self {
        self.source_domain = domain;
        self
    }

    pub fn with_destination_domain(mut self, domain: u32) -> Self {
        self.destination_domain = domain;
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_destination_caller(mut self, caller: [u8; 32]) -> Self {
        self.destination_caller = caller;
        self
    }

    pub fn with_burn_token(mut self, token: [u8; 32]) -> Self {
        self.burn_token = token;
        self
    }

    pub fn with_mint_recipient(mut self, recipient: [u8; 32]) -> Self {
        self.mint_recipient = recipient;
        self
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }

    /// Sets one of the 24 high bytes of the u256 amount.
    pub fn with_amount_high_byte(mut self, index: usize, value: u8) -> Self {
        self.amount_high[index] = value;
        self
    }

    pub fn with_trailing(mut self, bytes: &[u8]) -> Self {
        self.trailing = bytes.to_vec();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MIN_MESSAGE_LEN + self.trailing.len());
        bytes.extend_from_slice(&self.version.to_be_bytes());
        bytes.extend_from_slice(&self.source_domain.to_be_bytes());
        bytes.extend_from_slice(&self.destination_domain.to_be_bytes());
        bytes.extend_from_slice(&self.nonce.to_be_bytes());
        bytes.extend_from_slice(&self.sender);
        bytes.extend_from_slice(&self.recipient);
        bytes.extend_from_slice(&self.destination_caller);
        assert_eq!(bytes.len(), HEADER_LEN);

        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(&self.burn_token);
        bytes.extend_from_slice(&self.mint_recipient);
        bytes.extend_from_slice(&self.amount_high);
        bytes.extend_from_slice(&self.amount.to_be_bytes());
        bytes.extend_from_slice(&self.message_sender);
        assert_eq!(bytes.len(), MIN_MESSAGE_LEN);

        bytes.extend_from_slice(&self.trailing);
        bytes
    }
}
