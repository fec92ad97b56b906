use crate::pipeline::RelayState;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid base64: {0}")]
    InvalidBase64(String),
}

/// Malformed attested message. Fatal: a re-fetch of the source event is the
/// only remedy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("message too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },

    #[error("burn amount exceeds 64 bits")]
    AmountOverflow,

    #[error(transparent)]
    Encoding(#[from] CodecError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    #[error("seed {index} is {len} bytes, max {max}")]
    InvalidSeed { index: usize, len: usize, max: usize },

    #[error("{count} seeds exceed the limit of {max}")]
    TooManySeeds { count: usize, max: usize },

    #[error("nonce 0 has no nonce bucket")]
    InvalidNonce,

    #[error("no off-curve bump found for seeds")]
    NoViableBump,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttestationError {
    #[error("attestation not ready after {attempts} polls (last status: {last_status})")]
    Exhausted { attempts: u32, last_status: String },

    #[error("attestation service request failed: {0}")]
    Http(String),

    #[error("malformed attestation: {0}")]
    Malformed(String),

    #[error("signature recovery failed: {0}")]
    Recovery(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    #[error("price feed request failed: {0}")]
    Http(String),

    #[error("price feed returned an unusable price: {0}")]
    InvalidPrice(String),
}

/// Outcome of one transport call, used to decide between the proxy and the
/// direct ledger path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Network error, non-2xx, timeout or an unreadable body. Eligible for
    /// the fallback path.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("destination caller restriction: {0}")]
    CallerRestricted(String),

    /// The ledger evaluated the transaction and refused it.
    #[error("transaction rejected: {message}")]
    Program { message: String, logs: Vec<String> },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("signer declined: {0}")]
    Rejected(String),

    #[error("no signer connected")]
    Disconnected,

    #[error("signing failed: {0}")]
    Signing(String),
}

/// `stage` is the state the attempt was trying to reach when it failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("{stage}: {detail}")]
    Transient { stage: RelayState, detail: String },

    #[error("caller restricted: {message}")]
    CallerRestricted { message: String },

    #[error("signer declined at {stage}: {reason}")]
    UserRejected { stage: RelayState, reason: String },

    #[error("signer identity changed from {expected} to {actual} before signing")]
    SignerChanged { expected: String, actual: String },

    #[error("{stage}: {message}")]
    Unknown {
        stage: RelayState,
        message: String,
        logs: Vec<String>,
    },

    #[error("a relay for message 0x{message_hash} is already in flight")]
    InFlight { message_hash: String },

    #[error("message 0x{message_hash} was already submitted as {signature}")]
    AlreadySubmitted {
        message_hash: String,
        signature: String,
    },
}

impl SubmissionError {
    /// Program diagnostic lines attached to the failure, if any.
    pub fn logs(&self) -> &[String] {
        match self {
            SubmissionError::Unknown { logs, .. } => logs,
            _ => &[],
        }
    }
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error(transparent)]
    Attestation(#[from] AttestationError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("message is addressed to domain {found}, this relayer serves domain {expected}")]
    WrongDestination { expected: u32, found: u32 },

    #[error("failed to encode instruction data: {0}")]
    Encoding(#[from] std::io::Error),
}
