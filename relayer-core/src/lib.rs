pub mod api;
pub mod attestation;
pub mod config;
pub mod error;
pub mod fee;
pub mod instruction;
pub mod ledger;
pub mod message;
pub mod pda;
pub mod pipeline;
pub mod relayer;
pub mod signer;
pub mod transport;
pub mod utils;

pub use attestation::{poll_attestation, AttestationBytes, AttestationSource, AttestationStatus, PollPolicy};
pub use config::*;
pub use error::*;
pub use message::AttestedMessage;
pub use pda::{AddressDeriver, CctpPrograms, DerivedAddressSet};
pub use pipeline::{RelayAttempt, RelayState, SubmissionPipeline};
pub use relayer::{RelayReport, Relayer};
pub use signer::*;
