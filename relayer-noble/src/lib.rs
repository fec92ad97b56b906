pub mod reader;

pub use reader::{extract_message, NobleTxReader, SourceError};
