#![allow(dead_code)]

pub mod fixtures;
pub mod message_builder;
pub mod mock_transport;

pub use fixtures::*;
pub use message_builder::*;
pub use mock_transport::*;
