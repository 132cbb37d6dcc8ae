pub mod decoder;
pub mod types;

pub use decoder::{decode, ACK_LITERAL, INVALID_PAYLOAD_LENGTH};
pub use types::*;
