//! Protocol module - wire format of the board's word protocol.

pub mod codec;
pub mod constants;
pub mod word;

pub use codec::{CommandHeader, ReplyHeader, classify, decode_command};
pub use constants::*;
pub use word::{bytes_to_words, words_to_bytes};
