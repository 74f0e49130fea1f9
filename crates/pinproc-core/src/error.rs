//! Error type shared by every board operation.

use thiserror::Error;

use crate::events::EventType;
use crate::machine::MachineType;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum PinprocError {
    #[error("{what} {value} out of range 0-{max}")]
    OutOfRange {
        what: &'static str,
        value: usize,
        max: usize,
    },

    #[error("Switch rules cannot be attached to {0} events")]
    NotSwitchEvent(EventType),

    #[error("{words} words exceeds write capabilities; restrict writes to {max} words")]
    BurstTooLarge { words: usize, max: usize },

    #[error("Not enough free switch rule slots: {available} available, need {needed}")]
    RulesExhausted { available: usize, needed: usize },

    #[error("Switch rule chain corrupted at slot 0x{index:03X}: {reason}")]
    ChainCorrupted { index: u16, reason: &'static str },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Short write: wrote {written} of {requested} bytes")]
    ShortWrite { written: usize, requested: usize },

    #[error("Timed out after {polls} polls: expected {expected} reply words, have {received}")]
    ReplyTimeout {
        expected: usize,
        received: usize,
        polls: u32,
    },

    #[error("Reply count mismatch: expected {expected} words, received {received}")]
    ReplyMismatch { expected: usize, received: usize },

    #[error("DMD frame needs {needed} bytes, got {provided}")]
    FrameTooShort { provided: usize, needed: usize },

    #[error("Refusing constant-on state for high-current driver #{driver}")]
    ConstantOnRefused { driver: u16 },

    #[error("Refusing to update driver #{driver}; polarity differs on non-custom machine")]
    PolarityLocked { driver: u16 },

    #[error("Chip ID verification failed: read 0x{read:08X}")]
    ChipIdMismatch { read: u32 },

    #[error("Machine type {requested} invalid for board settings {detected}")]
    MachineTypeMismatch {
        requested: MachineType,
        detected: MachineType,
    },
}

pub type Result<T> = std::result::Result<T, PinprocError>;

/// Reject `value` when it exceeds `max`.
pub(crate) fn check_range(what: &'static str, value: usize, max: usize) -> Result<()> {
    if value > max {
        return Err(PinprocError::OutOfRange { what, value, max });
    }
    Ok(())
}
