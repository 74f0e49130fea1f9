//! Board events.
//!
//! The board emits unsolicited words for switch transitions and for
//! displayed DMD frames. `Event::decode` turns one of those words into a
//! typed record.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::constants::*;

/// Kind of event, also used to select which switch transition a rule
/// reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventType {
    #[default]
    Invalid,
    SwitchClosedDebounced,
    SwitchOpenDebounced,
    SwitchClosedNondebounced,
    SwitchOpenNondebounced,
    DmdFrameDisplayed,
}

impl EventType {
    /// The four switch transitions a rule can be attached to.
    pub const SWITCH_TRANSITIONS: [EventType; 4] = [
        EventType::SwitchOpenDebounced,
        EventType::SwitchClosedDebounced,
        EventType::SwitchOpenNondebounced,
        EventType::SwitchClosedNondebounced,
    ];

    /// Build a switch event type from its state and debounce bits.
    pub fn from_switch_bits(open: bool, debounced: bool) -> Self {
        match (open, debounced) {
            (true, true) => EventType::SwitchOpenDebounced,
            (true, false) => EventType::SwitchOpenNondebounced,
            (false, true) => EventType::SwitchClosedDebounced,
            (false, false) => EventType::SwitchClosedNondebounced,
        }
    }

    pub fn is_switch(&self) -> bool {
        matches!(
            self,
            EventType::SwitchClosedDebounced
                | EventType::SwitchOpenDebounced
                | EventType::SwitchClosedNondebounced
                | EventType::SwitchOpenNondebounced
        )
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self,
            EventType::SwitchOpenDebounced | EventType::SwitchOpenNondebounced
        )
    }

    pub fn is_debounced(&self) -> bool {
        matches!(
            self,
            EventType::SwitchOpenDebounced | EventType::SwitchClosedDebounced
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Invalid => write!(f, "invalid"),
            EventType::SwitchClosedDebounced => write!(f, "closed"),
            EventType::SwitchOpenDebounced => write!(f, "open"),
            EventType::SwitchClosedNondebounced => write!(f, "closed (nondebounced)"),
            EventType::SwitchOpenNondebounced => write!(f, "open (nondebounced)"),
            EventType::DmdFrameDisplayed => write!(f, "dmd frame displayed"),
        }
    }
}

/// A decoded board event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Event {
    pub event_type: EventType,
    /// Switch number, or frame number for DMD events.
    pub value: u32,
}

impl Event {
    /// Decode an unsolicited event word.
    pub fn decode(word: u32) -> Self {
        let value = word & EVENT_SWITCH_NUM_MASK;
        let event_type = match (word & EVENT_TYPE_MASK) >> EVENT_TYPE_SHIFT {
            EVENT_TYPE_SWITCH => {
                let open = (word >> EVENT_SWITCH_STATE_SHIFT) & 1 == 1;
                let debounced = (word >> EVENT_SWITCH_DEBOUNCED_SHIFT) & 1 == 1;
                EventType::from_switch_bits(open, debounced)
            }
            EVENT_TYPE_DMD => EventType::DmdFrameDisplayed,
            _ => EventType::Invalid,
        };
        Self { event_type, value }
    }

    /// Encode an event back into the board's word layout.
    pub fn encode(&self) -> u32 {
        let value = self.value & EVENT_SWITCH_NUM_MASK;
        match self.event_type {
            EventType::DmdFrameDisplayed => (EVENT_TYPE_DMD << EVENT_TYPE_SHIFT) | value,
            EventType::Invalid => (0b11 << EVENT_TYPE_SHIFT) | value,
            switch => {
                (EVENT_TYPE_SWITCH << EVENT_TYPE_SHIFT)
                    | ((switch.is_open() as u32) << EVENT_SWITCH_STATE_SHIFT)
                    | ((switch.is_debounced() as u32) << EVENT_SWITCH_DEBOUNCED_SHIFT)
                    | value
            }
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.event_type {
            EventType::DmdFrameDisplayed => write!(f, "frame {} displayed", self.value),
            EventType::Invalid => write!(f, "invalid event ({})", self.value),
            t => write!(f, "switch {} {}", self.value, t),
        }
    }
}
