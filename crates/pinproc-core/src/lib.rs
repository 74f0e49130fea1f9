//! pinproc-core: host-side driver for the P-ROC pinball controller board.
//!
//! The board sits behind an FTDI USB bridge and speaks a 32-bit word
//! protocol. This crate queues and sends those words, sorts the replies
//! from unsolicited events, and keeps a host copy of the driver, switch
//! rule and DMD configuration.
//!
//! # Architecture
//!
//! - **Protocol**: constants, command and reply header codecs, word packing
//! - **Transport**: USB byte pipe abstraction (nusb, mock)
//! - **Exchange**: write batching, reply/event partitioning, polling
//! - **Drivers**: driver, group and global tables with machine defaults
//! - **Rules**: switch rule slots and the shared pool of linked slots
//! - **Device**: the per-board façade tying the layers together
//!
//! # Example
//!
//! ```no_run
//! use pinproc_core::{BoardConfig, Device, DriverState, ResetMode};
//!
//! let config = BoardConfig::default();
//! let mut device = Device::connect(&config).expect("no board");
//! device.reset(ResetMode::UpdateDevice).expect("reset failed");
//!
//! let pulse = DriverState { driver_num: 40, ..Default::default() }.pulsed(20);
//! device.update_driver_state(&pulse).expect("pulse refused");
//! device.flush_write().expect("write failed");
//! ```

pub mod buffer;
pub mod config;
pub mod device;
pub mod drivers;
pub mod error;
pub mod events;
pub mod exchange;
pub mod machine;
pub mod protocol;
pub mod rules;
pub mod transport;

// Re-exports for convenience
pub use config::{
    BoardConfig, DmdConfig, DriverGlobalConfig, DriverGroupConfig, DriverState, ExchangeConfig,
    JtagOutputs, JtagStatus, SwitchConfig, SwitchRule, UsbConfig,
};
pub use device::{ChipInfo, Device, ResetMode};
pub use error::{PinprocError, Result};
pub use events::{Event, EventType};
pub use machine::{MachineProfile, MachineType};
pub use rules::{RuleSlot, RuleTable};
pub use transport::{MockTransport, NusbTransport, TransportError, UsbTransport};
