//! Transport layer abstraction.
//!
//! Defines the `UsbTransport` trait the exchange engine talks through,
//! allowing different implementations (FTDI over nusb, mock, etc.).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Control request 0x{request:02X} failed: {message}")]
    ControlFailed { request: u8, message: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device not open")]
    NotOpen,

    #[error("Device disconnected")]
    Disconnected,
}

/// Raw byte link to the board.
///
/// This trait enables:
/// - Production implementation using an FTDI bridge over nusb
/// - Mock implementation simulating a board for unit testing
pub trait UsbTransport: Send {
    /// Open the link. Opening an open link is a no-op.
    fn open(&mut self) -> Result<(), TransportError>;

    /// Close the link. Closing a closed link is a no-op.
    fn close(&mut self);

    /// Write raw bytes, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read whatever is available, up to `max_len` bytes. Never blocks for
    /// long; an empty result means nothing has arrived yet.
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError>;

    /// Check if the link is open.
    fn is_connected(&self) -> bool;

    /// Get the bridge VID.
    fn vendor_id(&self) -> u16;

    /// Get the bridge PID.
    fn product_id(&self) -> u16;
}
