//! FTDI FT245 bridge transport over nusb.
//!
//! The board sits behind an FTDI USB FIFO bridge. Every bulk IN packet from
//! the bridge starts with two modem status bytes, which are stripped here so
//! the layers above only ever see the board's byte stream.

use std::time::Duration;

use nusb::transfer::{Buffer, Bulk, ControlOut, ControlType, In, Out, Recipient, TransferError};
use nusb::{Endpoint, Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument, trace};

use super::traits::{TransportError, UsbTransport};
use crate::config::UsbConfig;
use crate::protocol::constants::*;

const CONTROL_TIMEOUT: Duration = Duration::from_millis(500);
const WRITE_TIMEOUT: Duration = Duration::from_millis(1000);
/// Short enough that a read with nothing pending returns promptly.
const READ_TIMEOUT: Duration = Duration::from_millis(2);
const READ_CHUNK: usize = 4096;

struct OpenLink {
    #[allow(dead_code)] // Keeps the claimed interface open
    interface: Interface,
    reader: Endpoint<Bulk, In>,
    writer: Endpoint<Bulk, Out>,
    /// Payload bytes received but not yet handed out.
    pending: Vec<u8>,
}

/// nusb-based FTDI transport.
pub struct NusbTransport {
    config: UsbConfig,
    link: Option<OpenLink>,
}

impl NusbTransport {
    /// Transport for the default FTDI FT245 bridge. Call `open` before use.
    pub fn new() -> Self {
        Self::with_config(UsbConfig::default())
    }

    pub fn with_config(config: UsbConfig) -> Self {
        Self { config, link: None }
    }

    fn control_out(interface: &Interface, request: u8, value: u16) -> Result<(), TransportError> {
        interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index: 0,
                    data: &[],
                },
                CONTROL_TIMEOUT,
            )
            .wait()
            .map_err(|e| TransportError::ControlFailed {
                request,
                message: e.to_string(),
            })
    }

    fn link(&mut self) -> Result<&mut OpenLink, TransportError> {
        self.link.as_mut().ok_or(TransportError::NotOpen)
    }
}

impl Default for NusbTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for NusbTransport {
    #[instrument(
        level = "info",
        skip(self),
        fields(
            vid = format!("{:04X}", self.config.vendor_id),
            pid = format!("{:04X}", self.config.product_id)
        )
    )]
    fn open(&mut self) -> Result<(), TransportError> {
        if self.link.is_some() {
            return Ok(());
        }
        let vid = self.config.vendor_id;
        let pid = self.config.product_id;

        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        let interface =
            device
                .claim_interface(0)
                .wait()
                .map_err(|e| TransportError::ClaimInterfaceFailed {
                    interface: 0,
                    message: e.to_string(),
                })?;

        // Find BULK endpoints
        let mut in_endpoint: u8 = 0;
        let mut out_endpoint: u8 = 0;

        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() == 0 {
                    for alt in iface.alt_settings() {
                        for ep in alt.endpoints() {
                            if ep.transfer_type() == nusb::descriptors::TransferType::Bulk {
                                if ep.direction() == nusb::transfer::Direction::In {
                                    in_endpoint = ep.address();
                                } else {
                                    out_endpoint = ep.address();
                                }
                            }
                        }
                    }
                }
            }
        }

        if in_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Bulk".into(),
                direction: "In".into(),
            });
        }
        if out_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Bulk".into(),
                direction: "Out".into(),
            });
        }

        // Put the bridge into plain FIFO mode with empty buffers.
        Self::control_out(&interface, SIO_RESET_REQUEST, SIO_RESET_SIO)?;
        Self::control_out(&interface, SIO_RESET_REQUEST, SIO_RESET_PURGE_RX)?;
        Self::control_out(&interface, SIO_RESET_REQUEST, SIO_RESET_PURGE_TX)?;
        Self::control_out(
            &interface,
            SIO_SET_LATENCY_TIMER_REQUEST,
            self.config.latency_ms.max(1) as u16,
        )?;
        Self::control_out(&interface, SIO_SET_BITMODE_REQUEST, 0)?;

        let reader = interface
            .endpoint::<Bulk, In>(in_endpoint)
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;
        let writer = interface
            .endpoint::<Bulk, Out>(out_endpoint)
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        info!(
            in_ep = %format!("0x{:02X}", in_endpoint),
            out_ep = %format!("0x{:02X}", out_endpoint),
            "Bridge opened successfully"
        );

        self.link = Some(OpenLink {
            interface,
            reader,
            writer,
            pending: Vec::new(),
        });
        Ok(())
    }

    fn close(&mut self) {
        if self.link.take().is_some() {
            info!("Bridge closed");
        }
    }

    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let link = self.link()?;

        let mut buffer = Buffer::new(data.len());
        buffer.extend_from_slice(data);
        let completion = link.writer.transfer_blocking(buffer, WRITE_TIMEOUT);
        completion
            .status
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        debug!(bytes_written = completion.actual_len, "Write complete");
        Ok(completion.actual_len)
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let link = self.link()?;

        if link.pending.len() < max_len {
            let completion = link
                .reader
                .transfer_blocking(Buffer::new(READ_CHUNK), READ_TIMEOUT);
            match completion.status {
                Ok(()) => {
                    let raw = completion.buffer.into_vec();
                    let payload = strip_modem_status(&raw[..completion.actual_len]);
                    link.pending.extend_from_slice(&payload);
                }
                // Nothing arrived within the read window.
                Err(TransferError::Cancelled) => {}
                Err(e) => return Err(TransportError::ReadFailed(e.to_string())),
            }
        }

        let n = max_len.min(link.pending.len());
        let out: Vec<u8> = link.pending.drain(..n).collect();
        if !out.is_empty() {
            trace!(bytes_read = out.len(), "Read complete");
        }
        Ok(out)
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    fn vendor_id(&self) -> u16 {
        self.config.vendor_id
    }

    fn product_id(&self) -> u16 {
        self.config.product_id
    }
}

/// Drop the two status bytes heading each bridge packet.
fn strip_modem_status(raw: &[u8]) -> Vec<u8> {
    raw.chunks(FTDI_PACKET_SIZE)
        .filter(|packet| packet.len() > FTDI_STATUS_BYTES)
        .flat_map(|packet| packet[FTDI_STATUS_BYTES..].iter().copied())
        .collect()
}
