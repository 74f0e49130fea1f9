//! Exchange engine: the only owner of the transport.
//!
//! Outgoing bursts are coalesced into as few transport writes as possible.
//! Incoming words are split into solicited replies (answers to read
//! requests, kept with their address echo) and unsolicited events, each in
//! arrival order.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::thread;

use tracing::{debug, trace, warn};

use crate::buffer::WordBuffer;
use crate::config::ExchangeConfig;
use crate::error::{PinprocError, Result, check_range};
use crate::protocol::codec::{ReplyHeader, classify, reg_request_word};
use crate::protocol::constants::{
    MAX_READ_WORDS, MAX_WRITE_WORDS, MODULE_SELECT_SHIFT, REG_ADDR_MASK,
};
use crate::protocol::word::words_to_bytes;
use crate::transport::UsbTransport;

/// Destination for serialized bursts.
///
/// The rule and driver engines write through this so they can be exercised
/// without a transport.
pub trait WordSink {
    fn prepare_write(&mut self, words: &[u32]) -> Result<()>;
}

pub struct Exchange<T: UsbTransport> {
    transport: T,
    buffer: WordBuffer,
    solicited: VecDeque<u32>,
    unsolicited: VecDeque<u32>,
    prepared: Vec<u32>,
    config: ExchangeConfig,
}

impl<T: UsbTransport> Exchange<T> {
    pub fn new(transport: T, config: ExchangeConfig) -> Self {
        Self {
            transport,
            buffer: WordBuffer::new(),
            solicited: VecDeque::new(),
            unsolicited: VecDeque::new(),
            prepared: Vec::with_capacity(MAX_WRITE_WORDS),
            config,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ExchangeConfig) {
        self.config = config;
    }

    /// Drop all queued, buffered and prepared words.
    pub fn reset(&mut self) {
        self.buffer.flush_and_reset();
        self.solicited.clear();
        self.unsolicited.clear();
        self.prepared.clear();
    }

    /// Words waiting in the coalescing buffer.
    pub fn prepared_len(&self) -> usize {
        self.prepared.len()
    }

    pub fn solicited_len(&self) -> usize {
        self.solicited.len()
    }

    pub fn unsolicited_len(&self) -> usize {
        self.unsolicited.len()
    }

    /// Send words immediately as one transport write.
    pub fn write_words(&mut self, words: &[u32]) -> Result<()> {
        if words.is_empty() {
            return Ok(());
        }
        let bytes = words_to_bytes(words);
        let written = self.transport.write(&bytes)?;
        if written != bytes.len() {
            warn!(written, requested = bytes.len(), "Short write");
            return Err(PinprocError::ShortWrite {
                written,
                requested: bytes.len(),
            });
        }
        trace!(words = words.len(), "Wrote words");
        Ok(())
    }

    /// Send the coalescing buffer as one write. The buffer is emptied even
    /// when the write fails.
    pub fn flush_write(&mut self) -> Result<()> {
        let words = std::mem::take(&mut self.prepared);
        let result = self.write_words(&words);
        self.prepared = words;
        self.prepared.clear();
        result
    }

    /// Send a read request for `count` registers.
    pub fn request_read(&mut self, module: u32, address: u32, count: usize) -> Result<()> {
        check_range("Read words", count, MAX_READ_WORDS)?;
        self.write_words(&[reg_request_word(module, address, count)])
    }

    /// Pull bytes from the link.
    pub fn collect(&mut self) -> Result<usize> {
        self.buffer.collect(&mut self.transport)
    }

    /// Bytes buffered but not yet classified.
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Take words straight from the byte buffer, bypassing classification.
    pub fn take_raw_words(&mut self, n: usize) -> Option<Vec<u32>> {
        self.buffer.take_words(n)
    }

    /// Collect then discard everything received so far.
    pub fn flush_read_buffer(&mut self) -> Result<usize> {
        let collected = self.collect()?;
        debug!(discarded = self.buffer.len(), "Flushing read buffer");
        self.buffer.flush_and_reset();
        Ok(collected)
    }

    /// Collect and file every complete frame. Returns the number of words
    /// added to the two queues.
    pub fn drain_and_classify(&mut self) -> Result<usize> {
        self.collect()?;
        let mut filed = 0;
        while let Some(header) = self.buffer.peek_word() {
            match classify(header) {
                ReplyHeader::Solicited { length, .. } => {
                    let frame_len = length + 1;
                    if frame_len > self.buffer.capacity() / 4 {
                        warn!(
                            header = %format!("0x{header:08X}"),
                            "Reply longer than the read buffer; stream out of sync"
                        );
                        self.buffer.flush_and_reset();
                        break;
                    }
                    // Wait for the rest of the frame.
                    let Some(frame) = self.buffer.take_words(frame_len) else {
                        break;
                    };
                    trace!(header = %format!("0x{header:08X}"), length, "Solicited reply");
                    filed += frame.len();
                    self.solicited.extend(frame);
                }
                ReplyHeader::Unsolicited => {
                    let Some(frame) = self.buffer.take_words(2) else {
                        break;
                    };
                    trace!(event = %format!("0x{:08X}", frame[1]), "Unsolicited event");
                    self.unsolicited.push_back(frame[1]);
                    filed += 1;
                }
            }
        }
        Ok(filed)
    }

    /// Poll until exactly `expected` solicited words are queued.
    ///
    /// Fewer words after the poll budget is spent is a timeout; more words
    /// than expected is a mismatch. The solicited queue is discarded on
    /// either failure.
    pub fn await_solicited(&mut self, expected: usize) -> Result<()> {
        let mut polls = 0;
        while self.solicited.len() < expected && polls < self.config.max_polls {
            polls += 1;
            thread::sleep(self.config.poll_delay());
            self.drain_and_classify()?;
        }

        let received = self.solicited.len();
        match received.cmp(&expected) {
            Ordering::Equal => Ok(()),
            Ordering::Less => {
                warn!(expected, received, polls, "Timed out waiting for reply");
                self.solicited.clear();
                Err(PinprocError::ReplyTimeout {
                    expected,
                    received,
                    polls,
                })
            }
            Ordering::Greater => {
                warn!(expected, received, "Unexpected reply count");
                self.solicited.clear();
                Err(PinprocError::ReplyMismatch { expected, received })
            }
        }
    }

    /// Pop up to `n` solicited words.
    pub fn take_solicited(&mut self, n: usize) -> Vec<u32> {
        let n = n.min(self.solicited.len());
        self.solicited.drain(..n).collect()
    }

    /// Read `count` registers and return them without the address echo.
    pub fn read_words(&mut self, module: u32, address: u32, count: usize) -> Result<Vec<u32>> {
        self.request_read(module, address, count)?;
        self.await_solicited(count + 1)?;

        let mut words = self.take_solicited(count + 1);
        let echo = words.remove(0);
        let expected_echo = (module << MODULE_SELECT_SHIFT) | (address & REG_ADDR_MASK);
        if echo & 0xF_FFFF != expected_echo {
            warn!(
                echo = %format!("0x{echo:08X}"),
                expected = %format!("0x{expected_echo:05X}"),
                "Reply address echo does not match request"
            );
        }
        Ok(words)
    }

    /// Pop up to `max_events` unsolicited words.
    pub fn drain_unsolicited(&mut self, max_events: usize) -> Result<Vec<u32>> {
        self.drain_and_classify()?;
        let n = max_events.min(self.unsolicited.len());
        Ok(self.unsolicited.drain(..n).collect())
    }
}

impl<T: UsbTransport> WordSink for Exchange<T> {
    /// Append to the coalescing buffer, flushing first if the words would
    /// not fit.
    fn prepare_write(&mut self, words: &[u32]) -> Result<()> {
        if words.len() > MAX_WRITE_WORDS {
            return Err(PinprocError::BurstTooLarge {
                words: words.len(),
                max: MAX_WRITE_WORDS,
            });
        }
        if self.prepared.len() + words.len() > MAX_WRITE_WORDS {
            self.flush_write()?;
        }
        self.prepared.extend_from_slice(words);
        Ok(())
    }
}

/// Sink that records every burst, for engine tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub bursts: Vec<Vec<u32>>,
    /// Fail every write once this many bursts have been accepted.
    pub fail_from: Option<usize>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn words(&self) -> Vec<u32> {
        self.bursts.concat()
    }
}

#[cfg(test)]
impl WordSink for RecordingSink {
    fn prepare_write(&mut self, words: &[u32]) -> Result<()> {
        if self.fail_from.is_some_and(|n| self.bursts.len() >= n) {
            return Err(PinprocError::ShortWrite {
                written: 0,
                requested: words.len() * 4,
            });
        }
        self.bursts.push(words.to_vec());
        Ok(())
    }
}
