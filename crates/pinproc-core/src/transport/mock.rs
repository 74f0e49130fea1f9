//! Mock transport simulating a board, for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{TransportError, UsbTransport};
use crate::events::Event;
use crate::protocol::codec::{decode_command, event_header, reply_header};
use crate::protocol::constants::*;
use crate::protocol::word::{bytes_to_words, words_to_bytes};

/// Version word reported by the simulated board.
pub const MOCK_VERSION: u32 = 0x0001_0013;

#[derive(Debug, Default)]
struct MockBoard {
    /// Bytes waiting to be read by the host.
    rx: VecDeque<u8>,
    /// Captured writes.
    write_log: Vec<Vec<u8>>,
    /// Register values returned for read requests, keyed by (module, address).
    registers: HashMap<(u32, u32), u32>,
    /// Answer read requests as they are written.
    auto_reply: bool,
    connected: bool,
    short_write: bool,
    /// Cap on bytes handed out per read call.
    read_chunk: Option<usize>,
    read_calls: usize,
}

impl MockBoard {
    fn answer_requests(&mut self, data: &[u8]) {
        let words = bytes_to_words(data);
        let mut i = 0;
        while i < words.len() {
            let header = decode_command(words[i]);
            i += 1;
            if header.write {
                i += header.length;
                continue;
            }
            // Unmapped modules never answer.
            if header.module > MODULE_DMD {
                continue;
            }
            let echo = (header.module << MODULE_SELECT_SHIFT) | header.address;
            let mut reply = Vec::with_capacity(header.length + 1);
            reply.push(reply_header(echo, header.length));
            for offset in 0..header.length as u32 {
                let value = self
                    .registers
                    .get(&(header.module, header.address + offset))
                    .copied()
                    .unwrap_or(0);
                reply.push(value);
            }
            self.rx.extend(words_to_bytes(&reply));
        }
    }
}

/// Mock transport for unit testing exchange and device logic.
///
/// Clones share the same simulated board, so a test can keep one handle
/// while the device under test owns another.
#[derive(Clone)]
pub struct MockTransport {
    board: Arc<Mutex<MockBoard>>,
    /// Simulated VID/PID.
    vid: u16,
    pid: u16,
}

impl MockTransport {
    /// A connected link with no simulated board behind it.
    pub fn new() -> Self {
        Self {
            board: Arc::new(Mutex::new(MockBoard {
                connected: true,
                ..Default::default()
            })),
            vid: FTDI_VENDOR_ID,
            pid: FTDI_FT245_PRODUCT_ID,
        }
    }

    /// A link to a responsive board reporting the given family.
    pub fn with_board(stern: bool) -> Self {
        let mock = Self::new();
        mock.set_auto_reply(true);
        mock.set_register(MODULE_MANAGER, REG_CHIP_ID_ADDR, CHIP_ID);
        mock.set_register(MODULE_MANAGER, REG_VERSION_ADDR, MOCK_VERSION);
        mock.set_register(MODULE_MANAGER, REG_WATCHDOG_ADDR, 0);
        mock.set_register(
            MODULE_MANAGER,
            REG_DIPSWITCH_ADDR,
            if stern { STERN_DETECT_MASK } else { 0 },
        );
        mock
    }

    fn board(&self) -> MutexGuard<'_, MockBoard> {
        self.board.lock().unwrap()
    }

    /// Answer read requests from the register map.
    pub fn set_auto_reply(&self, enabled: bool) {
        self.board().auto_reply = enabled;
    }

    pub fn set_register(&self, module: u32, addr: u32, value: u32) {
        self.board().registers.insert((module, addr), value);
    }

    /// Queue raw bytes to be returned on read.
    pub fn queue_bytes(&self, bytes: &[u8]) {
        self.board().rx.extend(bytes.iter().copied());
    }

    /// Queue words to be returned on read.
    pub fn queue_words(&self, words: &[u32]) {
        self.queue_bytes(&words_to_bytes(words));
    }

    /// Queue a solicited reply frame.
    pub fn queue_reply(&self, address: u32, payload: &[u32]) {
        let mut frame = vec![reply_header(address, payload.len())];
        frame.extend_from_slice(payload);
        self.queue_words(&frame);
    }

    /// Queue an unsolicited event frame.
    pub fn queue_event(&self, event: Event) {
        self.queue_words(&[event_header(), event.encode()]);
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.board().write_log.clone()
    }

    /// All written words, in order, across every write.
    pub fn written_words(&self) -> Vec<u32> {
        self.board()
            .write_log
            .iter()
            .flat_map(|w| bytes_to_words(w))
            .collect()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.board().write_log.clear();
    }

    /// Accept one byte less than requested on every write.
    pub fn set_short_write(&self, enabled: bool) {
        self.board().short_write = enabled;
    }

    /// Hand out at most `chunk` bytes per read.
    pub fn set_read_chunk(&self, chunk: Option<usize>) {
        self.board().read_chunk = chunk;
    }

    /// Number of read calls made so far.
    pub fn read_calls(&self) -> usize {
        self.board().read_calls
    }

    /// Bytes still waiting to be read.
    pub fn pending_bytes(&self) -> usize {
        self.board().rx.len()
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        self.board().connected = false;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.board().connected = true;
        Ok(())
    }

    fn close(&mut self) {
        self.board().connected = false;
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut board = self.board();
        if !board.connected {
            return Err(TransportError::Disconnected);
        }
        board.write_log.push(data.to_vec());
        if board.short_write {
            return Ok(data.len().saturating_sub(1));
        }
        if board.auto_reply {
            board.answer_requests(data);
        }
        Ok(data.len())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let mut board = self.board();
        if !board.connected {
            return Err(TransportError::Disconnected);
        }
        board.read_calls += 1;
        let n = max_len
            .min(board.read_chunk.unwrap_or(usize::MAX))
            .min(board.rx.len());
        Ok(board.rx.drain(..n).collect())
    }

    fn is_connected(&self) -> bool {
        self.board().connected
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_write_capture() {
        let mut mock = MockTransport::new();
        mock.write(b"Hello").unwrap();
        mock.write(b"World").unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], b"Hello");
        assert_eq!(writes[1], b"World");
    }

    #[test]
    fn test_mock_answers_read_request() {
        let mut mock = MockTransport::with_board(false);
        let request = crate::protocol::codec::reg_request_word(MODULE_MANAGER, 0, 4);
        mock.write(&words_to_bytes(&[request])).unwrap();

        let words = bytes_to_words(&mock.read(1024).unwrap());
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], reply_header(0, 4));
        assert_eq!(words[1], CHIP_ID);
        assert_eq!(words[2], MOCK_VERSION);
    }

    #[test]
    fn test_mock_skips_burst_payload() {
        let mut mock = MockTransport::with_board(false);
        // Payload word 0 would look like a read request if parsed as a header.
        let burst = [
            crate::protocol::codec::burst_command(MODULE_DRIVER_CTRL, 0, 1),
            0,
        ];
        mock.write(&words_to_bytes(&burst)).unwrap();
        assert_eq!(mock.pending_bytes(), 0);
    }

    #[test]
    fn test_mock_read_chunk() {
        let mut mock = MockTransport::new();
        mock.queue_words(&[1, 2]);
        mock.set_read_chunk(Some(3));
        assert_eq!(mock.read(64).unwrap().len(), 3);
        assert_eq!(mock.read(64).unwrap().len(), 3);
        assert_eq!(mock.read(64).unwrap().len(), 2);
        assert_eq!(mock.read_calls(), 3);
    }

    #[test]
    fn test_mock_disconnect() {
        let mut mock = MockTransport::new();
        assert!(mock.is_connected());

        mock.disconnect();
        assert!(!mock.is_connected());
        assert!(mock.write(b"test").is_err());
    }
}
