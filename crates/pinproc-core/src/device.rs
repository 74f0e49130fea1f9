//! Device façade: one session with one board.
//!
//! `Device` owns the exchange engine (and through it the transport), the
//! host copy of the board configuration and the switch rule table. Every
//! public operation that fails also records its error text, readable with
//! [`Device::last_error`].

use std::thread;

use tracing::{debug, error, info, instrument, warn};

use crate::config::{
    BoardConfig, DmdConfig, DriverGlobalConfig, DriverGroupConfig, DriverState, ExchangeConfig,
    JtagOutputs, JtagStatus, SwitchConfig, SwitchRule,
};
use crate::drivers::BoardState;
use crate::error::{PinprocError, Result, check_range};
use crate::events::{Event, EventType};
use crate::exchange::{Exchange, WordSink};
use crate::machine::MachineType;
use crate::protocol::codec::{
    burst_command, dmd_config_burst, jtag_outputs_burst, jtag_shift_burst, switch_config_burst,
};
use crate::protocol::constants::*;
use crate::protocol::word::dots_to_words;
use crate::rules::RuleTable;
use crate::transport::{NusbTransport, UsbTransport};

/// How far a reset reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Rebuild host-side state only.
    LocalOnly,
    /// Rebuild host-side state and push it to the board.
    UpdateDevice,
}

/// Identity block read from the manager module at open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipInfo {
    pub chip_id: u32,
    pub version: u16,
    pub revision: u16,
    pub watchdog: u32,
    pub dipswitches: u32,
}

pub struct Device<T: UsbTransport> {
    exchange: Exchange<T>,
    board: BoardState,
    rules: RuleTable,
    machine_type: MachineType,
    detected: Option<MachineType>,
    chip_info: Option<ChipInfo>,
    last_error: Option<String>,
}

impl Device<NusbTransport> {
    /// Open the USB board described by `config` and apply its switch and
    /// DMD settings.
    pub fn connect(config: &BoardConfig) -> Result<Self> {
        let transport = NusbTransport::with_config(config.usb);
        let mut device = Self::create(transport, config.machine_type, config.exchange)?;
        device.apply_config(config)?;
        Ok(device)
    }
}

impl<T: UsbTransport> Device<T> {
    /// A closed device with host-side defaults for `machine_type`.
    pub fn new(transport: T, machine_type: MachineType, config: ExchangeConfig) -> Self {
        let mut device = Self {
            exchange: Exchange::new(transport, config),
            board: BoardState::new(),
            rules: RuleTable::default(),
            machine_type,
            detected: None,
            chip_info: None,
            last_error: None,
        };
        if let Err(e) = device.reset(ResetMode::LocalOnly) {
            warn!(error = %e, "Local reset failed");
        }
        device
    }

    /// Open the board and check that it can be driven as `machine_type`.
    #[instrument(level = "info", skip(transport, config))]
    pub fn create(transport: T, machine_type: MachineType, config: ExchangeConfig) -> Result<Self> {
        let mut device = Self::new(transport, machine_type, config);
        device.open()?;

        let detected = device.detected.unwrap_or_default();
        if !machine_type.accepts(detected) {
            error!(requested = %machine_type, %detected, "Machine type invalid for board settings");
            device.close();
            return Err(PinprocError::MachineTypeMismatch {
                requested: machine_type,
                detected,
            });
        }
        Ok(device)
    }

    fn track<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
        }
        result
    }

    /// Text of the most recent failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn machine_type(&self) -> MachineType {
        self.machine_type
    }

    /// Family reported by the board, known once the chip ID has been read.
    pub fn detected_machine_type(&self) -> Option<MachineType> {
        self.detected
    }

    pub fn chip_info(&self) -> Option<ChipInfo> {
        self.chip_info
    }

    pub fn board(&self) -> &BoardState {
        &self.board
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn transport(&self) -> &T {
        self.exchange.transport()
    }

    /// Open the link, quiet the board and verify its chip ID.
    ///
    /// A board that does not answer with the expected ID is sent the
    /// initialization patterns and verified again, up to the configured
    /// number of attempts.
    #[instrument(level = "info", skip(self))]
    pub fn open(&mut self) -> Result<()> {
        let result = self.bring_up();
        self.track(result)
    }

    fn bring_up(&mut self) -> Result<()> {
        self.exchange.transport_mut().open()?;

        // A board left running by an earlier session may still be sending
        // events.
        let dmd = DmdConfig {
            auto_inc_buffer_wr_ptr: false,
            enable_frame_events: false,
            ..self.board.dmd_config
        };
        self.board.dmd_config = dmd;
        self.exchange.prepare_write(&dmd_config_burst(&dmd))?;
        let switches = SwitchConfig {
            host_events_enable: false,
            ..SwitchConfig::default()
        };
        self.board.switch_config = switches;
        self.exchange.prepare_write(&switch_config_burst(&switches))?;
        self.exchange.flush_write()?;
        self.exchange.flush_read_buffer()?;

        let config = *self.exchange.config();
        let mut retries = 0;
        loop {
            match self.verify_chip_id() {
                Ok(chip) => {
                    info!(
                        chip_id = %format!("0x{:08X}", chip.chip_id),
                        version = %format!("{}.{}", chip.version, chip.revision),
                        detected = ?self.detected,
                        "Board verified"
                    );
                    self.chip_info = Some(chip);
                    return Ok(());
                }
                Err(e) if retries < config.verify_attempts => {
                    retries += 1;
                    warn!(error = %e, retries, "Chip ID verification failed; reinitializing");
                    self.exchange.flush_read_buffer()?;
                    thread::sleep(config.reinit_delay());
                    self.exchange.write_words(&[INIT_PATTERN_A])?;
                    self.exchange.write_words(&[INIT_PATTERN_B])?;
                }
                Err(e) => {
                    error!(error = %e, "Board could not be initialized");
                    return Err(e);
                }
            }
        }
    }

    /// Read the identity block straight from the byte buffer.
    fn verify_chip_id(&mut self) -> Result<ChipInfo> {
        self.exchange
            .request_read(MODULE_MANAGER, REG_CHIP_ID_ADDR, CHIP_ID_WORDS)?;

        let frame_words = CHIP_ID_WORDS + 1;
        let config = *self.exchange.config();
        let mut polls = 0;
        while self.exchange.buffered_bytes() < frame_words * 4 && polls < config.max_polls {
            polls += 1;
            thread::sleep(config.poll_delay());
            self.exchange.collect()?;
        }

        let Some(words) = self.exchange.take_raw_words(frame_words) else {
            return Err(PinprocError::ReplyTimeout {
                expected: frame_words,
                received: self.exchange.buffered_bytes() / 4,
                polls,
            });
        };
        if words[1] != CHIP_ID {
            debug!(?words, "Unexpected identity block");
            return Err(PinprocError::ChipIdMismatch { read: words[1] });
        }

        self.detected = Some(if words[4] & STERN_DETECT_MASK != 0 {
            MachineType::SternWhitestar
        } else {
            MachineType::Wpc
        });
        Ok(ChipInfo {
            chip_id: words[1],
            version: (words[2] >> 16) as u16,
            revision: (words[2] & 0xFFFF) as u16,
            watchdog: words[3],
            dipswitches: words[4],
        })
    }

    pub fn close(&mut self) {
        self.exchange.transport_mut().close();
    }

    /// Drop buffered traffic and rebuild drivers, groups and rules.
    ///
    /// `UpdateDevice` also pushes the defaults and an inert rule for every
    /// transition of every physical switch, then flushes.
    #[instrument(level = "info", skip(self))]
    pub fn reset(&mut self, mode: ResetMode) -> Result<()> {
        let result = self.apply_reset(mode);
        self.track(result)
    }

    fn apply_reset(&mut self, mode: ResetMode) -> Result<()> {
        self.exchange.reset();

        if self.machine_type != MachineType::Custom {
            let sink = match mode {
                ResetMode::UpdateDevice => Some(&mut self.exchange),
                ResetMode::LocalOnly => None,
            };
            self.board.load_defaults(self.machine_type, sink)?;
        }

        self.rules.reset(self.board.global().global_polarity);
        if mode == ResetMode::UpdateDevice {
            let inert = SwitchRule::default();
            for switch_num in 0..=SWITCH_PHYSICAL_LAST {
                for event_type in EventType::SWITCH_TRANSITIONS {
                    self.rules
                        .update_rule(switch_num, event_type, &inert, &[], &mut self.exchange)?;
                }
            }
            self.exchange.flush_write()?;
        }
        Ok(())
    }

    pub fn driver_state(&self, driver_num: u16) -> Result<DriverState> {
        self.board.driver(driver_num)
    }

    pub fn update_driver_state(&mut self, state: &DriverState) -> Result<()> {
        let result = self
            .board
            .update_driver(self.machine_type, state, &mut self.exchange);
        self.track(result)
    }

    pub fn driver_group(&self, group_num: u8) -> Result<DriverGroupConfig> {
        self.board.group(group_num)
    }

    pub fn update_driver_group(&mut self, group: &DriverGroupConfig) -> Result<()> {
        let result = self.board.update_group(group, &mut self.exchange);
        self.track(result)
    }

    pub fn driver_global(&self) -> DriverGlobalConfig {
        self.board.global()
    }

    pub fn update_driver_global(&mut self, global: &DriverGlobalConfig) -> Result<()> {
        let result = self.board.update_global(global, &mut self.exchange);
        self.track(result)
    }

    pub fn tickle_watchdog(&mut self) -> Result<()> {
        let result = self.board.tickle_watchdog(&mut self.exchange);
        self.track(result)
    }

    pub fn switch_config(&self) -> SwitchConfig {
        self.board.switch_config
    }

    pub fn update_switch_config(&mut self, config: &SwitchConfig) -> Result<()> {
        debug!(host_events = config.host_events_enable, "Configuring switch logic");
        self.board.switch_config = *config;
        let result = self.exchange.prepare_write(&switch_config_burst(config));
        self.track(result)
    }

    /// Replace the reactions to one switch transition.
    pub fn update_switch_rule(
        &mut self,
        switch_num: u8,
        event_type: EventType,
        rule: &SwitchRule,
        reactions: &[DriverState],
    ) -> Result<()> {
        let result =
            self.rules
                .update_rule(switch_num, event_type, rule, reactions, &mut self.exchange);
        self.track(result)
    }

    /// Current state of the first `num_switches` switches.
    #[instrument(level = "debug", skip(self))]
    pub fn switch_states(&mut self, num_switches: usize) -> Result<Vec<EventType>> {
        let result = self.read_switch_states(num_switches);
        self.track(result)
    }

    fn read_switch_states(&mut self, num_switches: usize) -> Result<Vec<EventType>> {
        check_range("Switch count", num_switches, SWITCH_COUNT)?;
        let num_words = num_switches.div_ceil(32);

        // One state word and one debounce word per 32 switches, each
        // answered with an address echo.
        for i in 0..num_words as u32 {
            self.exchange
                .request_read(MODULE_SWITCH_CTRL, SWITCH_CTRL_STATE_BASE_ADDR + i, 1)?;
            self.exchange
                .request_read(MODULE_SWITCH_CTRL, SWITCH_CTRL_DEBOUNCE_BASE_ADDR + i, 1)?;
        }
        self.exchange.await_solicited(4 * num_words)?;

        let replies = self.exchange.take_solicited(4 * num_words);
        let mut states = Vec::with_capacity(num_switches);
        for frame in replies.chunks_exact(4) {
            let (state_word, debounce_word) = (frame[1], frame[3]);
            for bit in 0..32 {
                if states.len() == num_switches {
                    break;
                }
                let open = (state_word >> bit) & 1 == 1;
                let debounced = (debounce_word >> bit) & 1 == 1;
                states.push(EventType::from_switch_bits(open, debounced));
            }
        }
        Ok(states)
    }

    pub fn dmd_config(&self) -> DmdConfig {
        self.board.dmd_config
    }

    pub fn update_dmd_config(&mut self, config: &DmdConfig) -> Result<()> {
        debug!(
            rows = config.num_rows,
            columns = config.num_columns,
            "Configuring DMD"
        );
        self.board.dmd_config = *config;
        let result = self.exchange.prepare_write(&dmd_config_burst(config));
        self.track(result)
    }

    /// Queue one full frame of packed dots for the display.
    pub fn dmd_draw(&mut self, dots: &[u8]) -> Result<()> {
        let result = self.queue_frame(dots);
        self.track(result)
    }

    fn queue_frame(&mut self, dots: &[u8]) -> Result<()> {
        let num_words = self.board.dmd_config.words_per_frame();
        if dots.len() < num_words * 4 {
            return Err(PinprocError::FrameTooShort {
                provided: dots.len(),
                needed: num_words * 4,
            });
        }
        let mut burst = Vec::with_capacity(num_words + 1);
        burst.push(burst_command(MODULE_DMD, DMD_DOT_TABLE_BASE_ADDR, num_words));
        burst.extend(dots_to_words(dots, num_words));
        self.exchange.prepare_write(&burst)
    }

    pub fn jtag_drive_outputs(&mut self, outputs: &JtagOutputs, toggle_clk: bool) -> Result<()> {
        let result = self
            .exchange
            .write_words(&jtag_outputs_burst(outputs, toggle_clk));
        self.track(result)
    }

    pub fn jtag_write_tdo_memory(&mut self, offset: u16, data: &[u32]) -> Result<()> {
        let result = check_range("JTAG memory words", data.len(), JTAG_MAX_MEMORY_WORDS)
            .and_then(|()| {
                let address = JTAG_TDO_MEMORY_BASE_ADDR + offset as u32;
                self.write_burst(MODULE_JTAG, address, data)
            });
        self.track(result)
    }

    pub fn jtag_shift_tdo_data(&mut self, num_bits: u16, data_block_complete: bool) -> Result<()> {
        let result = self
            .exchange
            .write_words(&jtag_shift_burst(num_bits, data_block_complete));
        self.track(result)
    }

    /// Read back captured TDI bits. A single read is bounded by what the
    /// read buffer can hold, one word short of the full memory.
    pub fn jtag_read_tdi_memory(&mut self, offset: u16, num_words: usize) -> Result<Vec<u32>> {
        let address = JTAG_TDI_MEMORY_BASE_ADDR + offset as u32;
        let result = self.exchange.read_words(MODULE_JTAG, address, num_words);
        self.track(result)
    }

    pub fn jtag_status(&mut self) -> Result<JtagStatus> {
        let result = self.exchange.read_words(MODULE_JTAG, JTAG_STATUS_ADDR, 1);
        let words = self.track(result)?;
        let status = words[0];
        Ok(JtagStatus {
            command_complete: (status >> JTAG_STATUS_DONE_SHIFT) & 1 == 1,
            tdi: (status >> JTAG_STATUS_TDI_SHIFT) & 1 == 1,
        })
    }

    /// Fill `events` with pending board events; returns how many were written.
    pub fn get_events(&mut self, events: &mut [Event]) -> Result<usize> {
        let result = self.exchange.drain_unsolicited(events.len());
        let words = self.track(result)?;
        for (event, word) in events.iter_mut().zip(&words) {
            *event = Event::decode(*word);
        }
        Ok(words.len())
    }

    /// Send everything queued by the update operations.
    pub fn flush_write(&mut self) -> Result<()> {
        let result = self.exchange.flush_write();
        self.track(result)
    }

    /// Write `data` to consecutive registers immediately.
    pub fn write_data_raw(&mut self, module: u32, address: u32, data: &[u32]) -> Result<()> {
        let result = self.write_burst(module, address, data);
        self.track(result)
    }

    fn write_burst(&mut self, module: u32, address: u32, data: &[u32]) -> Result<()> {
        check_range("Burst words", data.len(), MAX_WRITE_WORDS - 1)?;
        let mut burst = Vec::with_capacity(data.len() + 1);
        burst.push(burst_command(module, address, data.len()));
        burst.extend_from_slice(data);
        self.exchange.write_words(&burst)
    }

    pub fn read_data_raw(
        &mut self,
        module: u32,
        address: u32,
        num_words: usize,
    ) -> Result<Vec<u32>> {
        let result = self.exchange.read_words(module, address, num_words);
        self.track(result)
    }

    /// Adopt polling settings and push switch and DMD configuration.
    ///
    /// The machine type is fixed when the device is created and is not
    /// taken from `config`.
    pub fn apply_config(&mut self, config: &BoardConfig) -> Result<()> {
        if config.machine_type != self.machine_type {
            warn!(
                configured = %config.machine_type,
                active = %self.machine_type,
                "Ignoring machine type from configuration"
            );
        }
        self.exchange.set_config(config.exchange);
        self.update_switch_config(&config.switches)?;
        self.update_dmd_config(&config.dmd)?;
        self.flush_write()
    }
}

impl<T: UsbTransport> Drop for Device<T> {
    fn drop(&mut self) {
        self.exchange.transport_mut().close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::{CommandHeader, decode_command, reg_request_word};
    use crate::protocol::word::bytes_to_words;
    use crate::transport::MockTransport;

    fn fast_config() -> ExchangeConfig {
        ExchangeConfig {
            max_polls: 3,
            poll_delay_ms: 0,
            verify_attempts: 0,
            reinit_delay_ms: 0,
        }
    }

    fn open_device(
        stern: bool,
        machine_type: MachineType,
    ) -> (MockTransport, Device<MockTransport>) {
        let mock = MockTransport::with_board(stern);
        let device = Device::create(mock.clone(), machine_type, fast_config()).unwrap();
        mock.clear_writes();
        (mock, device)
    }

    /// Split written words into commands with their payloads.
    fn commands(words: &[u32]) -> Vec<(CommandHeader, Vec<u32>)> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < words.len() {
            let header = decode_command(words[i]);
            i += 1;
            let n = if header.write { header.length } else { 0 };
            out.push((header, words[i..i + n].to_vec()));
            i += n;
        }
        out
    }

    #[test]
    fn test_wpc95_on_wpc_board() {
        let (mock, device) = open_device(false, MachineType::Wpc95);
        assert_eq!(device.detected_machine_type(), Some(MachineType::Wpc));
        assert_eq!(device.machine_type(), MachineType::Wpc95);
        let chip = device.chip_info().unwrap();
        assert_eq!(chip.chip_id, CHIP_ID);
        assert_eq!((chip.version, chip.revision), (1, 0x13));
        assert!(mock.is_connected());
    }

    #[test]
    fn test_wpc95_on_sam_board() {
        let mock = MockTransport::with_board(true);
        let err = Device::create(mock.clone(), MachineType::Wpc95, fast_config())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            PinprocError::MachineTypeMismatch {
                requested: MachineType::Wpc95,
                detected: MachineType::SternWhitestar
            }
        ));
        assert!(!mock.is_connected());
    }

    #[test]
    fn test_stern_and_custom_accepted() {
        let (_, device) = open_device(true, MachineType::SternSam);
        assert_eq!(
            device.detected_machine_type(),
            Some(MachineType::SternWhitestar)
        );
        open_device(false, MachineType::Custom);
        open_device(true, MachineType::Custom);
    }

    #[test]
    fn test_sam_on_wpc_board_rejected() {
        let mock = MockTransport::with_board(false);
        assert!(Device::create(mock, MachineType::SternSam, fast_config()).is_err());
    }

    #[test]
    fn test_open_quiets_board_first() {
        let mock = MockTransport::with_board(false);
        let _device = Device::create(mock.clone(), MachineType::Wpc, fast_config()).unwrap();

        let writes = mock.get_writes();
        let first = commands(&bytes_to_words(&writes[0]));
        let (dmd_header, dmd_payload) = &first[0];
        assert_eq!(dmd_header.module, MODULE_DMD);
        assert_eq!((dmd_payload[0] >> DMD_FRAME_EVENTS_SHIFT) & 1, 0);
        let (switch_header, switch_payload) = &first[1];
        assert_eq!(switch_header.module, MODULE_SWITCH_CTRL);
        assert_eq!((switch_payload[0] >> SWITCH_CONFIG_HOST_EVENTS_SHIFT) & 1, 0);

        assert_eq!(
            bytes_to_words(&writes[1]),
            vec![reg_request_word(MODULE_MANAGER, REG_CHIP_ID_ADDR, CHIP_ID_WORDS)]
        );
    }

    #[test]
    fn test_bad_chip_id_retries_with_init_patterns() {
        let mock = MockTransport::with_board(false);
        mock.set_register(MODULE_MANAGER, REG_CHIP_ID_ADDR, 0x1234_5678);
        let config = ExchangeConfig {
            verify_attempts: 2,
            ..fast_config()
        };
        let mut device = Device::new(mock.clone(), MachineType::Wpc, config);

        let err = device.open().unwrap_err();
        assert!(matches!(err, PinprocError::ChipIdMismatch { read: 0x1234_5678 }));
        assert!(device.last_error().unwrap().contains("0x12345678"));

        let writes: Vec<Vec<u32>> = mock.get_writes().iter().map(|w| bytes_to_words(w)).collect();
        let pattern_a = writes.iter().filter(|w| **w == [INIT_PATTERN_A]).count();
        let pattern_b = writes.iter().filter(|w| **w == [INIT_PATTERN_B]).count();
        assert_eq!((pattern_a, pattern_b), (2, 2));
    }

    #[test]
    fn test_silent_board_times_out() {
        let mock = MockTransport::new();
        let err = Device::create(mock, MachineType::Custom, fast_config())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            PinprocError::ReplyTimeout {
                expected: 5,
                received: 0,
                polls: 3
            }
        ));
    }

    #[test]
    fn test_reset_pushes_defaults_and_inert_rules() {
        let (mock, mut device) = open_device(false, MachineType::Wpc);
        device.reset(ResetMode::UpdateDevice).unwrap();

        for write in mock.get_writes() {
            assert!(write.len() <= MAX_WRITE_WORDS * 4);
        }
        let commands = commands(&mock.written_words());
        let count = |module| commands.iter().filter(|(h, _)| h.module == module).count();
        assert_eq!(count(MODULE_STATE_CHANGE_PROC), 224 * 4);
        assert_eq!(count(MODULE_DRIVER_CTRL), 256 + 2 + 6 + 8);
        assert_eq!(count(MODULE_MANAGER), 2);
        assert!(commands.iter().all(|(h, _)| h.write));

        assert_eq!(device.rules().free_slots(), VIRTUAL_RULE_SLOT_COUNT);
        assert!(device.driver_global().enable_outputs);
    }

    #[test]
    fn test_local_reset_writes_nothing() {
        let (mock, mut device) = open_device(true, MachineType::SternSam);
        device
            .update_switch_rule(
                3,
                EventType::SwitchClosedDebounced,
                &SwitchRule { notify_host: true },
                &[DriverState::default().pulsed(10), DriverState::default().pulsed(10)],
            )
            .unwrap();
        assert_eq!(device.rules().free_slots(), VIRTUAL_RULE_SLOT_COUNT - 1);

        device.reset(ResetMode::LocalOnly).unwrap();
        assert!(mock.get_writes().is_empty());
        assert_eq!(device.rules().free_slots(), VIRTUAL_RULE_SLOT_COUNT);
        assert!(device.rules().rule_slot(0x203).unwrap().driver.polarity);
    }

    #[test]
    fn test_get_events_fills_caller_buffer() {
        let (mock, mut device) = open_device(false, MachineType::Wpc);
        let events = [
            Event {
                event_type: EventType::SwitchClosedNondebounced,
                value: 12,
            },
            Event {
                event_type: EventType::SwitchOpenDebounced,
                value: 13,
            },
            Event {
                event_type: EventType::DmdFrameDisplayed,
                value: 2,
            },
        ];
        for event in events {
            mock.queue_event(event);
        }

        let mut buffer = [Event::default(); 2];
        assert_eq!(device.get_events(&mut buffer).unwrap(), 2);
        assert_eq!(buffer, [events[0], events[1]]);
        assert_eq!(device.get_events(&mut buffer).unwrap(), 1);
        assert_eq!(buffer[0], events[2]);
        assert_eq!(device.get_events(&mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_switch_states() {
        let (mock, mut device) = open_device(false, MachineType::Wpc);
        mock.set_register(MODULE_SWITCH_CTRL, SWITCH_CTRL_STATE_BASE_ADDR, 0b1001);
        mock.set_register(MODULE_SWITCH_CTRL, SWITCH_CTRL_DEBOUNCE_BASE_ADDR, 0b1010);
        mock.set_register(MODULE_SWITCH_CTRL, SWITCH_CTRL_STATE_BASE_ADDR + 1, 1 << 8);

        let states = device.switch_states(48).unwrap();
        assert_eq!(states.len(), 48);
        assert_eq!(states[0], EventType::SwitchOpenNondebounced);
        assert_eq!(states[1], EventType::SwitchClosedDebounced);
        assert_eq!(states[2], EventType::SwitchClosedNondebounced);
        assert_eq!(states[3], EventType::SwitchOpenDebounced);
        assert_eq!(states[40], EventType::SwitchOpenNondebounced);

        assert!(device.switch_states(257).is_err());
    }

    #[test]
    fn test_policy_failure_sets_last_error() {
        let (mock, mut device) = open_device(false, MachineType::Wpc);
        assert!(device.last_error().is_none());

        let held = DriverState {
            driver_num: 42,
            state: true,
            ..Default::default()
        };
        assert!(device.update_driver_state(&held).is_err());
        assert!(device.last_error().unwrap().contains("high-current"));

        device.update_driver_state(&held.pulsed(25)).unwrap();
        device.flush_write().unwrap();
        assert_eq!(mock.get_writes().len(), 1);
        assert_eq!(device.driver_state(42).unwrap().output_drive_time, 25);
    }

    #[test]
    fn test_dmd_draw() {
        let (mock, mut device) = open_device(false, MachineType::Wpc);

        let err = device.dmd_draw(&[0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            PinprocError::FrameTooShort {
                provided: 16,
                needed: 2048
            }
        ));

        let mut dots = vec![0u8; 2048];
        dots[0] = 1;
        device.dmd_draw(&dots).unwrap();
        device.flush_write().unwrap();
        let words = mock.written_words();
        assert_eq!(words[0], burst_command(MODULE_DMD, DMD_DOT_TABLE_BASE_ADDR, 512));
        assert_eq!(words[1], 1);
        assert_eq!(words.len(), 513);
    }

    #[test]
    fn test_jtag_operations() {
        let (mock, mut device) = open_device(false, MachineType::Custom);
        mock.set_register(MODULE_JTAG, JTAG_STATUS_ADDR, 1 << JTAG_STATUS_DONE_SHIFT);
        mock.set_register(MODULE_JTAG, JTAG_TDI_MEMORY_BASE_ADDR + 2, 0xAB);
        mock.set_register(MODULE_JTAG, JTAG_TDI_MEMORY_BASE_ADDR + 3, 0xCD);

        let status = device.jtag_status().unwrap();
        assert!(status.command_complete);
        assert!(!status.tdi);

        assert_eq!(device.jtag_read_tdi_memory(2, 2).unwrap(), vec![0xAB, 0xCD]);

        mock.clear_writes();
        device.jtag_write_tdo_memory(4, &[7, 8, 9]).unwrap();
        device.jtag_shift_tdo_data(96, true).unwrap();
        // JTAG traffic is not coalesced.
        assert_eq!(mock.get_writes().len(), 2);
        assert_eq!(
            mock.written_words()[..4],
            [
                burst_command(MODULE_JTAG, JTAG_TDO_MEMORY_BASE_ADDR + 4, 3),
                7,
                8,
                9
            ]
        );

        assert!(device.jtag_write_tdo_memory(0, &[0; 513]).is_err());
    }

    #[test]
    fn test_jtag_read_bounded_by_read_buffer() {
        let (mock, mut device) = open_device(false, MachineType::Custom);
        mock.set_register(MODULE_JTAG, JTAG_TDI_MEMORY_BASE_ADDR + 510, 0x77);
        mock.set_register(MODULE_JTAG, JTAG_STATUS_ADDR, 1 << JTAG_STATUS_TDI_SHIFT);

        let words = device.jtag_read_tdi_memory(0, 511).unwrap();
        assert_eq!(words.len(), 511);
        assert_eq!(words[510], 0x77);

        let err = device.jtag_read_tdi_memory(0, 512).unwrap_err();
        assert!(matches!(err, PinprocError::OutOfRange { value: 512, .. }));
        assert!(device.last_error().unwrap().contains("512"));

        // Nothing was requested, so the next read lines up.
        assert!(device.jtag_status().unwrap().tdi);
    }

    #[test]
    fn test_raw_register_access() {
        let (mock, mut device) = open_device(false, MachineType::Custom);
        device
            .write_data_raw(MODULE_DRIVER_CTRL, 0x10, &[1, 2])
            .unwrap();
        assert_eq!(
            mock.written_words(),
            vec![burst_command(MODULE_DRIVER_CTRL, 0x10, 2), 1, 2]
        );

        let words = device
            .read_data_raw(MODULE_MANAGER, REG_VERSION_ADDR, 1)
            .unwrap();
        assert_eq!(words, vec![crate::transport::mock::MOCK_VERSION]);
    }

    #[test]
    fn test_apply_config() {
        let (mock, mut device) = open_device(false, MachineType::Wpc);
        let mut config = BoardConfig::default();
        config.switches.host_events_enable = true;
        config.dmd.enable_frame_events = true;
        config.exchange.max_polls = 7;

        device.apply_config(&config).unwrap();
        assert!(device.switch_config().host_events_enable);
        assert!(device.dmd_config().enable_frame_events);

        let written = commands(&mock.written_words());
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].0.module, MODULE_SWITCH_CTRL);
        assert_eq!((written[0].1[0] >> SWITCH_CONFIG_HOST_EVENTS_SHIFT) & 1, 1);
    }
}
