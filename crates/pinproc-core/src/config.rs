//! Board configuration records.
//!
//! These mirror the board's configuration tables one-to-one. `BoardConfig`
//! collects the parts an application usually keeps in a file.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::machine::MachineType;
use crate::protocol::constants::*;

/// Per-driver output state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DriverState {
    pub driver_num: u16,
    /// Pulse length in ms, or schedule cycle length in seconds.
    pub output_drive_time: u8,
    pub polarity: bool,
    pub state: bool,
    pub wait_for_first_time_slot: bool,
    /// 32-slot activation schedule.
    pub timeslots: u32,
    pub patter_on_time: u8,
    pub patter_off_time: u8,
    pub patter_enable: bool,
    pub future_enable: bool,
}

impl DriverState {
    /// Turn the output off.
    pub fn disabled(self) -> Self {
        Self {
            state: false,
            timeslots: 0,
            wait_for_first_time_slot: false,
            output_drive_time: 0,
            patter_on_time: 0,
            patter_off_time: 0,
            patter_enable: false,
            future_enable: false,
            ..self
        }
    }

    /// Drive the output for `milliseconds`.
    pub fn pulsed(self, milliseconds: u8) -> Self {
        Self {
            state: true,
            output_drive_time: milliseconds,
            ..self.disabled()
        }
    }

    /// Follow a 32-slot schedule for `cycle_seconds` (0 = forever).
    pub fn scheduled(self, schedule: u32, cycle_seconds: u8, now: bool) -> Self {
        Self {
            state: true,
            timeslots: schedule,
            wait_for_first_time_slot: !now,
            output_drive_time: cycle_seconds,
            ..self.disabled()
        }
    }

    /// Drive for `original_on_time` ms, then patter on/off indefinitely.
    pub fn pattered(self, on_time: u8, off_time: u8, original_on_time: u8) -> Self {
        Self {
            state: true,
            output_drive_time: original_on_time,
            patter_on_time: on_time,
            patter_off_time: off_time,
            patter_enable: true,
            ..self.disabled()
        }
    }

    /// Patter on/off for `duration` ms, then turn off.
    pub fn pulsed_patter(self, on_time: u8, off_time: u8, duration: u8) -> Self {
        Self {
            future_enable: true,
            ..self.pattered(on_time, off_time, duration)
        }
    }

    /// No schedule and no pulse limit, whatever `state` says.
    pub fn is_constant_on(&self) -> bool {
        self.timeslots == 0 && self.output_drive_time == 0
    }
}

/// Per-group configuration (8 consecutive drivers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DriverGroupConfig {
    pub group_num: u8,
    pub slow_time: u16,
    pub enable_index: u8,
    pub row_activate_index: u8,
    pub row_enable_select: u8,
    pub matrixed: bool,
    pub polarity: bool,
    pub active: bool,
    pub disable_strobe_after: bool,
}

/// Board-wide driver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DriverGlobalConfig {
    pub enable_outputs: bool,
    pub global_polarity: bool,
    pub use_clear: bool,
    pub strobe_start_select: bool,
    pub start_strobe_time: u8,
    pub matrix_row_enable_index1: u8,
    pub matrix_row_enable_index0: u8,
    pub active_low_matrix_rows: bool,
    pub tickle_stern_watchdog: bool,
    pub encode_enables: bool,
    pub watchdog_expired: bool,
    pub watchdog_enable: bool,
    pub watchdog_reset_time: u16,
}

/// Switch matrix scan configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    pub clear: bool,
    pub use_column_8: bool,
    pub use_column_9: bool,
    pub host_events_enable: bool,
    pub direct_matrix_scan_loop_time: u8,
    pub pulses_before_checking_rx: u8,
    pub inactive_pulses_after_burst: u8,
    pub pulses_per_burst: u8,
    pub pulse_half_period_time: u8,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            clear: false,
            use_column_8: false,
            use_column_9: false,
            host_events_enable: false,
            direct_matrix_scan_loop_time: 2,
            pulses_before_checking_rx: 10,
            inactive_pulses_after_burst: 12,
            pulses_per_burst: 6,
            pulse_half_period_time: 13,
        }
    }
}

/// Dot-matrix display geometry and timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmdConfig {
    pub num_rows: u8,
    pub num_columns: u16,
    pub num_sub_frames: u8,
    pub num_frame_buffers: u8,
    pub auto_inc_buffer_wr_ptr: bool,
    pub enable_frame_events: bool,
    pub enable: bool,
    pub rclk_low_cycles: [u8; DMD_SUB_FRAME_TIMINGS],
    pub latch_high_cycles: [u8; DMD_SUB_FRAME_TIMINGS],
    pub de_high_cycles: [u16; DMD_SUB_FRAME_TIMINGS],
    pub dotclk_half_period: [u8; DMD_SUB_FRAME_TIMINGS],
}

impl DmdConfig {
    /// Words in one complete frame (all sub-frames).
    pub fn words_per_frame(&self) -> usize {
        let words_per_sub_frame = self.num_columns as usize * self.num_rows as usize / 32;
        words_per_sub_frame * self.num_sub_frames as usize
    }
}

impl Default for DmdConfig {
    fn default() -> Self {
        Self {
            num_rows: 32,
            num_columns: 128,
            num_sub_frames: 4,
            num_frame_buffers: 3,
            auto_inc_buffer_wr_ptr: false,
            enable_frame_events: false,
            enable: true,
            rclk_low_cycles: [15; DMD_SUB_FRAME_TIMINGS],
            latch_high_cycles: [15; DMD_SUB_FRAME_TIMINGS],
            de_high_cycles: [100, 300, 600, 1200],
            dotclk_half_period: [1; DMD_SUB_FRAME_TIMINGS],
        }
    }
}

/// JTAG output pins and which of them to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JtagOutputs {
    pub tck_mask: bool,
    pub tms_mask: bool,
    pub tdo_mask: bool,
    pub tck: bool,
    pub tms: bool,
    pub tdo: bool,
}

/// JTAG engine status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JtagStatus {
    pub command_complete: bool,
    pub tdi: bool,
}

/// Host-facing part of a switch rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SwitchRule {
    /// Report the transition to the host as an event.
    pub notify_host: bool,
}

/// Reply polling and bring-up retry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub max_polls: u32,
    pub poll_delay_ms: u64,
    /// Chip ID retries after the first attempt, each preceded by the init patterns.
    pub verify_attempts: u32,
    pub reinit_delay_ms: u64,
}

impl ExchangeConfig {
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    pub fn reinit_delay(&self) -> Duration {
        Duration::from_millis(self.reinit_delay_ms)
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            max_polls: DEFAULT_MAX_POLLS,
            poll_delay_ms: DEFAULT_POLL_DELAY_MS,
            verify_attempts: CHIP_ID_VERIFY_ATTEMPTS,
            reinit_delay_ms: CHIP_ID_REINIT_DELAY_MS,
        }
    }
}

/// USB bridge selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    pub latency_ms: u8,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            vendor_id: FTDI_VENDOR_ID,
            product_id: FTDI_FT245_PRODUCT_ID,
            latency_ms: FTDI_DEFAULT_LATENCY_MS,
        }
    }
}

/// Everything needed to bring a board up, as stored on disk.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub machine_type: MachineType,
    pub exchange: ExchangeConfig,
    pub usb: UsbConfig,
    pub switches: SwitchConfig,
    pub dmd: DmdConfig,
}

impl BoardConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BoardConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_state_helpers() {
        let base = DriverState {
            driver_num: 40,
            polarity: true,
            ..Default::default()
        };

        let pulse = base.pulsed(30);
        assert!(pulse.state);
        assert_eq!(pulse.output_drive_time, 30);
        assert_eq!(pulse.driver_num, 40);
        assert!(pulse.polarity);
        assert!(!pulse.is_constant_on());

        let off = pulse.disabled();
        assert!(!off.state);
        assert!(off.is_constant_on());

        let schedule = base.scheduled(0xFF00FF00, 0, true);
        assert!(!schedule.wait_for_first_time_slot);
        assert_eq!(schedule.timeslots, 0xFF00FF00);

        let patter = base.pattered(2, 18, 0);
        assert!(patter.patter_enable);
        assert!(patter.is_constant_on());

        let held = DriverState {
            state: true,
            ..base
        };
        assert!(held.is_constant_on());
    }

    #[test]
    fn test_dmd_words_per_frame() {
        assert_eq!(DmdConfig::default().words_per_frame(), 512);
    }

    #[test]
    fn test_board_config_toml() {
        let text = r#"
            machine_type = "SternSam"

            [exchange]
            max_polls = 20

            [switches]
            host_events_enable = true
        "#;
        let config: BoardConfig = toml::from_str(text).unwrap();
        assert_eq!(config.machine_type, MachineType::SternSam);
        assert_eq!(config.exchange.max_polls, 20);
        assert_eq!(config.exchange.poll_delay_ms, DEFAULT_POLL_DELAY_MS);
        assert!(config.switches.host_events_enable);
        assert_eq!(config.switches.pulses_per_burst, 6);
        assert_eq!(config.usb.vendor_id, FTDI_VENDOR_ID);

        let rendered = toml::to_string_pretty(&config).unwrap();
        let reparsed: BoardConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(reparsed.machine_type, MachineType::SternSam);
        assert_eq!(reparsed.dmd, config.dmd);
    }
}
