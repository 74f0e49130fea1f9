//! Command encoders and reply header decoding.
//!
//! Every builder is a pure function of its inputs. Range checks on switch,
//! driver and group numbers belong to the caller; fields are masked to
//! their wire width here and nothing else.

use crate::config::{
    DmdConfig, DriverGlobalConfig, DriverGroupConfig, DriverState, JtagOutputs, SwitchConfig,
};
use crate::events::EventType;
use crate::protocol::constants::*;

/// Decoded command word (host -> board).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub write: bool,
    pub length: usize,
    pub module: u32,
    pub address: u32,
}

/// Classification of a word arriving from the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyHeader {
    /// Answer to a read request: `length` payload words follow.
    Solicited { length: usize, address: u32 },
    /// Autonomous event: one event word follows.
    Unsolicited,
}

fn command_word(command: u32, module: u32, addr: u32, num_words: usize) -> u32 {
    (command << COMMAND_SHIFT)
        | (((num_words as u32) << HEADER_LENGTH_SHIFT) & HEADER_LENGTH_MASK)
        | ((module << MODULE_SELECT_SHIFT) & MODULE_SELECT_MASK)
        | (addr & REG_ADDR_MASK)
}

/// Read request for `num_words` registers starting at `addr`.
pub fn reg_request_word(module: u32, addr: u32, num_words: usize) -> u32 {
    command_word(CMD_READ, module, addr, num_words)
}

/// Header of a burst write of `num_words` payload words.
pub fn burst_command(module: u32, addr: u32, num_words: usize) -> u32 {
    command_word(CMD_WRITE, module, addr, num_words)
}

/// Inverse of [`reg_request_word`] / [`burst_command`].
pub fn decode_command(word: u32) -> CommandHeader {
    CommandHeader {
        write: (word & COMMAND_MASK) >> COMMAND_SHIFT == CMD_WRITE,
        length: ((word & HEADER_LENGTH_MASK) >> HEADER_LENGTH_SHIFT) as usize,
        module: (word & MODULE_SELECT_MASK) >> MODULE_SELECT_SHIFT,
        address: word & REG_ADDR_MASK,
    }
}

/// Solicited reply header echoing `address`.
pub fn reply_header(address: u32, length: usize) -> u32 {
    (REPLY_REQUESTED << COMMAND_SHIFT)
        | (((length as u32) << HEADER_LENGTH_SHIFT) & HEADER_LENGTH_MASK)
        | (address & REPLY_ADDR_MASK)
}

/// Unsolicited event header.
pub fn event_header() -> u32 {
    REPLY_UNREQUESTED << COMMAND_SHIFT
}

/// Classify a word arriving from the board.
pub fn classify(word: u32) -> ReplyHeader {
    match (word & COMMAND_MASK) >> COMMAND_SHIFT {
        REPLY_REQUESTED => ReplyHeader::Solicited {
            length: ((word & HEADER_LENGTH_MASK) >> HEADER_LENGTH_SHIFT) as usize,
            address: word & REPLY_ADDR_MASK,
        },
        _ => ReplyHeader::Unsolicited,
    }
}

fn driver_addr(decode: u32, index: u32) -> u32 {
    (decode << DRIVER_CTRL_DECODE_SHIFT) | index
}

/// The two payload words describing a driver state.
pub fn driver_state_words(driver: &DriverState) -> [u32; 2] {
    let control = ((driver.output_drive_time as u32) << DRIVER_OUTPUT_DRIVE_TIME_SHIFT)
        | ((driver.patter_on_time as u32 & DRIVER_PATTER_TIME_MASK) << DRIVER_PATTER_ON_SHIFT)
        | ((driver.patter_off_time as u32 & DRIVER_PATTER_TIME_MASK) << DRIVER_PATTER_OFF_SHIFT)
        | ((driver.patter_enable as u32) << DRIVER_PATTER_ENABLE_SHIFT)
        | ((driver.future_enable as u32) << DRIVER_FUTURE_ENABLE_SHIFT)
        | ((driver.wait_for_first_time_slot as u32) << DRIVER_WAIT_FIRST_SLOT_SHIFT)
        | ((driver.state as u32) << DRIVER_STATE_SHIFT)
        | ((driver.polarity as u32) << DRIVER_POLARITY_SHIFT);
    [control, driver.timeslots]
}

pub fn driver_update_burst(driver: &DriverState) -> [u32; 3] {
    let addr = driver_addr(DRIVER_CONFIG_TABLE_DECODE, (driver.driver_num as u32) << 1);
    let [control, timeslots] = driver_state_words(driver);
    [
        burst_command(MODULE_DRIVER_CTRL, addr, 2),
        control,
        timeslots,
    ]
}

pub fn driver_group_burst(group: &DriverGroupConfig) -> [u32; 2] {
    let addr = driver_addr(DRIVER_GROUP_TABLE_DECODE, group.group_num as u32);
    let word = ((group.slow_time as u32 & GROUP_SLOW_TIME_MASK) << GROUP_SLOW_TIME_SHIFT)
        | ((group.enable_index as u32 & 0xF) << GROUP_ENABLE_INDEX_SHIFT)
        | ((group.row_activate_index as u32 & 0x7) << GROUP_ROW_ACTIVATE_SHIFT)
        | ((group.row_enable_select as u32 & 0x3) << GROUP_ROW_ENABLE_SELECT_SHIFT)
        | ((group.matrixed as u32) << GROUP_MATRIXED_SHIFT)
        | ((group.polarity as u32) << GROUP_POLARITY_SHIFT)
        | ((group.active as u32) << GROUP_ACTIVE_SHIFT)
        | ((group.disable_strobe_after as u32) << GROUP_DISABLE_STROBE_AFTER_SHIFT);
    [burst_command(MODULE_DRIVER_CTRL, addr, 1), word]
}

pub fn driver_global_burst(global: &DriverGlobalConfig) -> [u32; 2] {
    let addr = driver_addr(DRIVER_GLOBAL_DECODE, 0);
    let word = ((global.enable_outputs as u32) << GLOBAL_ENABLE_OUTPUTS_SHIFT)
        | ((global.global_polarity as u32) << GLOBAL_POLARITY_SHIFT)
        | ((global.use_clear as u32) << GLOBAL_USE_CLEAR_SHIFT)
        | ((global.strobe_start_select as u32) << GLOBAL_STROBE_START_SELECT_SHIFT)
        | ((global.start_strobe_time as u32 & 0x7F) << GLOBAL_START_STROBE_TIME_SHIFT)
        | ((global.matrix_row_enable_index1 as u32 & 0xF) << GLOBAL_ROW_ENABLE_INDEX1_SHIFT)
        | ((global.matrix_row_enable_index0 as u32 & 0xF) << GLOBAL_ROW_ENABLE_INDEX0_SHIFT)
        | ((global.active_low_matrix_rows as u32) << GLOBAL_ACTIVE_LOW_ROWS_SHIFT)
        | ((global.tickle_stern_watchdog as u32) << GLOBAL_TICKLE_STERN_WATCHDOG_SHIFT)
        | ((global.encode_enables as u32) << GLOBAL_ENCODE_ENABLES_SHIFT);
    [burst_command(MODULE_DRIVER_CTRL, addr, 1), word]
}

pub fn watchdog_burst(expired: bool, enable: bool, reset_time: u16) -> [u32; 2] {
    let word = ((expired as u32) << WATCHDOG_EXPIRED_SHIFT)
        | ((enable as u32) << WATCHDOG_ENABLE_SHIFT)
        | (reset_time as u32 & WATCHDOG_RESET_TIME_MASK);
    [burst_command(MODULE_MANAGER, REG_WATCHDOG_ADDR, 1), word]
}

pub fn switch_config_burst(config: &SwitchConfig) -> [u32; 4] {
    let flags = ((config.clear as u32) << SWITCH_CONFIG_CLEAR_SHIFT)
        | ((config.use_column_9 as u32) << SWITCH_CONFIG_USE_COLUMN_9_SHIFT)
        | ((config.use_column_8 as u32) << SWITCH_CONFIG_USE_COLUMN_8_SHIFT)
        | ((config.host_events_enable as u32) << SWITCH_CONFIG_HOST_EVENTS_SHIFT);
    let scan = config.direct_matrix_scan_loop_time as u32;
    let pulses = ((config.pulses_before_checking_rx as u32) << SWITCH_CONFIG_PULSES_BEFORE_RX_SHIFT)
        | ((config.inactive_pulses_after_burst as u32) << SWITCH_CONFIG_INACTIVE_PULSES_SHIFT)
        | ((config.pulses_per_burst as u32) << SWITCH_CONFIG_PULSES_PER_BURST_SHIFT)
        | ((config.pulse_half_period_time as u32) << SWITCH_CONFIG_HALF_PERIOD_SHIFT);
    [
        burst_command(MODULE_SWITCH_CTRL, SWITCH_CTRL_CONFIG_ADDR, 3),
        flags,
        scan,
        pulses,
    ]
}

/// Rule slot index for a (switch, transition) pair.
pub fn switch_rule_index(switch_num: u8, event_type: EventType) -> u16 {
    ((event_type.is_debounced() as u16) << SWITCH_RULE_NUM_DEBOUNCE_SHIFT)
        | ((event_type.is_open() as u16) << SWITCH_RULE_NUM_STATE_SHIFT)
        | switch_num as u16
}

/// Inverse of [`switch_rule_index`].
pub fn parse_switch_rule_index(index: u16) -> (u8, EventType) {
    let switch_num = (index & 0xFF) as u8;
    let open = (index >> SWITCH_RULE_NUM_STATE_SHIFT) & 1 == 1;
    let debounced = (index >> SWITCH_RULE_NUM_DEBOUNCE_SHIFT) & 1 == 1;
    (switch_num, EventType::from_switch_bits(open, debounced))
}

/// Fields of one rule slot as written to the state change processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleWords<'a> {
    pub index: u16,
    pub notify_host: bool,
    pub change_output: bool,
    pub link_active: bool,
    pub link_index: u16,
    pub driver: &'a DriverState,
}

pub fn switch_rule_burst(rule: &RuleWords<'_>) -> [u32; SWITCH_RULE_BURST_WORDS] {
    let addr = (rule.index as u32) << SWITCH_RULE_ADDR_SHIFT;
    let [control, timeslots] = driver_state_words(rule.driver);
    let rule_word = (rule.link_index as u32 & SWITCH_RULE_LINK_INDEX_MASK)
        | ((rule.link_active as u32) << SWITCH_RULE_LINK_ACTIVE_SHIFT)
        | ((rule.change_output as u32) << SWITCH_RULE_CHANGE_OUTPUT_SHIFT)
        | ((rule.notify_host as u32) << SWITCH_RULE_NOTIFY_HOST_SHIFT)
        | ((rule.driver.driver_num as u32 & 0xFF) << SWITCH_RULE_DRIVER_NUM_SHIFT);
    [
        burst_command(MODULE_STATE_CHANGE_PROC, addr, 3),
        control,
        timeslots,
        rule_word,
    ]
}

pub fn dmd_config_burst(config: &DmdConfig) -> [u32; 7] {
    let geometry = ((config.num_columns as u32 & 0x7FF) << DMD_COLUMNS_SHIFT)
        | ((config.num_rows as u32) << DMD_ROWS_SHIFT)
        | ((config.num_sub_frames as u32 & 0xF) << DMD_SUB_FRAMES_SHIFT)
        | ((config.num_frame_buffers as u32 & 0xF) << DMD_FRAME_BUFFERS_SHIFT)
        | ((config.auto_inc_buffer_wr_ptr as u32) << DMD_AUTO_INC_SHIFT)
        | ((config.enable_frame_events as u32) << DMD_FRAME_EVENTS_SHIFT)
        | ((config.enable as u32) << DMD_ENABLE_SHIFT);
    let pack_bytes = |b: [u8; DMD_SUB_FRAME_TIMINGS]| u32::from_le_bytes(b);
    let pack_halves = |lo: u16, hi: u16| (lo as u32) | ((hi as u32) << 16);
    let de = config.de_high_cycles;
    [
        burst_command(MODULE_DMD, DMD_CONFIG_ADDR, 6),
        geometry,
        pack_bytes(config.rclk_low_cycles),
        pack_bytes(config.latch_high_cycles),
        pack_halves(de[0], de[1]),
        pack_halves(de[2], de[3]),
        pack_bytes(config.dotclk_half_period),
    ]
}

/// Drive JTAG outputs directly, or latch them on a clock edge.
pub fn jtag_outputs_burst(outputs: &JtagOutputs, toggle_clk: bool) -> [u32; 2] {
    let command = if toggle_clk {
        JTAG_CMD_LATCH_OUTPUTS
    } else {
        JTAG_CMD_FORCE_OUTPUTS
    };
    let masks = ((outputs.tck_mask as u32) << JTAG_TCK_BIT)
        | ((outputs.tms_mask as u32) << JTAG_TMS_BIT)
        | ((outputs.tdo_mask as u32) << JTAG_TDO_BIT);
    let values = ((outputs.tck as u32) << JTAG_TCK_BIT)
        | ((outputs.tms as u32) << JTAG_TMS_BIT)
        | ((outputs.tdo as u32) << JTAG_TDO_BIT);
    let word = (1 << JTAG_CMD_START_SHIFT)
        | (1 << JTAG_CMD_OE_SHIFT)
        | (command << JTAG_CMD_SHIFT)
        | (masks << JTAG_OUTPUT_MASK_SHIFT)
        | values;
    [burst_command(MODULE_JTAG, JTAG_CMD_ADDR, 1), word]
}

/// Shift `num_bits` from TDO memory, optionally exiting the shift state.
pub fn jtag_shift_burst(num_bits: u16, data_block_complete: bool) -> [u32; 2] {
    let word = (1 << JTAG_CMD_START_SHIFT)
        | (1 << JTAG_CMD_OE_SHIFT)
        | (JTAG_CMD_SHIFT_DATA << JTAG_CMD_SHIFT)
        | ((data_block_complete as u32) << JTAG_SHIFT_EXIT_SHIFT)
        | (num_bits as u32 & JTAG_SHIFT_NUM_BITS_MASK);
    [burst_command(MODULE_JTAG, JTAG_CMD_ADDR, 1), word]
}
