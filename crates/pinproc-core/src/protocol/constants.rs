// Board geometry
pub const DRIVER_COUNT: usize = 256;
pub const DRIVER_GROUP_COUNT: usize = 26;
pub const SWITCH_COUNT: usize = 256;
pub const SWITCH_PHYSICAL_LAST: u8 = 223;
pub const SWITCH_VIRTUAL_FIRST: u8 = 224;
pub const SWITCH_RULE_COUNT: usize = 0x400;
/// Rule slots owned by virtual switches (32 switches x 4 event types).
pub const VIRTUAL_RULE_SLOT_COUNT: usize = 128;

// Transfer limits
pub const MAX_WRITE_WORDS: usize = 1536;
pub const READ_BUFFER_SIZE: usize = 2048;
/// Largest read whose reply, echo included, fits the read buffer.
pub const MAX_READ_WORDS: usize = READ_BUFFER_SIZE / 4 - 1;
pub const DEFAULT_MAX_POLLS: u32 = 10;
pub const DEFAULT_POLL_DELAY_MS: u64 = 10;
pub const CHIP_ID_VERIFY_ATTEMPTS: u32 = 50;
pub const CHIP_ID_REINIT_DELAY_MS: u64 = 100;

// Chip identity
pub const CHIP_ID: u32 = 0xFEEDBEEF;
pub const INIT_PATTERN_A: u32 = 0x801F1122;
pub const INIT_PATTERN_B: u32 = 0x345678AB;
pub const STERN_DETECT_MASK: u32 = 0x0000_0100;

// Command / reply header
pub const COMMAND_SHIFT: u32 = 31;
pub const COMMAND_MASK: u32 = 0x8000_0000;
pub const HEADER_LENGTH_SHIFT: u32 = 20;
pub const HEADER_LENGTH_MASK: u32 = 0x7FF0_0000;
pub const MODULE_SELECT_SHIFT: u32 = 16;
pub const MODULE_SELECT_MASK: u32 = 0x000F_0000;
pub const REG_ADDR_MASK: u32 = 0x0000_FFFF;
pub const REPLY_ADDR_MASK: u32 = 0x000F_FFFF;

pub const CMD_READ: u32 = 0;
pub const CMD_WRITE: u32 = 1;
pub const REPLY_REQUESTED: u32 = 0;
pub const REPLY_UNREQUESTED: u32 = 1;

// Module selects
pub const MODULE_MANAGER: u32 = 0;
pub const MODULE_JTAG: u32 = 1;
pub const MODULE_SWITCH_CTRL: u32 = 2;
pub const MODULE_DRIVER_CTRL: u32 = 3;
pub const MODULE_STATE_CHANGE_PROC: u32 = 4;
pub const MODULE_DMD: u32 = 5;

// Manager registers
pub const REG_CHIP_ID_ADDR: u32 = 0;
pub const REG_VERSION_ADDR: u32 = 1;
pub const REG_WATCHDOG_ADDR: u32 = 2;
pub const REG_DIPSWITCH_ADDR: u32 = 3;
pub const CHIP_ID_WORDS: usize = 4;

pub const WATCHDOG_EXPIRED_SHIFT: u32 = 30;
pub const WATCHDOG_ENABLE_SHIFT: u32 = 14;
pub const WATCHDOG_RESET_TIME_MASK: u32 = 0x3FFF;

// Driver controller address decode
pub const DRIVER_CTRL_DECODE_SHIFT: u32 = 10;
pub const DRIVER_GLOBAL_DECODE: u32 = 0;
pub const DRIVER_GROUP_TABLE_DECODE: u32 = 1;
pub const DRIVER_CONFIG_TABLE_DECODE: u32 = 2;

// Driver state words
pub const DRIVER_OUTPUT_DRIVE_TIME_SHIFT: u32 = 0;
pub const DRIVER_PATTER_ON_SHIFT: u32 = 8;
pub const DRIVER_PATTER_OFF_SHIFT: u32 = 15;
pub const DRIVER_PATTER_TIME_MASK: u32 = 0x7F;
pub const DRIVER_PATTER_ENABLE_SHIFT: u32 = 22;
pub const DRIVER_FUTURE_ENABLE_SHIFT: u32 = 23;
pub const DRIVER_WAIT_FIRST_SLOT_SHIFT: u32 = 24;
pub const DRIVER_STATE_SHIFT: u32 = 25;
pub const DRIVER_POLARITY_SHIFT: u32 = 26;

// Driver group word
pub const GROUP_SLOW_TIME_SHIFT: u32 = 0;
pub const GROUP_SLOW_TIME_MASK: u32 = 0xFFF;
pub const GROUP_ENABLE_INDEX_SHIFT: u32 = 12;
pub const GROUP_ROW_ACTIVATE_SHIFT: u32 = 16;
pub const GROUP_ROW_ENABLE_SELECT_SHIFT: u32 = 19;
pub const GROUP_MATRIXED_SHIFT: u32 = 21;
pub const GROUP_POLARITY_SHIFT: u32 = 22;
pub const GROUP_ACTIVE_SHIFT: u32 = 23;
pub const GROUP_DISABLE_STROBE_AFTER_SHIFT: u32 = 24;

// Driver global word
pub const GLOBAL_ENABLE_OUTPUTS_SHIFT: u32 = 31;
pub const GLOBAL_POLARITY_SHIFT: u32 = 30;
pub const GLOBAL_USE_CLEAR_SHIFT: u32 = 28;
pub const GLOBAL_STROBE_START_SELECT_SHIFT: u32 = 27;
pub const GLOBAL_START_STROBE_TIME_SHIFT: u32 = 20;
pub const GLOBAL_ROW_ENABLE_INDEX1_SHIFT: u32 = 16;
pub const GLOBAL_ROW_ENABLE_INDEX0_SHIFT: u32 = 12;
pub const GLOBAL_ACTIVE_LOW_ROWS_SHIFT: u32 = 11;
pub const GLOBAL_TICKLE_STERN_WATCHDOG_SHIFT: u32 = 10;
pub const GLOBAL_ENCODE_ENABLES_SHIFT: u32 = 9;

// Switch controller
pub const SWITCH_CTRL_CONFIG_ADDR: u32 = 0;
pub const SWITCH_CTRL_STATE_BASE_ADDR: u32 = 4;
pub const SWITCH_CTRL_DEBOUNCE_BASE_ADDR: u32 = 11;

pub const SWITCH_CONFIG_CLEAR_SHIFT: u32 = 31;
pub const SWITCH_CONFIG_USE_COLUMN_9_SHIFT: u32 = 30;
pub const SWITCH_CONFIG_USE_COLUMN_8_SHIFT: u32 = 29;
pub const SWITCH_CONFIG_HOST_EVENTS_SHIFT: u32 = 28;
pub const SWITCH_CONFIG_PULSES_BEFORE_RX_SHIFT: u32 = 0;
pub const SWITCH_CONFIG_INACTIVE_PULSES_SHIFT: u32 = 8;
pub const SWITCH_CONFIG_PULSES_PER_BURST_SHIFT: u32 = 16;
pub const SWITCH_CONFIG_HALF_PERIOD_SHIFT: u32 = 24;

// Switch rules (state change processor)
pub const SWITCH_RULE_NUM_STATE_SHIFT: u32 = 8;
pub const SWITCH_RULE_NUM_DEBOUNCE_SHIFT: u32 = 9;
pub const SWITCH_RULE_ADDR_SHIFT: u32 = 2;
pub const SWITCH_RULE_LINK_INDEX_MASK: u32 = 0x3FF;
pub const SWITCH_RULE_LINK_ACTIVE_SHIFT: u32 = 10;
pub const SWITCH_RULE_CHANGE_OUTPUT_SHIFT: u32 = 11;
pub const SWITCH_RULE_NOTIFY_HOST_SHIFT: u32 = 12;
pub const SWITCH_RULE_DRIVER_NUM_SHIFT: u32 = 16;
pub const SWITCH_RULE_BURST_WORDS: usize = 4;

// Unsolicited events
pub const EVENT_SWITCH_NUM_MASK: u32 = 0xFF;
pub const EVENT_SWITCH_STATE_SHIFT: u32 = 8;
pub const EVENT_SWITCH_DEBOUNCED_SHIFT: u32 = 9;
pub const EVENT_TYPE_SHIFT: u32 = 10;
pub const EVENT_TYPE_MASK: u32 = 0xC00;
pub const EVENT_TYPE_SWITCH: u32 = 0;
pub const EVENT_TYPE_DMD: u32 = 1;

// DMD
pub const DMD_CONFIG_ADDR: u32 = 0;
pub const DMD_DOT_TABLE_BASE_ADDR: u32 = 0x1000;
pub const DMD_SUB_FRAME_TIMINGS: usize = 4;

pub const DMD_COLUMNS_SHIFT: u32 = 0;
pub const DMD_ROWS_SHIFT: u32 = 11;
pub const DMD_SUB_FRAMES_SHIFT: u32 = 19;
pub const DMD_FRAME_BUFFERS_SHIFT: u32 = 23;
pub const DMD_AUTO_INC_SHIFT: u32 = 27;
pub const DMD_FRAME_EVENTS_SHIFT: u32 = 28;
pub const DMD_ENABLE_SHIFT: u32 = 29;

// JTAG
pub const JTAG_CMD_ADDR: u32 = 0;
pub const JTAG_STATUS_ADDR: u32 = 1;
pub const JTAG_TDO_MEMORY_BASE_ADDR: u32 = 0x400;
pub const JTAG_TDI_MEMORY_BASE_ADDR: u32 = 0x800;
pub const JTAG_MAX_MEMORY_WORDS: usize = 512;

pub const JTAG_CMD_START_SHIFT: u32 = 31;
pub const JTAG_CMD_OE_SHIFT: u32 = 30;
pub const JTAG_CMD_SHIFT: u32 = 24;
pub const JTAG_CMD_SHIFT_DATA: u32 = 1;
pub const JTAG_CMD_FORCE_OUTPUTS: u32 = 2;
pub const JTAG_CMD_LATCH_OUTPUTS: u32 = 3;
pub const JTAG_SHIFT_EXIT_SHIFT: u32 = 16;
pub const JTAG_SHIFT_NUM_BITS_MASK: u32 = 0xFFFF;
pub const JTAG_OUTPUT_MASK_SHIFT: u32 = 8;
pub const JTAG_TCK_BIT: u32 = 0;
pub const JTAG_TMS_BIT: u32 = 1;
pub const JTAG_TDO_BIT: u32 = 2;
pub const JTAG_STATUS_DONE_SHIFT: u32 = 31;
pub const JTAG_STATUS_TDI_SHIFT: u32 = 16;

// FTDI bridge
pub const FTDI_VENDOR_ID: u16 = 0x0403;
pub const FTDI_FT245_PRODUCT_ID: u16 = 0x6001;
pub const FTDI_PACKET_SIZE: usize = 64;
pub const FTDI_STATUS_BYTES: usize = 2;
pub const FTDI_DEFAULT_LATENCY_MS: u8 = 1;

pub const SIO_RESET_REQUEST: u8 = 0x00;
pub const SIO_SET_LATENCY_TIMER_REQUEST: u8 = 0x09;
pub const SIO_SET_BITMODE_REQUEST: u8 = 0x0B;
pub const SIO_RESET_SIO: u16 = 0;
pub const SIO_RESET_PURGE_RX: u16 = 1;
pub const SIO_RESET_PURGE_TX: u16 = 2;
