//! Machine families and their driver layout profiles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::protocol::constants::DRIVER_GROUP_COUNT;

/// Machine type the board is wired into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MachineType {
    /// No profile; every table is configured by the application.
    #[default]
    Custom,
    Wpc,
    Wpc95,
    SternWhitestar,
    SternSam,
}

impl MachineType {
    pub fn is_wpc(&self) -> bool {
        matches!(self, MachineType::Wpc | MachineType::Wpc95)
    }

    pub fn is_stern(&self) -> bool {
        matches!(self, MachineType::SternWhitestar | MachineType::SternSam)
    }

    /// Built-in driver profile, `None` for `Custom`.
    pub fn profile(&self) -> Option<&'static MachineProfile> {
        match self {
            MachineType::Wpc | MachineType::Wpc95 => Some(&WPC_PROFILE),
            MachineType::SternWhitestar | MachineType::SternSam => Some(&STERN_PROFILE),
            MachineType::Custom => None,
        }
    }

    /// Whether a board reporting `detected` may be driven as `self`.
    ///
    /// `Custom` is always accepted. A WPC-family request needs a WPC board,
    /// and a non-WPC request is refused on a board that reports WPC.
    pub fn accepts(&self, detected: MachineType) -> bool {
        if *self == MachineType::Custom {
            return true;
        }
        let wpc_on_other = self.is_wpc() && !detected.is_wpc();
        let other_on_wpc = !self.is_wpc() && detected == MachineType::Wpc;
        !(wpc_on_other || other_on_wpc)
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineType::Custom => write!(f, "custom"),
            MachineType::Wpc => write!(f, "wpc"),
            MachineType::Wpc95 => write!(f, "wpc95"),
            MachineType::SternWhitestar => write!(f, "sternWhitestar"),
            MachineType::SternSam => write!(f, "sternSAM"),
        }
    }
}

impl FromStr for MachineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "custom" => Ok(MachineType::Custom),
            "wpc" => Ok(MachineType::Wpc),
            "wpc95" => Ok(MachineType::Wpc95),
            "sternwhitestar" | "whitestar" => Ok(MachineType::SternWhitestar),
            "sternsam" | "sam" => Ok(MachineType::SternSam),
            other => Err(format!("unknown machine type '{other}'")),
        }
    }
}

/// Driver layout shared by one machine family.
#[derive(Debug)]
pub struct MachineProfile {
    pub group_enable_index: [u8; DRIVER_GROUP_COUNT],
    pub group_slow_time: [u16; DRIVER_GROUP_COUNT],
    pub group_activate_index: [u8; DRIVER_GROUP_COUNT],
    pub last_coil_driver_group: usize,
    pub num_matrix_groups: usize,
    pub row_enable_index1: u8,
    pub row_enable_index0: u8,
    pub row_enable_select: u8,
    pub tickle_stern_watchdog: bool,
    pub global_polarity: bool,
    pub active_low_matrix_rows: bool,
    /// Output loop period in ms.
    pub driver_loop_time: u8,
    pub encode_enables: bool,
    pub watchdog_reset_time: u16,
    /// Drivers that must never be held constantly on.
    pub high_current_drivers: &'static [std::ops::RangeInclusive<u16>],
}

impl MachineProfile {
    /// First group of the feature lamp matrix.
    pub const FIRST_MATRIX_GROUP: usize = 10;
    /// First group wired to coils and flashers.
    pub const FIRST_COIL_GROUP: usize = 4;

    pub fn is_high_current(&self, driver_num: u16) -> bool {
        self.high_current_drivers
            .iter()
            .any(|range| range.contains(&driver_num))
    }
}

pub static WPC_PROFILE: MachineProfile = MachineProfile {
    group_enable_index: [
        0, 0, 0, 0, 0, 2, 4, 3, 1, 5, 7, 7, 7, 7, 7, 7, 7, 7, 8, 0, 0, 0, 0, 0, 0, 0,
    ],
    group_slow_time: [
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 400, 400, 400, 400, 400, 400, 400, 400, 0, 0, 0, 0, 0, 0, 0,
        0,
    ],
    group_activate_index: [
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 0, 0, 0, 0, 0, 0, 0, 0,
    ],
    last_coil_driver_group: 9,
    num_matrix_groups: 8,
    row_enable_index1: 6,
    row_enable_index0: 6,
    row_enable_select: 0,
    tickle_stern_watchdog: false,
    global_polarity: false,
    active_low_matrix_rows: true,
    driver_loop_time: 4,
    encode_enables: false,
    watchdog_reset_time: 1000,
    high_current_drivers: &[32..=32, 34..=34, 36..=36, 38..=38, 40..=47],
};

pub static STERN_PROFILE: MachineProfile = MachineProfile {
    group_enable_index: [
        0, 0, 0, 0, 1, 0, 2, 3, 0, 0, 8, 9, 8, 9, 8, 9, 8, 9, 8, 9, 8, 9, 8, 9, 8, 9,
    ],
    group_slow_time: [
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 400, 400, 400, 400, 400, 400, 400, 400, 400, 400, 400, 400,
        400, 400, 400, 400,
    ],
    group_activate_index: [
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7,
    ],
    last_coil_driver_group: 7,
    num_matrix_groups: 16,
    row_enable_index1: 6,
    row_enable_index0: 10,
    row_enable_select: 0,
    tickle_stern_watchdog: true,
    global_polarity: true,
    active_low_matrix_rows: false,
    driver_loop_time: 1,
    encode_enables: true,
    watchdog_reset_time: 1000,
    high_current_drivers: &[32..=47],
};
