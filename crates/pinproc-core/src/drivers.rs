//! Driver and board configuration engine.
//!
//! `BoardState` holds the live copy of every configuration table the host
//! has pushed to the board. Updates are stored first and then serialized
//! through a [`WordSink`].

use tracing::{debug, info, instrument, warn};

use crate::config::{DmdConfig, DriverGlobalConfig, DriverGroupConfig, DriverState, SwitchConfig};
use crate::error::{PinprocError, Result, check_range};
use crate::exchange::WordSink;
use crate::machine::{MachineProfile, MachineType};
use crate::protocol::codec::{
    driver_global_burst, driver_group_burst, driver_update_burst, watchdog_burst,
};
use crate::protocol::constants::{DRIVER_COUNT, DRIVER_GROUP_COUNT};

/// Host-side copy of the board's configuration.
#[derive(Debug, Clone)]
pub struct BoardState {
    drivers: Vec<DriverState>,
    groups: Vec<DriverGroupConfig>,
    global: DriverGlobalConfig,
    pub switch_config: SwitchConfig,
    pub dmd_config: DmdConfig,
}

fn numbered_drivers(polarity: bool) -> Vec<DriverState> {
    (0..DRIVER_COUNT as u16)
        .map(|driver_num| DriverState {
            driver_num,
            polarity,
            ..Default::default()
        })
        .collect()
}

fn numbered_groups(polarity: bool) -> Vec<DriverGroupConfig> {
    (0..DRIVER_GROUP_COUNT as u8)
        .map(|group_num| DriverGroupConfig {
            group_num,
            polarity,
            ..Default::default()
        })
        .collect()
}

fn emit<S: WordSink + ?Sized>(sink: &mut Option<&mut S>, words: &[u32]) -> Result<()> {
    match sink {
        Some(sink) => sink.prepare_write(words),
        None => Ok(()),
    }
}

impl BoardState {
    pub fn new() -> Self {
        Self {
            drivers: numbered_drivers(false),
            groups: numbered_groups(false),
            global: DriverGlobalConfig::default(),
            switch_config: SwitchConfig::default(),
            dmd_config: DmdConfig::default(),
        }
    }

    pub fn driver(&self, driver_num: u16) -> Result<DriverState> {
        check_range("Driver", driver_num as usize, DRIVER_COUNT - 1)?;
        Ok(self.drivers[driver_num as usize])
    }

    pub fn group(&self, group_num: u8) -> Result<DriverGroupConfig> {
        check_range("Driver group", group_num as usize, DRIVER_GROUP_COUNT - 1)?;
        Ok(self.groups[group_num as usize])
    }

    pub fn global(&self) -> DriverGlobalConfig {
        self.global
    }

    /// Rebuild drivers, groups and globals from the machine's profile.
    ///
    /// With a sink, every driver, both global passes (outputs disabled, then
    /// enabled) and the configured groups are pushed in that order. Without
    /// one only the local copy changes. Defaults are pushed as-is and do not
    /// pass through the driver policy checks.
    #[instrument(level = "info", skip(self, sink), fields(push = sink.is_some()))]
    pub fn load_defaults<S: WordSink + ?Sized>(
        &mut self,
        machine_type: MachineType,
        mut sink: Option<&mut S>,
    ) -> Result<()> {
        let Some(profile) = machine_type.profile() else {
            debug!("No profile for custom machine");
            return Ok(());
        };
        let polarity = profile.global_polarity;

        self.global = DriverGlobalConfig::default();
        self.drivers = numbered_drivers(polarity);
        for driver in &self.drivers {
            emit(&mut sink, &driver_update_burst(driver))?;
        }
        self.groups = numbered_groups(polarity);

        let mut global = DriverGlobalConfig {
            enable_outputs: false,
            global_polarity: polarity,
            use_clear: false,
            strobe_start_select: false,
            start_strobe_time: profile.driver_loop_time,
            matrix_row_enable_index1: profile.row_enable_index1,
            matrix_row_enable_index0: profile.row_enable_index0,
            active_low_matrix_rows: profile.active_low_matrix_rows,
            tickle_stern_watchdog: profile.tickle_stern_watchdog,
            encode_enables: profile.encode_enables,
            watchdog_expired: false,
            watchdog_enable: true,
            watchdog_reset_time: profile.watchdog_reset_time,
        };
        // Toggling enable_outputs makes the board latch the new polarity
        // before any output is driven.
        self.apply_global(&global, &mut sink)?;
        global.enable_outputs = true;
        self.apply_global(&global, &mut sink)?;

        for group_num in MachineProfile::FIRST_COIL_GROUP..=profile.last_coil_driver_group {
            let group = DriverGroupConfig {
                group_num: group_num as u8,
                slow_time: 0,
                enable_index: profile.group_enable_index[group_num],
                row_activate_index: 0,
                row_enable_select: 0,
                matrixed: false,
                polarity,
                active: true,
                disable_strobe_after: false,
            };
            self.groups[group_num] = group;
            emit(&mut sink, &driver_group_burst(&group))?;
        }

        let first = MachineProfile::FIRST_MATRIX_GROUP;
        for group_num in first..first + profile.num_matrix_groups {
            let slow_time = profile.group_slow_time[group_num];
            let group = DriverGroupConfig {
                group_num: group_num as u8,
                slow_time,
                enable_index: profile.group_enable_index[group_num],
                row_activate_index: profile.group_activate_index[group_num],
                row_enable_select: profile.row_enable_select,
                matrixed: true,
                polarity,
                active: true,
                disable_strobe_after: slow_time != 0,
            };
            self.groups[group_num] = group;
            emit(&mut sink, &driver_group_burst(&group))?;
        }

        info!(%machine_type, "Loaded machine defaults");
        Ok(())
    }

    fn apply_global<S: WordSink + ?Sized>(
        &mut self,
        global: &DriverGlobalConfig,
        sink: &mut Option<&mut S>,
    ) -> Result<()> {
        self.global = *global;
        emit(sink, &driver_global_burst(global))?;
        emit(
            sink,
            &watchdog_burst(
                global.watchdog_expired,
                global.watchdog_enable,
                global.watchdog_reset_time,
            ),
        )
    }

    /// Store and push one driver's state.
    ///
    /// Under a machine profile, constant-on is refused for high-current
    /// drivers and the polarity cannot change.
    #[instrument(level = "debug", skip(self, state, sink), fields(driver = state.driver_num))]
    pub fn update_driver<S: WordSink + ?Sized>(
        &mut self,
        machine_type: MachineType,
        state: &DriverState,
        sink: &mut S,
    ) -> Result<()> {
        let driver = state.driver_num;
        check_range("Driver", driver as usize, DRIVER_COUNT - 1)?;

        if let Some(profile) = machine_type.profile() {
            if state.is_constant_on() && profile.is_high_current(driver) {
                warn!(driver, "Refusing constant-on state for high-current driver");
                return Err(PinprocError::ConstantOnRefused { driver });
            }
            if state.polarity != self.drivers[driver as usize].polarity {
                warn!(driver, "Refusing polarity change");
                return Err(PinprocError::PolarityLocked { driver });
            }
        }

        self.drivers[driver as usize] = *state;
        sink.prepare_write(&driver_update_burst(state))
    }

    pub fn update_group<S: WordSink + ?Sized>(
        &mut self,
        group: &DriverGroupConfig,
        sink: &mut S,
    ) -> Result<()> {
        check_range("Driver group", group.group_num as usize, DRIVER_GROUP_COUNT - 1)?;
        debug!(group = group.group_num, "Installing driver group");
        self.groups[group.group_num as usize] = *group;
        sink.prepare_write(&driver_group_burst(group))
    }

    /// Store the globals and push them together with the watchdog settings.
    pub fn update_global<S: WordSink + ?Sized>(
        &mut self,
        global: &DriverGlobalConfig,
        sink: &mut S,
    ) -> Result<()> {
        debug!("Installing driver globals");
        self.apply_global(global, &mut Some(sink))
    }

    /// Re-arm the watchdog with the current settings.
    pub fn tickle_watchdog<S: WordSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        sink.prepare_write(&watchdog_burst(
            self.global.watchdog_expired,
            self.global.watchdog_enable,
            self.global.watchdog_reset_time,
        ))
    }
}

impl Default for BoardState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::RecordingSink;
    use crate::protocol::codec::decode_command;
    use crate::protocol::constants::*;

    #[test]
    fn test_wpc_defaults_pushed_in_order() {
        let mut board = BoardState::new();
        let mut sink = RecordingSink::default();
        board
            .load_defaults(MachineType::Wpc, Some(&mut sink))
            .unwrap();

        // 256 drivers, two global passes of two bursts, 6 coil and 8 matrix groups.
        assert_eq!(sink.bursts.len(), 256 + 4 + 6 + 8);
        let first_global = &sink.bursts[256];
        let second_global = &sink.bursts[258];
        assert_eq!(first_global[1] >> GLOBAL_ENABLE_OUTPUTS_SHIFT, 0);
        assert_eq!(second_global[1] >> GLOBAL_ENABLE_OUTPUTS_SHIFT, 1);
        assert_eq!(decode_command(sink.bursts[257][0]).module, MODULE_MANAGER);

        let global = board.global();
        assert!(global.enable_outputs);
        assert!(!global.global_polarity);
        assert!(global.active_low_matrix_rows);
        assert_eq!(global.start_strobe_time, 4);
        assert_eq!(global.watchdog_reset_time, 1000);

        let coil = board.group(5).unwrap();
        assert!(coil.active && !coil.matrixed);
        assert_eq!(coil.enable_index, 2);

        let matrix = board.group(11).unwrap();
        assert!(matrix.matrixed);
        assert_eq!(matrix.slow_time, 400);
        assert_eq!(matrix.row_activate_index, 1);
        assert!(matrix.disable_strobe_after);

        // WPC leaves the upper groups unused.
        assert!(!board.group(20).unwrap().active);
    }

    #[test]
    fn test_stern_defaults_local_only() {
        let mut board = BoardState::new();
        board
            .load_defaults::<RecordingSink>(MachineType::SternSam, None)
            .unwrap();

        assert!(board.driver(40).unwrap().polarity);
        let global = board.global();
        assert!(global.global_polarity);
        assert!(global.encode_enables);
        assert!(global.tickle_stern_watchdog);
        assert_eq!(global.matrix_row_enable_index0, 10);

        let last = board.group(25).unwrap();
        assert!(last.matrixed);
        assert_eq!(last.row_activate_index, 7);
        assert_eq!(last.enable_index, 9);
        assert!(!board.group(8).unwrap().active);
    }

    #[test]
    fn test_custom_defaults_untouched() {
        let mut board = BoardState::new();
        let mut sink = RecordingSink::default();
        board
            .load_defaults(MachineType::Custom, Some(&mut sink))
            .unwrap();
        assert!(sink.bursts.is_empty());
        assert!(!board.global().enable_outputs);
    }

    #[test]
    fn test_constant_on_gate() {
        let held = DriverState {
            driver_num: 40,
            state: true,
            ..Default::default()
        };

        let mut board = BoardState::new();
        board
            .load_defaults::<RecordingSink>(MachineType::Wpc, None)
            .unwrap();
        let mut sink = RecordingSink::default();
        let err = board
            .update_driver(MachineType::Wpc, &held, &mut sink)
            .unwrap_err();
        assert!(matches!(err, PinprocError::ConstantOnRefused { driver: 40 }));
        assert!(sink.bursts.is_empty());
        assert!(!board.driver(40).unwrap().state);

        // 33 is a low-current driver on WPC.
        let low = DriverState {
            driver_num: 33,
            ..held
        };
        board.update_driver(MachineType::Wpc, &low, &mut sink).unwrap();

        // Pulses and schedules are always allowed.
        board
            .update_driver(MachineType::Wpc, &held.pulsed(30), &mut sink)
            .unwrap();

        let mut custom = BoardState::new();
        custom
            .update_driver(MachineType::Custom, &held, &mut sink)
            .unwrap();
        assert!(custom.driver(40).unwrap().state);
        assert_eq!(sink.bursts.len(), 3);
    }

    #[test]
    fn test_constant_on_gate_ignores_state() {
        let mut board = BoardState::new();
        board
            .load_defaults::<RecordingSink>(MachineType::Wpc, None)
            .unwrap();
        let mut sink = RecordingSink::default();

        // No schedule and no pulse time is refused whether or not the
        // output is switched on.
        let idle = DriverState {
            driver_num: 40,
            state: false,
            timeslots: 0,
            output_drive_time: 0,
            ..Default::default()
        };
        let err = board
            .update_driver(MachineType::Wpc, &idle, &mut sink)
            .unwrap_err();
        assert!(matches!(err, PinprocError::ConstantOnRefused { driver: 40 }));
        assert!(
            board
                .update_driver(MachineType::Wpc, &idle.disabled(), &mut sink)
                .is_err()
        );

        let scheduled = idle.scheduled(0x0F0F_0F0F, 0, true);
        board
            .update_driver(MachineType::Wpc, &scheduled, &mut sink)
            .unwrap();
        assert_eq!(sink.bursts.len(), 1);

        board
            .update_driver(MachineType::Custom, &idle, &mut sink)
            .unwrap();
    }

    #[test]
    fn test_stern_high_current_range() {
        let mut board = BoardState::new();
        board
            .load_defaults::<RecordingSink>(MachineType::SternWhitestar, None)
            .unwrap();
        let mut sink = RecordingSink::default();
        let held = DriverState {
            driver_num: 33,
            polarity: true,
            state: true,
            ..Default::default()
        };
        assert!(
            board
                .update_driver(MachineType::SternWhitestar, &held, &mut sink)
                .is_err()
        );
    }

    #[test]
    fn test_polarity_locked() {
        let mut board = BoardState::new();
        board
            .load_defaults::<RecordingSink>(MachineType::Wpc95, None)
            .unwrap();
        let mut sink = RecordingSink::default();
        let flipped = DriverState {
            driver_num: 60,
            polarity: true,
            ..Default::default()
        };
        let err = board
            .update_driver(MachineType::Wpc95, &flipped, &mut sink)
            .unwrap_err();
        assert!(matches!(err, PinprocError::PolarityLocked { driver: 60 }));

        let mut custom = BoardState::new();
        custom
            .update_driver(MachineType::Custom, &flipped, &mut sink)
            .unwrap();
        assert!(custom.driver(60).unwrap().polarity);
    }

    #[test]
    fn test_range_checks() {
        let mut board = BoardState::new();
        let mut sink = RecordingSink::default();
        let state = DriverState {
            driver_num: 256,
            ..Default::default()
        };
        assert!(matches!(
            board.update_driver(MachineType::Custom, &state, &mut sink),
            Err(PinprocError::OutOfRange { value: 256, .. })
        ));
        let group = DriverGroupConfig {
            group_num: 26,
            ..Default::default()
        };
        assert!(board.update_group(&group, &mut sink).is_err());
        assert!(board.group(26).is_err());
        assert!(sink.bursts.is_empty());
    }

    #[test]
    fn test_global_and_watchdog() {
        let mut board = BoardState::new();
        let mut sink = RecordingSink::default();
        let global = DriverGlobalConfig {
            enable_outputs: true,
            watchdog_enable: true,
            watchdog_reset_time: 250,
            ..Default::default()
        };
        board.update_global(&global, &mut sink).unwrap();
        assert_eq!(sink.words().len(), 4);
        assert_eq!(board.global(), global);

        board.tickle_watchdog(&mut sink).unwrap();
        let tickle = sink.bursts.last().unwrap();
        let header = decode_command(tickle[0]);
        assert_eq!(header.module, MODULE_MANAGER);
        assert_eq!(header.address, REG_WATCHDOG_ADDR);
        assert_eq!(tickle[1] & WATCHDOG_RESET_TIME_MASK, 250);
        assert_eq!((tickle[1] >> WATCHDOG_ENABLE_SHIFT) & 1, 1);
    }
}
