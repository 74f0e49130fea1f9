//! Switch rule engine.
//!
//! Every (switch, transition) pair owns one fixed slot in a 1024-entry
//! arena. Chains of more than one driver reaction borrow the slots that
//! belong to the virtual switches (224-255); those 128 slots are handed out
//! from a free pool and returned when a chain is replaced.

use std::collections::VecDeque;

use tracing::{debug, error, instrument, warn};

use crate::config::{DriverState, SwitchRule};
use crate::error::{PinprocError, Result, check_range};
use crate::events::EventType;
use crate::exchange::WordSink;
use crate::protocol::codec::{
    RuleWords, parse_switch_rule_index, switch_rule_burst, switch_rule_index,
};
use crate::protocol::constants::*;

/// One entry of the state change processor's rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuleSlot {
    pub switch_num: u8,
    pub event_type: EventType,
    pub notify_host: bool,
    pub change_output: bool,
    pub driver: DriverState,
    pub link_active: bool,
    pub link_index: u16,
}

impl RuleSlot {
    fn inert(index: u16, polarity: bool) -> Self {
        let (switch_num, event_type) = parse_switch_rule_index(index);
        Self {
            switch_num,
            event_type,
            driver: DriverState {
                polarity,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn burst(&self, index: u16) -> [u32; SWITCH_RULE_BURST_WORDS] {
        switch_rule_burst(&RuleWords {
            index,
            notify_host: self.notify_host,
            change_output: self.change_output,
            link_active: self.link_active,
            link_index: self.link_index,
            driver: &self.driver,
        })
    }
}

fn is_virtual(index: u16) -> bool {
    (index & 0xFF) as u8 >= SWITCH_VIRTUAL_FIRST
}

/// Rule arena plus the pool of unused virtual slots.
#[derive(Debug)]
pub struct RuleTable {
    slots: Vec<RuleSlot>,
    free: VecDeque<u16>,
    /// Polarity written into inert slots.
    polarity: bool,
}

impl RuleTable {
    pub fn new(polarity: bool) -> Self {
        let mut table = Self {
            slots: Vec::new(),
            free: VecDeque::with_capacity(VIRTUAL_RULE_SLOT_COUNT),
            polarity,
        };
        table.reset(polarity);
        table
    }

    /// Clear every slot and return all virtual slots to the pool.
    pub fn reset(&mut self, polarity: bool) {
        self.polarity = polarity;
        self.slots = (0..SWITCH_RULE_COUNT as u16)
            .map(|index| RuleSlot::inert(index, polarity))
            .collect();
        self.free = (0..SWITCH_RULE_COUNT as u16)
            .filter(|&index| is_virtual(index))
            .collect();
    }

    pub fn rule_slot(&self, index: u16) -> Option<&RuleSlot> {
        self.slots.get(index as usize)
    }

    /// Slots left in the pool.
    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    /// Slot indexes of the chain for a pair, base slot first.
    ///
    /// The walk stops after as many links as the pool can hold, so a
    /// corrupted table never loops.
    pub fn chain(&self, switch_num: u8, event_type: EventType) -> Vec<u16> {
        let mut index = switch_rule_index(switch_num, event_type);
        let mut chain = vec![index];
        while let Some(slot) = self.slots.get(index as usize) {
            if !slot.link_active || chain.len() > VIRTUAL_RULE_SLOT_COUNT {
                break;
            }
            index = slot.link_index;
            chain.push(index);
        }
        chain
    }

    /// Replace the chain for `(switch_num, event_type)`.
    ///
    /// The base slot carries the first reaction and reports to the host per
    /// `rule`. Further reactions are linked through pool slots. With no
    /// reactions the base slot only notifies. Each finished slot is
    /// serialized into `sink`; if any write fails, the base slot is written
    /// back inert and the failure is returned.
    #[instrument(
        level = "debug",
        skip(self, rule, reactions, sink),
        fields(reactions = reactions.len())
    )]
    pub fn update_rule<S: WordSink + ?Sized>(
        &mut self,
        switch_num: u8,
        event_type: EventType,
        rule: &SwitchRule,
        reactions: &[DriverState],
        sink: &mut S,
    ) -> Result<()> {
        check_range("Switch", switch_num as usize, SWITCH_PHYSICAL_LAST as usize)?;
        if !event_type.is_switch() {
            return Err(PinprocError::NotSwitchEvent(event_type));
        }
        for reaction in reactions {
            check_range("Driver", reaction.driver_num as usize, DRIVER_COUNT - 1)?;
        }

        // The base slot holds the first reaction without touching the pool.
        let needed = reactions.len().saturating_sub(1);
        if needed > self.free.len() {
            return Err(PinprocError::RulesExhausted {
                available: self.free.len(),
                needed,
            });
        }

        let base = switch_rule_index(switch_num, event_type);
        let old_links = self.linked_slots(base)?;
        for &index in &old_links {
            self.release(index);
        }
        if !old_links.is_empty() {
            debug!(freed = old_links.len(), "Released linked rule slots");
        }

        let slot = &mut self.slots[base as usize];
        slot.notify_host = rule.notify_host;
        slot.change_output = false;
        slot.link_active = false;

        let mut drawn = Vec::with_capacity(needed);
        if let Err(e) = self.install(base, reactions, &mut drawn, sink) {
            error!(
                error = %e,
                base = %format!("0x{base:03X}"),
                "Rule write failed; disabling base rule"
            );
            self.rollback(base, &drawn, sink);
            return Err(e);
        }
        Ok(())
    }

    fn install<S: WordSink + ?Sized>(
        &mut self,
        base: u16,
        reactions: &[DriverState],
        drawn: &mut Vec<u16>,
        sink: &mut S,
    ) -> Result<()> {
        let Some((last, chained)) = reactions.split_last() else {
            return sink.prepare_write(&self.slots[base as usize].burst(base));
        };

        let mut current = base;
        for driver in chained {
            let next = self.free.pop_front().ok_or(PinprocError::RulesExhausted {
                available: 0,
                needed: 1,
            })?;
            drawn.push(next);

            let slot = &mut self.slots[current as usize];
            slot.change_output = true;
            slot.driver = *driver;
            slot.link_active = true;
            slot.link_index = next;
            sink.prepare_write(&slot.burst(current))?;

            self.slots[next as usize].notify_host = false;
            current = next;
        }

        let slot = &mut self.slots[current as usize];
        slot.change_output = true;
        slot.driver = *last;
        slot.link_active = false;
        sink.prepare_write(&slot.burst(current))
    }

    fn rollback<S: WordSink + ?Sized>(&mut self, base: u16, drawn: &[u16], sink: &mut S) {
        for &index in drawn {
            self.release(index);
        }
        let slot = &mut self.slots[base as usize];
        slot.change_output = false;
        slot.link_active = false;
        match sink.prepare_write(&slot.burst(base)) {
            Ok(()) => warn!("Base rule disabled"),
            Err(e) => error!(error = %e, "Failed to disable base rule"),
        }
    }

    /// Pool slots linked from `base`, validated before anything is freed.
    fn linked_slots(&self, base: u16) -> Result<Vec<u16>> {
        let mut linked = Vec::new();
        let mut visited = [false; SWITCH_RULE_COUNT];
        let mut slot = &self.slots[base as usize];

        while slot.link_active {
            let next = slot.link_index;
            if next as usize >= SWITCH_RULE_COUNT || !is_virtual(next) {
                return Err(PinprocError::ChainCorrupted {
                    index: next,
                    reason: "link to a physical slot",
                });
            }
            if visited[next as usize] {
                return Err(PinprocError::ChainCorrupted {
                    index: next,
                    reason: "cycle",
                });
            }
            if self.free.len() + linked.len() >= VIRTUAL_RULE_SLOT_COUNT {
                return Err(PinprocError::ChainCorrupted {
                    index: next,
                    reason: "free pool would overflow",
                });
            }
            visited[next as usize] = true;
            linked.push(next);
            slot = &self.slots[next as usize];
        }
        Ok(linked)
    }

    fn release(&mut self, index: u16) {
        self.slots[index as usize] = RuleSlot::inert(index, self.polarity);
        self.free.push_back(index);
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::new(false)
    }
}
