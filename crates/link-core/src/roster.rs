// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The receiver's tracker roster (§3): ordered `tracker_id -> entry`
//! mapping, populated only by the Pairing Service.

use link_codec::{SequenceOutcome, SequenceTracker};

pub const REST_FLAG: u8 = 1 << 0;
pub const MAG_DISTURBED_FLAG: u8 = 1 << 1;
pub const INITIALIZED_FLAG: u8 = 1 << 2;

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RosterEntry {
    pub hw_addr: [u8; 6],
    pub last_seq: SequenceTracker,
    pub last_rssi: i8,
    /// Valid packets received since pairing; an entry only counts toward a
    /// HID report once this reaches `LinkConfig::receiver_detect_count_threshold`.
    pub detect_count: u16,
    pub loss_count: u32,
    pub flags: u8,
    pub battery_pct: u8,
    pub last_seen_tick: u32,
}

impl RosterEntry {
    fn new(hw_addr: [u8; 6], now_ms: u32) -> Self {
        RosterEntry {
            hw_addr,
            last_seq: SequenceTracker::new(),
            last_rssi: 0,
            detect_count: 0,
            loss_count: 0,
            flags: 0,
            battery_pct: 0,
            last_seen_tick: now_ms,
        }
    }
}

/// Fixed-capacity roster for up to `N` trackers; index == `tracker_id`.
#[derive(Debug, Clone, Copy)]
pub struct Roster<const N: usize> {
    entries: [Option<RosterEntry>; N],
}

impl<const N: usize> Default for Roster<N> {
    fn default() -> Self {
        Roster { entries: [None; N] }
    }
}

impl<const N: usize> Roster<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tracker_id: u8) -> Option<&RosterEntry> {
        self.entries.get(tracker_id as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, tracker_id: u8) -> Option<&mut RosterEntry> {
        self.entries.get_mut(tracker_id as usize)?.as_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find_by_addr(&self, hw_addr: [u8; 6]) -> Option<u8> {
        self.entries
            .iter()
            .enumerate()
            .find_map(|(id, e)| e.filter(|e| e.hw_addr == hw_addr).map(|_| id as u8))
    }

    /// Allocate the lowest free `tracker_id` for a brand-new address.
    /// `None` if the roster is full (`LinkError::OutOfSlots` at the caller).
    pub fn allocate(&mut self, hw_addr: [u8; 6], now_ms: u32) -> Option<u8> {
        if self.find_by_addr(hw_addr).is_some() {
            return None;
        }
        let idx = self.entries.iter().position(Option::is_none)?;
        self.entries[idx] = Some(RosterEntry::new(hw_addr, now_ms));
        Some(idx as u8)
    }

    /// Re-insert an entry at a specific `tracker_id` (§4.8: restoring a
    /// persisted pairing record after a reboot). Unlike `allocate`, the id
    /// is supplied by the caller rather than chosen, since it was already
    /// assigned before the reboot; this is also how the slot's in-memory
    /// counters (detect count, sequence window, ...) get reset to fresh.
    pub fn restore(&mut self, tracker_id: u8, hw_addr: [u8; 6], now_ms: u32) -> bool {
        match self.entries.get_mut(tracker_id as usize) {
            Some(slot) => {
                *slot = Some(RosterEntry::new(hw_addr, now_ms));
                true
            }
            None => false,
        }
    }

    /// Process a validated, CRC-clean data packet for `tracker_id`: advance
    /// the sequence window, update RSSI/seen-tick, and report whether the
    /// packet should be counted (and how much loss to attribute).
    pub fn observe_packet(&mut self, tracker_id: u8, seq: u8, rssi: i8, now_ms: u32) -> Option<SequenceOutcome> {
        let entry = self.get_mut(tracker_id)?;
        let outcome = entry.last_seq.accept(seq);
        if let SequenceOutcome::Accepted { loss } = outcome {
            entry.detect_count = entry.detect_count.saturating_add(1);
            entry.loss_count += u32::from(loss);
            entry.last_rssi = rssi;
            entry.last_seen_tick = now_ms;
        }
        Some(outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &RosterEntry)> {
        self.entries.iter().enumerate().filter_map(|(id, e)| e.as_ref().map(|e| (id as u8, e)))
    }
}
