// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracker Link (§4.5): the transmitter-side link state machine.

use crate::config::LinkConfig;
use link_hal::clock::Instant;
use link_radio::RecoveryStateMachine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrackerState {
    Init,
    SearchSync,
    Running,
    Pairing,
    Sleeping,
}

#[derive(Debug, Clone, Copy)]
pub struct TrackerLink {
    state: TrackerState,
    tracker_id: Option<u8>,
    network_key: Option<u32>,
    recovery: RecoveryStateMachine,
    retries_remaining: u8,
    frames_without_ack: u16,
    rest_time_s: f32,
    config: LinkConfig,
}

impl TrackerLink {
    pub fn new(config: LinkConfig) -> Self {
        TrackerLink {
            state: TrackerState::Init,
            tracker_id: None,
            network_key: None,
            recovery: RecoveryStateMachine::new(),
            retries_remaining: config.tracker_retry_budget,
            frames_without_ack: 0,
            rest_time_s: 0.0,
            config,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn is_paired(&self) -> bool {
        self.tracker_id.is_some() && self.network_key.is_some()
    }

    pub fn tracker_id(&self) -> Option<u8> {
        self.tracker_id
    }

    /// Start (or restart) the search for a sync beacon. Valid from any
    /// non-running state (§4.5).
    pub fn enter_search_sync(&mut self) {
        self.state = TrackerState::SearchSync;
        self.recovery.reset();
    }

    /// Persist a pairing response (§4.7) and fall back to `SEARCH_SYNC`.
    pub fn complete_pairing(&mut self, tracker_id: u8, network_key: u32) {
        self.tracker_id = Some(tracker_id);
        self.network_key = Some(network_key);
        self.enter_search_sync();
    }

    /// A beacon was received carrying `beacon_key`; authenticates only if
    /// it matches our negotiated network key.
    pub fn on_beacon(&mut self, beacon_key: u32) {
        if self.network_key != Some(beacon_key) {
            return;
        }
        self.recovery.on_beacon_received();
        if self.state == TrackerState::SearchSync {
            self.state = TrackerState::Running;
        }
    }

    /// One superframe passed with no beacon decoded.
    pub fn on_beacon_missed(&mut self) {
        self.recovery.on_beacon_missed();
        if self.state == TrackerState::Running && self.recovery.should_force_search_sync() {
            self.state = TrackerState::SearchSync;
        }
    }

    /// Result of one data-slot TX: `Some(acked)` once an ACK window closes.
    pub fn on_slot_result(&mut self, acked: bool) {
        if acked {
            self.frames_without_ack = 0;
            self.retries_remaining = self.config.tracker_retry_budget;
        } else {
            self.frames_without_ack = self.frames_without_ack.saturating_add(1);
            if self.retries_remaining > 0 {
                self.retries_remaining -= 1;
            }
        }
    }

    /// §4.5: after 200 consecutive frames without ACK, request re-pair.
    pub fn should_request_repair(&self) -> bool {
        self.frames_without_ack >= self.config.tracker_max_frames_without_ack
    }

    pub fn retries_remaining(&self) -> u8 {
        self.retries_remaining
    }

    /// Double-click (or equivalent gesture): enter pairing mode from either
    /// non-running state.
    pub fn request_pairing(&mut self) {
        if matches!(self.state, TrackerState::SearchSync | TrackerState::Running) {
            self.state = TrackerState::Pairing;
        }
    }

    /// Long-press: unconditional sleep entry.
    pub fn request_sleep(&mut self) {
        self.state = TrackerState::Sleeping;
    }

    pub fn wake(&mut self) {
        self.enter_search_sync();
    }

    /// Feed the orientation engine's rest flag each sample; auto-sleeps
    /// only while running, paired, and in sync (§4.5).
    pub fn update_rest_time(&mut self, resting: bool, dt_s: f32) {
        if resting {
            self.rest_time_s += dt_s;
        } else {
            self.rest_time_s = 0.0;
        }

        if self.state == TrackerState::Running
            && self.is_paired()
            && !self.recovery.should_force_search_sync()
            && self.rest_time_s >= self.config.tracker_auto_sleep_timeout_s as f32
        {
            self.state = TrackerState::Sleeping;
        }
    }
}

/// A tracker's TX window begins `slot_offset` after the beacon (§4.5 TX
/// discipline): `tracker_id * slot_duration` into the superframe.
pub fn slot_start(beacon_time: Instant, tracker_id: u8, slot_duration_us: u64) -> Instant {
    let offset = u64::from(tracker_id) * slot_duration_us;
    beacon_time.checked_add_micros(offset).unwrap_or(beacon_time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_matching_beacon_moves_search_sync_into_running() {
        let mut link = TrackerLink::new(LinkConfig::default());
        link.complete_pairing(3, 0xAABB_CCDD);
        assert_eq!(link.state(), TrackerState::SearchSync);
        link.on_beacon(0xAABB_CCDD);
        assert_eq!(link.state(), TrackerState::Running);
    }

    #[test]
    fn a_beacon_from_a_foreign_network_is_ignored() {
        let mut link = TrackerLink::new(LinkConfig::default());
        link.complete_pairing(3, 0xAABB_CCDD);
        link.on_beacon(0x1111_1111);
        assert_eq!(link.state(), TrackerState::SearchSync);
    }

    #[test]
    fn channel_loss_escalation_forces_search_sync() {
        let mut link = TrackerLink::new(LinkConfig::default());
        link.complete_pairing(3, 1);
        link.on_beacon(1);
        assert_eq!(link.state(), TrackerState::Running);
        for _ in 0..10 {
            link.on_beacon_missed();
        }
        assert_eq!(link.state(), TrackerState::SearchSync);
    }

    #[test]
    fn auto_sleep_requires_paired_and_synced_and_resting_long_enough() {
        let mut config = LinkConfig::default();
        config.tracker_auto_sleep_timeout_s = 1;
        let mut link = TrackerLink::new(config);
        link.complete_pairing(3, 1);
        link.on_beacon(1);
        assert_eq!(link.state(), TrackerState::Running);

        link.update_rest_time(true, 0.5);
        assert_eq!(link.state(), TrackerState::Running);
        link.update_rest_time(true, 0.6);
        assert_eq!(link.state(), TrackerState::Sleeping);
    }

    #[test]
    fn unsynced_tracker_never_auto_sleeps() {
        let mut config = LinkConfig::default();
        config.tracker_auto_sleep_timeout_s = 1;
        let mut link = TrackerLink::new(config);
        link.complete_pairing(3, 1);
        for _ in 0..10 {
            link.on_beacon_missed();
        }
        assert_eq!(link.state(), TrackerState::SearchSync);
        link.update_rest_time(true, 5.0);
        assert_eq!(link.state(), TrackerState::SearchSync);
    }

    #[test]
    fn repair_is_requested_after_the_configured_ack_drought() {
        let mut config = LinkConfig::default();
        config.tracker_max_frames_without_ack = 3;
        let mut link = TrackerLink::new(config);
        link.on_slot_result(false);
        link.on_slot_result(false);
        assert!(!link.should_request_repair());
        link.on_slot_result(false);
        assert!(link.should_request_repair());
    }

    #[test]
    fn slot_start_offsets_by_tracker_id() {
        let beacon = Instant::from_micros(1_000);
        assert_eq!(slot_start(beacon, 0, 400).as_micros(), 1_000);
        assert_eq!(slot_start(beacon, 3, 400).as_micros(), 2_200);
    }
}
