// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recovery State Machine (§4.4): four-tier miss-sync escalation, slot
//! overrun abort, and the tiered timeout ladder.

use link_hal::TimeoutTier;

const RESYNC_THRESHOLD: u32 = 3;
const SWITCH_CHANNEL_THRESHOLD: u32 = 10;
const FULL_SCAN_THRESHOLD: u32 = 30;
const DEEP_SEARCH_THRESHOLD: u32 = 100;

const SLOT_OVERRUN_ABORT_STREAK: u8 = 3;

const TIMEOUT_SOFT_MS: u32 = 10;
const TIMEOUT_RETRY_MS: u32 = 50;
const TIMEOUT_RESET_RADIO_MS: u32 = 100;
const TIMEOUT_FORCE_REPAIR_MS: u32 = 500;

/// Ordered by severity; derived `Ord` lets callers write
/// `action >= RecoveryAction::SwitchChannel` the way §4.5 does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecoveryAction {
    None,
    Resync,
    SwitchChannel,
    FullScan,
    DeepSearch,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryStateMachine {
    missed_beacons: u32,
    slot_overrun_streak: u8,
}

impl RecoveryStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_beacon_received(&mut self) {
        self.missed_beacons = 0;
    }

    pub fn on_beacon_missed(&mut self) -> RecoveryAction {
        self.missed_beacons = self.missed_beacons.saturating_add(1);
        self.action()
    }

    pub fn action(&self) -> RecoveryAction {
        match self.missed_beacons {
            n if n >= DEEP_SEARCH_THRESHOLD => RecoveryAction::DeepSearch,
            n if n >= FULL_SCAN_THRESHOLD => RecoveryAction::FullScan,
            n if n >= SWITCH_CHANNEL_THRESHOLD => RecoveryAction::SwitchChannel,
            n if n >= RESYNC_THRESHOLD => RecoveryAction::Resync,
            _ => RecoveryAction::None,
        }
    }

    /// §4.5: the tracker link falls back to `SEARCH_SYNC` once recovery has
    /// escalated this far.
    pub fn should_force_search_sync(&self) -> bool {
        self.action() >= RecoveryAction::SwitchChannel
    }

    /// Feed one frame's slot-timing outcome; returns `true` once 3
    /// consecutive overruns have been observed (abort TX, skip one frame).
    pub fn record_slot_timing(&mut self, overran: bool) -> bool {
        if overran {
            self.slot_overrun_streak = self.slot_overrun_streak.saturating_add(1);
        } else {
            self.slot_overrun_streak = 0;
        }
        self.slot_overrun_streak >= SLOT_OVERRUN_ABORT_STREAK
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Map an elapsed-time budget to its timeout tier (§4.4); `None` if no
/// tier has fired yet.
pub fn timeout_tier_for_elapsed_ms(elapsed_ms: u32) -> Option<TimeoutTier> {
    if elapsed_ms >= TIMEOUT_FORCE_REPAIR_MS {
        Some(TimeoutTier::ForceRepair)
    } else if elapsed_ms >= TIMEOUT_RESET_RADIO_MS {
        Some(TimeoutTier::ResetRadio)
    } else if elapsed_ms >= TIMEOUT_RETRY_MS {
        Some(TimeoutTier::Retry)
    } else if elapsed_ms >= TIMEOUT_SOFT_MS {
        Some(TimeoutTier::Soft)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_loss_escalation_scenario_from_spec() {
        let mut recovery = RecoveryStateMachine::new();
        let mut action = RecoveryAction::None;
        for _ in 0..3 {
            action = recovery.on_beacon_missed();
        }
        assert_eq!(action, RecoveryAction::Resync);

        for _ in 3..10 {
            action = recovery.on_beacon_missed();
        }
        assert_eq!(action, RecoveryAction::SwitchChannel);

        for _ in 10..30 {
            action = recovery.on_beacon_missed();
        }
        assert_eq!(action, RecoveryAction::FullScan);

        for _ in 30..100 {
            action = recovery.on_beacon_missed();
        }
        assert_eq!(action, RecoveryAction::DeepSearch);
    }

    #[test]
    fn a_received_beacon_clears_the_miss_streak() {
        let mut recovery = RecoveryStateMachine::new();
        for _ in 0..9 {
            recovery.on_beacon_missed();
        }
        recovery.on_beacon_received();
        assert_eq!(recovery.action(), RecoveryAction::None);
    }

    #[test]
    fn slot_overrun_aborts_after_three_consecutive_frames() {
        let mut recovery = RecoveryStateMachine::new();
        assert!(!recovery.record_slot_timing(true));
        assert!(!recovery.record_slot_timing(true));
        assert!(recovery.record_slot_timing(true));
    }

    #[test]
    fn slot_overrun_streak_resets_on_a_clean_frame() {
        let mut recovery = RecoveryStateMachine::new();
        recovery.record_slot_timing(true);
        recovery.record_slot_timing(true);
        assert!(!recovery.record_slot_timing(false));
        assert!(!recovery.record_slot_timing(true));
    }

    #[test]
    fn timeout_tiers_match_the_ladder() {
        assert_eq!(timeout_tier_for_elapsed_ms(5), None);
        assert_eq!(timeout_tier_for_elapsed_ms(10), Some(TimeoutTier::Soft));
        assert_eq!(timeout_tier_for_elapsed_ms(50), Some(TimeoutTier::Retry));
        assert_eq!(timeout_tier_for_elapsed_ms(100), Some(TimeoutTier::ResetRadio));
        assert_eq!(timeout_tier_for_elapsed_ms(500), Some(TimeoutTier::ForceRepair));
    }
}
