// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `LinkConfig` (§10): every numeric tunable named in §4, collected so a
//! persisted `config` record (§3/§6) can override the compiled defaults at
//! boot without a reflash.
//!
//! The lower crates (`link-fusion`, `link-radio`) bake their own thresholds
//! in as compiled constants rather than taking a config argument per call —
//! the fields below mirror those constants for persistence/display purposes
//! and are the authoritative values for the thresholds `link-core`'s own
//! state machines (tracker/receiver/pairing) consult directly.

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkConfig {
    // Recovery State Machine (§4.4). Mirrors link_radio::recovery's
    // internal thresholds.
    pub recovery_resync_threshold: u32,
    pub recovery_switch_channel_threshold: u32,
    pub recovery_full_scan_threshold: u32,
    pub recovery_deep_search_threshold: u32,

    // Orientation Engine rest-detection hysteresis (§4.2 step 6). Mirrors
    // link_fusion::rest's internal constants.
    pub rest_entry_gyro_deg_per_s: f32,
    pub rest_entry_accel_dev_mps2: f32,
    pub rest_exit_relax_factor: f32,
    pub rest_dwell_commit_s: f32,

    // Fusion time constants (§4.2 step 5). Mirrors link_fusion::fusion's
    // internal constants.
    pub fusion_tau_acc_s: f32,
    pub fusion_tau_mag_s: f32,

    // Channel Manager (§4.3). Mirrors link_radio::channel's internal
    // constants.
    pub channel_blacklist_loss_pct: u32,
    pub channel_rehabilitate_loss_pct: u32,
    pub channel_min_active: u8,
    pub channel_cca_clear_rssi_dbm: i8,

    // Tracker Link (§4.5).
    pub tracker_retry_budget: u8,
    pub tracker_max_frames_without_ack: u16,
    pub tracker_auto_sleep_timeout_s: u32,

    // Receiver Link (§4.6).
    pub receiver_hid_fifo_depth: u8,
    pub receiver_reports_per_ms: u8,
    pub receiver_registration_interval_ms: u32,
    pub receiver_detect_count_threshold: u16,

    // Pairing Service (§4.7).
    pub pairing_timeout_s: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            recovery_resync_threshold: 3,
            recovery_switch_channel_threshold: 10,
            recovery_full_scan_threshold: 30,
            recovery_deep_search_threshold: 100,

            rest_entry_gyro_deg_per_s: 1.5,
            rest_entry_accel_dev_mps2: 0.3,
            rest_exit_relax_factor: 1.5,
            rest_dwell_commit_s: 0.5,

            fusion_tau_acc_s: 3.0,
            fusion_tau_mag_s: 9.0,

            channel_blacklist_loss_pct: 30,
            channel_rehabilitate_loss_pct: 10,
            channel_min_active: 3,
            channel_cca_clear_rssi_dbm: -65,

            tracker_retry_budget: 2,
            tracker_max_frames_without_ack: 200,
            tracker_auto_sleep_timeout_s: 5 * 60,

            receiver_hid_fifo_depth: 32,
            receiver_reports_per_ms: 4,
            receiver_registration_interval_ms: 100,
            receiver_detect_count_threshold: 25,

            pairing_timeout_s: 60,
        }
    }
}

impl LinkConfig {
    /// Merge a persisted override on top of the compiled defaults. Absence
    /// (fresh device, no `config` record yet) means "use compiled defaults".
    pub fn from_persisted(persisted: Option<LinkConfig>) -> Self {
        persisted.unwrap_or_default()
    }
}
