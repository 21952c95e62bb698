// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Channel quality tracking and sync-loss recovery (§4.3, §4.4): the
//! Channel Manager's 10 s loss/RSSI windows, blacklist hysteresis, adaptive
//! hop sequence, and the Recovery State Machine's miss-sync escalation
//! ladder and tiered timeouts.

#![cfg_attr(not(test), no_std)]

pub mod channel;
pub mod error;
pub mod recovery;

pub use channel::ChannelManager;
pub use error::RadioError;
pub use recovery::{timeout_tier_for_elapsed_ms, RecoveryAction, RecoveryStateMachine};
