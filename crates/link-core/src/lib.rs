// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Link state machines (§4.5-§4.7): Tracker Link, Receiver Link, and the
//! Pairing Service, built on `link-codec`/`link-fusion`/`link-radio`/
//! `link-storage` and driven by a board crate's main loop.

#![cfg_attr(not(test), no_std)]

pub mod clock;
pub mod config;
pub mod pairing;
pub mod receiver;
pub mod roster;
pub mod tracker;

#[cfg(test)]
pub mod mock;

pub use clock::Clock;
pub use config::LinkConfig;
pub use receiver::ReceiverLink;
pub use roster::{Roster, RosterEntry};
pub use tracker::{TrackerLink, TrackerState};
