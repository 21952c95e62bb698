// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The 200 Hz orientation pipeline (§4.2): gyro noise filtering, temperature
//! compensation, auto-calibration, rest detection, and a VQF-class fusion
//! filter producing a quaternion and gyro bias per tracker.

#![cfg_attr(not(test), no_std)]

pub mod calibration;
pub mod engine;
pub mod error;
pub mod filter;
pub mod fusion;
pub mod rest;
pub mod tempcomp;

pub use engine::{OrientationEngine, OrientationOutput};
pub use error::FusionError;
pub use fusion::{FusionFilter, OrientationFlags};
