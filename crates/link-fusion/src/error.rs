// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;
use link_hal::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FusionError {
    /// The IMU sample carried a magnetometer reading but the filter wasn't
    /// configured to use one (or vice versa).
    MagnetometerMismatch,
}

impl fmt::Display for FusionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionError::MagnetometerMismatch => write!(f, "magnetometer presence mismatch"),
        }
    }
}

#[cfg(test)]
impl std::error::Error for FusionError {}

impl From<FusionError> for LinkError {
    fn from(_: FusionError) -> Self {
        LinkError::HalFault
    }
}
