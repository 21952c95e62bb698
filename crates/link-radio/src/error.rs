// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;
use link_hal::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// Fewer than 3 channels would remain active; the operation was refused.
    BelowActiveFloor,
    /// Clear-channel assessment exhausted its retry budget.
    NoClearChannel,
    /// The underlying PHY reported a fault.
    Phy,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioError::BelowActiveFloor => write!(f, "active channel floor would be breached"),
            RadioError::NoClearChannel => write!(f, "no clear channel found within retry budget"),
            RadioError::Phy => write!(f, "radio PHY fault"),
        }
    }
}

#[cfg(test)]
impl std::error::Error for RadioError {}

impl From<RadioError> for LinkError {
    fn from(_: RadioError) -> Self {
        LinkError::HalFault
    }
}
