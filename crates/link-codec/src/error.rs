// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;
use link_hal::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// Total length didn't match any known packet class.
    InvalidLength,
    /// CRC check failed.
    InvalidCrc,
    /// Type byte was in the reserved `224..254` range, or otherwise unknown.
    UnknownType,
    /// Sequence fell in the discard window `[last-127, last)`.
    SequenceTooOld,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::InvalidLength => write!(f, "invalid packet length"),
            CodecError::InvalidCrc => write!(f, "CRC check failed"),
            CodecError::UnknownType => write!(f, "unknown packet type"),
            CodecError::SequenceTooOld => write!(f, "sequence too old"),
        }
    }
}

#[cfg(test)]
impl std::error::Error for CodecError {}

impl From<CodecError> for LinkError {
    fn from(_: CodecError) -> Self {
        LinkError::InvalidPacket
    }
}
