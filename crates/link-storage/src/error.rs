// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::fmt;
use link_hal::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// The underlying peripheral refused the read/write/erase.
    Hal,
    /// Header magic didn't match; the slot has never been written, or is
    /// garbage.
    InvalidMagic,
    /// Payload CRC16 did not match the header's stored value.
    CrcMismatch,
    /// Caller's payload is larger than the slot's fixed capacity.
    RecordTooLarge,
    /// Both banks failed to verify; nothing usable is stored.
    BothBanksCorrupt,
    /// The write landed but the read-back did not match.
    VerifyFailed,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Hal => write!(f, "storage peripheral fault"),
            StorageError::InvalidMagic => write!(f, "record header magic mismatch"),
            StorageError::CrcMismatch => write!(f, "record CRC16 mismatch"),
            StorageError::RecordTooLarge => write!(f, "record exceeds slot capacity"),
            StorageError::BothBanksCorrupt => write!(f, "both storage banks failed verification"),
            StorageError::VerifyFailed => write!(f, "write read-back verification failed"),
        }
    }
}

#[cfg(test)]
impl std::error::Error for StorageError {}

impl From<link_hal::storage::StorageError> for StorageError {
    fn from(_: link_hal::storage::StorageError) -> Self {
        StorageError::Hal
    }
}

impl From<StorageError> for LinkError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::BothBanksCorrupt => LinkError::StorageCorrupt,
            _ => LinkError::HalFault,
        }
    }
}
