// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! USB HID contract (out of scope §1: enumeration and endpoint plumbing are
//! provided by a board crate).

use heapless::Vec;

/// One HID report: always 16 bytes, matching the wire packet payload size.
pub type HidReport = [u8; 16];

/// Host -> device command codes (see §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostCommand {
    EnterBootloader,
    EnterPairing,
    ExitPairing,
    VersionInfo,
    Unknown(u8),
}

impl HostCommand {
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let code = *bytes.first()?;
        Some(match code {
            0x10 => HostCommand::EnterBootloader,
            0x11 => HostCommand::EnterPairing,
            0x12 => HostCommand::ExitPairing,
            0x20 => HostCommand::VersionInfo,
            other => HostCommand::Unknown(other),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbError {
    NotConnected,
    Busy,
}

pub trait UsbHid {
    /// Send one 16-byte report. The board crate is responsible for batching
    /// up to four of these into a single 64-byte USB transfer.
    fn write(&mut self, report: &HidReport) -> Result<(), UsbError>;

    /// Drain any host -> device bytes received since the last call.
    fn poll_rx(&mut self) -> Option<Vec<u8, 8>>;
}
