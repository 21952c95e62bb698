// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory peripheral fakes (§10 Testing addition), used by the
//! integration tests below to drive whole superframes without any real
//! hardware, the same way the reference firmware's own mock peripherals
//! let its capsules be unit-tested off hardware.

use link_hal::imu::{ImuDriver, ImuError, ImuSample};
use link_hal::radio::{RadioError, RadioMode, RadioPhy, RadioPipe, RxFrame};
use link_hal::storage::{NvStorage, StorageError as HalStorageError};
use link_hal::usb::{HidReport, UsbError, UsbHid};

/// A loopback radio: frames submitted to one end's `transmit` are queued
/// for the other end's `receive`. Built for a two-party (tracker ↔
/// receiver) test harness.
pub struct MockRadioPhy {
    pub channel: u8,
    pub mode: RadioMode,
    inbox: heapless::Deque<RxFrame, 8>,
    /// What the last `transmit` call submitted, for assertions.
    pub last_tx: Option<heapless::Vec<u8, { link_hal::radio::MAX_FRAME_LEN }>>,
    pub rssi: Option<i8>,
}

impl Default for MockRadioPhy {
    fn default() -> Self {
        MockRadioPhy {
            channel: 0,
            mode: RadioMode::Sleep,
            inbox: heapless::Deque::new(),
            last_tx: None,
            rssi: None,
        }
    }
}

impl MockRadioPhy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a frame to this end's `receive()` queue, as if it arrived
    /// over the air.
    pub fn deliver(&mut self, bytes: &[u8], rssi: i8, channel: u8) {
        let mut buf = heapless::Vec::new();
        let _ = buf.extend_from_slice(bytes);
        let _ = self.inbox.push_back(RxFrame { bytes: buf, rssi, channel });
    }
}

impl RadioPhy for MockRadioPhy {
    fn set_address(&mut self, _pipe: RadioPipe, _base: [u8; 4], _prefix: u8) -> Result<(), RadioError> {
        Ok(())
    }

    fn set_channel(&mut self, channel: u8) -> Result<(), RadioError> {
        self.channel = channel;
        Ok(())
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), RadioError> {
        self.mode = mode;
        Ok(())
    }

    fn transmit(&mut self, bytes: &[u8]) -> Result<(), RadioError> {
        let mut buf = heapless::Vec::new();
        buf.extend_from_slice(bytes).map_err(|()| RadioError::BufferTooLarge)?;
        self.last_tx = Some(buf);
        Ok(())
    }

    fn receive(&mut self) -> Option<RxFrame> {
        self.inbox.pop_front()
    }

    fn sample_rssi(&mut self) -> Option<i8> {
        self.rssi
    }
}

/// A scripted IMU: samples are queued ahead of time and drained one per
/// `read()` call.
#[derive(Default)]
pub struct MockImuDriver {
    samples: heapless::Deque<ImuSample, 16>,
    suspended: bool,
}

impl MockImuDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_sample(&mut self, sample: ImuSample) {
        let _ = self.samples.push_back(sample);
    }
}

impl ImuDriver for MockImuDriver {
    fn read(&mut self) -> Result<ImuSample, ImuError> {
        self.samples.pop_front().ok_or(ImuError::NotReady)
    }

    fn data_ready(&self) -> bool {
        !self.samples.is_empty()
    }

    fn suspend(&mut self) -> Result<(), ImuError> {
        self.suspended = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), ImuError> {
        self.suspended = false;
        Ok(())
    }
}

/// A flat in-memory byte region standing in for non-volatile storage.
pub struct MockNvStorage<const CAP: usize> {
    bytes: heapless::Vec<u8, CAP>,
}

impl<const CAP: usize> MockNvStorage<CAP> {
    pub fn new() -> Self {
        let mut bytes = heapless::Vec::new();
        bytes.resize_default(CAP).unwrap();
        MockNvStorage { bytes }
    }

    /// Simulate power loss mid-write: corrupt `len` bytes starting at
    /// `offset`, as if only part of a record landed before reset.
    pub fn corrupt(&mut self, offset: usize, len: usize) {
        for b in &mut self.bytes[offset..offset + len] {
            *b = 0xFF;
        }
    }
}

impl<const CAP: usize> Default for MockNvStorage<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> NvStorage for MockNvStorage<CAP> {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn erase_unit(&self) -> usize {
        256
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), HalStorageError> {
        if offset + buf.len() > self.bytes.len() {
            return Err(HalStorageError::OutOfRange);
        }
        buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, buf: &[u8]) -> Result<(), HalStorageError> {
        if offset + buf.len() > self.bytes.len() {
            return Err(HalStorageError::OutOfRange);
        }
        self.bytes[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn erase(&mut self, offset: usize, len: usize) -> Result<(), HalStorageError> {
        if offset + len > self.bytes.len() {
            return Err(HalStorageError::OutOfRange);
        }
        for b in &mut self.bytes[offset..offset + len] {
            *b = 0xFF;
        }
        Ok(())
    }
}

/// Captures every report written to it, for test assertions.
#[derive(Default)]
pub struct MockUsbHid {
    pub reports: heapless::Deque<HidReport, 64>,
    pub rx: Option<heapless::Vec<u8, 8>>,
}

impl MockUsbHid {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsbHid for MockUsbHid {
    fn write(&mut self, report: &HidReport) -> Result<(), UsbError> {
        self.reports.push_back(*report).map_err(|_| UsbError::Busy)
    }

    fn poll_rx(&mut self) -> Option<heapless::Vec<u8, 8>> {
        self.rx.take()
    }
}
