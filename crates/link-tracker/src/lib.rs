// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracker personality (§2): a thin board-composition layer over
//! `link-core`. Owns nothing a board crate couldn't substitute — the radio
//! PHY, IMU driver, and non-volatile storage are all passed in as trait
//! objects/generics — and drives the cooperative main loop described in
//! §5: sensor read -> fusion -> link service, interleaved with USB service
//! on the receiver side only.

#![cfg_attr(not(test), no_std)]

use link_codec::packet::QuatAccelCompact;
use link_codec::{encode_wire_frame, Packet};
use link_core::pairing::{build_request, parse_response};
use link_core::{Clock, LinkConfig, TrackerLink, TrackerState};
use link_fusion::OrientationEngine;
use link_hal::event::Event;
use link_hal::gpio::{Gpio, GpioEdge};
use link_hal::imu::ImuDriver;
use link_hal::radio::{RadioPhy, RadioPipe};
use link_hal::storage::NvStorage;
use link_hal::{Instant, LinkError};
use link_radio::ChannelManager;
use link_storage::DoubleBufferedRecord;

/// Fixed discovery address (§4.7/§6), reused verbatim here so a tracker
/// board doesn't need its own copy of the constant.
pub use link_core::pairing::{DISCOVERY_BASE_ADDR, DISCOVERY_CHANNEL, DISCOVERY_PREFIXES};

/// Slot duration named in §3's superframe structure.
pub const SLOT_DURATION_US: u64 = 400;

/// Layout offsets for the tracker's own persisted pairing record (§6):
/// `{tracker_id:u8, network_key:u32}`, double-buffered like every other
/// record.
const PAIRING_RECORD_BANK_A: usize = 0x0200;
const PAIRING_RECORD_BANK_B: usize = 0x0A00;

/// 0.1 g per LSB, matching `QuatAccelCompact::accel`'s documented scale.
fn compact_accel(g: [f32; 3]) -> [i8; 3] {
    let mut out = [0i8; 3];
    for (slot, value) in out.iter_mut().zip(g.iter()) {
        *slot = (*value * 10.0).clamp(i8::MIN as f32, i8::MAX as f32) as i8;
    }
    out
}

pub struct TrackerBoard<const N_CHANNELS: usize> {
    link: TrackerLink,
    engine: OrientationEngine,
    clock: Clock,
    channels: ChannelManager<N_CHANNELS>,
    hw_addr: [u8; 6],
    pairing_record: DoubleBufferedRecord<8>,
    imu_temp_c: f32,
    last_accel_g: [f32; 3],
    out_seq: u8,
}

impl<const N_CHANNELS: usize> TrackerBoard<N_CHANNELS> {
    pub fn new(hw_addr: [u8; 6], channel_table: [u8; N_CHANNELS], config: LinkConfig) -> Self {
        let mut link = TrackerLink::new(config);
        // A freshly-booted tracker always starts hunting for a sync beacon;
        // `Init` exists only while the board's own peripherals come up.
        link.enter_search_sync();
        TrackerBoard {
            link,
            engine: OrientationEngine::new(),
            clock: Clock::new(),
            channels: ChannelManager::new(channel_table),
            hw_addr,
            pairing_record: DoubleBufferedRecord::new(PAIRING_RECORD_BANK_A, PAIRING_RECORD_BANK_B),
            imu_temp_c: 25.0,
            last_accel_g: [0.0, 0.0, 0.0],
            out_seq: 0,
        }
    }

    pub fn link(&self) -> &TrackerLink {
        &self.link
    }

    /// Restore a previously-persisted pairing from storage, if any (§4.8:
    /// storage is only read/written outside `RUNNING`, which is always true
    /// at boot).
    pub fn load_pairing(&mut self, storage: &mut impl NvStorage) {
        if let Ok(bytes) = self.pairing_record.read(storage) {
            if bytes.len() == 5 {
                let tracker_id = bytes[0];
                let network_key = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
                self.link.complete_pairing(tracker_id, network_key);
            }
        }
    }

    fn persist_pairing(&mut self, storage: &mut impl NvStorage, tracker_id: u8, network_key: u32) {
        let mut bytes = [0u8; 5];
        bytes[0] = tracker_id;
        bytes[1..5].copy_from_slice(&network_key.to_le_bytes());
        let _ = self.pairing_record.write(storage, &bytes);
    }

    /// Drain one event from the board's mailbox (§5 "Event dispatch").
    /// ISR bodies only ever deposit one tagged `Event`; all decision logic
    /// lives here in the cooperative loop.
    pub fn handle_event(
        &mut self,
        event: Event,
        imu: &mut impl ImuDriver,
        storage: &mut impl NvStorage,
        gpio: &impl Gpio,
    ) -> Result<(), LinkError> {
        match event {
            Event::Tick => {
                self.clock.on_tick();
            }
            Event::ImuReady => {
                self.service_imu(imu);
            }
            Event::RadioRx(frame) => {
                self.service_radio_rx(&frame.bytes, storage);
            }
            Event::Gpio(edge) => self.service_gpio(edge, gpio),
        }
        Ok(())
    }

    fn service_imu(&mut self, imu: &mut impl ImuDriver) {
        if !imu.data_ready() {
            return;
        }
        let Ok(sample) = imu.read() else { return };
        self.imu_temp_c = sample.temp_c;
        let dt = 1.0 / 200.0; // nominal 200 Hz sample rate (§4.2)
        let output = self.engine.update(sample, dt);
        self.last_accel_g = output.linear_accel_g;
        self.link.update_rest_time(output.flags.rest, dt);
    }

    /// Build the data packet for this superframe's slot, if the link is
    /// running and paired; caller is responsible for timing the actual
    /// `radio.transmit` call to `tracker::slot_start`.
    pub fn build_data_packet(&mut self, battery_pct: u8, battery_mv: u16, rssi: i8) -> Option<heapless::Vec<u8, { link_hal::radio::MAX_FRAME_LEN }>> {
        let tracker_id = self.link.tracker_id()?;
        if self.link.state() != TrackerState::Running {
            return None;
        }
        let quat = self.engine.fusion().quat();
        let payload = Packet::QuatAccelCompact(QuatAccelCompact {
            tracker_id,
            battery_pct,
            battery_mv_div32: (battery_mv / 32) as u8,
            temp_c: self.imu_temp_c as i8,
            quat7: link_codec::quat::compress_smallest_three(quat),
            accel: compact_accel(self.last_accel_g),
            rssi,
        })
        .encode();
        self.out_seq = self.out_seq.wrapping_add(1);
        Some(encode_wire_frame(&payload, Some(self.out_seq)))
    }

    fn service_radio_rx(&mut self, bytes: &[u8], storage: &mut impl NvStorage) {
        match self.link.state() {
            TrackerState::SearchSync | TrackerState::Running => {
                if let Some(beacon_key) = parse_beacon_key(bytes) {
                    self.link.on_beacon(beacon_key);
                }
            }
            TrackerState::Pairing => {
                if bytes.len() == 8 {
                    let frame: [u8; 8] = bytes.try_into().unwrap();
                    if let Ok(response) = parse_response(&frame) {
                        self.persist_pairing(storage, response.tracker_id, response.network_key);
                        self.link.complete_pairing(response.tracker_id, response.network_key);
                    }
                }
            }
            TrackerState::Init | TrackerState::Sleeping => {}
        }
    }

    fn service_gpio(&mut self, edge: GpioEdge, _gpio: &impl Gpio) {
        match edge {
            GpioEdge::ButtonDoubleTap => self.link.request_pairing(),
            GpioEdge::ButtonLongPress => self.link.request_sleep(),
            GpioEdge::ButtonTap | GpioEdge::ChargerChanged { .. } => {}
        }
    }

    /// Begin pairing mode: switch to the fixed discovery address/channel
    /// and broadcast the request frame (§4.7).
    pub fn start_pairing(&mut self, radio: &mut impl RadioPhy) -> Result<(), LinkError> {
        self.link.request_pairing();
        radio.set_address(RadioPipe::Discovery, DISCOVERY_BASE_ADDR, DISCOVERY_PREFIXES[0]).map_err(|_| LinkError::HalFault)?;
        radio.set_channel(DISCOVERY_CHANNEL).map_err(|_| LinkError::HalFault)?;
        let request = build_request(self.hw_addr);
        radio.transmit(&request).map_err(|_| LinkError::HalFault)
    }

    pub fn slot_start(&self, beacon_time: Instant) -> Option<Instant> {
        let tracker_id = self.link.tracker_id()?;
        Some(link_core::tracker::slot_start(beacon_time, tracker_id, SLOT_DURATION_US))
    }

    pub fn channels_mut(&mut self) -> &mut ChannelManager<N_CHANNELS> {
        &mut self.channels
    }
}

fn parse_beacon_key(bytes: &[u8]) -> Option<u32> {
    if bytes.len() != link_core::receiver::BEACON_LEN || bytes[0] != 0xBE {
        return None;
    }
    Some(u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]))
}
