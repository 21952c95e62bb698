// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Receiver Link (§4.6): master of the superframe. Emits the sync beacon,
//! services the data pipe, and republishes orientation packets as USB HID
//! reports.

use crate::config::LinkConfig;
use crate::roster::Roster;
use link_codec::{decode_wire_frame, Packet, SequenceOutcome};
use link_hal::usb::UsbHid;
use link_hal::LinkError;

/// First byte of every sync beacon (§3).
const BEACON_SYNC_MARKER: u8 = 0xBE;
pub const BEACON_LEN: usize = 21;
pub type BeaconFrame = [u8; BEACON_LEN];

pub type HidReport = [u8; 16];

/// Fixed-capacity, replace-by-tracker-id HID report queue (§4.6 step 3):
/// "when the FIFO already contains a pending packet for the same tracker,
/// replace in place — newest orientation wins."
#[derive(Debug, Clone)]
pub struct HidFifo<const CAP: usize> {
    queue: heapless::Vec<(u8, HidReport), CAP>,
}

impl<const CAP: usize> Default for HidFifo<CAP> {
    fn default() -> Self {
        HidFifo { queue: heapless::Vec::new() }
    }
}

impl<const CAP: usize> HidFifo<CAP> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tracker_id: u8, report: HidReport) {
        if let Some(entry) = self.queue.iter_mut().find(|(id, _)| *id == tracker_id) {
            entry.1 = report;
            return;
        }
        if self.queue.push((tracker_id, report)).is_err() {
            // FIFO saturated (shouldn't happen with CAP=32 and N<=10
            // trackers, each holding at most one pending entry): drop the
            // oldest to make room rather than lose the newest sample.
            self.queue.remove(0);
            let _ = self.queue.push((tracker_id, report));
        }
    }

    pub fn pop(&mut self) -> Option<(u8, HidReport)> {
        if self.queue.is_empty() {
            None
        } else {
            Some(self.queue.remove(0))
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Build the 21-byte sync beacon broadcast at the head of every superframe
/// (§4.6 step 1): `[0xBE, frame_number, ts_low, ts_high, key×4, hop_seq×8,
/// roster_mask×3, reserved]`.
pub fn build_beacon(frame_number: u16, now_ms: u32, network_key: u32, hop_seq: [u8; 8], roster_mask: [u8; 3]) -> BeaconFrame {
    let mut beacon = [0u8; BEACON_LEN];
    beacon[0] = BEACON_SYNC_MARKER;
    beacon[1..3].copy_from_slice(&frame_number.to_le_bytes());
    beacon[3..5].copy_from_slice(&(now_ms as u16).to_le_bytes());
    beacon[5..9].copy_from_slice(&network_key.to_le_bytes());
    beacon[9..17].copy_from_slice(&hop_seq);
    beacon[17..20].copy_from_slice(&roster_mask);
    beacon
}

/// Receiver-side link, generic over the roster's tracker capacity `N` and
/// the HID FIFO's depth `CAP`.
pub struct ReceiverLink<const N: usize, const CAP: usize> {
    roster: Roster<N>,
    hid_fifo: HidFifo<CAP>,
    frame_number: u16,
    network_key: u32,
    last_registration_ms: u32,
    registration_round_robin: u8,
    config: LinkConfig,
}

impl<const N: usize, const CAP: usize> ReceiverLink<N, CAP> {
    pub fn new(network_key: u32, config: LinkConfig) -> Self {
        ReceiverLink {
            roster: Roster::new(),
            hid_fifo: HidFifo::new(),
            frame_number: 0,
            network_key,
            last_registration_ms: 0,
            registration_round_robin: 0,
            config,
        }
    }

    pub fn roster(&self) -> &Roster<N> {
        &self.roster
    }

    pub fn roster_mut(&mut self) -> &mut Roster<N> {
        &mut self.roster
    }

    pub fn frame_number(&self) -> u16 {
        self.frame_number
    }

    /// A bitmask of which tracker ids currently hold a roster entry, for
    /// the beacon's `roster_mask` field (up to 24 trackers across 3 bytes).
    pub fn roster_mask(&self) -> [u8; 3] {
        let mut mask = [0u8; 3];
        for (id, _) in self.roster.iter() {
            let id = id as usize;
            if id < 24 {
                mask[id / 8] |= 1 << (id % 8);
            }
        }
        mask
    }

    /// Step 1: emit the sync beacon, advancing the frame counter.
    pub fn emit_beacon(&mut self, now_ms: u32, hop_seq: [u8; 8]) -> BeaconFrame {
        self.frame_number = self.frame_number.wrapping_add(1);
        build_beacon(self.frame_number, now_ms, self.network_key, hop_seq, self.roster_mask())
    }

    /// Step 3: process one received data-pipe frame. Validates CRC via the
    /// codec, advances the tracker's sequence window, updates its roster
    /// entry, and enqueues a HID report once `detect_count` has crossed the
    /// configured threshold (§8 scenario 3).
    pub fn on_rx_frame(&mut self, raw: &[u8], rssi: i8, now_ms: u32) -> Result<(), LinkError> {
        let (payload, seq) = decode_wire_frame(raw)?;
        let packet = Packet::decode(&payload)?;
        let tracker_id = packet.tracker_id();

        match self.roster.observe_packet(tracker_id, seq.unwrap_or(0), rssi, now_ms) {
            Some(SequenceOutcome::Accepted { .. }) => {
                let detect_count = self.roster.get(tracker_id).map(|e| e.detect_count);
                if let Some(count) = detect_count {
                    if u32::from(count) >= u32::from(self.config.receiver_detect_count_threshold) {
                        self.hid_fifo.push(tracker_id, payload);
                    }
                }
                Ok(())
            }
            Some(SequenceOutcome::Discarded) | None => Ok(()),
        }
    }

    /// Step 4: called once per millisecond. Pops up to
    /// `receiver_reports_per_ms` HID reports; pads with a round-robin
    /// registration report once the FIFO runs dry and the registration
    /// cadence has elapsed.
    pub fn service_usb<U: UsbHid>(&mut self, usb: &mut U, now_ms: u32) -> Result<(), LinkError> {
        for _ in 0..self.config.receiver_reports_per_ms {
            match self.hid_fifo.pop() {
                Some((_, report)) => {
                    usb.write(&report).map_err(|_| LinkError::HalFault)?;
                }
                None => {
                    let elapsed = now_ms.wrapping_sub(self.last_registration_ms);
                    if elapsed >= self.config.receiver_registration_interval_ms {
                        if let Some(report) = self.next_registration_report() {
                            usb.write(&report).map_err(|_| LinkError::HalFault)?;
                            self.last_registration_ms = now_ms;
                        }
                    }
                    break;
                }
            }
        }
        Ok(())
    }

    fn next_registration_report(&mut self) -> Option<HidReport> {
        if self.roster.is_empty() {
            return None;
        }
        for _ in 0..N {
            let id = self.registration_round_robin;
            self.registration_round_robin = self.registration_round_robin.wrapping_add(1) % (N as u8);
            if let Some(entry) = self.roster.get(id) {
                let packet = Packet::Registration(link_codec::packet::RegistrationPacket {
                    tracker_id: id,
                    hw_addr: entry.hw_addr,
                });
                return Some(packet.encode());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use link_codec::packet::QuatAccelCompact;
    use link_codec::{encode_wire_frame, Packet};

    fn sample_frame(tracker_id: u8, seq: u8) -> heapless::Vec<u8, { link_hal::radio::MAX_FRAME_LEN }> {
        let payload = Packet::QuatAccelCompact(QuatAccelCompact {
            tracker_id,
            battery_pct: 90,
            battery_mv_div32: 120,
            temp_c: 25,
            quat7: link_codec::quat::compress_smallest_three([1.0, 0.0, 0.0, 0.0]),
            accel: [0, 0, 10],
            rssi: -50,
        })
        .encode();
        encode_wire_frame(&payload, Some(seq))
    }

    #[test]
    fn hid_fifo_replaces_pending_entries_for_the_same_tracker() {
        let mut fifo: HidFifo<32> = HidFifo::new();
        fifo.push(3, [1u8; 16]);
        fifo.push(5, [2u8; 16]);
        fifo.push(3, [9u8; 16]);
        assert_eq!(fifo.len(), 2);
        assert_eq!(fifo.pop(), Some((3, [9u8; 16])));
        assert_eq!(fifo.pop(), Some((5, [2u8; 16])));
    }

    #[test]
    fn detection_threshold_scenario_from_spec() {
        let mut receiver: ReceiverLink<10, 32> = ReceiverLink::new(0xDEAD_BEEF, LinkConfig::default());
        receiver.roster_mut().allocate([1, 2, 3, 4, 5, 6], 0).unwrap();

        for seq in 1u8..25 {
            receiver.on_rx_frame(&sample_frame(0, seq), -50, 0).unwrap();
            assert!(receiver.hid_fifo.is_empty(), "packet {seq} should not yet produce a HID report");
        }
        receiver.on_rx_frame(&sample_frame(0, 25), -50, 0).unwrap();
        assert_eq!(receiver.hid_fifo.len(), 1, "the 25th packet should produce the first HID report");
    }

    #[test]
    fn packet_replay_scenario_updates_roster_without_double_reporting() {
        let mut receiver: ReceiverLink<10, 32> = ReceiverLink::new(1, LinkConfig::default());
        let id = receiver.roster_mut().allocate([9; 6], 0).unwrap();
        for entry in receiver.roster_mut().get_mut(id) {
            entry.detect_count = 30; // already past the reporting threshold
            entry.last_seq = link_codec::SequenceTracker::new();
        }
        receiver.on_rx_frame(&sample_frame(id, 100), -40, 0).unwrap();
        assert_eq!(receiver.roster().get(id).unwrap().last_seq.last(), 100);

        receiver.on_rx_frame(&sample_frame(id, 50), -40, 0).unwrap();
        assert_eq!(receiver.roster().get(id).unwrap().last_seq.last(), 100, "stale replay must not move the stored sequence");
    }

    #[test]
    fn beacon_header_and_frame_number_advance_each_call() {
        let mut receiver: ReceiverLink<10, 32> = ReceiverLink::new(0x1122_3344, LinkConfig::default());
        let beacon = receiver.emit_beacon(0, [11, 12, 13, 14, 15, 16, 17, 18]);
        assert_eq!(beacon[0], BEACON_SYNC_MARKER);
        assert_eq!(receiver.frame_number(), 1);
        let beacon2 = receiver.emit_beacon(5, [0; 8]);
        assert_ne!(&beacon[1..3], &beacon2[1..3]);
    }
}
