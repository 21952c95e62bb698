// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pairing Service (§4.7): the discovery-address handshake, `tracker_id`
//! allocation, and network-key negotiation.
//!
//! Carried on a fixed discovery channel/address, never the data pipe, so it
//! shares nothing with the Channel Manager's hop sequence.

use crate::roster::Roster;
use link_codec::crc::crc8;

/// Fixed discovery base address (§4.7/§6).
pub const DISCOVERY_BASE_ADDR: [u8; 4] = [0x62, 0x39, 0x8A, 0xF2];
/// Fixed discovery address prefixes, one per candidate pipe (§4.7/§6).
pub const DISCOVERY_PREFIXES: [u8; 8] = [0xFE, 0xFF, 0x29, 0x27, 0x09, 0x02, 0xB2, 0xD6];
pub const DISCOVERY_CHANNEL: u8 = 2;

const STAGE_REQUEST: u8 = 0;
const STAGE_RESPONSE: u8 = 2;

pub const FRAME_LEN: usize = 8;
pub type DiscoveryFrame = [u8; FRAME_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PairingError {
    /// Frame wasn't 8 bytes, or carried an unrecognized stage.
    Malformed,
    /// CRC8 over the frame's address/payload field didn't match.
    BadCrc,
    /// Address was all-zero; request rejected (§4.7).
    ZeroAddress,
    /// Roster has no free slot.
    OutOfSlots,
}

/// Build the 8-byte pairing request a tracker broadcasts on the discovery
/// pipe: `[crc8(addr), stage=0, addr×6]`.
pub fn build_request(hw_addr: [u8; 6]) -> DiscoveryFrame {
    let mut frame = [0u8; FRAME_LEN];
    frame[1] = STAGE_REQUEST;
    frame[2..8].copy_from_slice(&hw_addr);
    frame[0] = crc8::compute(&hw_addr);
    frame
}

/// Build the 8-byte pairing response a receiver sends back: `[crc8(id,key),
/// stage=2, id, key×4, reserved]`.
fn build_response(tracker_id: u8, network_key: u32) -> DiscoveryFrame {
    let mut frame = [0u8; FRAME_LEN];
    frame[1] = STAGE_RESPONSE;
    frame[2] = tracker_id;
    frame[3..7].copy_from_slice(&network_key.to_le_bytes());
    frame[0] = crc8::compute(&frame[2..8]);
    frame
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingResponse {
    pub tracker_id: u8,
    pub network_key: u32,
}

/// Parse a pairing response frame (tracker side).
pub fn parse_response(frame: &DiscoveryFrame) -> Result<PairingResponse, PairingError> {
    if frame[1] != STAGE_RESPONSE {
        return Err(PairingError::Malformed);
    }
    if crc8::compute(&frame[2..8]) != frame[0] {
        return Err(PairingError::BadCrc);
    }
    Ok(PairingResponse {
        tracker_id: frame[2],
        network_key: u32::from_le_bytes([frame[3], frame[4], frame[5], frame[6]]),
    })
}

/// Receiver-side handler: validates an incoming request and, if it's new
/// and there's room, allocates a `tracker_id` and returns the response
/// frame to transmit. Does not itself persist anything — the caller
/// persists the roster/network key once a response is built (§4.8 says
/// storage is only mutated outside `RUNNING`, which pairing already is).
pub fn handle_request<const N: usize>(
    frame: &DiscoveryFrame,
    roster: &mut Roster<N>,
    network_key: u32,
    now_ms: u32,
) -> Result<DiscoveryFrame, PairingError> {
    if frame[1] != STAGE_REQUEST {
        return Err(PairingError::Malformed);
    }
    if crc8::compute(&frame[2..8]) != frame[0] {
        return Err(PairingError::BadCrc);
    }
    let hw_addr: [u8; 6] = frame[2..8].try_into().unwrap();
    if hw_addr == [0u8; 6] {
        return Err(PairingError::ZeroAddress);
    }

    let tracker_id = match roster.find_by_addr(hw_addr) {
        Some(id) => id,
        None => roster.allocate(hw_addr, now_ms).ok_or(PairingError::OutOfSlots)?,
    };

    Ok(build_response(tracker_id, network_key))
}

/// Pairing-mode expiry: the receiver leaves pairing mode if no request has
/// arrived for `timeout_s` seconds (§4.7, default 60 s).
#[derive(Debug, Clone, Copy)]
pub struct PairingWindow {
    opened_at_ms: u32,
    last_activity_ms: u32,
    timeout_s: u32,
}

impl PairingWindow {
    pub fn open(now_ms: u32, timeout_s: u32) -> Self {
        PairingWindow { opened_at_ms: now_ms, last_activity_ms: now_ms, timeout_s }
    }

    pub fn on_request_received(&mut self, now_ms: u32) {
        self.last_activity_ms = now_ms;
    }

    pub fn is_expired(&self, now_ms: u32) -> bool {
        now_ms.wrapping_sub(self.last_activity_ms) >= self.timeout_s.saturating_mul(1_000)
    }

    pub fn opened_at_ms(&self) -> u32 {
        self.opened_at_ms
    }
}
