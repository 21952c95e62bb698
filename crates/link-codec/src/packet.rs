// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The data-bearing packet taxonomy (§3/§4.1): a 16-byte payload shared by
//! both the radio wire frame (payload + CRC32 + optional sequence) and the
//! USB HID report (payload only, USB already carries its own integrity).
//!
//! The "registration" type never goes out over the radio — the receiver
//! synthesizes it locally (§4.6) to pad the HID FIFO, so it is only ever a
//! bare 16-byte payload.

use crate::crc::crc32k;
use crate::error::CodecError;
use crate::quat;
use link_hal::radio::{FrameBuf, MAX_FRAME_LEN};

pub const TYPE_INFO: u8 = 0;
pub const TYPE_QUAT_ACCEL_FULL: u8 = 1;
pub const TYPE_QUAT_ACCEL_COMPACT: u8 = 2;
pub const TYPE_STATUS: u8 = 3;
pub const TYPE_QUAT_MAG: u8 = 4;
pub const TYPE_REGISTRATION: u8 = 255;

/// Highest type value accepted as a data packet; `224..254` is reserved.
const TYPE_DATA_MAX: u8 = 223;

pub const PAYLOAD_LEN: usize = 16;
pub type Payload = [u8; PAYLOAD_LEN];

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InfoPacket {
    pub tracker_id: u8,
    pub protocol: u8,
    pub battery_pct: u8,
    /// Battery millivolts, divided by 8 to fit one byte.
    pub battery_mv_div8: u8,
    pub temp_c: i8,
    pub board_id: u8,
    pub mcu_id: u8,
    pub imu_id: u8,
    pub mag_id: u8,
    pub fw_date: u16,
    pub fw_major: u8,
    pub fw_minor: u8,
    pub fw_patch: u8,
    pub rssi: i8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QuatAccelFull {
    pub tracker_id: u8,
    /// Q15 fixed point, `[w, x, y, z]`.
    pub quat: [i16; 4],
    /// 0.01 g per LSB.
    pub accel: [i16; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QuatAccelCompact {
    pub tracker_id: u8,
    pub battery_pct: u8,
    /// Battery millivolts, divided by 32 to fit one byte (compact form).
    pub battery_mv_div32: u8,
    pub temp_c: i8,
    /// Smallest-three packed quaternion, see [`crate::quat`].
    pub quat7: [u8; 7],
    /// 0.1 g per LSB (lower resolution than the full variant).
    pub accel: [i8; 3],
    pub rssi: i8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusPacket {
    pub tracker_id: u8,
    pub server_status: u8,
    pub tracker_flags: u8,
    pub rssi: i8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QuatMag {
    pub tracker_id: u8,
    pub quat: [i16; 4],
    /// microtesla * 10 per LSB.
    pub mag: [i16; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegistrationPacket {
    pub tracker_id: u8,
    pub hw_addr: [u8; 6],
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Packet {
    Info(InfoPacket),
    QuatAccelFull(QuatAccelFull),
    QuatAccelCompact(QuatAccelCompact),
    Status(StatusPacket),
    QuatMag(QuatMag),
    Registration(RegistrationPacket),
}

impl Packet {
    pub fn tracker_id(&self) -> u8 {
        match self {
            Packet::Info(p) => p.tracker_id,
            Packet::QuatAccelFull(p) => p.tracker_id,
            Packet::QuatAccelCompact(p) => p.tracker_id,
            Packet::Status(p) => p.tracker_id,
            Packet::QuatMag(p) => p.tracker_id,
            Packet::Registration(p) => p.tracker_id,
        }
    }

    /// Encode into the shared 16-byte payload (byte 0 is the type tag).
    pub fn encode(&self) -> Payload {
        let mut buf = [0u8; PAYLOAD_LEN];
        match self {
            Packet::Info(p) => {
                buf[0] = TYPE_INFO;
                buf[1] = p.tracker_id;
                buf[2] = p.protocol;
                buf[3] = p.battery_pct;
                buf[4] = p.battery_mv_div8;
                buf[5] = p.temp_c as u8;
                buf[6] = p.board_id;
                buf[7] = p.mcu_id;
                buf[8] = p.imu_id;
                buf[9] = p.mag_id;
                buf[10..12].copy_from_slice(&p.fw_date.to_le_bytes());
                buf[12] = p.fw_major;
                buf[13] = p.fw_minor;
                buf[14] = p.fw_patch;
                buf[15] = p.rssi as u8;
            }
            Packet::QuatAccelFull(p) => {
                buf[0] = TYPE_QUAT_ACCEL_FULL;
                buf[1] = p.tracker_id;
                encode_q15_quat(&mut buf[2..10], p.quat);
                encode_i16_triplet(&mut buf[10..16], p.accel);
            }
            Packet::QuatAccelCompact(p) => {
                buf[0] = TYPE_QUAT_ACCEL_COMPACT;
                buf[1] = p.tracker_id;
                buf[2] = p.battery_pct;
                buf[3] = p.battery_mv_div32;
                buf[4] = p.temp_c as u8;
                buf[5..12].copy_from_slice(&p.quat7);
                buf[12] = p.accel[0] as u8;
                buf[13] = p.accel[1] as u8;
                buf[14] = p.accel[2] as u8;
                buf[15] = p.rssi as u8;
            }
            Packet::Status(p) => {
                buf[0] = TYPE_STATUS;
                buf[1] = p.tracker_id;
                buf[2] = p.server_status;
                buf[3] = p.tracker_flags;
                // buf[4..15] stays reserved/zero.
                buf[15] = p.rssi as u8;
            }
            Packet::QuatMag(p) => {
                buf[0] = TYPE_QUAT_MAG;
                buf[1] = p.tracker_id;
                encode_q15_quat(&mut buf[2..10], p.quat);
                encode_i16_triplet(&mut buf[10..16], p.mag);
            }
            Packet::Registration(p) => {
                buf[0] = TYPE_REGISTRATION;
                buf[1] = p.tracker_id;
                buf[2..8].copy_from_slice(&p.hw_addr);
                // buf[8..16] stays reserved/zero.
            }
        }
        buf
    }

    /// Decode a 16-byte payload. Reserved types (`224..254`) and anything
    /// past `255` that isn't exactly `TYPE_REGISTRATION` are rejected.
    pub fn decode(buf: &Payload) -> Result<Self, CodecError> {
        let ty = buf[0];
        if ty != TYPE_REGISTRATION && ty > TYPE_DATA_MAX {
            return Err(CodecError::UnknownType);
        }
        Ok(match ty {
            TYPE_INFO => Packet::Info(InfoPacket {
                tracker_id: buf[1],
                protocol: buf[2],
                battery_pct: buf[3],
                battery_mv_div8: buf[4],
                temp_c: buf[5] as i8,
                board_id: buf[6],
                mcu_id: buf[7],
                imu_id: buf[8],
                mag_id: buf[9],
                fw_date: u16::from_le_bytes([buf[10], buf[11]]),
                fw_major: buf[12],
                fw_minor: buf[13],
                fw_patch: buf[14],
                rssi: buf[15] as i8,
            }),
            TYPE_QUAT_ACCEL_FULL => Packet::QuatAccelFull(QuatAccelFull {
                tracker_id: buf[1],
                quat: decode_q15_quat(&buf[2..10]),
                accel: decode_i16_triplet(&buf[10..16]),
            }),
            TYPE_QUAT_ACCEL_COMPACT => {
                let mut quat7 = [0u8; 7];
                quat7.copy_from_slice(&buf[5..12]);
                Packet::QuatAccelCompact(QuatAccelCompact {
                    tracker_id: buf[1],
                    battery_pct: buf[2],
                    battery_mv_div32: buf[3],
                    temp_c: buf[4] as i8,
                    quat7,
                    accel: [buf[12] as i8, buf[13] as i8, buf[14] as i8],
                    rssi: buf[15] as i8,
                })
            }
            TYPE_STATUS => Packet::Status(StatusPacket {
                tracker_id: buf[1],
                server_status: buf[2],
                tracker_flags: buf[3],
                rssi: buf[15] as i8,
            }),
            TYPE_QUAT_MAG => Packet::QuatMag(QuatMag {
                tracker_id: buf[1],
                quat: decode_q15_quat(&buf[2..10]),
                mag: decode_i16_triplet(&buf[10..16]),
            }),
            TYPE_REGISTRATION => {
                let mut hw_addr = [0u8; 6];
                hw_addr.copy_from_slice(&buf[2..8]);
                Packet::Registration(RegistrationPacket {
                    tracker_id: buf[1],
                    hw_addr,
                })
            }
            _ => return Err(CodecError::UnknownType),
        })
    }
}

fn encode_q15_quat(out: &mut [u8], quat: [i16; 4]) {
    for (chunk, value) in out.chunks_exact_mut(2).zip(quat.iter()) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
}

fn decode_q15_quat(buf: &[u8]) -> [i16; 4] {
    let mut out = [0i16; 4];
    for (slot, chunk) in out.iter_mut().zip(buf.chunks_exact(2)) {
        *slot = i16::from_le_bytes([chunk[0], chunk[1]]);
    }
    out
}

fn encode_i16_triplet(out: &mut [u8], values: [i16; 3]) {
    for (chunk, value) in out.chunks_exact_mut(2).zip(values.iter()) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
}

fn decode_i16_triplet(buf: &[u8]) -> [i16; 3] {
    let mut out = [0i16; 3];
    for (slot, chunk) in out.iter_mut().zip(buf.chunks_exact(2)) {
        *slot = i16::from_le_bytes([chunk[0], chunk[1]]);
    }
    out
}

/// Encode a quaternion to the Q15 wire format used by the full/mag variants.
pub fn q15_quat_from_floats(q: [f32; 4]) -> [i16; 4] {
    [
        quat::to_q15(q[0]),
        quat::to_q15(q[1]),
        quat::to_q15(q[2]),
        quat::to_q15(q[3]),
    ]
}

pub fn q15_quat_to_floats(q: [i16; 4]) -> [f32; 4] {
    [
        quat::from_q15(q[0]),
        quat::from_q15(q[1]),
        quat::from_q15(q[2]),
        quat::from_q15(q[3]),
    ]
}

/// Wrap a 16-byte payload into an on-air frame: payload + CRC32 + optional
/// sequence byte (§4.1 length policy: total length 16/20/21).
pub fn encode_wire_frame(payload: &Payload, seq: Option<u8>) -> FrameBuf {
    let mut out = FrameBuf::new();
    out.extend_from_slice(payload).expect("payload fits MAX_FRAME_LEN");
    let crc = crc32k::compute(payload);
    out.extend_from_slice(&crc.to_le_bytes()).expect("crc fits MAX_FRAME_LEN");
    if let Some(s) = seq {
        out.push(s).expect("seq byte fits MAX_FRAME_LEN");
    }
    out
}

/// Unwrap an on-air frame, validating length and CRC32.
///
/// Returns the 16-byte payload and the sequence byte, if one was present.
pub fn decode_wire_frame(bytes: &[u8]) -> Result<(Payload, Option<u8>), CodecError> {
    enum Framing {
        /// Bare payload, no CRC (used for HID reports).
        Bare,
        WithCrc,
        WithCrcAndSeq,
    }

    let framing = match bytes.len() {
        PAYLOAD_LEN => Framing::Bare,
        n if n == PAYLOAD_LEN + 4 => Framing::WithCrc,
        n if n == PAYLOAD_LEN + 4 + 1 => Framing::WithCrcAndSeq,
        _ => return Err(CodecError::InvalidLength),
    };

    let mut payload = [0u8; PAYLOAD_LEN];
    payload.copy_from_slice(&bytes[0..PAYLOAD_LEN]);

    if matches!(framing, Framing::Bare) {
        return Ok((payload, None));
    }

    let stored_crc = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    if crc32k::compute(&payload) != stored_crc {
        return Err(CodecError::InvalidCrc);
    }

    let seq = matches!(framing, Framing::WithCrcAndSeq).then(|| bytes[20]);
    Ok((payload, seq))
}

const _: () = assert!(MAX_FRAME_LEN == PAYLOAD_LEN + 4 + 1);
