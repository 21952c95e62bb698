// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wire packet codec for the motion-link protocol: CRC integrity, the
//! smallest-three/Q15 quaternion encodings, the 16-byte payload taxonomy, and
//! per-tracker sequence-window bookkeeping.
//!
//! This crate only knows how to turn bytes into typed packets and back; it
//! has no opinion about transports (radio vs. USB HID) or scheduling, which
//! live in `link-radio` and `link-core` respectively.

#![cfg_attr(not(test), no_std)]

pub mod crc;
pub mod error;
pub mod packet;
pub mod quat;
pub mod sequence;

pub use error::CodecError;
pub use packet::{decode_wire_frame, encode_wire_frame, Packet, Payload, PAYLOAD_LEN};
pub use sequence::{SequenceOutcome, SequenceTracker};

pub use link_hal::radio::MAX_FRAME_LEN;
