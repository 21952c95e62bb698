// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Quaternion wire representations: plain Q15 and the 7-byte "smallest
//! three" compression used by the compact data packet (§4.1).

/// Largest magnitude any of the three transmitted components can have: the
/// dropped component is, by construction, the largest of the four, so the
/// other three are each bounded by `1/sqrt(2)`.
const MAX_MAG: f32 = core::f32::consts::FRAC_1_SQRT_2;

const FIELD_BITS: u32 = 18;
const FIELD_MAX: u32 = (1 << FIELD_BITS) - 1;

/// Encode one quaternion component to Q15 fixed point, clamped to `[-1, 1]`.
#[must_use]
pub fn to_q15(value: f32) -> i16 {
    let clamped = value.clamp(-1.0, 1.0);
    let scaled = clamped * 32767.0;
    scaled.round() as i16
}

#[must_use]
pub fn from_q15(value: i16) -> f32 {
    f32::from(value) / 32767.0
}

/// Pack a unit quaternion `[w, x, y, z]` into the 7-byte smallest-three
/// wire format.
///
/// Drops the largest-magnitude component (after flipping the overall sign
/// of `q` so that component is positive — `q` and `-q` are the same
/// rotation, so this loses no information) and transmits the other three
/// plus a 2-bit index of which one was dropped.
#[must_use]
pub fn compress_smallest_three(q: [f32; 4]) -> [u8; 7] {
    let mut largest_idx = 0usize;
    let mut largest_mag = q[0].abs();
    for (i, &c) in q.iter().enumerate().skip(1) {
        if c.abs() > largest_mag {
            largest_mag = c.abs();
            largest_idx = i;
        }
    }

    let sign = if q[largest_idx] < 0.0 { -1.0 } else { 1.0 };

    let mut fields = [0u32; 3];
    let mut field_i = 0;
    for (i, &c) in q.iter().enumerate() {
        if i == largest_idx {
            continue;
        }
        let v = (c * sign).clamp(-MAX_MAG, MAX_MAG);
        let unit = (v + MAX_MAG) / (2.0 * MAX_MAG);
        fields[field_i] = (unit * FIELD_MAX as f32).round() as u32;
        field_i += 1;
    }

    let packed: u64 = ((largest_idx as u64) << 54)
        | ((fields[0] as u64) << 36)
        | ((fields[1] as u64) << 18)
        | (fields[2] as u64);

    let mut out = [0u8; 7];
    // Big-endian, low 56 bits of `packed`.
    for (i, byte) in out.iter_mut().enumerate() {
        let shift = (6 - i) * 8;
        *byte = (packed >> shift) as u8;
    }
    out
}

/// Inverse of [`compress_smallest_three`].
#[must_use]
pub fn decompress_smallest_three(bytes: [u8; 7]) -> [f32; 4] {
    let mut packed: u64 = 0;
    for &b in &bytes {
        packed = (packed << 8) | u64::from(b);
    }

    let dropped_idx = ((packed >> 54) & 0x3) as usize;
    let f0 = ((packed >> 36) & u64::from(FIELD_MAX)) as u32;
    let f1 = ((packed >> 18) & u64::from(FIELD_MAX)) as u32;
    let f2 = (packed & u64::from(FIELD_MAX)) as u32;

    let decode = |code: u32| -> f32 {
        (code as f32 / FIELD_MAX as f32) * (2.0 * MAX_MAG) - MAX_MAG
    };

    let present = [decode(f0), decode(f1), decode(f2)];
    let sum_sq: f32 = present.iter().map(|v| v * v).sum();
    let dropped = libm::sqrtf((1.0 - sum_sq).max(0.0));

    let mut out = [0f32; 4];
    let mut present_i = 0;
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = if i == dropped_idx {
            dropped
        } else {
            let v = present[present_i];
            present_i += 1;
            v
        };
    }
    out
}
