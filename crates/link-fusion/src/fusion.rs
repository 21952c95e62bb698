// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The VQF-class fusion core (§4.2 step 5): quaternion predict, accelerometer
//! tilt correction, rest/motion gyro-bias updates, and optional magnetometer
//! yaw correction.

const TAU_ACC_DEFAULT_S: f32 = 3.0;
const TAU_MAG_DEFAULT_S: f32 = 9.0;

const ACCEL_NORM_MIN_G: f32 = 0.5;
const ACCEL_NORM_MAX_G: f32 = 1.5;
/// Nominal accelerometer-correction gain before the adaptive reduction
/// described in §4.2; not given a numeric value there, so chosen as unity
/// and let the `||e|| > 0.1` rule do the scaling down from there.
const ACCEL_CORRECTION_GAIN: f32 = 1.0;
const ACCEL_ERROR_GAIN_KNEE: f32 = 0.1;
const ACCEL_CORRECTION_GAIN_FLOOR: f32 = 0.001;

const REST_BIAS_ALPHA: f32 = 0.01;
const REST_COVARIANCE_SHRINK: f32 = 0.99;

const MOTION_BIAS_ALPHA: [f32; 3] = [1e-4, 1e-4, 1e-5];
const MOTION_BIAS_APPLY_RATE: [f32; 3] = [0.001, 0.001, 0.0001];
const MOTION_BIAS_DECAY: [f32; 3] = [0.99, 0.99, 0.999];
const MOTION_BIAS_LIMIT: f32 = 0.05;

const MAG_DISTURBANCE_THRESHOLD_RAD: f32 = 0.3;
const MAG_DISTURBANCE_GRACE_S: f32 = 2.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OrientationFlags {
    pub rest: bool,
    pub mag_disturbed: bool,
    pub initialized: bool,
}

/// Orientation estimate and its supporting filter state for one tracker.
#[derive(Debug, Clone, Copy)]
pub struct FusionFilter {
    quat: [f32; 4],
    gyro_bias: [f32; 3],
    bias_motion: [f32; 3],
    bias_covariance: [f32; 3],
    accel_lp: [f32; 3],
    mag_ref_inclination: Option<f32>,
    mag_ref_heading: Option<f32>,
    mag_disturbed_time_s: f32,
    flags: OrientationFlags,
}

impl Default for FusionFilter {
    fn default() -> Self {
        FusionFilter {
            quat: [1.0, 0.0, 0.0, 0.0],
            gyro_bias: [0.0; 3],
            bias_motion: [0.0; 3],
            bias_covariance: [1.0; 3],
            accel_lp: [0.0, 0.0, 1.0],
            mag_ref_inclination: None,
            mag_ref_heading: None,
            mag_disturbed_time_s: 0.0,
            flags: OrientationFlags::default(),
        }
    }
}

impl FusionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quat(&self) -> [f32; 4] {
        self.quat
    }

    pub fn gyro_bias(&self) -> [f32; 3] {
        self.gyro_bias
    }

    pub fn flags(&self) -> OrientationFlags {
        self.flags
    }

    /// Force the orientation, e.g. after reloading retained state (§4.8).
    pub fn set_quat(&mut self, quat: [f32; 4]) {
        self.quat = quat_normalize(quat);
        self.flags.initialized = true;
    }

    pub fn reset(&mut self) {
        *self = FusionFilter::default();
    }

    /// One fusion step. `gyro` is bias-corrected rad/s, `accel` is `g`,
    /// `mag` is microtesla if fitted, `rest` comes from [`crate::rest::RestDetector`].
    pub fn update(&mut self, gyro: [f32; 3], accel: [f32; 3], mag: Option<[f32; 3]>, rest: bool, dt: f32) {
        self.flags.initialized = true;
        self.flags.rest = rest;

        let effective_bias = self.gyro_bias;
        let corrected_gyro = [gyro[0] - effective_bias[0], gyro[1] - effective_bias[1], gyro[2] - effective_bias[2]];

        self.predict(corrected_gyro, dt);
        self.accel_correction(accel, dt);

        if rest {
            self.rest_bias_update(gyro);
        } else {
            self.motion_bias_update(gyro);
        }

        if let Some(mag) = mag {
            self.mag_correction(mag, dt);
        }
    }

    fn predict(&mut self, gyro: [f32; 3], dt: f32) {
        let omega_quat = [0.0, gyro[0], gyro[1], gyro[2]];
        let derivative = quat_mul(self.quat, omega_quat);
        let mut next = self.quat;
        for i in 0..4 {
            next[i] += 0.5 * derivative[i] * dt;
        }
        self.quat = quat_normalize(next);
    }

    fn accel_correction(&mut self, accel: [f32; 3], dt: f32) {
        let norm = vec3_norm(accel);
        if !(ACCEL_NORM_MIN_G..=ACCEL_NORM_MAX_G).contains(&norm) || norm <= 0.0 {
            return;
        }
        let unit = [accel[0] / norm, accel[1] / norm, accel[2] / norm];

        let k = 1.0 - libm::expf(-dt / TAU_ACC_DEFAULT_S);
        for i in 0..3 {
            self.accel_lp[i] += k * (unit[i] - self.accel_lp[i]);
        }

        let predicted_gravity = rotate_vector(quat_conjugate(self.quat), [0.0, 0.0, 1.0]);
        let e = cross(self.accel_lp, predicted_gravity);
        let e_norm = vec3_norm(e);

        let gain = if e_norm > ACCEL_ERROR_GAIN_KNEE {
            (ACCEL_CORRECTION_GAIN / (e_norm / ACCEL_ERROR_GAIN_KNEE)).max(ACCEL_CORRECTION_GAIN_FLOOR)
        } else {
            ACCEL_CORRECTION_GAIN
        };

        let correction = [e[0] * gain * dt, e[1] * gain * dt, e[2] * gain * dt];
        self.quat = apply_body_correction(self.quat, correction);
    }

    fn rest_bias_update(&mut self, gyro: [f32; 3]) {
        for i in 0..3 {
            self.gyro_bias[i] += REST_BIAS_ALPHA * (gyro[i] - self.gyro_bias[i]);
            self.bias_covariance[i] *= REST_COVARIANCE_SHRINK;
        }
    }

    fn motion_bias_update(&mut self, gyro: [f32; 3]) {
        for i in 0..3 {
            self.bias_motion[i] += MOTION_BIAS_ALPHA[i] * (gyro[i] - self.bias_motion[i]);
            self.gyro_bias[i] += MOTION_BIAS_APPLY_RATE[i] * self.bias_motion[i];
            self.bias_motion[i] *= MOTION_BIAS_DECAY[i];
            self.bias_motion[i] = self.bias_motion[i].clamp(-MOTION_BIAS_LIMIT, MOTION_BIAS_LIMIT);
        }
    }

    fn mag_correction(&mut self, mag: [f32; 3], dt: f32) {
        let mag_world = rotate_vector(self.quat, mag);
        let horizontal = libm::sqrtf(mag_world[0] * mag_world[0] + mag_world[1] * mag_world[1]);
        let inclination = libm::atan2f(mag_world[2], horizontal);

        let reference = *self.mag_ref_inclination.get_or_insert(inclination);
        let diff = (inclination - reference).abs();

        if diff > MAG_DISTURBANCE_THRESHOLD_RAD {
            self.mag_disturbed_time_s += dt;
            if self.mag_disturbed_time_s < MAG_DISTURBANCE_GRACE_S {
                self.flags.mag_disturbed = true;
                return;
            }
            // Disturbance has persisted long enough to be treated as a
            // legitimate change in the magnetic environment; re-anchor.
            self.mag_ref_inclination = Some(inclination);
            self.mag_disturbed_time_s = 0.0;
            self.flags.mag_disturbed = false;
        } else {
            self.mag_disturbed_time_s = 0.0;
            self.flags.mag_disturbed = false;
        }

        let heading = libm::atan2f(mag_world[1], mag_world[0]);
        let reference_heading = *self.mag_ref_heading.get_or_insert(heading);
        let k = 1.0 - libm::expf(-dt / TAU_MAG_DEFAULT_S);
        self.mag_ref_heading = Some(reference_heading + k * wrap_angle(heading - reference_heading));

        let yaw_error = wrap_angle(heading - reference_heading);
        let half = 0.5 * yaw_error;
        let dq = [libm::cosf(half), 0.0, 0.0, libm::sinf(half)];
        self.quat = quat_normalize(quat_mul(dq, self.quat));
    }
}

fn wrap_angle(angle: f32) -> f32 {
    let two_pi = 2.0 * core::f32::consts::PI;
    let mut a = angle % two_pi;
    if a > core::f32::consts::PI {
        a -= two_pi;
    } else if a < -core::f32::consts::PI {
        a += two_pi;
    }
    a
}

fn vec3_norm(v: [f32; 3]) -> f32 {
    libm::sqrtf(v[0] * v[0] + v[1] * v[1] + v[2] * v[2])
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[1] * b[2] - a[2] * b[1], a[2] * b[0] - a[0] * b[2], a[0] * b[1] - a[1] * b[0]]
}

fn quat_normalize(q: [f32; 4]) -> [f32; 4] {
    let norm = libm::sqrtf(q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]);
    if norm <= 0.0 {
        return [1.0, 0.0, 0.0, 0.0];
    }
    [q[0] / norm, q[1] / norm, q[2] / norm, q[3] / norm]
}

fn quat_conjugate(q: [f32; 4]) -> [f32; 4] {
    [q[0], -q[1], -q[2], -q[3]]
}

fn quat_mul(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    [
        a[0] * b[0] - a[1] * b[1] - a[2] * b[2] - a[3] * b[3],
        a[0] * b[1] + a[1] * b[0] + a[2] * b[3] - a[3] * b[2],
        a[0] * b[2] - a[1] * b[3] + a[2] * b[0] + a[3] * b[1],
        a[0] * b[3] + a[1] * b[2] - a[2] * b[1] + a[3] * b[0],
    ]
}

fn rotate_vector(q: [f32; 4], v: [f32; 3]) -> [f32; 3] {
    let vq = [0.0, v[0], v[1], v[2]];
    let rotated = quat_mul(quat_mul(q, vq), quat_conjugate(q));
    [rotated[1], rotated[2], rotated[3]]
}

/// Apply a small-angle correction expressed in the body frame, right-multiplying
/// so the rotation composes after the current attitude.
fn apply_body_correction(q: [f32; 4], correction: [f32; 3]) -> [f32; 4] {
    let dq = [1.0, 0.5 * correction[0], 0.5 * correction[1], 0.5 * correction[2]];
    quat_normalize(quat_mul(q, dq))
}

/// Subtract the current orientation's gravity estimate from a raw
/// accelerometer reading, yielding linear (non-gravity) acceleration
/// (§4.2 step 7).
pub fn linear_acceleration(quat: [f32; 4], accel_g: [f32; 3]) -> [f32; 3] {
    let gravity = rotate_vector(quat_conjugate(quat), [0.0, 0.0, 1.0]);
    [accel_g[0] - gravity[0], accel_g[1] - gravity[1], accel_g[2] - gravity[2]]
}
