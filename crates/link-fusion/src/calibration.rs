// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Auto-calibration (§4.2 step 4): a running gyro-offset estimate gated by
//! the rest flag, plus an accelerometer scale estimate.

const REST_AVG_SAMPLES: u32 = 200;
const REST_MIN_DURATION_S: f32 = 1.0;
const OFFSET_FOLD_RATE: f32 = 0.001;
const ACCEL_SCALE_RATE: f32 = 0.01;
const ACCEL_SCALE_GATE_G: f32 = 0.1;
/// Decay applied to the motion drift-rate accumulator each sample; not named
/// numerically in the component design, chosen slow enough that it only
/// reflects sustained drift rather than individual motion bursts.
const DRIFT_ACCUM_RATE: f32 = 1e-4;

#[derive(Debug, Clone, Copy)]
pub struct AutoCalibration {
    offset: [f32; 3],
    accel_scale: f32,
    rest_accum: [f32; 3],
    rest_accum_count: u32,
    rest_duration_s: f32,
    drift_rate: [f32; 3],
}

impl Default for AutoCalibration {
    fn default() -> Self {
        AutoCalibration {
            offset: [0.0; 3],
            accel_scale: 1.0,
            rest_accum: [0.0; 3],
            rest_accum_count: 0,
            rest_duration_s: 0.0,
            drift_rate: [0.0; 3],
        }
    }
}

impl AutoCalibration {
    pub fn offset(&self) -> [f32; 3] {
        self.offset
    }

    pub fn accel_scale(&self) -> f32 {
        self.accel_scale
    }

    /// Estimated slow drift rate accumulated while in motion, exposed for
    /// diagnostics; it does not feed back into `offset`.
    pub fn drift_rate(&self) -> [f32; 3] {
        self.drift_rate
    }

    pub fn apply(&self, gyro: [f32; 3], accel: [f32; 3]) -> ([f32; 3], [f32; 3]) {
        let mut corrected_gyro = gyro;
        for i in 0..3 {
            corrected_gyro[i] -= self.offset[i];
        }
        let corrected_accel = accel.map(|c| c * self.accel_scale);
        (corrected_gyro, corrected_accel)
    }

    pub fn update(&mut self, gyro: [f32; 3], accel: [f32; 3], rest: bool, dt: f32) {
        if rest {
            self.rest_duration_s += dt;
            for i in 0..3 {
                self.rest_accum[i] += gyro[i];
            }
            self.rest_accum_count += 1;

            if self.rest_duration_s >= REST_MIN_DURATION_S && self.rest_accum_count >= REST_AVG_SAMPLES {
                for i in 0..3 {
                    let avg = self.rest_accum[i] / self.rest_accum_count as f32;
                    self.offset[i] += OFFSET_FOLD_RATE * (avg - self.offset[i]);
                    self.rest_accum[i] = 0.0;
                }
                self.rest_accum_count = 0;
            }

            let accel_norm = vec3_norm(accel);
            if (accel_norm - 1.0).abs() < ACCEL_SCALE_GATE_G {
                let target_scale = 1.0 / accel_norm;
                self.accel_scale += ACCEL_SCALE_RATE * (target_scale - self.accel_scale);
            }
        } else {
            self.rest_duration_s = 0.0;
            self.rest_accum = [0.0; 3];
            self.rest_accum_count = 0;

            for i in 0..3 {
                let error = gyro[i] - self.offset[i];
                self.drift_rate[i] += DRIFT_ACCUM_RATE * (error - self.drift_rate[i]);
            }
        }
    }
}

fn vec3_norm(v: [f32; 3]) -> f32 {
    libm::sqrtf(v[0] * v[0] + v[1] * v[1] + v[2] * v[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_folds_in_after_enough_rest_samples() {
        let mut cal = AutoCalibration::default();
        let steady_gyro = [0.02, -0.01, 0.005];
        let steady_accel = [0.0, 0.0, 1.0];
        let dt = 1.0 / 200.0;
        for _ in 0..250 {
            cal.update(steady_gyro, steady_accel, true, dt);
        }
        assert!(cal.offset()[0] > 0.0);
        assert!(cal.offset()[0] < steady_gyro[0]);
    }

    #[test]
    fn no_offset_fold_before_one_second_of_rest() {
        let mut cal = AutoCalibration::default();
        let steady_gyro = [0.02, -0.01, 0.005];
        let steady_accel = [0.0, 0.0, 1.0];
        // 200 samples at 400 Hz is only 0.5 s of rest; gate requires 1 s.
        for _ in 0..200 {
            cal.update(steady_gyro, steady_accel, true, 1.0 / 400.0);
        }
        assert_eq!(cal.offset(), [0.0; 3]);
    }

    #[test]
    fn motion_resets_the_rest_accumulator() {
        let mut cal = AutoCalibration::default();
        for _ in 0..199 {
            cal.update([0.02, 0.0, 0.0], [0.0, 0.0, 1.0], true, 1.0 / 200.0);
        }
        cal.update([0.02, 0.0, 0.0], [0.0, 0.0, 1.0], false, 1.0 / 200.0);
        assert_eq!(cal.offset(), [0.0; 3]);
    }
}
