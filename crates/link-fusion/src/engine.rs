// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The orientation engine (§4.2): wires the raw-read, gyro noise filter,
//! temperature compensation, auto-calibration, rest detector and fusion
//! stages into the single pipeline invoked at the sensor's data-ready rate.

use crate::calibration::AutoCalibration;
use crate::filter::GyroNoiseFilter;
use crate::fusion::{linear_acceleration, FusionFilter, OrientationFlags};
use crate::rest::RestDetector;
use crate::tempcomp::GyroTempComp;
use link_hal::imu::ImuSample;

#[derive(Debug, Clone, Copy)]
pub struct OrientationOutput {
    pub quat: [f32; 4],
    pub linear_accel_g: [f32; 3],
    pub flags: OrientationFlags,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrientationEngine {
    noise_filter: GyroNoiseFilter,
    temp_comp: GyroTempComp,
    calibration: AutoCalibration,
    rest: RestDetector,
    fusion: FusionFilter,
}

impl OrientationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fusion(&self) -> &FusionFilter {
        &self.fusion
    }

    pub fn fusion_mut(&mut self) -> &mut FusionFilter {
        &mut self.fusion
    }

    pub fn set_temp_comp(&mut self, temp_comp: GyroTempComp) {
        self.temp_comp = temp_comp;
    }

    /// Run one pipeline pass for a fresh IMU sample.
    pub fn update(&mut self, sample: ImuSample, dt: f32) -> OrientationOutput {
        let gyro_filtered = self.noise_filter.push(sample.gyro);
        let gyro_comp = self.temp_comp.correct(gyro_filtered, sample.temp_c);

        let resting = self.rest.update(gyro_comp, sample.accel, dt);
        self.calibration.update(gyro_comp, sample.accel, resting, dt);
        let (gyro_cal, accel_cal) = self.calibration.apply(gyro_comp, sample.accel);

        self.fusion.update(gyro_cal, accel_cal, sample.mag, resting, dt);

        OrientationOutput {
            quat: self.fusion.quat(),
            linear_accel_g: linear_acceleration(self.fusion.quat(), accel_cal),
            flags: self.fusion.flags(),
        }
    }
}
