use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Single IMU measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    pub timestamp_s: f64,
    /// Linear acceleration (m/s^2).
    pub accel: Vector3<f64>,
    /// Angular rate (rad/s).
    pub gyro: Vector3<f64>,
}

impl ImuSample {
    pub fn new(timestamp_s: f64, accel: Vector3<f64>, gyro: Vector3<f64>) -> Self {
        Self {
            timestamp_s,
            accel,
            gyro,
        }
    }
}
