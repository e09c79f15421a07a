//! Loaders for EuRoC-format CSV recordings.
//!
//! Used to replay real IMU streams and ground-truth odometry through the
//! bridge. Timestamps are nanoseconds in the files and seconds everywhere
//! else.

use std::path::Path;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use nalgebra::{UnitQuaternion, Quaternion, Vector3};

use crate::imu::ImuSample;
use crate::system::messages::OdometrySample;

const NS_TO_S: f64 = 1e-9;

fn open(csv_path: &Path) -> Result<csv::Reader<std::fs::File>> {
    ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .from_path(csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))
}

fn field(rec: &StringRecord, i: usize) -> Result<f64> {
    rec[i]
        .trim()
        .parse()
        .with_context(|| format!("Bad value {:?} in column {}", &rec[i], i))
}

fn vector(rec: &StringRecord, first: usize) -> Result<Vector3<f64>> {
    Ok(Vector3::new(
        field(rec, first)?,
        field(rec, first + 1)?,
        field(rec, first + 2)?,
    ))
}

fn timestamp_s(rec: &StringRecord) -> Result<f64> {
    let ns: u64 = rec[0]
        .trim()
        .parse()
        .with_context(|| format!("Bad timestamp {:?}", &rec[0]))?;
    Ok(ns as f64 * NS_TO_S)
}

/// Read `imu0/data.csv`: `timestamp, w_x, w_y, w_z, a_x, a_y, a_z`.
///
/// Short rows are skipped.
pub fn load_imu_csv(csv_path: impl AsRef<Path>) -> Result<Vec<ImuSample>> {
    let mut rdr = open(csv_path.as_ref())?;

    let mut samples = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 7 {
            continue;
        }
        let gyro = vector(&rec, 1)?;
        let accel = vector(&rec, 4)?;
        samples.push(ImuSample::new(timestamp_s(&rec)?, accel, gyro));
    }
    Ok(samples)
}

/// Read `state_groundtruth_estimate0/data.csv` as an odometry stream.
///
/// Only position and orientation (`q_RS_w` first) are used.
pub fn load_groundtruth_odometry(csv_path: impl AsRef<Path>) -> Result<Vec<OdometrySample>> {
    let mut rdr = open(csv_path.as_ref())?;

    let mut samples = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 8 {
            continue;
        }
        let position = vector(&rec, 1)?;
        let q = Quaternion::new(
            field(&rec, 4)?,
            field(&rec, 5)?,
            field(&rec, 6)?,
            field(&rec, 7)?,
        );
        samples.push(OdometrySample {
            timestamp_s: timestamp_s(&rec)?,
            position,
            orientation: UnitQuaternion::from_quaternion(q),
        });
    }
    Ok(samples)
}
