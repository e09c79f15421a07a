//! Dataset loaders.

pub mod euroc;

pub use euroc::{load_groundtruth_odometry, load_imu_csv};
