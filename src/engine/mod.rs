//! Capability interface of the external SLAM engine.
//!
//! The bridge never touches the engine's internals. Everything it needs
//! (tracking, the merge flag, and enumeration of sub-maps and keyframes) goes
//! through [`SlamEngine`], which lets tests substitute [`ScriptedEngine`] for
//! the real thing.

pub mod scripted;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::atlas::{KeyFrame, SubMap, SubMapId};
use crate::geometry::SE3;
use crate::imu::ImuSample;
use crate::tracking::frame::Frame;
use crate::tracking::TrackingState;

pub use scripted::{ScriptedEngine, ScriptedStep};

/// Camera (and IMU) configuration the engine runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorMode {
    Monocular,
    MonocularInertial,
    Stereo,
    StereoInertial,
    Rgbd,
    RgbdInertial,
}

impl SensorMode {
    pub fn is_inertial(self) -> bool {
        matches!(
            self,
            Self::MonocularInertial | Self::StereoInertial | Self::RgbdInertial
        )
    }

    pub fn is_rgbd(self) -> bool {
        matches!(self, Self::Rgbd | Self::RgbdInertial)
    }

    pub fn is_stereo(self) -> bool {
        matches!(self, Self::Stereo | Self::StereoInertial)
    }

    /// Name of the second image a frame must carry, if any.
    pub fn secondary_image(self) -> Option<&'static str> {
        if self.is_rgbd() {
            Some("depth")
        } else if self.is_stereo() {
            Some("right")
        } else {
            None
        }
    }
}

impl fmt::Display for SensorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Monocular => "monocular",
            Self::MonocularInertial => "monocular-inertial",
            Self::Stereo => "stereo",
            Self::StereoInertial => "stereo-inertial",
            Self::Rgbd => "rgb-d",
            Self::RgbdInertial => "rgb-d-inertial",
        };
        f.write_str(s)
    }
}

/// Parameters used to construct an engine instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub vocabulary_path: PathBuf,
    pub settings_path: PathBuf,
    pub sensor: SensorMode,
    pub enable_viewer: bool,
}

/// Failures raised by the engine itself. The bridge does not recover from
/// these; they are returned to the caller unchanged.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load vocabulary from {path}: {reason}")]
    Vocabulary { path: PathBuf, reason: String },
    #[error("failed to load settings from {path}: {reason}")]
    Settings { path: PathBuf, reason: String },
    #[error("engine has been shut down")]
    ShutDown,
    #[error("engine failure: {0}")]
    Internal(String),
}

/// Everything the bridge consumes from a SLAM engine.
///
/// Poses are reported in the owning sub-map's local frame as `T_local_cam`.
pub trait SlamEngine {
    /// Construct and start an engine.
    fn create(config: &EngineConfig) -> Result<Self, EngineError>
    where
        Self: Sized;

    /// Stop all engine threads. Called at most once.
    fn shutdown(&mut self);

    /// Track one frame with the IMU samples collected since the previous one.
    ///
    /// Returns the camera pose estimate in the current sub-map's local frame.
    fn track(&mut self, frame: &Frame, imu: &[ImuSample]) -> Result<SE3, EngineError>;

    /// State after the last `track` call.
    fn tracking_state(&self) -> TrackingState;

    /// Whether a sub-map merge is under way.
    fn is_merge_in_progress(&self) -> bool;

    /// Every sub-map the engine has created and not yet merged away.
    fn sub_maps(&self) -> Vec<SubMap>;

    /// KeyFrames of one sub-map, in engine order.
    fn keyframes(&self, sub_map: SubMapId) -> Vec<KeyFrame>;

    /// The sub-map tracking currently operates in.
    fn current_sub_map(&self) -> Option<SubMapId>;
}
