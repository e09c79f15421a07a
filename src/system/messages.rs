//! Record types handed to the application layer.
//!
//! These mirror the shapes a downstream robot stack consumes (stamped poses,
//! a pose graph, per-keyframe point clouds, a stamped transform). Encoding
//! them onto a wire is left to the caller.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::atlas::KeyFrameId;
use crate::geometry::SE3;

/// A pose in a named frame at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseStamped {
    pub frame_id: String,
    pub timestamp_s: f64,
    pub pose: SE3,
}

/// A map point in the global frame, single precision like a point cloud.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vector3<f64>> for GlobalPoint {
    fn from(p: Vector3<f64>) -> Self {
        Self {
            x: p.x as f32,
            y: p.y as f32,
            z: p.z as f32,
        }
    }
}

impl From<GlobalPoint> for Vector3<f64> {
    fn from(p: GlobalPoint) -> Self {
        Vector3::new(p.x as f64, p.y as f64, p.z as f64)
    }
}

/// Keyframe poses in the global frame.
///
/// `poses[i]` belongs to keyframe `ids[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseGraph {
    pub ids: Vec<KeyFrameId>,
    pub poses: Vec<PoseStamped>,
}

impl PoseGraph {
    pub fn push(&mut self, id: KeyFrameId, pose: PoseStamped) {
        self.ids.push(id);
        self.poses.push(pose);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyFrameId, &PoseStamped)> {
        self.ids.iter().copied().zip(self.poses.iter())
    }
}

/// Valid map points observed by one keyframe, in the global frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFramePoints {
    pub id: KeyFrameId,
    pub points: Vec<GlobalPoint>,
}

/// Result of a map data export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapData {
    pub frame_id: String,
    pub graph: PoseGraph,
    pub nodes: Vec<KeyFramePoints>,
}

/// Latest camera pose in the global frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedPose {
    pub timestamp_s: f64,
    pub pose: SE3,
}

/// One odometry reading in the odometry frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdometrySample {
    pub timestamp_s: f64,
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl OdometrySample {
    pub fn pose(&self) -> SE3 {
        SE3 {
            rotation: self.orientation,
            translation: self.position,
        }
    }
}

/// Transform between two named frames, valid at `timestamp_s`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStamped {
    pub timestamp_s: f64,
    pub frame_id: String,
    pub child_frame_id: String,
    pub transform: SE3,
}
