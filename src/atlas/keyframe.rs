//! KeyFrame and MapPoint records as reported by the engine.
//!
//! These are plain-data copies taken while the engine is locked; nothing here
//! points back into the engine. Poses and positions are expressed in the
//! owning sub-map's local frame.

use nalgebra::Vector3;

use crate::geometry::SE3;

use super::types::{KeyFrameId, MapPointId, SubMapId};

/// A 3D landmark observed by a KeyFrame.
#[derive(Debug, Clone, PartialEq)]
pub struct MapPoint {
    pub id: MapPointId,

    /// Position in the owning sub-map's local frame.
    pub position: Vector3<f64>,

    /// Whether the engine has marked this point as bad (to be removed).
    pub is_bad: bool,
}

impl MapPoint {
    pub fn new(id: MapPointId, position: Vector3<f64>) -> Self {
        Self {
            id,
            position,
            is_bad: false,
        }
    }

    /// Builder-style helper for marking a point bad.
    pub fn bad(mut self) -> Self {
        self.is_bad = true;
        self
    }
}

/// A KeyFrame in the engine's atlas.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyFrame {
    pub id: KeyFrameId,

    /// Capture time in seconds.
    pub timestamp_s: f64,

    /// Pose: transform from camera to sub-map local frame (T_local_cam).
    pub pose: SE3,

    /// Sub-map that owns this KeyFrame.
    pub sub_map: SubMapId,

    /// Map points observed by this KeyFrame, bad ones included.
    pub map_points: Vec<MapPoint>,
}

impl KeyFrame {
    pub fn new(id: KeyFrameId, timestamp_s: f64, pose: SE3, sub_map: SubMapId) -> Self {
        Self {
            id,
            timestamp_s,
            pose,
            sub_map,
            map_points: Vec::new(),
        }
    }

    /// Map points not marked as bad.
    pub fn good_map_points(&self) -> impl Iterator<Item = &MapPoint> {
        self.map_points.iter().filter(|mp| !mp.is_bad)
    }
}
