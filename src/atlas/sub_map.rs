//! SubMap record as reported by the engine.

use crate::geometry::SE3;

use super::types::{KeyFrameId, SubMapId};

/// One independently originated map inside the engine's atlas.
///
/// The root sub-map has `init_keyframe_id == 0`. Every other sub-map was
/// started after the first one and is anchored to a keyframe of an earlier
/// sub-map through its `init_keyframe_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubMap {
    pub id: SubMapId,

    /// Id of the first keyframe created in this sub-map (0 for the root).
    pub init_keyframe_id: KeyFrameId,

    /// Pose of the sub-map's origin keyframe, in its own local frame.
    pub origin_pose: SE3,
}

impl SubMap {
    pub fn new(id: SubMapId, init_keyframe_id: KeyFrameId, origin_pose: SE3) -> Self {
        Self {
            id,
            init_keyframe_id,
            origin_pose,
        }
    }

    pub fn is_root(&self) -> bool {
        self.init_keyframe_id.0 == 0
    }
}
