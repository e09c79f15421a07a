//! Reference poses: one `T_global_local` per sub-map.
//!
//! The root sub-map (`init_keyframe_id == 0`) is placed at the configured
//! robot start:
//!
//! ```text
//! T_global_root = T_offset ∘ T_origin
//! ```
//!
//! Every other sub-map hangs off the keyframe it was anchored at, so its
//! reference is chained through the parent:
//!
//! ```text
//! T_global_child = T_global_parent ∘ T_parent_anchor
//! ```
//!
//! Sub-maps are visited in ascending `init_keyframe_id`, which guarantees the
//! parent's reference exists before any child needs it. The whole mapping is
//! rebuilt from scratch each time and published as an immutable snapshot.

use std::collections::HashMap;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::atlas::{AtlasIndex, KeyFrame, KeyFrameId, SubMap, SubMapId};
use crate::geometry::SE3;

/// Which keyframe of the parent a child sub-map is anchored at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorRule {
    /// The keyframe whose id equals the child's `init_keyframe_id`.
    #[default]
    InitKeyframe,
    /// The keyframe with id `init_keyframe_id - 1`, for engines that number a
    /// new sub-map's first keyframe as its init id.
    PrecedingKeyframe,
}

impl AnchorRule {
    pub fn anchor_id(self, sub_map: &SubMap) -> Option<KeyFrameId> {
        match self {
            Self::InitKeyframe => Some(sub_map.init_keyframe_id),
            Self::PrecedingKeyframe => sub_map.init_keyframe_id.0.checked_sub(1).map(KeyFrameId::new),
        }
    }
}

/// Offset of the global frame's origin: robot start, no rotation.
pub fn global_offset(robot_x: f64, robot_y: f64) -> SE3 {
    SE3::from_translation(Vector3::new(robot_x, robot_y, 0.0))
}

/// Mapping sub-map id → `T_global_local`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferencePoses {
    poses: HashMap<SubMapId, SE3>,
}

impl ReferencePoses {
    pub fn get(&self, sub_map: SubMapId) -> Option<&SE3> {
        self.poses.get(&sub_map)
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SubMapId, &SE3)> {
        self.poses.iter()
    }
}

/// Compute the reference pose of every sub-map in `index`.
///
/// A sub-map whose anchor keyframe is unknown, or whose parent has no
/// reference, is left out and logged; transforms for it are skipped later.
pub fn compute_reference_poses(index: &AtlasIndex, offset: &SE3, anchor: AnchorRule) -> ReferencePoses {
    let mut poses: HashMap<SubMapId, SE3> = HashMap::with_capacity(index.num_sub_maps());

    // index.sub_maps() is already sorted by init keyframe id.
    for sub_map in index.sub_maps() {
        if sub_map.is_root() {
            poses.insert(sub_map.id, offset.compose(&sub_map.origin_pose));
            continue;
        }

        let Some(anchor_kf) = anchor.anchor_id(sub_map).and_then(|id| index.keyframe(id)) else {
            warn!(
                "{} anchor keyframe for init {} not found, no reference pose",
                sub_map.id, sub_map.init_keyframe_id
            );
            continue;
        };
        let Some(parent_ref) = poses.get(&anchor_kf.sub_map).copied() else {
            warn!(
                "{} parent {} has no reference pose yet, skipping",
                sub_map.id, anchor_kf.sub_map
            );
            continue;
        };

        debug!(
            "{} anchored at {} in {}",
            sub_map.id, anchor_kf.id, anchor_kf.sub_map
        );
        poses.insert(sub_map.id, parent_ref.compose(&anchor_kf.pose));
    }

    ReferencePoses { poses }
}

/// Immutable view of the atlas together with its reference poses.
///
/// Built once per successful track call and swapped in whole, so readers
/// always see references that match the keyframes they index.
#[derive(Debug, Clone, Default)]
pub struct AtlasSnapshot {
    pub index: AtlasIndex,
    pub references: ReferencePoses,
}

impl AtlasSnapshot {
    pub fn compute(index: AtlasIndex, offset: &SE3, anchor: AnchorRule) -> Self {
        let references = compute_reference_poses(&index, offset, anchor);
        Self { index, references }
    }

    /// Reference pose of the sub-map owning `kf`.
    pub fn reference_of(&self, kf: &KeyFrame) -> Option<&SE3> {
        self.references.get(kf.sub_map)
    }

    pub fn current_reference(&self) -> Option<&SE3> {
        self.index
            .current_sub_map()
            .and_then(|id| self.references.get(id))
    }
}
