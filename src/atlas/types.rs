//! Core ID types for the atlas records.

use serde::{Deserialize, Serialize};

/// Unique identifier for a KeyFrame, assigned by the engine.
///
/// KeyFrameIds are monotonic across the whole atlas, not per sub-map, so a
/// child sub-map can name the parent keyframe it was anchored at. They serve
/// as lightweight handles for cross-referencing without Arc/Rc, which avoids
/// the keyframe ↔ sub-map back-pointer cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyFrameId(pub u64);

impl KeyFrameId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for KeyFrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KF{}", self.0)
    }
}

/// Identifier of a sub-map inside the engine's atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubMapId(pub u64);

impl SubMapId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SubMapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Map{}", self.0)
    }
}

/// Unique identifier for a MapPoint.
///
/// A MapPoint represents a 3D landmark observed by one or more KeyFrames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapPointId(pub u64);

impl MapPointId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MapPointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MP{}", self.0)
    }
}
