//! AtlasIndex - id-based view over every sub-map and keyframe the engine knows.
//!
//! The engine's own structures link keyframes to their sub-map and back. The
//! index flattens that into two lookups (keyframe id → keyframe, sub-map id →
//! sub-map) built in one pass, so nothing holds a live pointer into the
//! engine once the lock is released.

use std::collections::HashMap;

use tracing::warn;

use crate::engine::SlamEngine;

use super::keyframe::KeyFrame;
use super::sub_map::SubMap;
use super::types::{KeyFrameId, SubMapId};

#[derive(Debug, Clone, Default)]
pub struct AtlasIndex {
    /// Sub-maps sorted ascending by `init_keyframe_id`.
    sub_maps: Vec<SubMap>,
    sub_map_pos: HashMap<SubMapId, usize>,
    /// Every keyframe, in insertion order.
    keyframes: Vec<KeyFrame>,
    keyframe_pos: HashMap<KeyFrameId, usize>,
    /// KeyFrame ids per sub-map, in engine order.
    members: HashMap<SubMapId, Vec<KeyFrameId>>,
    current: Option<SubMapId>,
}

impl AtlasIndex {
    /// Enumerate the engine's atlas.
    pub fn from_engine<E: SlamEngine + ?Sized>(engine: &E) -> Self {
        let sub_maps = engine.sub_maps();
        let keyframes: Vec<(SubMapId, Vec<KeyFrame>)> =
            sub_maps.iter().map(|m| (m.id, engine.keyframes(m.id))).collect();
        Self::build(sub_maps, keyframes, engine.current_sub_map())
    }

    /// Build from already enumerated records.
    ///
    /// `keyframes` pairs each sub-map id with that sub-map's keyframes in
    /// engine order.
    pub fn build(
        mut sub_maps: Vec<SubMap>,
        keyframes: Vec<(SubMapId, Vec<KeyFrame>)>,
        current: Option<SubMapId>,
    ) -> Self {
        // Stable: sub-maps sharing an init id keep engine order.
        sub_maps.sort_by_key(|m| m.init_keyframe_id);

        let sub_map_pos = sub_maps
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id, i))
            .collect::<HashMap<_, _>>();

        let mut by_sub_map: HashMap<SubMapId, Vec<KeyFrame>> = keyframes.into_iter().collect();

        let mut index = Self {
            sub_maps: Vec::new(),
            sub_map_pos,
            keyframes: Vec::new(),
            keyframe_pos: HashMap::new(),
            members: HashMap::new(),
            current,
        };

        // Keyframes are inserted following the sorted sub-map order.
        for sub_map in &sub_maps {
            let kfs = by_sub_map.remove(&sub_map.id).unwrap_or_default();
            let mut ids = Vec::with_capacity(kfs.len());
            for kf in kfs {
                let id = kf.id;
                match index.keyframe_pos.get(&id) {
                    Some(&pos) => {
                        warn!("{} reported twice, keeping the copy from {}", id, kf.sub_map);
                        for members in index.members.values_mut() {
                            members.retain(|&m| m != id);
                        }
                        ids.retain(|&m| m != id);
                        index.keyframes[pos] = kf;
                    }
                    None => {
                        index.keyframe_pos.insert(id, index.keyframes.len());
                        index.keyframes.push(kf);
                    }
                }
                ids.push(id);
            }
            index.members.insert(sub_map.id, ids);
        }
        index.sub_maps = sub_maps;
        index
    }

    /// Sub-maps in ascending `init_keyframe_id` order.
    pub fn sub_maps(&self) -> &[SubMap] {
        &self.sub_maps
    }

    pub fn sub_map(&self, id: SubMapId) -> Option<&SubMap> {
        self.sub_map_pos.get(&id).map(|&i| &self.sub_maps[i])
    }

    /// Every keyframe in insertion order.
    pub fn keyframes(&self) -> &[KeyFrame] {
        &self.keyframes
    }

    pub fn keyframe(&self, id: KeyFrameId) -> Option<&KeyFrame> {
        self.keyframe_pos.get(&id).map(|&i| &self.keyframes[i])
    }

    /// KeyFrames owned by `sub_map`, in engine order.
    pub fn keyframes_of(&self, sub_map: SubMapId) -> impl Iterator<Item = &KeyFrame> {
        self.members
            .get(&sub_map)
            .into_iter()
            .flatten()
            .filter_map(|id| self.keyframe(*id))
    }

    pub fn current_sub_map(&self) -> Option<SubMapId> {
        self.current
    }

    pub fn num_keyframes(&self) -> usize {
        self.keyframes.len()
    }

    pub fn num_sub_maps(&self) -> usize {
        self.sub_maps.len()
    }
}
