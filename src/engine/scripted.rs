//! In-memory engine that replays a scripted sequence of tracking results.
//!
//! Used by the tests and the demo binary. The atlas contents (sub-maps,
//! keyframes, map points) are set up directly, and every `track` call pops
//! the next [`ScriptedStep`].

use std::collections::VecDeque;

use nalgebra::Vector3;
use tracing::debug;

use crate::atlas::{KeyFrame, KeyFrameId, MapPoint, MapPointId, SubMap, SubMapId};
use crate::geometry::SE3;
use crate::imu::ImuSample;
use crate::tracking::frame::Frame;
use crate::tracking::TrackingState;

use super::{EngineConfig, EngineError, SlamEngine};

/// Landmarks (camera frame) attached to every keyframe the script inserts.
const SCRIPTED_LANDMARKS: [[f64; 3]; 3] = [[0.0, 0.0, 2.0], [0.5, -0.2, 3.0], [-0.4, 0.3, 2.5]];

/// Result of one scripted `track` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptedStep {
    pub state: TrackingState,
    /// Camera pose estimate in the current sub-map's local frame.
    pub pose: SE3,
    pub merge_in_progress: bool,
    /// Insert a keyframe at `pose` into the current sub-map (only when `Ok`).
    pub insert_keyframe: bool,
}

impl ScriptedStep {
    pub fn new(state: TrackingState, pose: SE3) -> Self {
        Self {
            state,
            pose,
            merge_in_progress: false,
            insert_keyframe: false,
        }
    }

    pub fn ok(pose: SE3) -> Self {
        Self::new(TrackingState::Ok, pose)
    }

    pub fn merging(mut self) -> Self {
        self.merge_in_progress = true;
        self
    }

    pub fn with_keyframe(mut self) -> Self {
        self.insert_keyframe = true;
        self
    }
}

#[derive(Debug, Default)]
pub struct ScriptedEngine {
    sub_maps: Vec<SubMap>,
    keyframes: Vec<KeyFrame>,
    current: Option<SubMapId>,
    script: VecDeque<ScriptedStep>,
    state: TrackingState,
    merging: bool,
    /// Merge flag held across steps until cleared.
    forced_merge: bool,
    shut_down: bool,
    track_calls: usize,
    imu_batches: Vec<Vec<ImuSample>>,
    next_map_point_id: u64,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue steps to be returned by subsequent `track` calls.
    pub fn push_steps(&mut self, steps: impl IntoIterator<Item = ScriptedStep>) {
        self.script.extend(steps);
    }

    /// Register a sub-map and make it current.
    pub fn add_sub_map(&mut self, sub_map: SubMap) {
        self.current = Some(sub_map.id);
        self.sub_maps.push(sub_map);
    }

    /// Add a keyframe to the sub-map named by `kf.sub_map`.
    pub fn add_keyframe(&mut self, kf: KeyFrame) {
        self.keyframes.push(kf);
    }

    /// Hold the merge flag up (or release it) regardless of the steps.
    pub fn set_merge_in_progress(&mut self, merging: bool) {
        self.forced_merge = merging;
    }

    /// Fold `from` into `into`, re-expressing its keyframes and points with
    /// `t_into_from` (transform from `from`'s local frame to `into`'s).
    pub fn merge_sub_maps(&mut self, from: SubMapId, into: SubMapId, t_into_from: &SE3) {
        for kf in self.keyframes.iter_mut().filter(|kf| kf.sub_map == from) {
            kf.sub_map = into;
            kf.pose = t_into_from.compose(&kf.pose);
            for mp in &mut kf.map_points {
                mp.position = t_into_from.transform_point(&mp.position);
            }
        }
        self.sub_maps.retain(|m| m.id != from);
        if self.current == Some(from) {
            self.current = Some(into);
        }
        debug!("Merged {} into {}", from, into);
    }

    pub fn next_keyframe_id(&self) -> KeyFrameId {
        let next = self.keyframes.iter().map(|kf| kf.id.0 + 1).max().unwrap_or(0);
        KeyFrameId::new(next)
    }

    pub fn track_calls(&self) -> usize {
        self.track_calls
    }

    /// IMU batches received by `track`, one per call.
    pub fn imu_batches(&self) -> &[Vec<ImuSample>] {
        &self.imu_batches
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn insert_tracked_keyframe(&mut self, pose: SE3, timestamp_s: f64) {
        let Some(sub_map) = self.current else {
            return;
        };
        let mut kf = KeyFrame::new(self.next_keyframe_id(), timestamp_s, pose, sub_map);
        for p_cam in SCRIPTED_LANDMARKS {
            let id = MapPointId::new(self.next_map_point_id);
            self.next_map_point_id += 1;
            let position = pose.transform_point(&Vector3::from(p_cam));
            kf.map_points.push(MapPoint::new(id, position));
        }
        debug!("Scripted engine inserted {} into {}", kf.id, sub_map);
        self.keyframes.push(kf);
    }
}

impl SlamEngine for ScriptedEngine {
    fn create(config: &EngineConfig) -> Result<Self, EngineError> {
        debug!(
            "Creating scripted engine ({}, vocabulary {})",
            config.sensor,
            config.vocabulary_path.display()
        );
        Ok(Self::new())
    }

    fn shutdown(&mut self) {
        self.shut_down = true;
    }

    fn track(&mut self, frame: &Frame, imu: &[ImuSample]) -> Result<SE3, EngineError> {
        if self.shut_down {
            return Err(EngineError::ShutDown);
        }
        let step = self
            .script
            .pop_front()
            .ok_or_else(|| EngineError::Internal("no scripted step left".to_string()))?;

        self.track_calls += 1;
        self.imu_batches.push(imu.to_vec());
        self.state = step.state;
        self.merging = step.merge_in_progress;

        if step.insert_keyframe && step.state.is_ok() {
            self.insert_tracked_keyframe(step.pose, frame.timestamp_s());
        }
        Ok(step.pose)
    }

    fn tracking_state(&self) -> TrackingState {
        self.state
    }

    fn is_merge_in_progress(&self) -> bool {
        self.merging || self.forced_merge
    }

    fn sub_maps(&self) -> Vec<SubMap> {
        self.sub_maps.clone()
    }

    fn keyframes(&self, sub_map: SubMapId) -> Vec<KeyFrame> {
        self.keyframes
            .iter()
            .filter(|kf| kf.sub_map == sub_map)
            .cloned()
            .collect()
    }

    fn current_sub_map(&self) -> Option<SubMapId> {
        self.current
    }
}
