//! AtlasBridge - main entry point of the crate.
//!
//! The `AtlasBridge` owns the engine and the shared state. Any number of
//! threads may call into it concurrently: an IMU driver pushing samples, one
//! thread tracking frames, and others exporting the map or asking for the
//! map→odom transform.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::atlas::{AtlasIndex, KeyFrameId};
use crate::engine::{EngineError, SlamEngine};
use crate::export;
use crate::geometry::SE3;
use crate::imu::ImuSample;
use crate::reference::AtlasSnapshot;
use crate::tracking::frame::{Frame, FrameInput};
use crate::tracking::result::{FrameOutcome, Rejection};
use crate::tracking::TrackingState;
use crate::transform::transform_pose;

use super::config::BridgeConfig;
use super::messages::{GlobalPoint, MapData, OdometrySample, TrackedPose, TransformStamped};
use super::odom::map_to_odom;
use super::shared_state::SharedState;

pub struct AtlasBridge<E: SlamEngine> {
    config: BridgeConfig,

    /// `T_global_offset`, fixed at construction.
    offset: SE3,

    /// Held only while tracking a frame and enumerating the atlas.
    engine: Mutex<E>,

    shared: Arc<SharedState>,
}

impl<E: SlamEngine> AtlasBridge<E> {
    /// Create the engine described by `config` and wrap it.
    pub fn new(config: BridgeConfig) -> Result<Self, EngineError> {
        info!(
            "Starting {} engine (vocabulary {}, settings {})",
            config.sensor,
            config.vocabulary_path.display(),
            config.settings_path.display()
        );
        let engine = E::create(&config.engine_config())?;
        Ok(Self::with_engine(config, engine))
    }

    /// Wrap an engine that was created elsewhere.
    pub fn with_engine(config: BridgeConfig, engine: E) -> Self {
        let offset = config.global_offset();
        Self {
            config,
            offset,
            engine: Mutex::new(engine),
            shared: SharedState::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Direct access to the engine. Blocks tracking while held.
    pub fn lock_engine(&self) -> MutexGuard<'_, E> {
        self.engine.lock()
    }

    /// Queue an IMU sample for the next frame.
    pub fn submit_imu(&self, sample: ImuSample) {
        self.shared.imu.push(sample);
    }

    /// Track one frame and, on success, publish its global pose.
    ///
    /// Only engine failures are returned as `Err`. Every other reason a frame
    /// is not published comes back as [`FrameOutcome::Rejected`] with shared
    /// state untouched.
    pub fn track_frame(&self, input: FrameInput, use_inertial: bool) -> Result<FrameOutcome, EngineError> {
        if self.shared.is_shutdown_requested() {
            return Err(EngineError::ShutDown);
        }

        let frame = match Frame::from_input(input, self.config.sensor) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping frame: {}", e);
                return Ok(FrameOutcome::Rejected(Rejection::Conversion(e)));
            }
        };

        let imu = if use_inertial && self.config.sensor.is_inertial() {
            let batch = self.shared.imu.drain_until(frame.imu_cutoff_s());
            if batch.is_empty() {
                debug!("No IMU samples up to t={:.6}, skipping frame", frame.imu_cutoff_s());
                return Ok(FrameOutcome::Rejected(Rejection::MissingInertial));
            }
            batch
        } else {
            if use_inertial {
                debug!("Inertial tracking requested for {} sensor, ignoring IMU", self.config.sensor);
            }
            Vec::new()
        };

        let mut engine = self.engine.lock();
        let estimate = engine.track(&frame, &imu)?;

        // References are about to be rewritten by the merge; publish nothing.
        if engine.is_merge_in_progress() {
            info!("Waiting for merge to finish");
            return Ok(FrameOutcome::Rejected(Rejection::MergeInProgress));
        }

        match engine.tracking_state() {
            TrackingState::Ok => {}
            state @ (TrackingState::NoImagesYet | TrackingState::NotInitialized | TrackingState::Lost) => {
                warn!("SLAM failed: {}", state.advisory());
                return Ok(FrameOutcome::Rejected(Rejection::Tracking(state)));
            }
        }

        // A shutdown that arrived during the engine call wins over this frame.
        if self.shared.is_shutdown_requested() {
            return Err(EngineError::ShutDown);
        }

        // The engine guard is held until publish returns, so publishes from
        // several tracking threads land in engine call order.
        let index = AtlasIndex::from_engine(&*engine);
        let snapshot = AtlasSnapshot::compute(index, &self.offset, self.config.anchor);
        let Some(reference) = snapshot.current_reference().copied() else {
            warn!("Current sub-map has no reference pose, pose not published");
            self.shared.publish(snapshot, None);
            drop(engine);
            return Ok(FrameOutcome::Rejected(Rejection::NoReference));
        };

        let tracked = TrackedPose {
            timestamp_s: frame.timestamp_s(),
            pose: transform_pose(&reference, &estimate),
        };
        debug!(
            "Tracked t={:.6} at [{:.3}, {:.3}, {:.3}] ({} sub-maps, {} keyframes)",
            tracked.timestamp_s,
            tracked.pose.translation.x,
            tracked.pose.translation.y,
            tracked.pose.translation.z,
            snapshot.index.num_sub_maps(),
            snapshot.index.num_keyframes()
        );
        self.shared.publish(snapshot, Some(tracked));
        drop(engine);
        Ok(FrameOutcome::Tracked(tracked))
    }

    /// Latest global camera pose, if any frame has been tracked.
    pub fn tracked_pose(&self) -> Option<TrackedPose> {
        self.shared.tracked_pose()
    }

    /// Latest published atlas snapshot.
    pub fn snapshot(&self) -> Arc<AtlasSnapshot> {
        self.shared.snapshot()
    }

    /// Pose graph (all sub-maps or only the current one) plus the point
    /// clouds of `point_keyframes` when `include_points` is set.
    pub fn export_map_data(
        &self,
        current_map_only: bool,
        include_points: bool,
        point_keyframes: &[KeyFrameId],
    ) -> MapData {
        let snapshot = self.shared.snapshot();
        export::export_map_data(
            &snapshot,
            current_map_only,
            include_points,
            point_keyframes,
            &self.config.global_frame,
        )
    }

    /// Every valid point of the current sub-map, in the global frame.
    pub fn export_current_map_point_cloud(&self) -> Vec<GlobalPoint> {
        export::current_map_point_cloud(&self.shared.snapshot())
    }

    /// Transform from the global frame to the odometry frame, or `None`
    /// before the first successful track.
    pub fn compute_map_to_odom(&self, odom: &OdometrySample) -> Option<TransformStamped> {
        let tracked = self.shared.tracked_pose()?;
        Some(map_to_odom(
            &tracked,
            odom,
            self.config.tf_padding_s,
            &self.config.global_frame,
            &self.config.odom_frame,
        ))
    }

    /// Shut the engine down and drop all published state. Idempotent.
    pub fn shutdown(&self) {
        if !self.shared.request_shutdown() {
            return;
        }
        info!("Shutting down SLAM engine");
        let mut engine = self.engine.lock();
        engine.shutdown();
        self.shared.clear();
    }
}

impl<E: SlamEngine> Drop for AtlasBridge<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{KeyFrame, MapPoint, MapPointId, SubMap, SubMapId};
    use crate::engine::{ScriptedEngine, ScriptedStep, SensorMode};
    use crate::tracking::frame::{Encoding, ImageMsg};
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};

    const A: SubMapId = SubMapId(0);
    const B: SubMapId = SubMapId(1);

    fn config(sensor: SensorMode) -> BridgeConfig {
        BridgeConfig {
            sensor,
            ..BridgeConfig::default()
        }
    }

    fn mono(t: f64) -> FrameInput {
        FrameInput::mono(ImageMsg::packed(t, 2, 2, Encoding::Mono8, vec![0; 4]))
    }

    fn rgbd(t_rgb: f64, t_depth: f64) -> FrameInput {
        FrameInput::rgbd(
            ImageMsg::packed(t_rgb, 2, 2, Encoding::Rgb8, vec![0; 12]),
            ImageMsg::packed(t_depth, 2, 2, Encoding::Depth16, vec![0; 8]),
        )
    }

    fn translation(x: f64, y: f64, z: f64) -> SE3 {
        SE3::from_translation(Vector3::new(x, y, z))
    }

    /// Root sub-map with a single keyframe at the origin.
    fn engine_with_root() -> ScriptedEngine {
        let mut engine = ScriptedEngine::new();
        engine.add_sub_map(SubMap::new(A, KeyFrameId::new(0), SE3::identity()));
        engine.add_keyframe(KeyFrame::new(KeyFrameId::new(0), 0.0, SE3::identity(), A));
        engine
    }

    fn imu(t: f64) -> ImuSample {
        ImuSample::new(t, Vector3::new(0.0, 0.0, 9.81), Vector3::zeros())
    }

    #[test]
    fn test_state_sequence_gates_output() {
        let mut engine = engine_with_root();
        engine.push_steps([
            ScriptedStep::new(TrackingState::NotInitialized, translation(9.0, 9.0, 9.0)),
            ScriptedStep::ok(translation(1.0, 0.0, 0.0)),
            ScriptedStep::new(TrackingState::Lost, translation(7.0, 7.0, 7.0)),
            ScriptedStep::ok(translation(2.0, 0.0, 0.0)),
        ]);
        let bridge = AtlasBridge::with_engine(config(SensorMode::Monocular), engine);

        let mut results = Vec::new();
        let mut poses = Vec::new();
        for i in 0..4 {
            let outcome = bridge.track_frame(mono(i as f64), false).unwrap();
            results.push(outcome.is_tracked());
            poses.push(bridge.tracked_pose().map(|p| p.pose.translation.x));
        }

        assert_eq!(results, vec![false, true, false, true]);
        assert_eq!(poses, vec![None, Some(1.0), Some(1.0), Some(2.0)]);
    }

    #[test]
    fn test_advisory_carries_state() {
        let mut engine = engine_with_root();
        engine.push_steps([ScriptedStep::new(TrackingState::NoImagesYet, SE3::identity())]);
        let bridge = AtlasBridge::with_engine(config(SensorMode::Monocular), engine);

        let outcome = bridge.track_frame(mono(0.0), false).unwrap();
        assert_eq!(
            outcome.rejection(),
            Some(&Rejection::Tracking(TrackingState::NoImagesYet))
        );
    }

    #[test]
    fn test_merge_in_progress_keeps_previous_pose() {
        let mut engine = engine_with_root();
        engine.push_steps([
            ScriptedStep::ok(translation(1.0, 0.0, 0.0)),
            ScriptedStep::ok(translation(50.0, 0.0, 0.0)).merging(),
        ]);
        let bridge = AtlasBridge::with_engine(config(SensorMode::Monocular), engine);

        assert!(bridge.track_frame(mono(0.0), false).unwrap().is_tracked());
        let before = bridge.tracked_pose();
        let snapshot_before = bridge.snapshot();

        let outcome = bridge.track_frame(mono(1.0), false).unwrap();
        assert_eq!(outcome, FrameOutcome::Rejected(Rejection::MergeInProgress));
        assert_eq!(bridge.tracked_pose(), before);
        assert!(Arc::ptr_eq(&snapshot_before, &bridge.snapshot()));
    }

    #[test]
    fn test_live_pose_is_in_global_frame() {
        let mut engine = engine_with_root();
        engine.push_steps([ScriptedStep::ok(translation(1.0, 0.0, 0.0))]);
        let cfg = BridgeConfig {
            robot_x: 2.0,
            robot_y: 3.0,
            ..config(SensorMode::Monocular)
        };
        let bridge = AtlasBridge::with_engine(cfg, engine);

        let outcome = bridge.track_frame(mono(4.0), false).unwrap();
        let pose = outcome.pose().unwrap();
        assert_eq!(pose.timestamp_s, 4.0);
        assert_relative_eq!(pose.pose.translation, Vector3::new(3.0, 3.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_two_sub_map_scenario() {
        let mut engine = ScriptedEngine::new();
        engine.add_sub_map(SubMap::new(A, KeyFrameId::new(0), SE3::identity()));
        for i in 0..5 {
            engine.add_keyframe(KeyFrame::new(KeyFrameId::new(i), i as f64, SE3::identity(), A));
        }
        engine.add_keyframe(KeyFrame::new(KeyFrameId::new(5), 5.0, translation(1.0, 0.0, 0.0), A));

        engine.add_sub_map(SubMap::new(B, KeyFrameId::new(5), SE3::identity()));
        let mut kf6 = KeyFrame::new(KeyFrameId::new(6), 6.0, SE3::identity(), B);
        kf6.map_points.push(MapPoint::new(MapPointId::new(0), Vector3::new(0.0, 0.0, 1.0)));
        kf6.map_points
            .push(MapPoint::new(MapPointId::new(1), Vector3::new(5.0, 5.0, 5.0)).bad());
        engine.add_keyframe(kf6);
        engine.push_steps([ScriptedStep::ok(SE3::identity())]);

        let bridge = AtlasBridge::with_engine(config(SensorMode::Monocular), engine);
        bridge.track_frame(mono(7.0), false).unwrap();

        let snapshot = bridge.snapshot();
        assert_eq!(snapshot.references.get(A), Some(&SE3::identity()));
        assert_relative_eq!(
            snapshot.references.get(B).unwrap().translation,
            Vector3::new(1.0, 0.0, 0.0),
            epsilon = 1e-12
        );

        let data = bridge.export_map_data(true, true, &[KeyFrameId::new(6), KeyFrameId::new(42)]);
        assert_eq!(data.graph.ids, vec![KeyFrameId::new(6)]);
        assert_eq!(data.nodes.len(), 1);
        assert_eq!(data.nodes[0].points, vec![GlobalPoint { x: 1.0, y: 0.0, z: 1.0 }]);

        let cloud = bridge.export_current_map_point_cloud();
        assert_eq!(cloud, vec![GlobalPoint { x: 1.0, y: 0.0, z: 1.0 }]);

        let all = bridge.export_map_data(false, false, &[]);
        assert_eq!(all.graph.len(), 7);
        assert_eq!(all.frame_id, "map");
    }

    #[test]
    fn test_references_follow_engine_merge() {
        let mut engine = engine_with_root();
        engine.add_keyframe(KeyFrame::new(KeyFrameId::new(1), 1.0, translation(0.0, 1.0, 0.0), A));
        engine.add_sub_map(SubMap::new(B, KeyFrameId::new(1), SE3::identity()));
        engine.add_keyframe(KeyFrame::new(KeyFrameId::new(2), 2.0, translation(1.0, 0.0, 0.0), B));
        engine.push_steps([ScriptedStep::ok(SE3::identity()), ScriptedStep::ok(SE3::identity())]);
        let bridge = AtlasBridge::with_engine(config(SensorMode::Monocular), engine);

        bridge.track_frame(mono(3.0), false).unwrap();
        let kf2_before = bridge
            .export_map_data(false, false, &[])
            .graph
            .iter()
            .find(|(id, _)| id.0 == 2)
            .map(|(_, p)| p.pose.translation)
            .unwrap();
        assert_relative_eq!(kf2_before, Vector3::new(1.0, 1.0, 0.0), epsilon = 1e-12);

        // Engine folds B into A using the anchor, the global position must not move.
        bridge
            .lock_engine()
            .merge_sub_maps(B, A, &translation(0.0, 1.0, 0.0));
        bridge.track_frame(mono(4.0), false).unwrap();

        let graph = bridge.export_map_data(true, false, &[]).graph;
        assert_eq!(graph.len(), 3);
        let kf2_after = graph
            .iter()
            .find(|(id, _)| id.0 == 2)
            .map(|(_, p)| p.pose.translation)
            .unwrap();
        assert_relative_eq!(kf2_after, kf2_before, epsilon = 1e-12);
    }

    #[test]
    fn test_conversion_failure_skips_engine() {
        let mut engine = engine_with_root();
        engine.push_steps([ScriptedStep::ok(SE3::identity())]);
        let bridge = AtlasBridge::with_engine(config(SensorMode::Rgbd), engine);

        let outcome = bridge.track_frame(mono(0.0), false).unwrap();
        assert!(matches!(
            outcome,
            FrameOutcome::Rejected(Rejection::Conversion(_))
        ));
        assert_eq!(bridge.lock_engine().track_calls(), 0);
        assert!(bridge.tracked_pose().is_none());
    }

    #[test]
    fn test_inertial_frame_drains_due_samples() {
        let mut engine = engine_with_root();
        engine.push_steps([ScriptedStep::ok(SE3::identity())]);
        let bridge = AtlasBridge::with_engine(config(SensorMode::RgbdInertial), engine);
        for t in [0.8, 0.9, 1.0, 1.1, 1.2] {
            bridge.submit_imu(imu(t));
        }

        // Cutoff is the older of the two images.
        let outcome = bridge.track_frame(rgbd(1.2, 1.0), true).unwrap();
        assert!(outcome.is_tracked());

        let engine = bridge.lock_engine();
        let stamps: Vec<f64> = engine.imu_batches()[0].iter().map(|s| s.timestamp_s).collect();
        assert_eq!(stamps, vec![0.8, 0.9, 1.0]);
        drop(engine);
        assert_eq!(bridge.shared_state().imu.len(), 2);
    }

    #[test]
    fn test_inertial_frame_without_samples_rejected() {
        let mut engine = engine_with_root();
        engine.push_steps([ScriptedStep::ok(SE3::identity())]);
        let bridge = AtlasBridge::with_engine(config(SensorMode::RgbdInertial), engine);
        bridge.submit_imu(imu(5.0));

        let outcome = bridge.track_frame(rgbd(1.0, 1.0), true).unwrap();
        assert_eq!(outcome, FrameOutcome::Rejected(Rejection::MissingInertial));
        assert_eq!(bridge.lock_engine().track_calls(), 0);
        assert_eq!(bridge.shared_state().imu.len(), 1);
    }

    #[test]
    fn test_map_to_odom_requires_tracking() {
        let mut engine = engine_with_root();
        engine.push_steps([ScriptedStep::ok(translation(1.0, 2.0, 0.0))]);
        let bridge = AtlasBridge::with_engine(config(SensorMode::Monocular), engine);
        let odom = OdometrySample {
            timestamp_s: 10.0,
            position: Vector3::new(1.0, 0.0, 0.0),
            orientation: UnitQuaternion::identity(),
        };

        assert!(bridge.compute_map_to_odom(&odom).is_none());

        bridge.track_frame(mono(0.0), false).unwrap();
        let tf = bridge.compute_map_to_odom(&odom).unwrap();
        assert_relative_eq!(tf.transform.translation, Vector3::new(0.0, 2.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(tf.timestamp_s, 10.5, epsilon = 1e-12);
        assert_eq!(tf.child_frame_id, "odom");
    }

    #[test]
    fn test_engine_error_propagates() {
        // No scripted steps: the engine fails on the first call.
        let bridge = AtlasBridge::with_engine(config(SensorMode::Monocular), engine_with_root());
        assert!(matches!(
            bridge.track_frame(mono(0.0), false),
            Err(EngineError::Internal(_))
        ));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut engine = engine_with_root();
        engine.push_steps([ScriptedStep::ok(SE3::identity())]);
        let bridge = AtlasBridge::with_engine(config(SensorMode::Monocular), engine);
        bridge.track_frame(mono(0.0), false).unwrap();

        bridge.shutdown();
        bridge.shutdown();

        assert!(bridge.lock_engine().is_shut_down());
        assert!(bridge.tracked_pose().is_none());
        assert!(matches!(
            bridge.track_frame(mono(1.0), false),
            Err(EngineError::ShutDown)
        ));
    }

    #[test]
    fn test_held_merge_flag_blocks_until_released() {
        let mut engine = engine_with_root();
        engine.push_steps([
            ScriptedStep::ok(translation(1.0, 0.0, 0.0)),
            ScriptedStep::ok(translation(5.0, 0.0, 0.0)),
            ScriptedStep::ok(translation(6.0, 0.0, 0.0)),
        ]);
        let bridge = AtlasBridge::with_engine(config(SensorMode::Monocular), engine);
        assert!(bridge.track_frame(mono(0.0), false).unwrap().is_tracked());

        bridge.lock_engine().set_merge_in_progress(true);
        let outcome = bridge.track_frame(mono(1.0), false).unwrap();
        assert_eq!(outcome, FrameOutcome::Rejected(Rejection::MergeInProgress));
        assert_eq!(bridge.tracked_pose().unwrap().pose.translation.x, 1.0);

        bridge.lock_engine().set_merge_in_progress(false);
        assert!(bridge.track_frame(mono(2.0), false).unwrap().is_tracked());
        assert_eq!(bridge.tracked_pose().unwrap().pose.translation.x, 6.0);
    }

    #[test]
    fn test_concurrent_trackers_publish_latest_estimate() {
        const FRAMES_PER_THREAD: usize = 5;
        let mut engine = engine_with_root();
        // The n-th engine call returns x = n.
        engine.push_steps((1..=2 * FRAMES_PER_THREAD).map(|n| ScriptedStep::ok(translation(n as f64, 0.0, 0.0))));
        let bridge = Arc::new(AtlasBridge::with_engine(config(SensorMode::Monocular), engine));

        let trackers: Vec<_> = (0..2)
            .map(|k| {
                let bridge = Arc::clone(&bridge);
                std::thread::spawn(move || {
                    for i in 0..FRAMES_PER_THREAD {
                        let t = (k * FRAMES_PER_THREAD + i) as f64;
                        assert!(bridge.track_frame(mono(t), false).unwrap().is_tracked());
                    }
                })
            })
            .collect();
        for tracker in trackers {
            tracker.join().unwrap();
        }

        let last = bridge.tracked_pose().unwrap();
        assert_eq!(last.pose.translation.x, (2 * FRAMES_PER_THREAD) as f64);
    }

    /// Engine that requests shutdown on the bridge while a frame is tracked.
    struct ShutdownDuringTrack {
        inner: ScriptedEngine,
        shared: Option<Arc<SharedState>>,
    }

    impl SlamEngine for ShutdownDuringTrack {
        fn create(config: &crate::engine::EngineConfig) -> Result<Self, EngineError> {
            Ok(Self {
                inner: ScriptedEngine::create(config)?,
                shared: None,
            })
        }

        fn shutdown(&mut self) {
            self.inner.shutdown();
        }

        fn track(&mut self, frame: &Frame, imu: &[ImuSample]) -> Result<SE3, EngineError> {
            let pose = self.inner.track(frame, imu)?;
            if let Some(shared) = &self.shared {
                shared.request_shutdown();
            }
            Ok(pose)
        }

        fn tracking_state(&self) -> TrackingState {
            self.inner.tracking_state()
        }

        fn is_merge_in_progress(&self) -> bool {
            self.inner.is_merge_in_progress()
        }

        fn sub_maps(&self) -> Vec<SubMap> {
            self.inner.sub_maps()
        }

        fn keyframes(&self, sub_map: SubMapId) -> Vec<KeyFrame> {
            self.inner.keyframes(sub_map)
        }

        fn current_sub_map(&self) -> Option<SubMapId> {
            self.inner.current_sub_map()
        }
    }

    #[test]
    fn test_shutdown_during_track_publishes_nothing() {
        let mut inner = engine_with_root();
        inner.push_steps([ScriptedStep::ok(translation(1.0, 0.0, 0.0))]);
        let engine = ShutdownDuringTrack { inner, shared: None };
        let bridge = AtlasBridge::with_engine(config(SensorMode::Monocular), engine);
        bridge.lock_engine().shared = Some(Arc::clone(bridge.shared_state()));

        assert!(matches!(
            bridge.track_frame(mono(0.0), false),
            Err(EngineError::ShutDown)
        ));
        assert!(bridge.tracked_pose().is_none());
        assert!(bridge.snapshot().index.sub_maps().is_empty());
    }

    #[test]
    fn test_new_creates_engine() {
        let bridge = AtlasBridge::<ScriptedEngine>::new(config(SensorMode::Stereo)).unwrap();
        assert_eq!(bridge.config().sensor, SensorMode::Stereo);
        assert!(bridge.snapshot().index.sub_maps().is_empty());
    }
}
