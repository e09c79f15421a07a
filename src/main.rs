use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use nalgebra::{UnitQuaternion, Vector3};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use atlas_bridge::atlas::{KeyFrameId, SubMap, SubMapId};
use atlas_bridge::engine::{ScriptedEngine, ScriptedStep, SensorMode};
use atlas_bridge::geometry::SE3;
use atlas_bridge::imu::ImuSample;
use atlas_bridge::io::euroc;
use atlas_bridge::reference::AnchorRule;
use atlas_bridge::system::{AtlasBridge, BridgeConfig, OdometrySample};
use atlas_bridge::tracking::frame::{Encoding, FrameInput, ImageMsg};
use atlas_bridge::tracking::{FrameOutcome, TrackingState};
use atlas_bridge::SlamEngine;

const FRAME_PERIOD_S: f64 = 0.05;
const IMU_PERIOD_S: f64 = 0.005;
const IMAGE_WIDTH: u32 = 64;
const IMAGE_HEIGHT: u32 = 48;

/// Replay a scripted multi-map session through the bridge.
#[derive(Debug, Parser)]
#[command(name = "atlas-bridge", version)]
struct Args {
    /// Configuration file (TOML). A missing file means defaults.
    #[arg(short, long, default_value = "atlas_bridge.toml")]
    config: PathBuf,

    /// Override the robot start x in the global frame (m).
    #[arg(long)]
    robot_x: Option<f64>,

    /// Override the robot start y in the global frame (m).
    #[arg(long)]
    robot_y: Option<f64>,

    /// Number of camera frames to replay.
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(20..))]
    frames: u32,

    /// EuRoC imu0/data.csv to replay instead of a synthetic IMU stream.
    #[arg(long)]
    imu: Option<PathBuf>,

    /// EuRoC ground-truth csv used as the odometry source.
    #[arg(long)]
    odom: Option<PathBuf>,
}

/// Drives the scripted engine through init, mapping, loss, a new sub-map
/// and a merge back into the root.
struct DemoSession {
    lost_at: u32,
    new_map_at: u32,
    merge_at: u32,
    anchor: AnchorRule,
    /// `T_local_root` of the sub-map the engine currently tracks in.
    local_from_root: SE3,
    child: Option<SubMapId>,
}

impl DemoSession {
    const ROOT: SubMapId = SubMapId(0);
    const MERGE_FRAMES: u32 = 2;

    fn new(frames: u32, anchor: AnchorRule) -> Self {
        Self {
            lost_at: frames / 2,
            new_map_at: frames / 2 + 3,
            merge_at: frames * 3 / 4,
            anchor,
            local_from_root: SE3::identity(),
            child: None,
        }
    }

    /// Camera pose in the root sub-map's frame.
    fn ground_truth(i: u32) -> SE3 {
        let s = i as f64;
        SE3::from_translation(Vector3::new(0.1 * s, 0.5 * (0.1 * s).sin(), 0.0))
    }

    /// Prepare the engine for frame `i`.
    fn advance(&mut self, engine: &mut ScriptedEngine, i: u32) {
        if i == self.new_map_at {
            self.start_child_map(engine);
        }
        if i == self.merge_at + Self::MERGE_FRAMES {
            self.merge_child_map(engine);
        }

        let pose = self.local_from_root.compose(&Self::ground_truth(i));
        let step = if i < 2 {
            ScriptedStep::new(TrackingState::NotInitialized, SE3::identity())
        } else if (self.lost_at..self.new_map_at).contains(&i) {
            ScriptedStep::new(TrackingState::Lost, pose)
        } else if (self.merge_at..self.merge_at + Self::MERGE_FRAMES).contains(&i) {
            ScriptedStep::ok(pose).merging()
        } else if i == 2 || i == self.new_map_at || i % 5 == 0 {
            ScriptedStep::ok(pose).with_keyframe()
        } else {
            ScriptedStep::ok(pose)
        };
        engine.push_steps([step]);
    }

    fn start_child_map(&mut self, engine: &mut ScriptedEngine) {
        let Some(anchor) = engine.keyframes(Self::ROOT).last().cloned() else {
            warn!("Root map has no keyframes, staying in it");
            return;
        };
        let init = match self.anchor {
            AnchorRule::InitKeyframe => anchor.id,
            AnchorRule::PrecedingKeyframe => KeyFrameId::new(anchor.id.0 + 1),
        };
        let child = SubMapId::new(1);
        engine.add_sub_map(SubMap::new(child, init, SE3::identity()));
        self.local_from_root = anchor.pose.inverse();
        self.child = Some(child);
        info!("Engine started {} anchored at {}", child, anchor.id);
    }

    fn merge_child_map(&mut self, engine: &mut ScriptedEngine) {
        let Some(child) = self.child.take() else {
            return;
        };
        engine.merge_sub_maps(child, Self::ROOT, &self.local_from_root.inverse());
        self.local_from_root = SE3::identity();
        info!("Engine merged {} into {}", child, Self::ROOT);
    }
}

fn synthetic_frame(sensor: SensorMode, t: f64) -> FrameInput {
    let image = |encoding: Encoding| {
        let len = (IMAGE_WIDTH * IMAGE_HEIGHT) as usize * encoding.bytes_per_pixel();
        ImageMsg::packed(t, IMAGE_WIDTH, IMAGE_HEIGHT, encoding, vec![0; len])
    };
    if sensor.is_rgbd() {
        FrameInput::rgbd(image(Encoding::Rgb8), image(Encoding::Depth16))
    } else if sensor.is_stereo() {
        FrameInput::stereo(image(Encoding::Mono8), image(Encoding::Mono8))
    } else {
        FrameInput::mono(image(Encoding::Mono8))
    }
}

fn synthetic_imu(t0: f64, t1: f64) -> Vec<ImuSample> {
    let n = ((t1 - t0) / IMU_PERIOD_S).ceil() as usize;
    (0..=n)
        .map(|k| {
            ImuSample::new(
                t0 + k as f64 * IMU_PERIOD_S,
                Vector3::new(0.0, 0.0, 9.81),
                Vector3::zeros(),
            )
        })
        .collect()
}

/// Wheel odometry drifting 3% along x from the true trajectory.
fn synthetic_odometry(offset: &SE3, i: u32, t: f64) -> OdometrySample {
    let truth = offset.compose(&DemoSession::ground_truth(i));
    OdometrySample {
        timestamp_s: t,
        position: truth.translation.component_mul(&Vector3::new(1.03, 1.0, 1.0)),
        orientation: UnitQuaternion::identity(),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("atlas_bridge=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = BridgeConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(x) = args.robot_x {
        config.robot_x = x;
    }
    if let Some(y) = args.robot_y {
        config.robot_y = y;
    }
    config.validate()?;
    info!(
        "Sensor {}, robot start ({:.2}, {:.2}), anchor rule {:?}",
        config.sensor, config.robot_x, config.robot_y, config.anchor
    );

    let imu = match &args.imu {
        Some(path) => euroc::load_imu_csv(path)?,
        None => Vec::new(),
    };
    let odometry = match &args.odom {
        Some(path) => euroc::load_groundtruth_odometry(path)?,
        None => Vec::new(),
    };
    let t0 = imu.first().map_or(0.0, |s| s.timestamp_s + FRAME_PERIOD_S);
    let t_end = t0 + args.frames as f64 * FRAME_PERIOD_S;
    let imu = if imu.is_empty() {
        synthetic_imu(t0 - FRAME_PERIOD_S, t_end)
    } else {
        imu
    };
    info!("Replaying {} frames with {} IMU samples", args.frames, imu.len());

    let sensor = config.sensor;
    let offset = config.global_offset();
    let mut session = DemoSession::new(args.frames, config.anchor);
    let bridge = Arc::new(AtlasBridge::<ScriptedEngine>::new(config)?);
    bridge
        .lock_engine()
        .add_sub_map(SubMap::new(DemoSession::ROOT, KeyFrameId::new(0), SE3::identity()));

    #[cfg(feature = "viz")]
    let mut viz = if bridge.config().enable_visualization {
        Some(atlas_bridge::viz::RerunVisualizer::new("atlas-bridge")?)
    } else {
        None
    };

    // Camera asks the IMU thread to deliver everything up to a frame's
    // stamp before handing that frame to the tracker.
    let (until_tx, until_rx) = bounded::<f64>(1);
    let (ack_tx, ack_rx) = bounded::<()>(1);
    let (frame_tx, frame_rx) = bounded::<(u32, FrameInput)>(4);

    let imu_thread = {
        let bridge = Arc::clone(&bridge);
        thread::Builder::new()
            .name("imu".to_string())
            .spawn(move || {
                let mut samples = imu.into_iter().peekable();
                for until in until_rx {
                    while let Some(sample) = samples.next_if(|s| s.timestamp_s <= until) {
                        bridge.submit_imu(sample);
                    }
                    if ack_tx.send(()).is_err() {
                        break;
                    }
                }
            })?
    };

    let frames = args.frames;
    let camera_thread = thread::Builder::new()
        .name("camera".to_string())
        .spawn(move || {
            for i in 0..frames {
                let t = t0 + i as f64 * FRAME_PERIOD_S;
                if until_tx.send(t).is_err() || ack_rx.recv().is_err() {
                    break;
                }
                if frame_tx.send((i, synthetic_frame(sensor, t))).is_err() {
                    break;
                }
            }
        })?;

    let mut tracked = 0usize;
    for (i, input) in frame_rx {
        let t = input.primary.timestamp_s;
        session.advance(&mut bridge.lock_engine(), i);

        let outcome = bridge.track_frame(input, sensor.is_inertial())?;
        if let FrameOutcome::Tracked(pose) = &outcome {
            tracked += 1;
            let expected = offset.compose(&DemoSession::ground_truth(i));
            debug!(
                "Frame {} global error {:.2e} m",
                i,
                (pose.pose.translation - expected.translation).norm()
            );
        }

        let odom = if odometry.is_empty() {
            Some(synthetic_odometry(&offset, i, t))
        } else {
            let idx = odometry.partition_point(|o| o.timestamp_s <= t);
            idx.checked_sub(1).map(|k| odometry[k])
        };
        let map_to_odom = odom.and_then(|o| bridge.compute_map_to_odom(&o));

        if i % 10 == 0 {
            let snapshot = bridge.snapshot();
            info!(
                "Frame {}/{}: {} sub-maps, {} keyframes, outcome {:?}",
                i,
                frames,
                snapshot.index.num_sub_maps(),
                snapshot.index.num_keyframes(),
                outcome.rejection()
            );
            if let Some(tf) = &map_to_odom {
                info!(
                    "{} -> {} at t={:.3}: [{:.3}, {:.3}, {:.3}]",
                    tf.frame_id,
                    tf.child_frame_id,
                    tf.timestamp_s,
                    tf.transform.translation.x,
                    tf.transform.translation.y,
                    tf.transform.translation.z
                );
            }
        }

        #[cfg(feature = "viz")]
        if let Some(viz) = viz.as_mut() {
            let snapshot = bridge.snapshot();
            viz.set_time(t);
            viz.log_status(&outcome, snapshot.index.num_sub_maps(), snapshot.index.num_keyframes());
            if let Some(pose) = outcome.pose() {
                viz.log_tracked_pose(pose);
                viz.log_point_cloud(&bridge.export_current_map_point_cloud(), pose.pose.translation);
            }
            if let Some(tf) = &map_to_odom {
                viz.log_map_to_odom(tf);
            }
            viz.log_pose_graph(&bridge.export_map_data(false, false, &[]).graph);
        }
    }

    camera_thread
        .join()
        .map_err(|_| anyhow!("camera thread panicked"))?;
    imu_thread.join().map_err(|_| anyhow!("imu thread panicked"))?;

    let graph = bridge.export_map_data(false, false, &[]).graph;
    let last_ids: Vec<KeyFrameId> = graph.ids.iter().rev().take(3).copied().collect();
    let data = bridge.export_map_data(false, true, &last_ids);
    let cloud = bridge.export_current_map_point_cloud();
    info!(
        "Done! Tracked {}/{} frames, {} keyframes in the pose graph, {} points in the current map",
        tracked,
        frames,
        data.graph.len(),
        cloud.len()
    );
    for node in &data.nodes {
        info!("{}: {} points", node.id, node.points.len());
    }
    if let Some(pose) = bridge.tracked_pose() {
        info!(
            "Final pose in {}: [{:.3}, {:.3}, {:.3}]",
            data.frame_id, pose.pose.translation.x, pose.pose.translation.y, pose.pose.translation.z
        );
    }

    bridge.shutdown();
    Ok(())
}
