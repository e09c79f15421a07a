//! Rerun-based visualization of the bridge output.
//!
//! Entity hierarchy:
//!     status               - Last frame outcome and atlas size
//!     world/
//!         camera           - Latest tracked camera pose
//!         trajectory       - Tracked poses so far (gray)
//!         odom             - map→odom transform
//!         keyframes        - Global pose graph (blue)
//!         map_points       - Current sub-map cloud (dim, LOD filtered)

use anyhow::{Context, Result};
use nalgebra::Vector3;
use rerun::{RecordingStream, external::glam};

use crate::geometry::SE3;
use crate::system::messages::{GlobalPoint, PoseGraph, TrackedPose, TransformStamped};
use crate::tracking::FrameOutcome;

pub struct RerunVisualizer {
    rec: RecordingStream,
    trajectory: Vec<[f32; 3]>,
    start_timestamp_s: Option<f64>,
}

impl RerunVisualizer {
    pub fn new(app_name: &str) -> Result<Self> {
        // Runs rerun viewer in a separate process
        let rec = rerun::RecordingStreamBuilder::new(app_name)
            .spawn()
            .context("Failed to spawn rerun viewer")?;

        // Global frame is Z-up with the robot start on the XY plane
        rec.log_static("world", &rerun::ViewCoordinates::RFU()).ok();

        Ok(Self {
            rec,
            trajectory: Vec::new(),
            start_timestamp_s: None,
        })
    }

    /// Set the timeline for subsequent logs, relative to the first call.
    pub fn set_time(&mut self, timestamp_s: f64) {
        let start = *self.start_timestamp_s.get_or_insert(timestamp_s);
        self.rec.set_duration_secs("time", (timestamp_s - start).max(0.0));
    }

    pub fn log_status(&self, outcome: &FrameOutcome, num_sub_maps: usize, num_keyframes: usize) {
        let indicator = match outcome {
            FrameOutcome::Tracked(_) => "**OK**".to_string(),
            FrameOutcome::Rejected(reason) => format!("**SKIPPED** ({:?})", reason),
        };
        let text = format!(
            "{} | Sub-maps: {} | KeyFrames: {}",
            indicator, num_sub_maps, num_keyframes
        );
        self.rec
            .log(
                "status",
                &rerun::TextDocument::new(text).with_media_type(rerun::MediaType::markdown()),
            )
            .ok();
    }

    /// Log the global camera pose and extend the trajectory.
    pub fn log_tracked_pose(&mut self, tracked: &TrackedPose) {
        self.rec
            .log("world/camera", &to_transform(&tracked.pose))
            .ok();

        self.trajectory.push(to_array(&tracked.pose.translation));
        if self.trajectory.len() < 2 {
            return;
        }
        self.rec
            .log(
                "world/trajectory",
                &rerun::LineStrips3D::new([self.trajectory.clone()])
                    .with_colors([[128u8, 128, 128]])
                    .with_radii([0.005f32]),
            )
            .ok();
    }

    pub fn log_map_to_odom(&self, tf: &TransformStamped) {
        self.rec.log("world/odom", &to_transform(&tf.transform)).ok();
    }

    /// Log keyframe centres of the pose graph as small blue boxes.
    pub fn log_pose_graph(&self, graph: &PoseGraph) {
        if graph.is_empty() {
            return;
        }
        let centers: Vec<[f32; 3]> = graph
            .poses
            .iter()
            .map(|p| to_array(&p.pose.translation))
            .collect();
        let sizes = vec![[0.1f32, 0.1, 0.1]; centers.len()];
        let labels: Vec<String> = graph.ids.iter().map(|id| id.to_string()).collect();

        self.rec
            .log(
                "world/keyframes",
                &rerun::Boxes3D::from_centers_and_sizes(centers, sizes)
                    .with_colors([[0u8, 100, 255]])
                    .with_labels(labels),
            )
            .ok();
    }

    /// Log the current sub-map cloud, thinned with distance from the camera.
    pub fn log_point_cloud(&self, points: &[GlobalPoint], camera_pos: Vector3<f64>) {
        let filtered = filter_points_lod(points, camera_pos, 10.0, 50.0, 10);
        if filtered.is_empty() {
            return;
        }
        let pts: Vec<[f32; 3]> = filtered.iter().map(|p| [p.x, p.y, p.z]).collect();

        self.rec
            .log(
                "world/map_points",
                &rerun::Points3D::new(pts)
                    .with_colors([[100u8, 100, 100]])
                    .with_radii([0.01f32]),
            )
            .ok();
    }
}

fn to_array(v: &Vector3<f64>) -> [f32; 3] {
    [v.x as f32, v.y as f32, v.z as f32]
}

fn to_transform(pose: &SE3) -> rerun::Transform3D {
    let t = &pose.translation;
    let q = &pose.rotation;
    rerun::Transform3D::from_translation_rotation(
        glam::Vec3::new(t.x as f32, t.y as f32, t.z as f32),
        glam::Quat::from_xyzw(
            q.coords.x as f32,
            q.coords.y as f32,
            q.coords.z as f32,
            q.w as f32,
        ),
    )
}

/// Level-of-detail filter based on distance from the camera.
///
/// - Points within `near_threshold`: keep all
/// - Points between thresholds: keep every third
/// - Points beyond `far_threshold`: keep 1 in `far_downsample`
fn filter_points_lod(
    points: &[GlobalPoint],
    camera_pos: Vector3<f64>,
    near_threshold: f64,
    far_threshold: f64,
    far_downsample: usize,
) -> Vec<GlobalPoint> {
    let mut result = Vec::new();
    let mut far_points = Vec::new();
    let mut medium_seen = 0usize;

    for point in points {
        let dist = (Vector3::from(*point) - camera_pos).norm();

        if dist < near_threshold {
            result.push(*point);
        } else if dist < far_threshold {
            if medium_seen % 3 == 0 {
                result.push(*point);
            }
            medium_seen += 1;
        } else {
            far_points.push(*point);
        }
    }

    result.extend(far_points.into_iter().step_by(far_downsample.max(1)));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f32) -> GlobalPoint {
        GlobalPoint { x, y: 0.0, z: 0.0 }
    }

    #[test]
    fn test_lod_keeps_near_and_thins_far() {
        let mut points: Vec<GlobalPoint> = (0..5).map(|i| at(i as f32)).collect();
        points.extend((0..6).map(|i| at(20.0 + i as f32)));
        points.extend((0..20).map(|i| at(100.0 + i as f32)));

        let kept = filter_points_lod(&points, Vector3::zeros(), 10.0, 50.0, 10);

        // 5 near + 2 of 6 medium + 2 of 20 far
        assert_eq!(kept.len(), 9);
        assert_eq!(kept[..5], points[..5]);
        assert_eq!(kept[7], at(100.0));
        assert_eq!(kept[8], at(110.0));
    }
}
