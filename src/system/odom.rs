//! Map → odometry transform.
//!
//! Given where the SLAM says the camera is in the global frame and where the
//! odometry says it is in its own frame, the transform between the two frames
//! is `T_map_odom = T_map_cam ∘ T_odom_cam⁻¹`.

use super::messages::{OdometrySample, TrackedPose, TransformStamped};

/// Build the stamped map→odom transform.
///
/// The stamp is pushed `padding_s` into the future so consumers can keep
/// using the transform until the next odometry reading arrives.
pub fn map_to_odom(
    tracked: &TrackedPose,
    odom: &OdometrySample,
    padding_s: f64,
    global_frame: &str,
    odom_frame: &str,
) -> TransformStamped {
    let transform = tracked.pose.compose(&odom.pose().inverse());
    TransformStamped {
        timestamp_s: odom.timestamp_s + padding_s,
        frame_id: global_frame.to_string(),
        child_frame_id: odom_frame.to_string(),
        transform,
    }
}
