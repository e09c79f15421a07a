//! Applying reference poses to engine-local poses and points.
//!
//! All functions are pure. They are generic over the output representation so
//! callers can ask for whatever shape they publish (an [`SE3`], a nalgebra
//! `Isometry3`, a raw `Vector3`, a [`GlobalPoint`]) without an extra
//! conversion at every call site.

use nalgebra::Vector3;

use crate::geometry::SE3;
use crate::system::messages::PoseStamped;

/// `T_global_x = reference ∘ T_local_x`.
pub fn transform_pose<T: From<SE3>>(reference: &SE3, local: &SE3) -> T {
    T::from(reference.compose(local))
}

/// `p_global = R * p_local + t`.
pub fn transform_point<P: From<Vector3<f64>>>(reference: &SE3, local: &Vector3<f64>) -> P {
    P::from(reference.transform_point(local))
}

/// Global pose wrapped with its frame and timestamp.
pub fn transform_pose_stamped(
    reference: &SE3,
    local: &SE3,
    timestamp_s: f64,
    frame_id: &str,
) -> PoseStamped {
    PoseStamped {
        frame_id: frame_id.to_string(),
        timestamp_s,
        pose: transform_pose(reference, local),
    }
}

/// Inverse of [`transform_pose`]: `T_local_x = reference⁻¹ ∘ T_global_x`.
pub fn to_local_pose(reference: &SE3, global: &SE3) -> SE3 {
    reference.inverse().compose(global)
}

/// Inverse of [`transform_point`].
pub fn to_local_point(reference: &SE3, global: &Vector3<f64>) -> Vector3<f64> {
    reference.inverse().transform_point(global)
}
