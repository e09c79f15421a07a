//! SE3: 6-DOF rigid transformation (rotation + translation).
//!
//! Every pose that crosses this crate follows the `T_target_source` convention:
//! a keyframe pose reported by the engine is `T_local_cam` (camera to sub-map
//! local frame), a reference pose is `T_global_local`. Chaining them is plain
//! composition:
//!
//! ```text
//! T_global_cam = T_global_local ∘ T_local_cam
//! ```

use nalgebra::{Isometry3, Matrix3, Matrix4, Rotation3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid body transformation.
///
/// Transforms points as: p' = R * p + t
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    /// Identity transformation.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Pure translation with identity rotation.
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation,
        }
    }

    /// Construct from rotation matrix and translation.
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot3 = Rotation3::from_matrix_unchecked(rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot3),
            translation,
        }
    }

    /// Construct from quaternion (w, x, y, z) and translation.
    ///
    /// The quaternion is normalized, so slightly denormalized input from an
    /// odometry source is accepted.
    pub fn from_quaternion(qw: f64, qx: f64, qy: f64, qz: f64, translation: Vector3<f64>) -> Self {
        let rotation = UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(qw, qx, qy, qz));
        Self {
            rotation,
            translation,
        }
    }

    /// Construct from a homogeneous 4x4 matrix [R | t; 0 | 1].
    pub fn from_matrix(mat: Matrix4<f64>) -> Self {
        let r = mat.fixed_view::<3, 3>(0, 0).into_owned();
        let t = Vector3::new(mat[(0, 3)], mat[(1, 3)], mat[(2, 3)]);
        Self::from_rt(r, t)
    }

    /// Convert to a homogeneous 4x4 matrix.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        self.to_isometry().to_homogeneous()
    }

    /// Convert to a nalgebra isometry.
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.translation), self.rotation)
    }

    /// Inverse transformation: [R^T | -R^T * t].
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Compose two transforms: self ∘ other.
    ///
    /// For T1 = [R1 | t1] and T2 = [R2 | t2]:
    /// T1 ∘ T2 = [R1*R2 | R1*t2 + t1]
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Transform a single point: p' = R * p + t.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<Isometry3<f64>> for SE3 {
    fn from(iso: Isometry3<f64>) -> Self {
        Self {
            rotation: iso.rotation,
            translation: iso.translation.vector,
        }
    }
}

impl From<SE3> for Isometry3<f64> {
    fn from(se3: SE3) -> Self {
        se3.to_isometry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn yaw(angle: f64) -> UnitQuaternion<f64> {
        UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle)
    }

    #[test]
    fn test_identity() {
        let p = Vector3::new(1.0, 2.0, 3.0);
        assert_relative_eq!(SE3::identity().transform_point(&p), p, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse() {
        let t = SE3 {
            rotation: yaw(std::f64::consts::FRAC_PI_2),
            translation: Vector3::new(1.0, 2.0, 3.0),
        };
        let composed = t.compose(&t.inverse());

        assert_relative_eq!(composed.translation.norm(), 0.0, epsilon = 1e-10);
        assert_relative_eq!(composed.rotation.angle(), 0.0, epsilon = 1e-10);

        let p = Vector3::new(-4.0, 0.5, 2.0);
        let p_back = t.inverse().transform_point(&t.transform_point(&p));
        assert_relative_eq!(p_back, p, epsilon = 1e-10);
    }

    #[test]
    fn test_compose_order() {
        // Rotate by 90° about z, then translate along x.
        let a = SE3::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let b = SE3 {
            rotation: yaw(std::f64::consts::FRAC_PI_2),
            translation: Vector3::zeros(),
        };
        let p = Vector3::new(1.0, 0.0, 0.0);

        // (a ∘ b)(p) = a(b(p)) = (0,1,0) + (1,0,0)
        let q = a.compose(&b).transform_point(&p);
        assert_relative_eq!(q, Vector3::new(1.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_matrix_and_isometry_agree() {
        let t = SE3::from_quaternion(0.9, 0.1, -0.2, 0.3, Vector3::new(0.5, -1.0, 2.0));
        let p = Vector3::new(0.3, 0.2, 0.1);

        let via_matrix = t.to_matrix() * p.push(1.0);
        let via_iso = t.to_isometry() * nalgebra::Point3::from(p);
        assert_relative_eq!(via_matrix.xyz(), t.transform_point(&p), epsilon = 1e-12);
        assert_relative_eq!(via_iso.coords, t.transform_point(&p), epsilon = 1e-12);

        let back = SE3::from_matrix(t.to_matrix());
        assert_relative_eq!(back.translation, t.translation, epsilon = 1e-12);
        assert_relative_eq!(back.rotation.angle_to(&t.rotation), 0.0, epsilon = 1e-9);
    }
}
