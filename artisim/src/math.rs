//! Pose helpers shared by the resolvers and the assembler

use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};

/// Maximum deviation of `RᵀR` from identity accepted for a rotation matrix
pub const ORTHONORMAL_TOLERANCE: f32 = 1e-3;

/// Maximum deviation of a quaternion norm from one accepted as a rigid transform
pub const UNIT_TOLERANCE: f32 = 1e-3;

/// Pose = `xyz` translation with `rpy` rotation applied as `Rz(yaw)·Ry(pitch)·Rx(roll)`
pub fn pose_from_origin(xyz: [f32; 3], rpy: [f32; 3]) -> Isometry3<f32> {
    Isometry3::from_parts(
        Translation3::new(xyz[0], xyz[1], xyz[2]),
        UnitQuaternion::from_euler_angles(rpy[0], rpy[1], rpy[2]),
    )
}

/// Whether `pose` is a usable rigid transform (finite, unit rotation)
pub fn is_sane(pose: &Isometry3<f32>) -> bool {
    let q = pose.rotation.quaternion();
    pose.translation.vector.iter().all(|v| v.is_finite())
        && q.coords.iter().all(|v| v.is_finite())
        && (q.norm() - 1.0).abs() <= UNIT_TOLERANCE
}

/// Whether the columns of `m` form a right-handed orthonormal basis
pub fn is_rotation_matrix(m: &Matrix3<f32>) -> bool {
    if m.iter().any(|v| !v.is_finite()) {
        return false;
    }
    let gram = m.transpose() * m;
    let deviation = (gram - Matrix3::identity()).abs().max();
    deviation <= ORTHONORMAL_TOLERANCE && (m.determinant() - 1.0).abs() <= ORTHONORMAL_TOLERANCE
}

/// Rotation whose columns are `x`, `y`, `z`; `None` unless they are orthonormal and right-handed
pub fn rotation_from_columns(
    x: Vector3<f32>,
    y: Vector3<f32>,
    z: Vector3<f32>,
) -> Option<UnitQuaternion<f32>> {
    let m = Matrix3::from_columns(&[x, y, z]);
    if !is_rotation_matrix(&m) {
        return None;
    }
    let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(m));
    // renormalize away the drift accumulated by the extraction
    let q = UnitQuaternion::new_normalize(q.into_inner());
    q.coords.iter().all(|v| v.is_finite()).then_some(q)
}

/// Full 3x3 rotation matrix of a pose
pub fn rotation_matrix(pose: &Isometry3<f32>) -> Matrix3<f32> {
    pose.rotation.to_rotation_matrix().into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_pose_from_origin_yaw() {
        let pose = pose_from_origin([1.0, 2.0, 3.0], [0.0, 0.0, FRAC_PI_2]);
        let p = pose * nalgebra::Point3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 3.0, epsilon = 1e-5);
        assert_relative_eq!(p.z, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_rpy_order_is_extrinsic_xyz() {
        // roll then pitch about fixed axes equals Ry * Rx
        let pose = pose_from_origin([0.0; 3], [FRAC_PI_2, FRAC_PI_2, 0.0]);
        let expected = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2);
        assert!(pose.rotation.angle_to(&expected) < 1e-5);
    }

    #[test]
    fn test_sanity_rejects_nan() {
        let mut pose = Isometry3::<f32>::identity();
        assert!(is_sane(&pose));
        pose.translation.vector.x = f32::NAN;
        assert!(!is_sane(&pose));
    }

    #[test]
    fn test_rotation_from_columns_rejects_left_handed() {
        let x = Vector3::x();
        let y = Vector3::y();
        assert!(rotation_from_columns(x, y, Vector3::z()).is_some());
        assert!(rotation_from_columns(x, y, -Vector3::z()).is_none());
        assert!(rotation_from_columns(x, x, Vector3::z()).is_none());
    }
}
