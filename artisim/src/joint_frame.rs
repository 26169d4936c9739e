//! Joint frame builder
//!
//! Single-axis joints in the engine act along the local X axis of their
//! frames. A declared joint axis is re-based onto that convention by building
//! an orthonormal basis whose first column is the axis.

use crate::error::{SimError, SimResult};
use crate::math::{is_sane, rotation_from_columns};
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

/// Above this `|axis · X|` the second basis vector is derived from Z instead of X
pub const X_ALIGNMENT_THRESHOLD: f32 = 0.9;

/// Attachment frames of one joint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointFrames {
    /// Rotation taking the engine's joint X axis onto the declared axis
    pub axis_rotation: UnitQuaternion<f32>,
    /// Joint frame in the parent body frame
    pub parent_pose: Isometry3<f32>,
    /// Joint frame in the child body frame
    pub child_pose: Isometry3<f32>,
}

/// Orthonormal right-handed basis with `axis` (normalised) as first column
pub fn axis_basis(axis: &Vector3<f32>, joint: &str) -> SimResult<UnitQuaternion<f32>> {
    let norm = axis.norm();
    if !norm.is_finite() || norm <= f32::EPSILON {
        return Err(SimError::numeric(
            joint,
            format!("joint axis [{}, {}, {}] cannot be normalised", axis.x, axis.y, axis.z),
        ));
    }
    let x = axis / norm;

    let reference = if x.dot(&Vector3::x()).abs() > X_ALIGNMENT_THRESHOLD {
        Vector3::z()
    } else {
        Vector3::x()
    };
    let y = x.cross(&reference).normalize();
    let z = x.cross(&y);

    rotation_from_columns(x, y, z)
        .ok_or_else(|| SimError::numeric(joint, "joint axis basis is not orthonormal"))
}

/// Frames for a joint declared with `origin` relative to its parent link
pub fn build(axis: &Vector3<f32>, origin: &Isometry3<f32>, joint: &str) -> SimResult<JointFrames> {
    build_with_offset(axis, origin, &Isometry3::identity(), joint)
}

/// Like [`build`] when the parent link is baked into a body at `parent_offset`
pub fn build_with_offset(
    axis: &Vector3<f32>,
    origin: &Isometry3<f32>,
    parent_offset: &Isometry3<f32>,
    joint: &str,
) -> SimResult<JointFrames> {
    let axis_rotation = axis_basis(axis, joint)?;
    let rotation = Isometry3::from_parts(Translation3::identity(), axis_rotation);

    let parent_pose = parent_offset * origin * rotation;
    let child_pose = rotation;

    if !is_sane(&parent_pose) || !is_sane(&child_pose) {
        return Err(SimError::numeric(joint, "joint attachment frame is not a rigid transform"));
    }

    Ok(JointFrames {
        axis_rotation,
        parent_pose,
        child_pose,
    })
}
