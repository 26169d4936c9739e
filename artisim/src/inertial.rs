//! Inertial frame resolver
//!
//! Diagonalises a link's inertia tensor into principal moments and the
//! rotation of the principal-axis frame, then composes it with the inertial
//! origin. An all-zero tensor means "not specified" and is left to the
//! engine's geometry based estimator.

use crate::description::{InertiaTensor, InertialDescriptor};
use crate::error::{SimError, SimResult};
use crate::math::{is_sane, rotation_from_columns};
use nalgebra::{Isometry3, Matrix3, SymmetricEigen, Translation3, UnitQuaternion, Vector3};

/// Principal moments below this are treated as a non positive semi-definite tensor
pub const NEGATIVE_MOMENT_TOLERANCE: f32 = 1e-6;

/// Mass properties ready to hand to the physics engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedInertia {
    pub mass: f32,
    /// Moments of inertia about the principal axes
    pub principal: Vector3<f32>,
    /// Principal-axis frame relative to the link (body) frame
    pub local_pose: Isometry3<f32>,
}

/// Resolve the inertial parameters of one body
///
/// Returns `Ok(None)` when the tensor is unspecified and the caller must fall
/// back to the engine estimator. `context` names the link in error messages.
pub fn resolve(inertial: &InertialDescriptor, context: &str) -> SimResult<Option<ResolvedInertia>> {
    if inertial.inertia.is_unspecified() {
        return Ok(None);
    }

    if !inertial.mass.is_finite() || inertial.mass < 0.0 {
        return Err(SimError::numeric(
            context,
            format!("invalid mass {}", inertial.mass),
        ));
    }

    let (principal, rotation) = principal_axes(&inertial.inertia, context)?;

    let local_pose = inertial.origin * Isometry3::from_parts(Translation3::identity(), rotation);
    if !is_sane(&local_pose) {
        return Err(SimError::numeric(context, "inertial frame is not a rigid transform"));
    }

    Ok(Some(ResolvedInertia {
        mass: inertial.mass,
        principal,
        local_pose,
    }))
}

/// Eigen-decomposition of a symmetric tensor into moments and a right-handed rotation
pub fn principal_axes(
    tensor: &InertiaTensor,
    context: &str,
) -> SimResult<(Vector3<f32>, UnitQuaternion<f32>)> {
    let matrix = tensor.to_matrix();
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(SimError::numeric(context, "inertia tensor has non-finite entries"));
    }

    let eigen = SymmetricEigen::new(matrix);
    let mut principal = eigen.eigenvalues;

    if let Some(min) = principal.iter().copied().find(|v| *v < -NEGATIVE_MOMENT_TOLERANCE) {
        return Err(SimError::numeric(
            context,
            format!("inertia tensor is not positive semi-definite (moment {})", min),
        ));
    }
    principal.iter_mut().for_each(|v| *v = v.max(0.0));

    // Gram-Schmidt; the cross product also fixes handedness without reordering moments
    let vectors = eigen.eigenvectors;
    let x = vectors.column(0).normalize();
    let y = (vectors.column(1) - x * x.dot(&vectors.column(1))).normalize();
    let z = x.cross(&y);

    let rotation = rotation_from_columns(x, y, z).ok_or_else(|| {
        SimError::numeric(context, "principal axes do not form an orthonormal basis")
    })?;

    Ok((principal, rotation))
}

/// Combine the inertials of several links rigidly attached to one body
///
/// Each part is given with the pose of its link frame in the body frame. The
/// result is expressed at the combined centre of mass with body-aligned axes.
/// `None` when any part is unspecified or the total mass is zero.
pub fn compose(parts: &[(&InertialDescriptor, Isometry3<f32>)]) -> Option<InertialDescriptor> {
    if parts.iter().any(|(inertial, _)| inertial.inertia.is_unspecified()) {
        return None;
    }

    let mass: f32 = parts.iter().map(|(inertial, _)| inertial.mass).sum();
    if mass <= 0.0 || !mass.is_finite() {
        return None;
    }

    let frames: Vec<(f32, Isometry3<f32>, Matrix3<f32>)> = parts
        .iter()
        .map(|(inertial, offset)| {
            (
                inertial.mass,
                offset * inertial.origin,
                inertial.inertia.to_matrix(),
            )
        })
        .collect();

    let com = frames
        .iter()
        .fold(Vector3::zeros(), |acc, (m, frame, _)| acc + frame.translation.vector * *m)
        / mass;

    let tensor = frames
        .iter()
        .fold(Matrix3::zeros(), |acc, (m, frame, local)| {
            let r = frame.rotation.to_rotation_matrix().into_inner();
            let d = frame.translation.vector - com;
            let shift = (Matrix3::identity() * d.norm_squared() - d * d.transpose()) * *m;
            acc + r * local * r.transpose() + shift
        });

    Some(InertialDescriptor {
        mass,
        origin: Isometry3::from_parts(Translation3::from(com), UnitQuaternion::identity()),
        inertia: InertiaTensor {
            ixx: tensor[(0, 0)],
            iyy: tensor[(1, 1)],
            izz: tensor[(2, 2)],
            ixy: tensor[(0, 1)],
            ixz: tensor[(0, 2)],
            iyz: tensor[(1, 2)],
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::pose_from_origin;
    use approx::assert_relative_eq;

    fn inertial(mass: f32, inertia: InertiaTensor) -> InertialDescriptor {
        InertialDescriptor {
            mass,
            origin: Isometry3::identity(),
            inertia,
        }
    }

    #[test]
    fn test_unspecified_falls_back() {
        let resolved = resolve(&inertial(1.0, InertiaTensor::default()), "link").unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn test_diagonal_tensor() {
        let resolved = resolve(&inertial(2.0, InertiaTensor::diagonal(1.0, 2.0, 3.0)), "link")
            .unwrap()
            .unwrap();

        assert_eq!(resolved.mass, 2.0);
        let mut moments: Vec<f32> = resolved.principal.iter().copied().collect();
        moments.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_relative_eq!(moments[0], 1.0, epsilon = 1e-5);
        assert_relative_eq!(moments[1], 2.0, epsilon = 1e-5);
        assert_relative_eq!(moments[2], 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_off_diagonal_reconstructs_tensor() {
        let tensor = InertiaTensor {
            ixx: 2.0,
            iyy: 2.0,
            izz: 3.0,
            ixy: 1.0,
            ..Default::default()
        };
        let origin = pose_from_origin([0.1, 0.0, 0.0], [0.0, 0.0, 0.3]);
        let resolved = resolve(
            &InertialDescriptor {
                mass: 1.0,
                origin,
                inertia: tensor,
            },
            "link",
        )
        .unwrap()
        .unwrap();

        assert_relative_eq!(resolved.principal.sum(), 7.0, epsilon = 1e-4);

        // rotate back out of the inertial origin and rebuild R diag(p) Rᵀ
        let r = (origin.rotation.inverse() * resolved.local_pose.rotation)
            .to_rotation_matrix()
            .into_inner();
        let rebuilt = r * Matrix3::from_diagonal(&resolved.principal) * r.transpose();
        assert_relative_eq!(rebuilt, tensor.to_matrix(), epsilon = 1e-4);
        assert_relative_eq!(resolved.local_pose.translation.vector.x, 0.1);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let tensor = InertiaTensor {
            ixx: 0.4,
            iyy: 0.3,
            izz: 0.2,
            ixy: 0.01,
            ixz: -0.02,
            iyz: 0.03,
        };
        let a = resolve(&inertial(1.5, tensor), "link").unwrap().unwrap();
        let b = resolve(&inertial(1.5, tensor), "link").unwrap().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_degenerate_tensors() {
        let negative = InertiaTensor::diagonal(1.0, -1.0, 1.0);
        let err = resolve(&inertial(1.0, negative), "bad_link").unwrap_err();
        assert!(matches!(err, SimError::NumericDegeneracy { ref context, .. } if context == "bad_link"));

        let nan = InertiaTensor::diagonal(f32::NAN, 1.0, 1.0);
        assert!(resolve(&inertial(1.0, nan), "link").is_err());

        assert!(resolve(&inertial(f32::INFINITY, InertiaTensor::diagonal(1.0, 1.0, 1.0)), "link").is_err());
    }

    #[test]
    fn test_compose_parallel_axis() {
        let part = inertial(1.0, InertiaTensor::diagonal(0.1, 0.1, 0.1));
        let left = Isometry3::translation(-1.0, 0.0, 0.0);
        let right = Isometry3::translation(1.0, 0.0, 0.0);

        let merged = compose(&[(&part, left), (&part, right)]).unwrap();
        assert_relative_eq!(merged.mass, 2.0);
        assert_relative_eq!(merged.origin.translation.vector.norm(), 0.0, epsilon = 1e-6);
        assert_relative_eq!(merged.inertia.ixx, 0.2, epsilon = 1e-5);
        assert_relative_eq!(merged.inertia.iyy, 2.2, epsilon = 1e-5);
        assert_relative_eq!(merged.inertia.izz, 2.2, epsilon = 1e-5);
    }

    #[test]
    fn test_compose_with_unspecified_part() {
        let known = inertial(1.0, InertiaTensor::diagonal(0.1, 0.1, 0.1));
        let unknown = inertial(1.0, InertiaTensor::default());
        assert!(compose(&[(&known, Isometry3::identity()), (&unknown, Isometry3::identity())]).is_none());
    }
}
