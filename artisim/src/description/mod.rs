//! Robot description model
//!
//! Passive, immutable data produced by a parser: links with inertial
//! parameters and geometry, joints connecting them, and optional camera mounts.
//! Nothing here validates the graph; see [`crate::tree`] for that.

mod gazebo;
mod urdf;

pub use gazebo::{CameraSensorParser, SensorKind};
pub use urdf::UrdfImporter;

use crate::error::{SimError, SimResult};
use nalgebra::{Isometry3, Matrix3, Vector3};
use std::fmt;
use std::path::PathBuf;

/// Geometry of a visual or collision element
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Box { size: [f32; 3] },
    /// Simulated as a capsule with the same radius and length
    Cylinder { radius: f32, length: f32 },
    Capsule { radius: f32, length: f32 },
    Sphere { radius: f32 },
    /// Mesh file; collisions use a convex decomposition of it
    Mesh { filename: PathBuf, scale: [f32; 3] },
}

impl Geometry {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Geometry::Box { .. } => "box",
            Geometry::Cylinder { .. } => "cylinder",
            Geometry::Capsule { .. } => "capsule",
            Geometry::Sphere { .. } => "sphere",
            Geometry::Mesh { .. } => "mesh",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualDescriptor {
    pub name: String,
    /// Pose of the geometry in the link frame
    pub origin: Isometry3<f32>,
    pub geometry: Geometry,
    pub color: Option<[f32; 4]>,
}

impl VisualDescriptor {
    pub fn new(name: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            name: name.into(),
            origin: Isometry3::identity(),
            geometry,
            color: None,
        }
    }

    pub fn with_origin(mut self, origin: Isometry3<f32>) -> Self {
        self.origin = origin;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollisionDescriptor {
    pub name: String,
    pub origin: Isometry3<f32>,
    pub geometry: Geometry,
}

impl CollisionDescriptor {
    pub fn new(name: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            name: name.into(),
            origin: Isometry3::identity(),
            geometry,
        }
    }

    pub fn with_origin(mut self, origin: Isometry3<f32>) -> Self {
        self.origin = origin;
        self
    }
}

/// Symmetric inertia tensor expressed in the inertial frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InertiaTensor {
    pub ixx: f32,
    pub iyy: f32,
    pub izz: f32,
    pub ixy: f32,
    pub ixz: f32,
    pub iyz: f32,
}

impl InertiaTensor {
    pub fn diagonal(ixx: f32, iyy: f32, izz: f32) -> Self {
        Self {
            ixx,
            iyy,
            izz,
            ..Default::default()
        }
    }

    /// All six components exactly zero means the description left it out
    pub fn is_unspecified(&self) -> bool {
        self.ixx == 0.0
            && self.iyy == 0.0
            && self.izz == 0.0
            && self.ixy == 0.0
            && self.ixz == 0.0
            && self.iyz == 0.0
    }

    pub fn to_matrix(&self) -> Matrix3<f32> {
        Matrix3::new(
            self.ixx, self.ixy, self.ixz, //
            self.ixy, self.iyy, self.iyz, //
            self.ixz, self.iyz, self.izz,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InertialDescriptor {
    pub mass: f32,
    /// Inertial frame relative to the link frame
    pub origin: Isometry3<f32>,
    pub inertia: InertiaTensor,
}

impl Default for InertialDescriptor {
    fn default() -> Self {
        Self {
            mass: 0.0,
            origin: Isometry3::identity(),
            inertia: InertiaTensor::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkDescriptor {
    pub name: String,
    pub inertial: InertialDescriptor,
    pub visuals: Vec<VisualDescriptor>,
    pub collisions: Vec<CollisionDescriptor>,
}

impl LinkDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inertial: InertialDescriptor::default(),
            visuals: Vec::new(),
            collisions: Vec::new(),
        }
    }

    pub fn with_inertial(mut self, inertial: InertialDescriptor) -> Self {
        self.inertial = inertial;
        self
    }

    pub fn with_visual(mut self, visual: VisualDescriptor) -> Self {
        self.visuals.push(visual);
        self
    }

    pub fn with_collision(mut self, collision: CollisionDescriptor) -> Self {
        self.collisions.push(collision);
        self
    }
}

/// Joint types the assembler can build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointKind {
    Fixed,
    Revolute,
    Continuous,
    Prismatic,
}

impl JointKind {
    /// Map a description kind string; `floating`, `planar` and anything else are rejected
    pub fn parse(kind: &str, joint: &str) -> SimResult<Self> {
        match kind {
            "fixed" => Ok(JointKind::Fixed),
            "revolute" => Ok(JointKind::Revolute),
            "continuous" => Ok(JointKind::Continuous),
            "prismatic" => Ok(JointKind::Prismatic),
            other => Err(SimError::unsupported(joint, other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JointKind::Fixed => "fixed",
            JointKind::Revolute => "revolute",
            JointKind::Continuous => "continuous",
            JointKind::Prismatic => "prismatic",
        }
    }

    /// Degrees of freedom of the joint
    pub fn dof(&self) -> usize {
        match self {
            JointKind::Fixed => 0,
            _ => 1,
        }
    }

    pub fn requires_limit(&self) -> bool {
        matches!(self, JointKind::Revolute | JointKind::Prismatic)
    }
}

impl fmt::Display for JointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimit {
    pub lower: f32,
    pub upper: f32,
}

impl JointLimit {
    pub fn new(lower: f32, upper: f32) -> Self {
        Self { lower, upper }
    }

    /// Finite bounds with `lower <= upper`
    pub fn is_valid(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite() && self.lower <= self.upper
    }

    /// Clamp into the limit; never panics, even on an invalid limit
    pub fn clamp(&self, value: f32) -> f32 {
        value.max(self.lower).min(self.upper)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JointDescriptor {
    pub name: String,
    /// Kind string as written in the description
    pub kind: String,
    pub parent: String,
    pub child: String,
    /// Joint frame relative to the parent link frame
    pub origin: Isometry3<f32>,
    /// Axis direction in the joint frame
    pub axis: Vector3<f32>,
    pub limit: Option<JointLimit>,
}

impl JointDescriptor {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        parent: impl Into<String>,
        child: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            parent: parent.into(),
            child: child.into(),
            origin: Isometry3::identity(),
            axis: Vector3::x(),
            limit: None,
        }
    }

    pub fn with_origin(mut self, origin: Isometry3<f32>) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_axis(mut self, axis: Vector3<f32>) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_limit(mut self, lower: f32, upper: f32) -> Self {
        self.limit = Some(JointLimit::new(lower, upper));
        self
    }

    pub fn joint_kind(&self) -> SimResult<JointKind> {
        JointKind::parse(&self.kind, &self.name)
    }

    /// Limit for limited kinds; `Description` error when it is missing
    pub fn required_limit(&self) -> SimResult<JointLimit> {
        self.limit.ok_or_else(|| {
            SimError::description(format!(
                "joint '{}' of type '{}' requires a limit",
                self.name, self.kind
            ))
        })
    }
}

/// Camera attached to a link, declared next to the robot description
#[derive(Debug, Clone, PartialEq)]
pub struct CameraMount {
    pub name: String,
    /// Name of the link the camera is mounted on
    pub reference: String,
    /// Camera pose in the link frame
    pub origin: Isometry3<f32>,
    pub width: u32,
    pub height: u32,
    pub fovx: f32,
    pub fovy: f32,
    pub depth: bool,
}

/// Full robot description
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotDescription {
    pub name: String,
    pub links: Vec<LinkDescriptor>,
    pub joints: Vec<JointDescriptor>,
    pub cameras: Vec<CameraMount>,
}

impl RobotDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a URDF document held in memory
    pub fn from_urdf_str(xml: &str) -> SimResult<Self> {
        UrdfImporter::new().import_str(xml)
    }

    /// Parse a URDF file; relative mesh paths resolve against its directory
    pub fn from_urdf_file(path: impl AsRef<std::path::Path>) -> SimResult<Self> {
        UrdfImporter::new().import_file(path)
    }

    pub fn with_link(mut self, link: LinkDescriptor) -> Self {
        self.links.push(link);
        self
    }

    pub fn with_joint(mut self, joint: JointDescriptor) -> Self {
        self.joints.push(joint);
        self
    }

    pub fn with_camera(mut self, camera: CameraMount) -> Self {
        self.cameras.push(camera);
        self
    }

    pub fn link(&self, name: &str) -> Option<&LinkDescriptor> {
        self.links.iter().find(|l| l.name == name)
    }

    pub fn joint(&self, name: &str) -> Option<&JointDescriptor> {
        self.joints.iter().find(|j| j.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_kind_parse() {
        assert_eq!(JointKind::parse("revolute", "j").unwrap(), JointKind::Revolute);
        assert_eq!(JointKind::parse("fixed", "j").unwrap().dof(), 0);

        for kind in ["floating", "planar", "spherical", "Revolute", ""] {
            let err = JointKind::parse(kind, "j1").unwrap_err();
            assert!(matches!(err, SimError::UnsupportedFeature { ref joint, .. } if joint == "j1"));
        }
    }

    #[test]
    fn test_unspecified_inertia() {
        assert!(InertiaTensor::default().is_unspecified());
        assert!(!InertiaTensor::diagonal(0.0, 0.0, 1e-9).is_unspecified());
        let t = InertiaTensor {
            ixy: -0.5,
            ..Default::default()
        };
        assert!(!t.is_unspecified());
        assert_eq!(t.to_matrix()[(1, 0)], -0.5);
    }

    #[test]
    fn test_required_limit() {
        let joint = JointDescriptor::new("elbow", "revolute", "upper", "lower");
        assert!(matches!(joint.required_limit(), Err(SimError::Description(_))));

        let joint = joint.with_limit(-1.0, 1.0);
        assert_eq!(joint.required_limit().unwrap(), JointLimit::new(-1.0, 1.0));
    }

    #[test]
    fn test_limit_clamp() {
        let limit = JointLimit::new(-0.5, 0.25);
        assert_eq!(limit.clamp(1.0), 0.25);
        assert_eq!(limit.clamp(-1.0), -0.5);
        assert_eq!(limit.clamp(0.0), 0.0);
    }

    #[test]
    fn test_invalid_limit_does_not_panic() {
        let inverted = JointLimit::new(1.0, -1.0);
        assert!(!inverted.is_valid());
        assert!(inverted.clamp(0.0).is_finite());

        let nan = JointLimit::new(f32::NAN, f32::NAN);
        assert!(!nan.is_valid());
        assert_eq!(nan.clamp(0.3), 0.3);
        assert!(JointLimit::new(-1.0, 1.0).is_valid());
    }
}
