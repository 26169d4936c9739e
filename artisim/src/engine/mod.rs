//! Physics engine boundary
//!
//! The scene and the assemblers only talk to the solver through
//! [`PhysicsEngine`]. Handles are opaque integers owned by the engine;
//! callers never see backend types.
//!
//! Removal is split in two: [`PhysicsEngine::detach_body`] takes the body out
//! of the simulation while keeping it allocated, and
//! [`PhysicsEngine::release_body`] frees it. The scene runs the first before
//! `simulate` and the second after `fetch_results`.

pub mod dry_run;
pub mod rapier;

pub use dry_run::{DryRunEngine, EngineCall};
pub use rapier::RapierEngine;

use crate::config::SceneConfig;
use crate::error::SimResult;
use crate::inertial::ResolvedInertia;
use nalgebra::{Isometry3, Point3, Unit, Vector3};
use std::fmt;

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

handle_type!(
    /// Rigid body or articulation link
    BodyHandle
);
handle_type!(
    /// Collision shape attached to a body
    ShapeHandle
);
handle_type!(
    /// Articulation joint, impulse joint or drive
    JointHandle
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKind {
    Dynamic,
    Kinematic,
    Static,
}

/// Collision geometry in engine terms
#[derive(Debug, Clone, PartialEq)]
pub enum CollisionShape {
    Cuboid { half_extents: Vector3<f32> },
    /// Capsule along the local Z axis
    Capsule { half_height: f32, radius: f32 },
    Ball { radius: f32 },
    ConvexDecomposition {
        vertices: Vec<Point3<f32>>,
        indices: Vec<[u32; 3]>,
    },
    /// Infinite plane through the local origin
    HalfSpace { normal: Unit<Vector3<f32>> },
}

impl CollisionShape {
    pub fn kind_name(&self) -> &'static str {
        match self {
            CollisionShape::Cuboid { .. } => "cuboid",
            CollisionShape::Capsule { .. } => "capsule",
            CollisionShape::Ball { .. } => "ball",
            CollisionShape::ConvexDecomposition { .. } => "convex_decomposition",
            CollisionShape::HalfSpace { .. } => "half_space",
        }
    }
}

/// Surface material of a collision shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeMaterial {
    pub friction: f32,
    pub restitution: f32,
    pub density: f32,
}

impl ShapeMaterial {
    pub fn from_config(config: &SceneConfig) -> Self {
        Self {
            friction: config.friction,
            restitution: config.restitution,
            density: config.default_density,
        }
    }
}

impl Default for ShapeMaterial {
    fn default() -> Self {
        Self::from_config(&SceneConfig::default())
    }
}

/// Explicit mass properties of a body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassProperties {
    pub mass: f32,
    pub principal_inertia: Vector3<f32>,
    /// Centre of mass and principal axes in the body frame
    pub local_frame: Isometry3<f32>,
}

impl From<ResolvedInertia> for MassProperties {
    fn from(resolved: ResolvedInertia) -> Self {
        Self {
            mass: resolved.mass,
            principal_inertia: resolved.principal,
            local_frame: resolved.local_pose,
        }
    }
}

/// Degrees of freedom of an engine joint; motion happens along the joint X axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointMotion {
    Fixed,
    Revolute { limit: Option<[f32; 2]> },
    Prismatic { limit: Option<[f32; 2]> },
}

impl JointMotion {
    pub fn dof(&self) -> usize {
        match self {
            JointMotion::Fixed => 0,
            _ => 1,
        }
    }

    pub fn limit(&self) -> Option<[f32; 2]> {
        match self {
            JointMotion::Fixed => None,
            JointMotion::Revolute { limit } | JointMotion::Prismatic { limit } => *limit,
        }
    }
}

/// Joint between a parent and a child body
#[derive(Debug, Clone, PartialEq)]
pub struct JointSpec {
    pub name: String,
    pub motion: JointMotion,
    /// Joint frame in the parent body frame
    pub parent_pose: Isometry3<f32>,
    /// Joint frame in the child body frame
    pub child_pose: Isometry3<f32>,
    pub friction: f32,
}

/// Spring parameters of a drive or joint motor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveProperties {
    pub stiffness: f32,
    pub damping: f32,
    pub force_limit: f32,
}

impl Default for DriveProperties {
    fn default() -> Self {
        Self {
            stiffness: 0.0,
            damping: 0.0,
            force_limit: f32::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactKind {
    Start,
    Persist,
    End,
}

/// Contact transition between two shapes reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEvent {
    pub kind: ContactKind,
    pub shape_a: ShapeHandle,
    pub shape_b: ShapeHandle,
}

impl ContactEvent {
    pub fn new(kind: ContactKind, shape_a: ShapeHandle, shape_b: ShapeHandle) -> Self {
        Self {
            kind,
            shape_a,
            shape_b,
        }
    }
}

/// Rigid body / articulation engine used by the scene
pub trait PhysicsEngine {
    /// Standalone rigid body at `pose` in world space
    fn create_body(&mut self, kind: BodyKind, pose: Isometry3<f32>, name: &str) -> SimResult<BodyHandle>;

    /// Articulation link; `parent` is `None` for the root. The inbound joint is
    /// configured separately with [`Self::configure_inbound_joint`].
    fn create_articulation_link(
        &mut self,
        parent: Option<BodyHandle>,
        pose: Isometry3<f32>,
        fix_root: bool,
        name: &str,
    ) -> SimResult<BodyHandle>;

    /// Reduced-coordinate joint between a link and the parent given at creation
    fn configure_inbound_joint(&mut self, link: BodyHandle, joint: &JointSpec) -> SimResult<JointHandle>;

    /// Maximal-coordinate joint between two standalone bodies
    fn create_joint(&mut self, parent: BodyHandle, child: BodyHandle, joint: &JointSpec) -> SimResult<JointHandle>;

    /// Six-DOF spring between two bodies; `body1 == None` anchors to the world
    fn create_drive(
        &mut self,
        body1: Option<BodyHandle>,
        pose1: Isometry3<f32>,
        body2: BodyHandle,
        pose2: Isometry3<f32>,
    ) -> SimResult<JointHandle>;

    fn set_drive_properties(&mut self, drive: JointHandle, properties: DriveProperties) -> SimResult<()>;

    /// Target pose of body 2's drive frame relative to body 1's
    fn set_drive_target(&mut self, drive: JointHandle, target: Isometry3<f32>) -> SimResult<()>;

    /// Position target and spring of a one-DOF joint motor
    fn set_joint_drive(&mut self, joint: JointHandle, target: f32, properties: DriveProperties) -> SimResult<()>;

    fn destroy_joint(&mut self, joint: JointHandle) -> SimResult<()>;

    fn attach_shape(
        &mut self,
        body: BodyHandle,
        shape: &CollisionShape,
        local_pose: Isometry3<f32>,
        material: ShapeMaterial,
    ) -> SimResult<ShapeHandle>;

    fn set_mass_properties(&mut self, body: BodyHandle, mass: &MassProperties) -> SimResult<()>;

    /// Estimate mass and inertia from the attached shapes at `density`
    fn update_mass_from_shapes(&mut self, body: BodyHandle, density: f32) -> SimResult<()>;

    /// Compensate gravity on the body (passive force balancing)
    fn set_passive_force_balance(&mut self, body: BodyHandle, enabled: bool) -> SimResult<()>;

    fn body_kind(&self, body: BodyHandle) -> Option<BodyKind>;

    fn body_pose(&self, body: BodyHandle) -> Option<Isometry3<f32>>;

    fn set_kinematic_target(&mut self, body: BodyHandle, pose: Isometry3<f32>) -> SimResult<()>;

    fn wake_up(&mut self, body: BodyHandle);

    /// Shapes currently attached to the body
    fn body_shapes(&self, body: BodyHandle) -> Vec<ShapeHandle>;

    /// Removal pass 1: stop simulating the body; it stays allocated
    fn detach_body(&mut self, body: BodyHandle) -> SimResult<()>;

    /// Removal pass 2: free the body, its shapes and remaining joints
    fn release_body(&mut self, body: BodyHandle) -> SimResult<()>;

    fn simulate(&mut self, dt: f32) -> SimResult<()>;

    /// Whether results of the last `simulate` are available; blocks when `block` is set
    fn fetch_results(&mut self, block: bool) -> bool;

    /// Contact transitions buffered since the last drain, in delivery order
    fn drain_contact_events(&mut self) -> Vec<ContactEvent>;

    fn is_dynamic(&self, body: BodyHandle) -> bool {
        self.body_kind(body) == Some(BodyKind::Dynamic)
    }
}

