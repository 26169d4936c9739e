//! Scene objects and their per-step control state

use super::events::{EventEmitter, PreDestroyEvent};
use crate::config::AssemblyStrategy;
use crate::description::{JointKind, JointLimit};
use crate::engine::{BodyHandle, DriveProperties, JointHandle, PhysicsEngine, ShapeHandle};
use crate::error::{SimError, SimResult};
use crate::render::{RenderId, VisualRole};
use nalgebra::{Isometry3, Vector3};
use std::collections::HashMap;
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} {}", $label, self.0)
            }
        }
    };
}

id_type!(
    /// Actor, articulation or kinematic articulation
    ObjectId,
    "object"
);
id_type!(
    /// Stable id of one simulated body (an actor or an articulation link)
    ActorId,
    "actor"
);
id_type!(DriveId, "drive");
id_type!(CameraId, "camera");
id_type!(LightId, "light");

/// Destruction marker of a scene object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestroyState {
    Live,
    /// Removal requested; still simulated until pass-1 cleanup
    PendingDetach,
    /// Out of the simulation; freed by pass-2 cleanup
    PendingRelease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Actor,
    Articulation,
    KinematicArticulation,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Actor => "actor",
            ObjectKind::Articulation => "articulation",
            ObjectKind::KinematicArticulation => "kinematic articulation",
        }
    }
}

/// Renderer body following a simulated body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderAttachment {
    pub id: RenderId,
    pub local_pose: Isometry3<f32>,
    pub role: VisualRole,
}

/// One assembled body owned by a scene object
#[derive(Debug, Clone)]
pub struct SimBody {
    pub id: ActorId,
    pub name: String,
    pub handle: BodyHandle,
    pub shapes: Vec<ShapeHandle>,
    pub visuals: Vec<RenderAttachment>,
}

/// Joint of an articulation, joint system or kinematic articulation
#[derive(Debug, Clone)]
pub struct ArticulationJoint {
    pub name: String,
    pub kind: JointKind,
    /// Index of the parent body, `None` for a root joint
    pub parent: Option<usize>,
    pub child: usize,
    /// Engine joint; kinematic joints have none
    pub handle: Option<JointHandle>,
    /// Joint frame in the parent body frame
    pub parent_pose: Isometry3<f32>,
    /// Joint frame in the child body frame
    pub child_pose: Isometry3<f32>,
    pub limit: Option<JointLimit>,
    drive: Option<(f32, DriveProperties)>,
    drive_dirty: bool,
}

impl ArticulationJoint {
    pub fn new(name: impl Into<String>, kind: JointKind, parent: Option<usize>, child: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            parent,
            child,
            handle: None,
            parent_pose: Isometry3::identity(),
            child_pose: Isometry3::identity(),
            limit: None,
            drive: None,
            drive_dirty: false,
        }
    }

    pub fn with_handle(mut self, handle: JointHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn with_frames(mut self, parent_pose: Isometry3<f32>, child_pose: Isometry3<f32>) -> Self {
        self.parent_pose = parent_pose;
        self.child_pose = child_pose;
        self
    }

    pub fn with_limit(mut self, limit: Option<JointLimit>) -> Self {
        self.limit = limit;
        self
    }

    pub fn dof(&self) -> usize {
        self.kind.dof()
    }

    /// Buffered drive target and spring
    pub fn drive(&self) -> Option<(f32, DriveProperties)> {
        self.drive
    }

    /// Motion of the child frame relative to the parent frame at position `q`
    fn motion(&self, q: f32) -> Isometry3<f32> {
        match self.kind {
            JointKind::Fixed => Isometry3::identity(),
            JointKind::Revolute | JointKind::Continuous => Isometry3::rotation(Vector3::x() * q),
            JointKind::Prismatic => Isometry3::translation(q, 0.0, 0.0),
        }
    }
}

/// Object-kind specific state pushed by the pre-step hook
#[derive(Debug, Clone)]
pub(crate) enum Control {
    Actor {
        target: Option<Isometry3<f32>>,
    },
    Articulation {
        strategy: AssemblyStrategy,
        balance_passive_force: bool,
        balance_dirty: bool,
    },
    Kinematic {
        root_pose: Isometry3<f32>,
        qpos: Vec<f32>,
        dirty: bool,
    },
}

/// Actor, articulation or kinematic articulation owned by a scene
#[derive(Debug)]
pub struct SceneObject {
    id: ObjectId,
    name: String,
    kind: ObjectKind,
    state: DestroyState,
    bodies: Vec<SimBody>,
    joints: Vec<ArticulationJoint>,
    root: usize,
    /// Link name to owning body index and link frame in that body
    link_frames: HashMap<String, (usize, Isometry3<f32>)>,
    control: Control,
    pub(crate) pre_destroy: EventEmitter<PreDestroyEvent>,
}

impl SceneObject {
    pub(crate) fn actor(id: ObjectId, body: SimBody) -> Self {
        let mut link_frames = HashMap::new();
        link_frames.insert(body.name.clone(), (0, Isometry3::identity()));
        Self {
            id,
            name: body.name.clone(),
            kind: ObjectKind::Actor,
            state: DestroyState::Live,
            bodies: vec![body],
            joints: Vec::new(),
            root: 0,
            link_frames,
            control: Control::Actor { target: None },
            pre_destroy: EventEmitter::new(),
        }
    }

    pub(crate) fn articulated(
        id: ObjectId,
        name: impl Into<String>,
        bodies: Vec<SimBody>,
        joints: Vec<ArticulationJoint>,
        root: usize,
        link_frames: HashMap<String, (usize, Isometry3<f32>)>,
        control: Control,
    ) -> Self {
        let kind = match control {
            Control::Kinematic { .. } => ObjectKind::KinematicArticulation,
            _ => ObjectKind::Articulation,
        };
        Self {
            id,
            name: name.into(),
            kind,
            state: DestroyState::Live,
            bodies,
            joints,
            root,
            link_frames,
            control,
            pre_destroy: EventEmitter::new(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn state(&self) -> DestroyState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: DestroyState) {
        self.state = state;
    }

    pub fn is_live(&self) -> bool {
        self.state == DestroyState::Live
    }

    pub fn bodies(&self) -> &[SimBody] {
        &self.bodies
    }

    pub fn root_body(&self) -> &SimBody {
        &self.bodies[self.root]
    }

    pub fn body(&self, name: &str) -> Option<&SimBody> {
        self.bodies.iter().find(|b| b.name == name)
    }

    pub fn joints(&self) -> &[ArticulationJoint] {
        &self.joints
    }

    pub fn joint(&self, name: &str) -> Option<&ArticulationJoint> {
        self.joints.iter().find(|j| j.name == name)
    }

    /// Body carrying a link and the link frame inside it; collapsed links share a body
    pub fn link_frame(&self, link: &str) -> Option<(&SimBody, Isometry3<f32>)> {
        self.link_frames
            .get(link)
            .map(|(index, offset)| (&self.bodies[*index], *offset))
    }

    /// Strategy the object was assembled with; `None` for actors
    pub fn strategy(&self) -> Option<AssemblyStrategy> {
        match self.control {
            Control::Actor { .. } => None,
            Control::Articulation { strategy, .. } => Some(strategy),
            Control::Kinematic { .. } => Some(AssemblyStrategy::Kinematic),
        }
    }

    /// Degrees of freedom summed over all joints
    pub fn dof(&self) -> usize {
        self.joints.iter().map(ArticulationJoint::dof).sum()
    }

    fn joint_mut(&mut self, name: &str) -> SimResult<&mut ArticulationJoint> {
        let object = self.name.clone();
        self.joints
            .iter_mut()
            .find(|j| j.name == name)
            .ok_or(SimError::ReferenceResolution {
                owner: object,
                reference: name.to_string(),
            })
    }

    /// Buffer a kinematic target for an actor; pushed by the next pre-step hook
    pub(crate) fn set_kinematic_target(&mut self, pose: Isometry3<f32>) -> SimResult<()> {
        match &mut self.control {
            Control::Actor { target } => {
                *target = Some(pose);
                Ok(())
            }
            _ => Err(SimError::LifecycleConsistency(format!(
                "'{}' is not an actor",
                self.name
            ))),
        }
    }

    /// Buffer a position target and spring for a one-DOF articulation joint
    pub fn set_drive_target(&mut self, joint: &str, target: f32, properties: DriveProperties) -> SimResult<()> {
        if !matches!(self.control, Control::Articulation { .. }) {
            return Err(SimError::LifecycleConsistency(format!(
                "{} '{}' has no joint drives",
                self.kind.as_str(),
                self.name
            )));
        }
        let entry = self.joint_mut(joint)?;
        if entry.dof() != 1 || entry.handle.is_none() {
            return Err(SimError::LifecycleConsistency(format!(
                "joint '{}' cannot be driven",
                joint
            )));
        }
        let target = match entry.limit {
            Some(limit) => limit.clamp(target),
            None => target,
        };
        entry.drive = Some((target, properties));
        entry.drive_dirty = true;
        Ok(())
    }

    pub fn set_balance_passive_force(&mut self, enabled: bool) -> SimResult<()> {
        match &mut self.control {
            Control::Articulation {
                balance_passive_force,
                balance_dirty,
                ..
            } => {
                *balance_dirty |= *balance_passive_force != enabled;
                *balance_passive_force = enabled;
                Ok(())
            }
            _ => Err(SimError::LifecycleConsistency(format!(
                "{} '{}' has no passive forces to balance",
                self.kind.as_str(),
                self.name
            ))),
        }
    }

    /// Joint positions of a kinematic articulation, one per movable joint
    pub fn qpos(&self) -> Option<&[f32]> {
        match &self.control {
            Control::Kinematic { qpos, .. } => Some(qpos),
            _ => None,
        }
    }

    /// Set joint positions of a kinematic articulation, clamped to the joint limits
    pub fn set_qpos(&mut self, values: &[f32]) -> SimResult<()> {
        let limits: Vec<Option<JointLimit>> = self
            .joints
            .iter()
            .filter(|j| j.dof() == 1)
            .map(|j| j.limit)
            .collect();

        match &mut self.control {
            Control::Kinematic { qpos, dirty, .. } => {
                if values.len() != qpos.len() {
                    return Err(SimError::description(format!(
                        "'{}' expects {} joint positions, got {}",
                        self.name,
                        qpos.len(),
                        values.len()
                    )));
                }
                for ((q, value), limit) in qpos.iter_mut().zip(values).zip(&limits) {
                    *q = match limit {
                        Some(limit) => limit.clamp(*value),
                        None => *value,
                    };
                }
                *dirty = true;
                Ok(())
            }
            _ => Err(SimError::LifecycleConsistency(format!(
                "{} '{}' has no joint positions",
                self.kind.as_str(),
                self.name
            ))),
        }
    }

    /// Move the root of a kinematic articulation
    pub fn set_root_pose(&mut self, pose: Isometry3<f32>) -> SimResult<()> {
        match &mut self.control {
            Control::Kinematic { root_pose, dirty, .. } => {
                *root_pose = pose;
                *dirty = true;
                Ok(())
            }
            _ => Err(SimError::LifecycleConsistency(format!(
                "{} '{}' is not kinematic",
                self.kind.as_str(),
                self.name
            ))),
        }
    }

    /// World poses of every body from the current joint positions
    ///
    /// Joints are stored parents first, so one pass root to leaf suffices.
    pub fn forward_kinematics(&self) -> Option<Vec<Isometry3<f32>>> {
        let (root_pose, qpos) = match &self.control {
            Control::Kinematic { root_pose, qpos, .. } => (*root_pose, qpos),
            _ => return None,
        };

        let mut poses = vec![Isometry3::identity(); self.bodies.len()];
        let mut q = qpos.iter();
        for joint in &self.joints {
            let position = if joint.dof() == 1 {
                q.next().copied().unwrap_or(0.0)
            } else {
                0.0
            };
            let parent = match joint.parent {
                Some(parent) => poses[parent],
                None => root_pose,
            };
            poses[joint.child] =
                parent * joint.parent_pose * joint.motion(position) * joint.child_pose.inverse();
        }
        Some(poses)
    }

    /// Push buffered control state to the engine
    pub(crate) fn pre_step<E: PhysicsEngine>(&mut self, engine: &mut E) {
        let poses = match &self.control {
            Control::Kinematic { dirty: true, .. } => self.forward_kinematics(),
            _ => None,
        };

        match &mut self.control {
            Control::Actor { target } => {
                if let Some(pose) = target.take() {
                    if let Err(err) = engine.set_kinematic_target(self.bodies[0].handle, pose) {
                        tracing::error!("'{}': {}", self.name, err);
                    }
                }
            }
            Control::Articulation {
                balance_passive_force,
                balance_dirty,
                ..
            } => {
                if std::mem::take(balance_dirty) {
                    for body in &self.bodies {
                        if let Err(err) = engine.set_passive_force_balance(body.handle, *balance_passive_force) {
                            tracing::error!("'{}' link '{}': {}", self.name, body.name, err);
                        }
                    }
                }
                for joint in self.joints.iter_mut().filter(|j| j.drive_dirty) {
                    joint.drive_dirty = false;
                    if let (Some(handle), Some((target, properties))) = (joint.handle, joint.drive) {
                        if let Err(err) = engine.set_joint_drive(handle, target, properties) {
                            tracing::error!("'{}' joint '{}': {}", self.name, joint.name, err);
                        }
                    }
                }
            }
            Control::Kinematic { dirty, .. } => {
                *dirty = false;
                for (body, pose) in self.bodies.iter().zip(poses.unwrap_or_default()) {
                    if let Err(err) = engine.set_kinematic_target(body.handle, pose) {
                        tracing::error!("'{}' link '{}': {}", self.name, body.name, err);
                    }
                }
            }
        }
    }
}
