//! Bookkeeping engine without dynamics
//!
//! Every call is validated against the engine's own view of the world and
//! appended to a log, so assembly and lifecycle code can be checked without a
//! solver. Kinematic targets are applied on `simulate`; nothing else moves.
//! Contact events can be injected and are delivered on the next `simulate`.

use super::{
    BodyHandle, BodyKind, CollisionShape, ContactEvent, DriveProperties, JointHandle, JointMotion,
    JointSpec, MassProperties, PhysicsEngine, ShapeHandle, ShapeMaterial,
};
use crate::error::{SimError, SimResult};
use nalgebra::Isometry3;
use std::collections::{BTreeMap, HashMap};

/// One recorded engine call
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    CreateBody { body: BodyHandle, kind: BodyKind, name: String },
    CreateLink { body: BodyHandle, parent: Option<BodyHandle>, name: String },
    ConfigureJoint { joint: JointHandle, link: BodyHandle, name: String, motion: JointMotion },
    CreateJoint { joint: JointHandle, parent: BodyHandle, child: BodyHandle, name: String, motion: JointMotion },
    CreateDrive { drive: JointHandle, body1: Option<BodyHandle>, body2: BodyHandle },
    SetDriveProperties { drive: JointHandle, properties: DriveProperties },
    SetDriveTarget { drive: JointHandle },
    SetJointDrive { joint: JointHandle, target: f32 },
    DestroyJoint(JointHandle),
    AttachShape { body: BodyHandle, shape: ShapeHandle, kind: &'static str },
    SetMass { body: BodyHandle, mass: f32 },
    EstimateMass { body: BodyHandle, density: f32 },
    PassiveForceBalance { body: BodyHandle, enabled: bool },
    SetKinematicTarget { body: BodyHandle },
    WakeUp(BodyHandle),
    Detach(BodyHandle),
    Release(BodyHandle),
    Simulate(f32),
    FetchResults,
}

#[derive(Debug, Clone)]
struct DryBody {
    kind: BodyKind,
    name: String,
    pose: Isometry3<f32>,
    parent: Option<BodyHandle>,
    is_link: bool,
    shapes: Vec<ShapeHandle>,
    mass: Option<MassProperties>,
    estimated_density: Option<f32>,
    kinematic_target: Option<Isometry3<f32>>,
    passive_balance: bool,
    detached: bool,
}

#[derive(Debug, Clone)]
struct DryJoint {
    name: String,
    motion: Option<JointMotion>,
    bodies: (Option<BodyHandle>, BodyHandle),
    drive: Option<(f32, DriveProperties)>,
}

/// [`PhysicsEngine`] that only keeps books
#[derive(Debug, Default)]
pub struct DryRunEngine {
    calls: Vec<EngineCall>,
    bodies: BTreeMap<BodyHandle, DryBody>,
    joints: BTreeMap<JointHandle, DryJoint>,
    shapes: HashMap<ShapeHandle, BodyHandle>,
    injected: Vec<ContactEvent>,
    pending: Vec<ContactEvent>,
    stepping: bool,
    elapsed: f32,
    next_id: u64,
}

impl DryRunEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn body(&self, body: BodyHandle) -> SimResult<&DryBody> {
        self.bodies
            .get(&body)
            .ok_or_else(|| SimError::Engine(format!("unknown body {}", body)))
    }

    fn body_mut(&mut self, body: BodyHandle) -> SimResult<&mut DryBody> {
        self.bodies
            .get_mut(&body)
            .ok_or_else(|| SimError::Engine(format!("unknown body {}", body)))
    }

    fn live_body(&mut self, body: BodyHandle) -> SimResult<&mut DryBody> {
        let entry = self.body_mut(body)?;
        if entry.detached {
            return Err(SimError::Engine(format!("body {} is detached", body)));
        }
        Ok(entry)
    }

    fn insert_body(&mut self, kind: BodyKind, pose: Isometry3<f32>, parent: Option<BodyHandle>, is_link: bool, name: &str) -> BodyHandle {
        let body = BodyHandle(self.next_id());
        self.bodies.insert(
            body,
            DryBody {
                kind,
                name: name.to_string(),
                pose,
                parent,
                is_link,
                shapes: Vec::new(),
                mass: None,
                estimated_density: None,
                kinematic_target: None,
                passive_balance: false,
                detached: false,
            },
        );
        body
    }

    /// Queue a contact event for delivery by the next `simulate`
    pub fn inject_contact(&mut self, event: ContactEvent) {
        self.injected.push(event);
    }

    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Bodies still allocated, detached ones included
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn link_count(&self) -> usize {
        self.bodies.values().filter(|b| b.is_link).count()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn is_allocated(&self, body: BodyHandle) -> bool {
        self.bodies.contains_key(&body)
    }

    pub fn is_detached(&self, body: BodyHandle) -> bool {
        self.bodies.get(&body).map(|b| b.detached).unwrap_or(false)
    }

    pub fn body_name(&self, body: BodyHandle) -> Option<&str> {
        self.bodies.get(&body).map(|b| b.name.as_str())
    }

    pub fn body_by_name(&self, name: &str) -> Option<BodyHandle> {
        self.bodies
            .iter()
            .find(|(_, b)| b.name == name)
            .map(|(handle, _)| *handle)
    }

    pub fn parent_of(&self, body: BodyHandle) -> Option<BodyHandle> {
        self.bodies.get(&body).and_then(|b| b.parent)
    }

    pub fn mass_properties(&self, body: BodyHandle) -> Option<MassProperties> {
        self.bodies.get(&body).and_then(|b| b.mass)
    }

    pub fn estimated_density(&self, body: BodyHandle) -> Option<f32> {
        self.bodies.get(&body).and_then(|b| b.estimated_density)
    }

    pub fn passive_force_balanced(&self, body: BodyHandle) -> bool {
        self.bodies.get(&body).map(|b| b.passive_balance).unwrap_or(false)
    }

    pub fn joint_motion(&self, joint: JointHandle) -> Option<JointMotion> {
        self.joints.get(&joint).and_then(|j| j.motion)
    }

    pub fn joint_name(&self, joint: JointHandle) -> Option<&str> {
        self.joints.get(&joint).map(|j| j.name.as_str())
    }

    /// Last position target pushed to a joint motor
    pub fn joint_drive_target(&self, joint: JointHandle) -> Option<f32> {
        self.joints.get(&joint).and_then(|j| j.drive).map(|(target, _)| target)
    }

    /// Motions of every single-body joint, in creation order
    pub fn joint_motions(&self) -> Vec<JointMotion> {
        self.joints.values().filter_map(|j| j.motion).collect()
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn wake_count(&self, body: BodyHandle) -> usize {
        self.calls
            .iter()
            .filter(|c| **c == EngineCall::WakeUp(body))
            .count()
    }
}

impl PhysicsEngine for DryRunEngine {
    fn create_body(&mut self, kind: BodyKind, pose: Isometry3<f32>, name: &str) -> SimResult<BodyHandle> {
        let body = self.insert_body(kind, pose, None, false, name);
        self.calls.push(EngineCall::CreateBody {
            body,
            kind,
            name: name.to_string(),
        });
        Ok(body)
    }

    fn create_articulation_link(
        &mut self,
        parent: Option<BodyHandle>,
        pose: Isometry3<f32>,
        fix_root: bool,
        name: &str,
    ) -> SimResult<BodyHandle> {
        let kind = match parent {
            Some(parent) => {
                self.live_body(parent)?;
                BodyKind::Dynamic
            }
            None if fix_root => BodyKind::Static,
            None => BodyKind::Dynamic,
        };
        let body = self.insert_body(kind, pose, parent, true, name);
        self.calls.push(EngineCall::CreateLink {
            body,
            parent,
            name: name.to_string(),
        });
        Ok(body)
    }

    fn configure_inbound_joint(&mut self, link: BodyHandle, joint: &JointSpec) -> SimResult<JointHandle> {
        let parent = self
            .live_body(link)?
            .parent
            .ok_or_else(|| SimError::Engine(format!("{} is a root link", link)))?;
        if self.joints.values().any(|j| j.bodies.1 == link && j.bodies.0 == Some(parent)) {
            return Err(SimError::Engine(format!("{} already has an inbound joint", link)));
        }

        let handle = JointHandle(self.next_id());
        self.joints.insert(
            handle,
            DryJoint {
                name: joint.name.clone(),
                motion: Some(joint.motion),
                bodies: (Some(parent), link),
                drive: None,
            },
        );
        self.calls.push(EngineCall::ConfigureJoint {
            joint: handle,
            link,
            name: joint.name.clone(),
            motion: joint.motion,
        });
        Ok(handle)
    }

    fn create_joint(&mut self, parent: BodyHandle, child: BodyHandle, joint: &JointSpec) -> SimResult<JointHandle> {
        self.live_body(parent)?;
        self.live_body(child)?;

        let handle = JointHandle(self.next_id());
        self.joints.insert(
            handle,
            DryJoint {
                name: joint.name.clone(),
                motion: Some(joint.motion),
                bodies: (Some(parent), child),
                drive: None,
            },
        );
        self.calls.push(EngineCall::CreateJoint {
            joint: handle,
            parent,
            child,
            name: joint.name.clone(),
            motion: joint.motion,
        });
        Ok(handle)
    }

    fn create_drive(
        &mut self,
        body1: Option<BodyHandle>,
        _pose1: Isometry3<f32>,
        body2: BodyHandle,
        _pose2: Isometry3<f32>,
    ) -> SimResult<JointHandle> {
        if let Some(body1) = body1 {
            self.live_body(body1)?;
        }
        self.live_body(body2)?;

        let drive = JointHandle(self.next_id());
        self.joints.insert(
            drive,
            DryJoint {
                name: format!("drive_{}", drive.0),
                motion: None,
                bodies: (body1, body2),
                drive: None,
            },
        );
        self.calls.push(EngineCall::CreateDrive { drive, body1, body2 });
        Ok(drive)
    }

    fn set_drive_properties(&mut self, drive: JointHandle, properties: DriveProperties) -> SimResult<()> {
        if !self.joints.contains_key(&drive) {
            return Err(SimError::Engine(format!("unknown drive {}", drive)));
        }
        self.calls.push(EngineCall::SetDriveProperties { drive, properties });
        Ok(())
    }

    fn set_drive_target(&mut self, drive: JointHandle, _target: Isometry3<f32>) -> SimResult<()> {
        if !self.joints.contains_key(&drive) {
            return Err(SimError::Engine(format!("unknown drive {}", drive)));
        }
        self.calls.push(EngineCall::SetDriveTarget { drive });
        Ok(())
    }

    fn set_joint_drive(&mut self, joint: JointHandle, target: f32, properties: DriveProperties) -> SimResult<()> {
        let entry = self
            .joints
            .get_mut(&joint)
            .ok_or_else(|| SimError::Engine(format!("unknown joint {}", joint)))?;
        match entry.motion {
            Some(motion) if motion.dof() == 1 => entry.drive = Some((target, properties)),
            _ => return Err(SimError::Engine(format!("{} has no drivable axis", joint))),
        }
        self.calls.push(EngineCall::SetJointDrive { joint, target });
        Ok(())
    }

    fn destroy_joint(&mut self, joint: JointHandle) -> SimResult<()> {
        self.joints
            .remove(&joint)
            .ok_or_else(|| SimError::Engine(format!("unknown joint {}", joint)))?;
        self.calls.push(EngineCall::DestroyJoint(joint));
        Ok(())
    }

    fn attach_shape(
        &mut self,
        body: BodyHandle,
        shape: &CollisionShape,
        _local_pose: Isometry3<f32>,
        _material: ShapeMaterial,
    ) -> SimResult<ShapeHandle> {
        self.live_body(body)?;
        let handle = ShapeHandle(self.next_id());
        self.live_body(body)?.shapes.push(handle);
        self.shapes.insert(handle, body);
        self.calls.push(EngineCall::AttachShape {
            body,
            shape: handle,
            kind: shape.kind_name(),
        });
        Ok(handle)
    }

    fn set_mass_properties(&mut self, body: BodyHandle, mass: &MassProperties) -> SimResult<()> {
        let entry = self.live_body(body)?;
        entry.mass = Some(*mass);
        entry.estimated_density = None;
        self.calls.push(EngineCall::SetMass { body, mass: mass.mass });
        Ok(())
    }

    fn update_mass_from_shapes(&mut self, body: BodyHandle, density: f32) -> SimResult<()> {
        let entry = self.live_body(body)?;
        entry.mass = None;
        entry.estimated_density = Some(density);
        self.calls.push(EngineCall::EstimateMass { body, density });
        Ok(())
    }

    fn set_passive_force_balance(&mut self, body: BodyHandle, enabled: bool) -> SimResult<()> {
        self.live_body(body)?.passive_balance = enabled;
        self.calls.push(EngineCall::PassiveForceBalance { body, enabled });
        Ok(())
    }

    fn body_kind(&self, body: BodyHandle) -> Option<BodyKind> {
        self.bodies.get(&body).map(|b| b.kind)
    }

    fn body_pose(&self, body: BodyHandle) -> Option<Isometry3<f32>> {
        self.bodies.get(&body).map(|b| b.pose)
    }

    fn set_kinematic_target(&mut self, body: BodyHandle, pose: Isometry3<f32>) -> SimResult<()> {
        let entry = self.live_body(body)?;
        if entry.kind != BodyKind::Kinematic {
            return Err(SimError::Engine(format!("{} is not kinematic", body)));
        }
        entry.kinematic_target = Some(pose);
        self.calls.push(EngineCall::SetKinematicTarget { body });
        Ok(())
    }

    fn wake_up(&mut self, body: BodyHandle) {
        if self.bodies.contains_key(&body) {
            self.calls.push(EngineCall::WakeUp(body));
        }
    }

    fn body_shapes(&self, body: BodyHandle) -> Vec<ShapeHandle> {
        self.bodies
            .get(&body)
            .map(|b| b.shapes.clone())
            .unwrap_or_default()
    }

    fn detach_body(&mut self, body: BodyHandle) -> SimResult<()> {
        let entry = self.body_mut(body)?;
        if entry.detached {
            return Err(SimError::Engine(format!("{} is already detached", body)));
        }
        entry.detached = true;
        self.calls.push(EngineCall::Detach(body));
        Ok(())
    }

    fn release_body(&mut self, body: BodyHandle) -> SimResult<()> {
        if !self.body(body)?.detached {
            return Err(SimError::Engine(format!("{} released before being detached", body)));
        }
        if self.stepping {
            return Err(SimError::Engine(format!("{} released while a step is in flight", body)));
        }
        if let Some(entry) = self.bodies.remove(&body) {
            for shape in entry.shapes {
                self.shapes.remove(&shape);
            }
        }
        self.joints
            .retain(|_, j| j.bodies.0 != Some(body) && j.bodies.1 != body);
        self.calls.push(EngineCall::Release(body));
        Ok(())
    }

    fn simulate(&mut self, dt: f32) -> SimResult<()> {
        if self.stepping {
            return Err(SimError::Engine("simulate called before results were fetched".into()));
        }
        for body in self.bodies.values_mut().filter(|b| !b.detached) {
            if let Some(target) = body.kinematic_target.take() {
                body.pose = target;
            }
        }

        self.pending.append(&mut self.injected);
        self.elapsed += dt;
        self.stepping = true;
        self.calls.push(EngineCall::Simulate(dt));
        Ok(())
    }

    fn fetch_results(&mut self, _block: bool) -> bool {
        self.stepping = false;
        self.calls.push(EngineCall::FetchResults);
        true
    }

    fn drain_contact_events(&mut self) -> Vec<ContactEvent> {
        std::mem::take(&mut self.pending)
    }
}
