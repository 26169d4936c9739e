//! Rapier3D backend
//!
//! Articulations map to multibody joints, joint systems and drives to impulse
//! joints. Collision events are buffered by an [`EventHandler`] during the
//! step and converted to [`ContactEvent`]s afterwards; persisting contacts
//! are read back from the narrow phase.

use super::{
    BodyHandle, BodyKind, CollisionShape, ContactEvent, ContactKind, DriveProperties, JointHandle,
    JointMotion, JointSpec, MassProperties, PhysicsEngine, ShapeHandle, ShapeMaterial,
};
use crate::config::SceneConfig;
use crate::error::{SimError, SimResult};
use parking_lot::Mutex;
use rapier3d::prelude::MassProperties as RapierMassProperties;
use rapier3d::prelude::*;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;

const DRIVE_AXES: [JointAxis; 6] = [
    JointAxis::LinX,
    JointAxis::LinY,
    JointAxis::LinZ,
    JointAxis::AngX,
    JointAxis::AngY,
    JointAxis::AngZ,
];

/// Collision events captured while the pipeline runs
#[derive(Default)]
struct ContactCollector {
    events: Mutex<Vec<CollisionEvent>>,
}

impl EventHandler for ContactCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        self.events.lock().push(event);
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

/// Rapier sets and pipeline state
struct PhysicsWorld {
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    physics_hooks: (),
    event_handler: ContactCollector,
}

impl PhysicsWorld {
    fn new(config: &SceneConfig) -> Self {
        let mut integration_parameters = IntegrationParameters {
            dt: config.timestep,
            ..Default::default()
        };
        if let Some(iterations) = NonZeroUsize::new(config.solver_iterations) {
            integration_parameters.num_solver_iterations = iterations;
        }

        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            gravity: vector![config.gravity[0], config.gravity[1], config.gravity[2]],
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            physics_hooks: (),
            event_handler: ContactCollector::default(),
        }
    }

    fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;

        let PhysicsWorld {
            ref mut physics_pipeline,
            ref gravity,
            ref integration_parameters,
            ref mut island_manager,
            ref mut broad_phase,
            ref mut narrow_phase,
            ref mut rigid_body_set,
            ref mut collider_set,
            ref mut impulse_joint_set,
            ref mut multibody_joint_set,
            ref mut ccd_solver,
            ref physics_hooks,
            ref event_handler,
        } = *self;

        physics_pipeline.step(
            gravity,
            integration_parameters,
            island_manager,
            broad_phase,
            narrow_phase,
            rigid_body_set,
            collider_set,
            impulse_joint_set,
            multibody_joint_set,
            ccd_solver,
            None,
            physics_hooks,
            event_handler,
        );
    }
}

struct BodyEntry {
    handle: RigidBodyHandle,
    kind: BodyKind,
    /// Parent link for articulation links
    parent: Option<BodyHandle>,
    shapes: Vec<ShapeHandle>,
    name: String,
}

#[derive(Debug, Clone, Copy)]
enum JointSlot {
    Impulse(ImpulseJointHandle),
    Multibody(MultibodyJointHandle),
}

struct JointEntry {
    slot: JointSlot,
    motion: Option<JointMotion>,
    bodies: (Option<BodyHandle>, BodyHandle),
    drive: Option<(DriveProperties, Isometry<Real>)>,
}

/// [`PhysicsEngine`] backed by rapier3d
pub struct RapierEngine {
    world: PhysicsWorld,
    bodies: HashMap<BodyHandle, BodyEntry>,
    shapes: HashMap<ShapeHandle, ColliderHandle>,
    collider_shapes: HashMap<ColliderHandle, ShapeHandle>,
    /// Colliders of released bodies, kept until their end events are drained
    retired_colliders: Vec<ColliderHandle>,
    joints: HashMap<JointHandle, JointEntry>,
    world_anchor: Option<RigidBodyHandle>,
    pending_events: Vec<ContactEvent>,
    next_id: u64,
}

impl RapierEngine {
    pub fn new(config: &SceneConfig) -> Self {
        Self {
            world: PhysicsWorld::new(config),
            bodies: HashMap::new(),
            shapes: HashMap::new(),
            collider_shapes: HashMap::new(),
            retired_colliders: Vec::new(),
            joints: HashMap::new(),
            world_anchor: None,
            pending_events: Vec::new(),
            next_id: 1,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn entry(&self, body: BodyHandle) -> SimResult<&BodyEntry> {
        self.bodies
            .get(&body)
            .ok_or_else(|| SimError::Engine(format!("unknown body {}", body)))
    }

    fn rigid_body_mut(&mut self, body: BodyHandle) -> SimResult<&mut RigidBody> {
        let handle = self.entry(body)?.handle;
        self.world
            .rigid_body_set
            .get_mut(handle)
            .ok_or_else(|| SimError::Engine(format!("body {} is no longer allocated", body)))
    }

    fn insert_body(
        &mut self,
        kind: BodyKind,
        pose: Isometry<Real>,
        parent: Option<BodyHandle>,
        name: &str,
    ) -> BodyHandle {
        let id = BodyHandle(self.next_id());
        let builder = match kind {
            BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_position_based(),
            BodyKind::Static => RigidBodyBuilder::fixed(),
        };
        let handle = self
            .world
            .rigid_body_set
            .insert(builder.position(pose).user_data(id.0 as u128).build());

        self.bodies.insert(
            id,
            BodyEntry {
                handle,
                kind,
                parent,
                shapes: Vec::new(),
                name: name.to_string(),
            },
        );
        tracing::trace!("created {:?} body '{}' as {}", kind, name, id);
        id
    }

    fn world_anchor(&mut self) -> RigidBodyHandle {
        if let Some(anchor) = self.world_anchor {
            return anchor;
        }
        let anchor = self
            .world
            .rigid_body_set
            .insert(RigidBodyBuilder::fixed().build());
        self.world_anchor = Some(anchor);
        anchor
    }

    fn wake_handle(&mut self, handle: RigidBodyHandle) {
        if let Some(rb) = self.world.rigid_body_set.get_mut(handle) {
            if rb.is_dynamic() {
                rb.wake_up(true);
            }
        }
    }

    fn joint_entry(&self, joint: JointHandle) -> SimResult<&JointEntry> {
        self.joints
            .get(&joint)
            .ok_or_else(|| SimError::Engine(format!("unknown joint {}", joint)))
    }

    fn generic_joint(spec: &JointSpec) -> GenericJoint {
        let (mask, axis) = match spec.motion {
            JointMotion::Fixed => (JointAxesMask::LOCKED_FIXED_AXES, None),
            JointMotion::Revolute { .. } => (JointAxesMask::LOCKED_REVOLUTE_AXES, Some(JointAxis::AngX)),
            JointMotion::Prismatic { .. } => (JointAxesMask::LOCKED_PRISMATIC_AXES, Some(JointAxis::LinX)),
        };

        // jointed links never collide with each other
        let mut builder = GenericJointBuilder::new(mask)
            .local_frame1(spec.parent_pose)
            .local_frame2(spec.child_pose)
            .contacts_enabled(false);

        if let Some(axis) = axis {
            if let Some(limit) = spec.motion.limit() {
                builder = builder.limits(axis, limit);
            }
            if spec.friction > 0.0 {
                // velocity motor towards zero acts as joint friction
                builder = builder.motor_velocity(axis, 0.0, spec.friction);
            }
        }
        builder.build()
    }

    fn apply_drive(joint: &mut GenericJoint, properties: DriveProperties, target: &Isometry<Real>) {
        let (roll, pitch, yaw) = target.rotation.euler_angles();
        let t = target.translation.vector;
        let targets = [t.x, t.y, t.z, roll, pitch, yaw];

        for (axis, target) in DRIVE_AXES.iter().zip(targets) {
            joint
                .set_motor_model(*axis, MotorModel::ForceBased)
                .set_motor(*axis, target, 0.0, properties.stiffness, properties.damping)
                .set_motor_max_force(*axis, properties.force_limit);
        }
    }

    fn shape_pair(&self, a: ColliderHandle, b: ColliderHandle) -> Option<(ShapeHandle, ShapeHandle)> {
        Some((*self.collider_shapes.get(&a)?, *self.collider_shapes.get(&b)?))
    }

    fn collect_contact_events(&mut self) {
        let events = std::mem::take(&mut *self.world.event_handler.events.lock());
        let mut started = HashSet::new();

        for event in events {
            let (kind, a, b) = match event {
                CollisionEvent::Started(a, b, _) => (ContactKind::Start, a, b),
                CollisionEvent::Stopped(a, b, _) => (ContactKind::End, a, b),
            };
            match self.shape_pair(a, b) {
                Some((sa, sb)) => {
                    if kind == ContactKind::Start {
                        started.insert(unordered(sa, sb));
                    }
                    self.pending_events.push(ContactEvent::new(kind, sa, sb));
                }
                None => tracing::trace!("dropping contact event for untracked colliders"),
            }
        }

        let persisting: Vec<(ShapeHandle, ShapeHandle)> = self
            .world
            .narrow_phase
            .contact_pairs()
            .filter(|pair| pair.has_any_active_contact)
            .filter_map(|pair| self.shape_pair(pair.collider1, pair.collider2))
            .filter(|(a, b)| !started.contains(&unordered(*a, *b)))
            .collect();
        self.pending_events.extend(
            persisting
                .into_iter()
                .map(|(a, b)| ContactEvent::new(ContactKind::Persist, a, b)),
        );

        for collider in self.retired_colliders.drain(..) {
            self.collider_shapes.remove(&collider);
        }
    }

    /// Number of live bodies, the world anchor excluded
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn body_name(&self, body: BodyHandle) -> Option<&str> {
        self.bodies.get(&body).map(|e| e.name.as_str())
    }
}

fn unordered(a: ShapeHandle, b: ShapeHandle) -> (ShapeHandle, ShapeHandle) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl PhysicsEngine for RapierEngine {
    fn create_body(&mut self, kind: BodyKind, pose: Isometry<Real>, name: &str) -> SimResult<BodyHandle> {
        Ok(self.insert_body(kind, pose, None, name))
    }

    fn create_articulation_link(
        &mut self,
        parent: Option<BodyHandle>,
        pose: Isometry<Real>,
        fix_root: bool,
        name: &str,
    ) -> SimResult<BodyHandle> {
        let kind = match parent {
            None if fix_root => BodyKind::Static,
            None => BodyKind::Dynamic,
            Some(parent) => {
                self.entry(parent)?;
                BodyKind::Dynamic
            }
        };
        Ok(self.insert_body(kind, pose, parent, name))
    }

    fn configure_inbound_joint(&mut self, link: BodyHandle, joint: &JointSpec) -> SimResult<JointHandle> {
        let entry = self.entry(link)?;
        let parent = entry.parent.ok_or_else(|| {
            SimError::Engine(format!("link '{}' is a root and has no inbound joint", entry.name))
        })?;
        let child_handle = entry.handle;
        let parent_handle = self.entry(parent)?.handle;

        let handle = self
            .world
            .multibody_joint_set
            .insert(parent_handle, child_handle, Self::generic_joint(joint), true)
            .ok_or_else(|| {
                SimError::Engine(format!("joint '{}' would close a multibody loop", joint.name))
            })?;

        let id = JointHandle(self.next_id());
        self.joints.insert(
            id,
            JointEntry {
                slot: JointSlot::Multibody(handle),
                motion: Some(joint.motion),
                bodies: (Some(parent), link),
                drive: None,
            },
        );
        Ok(id)
    }

    fn create_joint(&mut self, parent: BodyHandle, child: BodyHandle, joint: &JointSpec) -> SimResult<JointHandle> {
        let parent_handle = self.entry(parent)?.handle;
        let child_handle = self.entry(child)?.handle;

        let handle = self.world.impulse_joint_set.insert(
            parent_handle,
            child_handle,
            Self::generic_joint(joint),
            true,
        );

        let id = JointHandle(self.next_id());
        self.joints.insert(
            id,
            JointEntry {
                slot: JointSlot::Impulse(handle),
                motion: Some(joint.motion),
                bodies: (Some(parent), child),
                drive: None,
            },
        );
        Ok(id)
    }

    fn create_drive(
        &mut self,
        body1: Option<BodyHandle>,
        pose1: Isometry<Real>,
        body2: BodyHandle,
        pose2: Isometry<Real>,
    ) -> SimResult<JointHandle> {
        let handle1 = match body1 {
            Some(body) => self.entry(body)?.handle,
            None => self.world_anchor(),
        };
        let handle2 = self.entry(body2)?.handle;

        let joint = GenericJointBuilder::new(JointAxesMask::empty())
            .local_frame1(pose1)
            .local_frame2(pose2)
            .build();
        let handle = self.world.impulse_joint_set.insert(handle1, handle2, joint, true);

        let id = JointHandle(self.next_id());
        self.joints.insert(
            id,
            JointEntry {
                slot: JointSlot::Impulse(handle),
                motion: None,
                bodies: (body1, body2),
                drive: Some((DriveProperties::default(), Isometry::identity())),
            },
        );
        Ok(id)
    }

    fn set_drive_properties(&mut self, drive: JointHandle, properties: DriveProperties) -> SimResult<()> {
        let entry = self
            .joints
            .get_mut(&drive)
            .ok_or_else(|| SimError::Engine(format!("unknown drive {}", drive)))?;
        let (JointSlot::Impulse(handle), Some(state)) = (entry.slot, entry.drive.as_mut()) else {
            return Err(SimError::Engine(format!("{} is not a drive", drive)));
        };
        state.0 = properties;
        let target = state.1;

        if let Some(joint) = self.world.impulse_joint_set.get_mut(handle) {
            Self::apply_drive(&mut joint.data, properties, &target);
        }
        Ok(())
    }

    fn set_drive_target(&mut self, drive: JointHandle, target: Isometry<Real>) -> SimResult<()> {
        let entry = self
            .joints
            .get_mut(&drive)
            .ok_or_else(|| SimError::Engine(format!("unknown drive {}", drive)))?;
        let (JointSlot::Impulse(handle), Some(state)) = (entry.slot, entry.drive.as_mut()) else {
            return Err(SimError::Engine(format!("{} is not a drive", drive)));
        };
        state.1 = target;
        let properties = state.0;

        if let Some(joint) = self.world.impulse_joint_set.get_mut(handle) {
            Self::apply_drive(&mut joint.data, properties, &target);
        }
        Ok(())
    }

    fn set_joint_drive(&mut self, joint: JointHandle, target: f32, properties: DriveProperties) -> SimResult<()> {
        let entry = self.joint_entry(joint)?;
        let axis = match entry.motion {
            Some(JointMotion::Revolute { .. }) => JointAxis::AngX,
            Some(JointMotion::Prismatic { .. }) => JointAxis::LinX,
            _ => return Err(SimError::Engine(format!("{} has no drivable axis", joint))),
        };
        let slot = entry.slot;

        let data = match slot {
            JointSlot::Impulse(handle) => self
                .world
                .impulse_joint_set
                .get_mut(handle)
                .map(|j| &mut j.data),
            JointSlot::Multibody(handle) => self
                .world
                .multibody_joint_set
                .get_mut(handle)
                .and_then(|(multibody, link_id)| multibody.link_mut(link_id))
                .map(|link| &mut link.joint.data),
        };
        let data = data.ok_or_else(|| SimError::Engine(format!("{} is no longer allocated", joint)))?;

        data.set_motor_position(axis, target, properties.stiffness, properties.damping)
            .set_motor_max_force(axis, properties.force_limit);
        Ok(())
    }

    fn destroy_joint(&mut self, joint: JointHandle) -> SimResult<()> {
        let entry = self
            .joints
            .remove(&joint)
            .ok_or_else(|| SimError::Engine(format!("unknown joint {}", joint)))?;
        match entry.slot {
            JointSlot::Impulse(handle) => {
                self.world.impulse_joint_set.remove(handle, true);
            }
            JointSlot::Multibody(handle) => {
                self.world.multibody_joint_set.remove(handle, true);
            }
        }
        Ok(())
    }

    fn attach_shape(
        &mut self,
        body: BodyHandle,
        shape: &CollisionShape,
        local_pose: Isometry<Real>,
        material: ShapeMaterial,
    ) -> SimResult<ShapeHandle> {
        let rb_handle = self.entry(body)?.handle;
        let id = ShapeHandle(self.next_id());

        let builder = match shape {
            CollisionShape::Cuboid { half_extents } => {
                ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            CollisionShape::Capsule { half_height, radius } => ColliderBuilder::capsule_z(*half_height, *radius),
            CollisionShape::Ball { radius } => ColliderBuilder::ball(*radius),
            CollisionShape::ConvexDecomposition { vertices, indices } => {
                ColliderBuilder::convex_decomposition(vertices, indices)
            }
            CollisionShape::HalfSpace { normal } => ColliderBuilder::halfspace(*normal),
        };

        let collider = builder
            .position(local_pose)
            .friction(material.friction)
            .restitution(material.restitution)
            .density(material.density)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .user_data(id.0 as u128)
            .build();

        let handle = self
            .world
            .collider_set
            .insert_with_parent(collider, rb_handle, &mut self.world.rigid_body_set);

        self.shapes.insert(id, handle);
        self.collider_shapes.insert(handle, id);
        if let Some(entry) = self.bodies.get_mut(&body) {
            entry.shapes.push(id);
        }
        Ok(id)
    }

    fn set_mass_properties(&mut self, body: BodyHandle, mass: &MassProperties) -> SimResult<()> {
        // explicit properties replace anything derived from the shapes
        for shape in self.entry(body)?.shapes.clone() {
            if let Some(collider) = self.shapes.get(&shape).and_then(|h| self.world.collider_set.get_mut(*h)) {
                collider.set_density(0.0);
            }
        }

        let properties = RapierMassProperties::with_principal_inertia_frame(
            Point::from(mass.local_frame.translation.vector),
            mass.mass,
            mass.principal_inertia,
            mass.local_frame.rotation,
        );
        self.rigid_body_mut(body)?
            .set_additional_mass_properties(properties, true);
        Ok(())
    }

    fn update_mass_from_shapes(&mut self, body: BodyHandle, density: f32) -> SimResult<()> {
        let shapes = self.entry(body)?.shapes.clone();
        for shape in &shapes {
            if let Some(collider) = self.shapes.get(shape).and_then(|h| self.world.collider_set.get_mut(*h)) {
                collider.set_density(density);
            }
        }

        if shapes.is_empty() {
            // unit mass so shapeless links still integrate
            let unit = RapierMassProperties::new(Point::origin(), 1.0, vector![1.0, 1.0, 1.0]);
            self.rigid_body_mut(body)?.set_additional_mass_properties(unit, true);
        }
        Ok(())
    }

    fn set_passive_force_balance(&mut self, body: BodyHandle, enabled: bool) -> SimResult<()> {
        let scale = if enabled { 0.0 } else { 1.0 };
        self.rigid_body_mut(body)?.set_gravity_scale(scale, true);
        Ok(())
    }

    fn body_kind(&self, body: BodyHandle) -> Option<BodyKind> {
        self.bodies.get(&body).map(|e| e.kind)
    }

    fn body_pose(&self, body: BodyHandle) -> Option<Isometry<Real>> {
        let entry = self.bodies.get(&body)?;
        self.world.rigid_body_set.get(entry.handle).map(|rb| *rb.position())
    }

    fn set_kinematic_target(&mut self, body: BodyHandle, pose: Isometry<Real>) -> SimResult<()> {
        if self.body_kind(body) != Some(BodyKind::Kinematic) {
            return Err(SimError::Engine(format!("{} is not kinematic", body)));
        }
        self.rigid_body_mut(body)?.set_next_kinematic_position(pose);
        Ok(())
    }

    fn wake_up(&mut self, body: BodyHandle) {
        if let Some(handle) = self.bodies.get(&body).map(|e| e.handle) {
            self.wake_handle(handle);
        }
    }

    fn body_shapes(&self, body: BodyHandle) -> Vec<ShapeHandle> {
        self.bodies
            .get(&body)
            .map(|e| e.shapes.clone())
            .unwrap_or_default()
    }

    fn detach_body(&mut self, body: BodyHandle) -> SimResult<()> {
        self.rigid_body_mut(body)?.set_enabled(false);
        tracing::trace!("detached {}", body);
        Ok(())
    }

    fn release_body(&mut self, body: BodyHandle) -> SimResult<()> {
        let entry = self
            .bodies
            .remove(&body)
            .ok_or_else(|| SimError::Engine(format!("unknown body {}", body)))?;

        let world = &mut self.world;
        world.rigid_body_set.remove(
            entry.handle,
            &mut world.island_manager,
            &mut world.collider_set,
            &mut world.impulse_joint_set,
            &mut world.multibody_joint_set,
            true,
        );

        for shape in entry.shapes {
            if let Some(collider) = self.shapes.remove(&shape) {
                self.retired_colliders.push(collider);
            }
        }
        // rapier drops the joints together with the body
        self.joints
            .retain(|_, joint| joint.bodies.0 != Some(body) && joint.bodies.1 != body);

        tracing::trace!("released {} ('{}')", body, entry.name);
        Ok(())
    }

    fn simulate(&mut self, dt: f32) -> SimResult<()> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SimError::Engine(format!("invalid timestep {}", dt)));
        }
        self.world.step(dt);
        self.collect_contact_events();
        Ok(())
    }

    fn fetch_results(&mut self, _block: bool) -> bool {
        // the pipeline steps synchronously inside `simulate`
        true
    }

    fn drain_contact_events(&mut self) -> Vec<ContactEvent> {
        std::mem::take(&mut self.pending_events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion, Vector3};

    fn engine() -> RapierEngine {
        RapierEngine::new(&SceneConfig::default())
    }

    fn ground(engine: &mut RapierEngine) -> BodyHandle {
        let ground = engine
            .create_body(BodyKind::Static, Isometry::identity(), "ground")
            .unwrap();
        engine
            .attach_shape(
                ground,
                &CollisionShape::HalfSpace {
                    normal: Vector3::z_axis(),
                },
                Isometry::identity(),
                ShapeMaterial::default(),
            )
            .unwrap();
        ground
    }

    #[test]
    fn test_ball_falls_and_touches_ground() {
        let mut engine = engine();
        ground(&mut engine);

        let ball = engine
            .create_body(BodyKind::Dynamic, Isometry::translation(0.0, 0.0, 0.5), "ball")
            .unwrap();
        engine
            .attach_shape(
                ball,
                &CollisionShape::Ball { radius: 0.1 },
                Isometry::identity(),
                ShapeMaterial::default(),
            )
            .unwrap();
        engine.update_mass_from_shapes(ball, 1000.0).unwrap();

        let mut events = Vec::new();
        for _ in 0..200 {
            engine.simulate(0.01).unwrap();
            assert!(engine.fetch_results(true));
            events.extend(engine.drain_contact_events());
        }

        let z = engine.body_pose(ball).unwrap().translation.vector.z;
        assert!(z < 0.5);
        assert!(events.iter().any(|e| e.kind == ContactKind::Start));
        assert!(events.iter().any(|e| e.kind == ContactKind::Persist));
    }

    #[test]
    fn test_two_phase_release() {
        let mut engine = engine();
        let body = engine
            .create_body(BodyKind::Dynamic, Isometry::identity(), "box")
            .unwrap();
        engine
            .attach_shape(
                body,
                &CollisionShape::Cuboid {
                    half_extents: Vector3::new(0.1, 0.1, 0.1),
                },
                Isometry::identity(),
                ShapeMaterial::default(),
            )
            .unwrap();

        engine.detach_body(body).unwrap();
        engine.simulate(0.01).unwrap();
        assert!(engine.body_pose(body).is_some());

        engine.release_body(body).unwrap();
        assert!(engine.body_pose(body).is_none());
        assert!(engine.body_shapes(body).is_empty());
        assert!(engine.release_body(body).is_err());
    }

    #[test]
    fn test_articulation_joint_and_drive() {
        let mut engine = engine();
        let root = engine
            .create_articulation_link(None, Isometry::identity(), true, "base")
            .unwrap();
        assert_eq!(engine.body_kind(root), Some(BodyKind::Static));

        let link = engine
            .create_articulation_link(Some(root), Isometry::translation(0.0, 0.0, 0.5), true, "arm")
            .unwrap();
        engine.update_mass_from_shapes(link, 1000.0).unwrap();

        let spec = JointSpec {
            name: "shoulder".into(),
            motion: JointMotion::Revolute {
                limit: Some([-1.0, 1.0]),
            },
            parent_pose: Isometry::from_parts(
                Translation3::new(0.0, 0.0, 0.5),
                UnitQuaternion::identity(),
            ),
            child_pose: Isometry::identity(),
            friction: 0.0,
        };
        let joint = engine.configure_inbound_joint(link, &spec).unwrap();
        engine
            .set_joint_drive(
                joint,
                0.5,
                DriveProperties {
                    stiffness: 100.0,
                    damping: 10.0,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(engine.configure_inbound_joint(root, &spec).is_err());

        for _ in 0..10 {
            engine.simulate(0.01).unwrap();
        }
        assert!(engine.body_pose(link).unwrap().translation.vector.iter().all(|v| v.is_finite()));
        engine.destroy_joint(joint).unwrap();
        assert!(engine.destroy_joint(joint).is_err());
    }

    #[test]
    fn test_jointed_bodies_do_not_collide() {
        let mut engine = engine();
        let mut boxes = Vec::new();
        for (i, x) in [0.0, 0.15, 0.3].into_iter().enumerate() {
            let body = engine
                .create_body(BodyKind::Dynamic, Isometry::translation(x, 0.0, 1.0), &format!("box{}", i))
                .unwrap();
            engine
                .attach_shape(
                    body,
                    &CollisionShape::Cuboid {
                        half_extents: Vector3::new(0.1, 0.1, 0.1),
                    },
                    Isometry::identity(),
                    ShapeMaterial::default(),
                )
                .unwrap();
            engine.update_mass_from_shapes(body, 1000.0).unwrap();
            boxes.push(body);
        }

        // box0 and box1 share a joint, box1 and box2 only overlap
        let spec = JointSpec {
            name: "weld".into(),
            motion: JointMotion::Fixed,
            parent_pose: Isometry::translation(0.075, 0.0, 0.0),
            child_pose: Isometry::translation(-0.075, 0.0, 0.0),
            friction: 0.0,
        };
        engine.create_joint(boxes[0], boxes[1], &spec).unwrap();

        let mut events = Vec::new();
        for _ in 0..5 {
            engine.simulate(0.01).unwrap();
            assert!(engine.fetch_results(true));
            events.extend(engine.drain_contact_events());
        }

        let mut jointed = engine.body_shapes(boxes[0]);
        jointed.extend(engine.body_shapes(boxes[1]));
        let free = engine.body_shapes(boxes[2]);
        assert!(!events
            .iter()
            .any(|e| jointed.contains(&e.shape_a) && jointed.contains(&e.shape_b)));
        assert!(events
            .iter()
            .any(|e| free.contains(&e.shape_a) || free.contains(&e.shape_b)));
    }

    #[test]
    fn test_kinematic_target_requires_kinematic_body() {
        let mut engine = engine();
        let dynamic = engine
            .create_body(BodyKind::Dynamic, Isometry::identity(), "d")
            .unwrap();
        assert!(engine.set_kinematic_target(dynamic, Isometry::identity()).is_err());

        let kinematic = engine
            .create_body(BodyKind::Kinematic, Isometry::identity(), "k")
            .unwrap();
        engine
            .set_kinematic_target(kinematic, Isometry::translation(1.0, 0.0, 0.0))
            .unwrap();
        engine.simulate(0.01).unwrap();
        let x = engine.body_pose(kinematic).unwrap().translation.vector.x;
        assert!((x - 1.0).abs() < 1e-4);
    }
}
