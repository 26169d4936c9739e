//! Scene lifecycle manager
//!
//! The scene owns every simulated object and the indices used to find them.
//! Removal is staged:
//!
//! 1. On request the object leaves all lookup indices, its listeners are told,
//!    its drives, cameras and render bodies are torn down and it is marked
//!    [`DestroyState::PendingDetach`].
//! 2. Pass 1 runs after the pre-step hooks and before `simulate`: the bodies
//!    are detached from the engine ([`DestroyState::PendingRelease`]).
//! 3. Pass 2 runs after results are fetched: the bodies are released and the
//!    object is dropped.
//!
//! An object whose removal is requested while an asynchronous step is in
//! flight is therefore detached and released by the following step, never
//! while the engine may still reference it.

mod actor;
mod camera;
mod contact;
mod drive;
mod events;
mod object;

pub use actor::{ActorShape, ActorSpec};
pub use camera::{CameraAttachment, SceneCamera, SceneLight};
pub use contact::{ContactMap, ContactRecord, ShapePair};
pub use drive::Drive;
pub use events::{EventEmitter, ListenerId, PreDestroyEvent, StepEvent};
pub use object::{
    ActorId, ArticulationJoint, CameraId, DestroyState, DriveId, LightId, ObjectId, ObjectKind,
    RenderAttachment, SceneObject, SimBody,
};

pub(crate) use object::Control;

use crate::config::SceneConfig;
use crate::engine::{BodyHandle, BodyKind, DriveProperties, PhysicsEngine, RapierEngine, ShapeHandle};
use crate::error::{SimError, SimResult};
use crate::loader::RobotLoader;
use crate::render::{CameraSpec, HeadlessRenderer, LightSpec, RenderId, RenderScene, VisualSpec};
use nalgebra::{Isometry3, Unit, Vector3};
use std::collections::{BTreeMap, HashMap};

pub struct Scene<E: PhysicsEngine = RapierEngine, R: RenderScene = HeadlessRenderer> {
    config: SceneConfig,
    engine: E,
    renderer: R,
    objects: BTreeMap<ObjectId, SceneObject>,
    actor_index: HashMap<ActorId, ObjectId>,
    link_index: HashMap<ActorId, (ObjectId, usize)>,
    shape_index: HashMap<ShapeHandle, ActorId>,
    drives: BTreeMap<DriveId, Drive>,
    cameras: BTreeMap<CameraId, SceneCamera>,
    lights: BTreeMap<LightId, SceneLight>,
    ambient_light: [f32; 3],
    contacts: ContactMap,
    render_names: HashMap<RenderId, String>,
    step_listeners: EventEmitter<StepEvent>,
    next_object_id: u64,
    next_actor_id: u64,
    step_count: u64,
    stepping: bool,
    requires_cleanup1: bool,
    requires_cleanup2: bool,
}

impl Scene<RapierEngine, HeadlessRenderer> {
    /// Rapier-backed scene without a display
    pub fn headless(config: SceneConfig) -> SimResult<Self> {
        let engine = RapierEngine::new(&config);
        Self::new(engine, HeadlessRenderer::new(), config)
    }
}

impl<E: PhysicsEngine, R: RenderScene> Scene<E, R> {
    pub fn new(engine: E, renderer: R, config: SceneConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            engine,
            renderer,
            objects: BTreeMap::new(),
            actor_index: HashMap::new(),
            link_index: HashMap::new(),
            shape_index: HashMap::new(),
            drives: BTreeMap::new(),
            cameras: BTreeMap::new(),
            lights: BTreeMap::new(),
            ambient_light: [0.0; 3],
            contacts: ContactMap::new(),
            render_names: HashMap::new(),
            step_listeners: EventEmitter::new(),
            next_object_id: 0,
            next_actor_id: 0,
            step_count: 0,
            stepping: false,
            requires_cleanup1: false,
            requires_cleanup2: false,
        })
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn timestep(&self) -> f32 {
        self.config.timestep
    }

    pub fn set_timestep(&mut self, timestep: f32) -> SimResult<()> {
        let config = self.config.clone().with_timestep(timestep);
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Direct engine access; bodies owned by scene objects must not be removed through it
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Whether an asynchronous step is waiting for [`Self::step_wait`]
    pub fn is_stepping(&self) -> bool {
        self.stepping
    }

    /// Loader building robot descriptions into this scene
    pub fn create_loader(&mut self) -> RobotLoader<'_, E, R> {
        RobotLoader::new(self)
    }

    // ---- registration ----

    pub(crate) fn new_object_id(&mut self) -> ObjectId {
        self.next_object_id += 1;
        ObjectId(self.next_object_id)
    }

    pub(crate) fn new_actor_id(&mut self) -> ActorId {
        self.next_actor_id += 1;
        ActorId(self.next_actor_id)
    }

    /// Add a visual body to the renderer and remember its name
    pub(crate) fn register_visual(&mut self, visual: &VisualSpec, local_pose: Isometry3<f32>) -> RenderAttachment {
        let id = self.renderer.add_visual_body(visual);
        self.render_names.insert(id, visual.name.clone());
        RenderAttachment {
            id,
            local_pose,
            role: visual.role,
        }
    }

    /// Undo a failed build: free bodies and render bodies created for it
    pub(crate) fn discard(&mut self, bodies: &[BodyHandle], visuals: &[RenderId]) {
        for &body in bodies.iter().rev() {
            let result = self
                .engine
                .detach_body(body)
                .and_then(|_| self.engine.release_body(body));
            if let Err(err) = result {
                tracing::error!("failed to discard {}: {}", body, err);
            }
        }
        for &visual in visuals {
            self.renderer.remove_visual_body(visual);
            self.render_names.remove(&visual);
        }
    }

    /// Take ownership of a fully built object and index its bodies
    pub(crate) fn insert_object(&mut self, object: SceneObject) -> ObjectId {
        let id = object.id();
        for (index, body) in object.bodies().iter().enumerate() {
            match object.kind() {
                ObjectKind::Actor => {
                    self.actor_index.insert(body.id, id);
                }
                _ => {
                    self.link_index.insert(body.id, (id, index));
                }
            }
            for shape in &body.shapes {
                self.shape_index.insert(*shape, body.id);
            }
        }
        tracing::debug!(
            "added {} '{}' as {} with {} bodies",
            object.kind().as_str(),
            object.name(),
            id,
            object.bodies().len()
        );
        self.objects.insert(id, object);
        id
    }

    // ---- lookups ----

    /// Object in any state until pass-2 cleanup drops it
    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&id)
    }

    /// Live object, for control calls
    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(&id).filter(|o| o.is_live())
    }

    pub fn object_state(&self, id: ObjectId) -> Option<DestroyState> {
        self.objects.get(&id).map(SceneObject::state)
    }

    pub fn object_by_name(&self, name: &str) -> Option<&SceneObject> {
        self.objects
            .values()
            .find(|o| o.is_live() && o.name() == name)
    }

    pub fn find_actor_by_id(&self, id: ActorId) -> Option<&SceneObject> {
        self.actor_index
            .get(&id)
            .and_then(|object| self.objects.get(object))
    }

    /// Articulation owning the link and the link's body
    pub fn find_link_by_id(&self, id: ActorId) -> Option<(&SceneObject, &SimBody)> {
        let (object, index) = self.link_index.get(&id)?;
        let object = self.objects.get(object)?;
        Some((object, &object.bodies()[*index]))
    }

    /// Body of an actor or of an articulation link
    pub fn body(&self, id: ActorId) -> Option<&SimBody> {
        match self.find_actor_by_id(id) {
            Some(actor) => actor.bodies().first(),
            None => self.find_link_by_id(id).map(|(_, body)| body),
        }
    }

    pub fn body_pose(&self, id: ActorId) -> Option<Isometry3<f32>> {
        self.body(id).and_then(|b| self.engine.body_pose(b.handle))
    }

    pub fn all_actors(&self) -> Vec<&SceneObject> {
        self.objects
            .values()
            .filter(|o| o.is_live() && o.kind() == ObjectKind::Actor)
            .collect()
    }

    /// Live articulations, kinematic ones included
    pub fn all_articulations(&self) -> Vec<&SceneObject> {
        self.objects
            .values()
            .filter(|o| o.is_live() && o.kind() != ObjectKind::Actor)
            .collect()
    }

    pub fn contacts(&self) -> impl Iterator<Item = &ContactRecord> {
        self.contacts.iter()
    }

    pub fn contact_map(&self) -> &ContactMap {
        &self.contacts
    }

    /// Body a shape is attached to, kept until the body is released
    pub fn shape_owner(&self, shape: ShapeHandle) -> Option<ActorId> {
        self.shape_index.get(&shape).copied()
    }

    pub fn render_id_to_visual_name(&self) -> &HashMap<RenderId, String> {
        &self.render_names
    }

    // ---- control ----

    /// Buffer a target pose for a kinematic actor
    pub fn set_kinematic_target(&mut self, actor: ActorId, pose: Isometry3<f32>) -> SimResult<()> {
        let object = self
            .actor_index
            .get(&actor)
            .and_then(|id| self.objects.get_mut(id))
            .ok_or_else(|| SimError::LifecycleConsistency(format!("{} is not a live actor", actor)))?;

        let kind = self.engine.body_kind(object.root_body().handle);
        if kind != Some(BodyKind::Kinematic) {
            return Err(SimError::LifecycleConsistency(format!(
                "{} '{}' is {:?}, not kinematic",
                actor,
                object.name(),
                kind
            )));
        }
        object.set_kinematic_target(pose)
    }

    pub fn create_drive(
        &mut self,
        actor1: Option<ActorId>,
        pose1: Isometry3<f32>,
        actor2: ActorId,
        pose2: Isometry3<f32>,
    ) -> SimResult<DriveId> {
        let resolve = |scene: &Self, actor: ActorId| {
            scene
                .body(actor)
                .map(|b| b.handle)
                .ok_or_else(|| SimError::ReferenceResolution {
                    owner: "drive".to_string(),
                    reference: actor.to_string(),
                })
        };
        let body1 = actor1.map(|actor| resolve(self, actor)).transpose()?;
        let body2 = resolve(self, actor2)?;

        let handle = self.engine.create_drive(body1, pose1, body2, pose2)?;
        for body in body1.into_iter().chain(std::iter::once(body2)) {
            if self.engine.is_dynamic(body) {
                self.engine.wake_up(body);
            }
        }

        let id = DriveId(self.new_object_id().0);
        self.drives
            .insert(id, Drive::new(id, actor1, actor2, handle, (body1, body2)));
        tracing::debug!("created {} between {:?} and {}", id, actor1, actor2);
        Ok(id)
    }

    pub fn drive(&self, id: DriveId) -> Option<&Drive> {
        self.drives.get(&id)
    }

    pub fn drives(&self) -> impl Iterator<Item = &Drive> {
        self.drives.values()
    }

    fn drive_mut(&mut self, id: DriveId) -> SimResult<&mut Drive> {
        self.drives
            .get_mut(&id)
            .ok_or_else(|| SimError::LifecycleConsistency(format!("{} is not owned by this scene", id)))
    }

    pub fn set_drive_target(&mut self, id: DriveId, target: Isometry3<f32>) -> SimResult<()> {
        self.drive_mut(id)?.set_target(target);
        Ok(())
    }

    pub fn set_drive_properties(&mut self, id: DriveId, properties: DriveProperties) -> SimResult<()> {
        self.drive_mut(id)?.set_properties(properties);
        Ok(())
    }

    pub fn remove_drive(&mut self, id: DriveId) -> bool {
        match self.drives.remove(&id) {
            Some(drive) => {
                drive.destroy(&mut self.engine);
                true
            }
            None => {
                tracing::error!("{}", SimError::LifecycleConsistency(format!("{} is not owned by this scene", id)));
                false
            }
        }
    }

    // ---- cameras and lights ----

    /// Free camera at a world pose
    pub fn add_camera(&mut self, spec: CameraSpec, pose: Isometry3<f32>) -> CameraId {
        let render_id = self.renderer.add_camera(&spec);
        self.renderer.update_camera(render_id, pose);
        let id = CameraId(self.new_object_id().0);
        self.cameras.insert(
            id,
            SceneCamera {
                id,
                spec,
                pose,
                mount: None,
                render_id,
            },
        );
        id
    }

    /// Camera following a body at `local_pose` in the body frame
    pub fn add_mounted_camera(&mut self, spec: CameraSpec, actor: ActorId, local_pose: Isometry3<f32>) -> SimResult<CameraId> {
        let body = self
            .body(actor)
            .map(|b| b.handle)
            .ok_or_else(|| SimError::ReferenceResolution {
                owner: spec.name.clone(),
                reference: actor.to_string(),
            })?;

        let render_id = self.renderer.add_camera(&spec);
        let pose = self.engine.body_pose(body).unwrap_or_else(Isometry3::identity) * local_pose;
        self.renderer.update_camera(render_id, pose);

        let id = CameraId(self.new_object_id().0);
        tracing::debug!("mounted camera '{}' on {}", spec.name, actor);
        self.cameras.insert(
            id,
            SceneCamera {
                id,
                spec,
                pose,
                mount: Some(CameraAttachment {
                    actor,
                    body,
                    local_pose,
                }),
                render_id,
            },
        );
        Ok(id)
    }

    pub fn camera(&self, id: CameraId) -> Option<&SceneCamera> {
        self.cameras.get(&id)
    }

    pub fn cameras(&self) -> impl Iterator<Item = &SceneCamera> {
        self.cameras.values()
    }

    /// World pose of a free camera, or the mount pose of a mounted one
    pub fn set_camera_pose(&mut self, id: CameraId, pose: Isometry3<f32>) -> SimResult<()> {
        let camera = self
            .cameras
            .get_mut(&id)
            .ok_or_else(|| SimError::LifecycleConsistency(format!("{} is not owned by this scene", id)))?;
        match &mut camera.mount {
            Some(mount) => mount.local_pose = pose,
            None => camera.pose = pose,
        }
        Ok(())
    }

    pub fn remove_camera(&mut self, id: CameraId) -> bool {
        match self.cameras.remove(&id) {
            Some(camera) => {
                self.renderer.remove_camera(camera.render_id);
                true
            }
            None => {
                tracing::error!("{}", SimError::LifecycleConsistency(format!("{} is not owned by this scene", id)));
                false
            }
        }
    }

    fn add_light(&mut self, spec: LightSpec) -> LightId {
        let render_id = self.renderer.add_light(&spec);
        let id = LightId(self.new_object_id().0);
        self.lights.insert(id, SceneLight { id, spec, render_id });
        id
    }

    pub fn add_point_light(&mut self, position: Vector3<f32>, color: [f32; 3]) -> LightId {
        self.add_light(LightSpec::Point { position, color })
    }

    pub fn add_directional_light(&mut self, direction: Vector3<f32>, color: [f32; 3]) -> SimResult<LightId> {
        let direction = light_direction(direction)?;
        Ok(self.add_light(LightSpec::Directional { direction, color }))
    }

    pub fn add_spot_light(
        &mut self,
        position: Vector3<f32>,
        direction: Vector3<f32>,
        fov: f32,
        color: [f32; 3],
    ) -> SimResult<LightId> {
        let direction = light_direction(direction)?;
        Ok(self.add_light(LightSpec::Spot {
            position,
            direction,
            fov,
            color,
        }))
    }

    pub fn remove_light(&mut self, id: LightId) -> bool {
        match self.lights.remove(&id) {
            Some(light) => {
                self.renderer.remove_light(light.render_id);
                true
            }
            None => false,
        }
    }

    pub fn lights(&self) -> impl Iterator<Item = &SceneLight> {
        self.lights.values()
    }

    pub fn set_ambient_light(&mut self, color: [f32; 3]) {
        self.ambient_light = color;
        self.renderer.set_ambient_light(color);
    }

    pub fn ambient_light(&self) -> [f32; 3] {
        self.ambient_light
    }

    // ---- events ----

    pub fn on_step(&mut self, listener: impl FnMut(&StepEvent) + 'static) -> ListenerId {
        self.step_listeners.subscribe(listener)
    }

    pub fn remove_step_listener(&mut self, id: ListenerId) -> bool {
        self.step_listeners.unsubscribe(id)
    }

    /// Listen for the removal request of one live object
    pub fn on_pre_destroy(
        &mut self,
        object: ObjectId,
        listener: impl FnMut(&PreDestroyEvent) + 'static,
    ) -> Option<ListenerId> {
        self.object_mut(object)
            .map(|o| o.pre_destroy.subscribe(listener))
    }

    // ---- removal ----

    /// Request removal of any object; the teardown visible to callers happens now
    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        let object = match self.objects.get_mut(&id) {
            Some(object) => object,
            None => {
                tracing::error!("{}", SimError::LifecycleConsistency(format!("{} is not owned by this scene", id)));
                return false;
            }
        };
        if !object.is_live() {
            tracing::warn!("{} '{}' is already being removed", id, object.name());
            return false;
        }

        let event = PreDestroyEvent {
            object: id,
            name: object.name().to_string(),
        };
        object.pre_destroy.emit(&event);
        object.set_state(DestroyState::PendingDetach);

        let actors: Vec<ActorId> = object.bodies().iter().map(|b| b.id).collect();
        let visuals: Vec<RenderId> = object
            .bodies()
            .iter()
            .flat_map(|b| b.visuals.iter().map(|v| v.id))
            .collect();
        tracing::debug!("removal of {} {} '{}' requested", object.kind().as_str(), id, object.name());

        for actor in &actors {
            self.actor_index.remove(actor);
            self.link_index.remove(actor);
        }

        let drives: Vec<DriveId> = self
            .drives
            .values()
            .filter(|d| actors.iter().any(|a| d.constrains(*a)))
            .map(|d| d.id)
            .collect();
        for drive in drives {
            if let Some(drive) = self.drives.remove(&drive) {
                drive.destroy(&mut self.engine);
            }
        }

        let renderer = &mut self.renderer;
        self.cameras.retain(|_, camera| {
            let mounted = actors.iter().any(|a| camera.is_mounted_on(*a));
            if mounted {
                renderer.remove_camera(camera.render_id);
            }
            !mounted
        });

        for visual in visuals {
            self.renderer.remove_visual_body(visual);
            self.render_names.remove(&visual);
        }

        self.requires_cleanup1 = true;
        true
    }

    fn remove_kind(&mut self, id: ObjectId, kind: ObjectKind) -> bool {
        match self.objects.get(&id).map(SceneObject::kind) {
            Some(actual) if actual != kind => {
                tracing::error!(
                    "{}",
                    SimError::LifecycleConsistency(format!("{} is an {}, not an {}", id, actual.as_str(), kind.as_str()))
                );
                false
            }
            _ => self.remove_object(id),
        }
    }

    pub fn remove_actor(&mut self, actor: ActorId) -> bool {
        match self.actor_index.get(&actor).copied() {
            Some(id) => self.remove_kind(id, ObjectKind::Actor),
            None => {
                tracing::error!("{}", SimError::LifecycleConsistency(format!("{} is not a live actor of this scene", actor)));
                false
            }
        }
    }

    pub fn remove_articulation(&mut self, id: ObjectId) -> bool {
        self.remove_kind(id, ObjectKind::Articulation)
    }

    pub fn remove_kinematic_articulation(&mut self, id: ObjectId) -> bool {
        self.remove_kind(id, ObjectKind::KinematicArticulation)
    }

    /// Pass 1: detach bodies of objects awaiting removal
    fn cleanup_detach(&mut self) {
        if !std::mem::take(&mut self.requires_cleanup1) {
            return;
        }
        let engine = &mut self.engine;
        for object in self
            .objects
            .values_mut()
            .filter(|o| o.state() == DestroyState::PendingDetach)
        {
            for body in object.bodies() {
                if let Err(err) = engine.detach_body(body.handle) {
                    tracing::error!("failed to detach '{}': {}", body.name, err);
                }
            }
            object.set_state(DestroyState::PendingRelease);
            self.requires_cleanup2 = true;
        }
    }

    /// Pass 2: release detached bodies and drop their objects
    fn cleanup_release(&mut self) {
        if !std::mem::take(&mut self.requires_cleanup2) {
            return;
        }
        let released: Vec<ObjectId> = self
            .objects
            .values()
            .filter(|o| o.state() == DestroyState::PendingRelease)
            .map(SceneObject::id)
            .collect();

        for id in released {
            let Some(object) = self.objects.remove(&id) else {
                continue;
            };
            for body in object.bodies().iter().rev() {
                if let Err(err) = self.engine.release_body(body.handle) {
                    tracing::error!("failed to release '{}': {}", body.name, err);
                }
                for shape in &body.shapes {
                    self.shape_index.remove(shape);
                }
            }
            tracing::debug!("released {} '{}'", id, object.name());
        }
    }

    // ---- stepping ----

    fn pre_step(&mut self) {
        let engine = &mut self.engine;
        for object in self.objects.values_mut().filter(|o| o.is_live()) {
            object.pre_step(engine);
        }
        for drive in self.drives.values_mut() {
            drive.pre_step(engine);
        }
    }

    fn process_contacts(&mut self) {
        for event in self.engine.drain_contact_events() {
            if let Err(err) = self.contacts.apply(event, self.step_count) {
                tracing::error!("{}", err);
            }
        }
    }

    /// Push poses of live bodies and cameras to the renderer
    pub fn update_render(&mut self) {
        for object in self.objects.values().filter(|o| o.is_live()) {
            for body in object.bodies() {
                let Some(pose) = self.engine.body_pose(body.handle) else {
                    continue;
                };
                for visual in &body.visuals {
                    self.renderer.update_visual_body(visual.id, pose * visual.local_pose);
                }
            }
        }

        for camera in self.cameras.values() {
            let pose = match camera.mount {
                Some(mount) => match self.engine.body_pose(mount.body) {
                    Some(body) => body * mount.local_pose,
                    None => continue,
                },
                None => camera.pose,
            };
            self.renderer.update_camera(camera.render_id, pose);
        }
        self.renderer.commit();
    }

    fn finish_step(&mut self) {
        self.process_contacts();
        self.cleanup_release();
        self.update_render();
        self.step_count += 1;
        let event = StepEvent {
            timestep: self.config.timestep,
            step: self.step_count,
        };
        self.step_listeners.emit(&event);
        tracing::trace!("step {} complete", self.step_count);
    }

    /// Advance the simulation by one timestep and block for the results
    pub fn step(&mut self) -> SimResult<()> {
        if self.stepping {
            self.step_wait()?;
        }
        self.pre_step();
        self.cleanup_detach();
        self.engine.simulate(self.config.timestep)?;
        while !self.engine.fetch_results(true) {}
        self.finish_step();
        Ok(())
    }

    /// Start a step without waiting; a step still in flight is waited on first
    pub fn step_async(&mut self) -> SimResult<()> {
        if self.stepping {
            self.step_wait()?;
        }
        self.pre_step();
        self.cleanup_detach();
        self.engine.simulate(self.config.timestep)?;
        self.stepping = true;
        Ok(())
    }

    /// Complete the step started by [`Self::step_async`]
    pub fn step_wait(&mut self) -> SimResult<()> {
        if !self.stepping {
            tracing::debug!("step_wait called without a step in flight");
            return Ok(());
        }
        while !self.engine.fetch_results(true) {}
        self.stepping = false;
        self.finish_step();
        Ok(())
    }
}

fn light_direction(direction: Vector3<f32>) -> SimResult<Unit<Vector3<f32>>> {
    Unit::try_new(direction, f32::EPSILON).ok_or_else(|| {
        SimError::numeric(
            "light",
            format!("direction [{}, {}, {}] cannot be normalised", direction.x, direction.y, direction.z),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BodyKind, CollisionShape, ContactEvent, ContactKind, DryRunEngine, EngineCall};
    use crate::render::HeadlessRenderer;
    use std::cell::RefCell;
    use std::rc::Rc;

    type TestScene = Scene<DryRunEngine, HeadlessRenderer>;

    fn scene() -> TestScene {
        Scene::new(DryRunEngine::new(), HeadlessRenderer::new(), SceneConfig::default()).unwrap()
    }

    fn ball(scene: &mut TestScene, name: &str) -> ActorId {
        scene
            .build_actor(
                ActorSpec::new(name)
                    .with_collision(CollisionShape::Ball { radius: 0.1 }, Isometry3::identity()),
            )
            .unwrap()
    }

    #[test]
    fn test_remove_twice_is_noop() {
        let mut scene = scene();
        let actor = ball(&mut scene, "ball");
        let id = scene.find_actor_by_id(actor).unwrap().id();

        assert!(scene.remove_actor(actor));
        assert!(!scene.remove_actor(actor));
        assert!(!scene.remove_object(id));
        assert!(!scene.remove_object(ObjectId(999)));
        assert_eq!(scene.object_state(id), Some(DestroyState::PendingDetach));
    }

    #[test]
    fn test_synchronous_step_releases_in_same_step() {
        let mut scene = scene();
        let actor = ball(&mut scene, "ball");
        let id = scene.find_actor_by_id(actor).unwrap().id();
        let handle = scene.body(actor).unwrap().handle;

        scene.remove_actor(actor);
        assert!(scene.find_actor_by_id(actor).is_none());
        assert!(scene.engine().is_allocated(handle));

        scene.step().unwrap();
        assert!(!scene.engine().is_allocated(handle));
        assert_eq!(scene.object_state(id), None);
    }

    #[test]
    fn test_pre_destroy_listener_fires_once() {
        let mut scene = scene();
        let actor = ball(&mut scene, "ball");
        let id = scene.find_actor_by_id(actor).unwrap().id();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        scene
            .on_pre_destroy(id, move |e| sink.borrow_mut().push(e.name.clone()))
            .unwrap();

        scene.remove_object(id);
        scene.remove_object(id);
        assert_eq!(*seen.borrow(), vec!["ball".to_string()]);
    }

    #[test]
    fn test_drive_removed_with_object_wakes_other_body() {
        let mut scene = scene();
        let a = ball(&mut scene, "a");
        let b = ball(&mut scene, "b");
        let drive = scene
            .create_drive(Some(a), Isometry3::identity(), b, Isometry3::identity())
            .unwrap();
        let b_handle = scene.body(b).unwrap().handle;
        let wakes = scene.engine().wake_count(b_handle);

        scene.remove_actor(a);
        assert!(scene.drive(drive).is_none());
        assert_eq!(scene.engine().wake_count(b_handle), wakes + 1);
        assert!(!scene.remove_drive(drive));
    }

    #[test]
    fn test_drive_to_unknown_actor_fails() {
        let mut scene = scene();
        let a = ball(&mut scene, "a");
        let err = scene
            .create_drive(None, Isometry3::identity(), ActorId(42), Isometry3::identity())
            .unwrap_err();
        assert!(matches!(err, SimError::ReferenceResolution { .. }));

        let drive = scene
            .create_drive(None, Isometry3::identity(), a, Isometry3::identity())
            .unwrap();
        scene.set_drive_target(drive, Isometry3::translation(0.0, 0.0, 1.0)).unwrap();
        scene.step().unwrap();
        assert!(scene
            .engine()
            .calls()
            .iter()
            .any(|c| matches!(c, EngineCall::SetDriveTarget { .. })));
    }

    #[test]
    fn test_mounted_camera_removed_with_object() {
        let mut scene = scene();
        let actor = ball(&mut scene, "ball");
        let camera = scene
            .add_mounted_camera(CameraSpec::new("eye", 64, 48, 1.0), actor, Isometry3::translation(0.0, 0.0, 0.2))
            .unwrap();
        let free = scene.add_camera(CameraSpec::new("overview", 64, 48, 1.0), Isometry3::identity());
        assert_eq!(scene.renderer().camera_count(), 2);

        scene.remove_actor(actor);
        assert!(scene.camera(camera).is_none());
        assert!(scene.camera(free).is_some());
        assert_eq!(scene.renderer().camera_count(), 1);
    }

    #[test]
    fn test_contacts_and_step_events() {
        let mut scene = scene();
        let a = ball(&mut scene, "a");
        let b = ball(&mut scene, "b");
        let sa = scene.body(a).unwrap().shapes[0];
        let sb = scene.body(b).unwrap().shapes[0];

        let steps = Rc::new(RefCell::new(Vec::new()));
        let sink = steps.clone();
        scene.on_step(move |e| sink.borrow_mut().push(e.step));

        scene.engine_mut().inject_contact(ContactEvent::new(ContactKind::Start, sa, sb));
        scene.step().unwrap();
        assert_eq!(scene.contacts().count(), 1);
        assert_eq!(scene.shape_owner(sa), Some(a));

        scene.engine_mut().inject_contact(ContactEvent::new(ContactKind::End, sb, sa));
        scene.engine_mut().inject_contact(ContactEvent::new(ContactKind::Persist, sa, sb));
        scene.step().unwrap();
        assert_eq!(scene.contacts().count(), 0);
        assert_eq!(*steps.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_kinematic_target_pushed_in_pre_step() {
        let mut scene = scene();
        let actor = scene
            .build_actor(ActorSpec::new("platform").with_kind(BodyKind::Kinematic))
            .unwrap();
        let target = Isometry3::translation(0.5, 0.0, 0.0);
        scene.set_kinematic_target(actor, target).unwrap();

        scene.step().unwrap();
        assert_eq!(scene.body_pose(actor), Some(target));
        assert!(scene.set_kinematic_target(ActorId(77), target).is_err());
    }

    #[test]
    fn test_kinematic_target_rejected_for_dynamic_actor() {
        let mut scene = scene();
        let actor = ball(&mut scene, "ball");
        let err = scene
            .set_kinematic_target(actor, Isometry3::translation(0.5, 0.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, SimError::LifecycleConsistency(_)));

        scene.engine_mut().clear_calls();
        scene.step().unwrap();
        assert!(!scene
            .engine()
            .calls()
            .iter()
            .any(|c| matches!(c, EngineCall::SetKinematicTarget { .. })));
    }

    #[test]
    fn test_step_wait_without_step_is_noop() {
        let mut scene = scene();
        scene.step_wait().unwrap();
        assert_eq!(scene.step_count(), 0);

        scene.step_async().unwrap();
        assert!(scene.is_stepping());
        // a second async step waits for the first
        scene.step_async().unwrap();
        assert_eq!(scene.step_count(), 1);
        scene.step_wait().unwrap();
        assert_eq!(scene.step_count(), 2);
    }

    #[test]
    fn test_lights() {
        let mut scene = scene();
        let point = scene.add_point_light(Vector3::new(0.0, 0.0, 2.0), [1.0; 3]);
        scene.add_directional_light(Vector3::new(0.0, 0.0, -1.0), [0.5; 3]).unwrap();
        assert!(scene.add_spot_light(Vector3::zeros(), Vector3::zeros(), 1.0, [1.0; 3]).is_err());

        scene.set_ambient_light([0.3; 3]);
        assert_eq!(scene.renderer().ambient_light(), [0.3; 3]);
        assert_eq!(scene.lights().count(), 2);
        assert!(scene.remove_light(point));
        assert_eq!(scene.renderer().light_count(), 1);
    }
}
