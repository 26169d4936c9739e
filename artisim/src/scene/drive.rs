//! Six-DOF spring drives between two bodies

use super::{ActorId, DriveId};
use crate::engine::{BodyHandle, DriveProperties, JointHandle, PhysicsEngine};
use nalgebra::Isometry3;

/// Drive owned by the scene; `actor1 == None` anchors it to the world
#[derive(Debug, Clone)]
pub struct Drive {
    pub id: DriveId,
    pub actor1: Option<ActorId>,
    pub actor2: ActorId,
    pub(crate) handle: JointHandle,
    pub(crate) bodies: (Option<BodyHandle>, BodyHandle),
    target: Option<Isometry3<f32>>,
    properties: Option<DriveProperties>,
}

impl Drive {
    pub(crate) fn new(
        id: DriveId,
        actor1: Option<ActorId>,
        actor2: ActorId,
        handle: JointHandle,
        bodies: (Option<BodyHandle>, BodyHandle),
    ) -> Self {
        Self {
            id,
            actor1,
            actor2,
            handle,
            bodies,
            target: None,
            properties: None,
        }
    }

    /// Whether the drive constrains the given body
    pub fn constrains(&self, actor: ActorId) -> bool {
        self.actor1 == Some(actor) || self.actor2 == actor
    }

    pub(crate) fn set_target(&mut self, target: Isometry3<f32>) {
        self.target = Some(target);
    }

    pub(crate) fn set_properties(&mut self, properties: DriveProperties) {
        self.properties = Some(properties);
    }

    /// Push buffered values; properties first so a new target uses the new spring
    pub(crate) fn pre_step<E: PhysicsEngine>(&mut self, engine: &mut E) {
        if let Some(properties) = self.properties.take() {
            if let Err(err) = engine.set_drive_properties(self.handle, properties) {
                tracing::error!("{}: {}", self.id, err);
            }
        }
        if let Some(target) = self.target.take() {
            if let Err(err) = engine.set_drive_target(self.handle, target) {
                tracing::error!("{}: {}", self.id, err);
            }
        }
    }

    /// Destroy the engine joint and wake every dynamic body it held
    pub(crate) fn destroy<E: PhysicsEngine>(self, engine: &mut E) {
        if let Err(err) = engine.destroy_joint(self.handle) {
            tracing::error!("{}: {}", self.id, err);
        }
        for body in self.bodies.0.into_iter().chain(std::iter::once(self.bodies.1)) {
            if engine.is_dynamic(body) {
                engine.wake_up(body);
            }
        }
    }
}
