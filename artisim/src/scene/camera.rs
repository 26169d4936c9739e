//! Cameras and lights forwarded to the renderer

use super::{ActorId, CameraId, LightId};
use crate::engine::BodyHandle;
use crate::render::{CameraSpec, LightSpec, RenderId};
use nalgebra::Isometry3;

/// Body a camera is parented to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraAttachment {
    pub actor: ActorId,
    pub(crate) body: BodyHandle,
    /// Camera pose in the body frame
    pub local_pose: Isometry3<f32>,
}

#[derive(Debug, Clone)]
pub struct SceneCamera {
    pub id: CameraId,
    pub spec: CameraSpec,
    /// World pose of a free camera; ignored when mounted
    pub pose: Isometry3<f32>,
    pub mount: Option<CameraAttachment>,
    pub(crate) render_id: RenderId,
}

impl SceneCamera {
    pub fn is_mounted_on(&self, actor: ActorId) -> bool {
        self.mount.map(|m| m.actor == actor).unwrap_or(false)
    }

    /// Renderer camera this entry drives
    pub fn render_id(&self) -> RenderId {
        self.render_id
    }
}

#[derive(Debug, Clone)]
pub struct SceneLight {
    pub id: LightId,
    pub spec: LightSpec,
    pub(crate) render_id: RenderId,
}
