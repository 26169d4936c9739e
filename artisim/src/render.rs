//! Renderer boundary
//!
//! The scene pushes geometry, cameras and lights through [`RenderScene`]; it
//! never reads anything back except the ids handed out by the renderer.
//! [`HeadlessRenderer`] keeps the last pushed state in memory and is used by
//! the command line tool and the tests.

use nalgebra::{Isometry3, Unit, Vector3};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Id of a visual body, camera or light inside the renderer
pub type RenderId = u64;

/// Geometry of a visual body
#[derive(Debug, Clone, PartialEq)]
pub enum VisualShape {
    Box { half_extents: Vector3<f32> },
    /// Capsule along the local Z axis
    Capsule { half_height: f32, radius: f32 },
    Sphere { radius: f32 },
    Mesh { filename: PathBuf, scale: [f32; 3] },
    /// Unbounded plane with normal along local +Z
    Plane,
}

/// Visual geometry or a debug rendering of collision geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisualRole {
    Visual,
    Collision,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualSpec {
    pub name: String,
    pub shape: VisualShape,
    pub role: VisualRole,
    pub color: [f32; 4],
}

impl VisualSpec {
    pub fn new(name: impl Into<String>, shape: VisualShape) -> Self {
        Self {
            name: name.into(),
            shape,
            role: VisualRole::Visual,
            color: [0.8, 0.8, 0.8, 1.0],
        }
    }

    pub fn with_role(mut self, role: VisualRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }
}

/// Pinhole camera parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSpec {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fovx: f32,
    pub fovy: f32,
    pub near: f32,
    pub far: f32,
}

impl CameraSpec {
    /// Camera whose horizontal field of view follows from `fovy` and the aspect ratio
    pub fn new(name: impl Into<String>, width: u32, height: u32, fovy: f32) -> Self {
        let aspect = if height > 0 {
            width as f32 / height as f32
        } else {
            1.0
        };
        Self {
            name: name.into(),
            width,
            height,
            fovx: 2.0 * ((fovy / 2.0).tan() * aspect).atan(),
            fovy,
            near: 0.1,
            far: 100.0,
        }
    }

    pub fn with_fovx(mut self, fovx: f32) -> Self {
        self.fovx = fovx;
        self
    }

    pub fn with_clip(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LightSpec {
    Point {
        position: Vector3<f32>,
        color: [f32; 3],
    },
    Directional {
        direction: Unit<Vector3<f32>>,
        color: [f32; 3],
    },
    Spot {
        position: Vector3<f32>,
        direction: Unit<Vector3<f32>>,
        fov: f32,
        color: [f32; 3],
    },
}

/// External renderer as seen by the scene
pub trait RenderScene {
    fn add_visual_body(&mut self, visual: &VisualSpec) -> RenderId;

    /// World pose of a visual body
    fn update_visual_body(&mut self, id: RenderId, pose: Isometry3<f32>);

    fn remove_visual_body(&mut self, id: RenderId);

    fn add_camera(&mut self, camera: &CameraSpec) -> RenderId;

    fn update_camera(&mut self, id: RenderId, pose: Isometry3<f32>);

    fn remove_camera(&mut self, id: RenderId);

    fn add_light(&mut self, light: &LightSpec) -> RenderId;

    fn remove_light(&mut self, id: RenderId);

    fn set_ambient_light(&mut self, color: [f32; 3]);

    /// Called once per render sync after all poses were pushed
    fn commit(&mut self) {}
}

/// In-memory renderer keeping the last pushed state
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    visuals: BTreeMap<RenderId, (VisualSpec, Isometry3<f32>)>,
    cameras: BTreeMap<RenderId, (CameraSpec, Isometry3<f32>)>,
    lights: BTreeMap<RenderId, LightSpec>,
    ambient: [f32; 3],
    commits: u64,
    next_id: RenderId,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> RenderId {
        self.next_id += 1;
        self.next_id
    }

    pub fn visual_count(&self) -> usize {
        self.visuals.len()
    }

    pub fn visual(&self, id: RenderId) -> Option<&VisualSpec> {
        self.visuals.get(&id).map(|(spec, _)| spec)
    }

    pub fn visual_pose(&self, id: RenderId) -> Option<Isometry3<f32>> {
        self.visuals.get(&id).map(|(_, pose)| *pose)
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    pub fn camera(&self, id: RenderId) -> Option<&CameraSpec> {
        self.cameras.get(&id).map(|(spec, _)| spec)
    }

    pub fn camera_pose(&self, id: RenderId) -> Option<Isometry3<f32>> {
        self.cameras.get(&id).map(|(_, pose)| *pose)
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    pub fn ambient_light(&self) -> [f32; 3] {
        self.ambient
    }

    /// Number of completed render syncs
    pub fn commits(&self) -> u64 {
        self.commits
    }
}

impl RenderScene for HeadlessRenderer {
    fn add_visual_body(&mut self, visual: &VisualSpec) -> RenderId {
        let id = self.next_id();
        self.visuals.insert(id, (visual.clone(), Isometry3::identity()));
        id
    }

    fn update_visual_body(&mut self, id: RenderId, pose: Isometry3<f32>) {
        match self.visuals.get_mut(&id) {
            Some(entry) => entry.1 = pose,
            None => tracing::warn!("update of unknown visual body {}", id),
        }
    }

    fn remove_visual_body(&mut self, id: RenderId) {
        if self.visuals.remove(&id).is_none() {
            tracing::warn!("removal of unknown visual body {}", id);
        }
    }

    fn add_camera(&mut self, camera: &CameraSpec) -> RenderId {
        let id = self.next_id();
        self.cameras.insert(id, (camera.clone(), Isometry3::identity()));
        id
    }

    fn update_camera(&mut self, id: RenderId, pose: Isometry3<f32>) {
        if let Some(entry) = self.cameras.get_mut(&id) {
            entry.1 = pose;
        }
    }

    fn remove_camera(&mut self, id: RenderId) {
        self.cameras.remove(&id);
    }

    fn add_light(&mut self, light: &LightSpec) -> RenderId {
        let id = self.next_id();
        self.lights.insert(id, light.clone());
        id
    }

    fn remove_light(&mut self, id: RenderId) {
        self.lights.remove(&id);
    }

    fn set_ambient_light(&mut self, color: [f32; 3]) {
        self.ambient = color;
    }

    fn commit(&mut self) {
        self.commits += 1;
    }
}
