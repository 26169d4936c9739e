//! Single-body actors

use super::{ActorId, RenderAttachment, Scene, SceneObject, SimBody};
use crate::engine::{
    BodyHandle, BodyKind, CollisionShape, MassProperties, PhysicsEngine, ShapeHandle, ShapeMaterial,
};
use crate::error::SimResult;
use crate::render::{RenderId, RenderScene, VisualRole, VisualShape, VisualSpec};
use nalgebra::{Isometry3, Vector3};

/// Collision shape of an actor
#[derive(Debug, Clone, PartialEq)]
pub struct ActorShape {
    pub shape: CollisionShape,
    pub local_pose: Isometry3<f32>,
    /// Scene defaults when unset
    pub material: Option<ShapeMaterial>,
}

/// Everything needed to build one rigid body actor
#[derive(Debug, Clone)]
pub struct ActorSpec {
    pub name: String,
    pub kind: BodyKind,
    pub pose: Isometry3<f32>,
    pub shapes: Vec<ActorShape>,
    pub visuals: Vec<(VisualSpec, Isometry3<f32>)>,
    /// Explicit mass; estimated from the shapes otherwise
    pub mass: Option<MassProperties>,
    /// Density for the estimate; scene default when unset
    pub density: Option<f32>,
    /// Also render the collision shapes
    pub render_collisions: bool,
}

impl ActorSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: BodyKind::Dynamic,
            pose: Isometry3::identity(),
            shapes: Vec::new(),
            visuals: Vec::new(),
            mass: None,
            density: None,
            render_collisions: false,
        }
    }

    pub fn with_kind(mut self, kind: BodyKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_pose(mut self, pose: Isometry3<f32>) -> Self {
        self.pose = pose;
        self
    }

    pub fn with_collision(mut self, shape: CollisionShape, local_pose: Isometry3<f32>) -> Self {
        self.shapes.push(ActorShape {
            shape,
            local_pose,
            material: None,
        });
        self
    }

    pub fn with_material_collision(
        mut self,
        shape: CollisionShape,
        local_pose: Isometry3<f32>,
        material: ShapeMaterial,
    ) -> Self {
        self.shapes.push(ActorShape {
            shape,
            local_pose,
            material: Some(material),
        });
        self
    }

    pub fn with_visual(mut self, visual: VisualSpec, local_pose: Isometry3<f32>) -> Self {
        self.visuals.push((visual, local_pose));
        self
    }

    pub fn with_mass(mut self, mass: MassProperties) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = Some(density);
        self
    }

    pub fn with_rendered_collisions(mut self, render: bool) -> Self {
        self.render_collisions = render;
        self
    }
}

/// Render geometry matching a collision shape; meshes keep no file reference
pub(crate) fn collision_visual(shape: &CollisionShape) -> Option<VisualShape> {
    match shape {
        CollisionShape::Cuboid { half_extents } => Some(VisualShape::Box {
            half_extents: *half_extents,
        }),
        CollisionShape::Capsule { half_height, radius } => Some(VisualShape::Capsule {
            half_height: *half_height,
            radius: *radius,
        }),
        CollisionShape::Ball { radius } => Some(VisualShape::Sphere { radius: *radius }),
        CollisionShape::HalfSpace { .. } => Some(VisualShape::Plane),
        CollisionShape::ConvexDecomposition { .. } => None,
    }
}

impl<E: PhysicsEngine, R: RenderScene> Scene<E, R> {
    /// Create and register a single rigid body
    pub fn build_actor(&mut self, spec: ActorSpec) -> SimResult<ActorId> {
        let handle = self.engine.create_body(spec.kind, spec.pose, &spec.name)?;
        let mut visuals = Vec::new();

        let result = self.populate_actor(handle, &spec, &mut visuals);
        let shapes = match result {
            Ok(shapes) => shapes,
            Err(err) => {
                let render_ids: Vec<RenderId> = visuals.iter().map(|v| v.id).collect();
                self.discard(&[handle], &render_ids);
                return Err(err);
            }
        };

        let id = self.new_actor_id();
        let object_id = self.new_object_id();
        self.insert_object(SceneObject::actor(
            object_id,
            SimBody {
                id,
                name: spec.name,
                handle,
                shapes,
                visuals,
            },
        ));
        Ok(id)
    }

    fn populate_actor(
        &mut self,
        handle: BodyHandle,
        spec: &ActorSpec,
        visuals: &mut Vec<RenderAttachment>,
    ) -> SimResult<Vec<ShapeHandle>> {
        let default_material = ShapeMaterial::from_config(&self.config);
        let mut shapes = Vec::with_capacity(spec.shapes.len());

        for (index, shape) in spec.shapes.iter().enumerate() {
            let material = shape.material.unwrap_or(default_material);
            shapes.push(
                self.engine
                    .attach_shape(handle, &shape.shape, shape.local_pose, material)?,
            );

            if spec.render_collisions {
                if let Some(visual) = collision_visual(&shape.shape) {
                    let visual = VisualSpec::new(format!("{}_collision_{}", spec.name, index), visual)
                        .with_role(VisualRole::Collision);
                    visuals.push(self.register_visual(&visual, shape.local_pose));
                }
            }
        }

        for (visual, local_pose) in &spec.visuals {
            visuals.push(self.register_visual(visual, *local_pose));
        }

        if spec.kind == BodyKind::Dynamic {
            match &spec.mass {
                Some(mass) => self.engine.set_mass_properties(handle, mass)?,
                None => {
                    let density = spec.density.unwrap_or(self.config.default_density);
                    self.engine.update_mass_from_shapes(handle, density)?
                }
            }
        }
        Ok(shapes)
    }

    /// Static ground plane with its top surface at `altitude`
    pub fn add_ground(&mut self, altitude: f32, render: bool) -> SimResult<ActorId> {
        let mut spec = ActorSpec::new("ground")
            .with_kind(BodyKind::Static)
            .with_pose(Isometry3::translation(0.0, 0.0, altitude))
            .with_collision(
                CollisionShape::HalfSpace {
                    normal: Vector3::z_axis(),
                },
                Isometry3::identity(),
            );
        if render {
            spec = spec.with_visual(
                VisualSpec::new("ground", VisualShape::Plane).with_color([0.6, 0.6, 0.6, 1.0]),
                Isometry3::identity(),
            );
        }
        self.build_actor(spec)
    }
}
