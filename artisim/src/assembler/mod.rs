//! Articulation and joint-system assembler
//!
//! Walks a validated [`KinematicTree`] parents first and creates the engine
//! objects for it. Three strategies share the walk:
//!
//! - [`AssemblyStrategy::Articulation`]: one reduced-coordinate link per node,
//!   fixed joints become zero-DOF joints.
//! - [`AssemblyStrategy::JointSystem`]: independent bodies connected by
//!   joints; a fixed sub-tree is baked into its parent's body.
//! - [`AssemblyStrategy::Kinematic`]: kinematic bodies moved by forward
//!   kinematics from a joint-position vector.
//!
//! Assembly is all-or-nothing. On any error every body and render body created
//! so far is discarded before the error is returned.

mod articulation;
mod joint_system;
mod kinematic;

pub use kinematic::ROOT_JOINT;

use crate::config::{AssemblyStrategy, LoaderConfig};
use crate::description::{Geometry, InertialDescriptor, JointDescriptor, JointKind, JointLimit, LinkDescriptor};
use crate::engine::{BodyHandle, BodyKind, CollisionShape, JointMotion, JointSpec, PhysicsEngine, ShapeMaterial};
use crate::error::{SimError, SimResult};
use crate::inertial;
use crate::joint_frame;
use crate::mesh;
use crate::render::{RenderId, RenderScene, VisualRole, VisualShape, VisualSpec};
use crate::scene::{ArticulationJoint, Control, ObjectId, Scene, SceneObject, SimBody};
use crate::tree::KinematicTree;
use nalgebra::{Isometry3, Vector3};
use std::collections::HashMap;

const DEFAULT_VISUAL_COLOR: [f32; 4] = [0.8, 0.8, 0.8, 1.0];

/// Output of one strategy, before registration with the scene
pub(crate) struct Assembled {
    pub bodies: Vec<SimBody>,
    pub joints: Vec<ArticulationJoint>,
    pub root: usize,
    pub link_frames: HashMap<String, (usize, Isometry3<f32>)>,
    pub control: Control,
}

/// Inbound joint of a node, mapped to engine terms
#[derive(Debug, Clone)]
pub(crate) struct PreparedJoint {
    pub kind: JointKind,
    pub spec: JointSpec,
    pub limit: Option<JointLimit>,
}

impl PreparedJoint {
    /// Map kind and limit, and build the attachment frames
    ///
    /// `parent_offset` is the parent link's frame inside its body; identity
    /// unless the parent was collapsed into an ancestor.
    pub fn new(joint: &JointDescriptor, parent_offset: &Isometry3<f32>) -> SimResult<Self> {
        let kind = joint.joint_kind()?;
        let limit = if kind.requires_limit() {
            let limit = joint.required_limit()?;
            if !limit.is_valid() {
                return Err(SimError::description(format!(
                    "joint '{}' has an invalid limit [{}, {}]",
                    joint.name, limit.lower, limit.upper
                )));
            }
            Some(limit)
        } else {
            None
        };
        let bounds = limit.map(|l| [l.lower, l.upper]);
        let motion = match kind {
            JointKind::Fixed => JointMotion::Fixed,
            JointKind::Revolute => JointMotion::Revolute { limit: bounds },
            JointKind::Continuous => JointMotion::Revolute { limit: None },
            JointKind::Prismatic => JointMotion::Prismatic { limit: bounds },
        };

        let frames = joint_frame::build_with_offset(&joint.axis, &joint.origin, parent_offset, &joint.name)?;
        Ok(Self {
            kind,
            spec: JointSpec {
                name: joint.name.clone(),
                motion,
                parent_pose: frames.parent_pose,
                child_pose: frames.child_pose,
                friction: 0.0,
            },
            limit,
        })
    }

    pub fn record(&self, parent: Option<usize>, child: usize) -> ArticulationJoint {
        ArticulationJoint::new(self.spec.name.clone(), self.kind, parent, child)
            .with_frames(self.spec.parent_pose, self.spec.child_pose)
            .with_limit(self.limit)
    }
}

/// Collision geometry in engine terms; cylinders become capsules
pub fn collision_shape(geometry: &Geometry) -> SimResult<CollisionShape> {
    Ok(match geometry {
        Geometry::Box { size } => CollisionShape::Cuboid {
            half_extents: Vector3::from(*size) / 2.0,
        },
        Geometry::Cylinder { radius, length } | Geometry::Capsule { radius, length } => {
            CollisionShape::Capsule {
                half_height: length / 2.0,
                radius: *radius,
            }
        }
        Geometry::Sphere { radius } => CollisionShape::Ball { radius: *radius },
        Geometry::Mesh { filename, scale } => {
            let mesh = mesh::load_mesh(filename, *scale)?;
            CollisionShape::ConvexDecomposition {
                vertices: mesh.vertices,
                indices: mesh.indices,
            }
        }
    })
}

pub fn visual_shape(geometry: &Geometry) -> VisualShape {
    match geometry {
        Geometry::Box { size } => VisualShape::Box {
            half_extents: Vector3::from(*size) / 2.0,
        },
        Geometry::Cylinder { radius, length } | Geometry::Capsule { radius, length } => VisualShape::Capsule {
            half_height: length / 2.0,
            radius: *radius,
        },
        Geometry::Sphere { radius } => VisualShape::Sphere { radius: *radius },
        Geometry::Mesh { filename, scale } => VisualShape::Mesh {
            filename: filename.clone(),
            scale: *scale,
        },
    }
}

/// Scene access plus bookkeeping for rollback
pub(crate) struct AssemblyContext<'s, E: PhysicsEngine, R: RenderScene> {
    scene: &'s mut Scene<E, R>,
    config: &'s LoaderConfig,
    material: ShapeMaterial,
    created: Vec<BodyHandle>,
    visuals: Vec<RenderId>,
}

impl<'s, E: PhysicsEngine, R: RenderScene> AssemblyContext<'s, E, R> {
    fn new(scene: &'s mut Scene<E, R>, config: &'s LoaderConfig) -> Self {
        let material = ShapeMaterial {
            density: config.density,
            ..ShapeMaterial::from_config(scene.config())
        };
        Self {
            scene,
            config,
            material,
            created: Vec::new(),
            visuals: Vec::new(),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        self.config
    }

    pub fn engine(&mut self) -> &mut E {
        self.scene.engine_mut()
    }

    fn new_body(&mut self, handle: BodyHandle, name: &str) -> SimBody {
        self.created.push(handle);
        SimBody {
            id: self.scene.new_actor_id(),
            name: name.to_string(),
            handle,
            shapes: Vec::new(),
            visuals: Vec::new(),
        }
    }

    pub fn create_link(&mut self, parent: Option<BodyHandle>, pose: Isometry3<f32>, name: &str) -> SimResult<SimBody> {
        let fix_root = self.config.fix_root_link;
        let handle = self
            .engine()
            .create_articulation_link(parent, pose, fix_root, name)?;
        Ok(self.new_body(handle, name))
    }

    pub fn create_body(&mut self, kind: BodyKind, pose: Isometry3<f32>, name: &str) -> SimResult<SimBody> {
        let handle = self.engine().create_body(kind, pose, name)?;
        Ok(self.new_body(handle, name))
    }

    /// Attach a link's collision and visual geometry at `offset` in the body
    pub fn attach_geometry(&mut self, body: &mut SimBody, link: &LinkDescriptor, offset: &Isometry3<f32>) -> SimResult<()> {
        for collision in &link.collisions {
            let shape = collision_shape(&collision.geometry)?;
            let pose = offset * collision.origin;
            let material = self.material;
            body.shapes
                .push(self.engine().attach_shape(body.handle, &shape, pose, material)?);

            let visual = VisualSpec::new(collision.name.clone(), visual_shape(&collision.geometry))
                .with_role(VisualRole::Collision);
            let attachment = self.scene.register_visual(&visual, pose);
            self.visuals.push(attachment.id);
            body.visuals.push(attachment);
        }

        for visual in &link.visuals {
            let spec = VisualSpec::new(visual.name.clone(), visual_shape(&visual.geometry))
                .with_color(visual.color.unwrap_or(DEFAULT_VISUAL_COLOR));
            let attachment = self.scene.register_visual(&spec, offset * visual.origin);
            self.visuals.push(attachment.id);
            body.visuals.push(attachment);
        }

        tracing::trace!(
            "link '{}': {} collision shapes, {} visuals",
            link.name,
            link.collisions.len(),
            link.visuals.len()
        );
        Ok(())
    }

    /// Explicit inertia when the tensor is given, engine estimate otherwise
    pub fn apply_inertia(&mut self, body: BodyHandle, inertial: &InertialDescriptor, link: &str) -> SimResult<()> {
        match inertial::resolve(inertial, link)? {
            Some(resolved) => {
                tracing::trace!(
                    "link '{}': mass {} principal moments {:?}",
                    link,
                    resolved.mass,
                    resolved.principal.as_slice()
                );
                self.engine().set_mass_properties(body, &resolved.into())
            }
            None => {
                tracing::debug!("link '{}' has no inertia tensor, estimating from shapes", link);
                let density = self.config.density;
                self.engine().update_mass_from_shapes(body, density)
            }
        }
    }

    fn finish(self, name: &str, assembled: Assembled) -> ObjectId {
        let id = self.scene.new_object_id();
        self.scene.insert_object(SceneObject::articulated(
            id,
            name,
            assembled.bodies,
            assembled.joints,
            assembled.root,
            assembled.link_frames,
            assembled.control,
        ))
    }

    fn rollback(self) {
        tracing::debug!(
            "discarding {} bodies and {} render bodies of a failed assembly",
            self.created.len(),
            self.visuals.len()
        );
        self.scene.discard(&self.created, &self.visuals);
    }
}

/// Build a validated tree into the scene with the configured strategy
pub fn assemble<E: PhysicsEngine, R: RenderScene>(
    scene: &mut Scene<E, R>,
    tree: &KinematicTree<'_>,
    config: &LoaderConfig,
    name: &str,
    root_pose: Isometry3<f32>,
) -> SimResult<ObjectId> {
    let strategy = config.effective_strategy();
    tracing::debug!("assembling '{}' ({} links) as {}", name, tree.len(), strategy);

    let mut ctx = AssemblyContext::new(scene, config);
    let result = match strategy {
        AssemblyStrategy::Articulation => articulation::build(&mut ctx, tree, root_pose),
        AssemblyStrategy::JointSystem => joint_system::build(&mut ctx, tree, root_pose),
        AssemblyStrategy::Kinematic => kinematic::build(&mut ctx, tree, root_pose),
    };

    match result {
        Ok(assembled) => Ok(ctx.finish(name, assembled)),
        Err(err) => {
            tracing::error!("assembly of '{}' failed: {}", name, err);
            ctx.rollback();
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{CollisionDescriptor, InertiaTensor, RobotDescription};
    use crate::engine::DryRunEngine;
    use crate::render::HeadlessRenderer;
    use crate::config::SceneConfig;

    fn scene() -> Scene<DryRunEngine, HeadlessRenderer> {
        Scene::new(DryRunEngine::new(), HeadlessRenderer::new(), SceneConfig::default()).unwrap()
    }

    fn boxed(name: &str) -> LinkDescriptor {
        LinkDescriptor::new(name).with_collision(CollisionDescriptor::new(
            format!("{}_collision", name),
            Geometry::Box { size: [0.1, 0.1, 0.1] },
        ))
    }

    #[test]
    fn test_cylinder_becomes_capsule() {
        let shape = collision_shape(&Geometry::Cylinder {
            radius: 0.05,
            length: 0.4,
        })
        .unwrap();
        assert_eq!(
            shape,
            CollisionShape::Capsule {
                half_height: 0.2,
                radius: 0.05
            }
        );
    }

    #[test]
    fn test_prepared_joint_limits() {
        let continuous = JointDescriptor::new("wheel", "continuous", "base", "tire").with_limit(-1.0, 1.0);
        let prepared = PreparedJoint::new(&continuous, &Isometry3::identity()).unwrap();
        assert_eq!(prepared.spec.motion, JointMotion::Revolute { limit: None });
        assert_eq!(prepared.spec.friction, 0.0);

        let unlimited = JointDescriptor::new("slide", "prismatic", "base", "cart");
        let err = PreparedJoint::new(&unlimited, &Isometry3::identity()).unwrap_err();
        assert!(matches!(err, SimError::Description(_)));
    }

    #[test]
    fn test_inverted_or_nan_limit_rejected() {
        for (lower, upper) in [(1.0, -1.0), (f32::NAN, 1.0), (0.0, f32::INFINITY)] {
            let joint = JointDescriptor::new("elbow", "revolute", "upper", "lower").with_limit(lower, upper);
            let err = PreparedJoint::new(&joint, &Isometry3::identity()).unwrap_err();
            assert!(matches!(err, SimError::Description(ref msg) if msg.contains("elbow")));
        }

        // continuous joints ignore whatever limit is declared
        let wheel = JointDescriptor::new("wheel", "continuous", "base", "tire").with_limit(1.0, -1.0);
        assert!(PreparedJoint::new(&wheel, &Isometry3::identity()).is_ok());
    }

    #[test]
    fn test_failed_assembly_leaves_nothing_behind() {
        let description = RobotDescription::new("broken")
            .with_link(boxed("base"))
            .with_link(boxed("arm"))
            .with_link(boxed("hand"))
            .with_joint(JointDescriptor::new("shoulder", "continuous", "base", "arm"))
            .with_joint(JointDescriptor::new("wrist", "floating", "arm", "hand"));
        let tree = KinematicTree::from_description(&description).unwrap();

        for strategy in [
            AssemblyStrategy::Articulation,
            AssemblyStrategy::JointSystem,
            AssemblyStrategy::Kinematic,
        ] {
            let mut scene = scene();
            let config = LoaderConfig::default().with_strategy(strategy);
            let err = assemble(&mut scene, &tree, &config, "broken", Isometry3::identity()).unwrap_err();

            assert!(matches!(err, SimError::UnsupportedFeature { ref joint, .. } if joint == "wrist"));
            assert_eq!(scene.engine().body_count(), 0, "{}", strategy);
            assert_eq!(scene.renderer().visual_count(), 0, "{}", strategy);
            assert!(scene.all_articulations().is_empty());
        }
    }

    #[test]
    fn test_explicit_inertia_skips_estimator() {
        let inertial = InertialDescriptor {
            mass: 2.0,
            inertia: InertiaTensor::diagonal(0.1, 0.2, 0.3),
            ..Default::default()
        };
        let description = RobotDescription::new("solid").with_link(boxed("base").with_inertial(inertial));
        let tree = KinematicTree::from_description(&description).unwrap();

        let mut scene = scene();
        let config = LoaderConfig::default().with_fix_root_link(false);
        let id = assemble(&mut scene, &tree, &config, "solid", Isometry3::identity()).unwrap();

        let handle = scene.object(id).unwrap().root_body().handle;
        assert_eq!(scene.engine().mass_properties(handle).map(|m| m.mass), Some(2.0));
        assert_eq!(scene.engine().estimated_density(handle), None);
    }
}
