//! Independent bodies connected by joints, with fixed joints collapsed
//!
//! A node whose inbound joint is fixed reuses its parent's body. Its geometry
//! is attached at the accumulated offset and its inertial is composed with the
//! other links of the body once the walk is done.

use super::{Assembled, AssemblyContext, PreparedJoint};
use crate::config::AssemblyStrategy;
use crate::description::{JointKind, LinkDescriptor};
use crate::engine::{BodyKind, PhysicsEngine};
use crate::error::SimResult;
use crate::inertial;
use crate::render::RenderScene;
use crate::scene::{Control, SimBody};
use crate::tree::KinematicTree;
use nalgebra::Isometry3;
use std::collections::HashMap;

pub(super) fn build<E: PhysicsEngine, R: RenderScene>(
    ctx: &mut AssemblyContext<'_, E, R>,
    tree: &KinematicTree<'_>,
    root_pose: Isometry3<f32>,
) -> SimResult<Assembled> {
    // body index and link frame inside that body, per node
    let mut frame_of = vec![(0usize, Isometry3::identity()); tree.len()];
    let mut bodies: Vec<SimBody> = Vec::new();
    let mut body_poses: Vec<Isometry3<f32>> = Vec::new();
    let mut parts: Vec<Vec<(&LinkDescriptor, Isometry3<f32>)>> = Vec::new();
    let mut joints = Vec::new();
    let mut link_frames = HashMap::with_capacity(tree.len());

    for index in tree.depth_first() {
        let node = tree.node(index);
        let fixed = match node.joint {
            Some(joint) => joint.joint_kind()? == JointKind::Fixed,
            None => false,
        };

        match (node.parent, node.joint) {
            (Some(parent), Some(joint)) if fixed => {
                let (body, parent_offset) = frame_of[parent];
                let offset = parent_offset * joint.origin;
                ctx.attach_geometry(&mut bodies[body], node.link, &offset)?;
                parts[body].push((node.link, offset));
                frame_of[index] = (body, offset);
                tracing::trace!(
                    "collapsed fixed joint '{}': '{}' baked into '{}'",
                    joint.name,
                    node.name(),
                    bodies[body].name
                );
            }
            (Some(parent), Some(joint)) => {
                let (parent_body, parent_offset) = frame_of[parent];
                let prepared = PreparedJoint::new(joint, &parent_offset)?;
                let pose = body_poses[parent_body] * parent_offset * joint.origin;

                let mut body = ctx.create_body(BodyKind::Dynamic, pose, node.name())?;
                ctx.attach_geometry(&mut body, node.link, &Isometry3::identity())?;
                let handle = ctx
                    .engine()
                    .create_joint(bodies[parent_body].handle, body.handle, &prepared.spec)?;

                let body_index = bodies.len();
                joints.push(prepared.record(Some(parent_body), body_index).with_handle(handle));
                frame_of[index] = (body_index, Isometry3::identity());
                bodies.push(body);
                body_poses.push(pose);
                parts.push(vec![(node.link, Isometry3::identity())]);
            }
            _ => {
                let kind = if ctx.config().fix_root_link {
                    BodyKind::Static
                } else {
                    BodyKind::Dynamic
                };
                let mut body = ctx.create_body(kind, root_pose, node.name())?;
                ctx.attach_geometry(&mut body, node.link, &Isometry3::identity())?;

                frame_of[index] = (bodies.len(), Isometry3::identity());
                bodies.push(body);
                body_poses.push(root_pose);
                parts.push(vec![(node.link, Isometry3::identity())]);
            }
        }
        let (body, offset) = frame_of[index];
        link_frames.insert(node.name().to_string(), (body, offset));
    }

    for (body, links) in bodies.iter().zip(&parts) {
        if ctx.engine().body_kind(body.handle) != Some(BodyKind::Dynamic) {
            continue;
        }
        apply_composed_inertia(ctx, body, links)?;
    }

    Ok(Assembled {
        bodies,
        joints,
        root: 0,
        link_frames,
        control: Control::Articulation {
            strategy: AssemblyStrategy::JointSystem,
            balance_passive_force: false,
            balance_dirty: false,
        },
    })
}

fn apply_composed_inertia<E: PhysicsEngine, R: RenderScene>(
    ctx: &mut AssemblyContext<'_, E, R>,
    body: &SimBody,
    links: &[(&LinkDescriptor, Isometry3<f32>)],
) -> SimResult<()> {
    if let [(link, _)] = links {
        return ctx.apply_inertia(body.handle, &link.inertial, &link.name);
    }

    let inertials: Vec<_> = links.iter().map(|(link, offset)| (&link.inertial, *offset)).collect();
    match inertial::compose(&inertials) {
        Some(composed) => {
            tracing::debug!(
                "body '{}': composed inertia of {} links, mass {}",
                body.name,
                links.len(),
                composed.mass
            );
            ctx.apply_inertia(body.handle, &composed, &body.name)
        }
        None => {
            let unspecified: Vec<&str> = links
                .iter()
                .filter(|(link, _)| link.inertial.inertia.is_unspecified())
                .map(|(link, _)| link.name.as_str())
                .collect();
            tracing::warn!(
                "body '{}': no inertia tensor for {}, estimating from shapes",
                body.name,
                if unspecified.is_empty() {
                    "a massless link set".to_string()
                } else {
                    unspecified.join(", ")
                }
            );
            let density = ctx.config().density;
            ctx.engine().update_mass_from_shapes(body.handle, density)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::assemble;
    use crate::config::{AssemblyStrategy, LoaderConfig, SceneConfig};
    use crate::description::{
        CollisionDescriptor, Geometry, InertiaTensor, InertialDescriptor, JointDescriptor, LinkDescriptor,
        RobotDescription,
    };
    use crate::engine::{DryRunEngine, EngineCall, JointMotion, PhysicsEngine};
    use crate::render::HeadlessRenderer;
    use crate::scene::Scene;
    use crate::tree::KinematicTree;
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Vector3};

    fn solid(name: &str, mass: f32) -> LinkDescriptor {
        LinkDescriptor::new(name)
            .with_inertial(InertialDescriptor {
                mass,
                inertia: InertiaTensor::diagonal(0.01, 0.01, 0.01),
                ..Default::default()
            })
            .with_collision(CollisionDescriptor::new(
                format!("{}_collision", name),
                Geometry::Sphere { radius: 0.05 },
            ))
    }

    fn collapsible() -> RobotDescription {
        RobotDescription::new("gripper")
            .with_link(solid("base", 1.0))
            .with_link(solid("flange", 3.0))
            .with_link(solid("finger", 0.5))
            .with_joint(
                JointDescriptor::new("flange_mount", "fixed", "base", "flange")
                    .with_origin(Isometry3::translation(0.0, 0.0, 0.4)),
            )
            .with_joint(
                JointDescriptor::new("finger_slide", "prismatic", "flange", "finger")
                    .with_origin(Isometry3::translation(0.1, 0.0, 0.0))
                    .with_limit(0.0, 0.04),
            )
    }

    fn build(description: &RobotDescription, fix_root: bool) -> Scene<DryRunEngine, HeadlessRenderer> {
        let tree = KinematicTree::from_description(description).unwrap();
        let mut scene = Scene::new(DryRunEngine::new(), HeadlessRenderer::new(), SceneConfig::default()).unwrap();
        let config = LoaderConfig::default()
            .with_collapse_fixed_joints(true)
            .with_fix_root_link(fix_root);
        assemble(&mut scene, &tree, &config, "gripper", Isometry3::identity()).unwrap();
        scene
    }

    #[test]
    fn test_fixed_child_merged_into_parent_body() {
        let description = collapsible();
        let scene = build(&description, true);
        let object = scene.all_articulations()[0];

        assert_eq!(object.strategy(), Some(AssemblyStrategy::JointSystem));
        assert_eq!(object.bodies().len(), 2);
        assert_eq!(scene.engine().body_count(), 2);
        assert_eq!(
            scene.engine().joint_motions(),
            vec![JointMotion::Prismatic { limit: Some([0.0, 0.04]) }]
        );

        // the flange geometry now lives on the base body
        assert_eq!(object.root_body().shapes.len(), 2);
        let (body, offset) = object.link_frame("flange").unwrap();
        assert_eq!(body.name, "base");
        assert_relative_eq!(offset.translation.vector, Vector3::new(0.0, 0.0, 0.4));

        let finger = object.body("finger").unwrap().handle;
        let pose = scene.engine().body_pose(finger).unwrap();
        assert_relative_eq!(pose.translation.vector, Vector3::new(0.1, 0.0, 0.4), epsilon = 1e-6);
    }

    #[test]
    fn test_merged_inertia_is_composed() {
        let description = collapsible();
        let scene = build(&description, false);
        let object = scene.all_articulations()[0];

        let mass = scene
            .engine()
            .mass_properties(object.root_body().handle)
            .unwrap();
        assert_relative_eq!(mass.mass, 4.0);
        // centre of mass pulled towards the heavier flange
        assert_relative_eq!(mass.local_frame.translation.vector.z, 0.3, epsilon = 1e-5);
    }

    #[test]
    fn test_unspecified_part_falls_back_to_estimator() {
        let description = RobotDescription::new("gripper")
            .with_link(solid("base", 1.0))
            .with_link(LinkDescriptor::new("bracket"))
            .with_joint(JointDescriptor::new("bracket_mount", "fixed", "base", "bracket"));
        let scene = build(&description, false);
        let root = scene.all_articulations()[0].root_body().handle;

        assert!(scene.engine().mass_properties(root).is_none());
        assert!(scene
            .engine()
            .calls()
            .iter()
            .any(|c| *c == EngineCall::EstimateMass { body: root, density: 1000.0 }));
    }
}
