//! Kinematic bodies posed by forward kinematics

use super::{Assembled, AssemblyContext, PreparedJoint};
use crate::description::JointKind;
use crate::engine::{BodyKind, PhysicsEngine};
use crate::error::SimResult;
use crate::render::RenderScene;
use crate::scene::{ArticulationJoint, Control, SimBody};
use crate::tree::KinematicTree;
use nalgebra::Isometry3;
use std::collections::HashMap;

/// Name of the fixed joint attaching the root body to the root pose
pub const ROOT_JOINT: &str = "root";

pub(super) fn build<E: PhysicsEngine, R: RenderScene>(
    ctx: &mut AssemblyContext<'_, E, R>,
    tree: &KinematicTree<'_>,
    root_pose: Isometry3<f32>,
) -> SimResult<Assembled> {
    let mut body_of = vec![0usize; tree.len()];
    let mut world = vec![Isometry3::identity(); tree.len()];
    let mut bodies: Vec<SimBody> = Vec::with_capacity(tree.len());
    let mut joints = Vec::with_capacity(tree.len());
    let mut link_frames = HashMap::with_capacity(tree.len());

    for index in tree.depth_first() {
        let node = tree.node(index);
        let body_index = bodies.len();

        let (pose, joint) = match (node.parent, node.joint) {
            (Some(parent), Some(joint)) => {
                let prepared = PreparedJoint::new(joint, &Isometry3::identity())?;
                (
                    world[parent] * joint.origin,
                    prepared.record(Some(body_of[parent]), body_index),
                )
            }
            _ => (
                root_pose,
                ArticulationJoint::new(ROOT_JOINT, JointKind::Fixed, None, body_index),
            ),
        };
        world[index] = pose;

        let mut body = ctx.create_body(BodyKind::Kinematic, pose, node.name())?;
        ctx.attach_geometry(&mut body, node.link, &Isometry3::identity())?;

        body_of[index] = body_index;
        link_frames.insert(node.name().to_string(), (body_index, Isometry3::identity()));
        joints.push(joint);
        bodies.push(body);
    }

    let qpos = joints
        .iter()
        .filter(|j| j.dof() == 1)
        .map(|j| j.limit.map(|l| l.clamp(0.0)).unwrap_or(0.0))
        .collect();

    Ok(Assembled {
        bodies,
        joints,
        root: 0,
        link_frames,
        control: Control::Kinematic {
            root_pose,
            qpos,
            dirty: true,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::super::assemble;
    use super::*;
    use crate::config::{AssemblyStrategy, LoaderConfig, SceneConfig};
    use crate::description::{JointDescriptor, LinkDescriptor, RobotDescription};
    use crate::engine::DryRunEngine;
    use crate::render::HeadlessRenderer;
    use crate::scene::{ObjectKind, Scene};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_qpos_moves_links_through_engine() {
        let description = RobotDescription::new("pan_tilt")
            .with_link(LinkDescriptor::new("base"))
            .with_link(LinkDescriptor::new("head"))
            .with_link(LinkDescriptor::new("slider"))
            .with_joint(
                JointDescriptor::new("pan", "continuous", "base", "head")
                    .with_origin(Isometry3::translation(0.0, 0.0, 0.2))
                    .with_axis(Vector3::z()),
            )
            .with_joint(
                JointDescriptor::new("extend", "prismatic", "head", "slider")
                    .with_origin(Isometry3::translation(0.1, 0.0, 0.0))
                    .with_limit(0.05, 0.3),
            );
        let tree = KinematicTree::from_description(&description).unwrap();
        let mut scene = Scene::new(DryRunEngine::new(), HeadlessRenderer::new(), SceneConfig::default()).unwrap();
        let config = LoaderConfig::default().with_strategy(AssemblyStrategy::Kinematic);
        let id = assemble(&mut scene, &tree, &config, "pan_tilt", Isometry3::identity()).unwrap();

        let object = scene.object_mut(id).unwrap();
        assert_eq!(object.kind(), ObjectKind::KinematicArticulation);
        assert_eq!(object.joints()[0].name, ROOT_JOINT);
        // initial positions respect the limits
        assert_eq!(object.qpos(), Some(&[0.0f32, 0.05][..]));

        object.set_qpos(&[FRAC_PI_2, 0.2]).unwrap();
        let slider = object.body("slider").unwrap().handle;
        scene.step().unwrap();

        let pose = scene.engine().body_pose(slider).unwrap();
        // pan turns the +X slide onto +Y
        assert_relative_eq!(pose.translation.vector, Vector3::new(0.0, 0.3, 0.2), epsilon = 1e-5);
    }
}
