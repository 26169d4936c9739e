//! One reduced-coordinate link per tree node

use super::{Assembled, AssemblyContext, PreparedJoint};
use crate::config::AssemblyStrategy;
use crate::engine::PhysicsEngine;
use crate::error::SimResult;
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
    let mut body_of = vec![0usize; tree.len()];
    let mut world = vec![Isometry3::identity(); tree.len()];
    let mut bodies: Vec<SimBody> = Vec::with_capacity(tree.len());
    let mut joints = Vec::with_capacity(tree.len().saturating_sub(1));
    let mut link_frames = HashMap::with_capacity(tree.len());

    for index in tree.depth_first() {
        let node = tree.node(index);
        let inbound = match (node.parent, node.joint) {
            (Some(parent), Some(joint)) => Some((parent, joint, PreparedJoint::new(joint, &Isometry3::identity())?)),
            _ => None,
        };

        let (parent_handle, pose) = match &inbound {
            Some((parent, joint, _)) => (Some(bodies[body_of[*parent]].handle), world[*parent] * joint.origin),
            None => (None, root_pose),
        };
        world[index] = pose;

        let mut body = ctx.create_link(parent_handle, pose, node.name())?;
        ctx.attach_geometry(&mut body, node.link, &Isometry3::identity())?;
        ctx.apply_inertia(body.handle, &node.link.inertial, node.name())?;

        let body_index = bodies.len();
        body_of[index] = body_index;
        link_frames.insert(node.name().to_string(), (body_index, Isometry3::identity()));

        if let Some((parent, joint, prepared)) = inbound {
            let handle = ctx.engine().configure_inbound_joint(body.handle, &prepared.spec)?;
            tracing::trace!(
                "joint '{}' ({}) between '{}' and '{}'",
                joint.name,
                prepared.kind,
                tree.node(parent).name(),
                node.name()
            );
            joints.push(prepared.record(Some(body_of[parent]), body_index).with_handle(handle));
        }
        bodies.push(body);
    }

    let balance = ctx.config().balance_passive_force;
    Ok(Assembled {
        bodies,
        joints,
        root: 0,
        link_frames,
        control: Control::Articulation {
            strategy: AssemblyStrategy::Articulation,
            balance_passive_force: balance,
            balance_dirty: balance,
        },
    })
}
