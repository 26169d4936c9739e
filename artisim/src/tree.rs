//! Kinematic tree builder
//!
//! Turns the flat link/joint lists of a [`RobotDescription`] into a rooted
//! tree stored as an arena. Parent links are indices into the arena, children
//! are index lists kept in joint declaration order.
//!
//! Any structural violation aborts the build; there is no partial tree.

use crate::description::{JointDescriptor, LinkDescriptor, RobotDescription};
use crate::error::StructuralError;
use std::collections::{HashMap, HashSet};

/// Index of a node in a [`KinematicTree`]
pub type NodeIndex = usize;

/// One link together with its inbound joint
#[derive(Debug, Clone)]
pub struct TreeNode<'a> {
    pub link: &'a LinkDescriptor,
    /// Inbound joint, `None` for the root
    pub joint: Option<&'a JointDescriptor>,
    pub parent: Option<NodeIndex>,
    pub children: Vec<NodeIndex>,
}

impl<'a> TreeNode<'a> {
    fn new(link: &'a LinkDescriptor) -> Self {
        Self {
            link,
            joint: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &'a str {
        &self.link.name
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Validated rooted tree over the links of a description
#[derive(Debug, Clone)]
pub struct KinematicTree<'a> {
    nodes: Vec<TreeNode<'a>>,
    root: NodeIndex,
}

impl<'a> KinematicTree<'a> {
    pub fn from_description(description: &'a RobotDescription) -> Result<Self, StructuralError> {
        Self::build(&description.links, &description.joints)
    }

    /// Build and validate the tree
    pub fn build(
        links: &'a [LinkDescriptor],
        joints: &'a [JointDescriptor],
    ) -> Result<Self, StructuralError> {
        let mut nodes: Vec<TreeNode<'a>> = Vec::with_capacity(links.len());
        let mut by_name: HashMap<&str, NodeIndex> = HashMap::with_capacity(links.len());

        for link in links {
            if by_name.insert(link.name.as_str(), nodes.len()).is_some() {
                return Err(StructuralError::DuplicateLink(link.name.clone()));
            }
            nodes.push(TreeNode::new(link));
        }

        let mut joint_names: HashSet<&str> = HashSet::with_capacity(joints.len());
        for joint in joints {
            if !joint_names.insert(joint.name.as_str()) {
                return Err(StructuralError::DuplicateJoint(joint.name.clone()));
            }

            let lookup = |link: &str| {
                by_name
                    .get(link)
                    .copied()
                    .ok_or_else(|| StructuralError::UnknownLink {
                        joint: joint.name.clone(),
                        link: link.to_string(),
                    })
            };
            let parent = lookup(&joint.parent)?;
            let child = lookup(&joint.child)?;

            if let Some(existing) = nodes[child].joint {
                return Err(StructuralError::MultipleParents {
                    link: joint.child.clone(),
                    first: existing.name.clone(),
                    second: joint.name.clone(),
                });
            }

            nodes[child].joint = Some(joint);
            nodes[child].parent = Some(parent);
            nodes[parent].children.push(child);
        }

        let roots: Vec<NodeIndex> = (0..nodes.len()).filter(|&i| nodes[i].is_root()).collect();
        let root = match roots.as_slice() {
            [root] => *root,
            [] if nodes.is_empty() => return Err(StructuralError::MissingRoot),
            // every link has a parent, so following parents must cycle
            [] => {
                return Err(StructuralError::KinematicLoop(
                    nodes.iter().map(|n| n.link.name.clone()).collect(),
                ))
            }
            _ => {
                return Err(StructuralError::MultipleRoots(
                    roots.iter().map(|&i| nodes[i].link.name.clone()).collect(),
                ))
            }
        };

        let tree = Self { nodes, root };
        tree.check_reachability()?;

        tracing::debug!(
            "built kinematic tree rooted at '{}' with {} links",
            tree.nodes[root].name(),
            tree.nodes.len()
        );
        Ok(tree)
    }

    fn check_reachability(&self) -> Result<(), StructuralError> {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![self.root];

        while let Some(index) = stack.pop() {
            if visited[index] {
                return Err(StructuralError::KinematicLoop(vec![self.nodes[index]
                    .link
                    .name
                    .clone()]));
            }
            visited[index] = true;
            stack.extend(self.nodes[index].children.iter().rev());
        }

        let unreachable: Vec<String> = visited
            .iter()
            .enumerate()
            .filter(|(_, seen)| !**seen)
            .map(|(i, _)| self.nodes[i].link.name.clone())
            .collect();

        if unreachable.is_empty() {
            Ok(())
        } else {
            Err(StructuralError::KinematicLoop(unreachable))
        }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn root_node(&self) -> &TreeNode<'a> {
        &self.nodes[self.root]
    }

    pub fn node(&self, index: NodeIndex) -> &TreeNode<'a> {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[TreeNode<'a>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, link: &str) -> Option<NodeIndex> {
        self.nodes.iter().position(|n| n.link.name == link)
    }

    /// Pre-order traversal from the root; every parent precedes its children
    pub fn depth_first(&self) -> Vec<NodeIndex> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            order.push(index);
            stack.extend(self.nodes[index].children.iter().rev());
        }
        order
    }

    /// Path from `index` up to the root, `index` first
    pub fn ancestors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut path = vec![index];
        let mut current = index;
        while let Some(parent) = self.nodes[current].parent {
            path.push(parent);
            current = parent;
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(names: &[&str]) -> Vec<LinkDescriptor> {
        names.iter().map(|n| LinkDescriptor::new(*n)).collect()
    }

    fn joint(name: &str, parent: &str, child: &str) -> JointDescriptor {
        JointDescriptor::new(name, "revolute", parent, child).with_limit(-1.0, 1.0)
    }

    #[test]
    fn test_valid_tree() {
        let links = links(&["base", "a", "b", "c"]);
        let joints = vec![
            joint("j1", "base", "a"),
            joint("j2", "a", "b"),
            joint("j3", "base", "c"),
        ];

        let tree = KinematicTree::build(&links, &joints).unwrap();
        assert_eq!(tree.len(), links.len());
        assert_eq!(tree.root_node().name(), "base");
        assert!(tree.root_node().joint.is_none());

        let order: Vec<&str> = tree.depth_first().iter().map(|&i| tree.node(i).name()).collect();
        assert_eq!(order, vec!["base", "a", "b", "c"]);

        let b = tree.find("b").unwrap();
        assert_eq!(tree.node(b).joint.unwrap().name, "j2");
        assert_eq!(tree.ancestors(b).len(), 3);
    }

    #[test]
    fn test_root_declared_last() {
        let links = links(&["leaf", "mid", "root"]);
        let joints = vec![joint("j2", "mid", "leaf"), joint("j1", "root", "mid")];
        let tree = KinematicTree::build(&links, &joints).unwrap();
        assert_eq!(tree.root_node().name(), "root");
        assert_eq!(tree.depth_first().len(), 3);
    }

    #[test]
    fn test_single_link() {
        let links = links(&["only"]);
        let tree = KinematicTree::build(&links, &[]).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root(), 0);
    }

    #[test]
    fn test_empty_description() {
        let err = KinematicTree::build(&[], &[]).unwrap_err();
        assert_eq!(err, StructuralError::MissingRoot);
    }

    #[test]
    fn test_disjoint_components() {
        let links = links(&["a", "b", "c", "d"]);
        let joints = vec![joint("j1", "a", "b"), joint("j2", "c", "d")];
        match KinematicTree::build(&links, &joints).unwrap_err() {
            StructuralError::MultipleRoots(roots) => assert_eq!(roots, vec!["a", "c"]),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_two_link_cycle() {
        let links = links(&["a", "b"]);
        let joints = vec![joint("j1", "a", "b"), joint("j2", "b", "a")];
        assert!(matches!(
            KinematicTree::build(&links, &joints),
            Err(StructuralError::KinematicLoop(_))
        ));
    }

    #[test]
    fn test_cycle_detached_from_root() {
        let links = links(&["root", "a", "b"]);
        let joints = vec![joint("j1", "a", "b"), joint("j2", "b", "a")];
        match KinematicTree::build(&links, &joints).unwrap_err() {
            StructuralError::KinematicLoop(names) => assert_eq!(names, vec!["a", "b"]),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_multiple_parents_any_order() {
        let links = links(&["a", "b", "c"]);
        let forward = vec![joint("j1", "a", "c"), joint("j2", "b", "c")];
        let reversed = vec![joint("j2", "b", "c"), joint("j1", "a", "c")];

        for joints in [forward, reversed] {
            match KinematicTree::build(&links, &joints).unwrap_err() {
                StructuralError::MultipleParents { link, .. } => assert_eq!(link, "c"),
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }

    #[test]
    fn test_duplicate_names() {
        let dup_links = links(&["a", "a"]);
        assert_eq!(
            KinematicTree::build(&dup_links, &[]).unwrap_err(),
            StructuralError::DuplicateLink("a".into())
        );

        let links = links(&["a", "b", "c"]);
        let joints = vec![joint("j", "a", "b"), joint("j", "a", "c")];
        assert_eq!(
            KinematicTree::build(&links, &joints).unwrap_err(),
            StructuralError::DuplicateJoint("j".into())
        );
    }

    #[test]
    fn test_unknown_link() {
        let links = links(&["a"]);
        let joints = vec![joint("j", "a", "ghost")];
        assert_eq!(
            KinematicTree::build(&links, &joints).unwrap_err(),
            StructuralError::UnknownLink {
                joint: "j".into(),
                link: "ghost".into()
            }
        );
    }
}
