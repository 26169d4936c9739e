//! URDF importer
//!
//! Converts a `urdf_rs::Robot` into a [`RobotDescription`]. Kind strings are
//! passed through untouched so unsupported joints are rejected later, by the
//! assembler, with the joint name attached.

use super::{
    CameraMount, CameraSensorParser, CollisionDescriptor, Geometry, InertiaTensor,
    InertialDescriptor, JointDescriptor, JointLimit, LinkDescriptor, RobotDescription,
    VisualDescriptor,
};
use crate::error::{SimError, SimResult};
use crate::math::pose_from_origin;
use nalgebra::{Isometry3, Vector3};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const PACKAGE_SCHEME: &str = "package://";
const FILE_SCHEME: &str = "file://";

pub struct UrdfImporter {
    base_path: PathBuf,
    package_root: Option<PathBuf>,
}

impl UrdfImporter {
    pub fn new() -> Self {
        Self {
            base_path: PathBuf::from("."),
            package_root: None,
        }
    }

    /// Directory relative mesh paths resolve against
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = path.into();
        self
    }

    /// Directory `package://` URIs resolve against
    pub fn with_package_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.package_root = Some(path.into());
        self
    }

    /// Read and convert a URDF file; mesh paths resolve against its directory
    pub fn import_file(&self, path: impl AsRef<Path>) -> SimResult<RobotDescription> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base_path.clone());

        let importer = Self {
            base_path: base,
            package_root: self.package_root.clone(),
        };
        importer.import_str(&xml)
    }

    pub fn import_str(&self, xml: &str) -> SimResult<RobotDescription> {
        let robot = urdf_rs::read_from_string(xml)
            .map_err(|e| SimError::description(format!("failed to parse URDF: {}", e)))?;

        let limited = joints_with_limit(xml)?;
        let cameras = CameraSensorParser::parse(xml)?;

        self.convert(&robot, &limited, cameras)
    }

    fn convert(
        &self,
        robot: &urdf_rs::Robot,
        limited: &HashSet<String>,
        cameras: Vec<CameraMount>,
    ) -> SimResult<RobotDescription> {
        let links = robot
            .links
            .iter()
            .map(|link| self.convert_link(robot, link))
            .collect::<SimResult<Vec<_>>>()?;

        let joints = robot
            .joints
            .iter()
            .map(|joint| convert_joint(joint, limited.contains(&joint.name)))
            .collect();

        tracing::debug!(
            "imported URDF '{}': {} links, {} joints, {} cameras",
            robot.name,
            robot.links.len(),
            robot.joints.len(),
            cameras.len()
        );

        Ok(RobotDescription {
            name: robot.name.clone(),
            links,
            joints,
            cameras,
        })
    }

    fn convert_link(&self, robot: &urdf_rs::Robot, link: &urdf_rs::Link) -> SimResult<LinkDescriptor> {
        let inertial = &link.inertial;
        let inertia = &inertial.inertia;

        let mut descriptor = LinkDescriptor::new(link.name.clone()).with_inertial(InertialDescriptor {
            mass: inertial.mass.value as f32,
            origin: pose(&inertial.origin),
            inertia: InertiaTensor {
                ixx: inertia.ixx as f32,
                iyy: inertia.iyy as f32,
                izz: inertia.izz as f32,
                ixy: inertia.ixy as f32,
                ixz: inertia.ixz as f32,
                iyz: inertia.iyz as f32,
            },
        });

        for (i, visual) in link.visual.iter().enumerate() {
            let name = visual
                .name
                .clone()
                .unwrap_or_else(|| format!("{}_visual_{}", link.name, i));
            let geometry = self.convert_geometry(&visual.geometry, &link.name)?;
            let mut v = VisualDescriptor::new(name, geometry).with_origin(pose(&visual.origin));
            v.color = visual
                .material
                .as_ref()
                .and_then(|m| material_color(robot, m));
            descriptor.visuals.push(v);
        }

        for (i, collision) in link.collision.iter().enumerate() {
            let name = collision
                .name
                .clone()
                .unwrap_or_else(|| format!("{}_collision_{}", link.name, i));
            let geometry = self.convert_geometry(&collision.geometry, &link.name)?;
            descriptor
                .collisions
                .push(CollisionDescriptor::new(name, geometry).with_origin(pose(&collision.origin)));
        }

        Ok(descriptor)
    }

    fn convert_geometry(&self, geometry: &urdf_rs::Geometry, link: &str) -> SimResult<Geometry> {
        Ok(match geometry {
            urdf_rs::Geometry::Box { size } => Geometry::Box {
                size: [size[0] as f32, size[1] as f32, size[2] as f32],
            },
            urdf_rs::Geometry::Cylinder { radius, length } => Geometry::Cylinder {
                radius: *radius as f32,
                length: *length as f32,
            },
            urdf_rs::Geometry::Capsule { radius, length } => Geometry::Capsule {
                radius: *radius as f32,
                length: *length as f32,
            },
            urdf_rs::Geometry::Sphere { radius } => Geometry::Sphere {
                radius: *radius as f32,
            },
            urdf_rs::Geometry::Mesh { filename, scale } => {
                let scale = scale
                    .as_ref()
                    .map(|s| [s[0] as f32, s[1] as f32, s[2] as f32])
                    .unwrap_or([1.0; 3]);
                Geometry::Mesh {
                    filename: self.resolve_mesh_path(filename, link)?,
                    scale,
                }
            }
        })
    }

    /// Resolve a mesh filename to a path on disk
    pub fn resolve_mesh_path(&self, filename: &str, link: &str) -> SimResult<PathBuf> {
        if filename.trim().is_empty() {
            return Err(SimError::description(format!(
                "link '{}' has a mesh with an empty filename",
                link
            )));
        }

        if let Some(relative) = filename.strip_prefix(PACKAGE_SCHEME) {
            let root = match &self.package_root {
                Some(root) => root,
                None => {
                    tracing::warn!(
                        "no package root configured, resolving '{}' against '{}'",
                        filename,
                        self.base_path.display()
                    );
                    &self.base_path
                }
            };
            Ok(root.join(relative))
        } else if let Some(absolute) = filename.strip_prefix(FILE_SCHEME) {
            Ok(PathBuf::from(absolute))
        } else {
            Ok(self.base_path.join(filename))
        }
    }
}

impl Default for UrdfImporter {
    fn default() -> Self {
        Self::new()
    }
}

fn pose(origin: &urdf_rs::Pose) -> Isometry3<f32> {
    pose_from_origin(
        [origin.xyz[0] as f32, origin.xyz[1] as f32, origin.xyz[2] as f32],
        [origin.rpy[0] as f32, origin.rpy[1] as f32, origin.rpy[2] as f32],
    )
}

fn joint_kind_str(kind: &urdf_rs::JointType) -> &'static str {
    match kind {
        urdf_rs::JointType::Revolute => "revolute",
        urdf_rs::JointType::Continuous => "continuous",
        urdf_rs::JointType::Prismatic => "prismatic",
        urdf_rs::JointType::Fixed => "fixed",
        urdf_rs::JointType::Floating => "floating",
        urdf_rs::JointType::Planar => "planar",
        urdf_rs::JointType::Spherical => "spherical",
    }
}

fn convert_joint(joint: &urdf_rs::Joint, has_limit: bool) -> JointDescriptor {
    let axis = &joint.axis.xyz;
    JointDescriptor {
        name: joint.name.clone(),
        kind: joint_kind_str(&joint.joint_type).to_string(),
        parent: joint.parent.link.clone(),
        child: joint.child.link.clone(),
        origin: pose(&joint.origin),
        axis: Vector3::new(axis[0] as f32, axis[1] as f32, axis[2] as f32),
        limit: has_limit.then(|| JointLimit::new(joint.limit.lower as f32, joint.limit.upper as f32)),
    }
}

fn material_color(robot: &urdf_rs::Robot, material: &urdf_rs::Material) -> Option<[f32; 4]> {
    let color = material.color.as_ref().or_else(|| {
        // named reference to a top-level material
        robot
            .materials
            .iter()
            .find(|m| m.name == material.name)
            .and_then(|m| m.color.as_ref())
    })?;
    let rgba = &color.rgba;
    Some([rgba[0] as f32, rgba[1] as f32, rgba[2] as f32, rgba[3] as f32])
}

/// Names of joints that carry an explicit `<limit>` element
fn joints_with_limit(xml: &str) -> SimResult<HashSet<String>> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| SimError::description(format!("failed to parse URDF XML: {}", e)))?;

    Ok(doc
        .descendants()
        .filter(|n| n.tag_name().name() == "joint")
        .filter(|n| n.parent_element().map(|p| p.tag_name().name()) == Some("robot"))
        .filter(|n| n.children().any(|c| c.tag_name().name() == "limit"))
        .filter_map(|n| n.attribute("name").map(str::to_string))
        .collect())
}
