//! Robot loader
//!
//! Entry point from a robot description to a registered scene object:
//! description → [`KinematicTree`] → [`assembler::assemble`] → camera mounts.

use crate::assembler;
use crate::config::LoaderConfig;
use crate::description::{RobotDescription, UrdfImporter};
use crate::engine::PhysicsEngine;
use crate::error::{SimError, SimResult};
use crate::render::{CameraSpec, RenderScene};
use crate::scene::{ObjectId, Scene};
use crate::tree::KinematicTree;
use nalgebra::Isometry3;
use std::path::Path;

/// Builds robot descriptions into a scene
pub struct RobotLoader<'s, E: PhysicsEngine, R: RenderScene> {
    scene: &'s mut Scene<E, R>,
    config: LoaderConfig,
    root_pose: Isometry3<f32>,
    name: Option<String>,
}

impl<'s, E: PhysicsEngine, R: RenderScene> RobotLoader<'s, E, R> {
    pub fn new(scene: &'s mut Scene<E, R>) -> Self {
        Self {
            scene,
            config: LoaderConfig::default(),
            root_pose: Isometry3::identity(),
            name: None,
        }
    }

    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// World pose of the root link
    pub fn with_root_pose(mut self, pose: Isometry3<f32>) -> Self {
        self.root_pose = pose;
        self
    }

    /// Object name; defaults to the robot name of the description
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn importer(&self) -> UrdfImporter {
        match &self.config.package_root {
            Some(root) => UrdfImporter::new().with_package_root(root.clone()),
            None => UrdfImporter::new(),
        }
    }

    /// Load a URDF file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> SimResult<ObjectId> {
        let description = self.importer().import_file(path)?;
        self.load_description(&description)
    }

    /// Load a URDF document held in memory
    pub fn load_str(&mut self, xml: &str) -> SimResult<ObjectId> {
        let description = self.importer().import_str(xml)?;
        self.load_description(&description)
    }

    /// Validate and assemble a description, then mount its cameras
    ///
    /// Nothing is left in the scene when validation or assembly fails.
    /// Camera mounts naming an unknown link are skipped with a warning.
    pub fn load_description(&mut self, description: &RobotDescription) -> SimResult<ObjectId> {
        self.config.validate()?;
        let tree = KinematicTree::from_description(description)?;

        let name = self.name.as_deref().unwrap_or(&description.name);
        let id = assembler::assemble(self.scene, &tree, &self.config, name, self.root_pose)?;

        for mount in &description.cameras {
            let target = self
                .scene
                .object(id)
                .and_then(|object| object.link_frame(&mount.reference))
                .map(|(body, offset)| (body.id, offset * mount.origin));

            let (actor, local_pose) = match target {
                Some(target) => target,
                None => {
                    let err = SimError::ReferenceResolution {
                        owner: mount.name.clone(),
                        reference: mount.reference.clone(),
                    };
                    tracing::warn!("skipping camera '{}': {}", mount.name, err);
                    continue;
                }
            };

            let spec = CameraSpec::new(mount.name.clone(), mount.width, mount.height, mount.fovy).with_fovx(mount.fovx);
            if let Err(err) = self.scene.add_mounted_camera(spec, actor, local_pose) {
                tracing::warn!("skipping camera '{}': {}", mount.name, err);
            }
        }

        tracing::info!(
            "loaded '{}': {} links, {} joints, {} cameras",
            name,
            tree.len(),
            description.joints.len(),
            description.cameras.len()
        );
        Ok(id)
    }
}
