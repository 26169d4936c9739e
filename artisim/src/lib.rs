//! # Artisim
//!
//! Turns a robot description into an articulated rigid-body world and keeps
//! that world consistent while it is stepped.
//!
//! - **Description**: links, joints, inertials and camera mounts, read from URDF
//! - **Kinematic tree**: validated single-rooted tree over the description
//! - **Assembler**: articulation, jointed bodies or kinematic bodies from the tree
//! - **Scene**: object ownership, drives, cameras, contacts and the step pipeline
//!
//! Physics and rendering sit behind the [`PhysicsEngine`] and [`RenderScene`]
//! traits. [`RapierEngine`] is the production backend; [`DryRunEngine`] only
//! keeps bookkeeping and is used for validation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use artisim::{Scene, SceneConfig};
//!
//! let mut scene = Scene::headless(SceneConfig::default())?;
//! scene.add_ground(0.0, true)?;
//! let robot = scene.create_loader().load_file("robot.urdf")?;
//!
//! for _ in 0..100 {
//!     scene.step()?;
//! }
//! scene.remove_articulation(robot);
//! scene.step()?;
//! # Ok::<(), artisim::SimError>(())
//! ```

pub mod assembler;
pub mod config;
pub mod description;
pub mod engine;
pub mod error;
pub mod inertial;
pub mod joint_frame;
pub mod loader;
pub mod math;
pub mod mesh;
pub mod render;
pub mod scene;
pub mod tree;

// Re-export commonly used types for easy access
pub use config::{AssemblyStrategy, LoaderConfig, SceneConfig, SimConfig};
pub use description::{JointDescriptor, JointKind, LinkDescriptor, RobotDescription};
pub use engine::{BodyHandle, BodyKind, DryRunEngine, PhysicsEngine, RapierEngine};
pub use error::{SimError, SimResult, StructuralError};
pub use loader::RobotLoader;
pub use render::{HeadlessRenderer, RenderScene};
pub use scene::{ActorId, ActorSpec, DestroyState, ObjectId, ObjectKind, Scene, SceneObject};
pub use tree::KinematicTree;
