//! Scene and loader configuration
//!
//! Both sections can be written to a TOML file; every field has a default so
//! partial files are accepted.
//!
//! ```toml
//! [scene]
//! timestep = 0.002
//! gravity = [0.0, 0.0, -9.81]
//!
//! [loader]
//! fix_root_link = true
//! strategy = "joint_system"
//! ```

use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How a kinematic tree is turned into engine objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyStrategy {
    /// One reduced-coordinate articulation, one link per tree node
    #[default]
    Articulation,
    /// Independent bodies connected by joints, fixed joints collapsed
    JointSystem,
    /// Kinematic bodies driven by forward kinematics
    Kinematic,
}

impl AssemblyStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssemblyStrategy::Articulation => "articulation",
            AssemblyStrategy::JointSystem => "joint_system",
            AssemblyStrategy::Kinematic => "kinematic",
        }
    }
}

impl fmt::Display for AssemblyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssemblyStrategy {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "articulation" => Ok(AssemblyStrategy::Articulation),
            "joint_system" | "joint-system" => Ok(AssemblyStrategy::JointSystem),
            "kinematic" => Ok(AssemblyStrategy::Kinematic),
            other => Err(SimError::Config(format!("unknown assembly strategy '{}'", other))),
        }
    }
}

/// Global simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Seconds advanced by one step
    pub timestep: f32,
    pub gravity: [f32; 3],
    /// Density used when a body's mass is estimated from its shapes
    pub default_density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub solver_iterations: usize,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            timestep: 1.0 / 500.0,
            gravity: [0.0, 0.0, -9.81],
            default_density: 1000.0,
            friction: 0.3,
            restitution: 0.1,
            solver_iterations: 4,
        }
    }
}

impl SceneConfig {
    pub fn with_timestep(mut self, timestep: f32) -> Self {
        self.timestep = timestep;
        self
    }

    pub fn with_gravity(mut self, gravity: [f32; 3]) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(SimError::Config(format!("timestep must be positive, got {}", self.timestep)));
        }
        if !(self.default_density.is_finite() && self.default_density > 0.0) {
            return Err(SimError::Config(format!(
                "default_density must be positive, got {}",
                self.default_density
            )));
        }
        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(SimError::Config("gravity must be finite".to_string()));
        }
        if self.solver_iterations == 0 {
            return Err(SimError::Config("solver_iterations must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Build-time flags of the robot loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Attach the root link to the world
    pub fix_root_link: bool,
    /// Collapse fixed joints into their parent body; selects the joint-system strategy
    pub collapse_fixed_joints: bool,
    /// Ask the engine to compensate passive forces on articulation links
    pub balance_passive_force: bool,
    pub strategy: AssemblyStrategy,
    /// Density for links whose inertia is left to the estimator
    pub density: f32,
    /// Directory `package://` mesh URIs resolve against
    pub package_root: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            fix_root_link: true,
            collapse_fixed_joints: false,
            balance_passive_force: false,
            strategy: AssemblyStrategy::Articulation,
            density: 1000.0,
            package_root: None,
        }
    }
}

impl LoaderConfig {
    pub fn with_strategy(mut self, strategy: AssemblyStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_fix_root_link(mut self, fix: bool) -> Self {
        self.fix_root_link = fix;
        self
    }

    pub fn with_collapse_fixed_joints(mut self, collapse: bool) -> Self {
        self.collapse_fixed_joints = collapse;
        self
    }

    pub fn with_balance_passive_force(mut self, balance: bool) -> Self {
        self.balance_passive_force = balance;
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    pub fn with_package_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.package_root = Some(root.into());
        self
    }

    /// Strategy after applying `collapse_fixed_joints`
    pub fn effective_strategy(&self) -> AssemblyStrategy {
        match self.strategy {
            AssemblyStrategy::Articulation if self.collapse_fixed_joints => AssemblyStrategy::JointSystem,
            strategy => strategy,
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        if !(self.density.is_finite() && self.density > 0.0) {
            return Err(SimError::Config(format!("density must be positive, got {}", self.density)));
        }
        Ok(())
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub scene: SceneConfig,
    pub loader: LoaderConfig,
}

impl SimConfig {
    pub fn from_file(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> SimResult<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| SimError::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> SimResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SimError::Config(format!("Failed to serialize TOML: {}", e)))
    }

    pub fn validate(&self) -> SimResult<()> {
        self.scene.validate()?;
        self.loader.validate()
    }
}
