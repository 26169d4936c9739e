use anyhow::{Context, Result};
use artisim::engine::PhysicsEngine;
use artisim::{
    AssemblyStrategy, DryRunEngine, HeadlessRenderer, KinematicTree, ObjectId, RapierEngine, RenderScene, Scene,
    SimConfig,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "artisim")]
#[command(about = "Load, validate and step URDF robot descriptions")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a URDF file and assemble it without simulating
    Validate {
        /// URDF file to check
        urdf: PathBuf,

        /// TOML configuration file
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,

        /// Assembly strategy (articulation, joint_system, kinematic)
        #[arg(short = 's', long = "strategy")]
        strategy: Option<AssemblyStrategy>,
    },

    /// Assemble a URDF file on the physics engine and step it
    Run {
        /// URDF file to simulate
        urdf: PathBuf,

        /// Number of steps
        #[arg(short = 'n', long = "steps", default_value = "100")]
        steps: u64,

        /// TOML configuration file
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,

        /// Assembly strategy (articulation, joint_system, kinematic)
        #[arg(short = 's', long = "strategy")]
        strategy: Option<AssemblyStrategy>,

        /// Add a ground plane at this altitude
        #[arg(short = 'g', long = "ground", value_name = "ALTITUDE")]
        ground: Option<f32>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Validate {
            urdf,
            config,
            strategy,
        } => validate(&urdf, load_config(config.as_deref(), strategy)?),
        Commands::Run {
            urdf,
            steps,
            config,
            strategy,
            ground,
        } => run(&urdf, steps, ground, load_config(config.as_deref(), strategy)?),
    }
}

fn load_config(path: Option<&Path>, strategy: Option<AssemblyStrategy>) -> Result<SimConfig> {
    let mut config = match path {
        Some(path) => SimConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SimConfig::default(),
    };
    if let Some(strategy) = strategy {
        config.loader.strategy = strategy;
    }
    Ok(config)
}

fn validate(urdf: &Path, config: SimConfig) -> Result<()> {
    let mut importer = artisim::description::UrdfImporter::new();
    if let Some(root) = &config.loader.package_root {
        importer = importer.with_package_root(root.clone());
    }
    let description = importer
        .import_file(urdf)
        .with_context(|| format!("Failed to read {}", urdf.display()))?;
    let tree = KinematicTree::from_description(&description)
        .with_context(|| format!("Invalid kinematic tree in {}", urdf.display()))?;

    println!("robot:  {}", description.name);
    println!("links:  {}", tree.len());
    println!("joints: {}", description.joints.len());
    for index in tree.depth_first() {
        let node = tree.node(index);
        let depth = std::iter::successors(node.parent, |p| tree.node(*p).parent).count();
        match node.joint {
            Some(joint) => println!("  {}{} ({} '{}')", "  ".repeat(depth), node.name(), joint.kind, joint.name),
            None => println!("  {}{} (root)", "  ".repeat(depth), node.name()),
        }
    }

    let mut scene = Scene::new(DryRunEngine::new(), HeadlessRenderer::new(), config.scene)?;
    let id = scene
        .create_loader()
        .with_config(config.loader.clone())
        .load_description(&description)
        .context("Assembly failed")?;

    summarize(&scene, id);
    println!("engine bodies: {}", scene.engine().body_count());
    println!("OK");
    Ok(())
}

fn run(urdf: &Path, steps: u64, ground: Option<f32>, config: SimConfig) -> Result<()> {
    let engine = RapierEngine::new(&config.scene);
    let mut scene = Scene::new(engine, HeadlessRenderer::new(), config.scene)?;
    if let Some(altitude) = ground {
        scene.add_ground(altitude, true)?;
    }

    let id = scene
        .create_loader()
        .with_config(config.loader)
        .load_file(urdf)
        .with_context(|| format!("Failed to load {}", urdf.display()))?;
    summarize(&scene, id);

    for _ in 0..steps {
        scene.step()?;
    }
    tracing::info!(
        "{} steps of {}s, {} active contacts",
        scene.step_count(),
        scene.timestep(),
        scene.contact_map().len()
    );

    if let Some(object) = scene.object(id) {
        for body in object.bodies() {
            if let Some(pose) = scene.engine().body_pose(body.handle) {
                let t = pose.translation.vector;
                println!("{:<24} [{:>8.4} {:>8.4} {:>8.4}]", body.name, t.x, t.y, t.z);
            }
        }
    }
    Ok(())
}

fn summarize<E: PhysicsEngine, R: RenderScene>(scene: &Scene<E, R>, id: ObjectId) {
    let Some(object) = scene.object(id) else {
        return;
    };
    println!(
        "assembled '{}' as {} ({}): {} bodies, {} joints, {} DOF",
        object.name(),
        object.kind().as_str(),
        object.strategy().map(|s| s.as_str()).unwrap_or("-"),
        object.bodies().len(),
        object.joints().len(),
        object.dof()
    );
    let cameras = scene
        .cameras()
        .filter(|c| object.bodies().iter().any(|b| c.is_mounted_on(b.id)))
        .count();
    if cameras > 0 {
        println!("mounted cameras: {}", cameras);
    }
}
