use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::Vec3;
use rigidsync_common::{DrivenNode, Transform};
use rigidsync_kernel::{
    ColliderOptions, EventCallbacks, PhysicsConfig, RigidBodyOptions, Stepper, TimeStep,
};
use rigidsync_scene::{DebugTextRenderer, Renderer, SceneGraph};
use rigidsync_tools::{StepperInspector, SubstepHistory};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rigidsync-cli", about = "Run physics stepper scenarios")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and the default physics config
    Info,
    /// Drop a sphere onto the ground and print the scene as it falls
    Drop {
        /// Seconds of simulated time
        #[arg(short, long, default_value = "2.0")]
        seconds: f32,
        /// Starting height of the sphere
        #[arg(long, default_value = "10.0")]
        height: f32,
        /// Host frame rate, independent of the physics time step
        #[arg(long, default_value = "144")]
        fps: u32,
        /// Physics config file (.yaml, .yml or .json)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Step once per frame with the frame delta
        #[arg(long)]
        vary: bool,
    },
    /// Fly a ball through a sensor zone and report intersection events
    Sensor {
        /// Ball speed in units per second
        #[arg(long, default_value = "4.0")]
        speed: f32,
    },
    /// Validate a physics config file and show how it differs from the defaults
    Config { path: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            let config = PhysicsConfig::default();
            println!("rigidsync-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("default config: {config:#?}");
            let stepper = Stepper::new(config)?;
            println!("{}", StepperInspector::summary(&stepper));
        }
        Commands::Drop {
            seconds,
            height,
            fps,
            config,
            vary,
        } => run_drop(seconds, height, fps, config, vary)?,
        Commands::Sensor { speed } => run_sensor(speed)?,
        Commands::Config { path } => {
            let config = PhysicsConfig::load(&path)
                .with_context(|| format!("loading {}", path.display()))?;
            let diff = PhysicsConfig::default().diff(&config);
            println!("{}: valid", path.display());
            if diff.is_empty() {
                println!("identical to defaults");
            }
            for field in &diff.changed {
                let scope = if field.is_world_field() { "world" } else { "stepper" };
                println!("  {field:?} ({scope})");
            }
        }
    }

    Ok(())
}

fn run_drop(
    seconds: f32,
    height: f32,
    fps: u32,
    config: Option<PathBuf>,
    vary: bool,
) -> anyhow::Result<()> {
    let mut config = match config {
        Some(path) => PhysicsConfig::load(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PhysicsConfig::default(),
    };
    if vary {
        config.time_step = TimeStep::Vary;
    }
    let mut stepper = Stepper::new(config)?;
    let mut scene = SceneGraph::new();

    let ground = scene
        .add_node("ground", None, Transform::from_position(Vec3::new(0.0, -0.5, 0.0)))
        .context("adding ground node")?;
    stepper.register_collider(
        &scene,
        &ColliderOptions::cuboid(Vec3::new(10.0, 0.5, 10.0)),
        None,
        Some(ground),
        None,
    )?;

    let ball = scene
        .add_node("sphere", None, Transform::from_position(Vec3::new(0.0, height, 0.0)))
        .context("adding sphere node")?;
    let body = stepper.register_rigid_body(
        &scene,
        DrivenNode::Single(ball),
        &RigidBodyOptions::dynamic(),
    )?;
    stepper.register_collider(
        &scene,
        &ColliderOptions::ball(0.5).with_restitution(0.3),
        Some(body),
        Some(ball),
        None,
    )?;

    let log = Rc::new(RefCell::new(Vec::new()));
    let (landed, slept) = (Rc::clone(&log), Rc::clone(&log));
    stepper.subscribe_rigid_body_events(
        body,
        EventCallbacks::new()
            .on_collision_enter(move |p| {
                landed
                    .borrow_mut()
                    .push(format!("impact, normal={:?}", p.manifold.normal))
            })
            .on_sleep(move || slept.borrow_mut().push("sphere fell asleep".to_string())),
    )?;

    tracing::info!("dropping sphere from height {height} ({:?})", stepper.config().time_step);
    let fps = fps.max(1);
    let delta = 1.0 / fps as f32;
    let frames = (seconds.max(0.0) * fps as f32).ceil() as u32;
    let renderer = DebugTextRenderer::new();
    let mut history = SubstepHistory::new(fps as usize);

    for frame in 0..frames {
        let report = stepper.on_frame(delta, &mut scene);
        history.record_report(&report);
        for line in log.borrow_mut().drain(..) {
            println!("frame {frame}: {line}");
        }
        if frame % fps == 0 {
            print!("{}", renderer.render(&scene));
        }
        if stepper.total_substeps() > 0 && !report.needs_redraw {
            tracing::info!("scene settled after {frame} frames");
            break;
        }
    }

    print!("{}", renderer.render(&scene));
    println!("{}", StepperInspector::summary(&stepper));
    if let Some(info) = StepperInspector::inspect_body(&stepper, body) {
        println!("{info}");
    }
    println!(
        "substeps/frame: avg={:.2} max={} catch-up frames={}",
        history.average(),
        history.max(),
        history.catch_up_frames()
    );
    Ok(())
}

fn run_sensor(speed: f32) -> anyhow::Result<()> {
    let config = PhysicsConfig {
        gravity: Vec3::ZERO,
        ..PhysicsConfig::default()
    };
    let mut stepper = Stepper::new(config)?;
    let mut scene = SceneGraph::new();

    let zone = scene
        .add_node("zone", None, Transform::default())
        .context("adding zone node")?;
    let sensor = stepper.register_collider(
        &scene,
        &ColliderOptions::cuboid(Vec3::ONE).sensor(),
        None,
        Some(zone),
        Some(zone),
    )?;

    let ball = scene
        .add_node("ball", None, Transform::from_position(Vec3::new(-4.0, 0.0, 0.0)))
        .context("adding ball node")?;
    let body = stepper.register_rigid_body(
        &scene,
        DrivenNode::Single(ball),
        &RigidBodyOptions::dynamic().with_linear_velocity(Vec3::new(speed, 0.0, 0.0)),
    )?;
    stepper.register_collider(
        &scene,
        &ColliderOptions::ball(0.25),
        Some(body),
        Some(ball),
        None,
    )?;

    let log = Rc::new(RefCell::new(Vec::new()));
    let (enter, exit) = (Rc::clone(&log), Rc::clone(&log));
    stepper.subscribe_collider_events(
        sensor,
        EventCallbacks::new()
            .on_intersection_enter(move |p| {
                enter
                    .borrow_mut()
                    .push(format!("enter by {:?}", p.other.rigid_body_node))
            })
            .on_intersection_exit(move |p| {
                exit.borrow_mut()
                    .push(format!("exit by {:?}", p.other.rigid_body_node))
            }),
    )?;

    let delta = 1.0 / 60.0;
    let frames = ((8.0 / speed.abs().max(0.1)) * 60.0).ceil() as u32;
    tracing::info!("ball crossing sensor at {speed} units/s over {frames} frames");
    for frame in 0..frames {
        stepper.on_frame(delta, &mut scene);
        for line in log.borrow_mut().drain(..) {
            let x = scene.world_position(ball).map_or(f32::NAN, |p| p.x);
            println!("frame {frame}: {line} at x={x:.2}");
        }
    }
    println!("{}", StepperInspector::summary(&stepper));
    Ok(())
}
