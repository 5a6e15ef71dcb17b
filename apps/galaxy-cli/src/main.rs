mod config;
mod scene;

use clap::{Parser, Subcommand};
use galaxy_common::{EntityId, EntityKind};
use galaxy_frame::{FrameOrchestrator, FrameView};
use galaxy_lod::Quality;
use galaxy_spatial::Frustum;
use galaxy_tools::SceneInspector;
use glam::Vec3;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const FRAME_STEP: Duration = Duration::from_millis(16);

#[derive(Parser)]
#[command(name = "galaxy-cli", about = "CLI tool for the galaxy scene subsystem")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate info
    Info,
    /// Fly a camera around a synthetic scene and report diagnostics
    Simulate {
        /// Number of entities to scatter
        #[arg(short, long, default_value = "2000")]
        entities: usize,
        /// Number of frames to run
        #[arg(short, long, default_value = "240")]
        frames: u64,
        /// Camera zoom
        #[arg(short, long, default_value = "1.0")]
        zoom: f32,
        /// RNG seed for the scene layout
        #[arg(short, long, default_value = "42")]
        seed: u64,
        /// Half-width of the scene cube
        #[arg(long, default_value = "2000.0")]
        extent: f32,
        /// Quality preset: low, medium or high
        #[arg(short, long)]
        quality: Option<String>,
        /// JSON config file; missing fields take defaults
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Tint drawables by tier
        #[arg(long)]
        debug_colors: bool,
        /// Emit the final report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a radius query against a synthetic scene
    Query {
        /// Number of entities to scatter
        #[arg(short, long, default_value = "2000")]
        entities: usize,
        /// Search radius around the query point
        #[arg(short, long, default_value = "250.0")]
        radius: f32,
        /// Query point as x,y,z
        #[arg(long, value_delimiter = ',', default_values_t = [0.0, 0.0, 0.0], allow_negative_numbers = true)]
        at: Vec<f32>,
        /// Only report entities of this kind
        #[arg(short, long)]
        kind: Option<String>,
        /// RNG seed for the scene layout
        #[arg(short, long, default_value = "42")]
        seed: u64,
        /// Half-width of the scene cube
        #[arg(long, default_value = "2000.0")]
        extent: f32,
        /// Maximum neighbours to print
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("galaxy-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", galaxy_common::crate_info());
            println!("pool: {}", galaxy_pool::crate_info());
            println!("spatial: {}", galaxy_spatial::crate_info());
            println!("lod: {}", galaxy_lod::crate_info());
            println!("frame: {}", galaxy_frame::crate_info());
            println!("tools: {}", galaxy_tools::crate_info());
        }
        Commands::Simulate {
            entities,
            frames,
            zoom,
            seed,
            extent,
            quality,
            config,
            debug_colors,
            json,
        } => {
            let mut config = config::load(config.as_deref())?;
            if let Some(q) = quality {
                config.lod.quality = q.parse::<Quality>()?;
            }
            let mut orch = FrameOrchestrator::new(config)?;
            let layout = scene::generate(entities, extent, seed);
            let mut drawables = scene::populate(&mut orch, &layout)?;
            if debug_colors {
                orch.set_debug_colors(true, &mut drawables);
            }
            tracing::info!(entities, frames, seed, "simulation starting");

            let t0 = Instant::now();
            let mut visible_total = 0usize;
            let mut tier_changes = 0usize;
            for frame in 0..frames {
                let (eye, vp) = scene::orbit_camera(frame, frames, extent * 0.8);
                let view = FrameView::new(eye, zoom).with_frustum(Frustum::from_view_projection(&vp));
                let now = t0 + FRAME_STEP * (frame as u32);
                let report = orch.update(&view, &mut drawables, now);
                visible_total += report.visible;
                tier_changes += report.lod.tier_changes;
                tracing::debug!(
                    frame = report.frame,
                    visible = report.visible,
                    applied = report.lod.applied,
                    deferred = report.lod.deferred,
                    "frame done"
                );
            }

            let report = SceneInspector::report(&orch);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Simulated {frames} frames over {entities} entities (seed={seed}): mean visible={:.1}, tier changes={tier_changes}",
                    visible_total as f64 / frames.max(1) as f64
                );
                print!("{report}");
            }

            let disposed = orch.shutdown(&mut drawables);
            tracing::info!(
                disposed = disposed.disposed,
                bytes = disposed.bytes_reclaimed,
                "simulation finished"
            );
        }
        Commands::Query {
            entities,
            radius,
            at,
            kind,
            seed,
            extent,
            limit,
        } => {
            let kind = kind.map(|k| k.parse::<EntityKind>()).transpose()?;
            anyhow::ensure!(at.len() == 3, "--at takes exactly three values, got {}", at.len());
            let center = Vec3::from_slice(&at);
            let mut orch = FrameOrchestrator::new(config::load(None)?)?;
            let layout = scene::generate(entities, extent, seed);
            scene::populate(&mut orch, &layout)?;

            let neighbors = orch.spatial().query_radius(center, radius, kind.as_ref());
            println!(
                "{} entities within {radius} of ({:.1}, {:.1}, {:.1})",
                neighbors.len(),
                center.x,
                center.y,
                center.z
            );
            for n in neighbors.iter().take(limit) {
                print_neighbor(&orch, &n.id, n.distance);
            }
            if let Some(nearest) = neighbors.first() {
                let hits = orch.spatial().check_collisions(&nearest.id, 1.0);
                println!("{} overlaps with [{}]", hits.len(), nearest.id);
                for c in hits.iter().take(limit) {
                    println!(
                        "  [{}] distance={:.2} penetration={:.2}",
                        c.other, c.distance, c.penetration
                    );
                }
            }
        }
    }

    Ok(())
}

fn print_neighbor(orch: &FrameOrchestrator, id: &EntityId, distance: f32) {
    match SceneInspector::inspect_entity(orch, id) {
        Some(info) => println!("  {distance:>9.2}  {info}"),
        None => println!("  {distance:>9.2}  [{id}]"),
    }
}
