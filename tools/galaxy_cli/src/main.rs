use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use galaxy_core::{
    build_galaxy_app, detect_evolution, layout::rank_order, load_galaxy_config_from_env,
    phase::{REDUCED_MOTION_KEY, REVEAL_COMPLETED_KEY},
    run_frame, DataState, FileStore, GalaxyConfig, GalaxyMetrics, KeyValueStore, LayoutPipeline,
    LayoutRequest, MemoryStore, PhaseController, SharedStore,
};
use galaxy_schema::{AnimationPhase, Artist, TimeRange};
use serde_json::json;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Galaxy layout and reveal harness", long_about = None)]
struct Cli {
    /// Galaxy config JSON (defaults to GALAXY_CONFIG_PATH, then builtin)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lay out an artist list and print positions as JSON
    Layout {
        /// JSON array of artists
        #[arg(long)]
        input: PathBuf,
        /// Time range used as the cache context
        #[arg(long, default_value_t = TimeRange::MediumTerm)]
        context: TimeRange,
        /// Persist positions in this directory between runs
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Drop every cached layout before running
        #[arg(long)]
        clear_cache: bool,
    },
    /// Tag rank movement between two artist lists
    Evolve {
        #[arg(long)]
        previous: PathBuf,
        #[arg(long)]
        current: PathBuf,
    },
    /// Simulate the reveal frame by frame and print one JSON line per sample
    Reveal {
        #[arg(long)]
        input: PathBuf,
        /// Frames per second of the simulated display
        #[arg(long, default_value_t = 60.0)]
        fps: f64,
        /// Simulated seconds to run
        #[arg(long, default_value_t = 4.0)]
        seconds: f64,
        /// Print every Nth frame
        #[arg(long, default_value_t = 6)]
        every: usize,
        #[arg(long)]
        reduced_motion: bool,
        /// Pretend the first reveal was already seen
        #[arg(long)]
        returning: bool,
        /// Send the skip signal at this time (seconds)
        #[arg(long)]
        skip_at: Option<f64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Layout {
            input,
            context,
            cache_dir,
            clear_cache,
        } => run_layout(config, &input, context, cache_dir.as_deref(), clear_cache),
        Command::Evolve { previous, current } => run_evolve(&config, &previous, &current),
        Command::Reveal {
            input,
            fps,
            seconds,
            every,
            reduced_motion,
            returning,
            skip_at,
        } => run_reveal(
            config,
            &input,
            RevealOptions {
                fps,
                seconds,
                every,
                reduced_motion,
                returning,
                skip_at,
            },
        ),
    }
}

fn load_config(path: Option<&Path>) -> Result<Arc<GalaxyConfig>> {
    match path {
        Some(path) => {
            let config = GalaxyConfig::from_file(path)
                .with_context(|| format!("Failed to load galaxy config at {}", path.display()))?;
            Ok(Arc::new(config))
        }
        None => Ok(load_galaxy_config_from_env().0),
    }
}

fn read_artists(path: &Path) -> Result<Vec<Artist>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read artists at {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse artist JSON at {}", path.display()))
}

fn run_layout(
    config: Arc<GalaxyConfig>,
    input: &Path,
    context: TimeRange,
    cache_dir: Option<&Path>,
    clear_cache: bool,
) -> Result<()> {
    let artists = read_artists(input)?;
    let store: SharedStore = match cache_dir {
        Some(dir) => Arc::new(
            FileStore::open(dir)
                .with_context(|| format!("Failed to open cache dir {}", dir.display()))?,
        ),
        None => MemoryStore::shared(),
    };

    let mut pipeline = LayoutPipeline::new(config, store);
    if clear_cache {
        pipeline.cache().clear_all();
    }
    let outcome = pipeline.compute(LayoutRequest::new(context.as_key(), artists));
    info!(
        context = %context,
        cache_hit = outcome.cache_hit,
        "Layout finished for {} artists",
        outcome.artists.len()
    );

    let bodies: Vec<_> = outcome
        .artists
        .iter()
        .filter_map(|artist| {
            outcome.positions.get(&artist.id).map(|position| {
                json!({
                    "id": artist.id,
                    "name": artist.name,
                    "cluster": artist.cluster_index,
                    "evolution": artist.evolution,
                    "position": position.to_array(),
                })
            })
        })
        .collect();
    let report = json!({
        "context": context.as_key(),
        "cacheHit": outcome.cache_hit,
        "layoutHash": format!("{:016x}", outcome.dataset.layout_hash()),
        "bodies": bodies,
        "connections": outcome.dataset.connections(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Files may list artists in any order; ranks come from popularity.
fn ranked(artists: Vec<Artist>) -> Vec<Artist> {
    let order = rank_order(&artists);
    let mut slots: Vec<Option<Artist>> = artists.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}

fn run_evolve(config: &GalaxyConfig, previous: &Path, current: &Path) -> Result<()> {
    let previous = ranked(read_artists(previous)?);
    let current = ranked(read_artists(current)?);
    let tagged = detect_evolution(current, Some(&previous), &config.evolution);
    for (rank, artist) in tagged.iter().enumerate() {
        println!("{rank:>3}  {:<8} {}", artist.evolution, artist.id);
    }
    Ok(())
}

struct RevealOptions {
    fps: f64,
    seconds: f64,
    every: usize,
    reduced_motion: bool,
    returning: bool,
    skip_at: Option<f64>,
}

fn run_reveal(config: Arc<GalaxyConfig>, input: &Path, options: RevealOptions) -> Result<()> {
    anyhow::ensure!(options.fps > 0.0, "fps must be positive");
    let store = MemoryStore::shared();
    if options.reduced_motion {
        store.set(REDUCED_MOTION_KEY, "1")?;
    }
    if options.returning {
        store.set(REVEAL_COMPLETED_KEY, "1")?;
    }

    let outcome = LayoutPipeline::new(Arc::clone(&config), Arc::clone(&store)).compute(
        LayoutRequest::new(TimeRange::MediumTerm.as_key(), read_artists(input)?),
    );

    let spawn_span = config.reveal.spawn_stagger + config.reveal.spawn_fade;
    let mut app = build_galaxy_app(config, store);
    {
        let mut controller = app.world.resource_mut::<PhaseController>();
        controller.notify_auth_changed(true);
        controller.notify_data_state(DataState::Loading);
        controller.notify_data_state(DataState::Ready(outcome.dataset));
    }

    let dt = 1.0 / options.fps;
    let frames = (options.seconds * options.fps).ceil() as usize;
    let every = options.every.max(1);
    let mut skip_pending = options.skip_at;

    for frame in 0..frames {
        run_frame(&mut app, dt);
        let now = (frame + 1) as f64 * dt;
        if let Some(at) = skip_pending {
            if now >= at {
                let accepted = app
                    .world
                    .resource_mut::<PhaseController>()
                    .trigger_skip();
                info!(at = now, accepted, "Skip signal sent");
                skip_pending = None;
            }
        }

        let metrics = app.world.resource::<GalaxyMetrics>();
        if frame % every == 0 || frame + 1 == frames {
            println!(
                "{}",
                json!({
                    "frame": metrics.frames,
                    "time": now,
                    "phase": metrics.phase,
                    "revealProgress": metrics.reveal_progress,
                    "activeSlots": metrics.active_slots,
                })
            );
        }
        if metrics.phase == AnimationPhase::Active
            && app.world.resource::<PhaseController>().frame_state().spawn_clock >= spawn_span
        {
            break;
        }
    }
    Ok(())
}
