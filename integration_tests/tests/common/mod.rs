#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use bevy::prelude::App;
use galaxy_core::{
    build_galaxy_app, load_galaxy_config_from_env, run_frame, GalaxyConfig, PhaseController,
    SharedStore,
};
use galaxy_schema::{AnimationPhase, Artist};

static INIT: Once = Once::new();

pub const FRAME: f64 = 1.0 / 60.0;

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_galaxy_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test galaxy config at {}",
            config_path.display()
        );

        std::env::set_var("GALAXY_CONFIG_PATH", &config_path);
    });
}

pub fn test_config() -> Arc<GalaxyConfig> {
    ensure_test_config();
    let (config, path) = load_galaxy_config_from_env();
    assert!(path.is_some(), "fixture config should load from disk");
    config
}

pub fn test_app(store: SharedStore) -> App {
    build_galaxy_app(test_config(), store)
}

pub fn artist(id: &str, popularity: f32, genres: &[&str]) -> Artist {
    Artist::new(
        id,
        id.to_uppercase(),
        genres.iter().map(|g| g.to_string()).collect(),
        popularity,
    )
}

/// `count` artists with strictly decreasing popularity and overlapping genres.
pub fn roster(count: usize) -> Vec<Artist> {
    const GENRES: [&str; 6] = ["indie", "pop", "jazz", "techno", "folk", "soul"];
    (0..count)
        .map(|i| {
            artist(
                &format!("artist-{i:03}"),
                99.0 - (i as f32 * 90.0 / count.max(1) as f32),
                &[GENRES[i % GENRES.len()], GENRES[(i / 2) % GENRES.len()]],
            )
        })
        .collect()
}

pub fn phase(app: &App) -> AnimationPhase {
    app.world.resource::<PhaseController>().current_phase()
}

/// Run frames until `phase` is reached. Sleeps briefly between frames while
/// waiting on the background worker.
pub fn run_until_phase(app: &mut App, target: AnimationPhase, max_frames: usize) -> usize {
    for frame in 0..max_frames {
        if phase(app) == target {
            return frame;
        }
        run_frame(app, FRAME);
        if phase(app) == AnimationPhase::Loading {
            thread::sleep(Duration::from_millis(2));
        }
    }
    panic!("phase {target} not reached within {max_frames} frames (at {})", phase(app));
}
