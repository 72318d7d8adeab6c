//! Tunables for layout, evolution tagging, reveal timing and the skeleton scene.
//!
//! Loaded from `galaxy_config.json` with support for an environment variable override.

use std::{
    env, fs,
    hash::Hasher,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;

use crate::hashing::FnvHasher;

pub const BUILTIN_GALAXY_CONFIG: &str = include_str!("data/galaxy_config.json");

/// Root configuration for the galaxy engine.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GalaxyConfig {
    pub layout: LayoutConfig,
    pub evolution: EvolutionConfig,
    pub reveal: RevealConfig,
    pub skeleton: SkeletonConfig,
    pub render: RenderConfig,
}

impl GalaxyConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_GALAXY_CONFIG)
                .expect("builtin galaxy config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, GalaxyConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| GalaxyConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = GalaxyConfig::from_json_str(&contents)?;
        Ok(config)
    }

    /// Number of render slots needed to show either the skeleton or a full
    /// result set without reallocating.
    pub fn render_capacity(&self) -> usize {
        self.render.max_entities.max(self.skeleton.count)
    }
}

/// How genres with equal frequency are ordered when building cluster indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterTieBreak {
    /// Order of first appearance in the input list.
    #[default]
    FirstSeen,
    /// Lexicographic genre name; stable across re-fetches in a different order.
    Alphabetical,
}

/// Orbital placement parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub inner_radius: f32,
    pub outer_radius: f32,
    /// Scale applied to the vertical axis, `0..=1`. Lower values flatten the galaxy.
    pub vertical_compression: f32,
    /// Largest azimuthal nudge (radians) applied to group a genre cluster.
    pub cluster_angular_spread: f32,
    pub min_body_separation: f32,
    pub collision_iterations: u32,
    pub min_body_size: f32,
    pub max_body_size: f32,
    pub cluster_tie_break: ClusterTieBreak,
    pub min_connection_strength: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            inner_radius: 8.0,
            outer_radius: 35.0,
            vertical_compression: 0.35,
            cluster_angular_spread: 1.2,
            min_body_separation: 1.1,
            collision_iterations: 24,
            min_body_size: 0.6,
            max_body_size: 2.2,
            cluster_tie_break: ClusterTieBreak::FirstSeen,
            min_connection_strength: 0.2,
        }
    }
}

impl LayoutConfig {
    /// Stable hash of every field that moves a body. Connection strength is
    /// excluded since it never touches positions.
    pub fn placement_fingerprint(&self) -> u64 {
        let mut hasher = FnvHasher::new();
        for value in [
            self.inner_radius,
            self.outer_radius,
            self.vertical_compression,
            self.cluster_angular_spread,
            self.min_body_separation,
            self.min_body_size,
            self.max_body_size,
        ] {
            hasher.write_u32(value.to_bits());
        }
        hasher.write_u32(self.collision_iterations);
        hasher.write_u8(match self.cluster_tie_break {
            ClusterTieBreak::FirstSeen => 0,
            ClusterTieBreak::Alphabetical => 1,
        });
        hasher.finish()
    }
}

/// Rank-delta thresholds for rising/falling tags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub rising_threshold: i32,
    /// Magnitude of the downward move; an artist falls when `delta <= -falling_threshold`.
    pub falling_threshold: i32,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            rising_threshold: 5,
            falling_threshold: 5,
        }
    }
}

/// Reveal and spawn timing, all in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RevealConfig {
    pub first_visit_duration: f32,
    pub return_visit_duration: f32,
    pub skip_grace: f32,
    pub spawn_stagger: f32,
    pub spawn_fade: f32,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            first_visit_duration: 2.5,
            return_visit_duration: 0.4,
            skip_grace: 2.0,
            spawn_stagger: 1.2,
            spawn_fade: 0.35,
        }
    }
}

/// Placeholder galaxy shown before personal data arrives.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SkeletonConfig {
    pub count: usize,
    pub seed: u64,
    pub color: [f32; 3],
}

impl Default for SkeletonConfig {
    fn default() -> Self {
        Self {
            count: 120,
            seed: 0x5EED_6A1A,
            color: [0.42, 0.46, 0.58],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Upper bound on artists per result set (the fetch limit).
    pub max_entities: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { max_entities: 200 }
    }
}

#[derive(Debug, Error)]
pub enum GalaxyConfigError {
    #[error("failed to parse galaxy config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read galaxy config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Handle for accessing the active configuration from systems.
#[derive(Resource, Debug, Clone)]
pub struct GalaxyConfigHandle(pub Arc<GalaxyConfig>);

impl GalaxyConfigHandle {
    pub fn new(config: Arc<GalaxyConfig>) -> Self {
        Self(config)
    }

    pub fn get(&self) -> Arc<GalaxyConfig> {
        Arc::clone(&self.0)
    }
}

/// Load configuration from `GALAXY_CONFIG_PATH`, the crate default path, or the builtin copy.
///
/// Returns the path the configuration was read from, `None` for builtin.
pub fn load_galaxy_config_from_env() -> (Arc<GalaxyConfig>, Option<PathBuf>) {
    let override_path = env::var("GALAXY_CONFIG_PATH").ok().map(PathBuf::from);
    let default_path =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/galaxy_config.json");

    let path = override_path.unwrap_or(default_path);
    match GalaxyConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "galaxy::config",
                path = %path.display(),
                "galaxy_config.loaded=file"
            );
            return (Arc::new(config), Some(path));
        }
        Err(err) => {
            tracing::warn!(
                target: "galaxy::config",
                path = %path.display(),
                error = %err,
                "galaxy_config.load_failed"
            );
        }
    }

    tracing::info!(target: "galaxy::config", "galaxy_config.loaded=builtin");
    (GalaxyConfig::builtin(), None)
}
