//! Render-ready datasets: the placeholder skeleton and the personal target.
//!
//! Bodies are stored in slot order. For a target dataset that is rank order,
//! so slot 0 is always the most popular artist.

use std::f32::consts::TAU;

use bevy::math::Vec3;
use galaxy_schema::{hash_positions, Artist, Connection, EvolutionTag};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::config::GalaxyConfig;
use crate::layout::{body_size, PositionMap};

/// Golden-ratio conjugate; stepping hue by it keeps neighbouring clusters distinct.
const HUE_STEP: f32 = 0.618_034;
const HUE_OFFSET: f32 = 0.58;
const CLUSTER_SATURATION: f32 = 0.55;
const CLUSTER_VALUE: f32 = 0.95;

/// Per-slot attributes before they are flattened into render buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyAttributes {
    /// `None` for skeleton bodies.
    pub id: Option<String>,
    pub position: Vec3,
    pub color: Vec3,
    pub size: f32,
    pub evolution: EvolutionTag,
    /// Seconds after the active phase starts before this body fades in.
    pub spawn_delay: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GalaxyDataset {
    bodies: Vec<BodyAttributes>,
    connections: Vec<Connection>,
    layout_hash: u64,
}

impl GalaxyDataset {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Deterministic placeholder galaxy: `skeleton.count` anonymous bodies on
    /// the same shells the real layout uses, in a neutral colour.
    pub fn skeleton(config: &GalaxyConfig) -> Self {
        let layout = &config.layout;
        let count = config.skeleton.count;
        let mut rng = SmallRng::seed_from_u64(config.skeleton.seed);
        let base = Vec3::from_array(config.skeleton.color);
        let span = layout.outer_radius - layout.inner_radius;
        let shell_jitter = if count > 1 { span / count as f32 } else { 0.0 };
        let denominator = count.saturating_sub(1).max(1) as f32;

        let bodies = (0..count)
            .map(|slot| {
                let t = slot as f32 / denominator;
                let radius = layout.inner_radius + t * span + rng.gen_range(0.0..=shell_jitter);
                let z: f32 = rng.gen_range(-1.0..=1.0);
                let angle: f32 = rng.gen_range(0.0..TAU);
                let ring = (1.0 - z * z).max(0.0).sqrt();
                let mut position = Vec3::new(ring * angle.cos(), z, ring * angle.sin()) * radius;
                position.y *= layout.vertical_compression.clamp(0.0, 1.0);

                let shade: f32 = rng.gen_range(0.85..=1.15);
                BodyAttributes {
                    id: None,
                    position,
                    color: (base * shade).clamp(Vec3::ZERO, Vec3::ONE),
                    size: body_size(rng.gen_range(0.0..=50.0), layout),
                    evolution: EvolutionTag::Stable,
                    spawn_delay: 0.0,
                }
            })
            .collect::<Vec<_>>();

        let layout_hash = hash_positions(bodies.iter().map(|b| ("", b.position.to_array())));
        Self {
            bodies,
            connections: Vec::new(),
            layout_hash,
        }
    }

    /// Build the personal dataset from rank-ordered artists and their positions.
    ///
    /// Artists without a position are skipped. Spawn delays grow with distance
    /// from the centre so the galaxy blooms outward.
    pub fn from_layout(
        artists: &[Artist],
        positions: &PositionMap,
        connections: Vec<Connection>,
        config: &GalaxyConfig,
    ) -> Self {
        let placed: Vec<(&Artist, Vec3)> = artists
            .iter()
            .filter_map(|artist| positions.get(&artist.id).map(|pos| (artist, pos)))
            .collect();
        if placed.len() != artists.len() {
            tracing::warn!(
                target: "galaxy::pipeline",
                artists = artists.len(),
                placed = placed.len(),
                "dataset.missing_positions"
            );
        }

        let max_distance = placed
            .iter()
            .map(|(_, pos)| pos.length())
            .fold(0.0_f32, f32::max);
        let stagger = config.reveal.spawn_stagger.max(0.0);

        let bodies = placed
            .into_iter()
            .map(|(artist, position)| {
                let spawn_delay = if max_distance > f32::EPSILON {
                    position.length() / max_distance * stagger
                } else {
                    0.0
                };
                BodyAttributes {
                    id: Some(artist.id.clone()),
                    position,
                    color: cluster_color(artist.cluster_index),
                    size: body_size(artist.importance(), &config.layout),
                    evolution: artist.evolution,
                    spawn_delay,
                }
            })
            .collect();

        Self {
            bodies,
            connections,
            layout_hash: positions.layout_hash(),
        }
    }

    pub fn bodies(&self) -> &[BodyAttributes] {
        &self.bodies
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn layout_hash(&self) -> u64 {
        self.layout_hash
    }
}

/// RGB colour for a genre cluster.
pub fn cluster_color(cluster_index: usize) -> Vec3 {
    let hue = (cluster_index as f32 * HUE_STEP + HUE_OFFSET).fract();
    hsv_to_rgb(hue, CLUSTER_SATURATION, CLUSTER_VALUE)
}

fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> Vec3 {
    let h = hue.rem_euclid(1.0) * 6.0;
    let sector = h.floor();
    let f = h - sector;
    let p = value * (1.0 - saturation);
    let q = value * (1.0 - saturation * f);
    let t = value * (1.0 - saturation * (1.0 - f));
    match sector as u8 {
        0 => Vec3::new(value, t, p),
        1 => Vec3::new(q, value, p),
        2 => Vec3::new(p, value, t),
        3 => Vec3::new(p, q, value),
        4 => Vec3::new(t, p, value),
        _ => Vec3::new(value, p, q),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{LayoutEngine, OrbitalLayoutEngine};

    #[test]
    fn skeleton_is_reproducible() {
        let config = GalaxyConfig::default();
        let a = GalaxyDataset::skeleton(&config);
        let b = GalaxyDataset::skeleton(&config);
        assert_eq!(a, b);
        assert_eq!(a.len(), config.skeleton.count);
        assert!(a.bodies().iter().all(|body| body.id.is_none()));
        assert!(a.bodies().iter().all(|body| body.position.is_finite()));

        let mut reseeded = config.clone();
        reseeded.skeleton.seed ^= 1;
        assert_ne!(GalaxyDataset::skeleton(&reseeded).layout_hash(), a.layout_hash());
    }

    #[test]
    fn target_spawn_delays_grow_outward() {
        let config = GalaxyConfig::default();
        let artists: Vec<Artist> = (0..12)
            .map(|i| Artist::new(format!("a{i}"), "x", vec!["pop".into()], 100.0 - i as f32 * 8.0))
            .collect();
        let positions = OrbitalLayoutEngine.layout(&artists, &config.layout);
        let dataset = GalaxyDataset::from_layout(&artists, &positions, Vec::new(), &config);

        assert_eq!(dataset.len(), artists.len());
        let max_delay = dataset
            .bodies()
            .iter()
            .map(|b| b.spawn_delay)
            .fold(0.0, f32::max);
        assert!((max_delay - config.reveal.spawn_stagger).abs() < 1e-5);

        let mut by_distance: Vec<&BodyAttributes> = dataset.bodies().iter().collect();
        by_distance.sort_by(|a, b| a.position.length().total_cmp(&b.position.length()));
        for pair in by_distance.windows(2) {
            assert!(pair[0].spawn_delay <= pair[1].spawn_delay);
        }
        assert_eq!(dataset.layout_hash(), positions.layout_hash());
    }

    #[test]
    fn cluster_colours_are_distinct_and_in_range() {
        let colours: Vec<Vec3> = (0..6).map(cluster_color).collect();
        for colour in &colours {
            assert!(colour.min_element() >= 0.0 && colour.max_element() <= 1.0);
        }
        for (i, a) in colours.iter().enumerate() {
            for b in &colours[i + 1..] {
                assert!(a.distance(*b) > 0.05);
            }
        }
    }

    #[test]
    fn unplaced_artists_are_skipped() {
        let config = GalaxyConfig::default();
        let artists = vec![Artist::new("ghost", "Ghost", Vec::new(), 10.0)];
        let dataset = GalaxyDataset::from_layout(&artists, &PositionMap::new(), Vec::new(), &config);
        assert!(dataset.is_empty());
    }
}
