//! Orbital layout.
//!
//! Places artists on concentric shells: rank sets the orbit radius (most
//! popular innermost), a golden-angle spiral spreads successive ranks over the
//! sphere, the genre cluster nudges the azimuth so related artists drift
//! together, and a pairwise relaxation pass removes overlaps. The whole run is
//! deterministic; the only pseudo-random input is seeded from artist ids.

use std::collections::BTreeMap;
use std::f32::consts::{FRAC_PI_2, TAU};

use bevy::math::Vec3;
use galaxy_schema::{hash_positions, Artist, Position};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::clusters::{ClusterIndex, GenreClusterAssigner};
use crate::config::LayoutConfig;
use crate::hashing::pair_seed;

/// `PI * (3 - sqrt(5))`.
pub const GOLDEN_ANGLE: f32 = 2.399_963_2;

/// Overlap below this is treated as resolved so passes can exit early.
const COLLISION_TOLERANCE: f32 = 1e-4;

/// Separated pairs land this fraction past their minimum distance so a later
/// push from a neighbour does not immediately reopen the overlap.
const SEPARATION_SLACK: f32 = 0.05;

/// Extra sweeps per pass over pairs that started the pass within reach of each other.
const SETTLE_SWEEPS: u32 = 4;

/// Artist id to world position for one layout run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionMap {
    positions: BTreeMap<String, Vec3>,
}

impl PositionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Vec3> {
        self.positions.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, position: Vec3) {
        self.positions.insert(id.into(), position);
    }

    /// Entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Vec3)> {
        self.positions.iter().map(|(id, pos)| (id.as_str(), *pos))
    }

    pub fn to_records(&self) -> Vec<(String, Position)> {
        self.positions
            .iter()
            .map(|(id, pos)| (id.clone(), pos.to_array()))
            .collect()
    }

    pub fn from_records(records: Vec<(String, Position)>) -> Self {
        records
            .into_iter()
            .map(|(id, pos)| (id, Vec3::from_array(pos)))
            .collect()
    }

    /// Stable hash of every id and coordinate bit pattern.
    pub fn layout_hash(&self) -> u64 {
        hash_positions(self.positions.iter().map(|(id, pos)| (id.as_str(), pos.to_array())))
    }
}

impl FromIterator<(String, Vec3)> for PositionMap {
    fn from_iter<T: IntoIterator<Item = (String, Vec3)>>(iter: T) -> Self {
        Self {
            positions: iter.into_iter().collect(),
        }
    }
}

/// Per-artist working state during a single layout run.
#[derive(Debug, Clone)]
pub struct LayoutNode<'a> {
    pub artist: &'a Artist,
    pub cluster_index: usize,
    /// 0 = most popular.
    pub rank: usize,
    pub orbit_radius: f32,
    pub size: f32,
    pub position: Vec3,
}

/// Strategy seam for producing a [`PositionMap`]; the cache wraps any engine.
pub trait LayoutEngine {
    fn layout(&self, artists: &[Artist], config: &LayoutConfig) -> PositionMap;

    /// Layout for artists whose genre table was already built by the caller.
    fn layout_clustered(
        &self,
        artists: &[Artist],
        _clusters: &ClusterIndex,
        config: &LayoutConfig,
    ) -> PositionMap {
        self.layout(artists, config)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrbitalLayoutEngine;

impl OrbitalLayoutEngine {
    /// Run every placement step and return the nodes in rank order.
    pub fn plan<'a>(&self, artists: &'a [Artist], config: &LayoutConfig) -> Vec<LayoutNode<'a>> {
        if artists.is_empty() {
            return Vec::new();
        }
        let clusters = GenreClusterAssigner::new(config.cluster_tie_break).index(artists);
        self.plan_with_clusters(artists, &clusters, config)
    }

    /// [`Self::plan`] with a caller-supplied genre table.
    pub fn plan_with_clusters<'a>(
        &self,
        artists: &'a [Artist],
        clusters: &ClusterIndex,
        config: &LayoutConfig,
    ) -> Vec<LayoutNode<'a>> {
        let total = artists.len();
        if total == 0 {
            return Vec::new();
        }

        let cluster_count = clusters.len().max(1) as f32;
        let denominator = (total - 1).max(1) as f32;
        let compression = config.vertical_compression.clamp(0.0, 1.0);

        let mut nodes: Vec<LayoutNode<'a>> = rank_order(artists)
            .into_iter()
            .enumerate()
            .map(|(rank, index)| {
                let artist = &artists[index];
                let cluster_index = clusters.cluster_for(artist);
                let t = rank as f32 / denominator;
                let orbit_radius =
                    config.inner_radius + t * (config.outer_radius - config.inner_radius);

                // A lone artist sits on the equator so compression keeps it at the inner radius.
                let theta = if total == 1 {
                    FRAC_PI_2
                } else {
                    (1.0 - 2.0 * t).clamp(-1.0, 1.0).acos()
                };
                let phi = rank as f32 * GOLDEN_ANGLE
                    + (cluster_index as f32 / cluster_count) * config.cluster_angular_spread;

                let direction = Vec3::new(
                    theta.sin() * phi.cos(),
                    theta.cos(),
                    theta.sin() * phi.sin(),
                );
                let mut position = direction * orbit_radius;
                position.y *= compression;

                LayoutNode {
                    artist,
                    cluster_index,
                    rank,
                    orbit_radius,
                    size: body_size(artist.importance(), config),
                    position,
                }
            })
            .collect();

        let passes = resolve_collisions(&mut nodes, config);
        tracing::debug!(
            target: "galaxy::layout",
            artists = total,
            clusters = clusters.len(),
            passes,
            "layout.planned"
        );
        nodes
    }
}

impl LayoutEngine for OrbitalLayoutEngine {
    fn layout(&self, artists: &[Artist], config: &LayoutConfig) -> PositionMap {
        into_position_map(self.plan(artists, config))
    }

    fn layout_clustered(
        &self,
        artists: &[Artist],
        clusters: &ClusterIndex,
        config: &LayoutConfig,
    ) -> PositionMap {
        into_position_map(self.plan_with_clusters(artists, clusters, config))
    }
}

fn into_position_map(nodes: Vec<LayoutNode<'_>>) -> PositionMap {
    nodes
        .into_iter()
        .map(|node| (node.artist.id.clone(), node.position))
        .collect()
}

/// Indices of `artists` sorted by importance, most important first. Ties keep input order.
pub fn rank_order(artists: &[Artist]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..artists.len()).collect();
    order.sort_by(|&a, &b| {
        artists[b]
            .importance()
            .total_cmp(&artists[a].importance())
    });
    order
}

/// Body radius for a popularity in `0..=100`.
pub fn body_size(importance: f32, config: &LayoutConfig) -> f32 {
    let ratio = if importance.is_finite() {
        (importance / 100.0).clamp(0.0, 1.0)
    } else {
        0.0
    };
    config.min_body_size + ratio * (config.max_body_size - config.min_body_size)
}

/// Push overlapping pairs apart until no pair is closer than
/// `(size_a + size_b) * min_body_separation`, or the pass budget runs out.
///
/// Each pass sweeps every pair, then re-sweeps the pairs that were near each
/// other at the start of the pass while they keep overlapping. O(n²) per pass.
/// Returns the number of passes that found an overlap.
fn resolve_collisions(nodes: &mut [LayoutNode<'_>], config: &LayoutConfig) -> u32 {
    let separation = config.min_body_separation;
    let mut passes = 0;
    let mut near: Vec<(usize, usize)> = Vec::new();
    for _ in 0..config.collision_iterations {
        near.clear();
        let mut overlapped = false;
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                let reach = 2.0 * (nodes[i].size + nodes[j].size) * separation;
                if nodes[i].position.distance(nodes[j].position) < reach {
                    near.push((i, j));
                }
                overlapped |= separate_pair(nodes, i, j, separation);
            }
        }
        if !overlapped {
            break;
        }
        passes += 1;

        for _ in 0..SETTLE_SWEEPS {
            let mut moved = false;
            for &(i, j) in &near {
                moved |= separate_pair(nodes, i, j, separation);
            }
            if !moved {
                break;
            }
        }
    }
    passes
}

/// Move `i` and `j` apart symmetrically, each by half the remaining overlap.
/// Returns `false` when the pair already clears its minimum distance.
fn separate_pair(nodes: &mut [LayoutNode<'_>], i: usize, j: usize, separation: f32) -> bool {
    let min_distance = (nodes[i].size + nodes[j].size) * separation;
    let offset = nodes[j].position - nodes[i].position;
    let distance = offset.length();
    if distance + COLLISION_TOLERANCE >= min_distance {
        return false;
    }

    let direction = if distance > f32::EPSILON {
        offset / distance
    } else {
        separation_axis(&nodes[i].artist.id, &nodes[j].artist.id)
    };
    let target = min_distance * (1.0 + SEPARATION_SLACK);
    let push = direction * ((target - distance) * 0.5);
    nodes[i].position -= push;
    nodes[j].position += push;
    true
}

/// Unit vector for separating two coincident bodies, seeded by their ids.
fn separation_axis(a: &str, b: &str) -> Vec3 {
    let mut rng = SmallRng::seed_from_u64(pair_seed(a, b));
    let z: f32 = rng.gen_range(-1.0..1.0);
    let angle: f32 = rng.gen_range(0.0..TAU);
    let ring = (1.0 - z * z).max(0.0).sqrt();
    let axis = Vec3::new(ring * angle.cos(), z, ring * angle.sin());
    // Orient so the lexicographically smaller id is always pushed the same way.
    if a <= b {
        axis
    } else {
        -axis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterTieBreak;

    fn artist(id: &str, popularity: f32, genres: &[&str]) -> Artist {
        Artist::new(
            id,
            id.to_uppercase(),
            genres.iter().map(|g| g.to_string()).collect(),
            popularity,
        )
    }

    fn roster(count: usize) -> Vec<Artist> {
        let genres = ["pop", "rock", "jazz", "techno", "folk"];
        (0..count)
            .map(|i| {
                artist(
                    &format!("artist-{i:03}"),
                    100.0 - (i as f32 * 97.0 / count as f32),
                    &[genres[i % genres.len()], genres[(i * 3 + 1) % genres.len()]],
                )
            })
            .collect()
    }

    #[test]
    fn empty_input_yields_empty_map() {
        let map = OrbitalLayoutEngine.layout(&[], &LayoutConfig::default());
        assert!(map.is_empty());
    }

    #[test]
    fn single_artist_sits_on_inner_orbit() {
        let config = LayoutConfig::default();
        let artists = vec![artist("solo", 70.0, &["ambient"])];
        let map = OrbitalLayoutEngine.layout(&artists, &config);
        let position = map.get("solo").unwrap();
        assert!((position.length() - config.inner_radius).abs() < 1e-4);
    }

    #[test]
    fn ranks_follow_popularity() {
        let config = LayoutConfig {
            inner_radius: 8.0,
            outer_radius: 35.0,
            ..LayoutConfig::default()
        };
        let artists = vec![
            artist("quiet", 10.0, &["a"]),
            artist("loud", 90.0, &["b"]),
            artist("mid", 50.0, &["c"]),
        ];
        let nodes = OrbitalLayoutEngine.plan(&artists, &config);
        let ids: Vec<&str> = nodes.iter().map(|n| n.artist.id.as_str()).collect();
        assert_eq!(ids, vec!["loud", "mid", "quiet"]);
        assert_eq!(nodes[0].orbit_radius, 8.0);
        assert!(nodes[0].orbit_radius < nodes[1].orbit_radius);
        assert!(nodes[1].orbit_radius < nodes[2].orbit_radius);
        assert_eq!(nodes[2].orbit_radius, 35.0);
    }

    #[test]
    fn nan_popularity_ranks_last() {
        let artists = vec![artist("broken", f32::NAN, &[]), artist("ok", 1.0, &[])];
        let nodes = OrbitalLayoutEngine.plan(&artists, &LayoutConfig::default());
        assert_eq!(nodes[0].artist.id, "ok");
        assert!(nodes.iter().all(|n| n.position.is_finite()));
    }

    #[test]
    fn repeated_runs_are_bit_identical() {
        let artists = roster(80);
        let config = LayoutConfig::default();
        let first = OrbitalLayoutEngine.layout(&artists, &config);
        let second = OrbitalLayoutEngine.layout(&artists, &config);
        assert_eq!(first, second);
        assert_eq!(first.layout_hash(), second.layout_hash());
        assert_eq!(first.len(), artists.len());
    }

    fn assert_no_overlaps(nodes: &[LayoutNode<'_>], config: &LayoutConfig) {
        for (i, a) in nodes.iter().enumerate() {
            for b in &nodes[i + 1..] {
                let required = (a.size + b.size) * config.min_body_separation;
                let distance = a.position.distance(b.position);
                assert!(
                    distance >= required - 1e-3,
                    "{} and {} overlap: {distance} < {required}",
                    a.artist.id,
                    b.artist.id
                );
            }
        }
    }

    #[test]
    fn relaxation_removes_overlaps() {
        let artists = roster(60);
        let config = LayoutConfig::default();
        let nodes = OrbitalLayoutEngine.plan(&artists, &config);
        assert_no_overlaps(&nodes, &config);
    }

    #[test]
    fn ten_passes_clear_a_full_galaxy() {
        let config = LayoutConfig {
            collision_iterations: 10,
            ..LayoutConfig::default()
        };
        for count in [50, 150, 200] {
            let artists = roster(count);
            let nodes = OrbitalLayoutEngine.plan(&artists, &config);
            assert_eq!(nodes.len(), count);
            assert_no_overlaps(&nodes, &config);
        }

        // Every body at full size is the densest realistic packing.
        let mut crowded = roster(200);
        for artist in &mut crowded {
            artist.popularity = 100.0;
        }
        assert_no_overlaps(&OrbitalLayoutEngine.plan(&crowded, &config), &config);
    }

    #[test]
    fn supplied_cluster_table_is_used_as_given() {
        let artists = roster(40);
        let first_seen = LayoutConfig::default();
        let alphabetical = LayoutConfig {
            cluster_tie_break: ClusterTieBreak::Alphabetical,
            ..LayoutConfig::default()
        };
        let table = GenreClusterAssigner::new(ClusterTieBreak::Alphabetical).index(&artists);

        let supplied = OrbitalLayoutEngine.layout_clustered(&artists, &table, &first_seen);
        assert_eq!(supplied, OrbitalLayoutEngine.layout(&artists, &alphabetical));
    }

    #[test]
    fn coincident_bodies_are_split_deterministically() {
        let config = LayoutConfig {
            inner_radius: 10.0,
            outer_radius: 10.0,
            vertical_compression: 1.0,
            cluster_angular_spread: 0.0,
            ..LayoutConfig::default()
        };
        let artists = vec![artist("a", 50.0, &[]), artist("b", 50.0, &[])];
        let mut nodes: Vec<LayoutNode<'_>> = Vec::new();
        for (rank, a) in artists.iter().enumerate() {
            nodes.push(LayoutNode {
                artist: a,
                cluster_index: 0,
                rank,
                orbit_radius: 10.0,
                size: 1.0,
                position: Vec3::new(10.0, 0.0, 0.0),
            });
        }
        resolve_collisions(&mut nodes, &config);
        let gap = nodes[0].position.distance(nodes[1].position);
        assert!(gap >= 2.0 * config.min_body_separation - 1e-3);

        let axis = separation_axis("a", "b");
        assert!((axis.length() - 1.0).abs() < 1e-4);
        assert_eq!(separation_axis("b", "a"), -axis);
    }

    #[test]
    fn body_size_spans_configured_range() {
        let config = LayoutConfig::default();
        assert_eq!(body_size(0.0, &config), config.min_body_size);
        assert_eq!(body_size(100.0, &config), config.max_body_size);
        assert_eq!(body_size(f32::NAN, &config), config.min_body_size);
    }

    #[test]
    fn records_round_trip_through_position_map() {
        let artists = roster(5);
        let map = OrbitalLayoutEngine.layout(&artists, &LayoutConfig::default());
        let restored = PositionMap::from_records(map.to_records());
        assert_eq!(restored, map);
    }
}
