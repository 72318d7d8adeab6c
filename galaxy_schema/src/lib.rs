//! Data contracts shared by the galaxy engine, its tests and its tools.
//!
//! Everything in this crate is plain serde data. Engine behaviour lives in
//! `galaxy_core`; this crate only defines shapes that cross a boundary
//! (fetched artists, persisted cache entries, render-facing tags).

use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::str::FromStr;

/// Version stamped into every persisted [`CacheEntry`]. Entries written by a
/// different version are treated as misses.
pub const LAYOUT_FORMAT_VERSION: u32 = 3;

/// World-space position as stored on disk and uploaded to the GPU.
pub type Position = [f32; 3];

/// An artist from the listening history, positioned as one body in the galaxy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    /// Popularity in `0..=100`.
    #[serde(default)]
    pub popularity: f32,
    /// Dominant genre cluster, derived by the cluster assigner.
    #[serde(default)]
    pub cluster_index: usize,
    #[serde(default)]
    pub evolution: EvolutionTag,
}

impl Artist {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        genres: Vec<String>,
        popularity: f32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            genres,
            popularity,
            cluster_index: 0,
            evolution: EvolutionTag::Stable,
        }
    }

    /// Popularity clamped to `0..=100`; non-finite values count as zero.
    pub fn importance(&self) -> f32 {
        if self.popularity.is_finite() {
            self.popularity.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }
}

/// Rank movement of an artist between two successive result sets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvolutionTag {
    #[default]
    Stable = 0,
    New = 1,
    Rising = 2,
    Falling = 3,
}

impl EvolutionTag {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a buffer value, defaulting to `Stable` for unknown codes.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::New,
            2 => Self::Rising,
            3 => Self::Falling,
            _ => Self::Stable,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::New => "new",
            Self::Rising => "rising",
            Self::Falling => "falling",
        }
    }
}

impl fmt::Display for EvolutionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presentation phase of the galaxy scene. The numeric value is the `phase`
/// uniform consumed by the shaders.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationPhase {
    #[default]
    Skeleton = 0,
    Loading = 1,
    Revealing = 2,
    Active = 3,
}

impl AnimationPhase {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Loading,
            2 => Self::Revealing,
            3 => Self::Active,
            _ => Self::Skeleton,
        }
    }
}

impl fmt::Display for AnimationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Skeleton => "skeleton",
            Self::Loading => "loading",
            Self::Revealing => "revealing",
            Self::Active => "active",
        };
        f.write_str(label)
    }
}

/// Listening-history window. Each window lays out independently and owns its
/// own cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    ShortTerm,
    #[default]
    MediumTerm,
    LongTerm,
}

impl TimeRange {
    pub const ALL: [TimeRange; 3] = [Self::ShortTerm, Self::MediumTerm, Self::LongTerm];

    pub fn as_key(self) -> &'static str {
        match self {
            Self::ShortTerm => "short_term",
            Self::MediumTerm => "medium_term",
            Self::LongTerm => "long_term",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|range| range.as_key() == value)
            .ok_or_else(|| format!("unknown time range '{value}'"))
    }
}

/// Genre-overlap link between two artists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source_id: String,
    pub target_id: String,
    /// Overlap ratio in `0..=1`.
    pub strength: f32,
}

/// Persisted layout for one exact artist-id set.
///
/// Serialized as
/// `{formatVersion, createdAt, entityIds, positions: [[id, [x, y, z]], ...]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub format_version: u32,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub entity_ids: Vec<String>,
    pub positions: Vec<(String, Position)>,
}

impl CacheEntry {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Order-sensitive hash of a position list, stable across runs.
///
/// Callers pass positions sorted by id so that equal layouts hash equally.
pub fn hash_positions<'a, I>(positions: I) -> u64
where
    I: IntoIterator<Item = (&'a str, Position)>,
{
    let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
    for (id, position) in positions {
        hasher.write(id.as_bytes());
        hasher.write_u8(0x1f);
        for component in position {
            hasher.write_u32(component.to_bits());
        }
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importance_clamps_non_finite_and_out_of_range() {
        let mut artist = Artist::new("a", "A", Vec::new(), f32::NAN);
        assert_eq!(artist.importance(), 0.0);
        artist.popularity = 140.0;
        assert_eq!(artist.importance(), 100.0);
        artist.popularity = -3.0;
        assert_eq!(artist.importance(), 0.0);
        artist.popularity = 42.5;
        assert_eq!(artist.importance(), 42.5);
    }

    #[test]
    fn tag_codes_match_buffer_contract() {
        for tag in [
            EvolutionTag::Stable,
            EvolutionTag::New,
            EvolutionTag::Rising,
            EvolutionTag::Falling,
        ] {
            assert_eq!(EvolutionTag::from_u8(tag.as_u8()), tag);
        }
        assert_eq!(EvolutionTag::from_u8(200), EvolutionTag::Stable);
        assert_eq!(AnimationPhase::Active.as_u8(), 3);
        assert_eq!(AnimationPhase::from_u8(9), AnimationPhase::Skeleton);
    }

    #[test]
    fn time_range_keys_parse_back() {
        for range in TimeRange::ALL {
            assert_eq!(range.as_key().parse::<TimeRange>(), Ok(range));
        }
        assert!("forever".parse::<TimeRange>().is_err());
    }

    #[test]
    fn cache_entry_wire_shape() {
        let entry = CacheEntry {
            format_version: 3,
            created_at: 1_700_000_000_000,
            entity_ids: vec!["a".to_string(), "b".to_string()],
            positions: vec![
                ("a".to_string(), [1.0, 2.5, -3.0]),
                ("b".to_string(), [0.0, 0.0, 0.0]),
            ],
        };
        let json = entry.to_json().unwrap();
        insta::assert_snapshot!(json, @r#"{"formatVersion":3,"createdAt":1700000000000,"entityIds":["a","b"],"positions":[["a",[1.0,2.5,-3.0]],["b",[0.0,0.0,0.0]]]}"#);
        assert_eq!(CacheEntry::from_json(&json).unwrap(), entry);
    }

    #[test]
    fn artist_defaults_missing_fields() {
        let artist: Artist = serde_json::from_str(r#"{"id":"x","name":"X"}"#).unwrap();
        assert!(artist.genres.is_empty());
        assert_eq!(artist.popularity, 0.0);
        assert_eq!(artist.evolution, EvolutionTag::Stable);
    }

    #[test]
    fn position_hash_depends_on_values() {
        let a = hash_positions([("a", [1.0, 2.0, 3.0])]);
        let b = hash_positions([("a", [1.0, 2.0, 3.0])]);
        let c = hash_positions([("a", [1.0, 2.0, 3.5])]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
