//! Rank movement between two successive result sets.

use std::collections::HashMap;

use galaxy_schema::{Artist, EvolutionTag};

use crate::config::EvolutionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvolutionDetector {
    rising_threshold: i32,
    falling_threshold: i32,
}

impl Default for EvolutionDetector {
    fn default() -> Self {
        Self::new(&EvolutionConfig::default())
    }
}

impl EvolutionDetector {
    pub fn new(config: &EvolutionConfig) -> Self {
        Self::with_thresholds(config.rising_threshold, config.falling_threshold)
    }

    /// Both thresholds are rank distances and are taken as absolute values.
    pub fn with_thresholds(rising: i32, falling: i32) -> Self {
        Self {
            rising_threshold: rising.abs(),
            falling_threshold: falling.abs(),
        }
    }

    /// Tag every artist in `current` by its movement relative to `previous`.
    ///
    /// Positions in each slice are ranks. With no previous set the input is
    /// returned untouched; a first observation has nothing to compare against.
    /// Artists that dropped out of `current` are not reported.
    pub fn diff(&self, mut current: Vec<Artist>, previous: Option<&[Artist]>) -> Vec<Artist> {
        let Some(previous) = previous else {
            return current;
        };

        let previous_rank: HashMap<&str, usize> = previous
            .iter()
            .enumerate()
            .map(|(rank, artist)| (artist.id.as_str(), rank))
            .collect();

        let mut counts = [0usize; 4];
        for (rank, artist) in current.iter_mut().enumerate() {
            let tag = match previous_rank.get(artist.id.as_str()) {
                None => EvolutionTag::New,
                Some(&before) => self.classify(before as i64 - rank as i64),
            };
            artist.evolution = tag;
            counts[tag.as_u8() as usize] += 1;
        }

        tracing::debug!(
            target: "galaxy::pipeline",
            stable = counts[0],
            new = counts[1],
            rising = counts[2],
            falling = counts[3],
            "evolution.diffed"
        );
        current
    }

    /// Positive `delta` means the artist moved toward rank 0.
    pub fn classify(&self, delta: i64) -> EvolutionTag {
        if delta >= self.rising_threshold as i64 {
            EvolutionTag::Rising
        } else if delta <= -(self.falling_threshold as i64) {
            EvolutionTag::Falling
        } else {
            EvolutionTag::Stable
        }
    }
}

/// [`EvolutionDetector::diff`] with thresholds from `config`.
pub fn detect_evolution(
    current: Vec<Artist>,
    previous: Option<&[Artist]>,
    config: &EvolutionConfig,
) -> Vec<Artist> {
    EvolutionDetector::new(config).diff(current, previous)
}
