//! Genre-overlap links between artists. Cheap enough to recompute per run.

use std::collections::HashSet;

use galaxy_schema::{Artist, Connection};

/// Jaccard overlap of two genre lists; 0 when either is empty.
pub fn genre_overlap(a: &[String], b: &[String]) -> f32 {
    let left: HashSet<&str> = a.iter().map(String::as_str).collect();
    let right: HashSet<&str> = b.iter().map(String::as_str).collect();
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count();
    let union = left.len() + right.len() - shared;
    shared as f32 / union as f32
}

/// Every pair whose overlap reaches `min_strength`, in input order.
///
/// Callers pass artists in rank order so the result is ordered by
/// (source rank, target rank).
pub fn connections(artists: &[Artist], min_strength: f32) -> Vec<Connection> {
    let threshold = if min_strength.is_finite() {
        min_strength.max(f32::MIN_POSITIVE)
    } else {
        f32::MIN_POSITIVE
    };

    let mut links = Vec::new();
    for (i, source) in artists.iter().enumerate() {
        for target in &artists[i + 1..] {
            let strength = genre_overlap(&source.genres, &target.genres);
            if strength >= threshold {
                links.push(Connection {
                    source_id: source.id.clone(),
                    target_id: target.id.clone(),
                    strength,
                });
            }
        }
    }
    links
}
