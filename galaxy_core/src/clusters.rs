//! Genre clustering.
//!
//! Every genre gets an index by global frequency (most common first). An
//! artist belongs to the cluster of its most common genre, so artists sharing
//! a mainstream genre end up grouped even when their niche tags differ.

use std::collections::HashMap;

use galaxy_schema::Artist;

use crate::config::ClusterTieBreak;

/// Ranked genre table produced by [`GenreClusterAssigner`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterIndex {
    ranked: Vec<(String, usize)>,
    lookup: HashMap<String, usize>,
}

impl ClusterIndex {
    /// Cluster index of a genre, `None` when the genre never appeared.
    pub fn cluster_of(&self, genre: &str) -> Option<usize> {
        self.lookup.get(genre).copied()
    }

    /// Dominant cluster for an artist: the minimum index among its genres,
    /// or 0 when it has none.
    pub fn cluster_for(&self, artist: &Artist) -> usize {
        artist
            .genres
            .iter()
            .filter_map(|genre| self.cluster_of(genre))
            .min()
            .unwrap_or(0)
    }

    /// Number of distinct genres.
    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Genres with their occurrence counts, most frequent first.
    pub fn ranked(&self) -> impl Iterator<Item = (&str, usize)> {
        self.ranked.iter().map(|(genre, count)| (genre.as_str(), *count))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GenreClusterAssigner {
    tie_break: ClusterTieBreak,
}

impl GenreClusterAssigner {
    pub fn new(tie_break: ClusterTieBreak) -> Self {
        Self { tie_break }
    }

    /// Build the genre table without touching the artists.
    pub fn index(&self, artists: &[Artist]) -> ClusterIndex {
        // (count, first-seen order)
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for genre in artists.iter().flat_map(|artist| artist.genres.iter()) {
            let next_order = counts.len();
            counts.entry(genre.as_str()).or_insert((0, next_order)).0 += 1;
        }

        let mut ranked: Vec<(&str, usize, usize)> = counts
            .into_iter()
            .map(|(genre, (count, order))| (genre, count, order))
            .collect();
        match self.tie_break {
            ClusterTieBreak::FirstSeen => {
                ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
            }
            ClusterTieBreak::Alphabetical => {
                ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
            }
        }

        let lookup = ranked
            .iter()
            .enumerate()
            .map(|(index, (genre, _, _))| (genre.to_string(), index))
            .collect();
        ClusterIndex {
            ranked: ranked
                .into_iter()
                .map(|(genre, count, _)| (genre.to_string(), count))
                .collect(),
            lookup,
        }
    }

    /// Write each artist's dominant cluster in place and return the table.
    pub fn assign(&self, artists: &mut [Artist]) -> ClusterIndex {
        let index = self.index(artists);
        for artist in artists.iter_mut() {
            artist.cluster_index = index.cluster_for(artist);
        }
        index
    }
}
