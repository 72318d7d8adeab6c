//! Position cache keyed by (context, exact artist-id set, placement config).
//!
//! A stored layout is reused only when the requested id set matches the stored
//! one exactly, the layout parameters hash the same, and the entry was written
//! by the current format version. Any other outcome (mismatch, corrupt JSON,
//! backend failure) is a miss and the caller recomputes. Each context holds at
//! most one layout: writing a new one drops its predecessor.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use galaxy_schema::{Artist, CacheEntry, LAYOUT_FORMAT_VERSION};

use crate::config::LayoutConfig;
use crate::clusters::ClusterIndex;
use crate::hashing::fingerprint_ids;
use crate::layout::{LayoutEngine, OrbitalLayoutEngine, PositionMap};
use crate::store::SharedStore;

pub const CACHE_KEY_PREFIX: &str = "galaxy.positions";
const CACHE_INDEX_KEY: &str = "galaxy.positions.index";

/// Sort and deduplicate ids so that set-equal requests compare equal.
pub fn sorted_ids<'a, I>(ids: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut ids: Vec<&str> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Storage key for a context, a sorted id set and the layout parameters:
/// `prefix:context:count:ids:placement`.
pub fn cache_key(context: &str, sorted_ids: &[&str], config: &LayoutConfig) -> String {
    format!(
        "{CACHE_KEY_PREFIX}:{context}:{}:{:016x}:{:016x}",
        sorted_ids.len(),
        fingerprint_ids(sorted_ids),
        config.placement_fingerprint()
    )
}

/// Context segment of a key built by [`cache_key`]. Contexts may contain `:`,
/// so the fixed-width tail is split off from the right.
fn key_context(key: &str) -> Option<&str> {
    let rest = key.strip_prefix(CACHE_KEY_PREFIX)?.strip_prefix(':')?;
    let mut parts = rest.rsplitn(4, ':');
    let _placement = parts.next()?;
    let _ids = parts.next()?;
    let _count = parts.next()?;
    parts.next()
}

#[derive(Clone)]
pub struct PositionCache {
    store: SharedStore,
    format_version: u32,
}

impl PositionCache {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            format_version: LAYOUT_FORMAT_VERSION,
        }
    }

    pub fn with_format_version(mut self, format_version: u32) -> Self {
        self.format_version = format_version;
        self
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn get<'a, I>(
        &self,
        context: &str,
        ids: I,
        config: &LayoutConfig,
    ) -> Option<Arc<PositionMap>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let ids = sorted_ids(ids);
        let key = cache_key(context, &ids, config);

        let raw = match self.store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(target: "galaxy::cache", %key, "position_cache.miss");
                return None;
            }
            Err(err) => {
                tracing::warn!(target: "galaxy::cache", %key, error = %err, "position_cache.read_failed");
                return None;
            }
        };

        let entry = match CacheEntry::from_json(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(target: "galaxy::cache", %key, error = %err, "position_cache.corrupt");
                self.evict(&key);
                return None;
            }
        };

        if entry.format_version != self.format_version {
            tracing::debug!(
                target: "galaxy::cache",
                %key,
                stored = entry.format_version,
                current = self.format_version,
                "position_cache.version_mismatch"
            );
            self.evict(&key);
            return None;
        }

        let stored = sorted_ids(entry.entity_ids.iter().map(String::as_str));
        if stored != ids {
            tracing::debug!(
                target: "galaxy::cache",
                %key,
                stored = stored.len(),
                requested = ids.len(),
                "position_cache.id_set_mismatch"
            );
            self.evict(&key);
            return None;
        }

        let positions = PositionMap::from_records(entry.positions);
        if positions.len() != ids.len() || !ids.iter().all(|id| positions.contains(id)) {
            tracing::warn!(target: "galaxy::cache", %key, "position_cache.incomplete");
            self.evict(&key);
            return None;
        }

        tracing::debug!(target: "galaxy::cache", %key, "position_cache.hit");
        Some(Arc::new(positions))
    }

    /// Persist a layout as the only entry for `context`. Failures are logged
    /// and otherwise ignored.
    pub fn put<'a, I>(
        &self,
        context: &str,
        ids: I,
        config: &LayoutConfig,
        positions: &PositionMap,
    ) where
        I: IntoIterator<Item = &'a str>,
    {
        let ids = sorted_ids(ids);
        let key = cache_key(context, &ids, config);
        let entry = CacheEntry {
            format_version: self.format_version,
            created_at: now_millis(),
            entity_ids: ids.iter().map(|id| id.to_string()).collect(),
            positions: positions.to_records(),
        };

        let json = match entry.to_json() {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(target: "galaxy::cache", %key, error = %err, "position_cache.encode_failed");
                return;
            }
        };
        if let Err(err) = self.store.set(&key, &json) {
            tracing::warn!(target: "galaxy::cache", %key, error = %err, "position_cache.write_failed");
            return;
        }

        let mut index = self.read_index();
        let before = index.len();
        index.retain(|existing| {
            if existing == &key || key_context(existing) != Some(context) {
                return true;
            }
            match self.store.remove(existing) {
                Ok(()) => {
                    tracing::debug!(target: "galaxy::cache", key = %existing, "position_cache.replaced");
                    false
                }
                Err(err) => {
                    tracing::warn!(target: "galaxy::cache", key = %existing, error = %err, "position_cache.remove_failed");
                    true
                }
            }
        });
        let replaced = before - index.len();
        if !index.contains(&key) {
            index.push(key.clone());
            self.write_index(&index);
        } else if replaced > 0 {
            self.write_index(&index);
        }
        tracing::debug!(
            target: "galaxy::cache",
            %key,
            bodies = positions.len(),
            replaced,
            "position_cache.stored"
        );
    }

    /// Remove every entry this cache has written.
    pub fn clear_all(&self) {
        let index = self.read_index();
        for key in &index {
            if let Err(err) = self.store.remove(key) {
                tracing::warn!(target: "galaxy::cache", %key, error = %err, "position_cache.remove_failed");
            }
        }
        if let Err(err) = self.store.remove(CACHE_INDEX_KEY) {
            tracing::warn!(target: "galaxy::cache", error = %err, "position_cache.remove_failed");
        }
        tracing::info!(target: "galaxy::cache", cleared = index.len(), "position_cache.cleared");
    }

    fn evict(&self, key: &str) {
        if let Err(err) = self.store.remove(key) {
            tracing::warn!(target: "galaxy::cache", %key, error = %err, "position_cache.remove_failed");
        }
        let mut index = self.read_index();
        let before = index.len();
        index.retain(|existing| existing != key);
        if index.len() != before {
            self.write_index(&index);
        }
    }

    fn read_index(&self) -> Vec<String> {
        match self.store.get(CACHE_INDEX_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!(target: "galaxy::cache", error = %err, "position_cache.index_read_failed");
                Vec::new()
            }
        }
    }

    fn write_index(&self, index: &[String]) {
        let result = serde_json::to_string(index)
            .map_err(|err| err.to_string())
            .and_then(|json| {
                self.store
                    .set(CACHE_INDEX_KEY, &json)
                    .map_err(|err| err.to_string())
            });
        if let Err(error) = result {
            tracing::warn!(target: "galaxy::cache", %error, "position_cache.index_write_failed");
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Hit/miss counters for a [`CachedLayout`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutStats {
    pub hits: u64,
    pub misses: u64,
}

/// Result of a cache-checked layout.
#[derive(Debug, Clone)]
pub struct LayoutResult {
    pub positions: Arc<PositionMap>,
    pub cache_hit: bool,
}

/// A layout engine behind the position cache: look up first, compute and
/// write through on a miss.
pub struct CachedLayout<E = OrbitalLayoutEngine> {
    engine: E,
    cache: PositionCache,
    stats: LayoutStats,
}

impl<E: LayoutEngine> CachedLayout<E> {
    pub fn new(engine: E, cache: PositionCache) -> Self {
        Self {
            engine,
            cache,
            stats: LayoutStats::default(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn cache(&self) -> &PositionCache {
        &self.cache
    }

    pub fn stats(&self) -> LayoutStats {
        self.stats
    }

    pub fn compute_layout(
        &mut self,
        context: &str,
        artists: &[Artist],
        config: &LayoutConfig,
    ) -> LayoutResult {
        self.compute_with(context, artists, config, |engine| engine.layout(artists, config))
    }

    /// [`Self::compute_layout`] for artists already run through the cluster
    /// assigner, so the engine can reuse `clusters` instead of rebuilding it.
    pub fn compute_clustered_layout(
        &mut self,
        context: &str,
        artists: &[Artist],
        clusters: &ClusterIndex,
        config: &LayoutConfig,
    ) -> LayoutResult {
        self.compute_with(context, artists, config, |engine| {
            engine.layout_clustered(artists, clusters, config)
        })
    }

    fn compute_with<F>(
        &mut self,
        context: &str,
        artists: &[Artist],
        config: &LayoutConfig,
        run: F,
    ) -> LayoutResult
    where
        F: FnOnce(&E) -> PositionMap,
    {
        if artists.is_empty() {
            return LayoutResult {
                positions: Arc::new(PositionMap::new()),
                cache_hit: false,
            };
        }

        let ids = artists.iter().map(|artist| artist.id.as_str());
        if let Some(positions) = self.cache.get(context, ids.clone(), config) {
            self.stats.hits += 1;
            return LayoutResult {
                positions,
                cache_hit: true,
            };
        }

        self.stats.misses += 1;
        let positions = run(&self.engine);
        tracing::info!(
            target: "galaxy::layout",
            context,
            bodies = positions.len(),
            hash = positions.layout_hash(),
            "layout.computed"
        );
        self.cache.put(context, ids, config, &positions);
        LayoutResult {
            positions: Arc::new(positions),
            cache_hit: false,
        }
    }
}
