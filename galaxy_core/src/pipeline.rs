//! From fetched artists to a render-ready dataset, on or off the frame thread.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bevy::prelude::Resource;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use galaxy_schema::Artist;

use crate::cache::{CachedLayout, LayoutStats, PositionCache};
use crate::clusters::GenreClusterAssigner;
use crate::config::GalaxyConfig;
use crate::connections::connections;
use crate::dataset::GalaxyDataset;
use crate::evolution::EvolutionDetector;
use crate::layout::{rank_order, LayoutEngine, OrbitalLayoutEngine, PositionMap};
use crate::store::SharedStore;

/// One fetched result set for a context (usually a [`galaxy_schema::TimeRange`] key).
#[derive(Debug, Clone)]
pub struct LayoutRequest {
    pub context: String,
    pub artists: Vec<Artist>,
}

impl LayoutRequest {
    pub fn new(context: impl Into<String>, artists: Vec<Artist>) -> Self {
        Self {
            context: context.into(),
            artists,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LayoutOutcome {
    pub context: String,
    /// Rank order, clusters and evolution tags applied.
    pub artists: Vec<Artist>,
    pub positions: Arc<PositionMap>,
    pub dataset: Arc<GalaxyDataset>,
    pub cache_hit: bool,
}

pub struct LayoutPipeline<E = OrbitalLayoutEngine> {
    config: Arc<GalaxyConfig>,
    layout: CachedLayout<E>,
    assigner: GenreClusterAssigner,
    evolution: EvolutionDetector,
    /// Last tagged result per context, the baseline for the next diff.
    history: HashMap<String, Vec<Artist>>,
}

impl LayoutPipeline<OrbitalLayoutEngine> {
    pub fn new(config: Arc<GalaxyConfig>, store: SharedStore) -> Self {
        Self::with_engine(OrbitalLayoutEngine, config, store)
    }
}

impl<E: LayoutEngine> LayoutPipeline<E> {
    pub fn with_engine(engine: E, config: Arc<GalaxyConfig>, store: SharedStore) -> Self {
        Self {
            layout: CachedLayout::new(engine, PositionCache::new(store)),
            assigner: GenreClusterAssigner::new(config.layout.cluster_tie_break),
            evolution: EvolutionDetector::new(&config.evolution),
            history: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &GalaxyConfig {
        &self.config
    }

    pub fn stats(&self) -> LayoutStats {
        self.layout.stats()
    }

    pub fn cache(&self) -> &PositionCache {
        self.layout.cache()
    }

    /// Baseline the next request for `context` will be diffed against.
    pub fn previous(&self, context: &str) -> Option<&[Artist]> {
        self.history.get(context).map(Vec::as_slice)
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn compute(&mut self, request: LayoutRequest) -> LayoutOutcome {
        let LayoutRequest {
            context,
            mut artists,
        } = request;

        let clusters = self.assigner.assign(&mut artists);
        let order = rank_order(&artists);
        let mut slots: Vec<Option<Artist>> = artists.into_iter().map(Some).collect();
        let ranked: Vec<Artist> = order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect();

        let layout = self.layout.compute_clustered_layout(
            &context,
            &ranked,
            &clusters,
            &self.config.layout,
        );

        let tagged = self.evolution.diff(ranked, self.previous(&context));
        self.history.insert(context.clone(), tagged.clone());

        let links = connections(&tagged, self.config.layout.min_connection_strength);
        let dataset = Arc::new(GalaxyDataset::from_layout(
            &tagged,
            &layout.positions,
            links,
            &self.config,
        ));

        tracing::info!(
            target: "galaxy::pipeline",
            context = %context,
            artists = tagged.len(),
            connections = dataset.connections().len(),
            cache_hit = layout.cache_hit,
            hash = dataset.layout_hash(),
            "pipeline.computed"
        );

        LayoutOutcome {
            context,
            artists: tagged,
            positions: layout.positions,
            dataset,
            cache_hit: layout.cache_hit,
        }
    }
}

/// Runs a [`LayoutPipeline`] on a background thread. Finished datasets come
/// back as a single `Arc` so the frame thread swaps them in whole.
#[derive(Resource)]
pub struct LayoutWorker {
    requests: Option<Sender<LayoutRequest>>,
    results: Receiver<LayoutOutcome>,
    handle: Option<JoinHandle<()>>,
}

impl LayoutWorker {
    pub fn spawn<E>(mut pipeline: LayoutPipeline<E>) -> io::Result<Self>
    where
        E: LayoutEngine + Send + 'static,
    {
        let (request_tx, request_rx) = unbounded::<LayoutRequest>();
        let (result_tx, result_rx) = unbounded::<LayoutOutcome>();

        let handle = thread::Builder::new()
            .name("galaxy-layout".to_string())
            .spawn(move || {
                for request in request_rx.iter() {
                    let outcome = pipeline.compute(request);
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
                tracing::debug!(target: "galaxy::pipeline", "layout_worker.stopped");
            })?;

        Ok(Self {
            requests: Some(request_tx),
            results: result_rx,
            handle: Some(handle),
        })
    }

    /// Queue a request. Returns `false` if the worker has stopped.
    pub fn submit(&self, request: LayoutRequest) -> bool {
        let Some(requests) = &self.requests else {
            return false;
        };
        match requests.send(request) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    target: "galaxy::pipeline",
                    context = %err.0.context,
                    "layout_worker.submit_failed"
                );
                false
            }
        }
    }

    pub fn try_recv(&self) -> Option<LayoutOutcome> {
        self.results.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<LayoutOutcome> {
        match self.results.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Close the request queue and wait for the in-flight request to finish.
    pub fn shutdown(&mut self) {
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(target: "galaxy::pipeline", "layout_worker.panicked");
            }
        }
    }
}

impl Drop for LayoutWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
