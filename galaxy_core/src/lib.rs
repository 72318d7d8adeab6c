//! Layout-and-reveal engine for the listening-history galaxy.
//!
//! Artists are clustered by genre, placed on orbital shells by popularity and
//! cached per exact id set. A phase controller morphs a placeholder skeleton
//! into the personal galaxy, and the render bridge flattens every frame into
//! preallocated attribute buffers. [`run_frame`] drives one frame of the
//! chained systems configured in [`build_galaxy_app`].

pub mod cache;
pub mod clusters;
pub mod config;
pub mod connections;
pub mod dataset;
pub mod evolution;
pub mod hashing;
pub mod layout;
pub mod metrics;
pub mod phase;
pub mod pipeline;
pub mod render;
pub mod store;
mod systems;

use std::io;
use std::sync::Arc;

use bevy::prelude::*;

pub use cache::{cache_key, CachedLayout, LayoutResult, LayoutStats, PositionCache};
pub use clusters::{ClusterIndex, GenreClusterAssigner};
pub use config::{
    load_galaxy_config_from_env, ClusterTieBreak, EvolutionConfig, GalaxyConfig,
    GalaxyConfigError, GalaxyConfigHandle, LayoutConfig, RenderConfig, RevealConfig,
    SkeletonConfig, BUILTIN_GALAXY_CONFIG,
};
pub use connections::connections;
pub use dataset::{BodyAttributes, GalaxyDataset};
pub use evolution::{detect_evolution, EvolutionDetector};
pub use layout::{LayoutEngine, LayoutNode, OrbitalLayoutEngine, PositionMap};
pub use metrics::GalaxyMetrics;
pub use phase::{ease_out_cubic, DataState, FrameState, PhaseController};
pub use pipeline::{LayoutOutcome, LayoutPipeline, LayoutRequest, LayoutWorker};
pub use render::{FrameUniforms, RenderAttributeBridge, RenderBuffers};
pub use store::{FileStore, KeyValueStore, MemoryStore, SharedStore, StoreError};
pub use systems::{FrameClock, SkeletonDataset, StoreHandle};

/// Construct a Bevy [`App`] running the galaxy frame pipeline.
///
/// The layout worker is not started here; see [`attach_layout_worker`].
pub fn build_galaxy_app(config: Arc<GalaxyConfig>, store: SharedStore) -> App {
    let mut app = App::new();

    let skeleton = Arc::new(GalaxyDataset::skeleton(&config));
    let buffers = RenderBuffers::with_capacity(config.render_capacity());
    let controller = PhaseController::new(config.reveal.clone(), Arc::clone(&store));

    app.insert_resource(GalaxyConfigHandle::new(Arc::clone(&config)))
        .insert_resource(StoreHandle(store))
        .insert_resource(SkeletonDataset(skeleton))
        .insert_resource(FrameClock::default())
        .insert_resource(controller)
        .insert_resource(buffers)
        .insert_resource(RenderAttributeBridge::new())
        .insert_resource(GalaxyMetrics::default())
        .add_plugins(MinimalPlugins)
        .add_systems(
            Update,
            (
                systems::poll_layout_results,
                systems::evaluate_phase,
                systems::write_render_buffers,
                metrics::collect_metrics,
            )
                .chain(),
        );

    app
}

/// [`build_galaxy_app`] with the environment-selected config and an in-memory store.
pub fn build_default_app() -> App {
    let (config, _) = load_galaxy_config_from_env();
    build_galaxy_app(config, MemoryStore::shared())
}

/// Start a background [`LayoutWorker`] sharing the app's config and store.
pub fn attach_layout_worker(app: &mut App) -> io::Result<()> {
    let config = app.world.resource::<GalaxyConfigHandle>().get();
    let store = Arc::clone(&app.world.resource::<StoreHandle>().0);
    let worker = LayoutWorker::spawn(LayoutPipeline::new(config, store))?;
    app.insert_resource(worker);
    Ok(())
}

/// Queue a fetched result set on the worker and mark data as loading.
///
/// Returns `false` when no worker is attached or it has stopped.
pub fn request_layout(app: &mut App, request: LayoutRequest) -> bool {
    let submitted = app
        .world
        .get_resource::<LayoutWorker>()
        .is_some_and(|worker| worker.submit(request));
    if submitted {
        let mut controller = app.world.resource_mut::<PhaseController>();
        if matches!(controller.data_state(), DataState::Absent) {
            controller.notify_data_state(DataState::Loading);
        }
    }
    submitted
}

/// Advance the frame clock by `dt` seconds and run one update.
///
/// Systems run in order: poll layouts → evaluate phase → write buffers → metrics.
pub fn run_frame(app: &mut App, dt: f64) {
    app.world.resource_mut::<FrameClock>().advance(dt);
    app.update();
}
