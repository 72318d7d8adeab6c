use std::sync::Arc;

use bevy::prelude::*;

use crate::dataset::GalaxyDataset;
use crate::metrics::GalaxyMetrics;
use crate::phase::{DataState, PhaseController};
use crate::pipeline::LayoutWorker;
use crate::render::{RenderAttributeBridge, RenderBuffers};
use crate::store::SharedStore;

/// Monotonic frame time in seconds, advanced by [`crate::run_frame`].
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct FrameClock {
    pub now: f64,
    pub frame: u64,
}

impl FrameClock {
    pub fn advance(&mut self, dt: f64) {
        if dt.is_finite() && dt > 0.0 {
            self.now += dt;
        }
        self.frame += 1;
    }
}

/// Placeholder dataset, built once from the skeleton config.
#[derive(Resource, Debug, Clone)]
pub struct SkeletonDataset(pub Arc<GalaxyDataset>);

/// Durable store shared with late-attached components such as the layout worker.
#[derive(Resource, Clone)]
pub struct StoreHandle(pub SharedStore);

/// Drain finished layouts and hand the newest one to the controller.
pub fn poll_layout_results(
    worker: Option<Res<LayoutWorker>>,
    mut controller: ResMut<PhaseController>,
    mut metrics: ResMut<GalaxyMetrics>,
) {
    let Some(worker) = worker else {
        return;
    };

    let mut latest = None;
    while let Some(outcome) = worker.try_recv() {
        metrics.record_layout(outcome.cache_hit, outcome.dataset.layout_hash());
        latest = Some(outcome);
    }
    if let Some(outcome) = latest {
        controller.notify_data_state(DataState::Ready(outcome.dataset));
    }
}

pub fn evaluate_phase(clock: Res<FrameClock>, mut controller: ResMut<PhaseController>) {
    controller.tick(clock.now);
}

pub fn write_render_buffers(
    controller: Res<PhaseController>,
    skeleton: Res<SkeletonDataset>,
    mut bridge: ResMut<RenderAttributeBridge>,
    mut buffers: ResMut<RenderBuffers>,
) {
    let frame = controller.frame_state();
    let target = controller.target().map(|dataset| dataset.as_ref());
    bridge.write(&mut buffers, &skeleton.0, target, &frame);
}
