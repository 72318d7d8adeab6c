use bevy::prelude::*;
use galaxy_schema::AnimationPhase;

use crate::{phase::PhaseController, render::RenderBuffers};

#[derive(Resource, Default, Debug, Clone)]
pub struct GalaxyMetrics {
    pub frames: u64,
    pub phase: AnimationPhase,
    pub reveal_progress: f32,
    pub active_slots: usize,
    pub phase_transitions: u64,
    pub layouts_received: u64,
    pub layout_cache_hits: u64,
    pub layout_cache_misses: u64,
    pub last_layout_hash: u64,
}

impl GalaxyMetrics {
    pub fn record_layout(&mut self, cache_hit: bool, layout_hash: u64) {
        self.layouts_received += 1;
        if cache_hit {
            self.layout_cache_hits += 1;
        } else {
            self.layout_cache_misses += 1;
        }
        self.last_layout_hash = layout_hash;
    }
}

pub fn collect_metrics(
    controller: Res<PhaseController>,
    buffers: Res<RenderBuffers>,
    mut metrics: ResMut<GalaxyMetrics>,
) {
    metrics.frames += 1;
    metrics.phase = controller.current_phase();
    metrics.reveal_progress = controller.reveal_progress();
    metrics.active_slots = buffers.active_count();
    metrics.phase_transitions = controller.transition_count();
}
