//! Flat per-slot attribute buffers read by the rendering layer.
//!
//! Buffers are allocated once at the render capacity and rewritten in place
//! every frame. Nothing on the per-frame path allocates.

use bevy::math::Vec3;
use bevy::prelude::Resource;
use galaxy_schema::{AnimationPhase, EvolutionTag};

use crate::dataset::{BodyAttributes, GalaxyDataset};
use crate::phase::FrameState;

/// Small uniform block uploaded alongside the buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameUniforms {
    /// [`AnimationPhase`] code, `0..=3`.
    pub phase: u32,
    pub reveal_progress: f32,
    pub time: f32,
}

#[derive(Resource, Debug, Clone)]
pub struct RenderBuffers {
    capacity: usize,
    active_count: usize,
    positions: Vec<f32>,
    colors: Vec<f32>,
    sizes: Vec<f32>,
    activations: Vec<f32>,
    evolution: Vec<u8>,
    spawn_delays: Vec<f32>,
    uniforms: FrameUniforms,
}

impl RenderBuffers {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            active_count: 0,
            positions: vec![0.0; capacity * 3],
            colors: vec![0.0; capacity * 3],
            sizes: vec![0.0; capacity],
            activations: vec![0.0; capacity],
            evolution: vec![0; capacity],
            spawn_delays: vec![0.0; capacity],
            uniforms: FrameUniforms::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots written by the last frame; everything beyond is zeroed.
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// `x, y, z` per slot.
    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    /// `r, g, b` per slot.
    pub fn colors(&self) -> &[f32] {
        &self.colors
    }

    pub fn sizes(&self) -> &[f32] {
        &self.sizes
    }

    pub fn activations(&self) -> &[f32] {
        &self.activations
    }

    /// [`EvolutionTag`] codes.
    pub fn evolution(&self) -> &[u8] {
        &self.evolution
    }

    pub fn spawn_delays(&self) -> &[f32] {
        &self.spawn_delays
    }

    pub fn uniforms(&self) -> FrameUniforms {
        self.uniforms
    }

    pub fn position(&self, slot: usize) -> Option<Vec3> {
        (slot < self.capacity).then(|| Vec3::from_slice(&self.positions[slot * 3..slot * 3 + 3]))
    }

    pub fn color(&self, slot: usize) -> Option<Vec3> {
        (slot < self.capacity).then(|| Vec3::from_slice(&self.colors[slot * 3..slot * 3 + 3]))
    }

    #[allow(clippy::too_many_arguments)]
    fn write_slot(
        &mut self,
        slot: usize,
        position: Vec3,
        color: Vec3,
        size: f32,
        activation: f32,
        evolution: EvolutionTag,
        spawn_delay: f32,
    ) {
        position.write_to_slice(&mut self.positions[slot * 3..slot * 3 + 3]);
        color.write_to_slice(&mut self.colors[slot * 3..slot * 3 + 3]);
        self.sizes[slot] = size;
        self.activations[slot] = activation;
        self.evolution[slot] = evolution.as_u8();
        self.spawn_delays[slot] = spawn_delay;
    }

    fn write_body(&mut self, slot: usize, body: &BodyAttributes, activation: f32) {
        self.write_slot(
            slot,
            body.position,
            body.color,
            body.size,
            activation,
            body.evolution,
            body.spawn_delay,
        );
    }

    fn clear_range(&mut self, from: usize, to: usize) {
        if from >= to {
            return;
        }
        self.positions[from * 3..to * 3].fill(0.0);
        self.colors[from * 3..to * 3].fill(0.0);
        self.sizes[from..to].fill(0.0);
        self.activations[from..to].fill(0.0);
        self.evolution[from..to].fill(0);
        self.spawn_delays[from..to].fill(0.0);
    }
}

/// Per-body opacity while the spawn stagger plays.
pub fn spawn_opacity(spawn_clock: f32, spawn_delay: f32, spawn_fade: f32) -> f32 {
    let local = spawn_clock - spawn_delay;
    if spawn_fade <= f32::EPSILON {
        return if local >= 0.0 { 1.0 } else { 0.0 };
    }
    (local / spawn_fade).clamp(0.0, 1.0)
}

/// Blends skeleton and target datasets into [`RenderBuffers`] for one frame.
#[derive(Resource, Debug, Default)]
pub struct RenderAttributeBridge {
    truncation_warned: bool,
}

impl RenderAttributeBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(
        &mut self,
        buffers: &mut RenderBuffers,
        skeleton: &GalaxyDataset,
        target: Option<&GalaxyDataset>,
        frame: &FrameState,
    ) {
        let skeleton_bodies = skeleton.bodies();
        let target_bodies = target.map(GalaxyDataset::bodies).unwrap_or(&[]);

        let wanted = match frame.phase {
            AnimationPhase::Skeleton | AnimationPhase::Loading => skeleton_bodies.len(),
            AnimationPhase::Revealing => skeleton_bodies.len().max(target_bodies.len()),
            AnimationPhase::Active => target_bodies.len(),
        };
        let count = wanted.min(buffers.capacity);
        if wanted > count && !self.truncation_warned {
            tracing::warn!(
                target: "galaxy::render",
                wanted,
                capacity = buffers.capacity,
                "render.truncated"
            );
            self.truncation_warned = true;
        }

        match frame.phase {
            AnimationPhase::Skeleton | AnimationPhase::Loading => {
                for (slot, body) in skeleton_bodies.iter().take(count).enumerate() {
                    buffers.write_body(slot, body, 1.0);
                }
            }
            AnimationPhase::Revealing => {
                let eased = frame.eased_progress;
                for slot in 0..count {
                    match (skeleton_bodies.get(slot), target_bodies.get(slot)) {
                        (Some(from), Some(to)) => buffers.write_slot(
                            slot,
                            from.position.lerp(to.position, eased),
                            from.color.lerp(to.color, eased),
                            from.size + (to.size - from.size) * eased,
                            1.0,
                            to.evolution,
                            to.spawn_delay,
                        ),
                        // Grows in from the centre.
                        (None, Some(to)) => buffers.write_slot(
                            slot,
                            to.position * eased,
                            to.color,
                            to.size * eased,
                            1.0,
                            to.evolution,
                            to.spawn_delay,
                        ),
                        (Some(from), None) => buffers.write_body(slot, from, 1.0 - eased),
                        (None, None) => {}
                    }
                }
            }
            AnimationPhase::Active => {
                for (slot, body) in target_bodies.iter().take(count).enumerate() {
                    let opacity = spawn_opacity(frame.spawn_clock, body.spawn_delay, frame.spawn_fade);
                    buffers.write_body(slot, body, opacity);
                }
            }
        }

        let previous = buffers.active_count;
        buffers.clear_range(count, previous);
        buffers.active_count = count;
        buffers.uniforms = FrameUniforms {
            phase: u32::from(frame.phase.as_u8()),
            reveal_progress: frame.reveal_progress,
            time: frame.time,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GalaxyConfig;
    use crate::layout::{LayoutEngine, OrbitalLayoutEngine};
    use galaxy_schema::Artist;

    fn frame(phase: AnimationPhase, progress: f32) -> FrameState {
        FrameState {
            phase,
            reveal_progress: progress,
            eased_progress: crate::phase::ease_out_cubic(progress),
            spawn_clock: 0.0,
            spawn_fade: 0.35,
            time: 1.0,
        }
    }

    fn target(count: usize, config: &GalaxyConfig) -> GalaxyDataset {
        let artists: Vec<Artist> = (0..count)
            .map(|i| Artist::new(format!("t{i}"), "T", vec!["pop".into()], 90.0 - i as f32))
            .collect();
        let positions = OrbitalLayoutEngine.layout(&artists, &config.layout);
        GalaxyDataset::from_layout(&artists, &positions, Vec::new(), config)
    }

    fn small_config(skeleton: usize) -> GalaxyConfig {
        let mut config = GalaxyConfig::default();
        config.skeleton.count = skeleton;
        config.render.max_entities = 8;
        config
    }

    #[test]
    fn skeleton_phase_writes_skeleton() {
        let config = small_config(6);
        let skeleton = GalaxyDataset::skeleton(&config);
        let mut buffers = RenderBuffers::with_capacity(config.render_capacity());
        RenderAttributeBridge::new().write(&mut buffers, &skeleton, None, &frame(AnimationPhase::Skeleton, 0.0));

        assert_eq!(buffers.active_count(), 6);
        assert_eq!(buffers.position(0), Some(skeleton.bodies()[0].position));
        assert!(buffers.activations()[..6].iter().all(|a| *a == 1.0));
        assert_eq!(buffers.uniforms().phase, 0);
    }

    #[test]
    fn reveal_endpoints_match_sources() {
        let config = small_config(4);
        let skeleton = GalaxyDataset::skeleton(&config);
        let target = target(6, &config);
        let mut buffers = RenderBuffers::with_capacity(config.render_capacity());
        let mut bridge = RenderAttributeBridge::new();

        bridge.write(&mut buffers, &skeleton, Some(&target), &frame(AnimationPhase::Revealing, 0.0));
        assert_eq!(buffers.active_count(), 6);
        assert_eq!(buffers.position(1), Some(skeleton.bodies()[1].position));
        // Target-only slot starts collapsed at the centre.
        assert_eq!(buffers.position(5), Some(Vec3::ZERO));
        assert_eq!(buffers.sizes()[5], 0.0);

        bridge.write(&mut buffers, &skeleton, Some(&target), &frame(AnimationPhase::Revealing, 1.0));
        for slot in 0..6 {
            let expected = target.bodies()[slot].position;
            assert!(buffers.position(slot).unwrap().distance(expected) < 1e-4);
        }
        assert_eq!(buffers.uniforms().phase, 2);
    }

    #[test]
    fn shrinking_reveal_fades_extra_skeleton_slots() {
        let config = small_config(7);
        let skeleton = GalaxyDataset::skeleton(&config);
        let target = target(3, &config);
        let mut buffers = RenderBuffers::with_capacity(config.render_capacity());
        RenderAttributeBridge::new().write(
            &mut buffers,
            &skeleton,
            Some(&target),
            &frame(AnimationPhase::Revealing, 0.5),
        );
        let eased = crate::phase::ease_out_cubic(0.5);
        assert!((buffers.activations()[6] - (1.0 - eased)).abs() < 1e-6);
        assert_eq!(buffers.activations()[0], 1.0);
    }

    #[test]
    fn active_phase_staggers_spawn_and_clears_stale_slots() {
        let config = small_config(8);
        let skeleton = GalaxyDataset::skeleton(&config);
        let target = target(3, &config);
        let mut buffers = RenderBuffers::with_capacity(config.render_capacity());
        let mut bridge = RenderAttributeBridge::new();
        bridge.write(&mut buffers, &skeleton, None, &frame(AnimationPhase::Skeleton, 0.0));
        assert_eq!(buffers.active_count(), 8);

        let mut active = frame(AnimationPhase::Active, 1.0);
        active.spawn_clock = 0.0;
        bridge.write(&mut buffers, &skeleton, Some(&target), &active);
        assert_eq!(buffers.active_count(), 3);
        assert!(buffers.sizes()[3..].iter().all(|s| *s == 0.0));
        assert!(buffers.activations()[3..].iter().all(|a| *a == 0.0));

        active.spawn_clock = 10.0;
        bridge.write(&mut buffers, &skeleton, Some(&target), &active);
        assert!(buffers.activations()[..3].iter().all(|a| *a == 1.0));
    }

    #[test]
    fn oversized_dataset_is_truncated_without_growing() {
        let config = small_config(4);
        let skeleton = GalaxyDataset::skeleton(&config);
        let target = target(12, &config);
        let mut buffers = RenderBuffers::with_capacity(config.render_capacity());
        RenderAttributeBridge::new().write(
            &mut buffers,
            &skeleton,
            Some(&target),
            &frame(AnimationPhase::Active, 1.0),
        );
        assert_eq!(buffers.capacity(), 8);
        assert_eq!(buffers.active_count(), 8);
        assert_eq!(buffers.positions().len(), 24);
    }

    #[test]
    fn spawn_opacity_ramp() {
        assert_eq!(spawn_opacity(0.0, 0.5, 0.2), 0.0);
        assert!((spawn_opacity(0.6, 0.5, 0.2) - 0.5).abs() < 1e-5);
        assert_eq!(spawn_opacity(1.0, 0.5, 0.2), 1.0);
        assert_eq!(spawn_opacity(0.5, 0.5, 0.0), 1.0);
    }
}
