//! Presentation state machine: skeleton → loading → revealing → active.
//!
//! The controller owns every piece of animation state (phase, reveal clock,
//! spawn clock, target dataset). Inputs arrive through the `notify_*`
//! setters and are evaluated immediately; `tick` advances time once per frame.
//! The only backward transition is the return to `Skeleton` on logout.

use std::sync::Arc;

use bevy::prelude::Resource;
use galaxy_schema::AnimationPhase;

use crate::config::RevealConfig;
use crate::dataset::GalaxyDataset;
use crate::store::SharedStore;

/// Durable flag set once a reveal has played to completion.
pub const REVEAL_COMPLETED_KEY: &str = "galaxy.reveal.completed";
/// Durable accessibility preference; any of `1`/`true` enables it.
pub const REDUCED_MOTION_KEY: &str = "galaxy.a11y.reduced_motion";

/// Data-fetch status reported by the host.
#[derive(Debug, Clone, Default)]
pub enum DataState {
    #[default]
    Absent,
    Loading,
    Ready(Arc<GalaxyDataset>),
}

impl DataState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Loading => "loading",
            Self::Ready(_) => "ready",
        }
    }
}

/// `1 - (1 - p)^3`, with `p` clamped to `0..=1`.
pub fn ease_out_cubic(progress: f32) -> f32 {
    let inverse = 1.0 - progress.clamp(0.0, 1.0);
    1.0 - inverse * inverse * inverse
}

/// Snapshot of the controller handed to the render bridge for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    pub phase: AnimationPhase,
    pub reveal_progress: f32,
    pub eased_progress: f32,
    /// Seconds since the active phase began, capped once every body has spawned.
    pub spawn_clock: f32,
    pub spawn_fade: f32,
    pub time: f32,
}

#[derive(Resource)]
pub struct PhaseController {
    config: RevealConfig,
    store: SharedStore,
    phase: AnimationPhase,
    authenticated: bool,
    data: DataState,
    target: Option<Arc<GalaxyDataset>>,
    reduced_motion: bool,
    reveal_progress: f32,
    reveal_started_at: Option<f64>,
    reveal_duration: f32,
    now: f64,
    active_since: Option<f64>,
    spawn_clock: f32,
    transitions: u64,
}

impl PhaseController {
    pub fn new(config: RevealConfig, store: SharedStore) -> Self {
        let reduced_motion = read_flag(&store, REDUCED_MOTION_KEY);
        Self {
            config,
            store,
            phase: AnimationPhase::Skeleton,
            authenticated: false,
            data: DataState::Absent,
            target: None,
            reduced_motion,
            reveal_progress: 0.0,
            reveal_started_at: None,
            reveal_duration: 0.0,
            now: 0.0,
            active_since: None,
            spawn_clock: 0.0,
            transitions: 0,
        }
    }

    pub fn current_phase(&self) -> AnimationPhase {
        self.phase
    }

    pub fn reveal_progress(&self) -> f32 {
        self.reveal_progress
    }

    pub fn eased_progress(&self) -> f32 {
        ease_out_cubic(self.reveal_progress)
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn data_state(&self) -> &DataState {
        &self.data
    }

    pub fn reduced_motion(&self) -> bool {
        self.reduced_motion
    }

    /// Dataset being revealed or shown; `None` until data first becomes ready.
    pub fn target(&self) -> Option<&Arc<GalaxyDataset>> {
        self.target.as_ref()
    }

    /// Duration picked when the current reveal began.
    pub fn reveal_duration(&self) -> f32 {
        self.reveal_duration
    }

    pub fn transition_count(&self) -> u64 {
        self.transitions
    }

    pub fn notify_auth_changed(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
        if !authenticated {
            self.data = DataState::Absent;
        }
        self.evaluate();
    }

    pub fn notify_data_state(&mut self, data: DataState) {
        tracing::debug!(target: "galaxy::phase", state = data.label(), "phase.data_state");
        self.data = data;
        self.evaluate();
    }

    /// Update the accessibility preference and persist it. Turning it on
    /// mid-reveal finishes the reveal at once.
    pub fn set_reduced_motion(&mut self, enabled: bool) {
        self.reduced_motion = enabled;
        let value = if enabled { "1" } else { "0" };
        if let Err(err) = self.store.set(REDUCED_MOTION_KEY, value) {
            tracing::warn!(target: "galaxy::phase", error = %err, "phase.flag_write_failed");
        }
        if enabled {
            match self.phase {
                AnimationPhase::Revealing => self.complete_reveal(),
                AnimationPhase::Active => self.spawn_clock = self.spawn_span(),
                _ => {}
            }
        }
    }

    /// Whether the skip affordance should be offered right now.
    pub fn skip_available(&self) -> bool {
        self.phase == AnimationPhase::Revealing
            && self
                .reveal_started_at
                .is_some_and(|start| self.now - start >= f64::from(self.config.skip_grace))
    }

    /// Force-complete the reveal. Returns `false` (and changes nothing) unless
    /// the skip affordance is currently available.
    pub fn trigger_skip(&mut self) -> bool {
        if !self.skip_available() {
            return false;
        }
        tracing::info!(target: "galaxy::phase", progress = self.reveal_progress, "phase.skipped");
        self.complete_reveal();
        true
    }

    /// Advance the clocks to `now` (seconds, monotonic) and apply transitions.
    pub fn tick(&mut self, now: f64) {
        if now > self.now {
            self.now = now;
        }
        self.evaluate();

        match self.phase {
            AnimationPhase::Revealing => {
                let elapsed = self
                    .reveal_started_at
                    .map_or(0.0, |start| (self.now - start) as f32);
                let progress = if self.reveal_duration > 0.0 {
                    (elapsed / self.reveal_duration).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                self.reveal_progress = self.reveal_progress.max(progress);
                if self.reveal_progress >= 1.0 {
                    self.complete_reveal();
                }
            }
            AnimationPhase::Active => {
                let span = self.spawn_span();
                self.spawn_clock = if self.reduced_motion {
                    span
                } else {
                    self.active_since
                        .map_or(span, |since| ((self.now - since) as f32).clamp(0.0, span))
                };
            }
            AnimationPhase::Skeleton | AnimationPhase::Loading => {}
        }
    }

    pub fn frame_state(&self) -> FrameState {
        FrameState {
            phase: self.phase,
            reveal_progress: self.reveal_progress,
            eased_progress: self.eased_progress(),
            spawn_clock: self.spawn_clock,
            spawn_fade: self.config.spawn_fade.max(0.0),
            time: self.now as f32,
        }
    }

    fn evaluate(&mut self) {
        if !self.authenticated {
            if self.phase != AnimationPhase::Skeleton || self.target.is_some() {
                self.enter_skeleton();
            }
            return;
        }

        let ready = match &self.data {
            DataState::Ready(dataset) => Some(Arc::clone(dataset)),
            _ => None,
        };

        match (self.phase, ready) {
            (AnimationPhase::Skeleton, None) => {
                if matches!(self.data, DataState::Loading) {
                    self.transition(AnimationPhase::Loading);
                }
            }
            (AnimationPhase::Skeleton | AnimationPhase::Loading, Some(dataset)) => {
                self.begin_reveal(dataset);
            }
            (AnimationPhase::Revealing | AnimationPhase::Active, Some(dataset)) => {
                if !self.is_current_target(&dataset) {
                    self.swap_target(dataset);
                }
            }
            _ => {}
        }
    }

    fn is_current_target(&self, dataset: &Arc<GalaxyDataset>) -> bool {
        self.target
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, dataset))
    }

    fn begin_reveal(&mut self, dataset: Arc<GalaxyDataset>) {
        let empty = dataset.is_empty();
        self.target = Some(dataset);
        self.reveal_progress = 0.0;
        self.reveal_started_at = Some(self.now);

        if empty {
            tracing::info!(target: "galaxy::phase", "phase.empty_target");
            self.reveal_duration = 0.0;
            self.reveal_progress = 1.0;
            self.enter_active(false);
            return;
        }
        if self.reduced_motion {
            self.reveal_duration = 0.0;
            self.reveal_progress = 1.0;
            self.enter_active(true);
            return;
        }

        let returning = read_flag(&self.store, REVEAL_COMPLETED_KEY);
        self.reveal_duration = if returning {
            self.config.return_visit_duration
        } else {
            self.config.first_visit_duration
        }
        .max(0.0);
        tracing::info!(
            target: "galaxy::phase",
            returning,
            duration = self.reveal_duration,
            "phase.reveal_started"
        );
        self.transition(AnimationPhase::Revealing);
    }

    fn swap_target(&mut self, dataset: Arc<GalaxyDataset>) {
        tracing::info!(
            target: "galaxy::phase",
            phase = %self.phase,
            bodies = dataset.len(),
            "phase.target_swapped"
        );
        self.target = Some(dataset);
        if self.phase == AnimationPhase::Active {
            self.active_since = Some(self.now);
            self.spawn_clock = if self.reduced_motion {
                self.spawn_span()
            } else {
                0.0
            };
        }
    }

    fn complete_reveal(&mut self) {
        self.reveal_progress = 1.0;
        self.enter_active(true);
    }

    fn enter_active(&mut self, persist_flag: bool) {
        if persist_flag {
            if let Err(err) = self.store.set(REVEAL_COMPLETED_KEY, "1") {
                tracing::warn!(target: "galaxy::phase", error = %err, "phase.flag_write_failed");
            }
        }
        self.active_since = Some(self.now);
        self.spawn_clock = if self.reduced_motion {
            self.spawn_span()
        } else {
            0.0
        };
        self.transition(AnimationPhase::Active);
    }

    fn enter_skeleton(&mut self) {
        self.target = None;
        self.reveal_progress = 0.0;
        self.reveal_started_at = None;
        self.reveal_duration = 0.0;
        self.active_since = None;
        self.spawn_clock = 0.0;
        self.transition(AnimationPhase::Skeleton);
    }

    fn transition(&mut self, next: AnimationPhase) {
        if next == self.phase {
            return;
        }
        tracing::info!(
            target: "galaxy::phase",
            from = %self.phase,
            to = %next,
            at = self.now,
            "phase.transition"
        );
        self.phase = next;
        self.transitions += 1;
    }

    fn spawn_span(&self) -> f32 {
        self.config.spawn_stagger.max(0.0) + self.config.spawn_fade.max(0.0)
    }
}

fn read_flag(store: &SharedStore, key: &str) -> bool {
    match store.get(key) {
        Ok(Some(value)) => matches!(value.trim(), "1" | "true"),
        Ok(None) => false,
        Err(err) => {
            tracing::warn!(target: "galaxy::phase", key, error = %err, "phase.flag_read_failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GalaxyConfig;
    use crate::store::{KeyValueStore, MemoryStore};
    use galaxy_schema::Artist;

    fn small_dataset() -> Arc<GalaxyDataset> {
        let config = GalaxyConfig::default();
        let artists = vec![
            Artist::new("a", "A", vec!["pop".into()], 90.0),
            Artist::new("b", "B", vec!["rock".into()], 40.0),
        ];
        let positions = crate::layout::LayoutEngine::layout(
            &crate::layout::OrbitalLayoutEngine,
            &artists,
            &config.layout,
        );
        Arc::new(GalaxyDataset::from_layout(&artists, &positions, Vec::new(), &config))
    }

    fn controller(store: &SharedStore) -> PhaseController {
        PhaseController::new(RevealConfig::default(), Arc::clone(store))
    }

    #[test]
    fn ease_out_cubic_endpoints() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert_eq!(ease_out_cubic(2.0), 1.0);
        assert!((ease_out_cubic(0.5) - 0.875).abs() < 1e-6);
    }

    #[test]
    fn happy_path_reaches_active_and_persists_flag() {
        let store = MemoryStore::shared();
        let mut phase = controller(&store);
        phase.tick(0.0);
        assert_eq!(phase.current_phase(), AnimationPhase::Skeleton);

        phase.notify_auth_changed(true);
        phase.notify_data_state(DataState::Loading);
        assert_eq!(phase.current_phase(), AnimationPhase::Loading);

        phase.notify_data_state(DataState::Ready(small_dataset()));
        assert_eq!(phase.current_phase(), AnimationPhase::Revealing);
        assert_eq!(phase.reveal_duration(), 2.5);

        let mut last = 0.0;
        let mut t = 0.0;
        while phase.current_phase() == AnimationPhase::Revealing {
            t += 1.0 / 60.0;
            phase.tick(t);
            assert!(phase.reveal_progress() >= last);
            last = phase.reveal_progress();
        }
        assert_eq!(phase.current_phase(), AnimationPhase::Active);
        assert_eq!(phase.reveal_progress(), 1.0);
        assert_eq!(store.get(REVEAL_COMPLETED_KEY).unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn returning_visitor_gets_short_reveal() {
        let store = MemoryStore::shared();
        store.set(REVEAL_COMPLETED_KEY, "1").unwrap();
        let mut phase = controller(&store);
        phase.notify_auth_changed(true);
        phase.notify_data_state(DataState::Ready(small_dataset()));
        assert_eq!(phase.reveal_duration(), 0.4);
        phase.tick(0.41);
        assert_eq!(phase.current_phase(), AnimationPhase::Active);
    }

    #[test]
    fn reduced_motion_skips_reveal_entirely() {
        let store = MemoryStore::shared();
        store.set(REDUCED_MOTION_KEY, "true").unwrap();
        let mut phase = controller(&store);
        assert!(phase.reduced_motion());
        phase.notify_auth_changed(true);
        phase.notify_data_state(DataState::Loading);
        phase.notify_data_state(DataState::Ready(small_dataset()));
        assert_eq!(phase.current_phase(), AnimationPhase::Active);
        assert_eq!(phase.reveal_progress(), 1.0);
        phase.tick(0.016);
        let frame = phase.frame_state();
        assert!(frame.spawn_clock >= 1.2 + 0.35 - 1e-6);
    }

    #[test]
    fn skip_respects_grace_and_is_idempotent() {
        let store = MemoryStore::shared();
        let mut phase = controller(&store);
        phase.notify_auth_changed(true);
        phase.notify_data_state(DataState::Ready(small_dataset()));
        phase.tick(1.0);
        assert!(!phase.skip_available());
        assert!(!phase.trigger_skip());
        assert_eq!(phase.current_phase(), AnimationPhase::Revealing);

        phase.tick(2.1);
        assert!(phase.skip_available());
        assert!(phase.trigger_skip());
        let after_first = (phase.current_phase(), phase.reveal_progress(), phase.transition_count());
        assert!(!phase.trigger_skip());
        let after_second = (phase.current_phase(), phase.reveal_progress(), phase.transition_count());
        assert_eq!(after_first, after_second);
        assert_eq!(after_first.0, AnimationPhase::Active);
    }

    #[test]
    fn logout_mid_reveal_returns_to_skeleton() {
        let store = MemoryStore::shared();
        let mut phase = controller(&store);
        phase.notify_auth_changed(true);
        phase.notify_data_state(DataState::Ready(small_dataset()));
        phase.tick(1.0);
        assert!(phase.reveal_progress() > 0.0);

        phase.notify_auth_changed(false);
        assert_eq!(phase.current_phase(), AnimationPhase::Skeleton);
        assert_eq!(phase.reveal_progress(), 0.0);
        assert!(phase.target().is_none());
        assert!(matches!(phase.data_state(), DataState::Absent));

        // Fresh clock on re-entry.
        phase.notify_auth_changed(true);
        phase.notify_data_state(DataState::Ready(small_dataset()));
        phase.tick(1.5);
        assert_eq!(phase.current_phase(), AnimationPhase::Revealing);
        assert!(phase.reveal_progress() < 0.25);
    }

    #[test]
    fn empty_target_goes_straight_to_active() {
        let store = MemoryStore::shared();
        let mut phase = controller(&store);
        phase.notify_auth_changed(true);
        phase.notify_data_state(DataState::Ready(Arc::new(GalaxyDataset::empty())));
        assert_eq!(phase.current_phase(), AnimationPhase::Active);
        assert_eq!(store.get(REVEAL_COMPLETED_KEY).unwrap(), None);
    }

    #[test]
    fn new_data_while_active_restarts_spawn() {
        let store = MemoryStore::shared();
        let mut phase = controller(&store);
        phase.notify_auth_changed(true);
        phase.notify_data_state(DataState::Ready(small_dataset()));
        phase.tick(3.0);
        phase.tick(10.0);
        assert_eq!(phase.current_phase(), AnimationPhase::Active);
        assert!(phase.frame_state().spawn_clock > 1.0);

        let replacement = small_dataset();
        phase.notify_data_state(DataState::Ready(Arc::clone(&replacement)));
        assert_eq!(phase.current_phase(), AnimationPhase::Active);
        assert!(Arc::ptr_eq(phase.target().unwrap(), &replacement));
        phase.tick(10.1);
        assert!(phase.frame_state().spawn_clock < 0.2);
    }

    #[test]
    fn unauthenticated_inputs_are_ignored() {
        let store = MemoryStore::shared();
        let mut phase = controller(&store);
        phase.notify_data_state(DataState::Ready(small_dataset()));
        assert_eq!(phase.current_phase(), AnimationPhase::Skeleton);
        assert!(!phase.trigger_skip());
    }
}
