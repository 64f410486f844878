use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::common::SignToken;

use super::{Effect, EffectContext, EffectInstance, Surface};

/// Owns every effect instance and decides which ones run each frame:
/// at most one active effect plus any number of passive ones.
#[derive(Default)]
pub struct EffectOrchestrator {
    registry: IndexMap<String, EffectInstance>,
    active: Option<String>,
    passive: HashSet<String>,
    /// Non-passive effects started as passive sub-effects for the current run.
    triggered: HashSet<String>,
    skipped: HashSet<String>,
}

impl EffectOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, effect: EffectInstance) {
        self.registry.insert(name.into(), effect);
    }

    /// Passive effects are updated and rendered every frame.
    pub fn register_passive(&mut self, name: impl Into<String>, effect: EffectInstance) {
        let name = name.into();
        self.passive.insert(name.clone());
        self.registry.insert(name, effect);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    pub fn is_passive(&self, name: &str) -> bool {
        self.passive.contains(name)
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn effect(&self, name: &str) -> Option<&EffectInstance> {
        self.registry.get(name)
    }

    /// Ends any different active effect and starts `name`. Returns false when
    /// nothing is registered under `name`.
    pub fn start_active(&mut self, name: &str, ctx: &EffectContext<'_>) -> bool {
        if !self.registry.contains_key(name) {
            debug!("No effect registered for {}", name);
            return false;
        }
        if self.active.as_deref().is_some_and(|current| current != name) {
            self.end_active(ctx);
        }
        self.active = Some(name.to_string());
        if let Some(effect) = self.registry.get_mut(name) {
            effect.on_start(ctx);
        }
        true
    }

    pub fn end_active(&mut self, ctx: &EffectContext<'_>) {
        if let Some(name) = self.active.take() {
            if let Some(effect) = self.registry.get_mut(&name) {
                effect.on_end(ctx);
            }
        }
    }

    /// (Re)starts `name` as a passive effect without touching the active one.
    /// An effect registered with `register` runs as passive until
    /// `end_passive` or `reset`.
    pub fn trigger_passive(&mut self, name: &str, ctx: &EffectContext<'_>) -> bool {
        let Some(effect) = self.registry.get_mut(name) else {
            debug!("No effect registered for {}", name);
            return false;
        };
        if !self.passive.contains(name) {
            self.triggered.insert(name.to_string());
        }
        effect.on_start(ctx);
        true
    }

    pub fn end_passive(&mut self, name: &str, ctx: &EffectContext<'_>) {
        let triggered = self.triggered.remove(name);
        if !triggered && !self.passive.contains(name) {
            return;
        }
        if self.active.as_deref() == Some(name) {
            return;
        }
        if let Some(effect) = self.registry.get_mut(name) {
            effect.on_end(ctx);
        }
    }

    fn runs_passive(&self, name: &str) -> bool {
        self.passive.contains(name) || self.triggered.contains(name)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.active.as_deref() == Some(name) || self.runs_passive(name)
    }

    pub fn update(&mut self, ctx: &EffectContext<'_>, dt: f64) {
        self.skipped.clear();
        let running: Vec<String> = self
            .registry
            .keys()
            .filter(|name| self.is_running(name))
            .cloned()
            .collect();
        for name in running {
            let Some(effect) = self.registry.get_mut(&name) else {
                continue;
            };
            if let Err(e) = effect.on_update(ctx, dt) {
                warn!("Skipping effect {} this frame: {}", name, e);
                self.skipped.insert(name);
            }
        }
    }

    /// Renders in registration order.
    pub fn render(&mut self, ctx: &EffectContext<'_>, surface: &mut Surface) {
        let running: Vec<String> = self
            .registry
            .keys()
            .filter(|name| self.is_running(name) && !self.skipped.contains(*name))
            .cloned()
            .collect();
        for name in running {
            let Some(effect) = self.registry.get_mut(&name) else {
                continue;
            };
            if let Err(e) = effect.on_render(ctx, surface) {
                warn!("Effect {} failed to render: {}", name, e);
            }
        }
    }

    /// Raw sign events reach passive effects only.
    pub fn broadcast_sign_detected(&mut self, label: &SignToken, ctx: &EffectContext<'_>) {
        for (name, effect) in self.registry.iter_mut() {
            if self.passive.contains(name) || self.triggered.contains(name) {
                effect.on_sign_detected(label, ctx);
            }
        }
    }

    /// Ends the active effect and clears passive runtime state; the registry
    /// is kept.
    pub fn reset(&mut self, ctx: &EffectContext<'_>) {
        let ended = self.active.clone();
        self.end_active(ctx);
        for (name, effect) in self.registry.iter_mut() {
            let passive = self.passive.contains(name) || self.triggered.contains(name);
            if passive && ended.as_deref() != Some(name.as_str()) {
                effect.on_end(ctx);
            }
        }
        self.triggered.clear();
        self.skipped.clear();
    }
}
