use image::RgbImage;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    catalog::{JutsuCatalog, JutsuDefinition},
    challenge::{ChallengeRun, ChallengeState, Submission},
    common::SignToken,
    config::{ChallengeConfig, GhostCloneConfig, SequenceConfig, Settings},
    detection::{Classification, Landmarks},
    effects::{
        Anchors, EffectContext, EffectInstance, EffectOrchestrator, EyeEffect, FireEffect,
        GhostCloneEffect, RasenganEffect, Segmenter, Surface, TintEffect,
    },
    error::{CatalogError, SegmentationError},
    sequence::{AcceptOutcome, ComboResolver, SequenceProgress, SequenceTracker},
};

/// Something that happened during a tick, reported to the front-end.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SignAccepted {
        sign: SignToken,
        step: usize,
        total: usize,
    },
    ComboTriggered {
        part: String,
        effect: String,
    },
    JutsuCompleted {
        jutsu: String,
        effect: String,
    },
    EffectEnded {
        jutsu: String,
    },
    JutsuSelected {
        jutsu: String,
    },
    CountdownStarted,
    RunStarted {
        run_start: f64,
    },
    RunFinished {
        final_time: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceSummary {
    pub jutsu: String,
    pub step: usize,
    pub total: usize,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    FreePlay,
    Challenge,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub sequence: SequenceConfig,
    pub ghost_clone: GhostCloneConfig,
    pub challenge: ChallengeConfig,
    pub player_level: u32,
    pub initial_jutsu: Option<String>,
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            sequence: settings.sequence.clone(),
            ghost_clone: settings.ghost_clone.clone(),
            challenge: settings.challenge.clone(),
            player_level: settings.local.player_level,
            initial_jutsu: settings.local.initial_jutsu.clone(),
        }
    }

    pub fn with_initial_jutsu(mut self, jutsu: impl Into<String>) -> Self {
        self.initial_jutsu = Some(jutsu.into());
        self
    }

    pub fn with_player_level(mut self, level: u32) -> Self {
        self.player_level = level;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

fn default_effects(
    ghost_clone: GhostCloneConfig,
    segmenter: Result<Box<dyn Segmenter>, SegmentationError>,
) -> EffectOrchestrator {
    let mut orchestrator = EffectOrchestrator::new();
    orchestrator.register_passive(
        "clone",
        EffectInstance::GhostClone(GhostCloneEffect::new(ghost_clone, segmenter)),
    );
    orchestrator.register("fire", EffectInstance::Fire(FireEffect::new()));
    orchestrator.register("lightning", EffectInstance::Lightning(TintEffect::lightning()));
    orchestrator.register("rasengan", EffectInstance::Rasengan(RasenganEffect::new()));
    orchestrator.register("eye", EffectInstance::Eye(EyeEffect::new()));
    orchestrator.register("water", EffectInstance::Custom(Box::new(TintEffect::water())));
    orchestrator
}

/// One player's game state: the selected jutsu, sequence progress, combo
/// bookkeeping, effects and the optional timed challenge. Both the local loop
/// and every streaming connection own one.
pub struct Session {
    catalog: Arc<JutsuCatalog>,
    config: SessionConfig,
    jutsu: String,
    definition: JutsuDefinition,
    tracker: SequenceTracker,
    combo: ComboResolver,
    combo_effects: Vec<String>,
    orchestrator: EffectOrchestrator,
    mode: SessionMode,
    challenge: ChallengeRun,
    player_level: u32,
    anchors: Anchors,
    effects_enabled: bool,
    last_update: Option<f64>,
    events: Vec<SessionEvent>,
}

impl Session {
    pub fn new(
        catalog: Arc<JutsuCatalog>,
        config: SessionConfig,
        segmenter: Result<Box<dyn Segmenter>, SegmentationError>,
    ) -> Result<Self, CatalogError> {
        let jutsu = match &config.initial_jutsu {
            Some(name) => name.clone(),
            None => catalog.name_at(0).ok_or(CatalogError::Empty)?.to_string(),
        };
        let definition = catalog.require(&jutsu)?.clone();
        let orchestrator = default_effects(config.ghost_clone.clone(), segmenter);
        Ok(Self::assemble(catalog, config, jutsu, definition, orchestrator))
    }

    /// Builds a session around a caller-supplied effect registry.
    pub fn with_orchestrator(
        catalog: Arc<JutsuCatalog>,
        config: SessionConfig,
        orchestrator: EffectOrchestrator,
    ) -> Result<Self, CatalogError> {
        let jutsu = match &config.initial_jutsu {
            Some(name) => name.clone(),
            None => catalog.name_at(0).ok_or(CatalogError::Empty)?.to_string(),
        };
        let definition = catalog.require(&jutsu)?.clone();
        Ok(Self::assemble(catalog, config, jutsu, definition, orchestrator))
    }

    fn assemble(
        catalog: Arc<JutsuCatalog>,
        config: SessionConfig,
        jutsu: String,
        definition: JutsuDefinition,
        orchestrator: EffectOrchestrator,
    ) -> Self {
        let tracker = Self::tracker_for(&config.sequence, &definition);
        let combo = ComboResolver::new(definition.combo_parts.clone());
        let challenge = ChallengeRun::new(config.challenge.countdown_secs);
        let player_level = config.player_level;
        Self {
            catalog,
            config,
            jutsu,
            definition,
            tracker,
            combo,
            combo_effects: Vec::new(),
            orchestrator,
            mode: SessionMode::FreePlay,
            challenge,
            player_level,
            anchors: Anchors::default(),
            effects_enabled: true,
            last_update: None,
            events: Vec::new(),
        }
    }

    fn tracker_for(config: &SequenceConfig, definition: &JutsuDefinition) -> SequenceTracker {
        SequenceTracker::new(definition.sequence.clone(), config.cooldown_secs)
            .with_min_confidence(config.min_confidence)
    }

    pub fn catalog(&self) -> &Arc<JutsuCatalog> {
        &self.catalog
    }

    pub fn jutsu(&self) -> &str {
        &self.jutsu
    }

    pub fn definition(&self) -> &JutsuDefinition {
        &self.definition
    }

    pub fn progress(&self) -> &SequenceProgress {
        self.tracker.progress()
    }

    pub fn target(&self) -> Option<&SignToken> {
        self.tracker.target()
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn challenge(&self) -> &ChallengeRun {
        &self.challenge
    }

    pub fn challenge_mut(&mut self) -> &mut ChallengeRun {
        &mut self.challenge
    }

    pub fn orchestrator(&self) -> &EffectOrchestrator {
        &self.orchestrator
    }

    pub fn anchors(&self) -> &Anchors {
        &self.anchors
    }

    pub fn player_level(&self) -> u32 {
        self.player_level
    }

    pub fn set_player_level(&mut self, level: u32) {
        self.player_level = level;
    }

    pub fn set_effects_enabled(&mut self, enabled: bool) {
        self.effects_enabled = enabled;
    }

    pub fn set_landmarks(&mut self, landmarks: &Landmarks) {
        self.anchors = landmarks.anchors();
    }

    pub fn summary(&self) -> SequenceSummary {
        SequenceSummary {
            jutsu: self.jutsu.clone(),
            step: self.tracker.progress().current_step,
            total: self.tracker.len(),
            active: self.tracker.progress().active,
        }
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Classification runs only when the player meets the level gate and, in
    /// challenge mode, only while the timed run is live.
    pub fn detection_enabled(&self) -> bool {
        if self.player_level < self.definition.min_level {
            return false;
        }
        match self.mode {
            SessionMode::FreePlay => true,
            SessionMode::Challenge => self.challenge.state() == ChallengeState::Active,
        }
    }

    /// While a jutsu effect plays the sequence is frozen; landmark tracking
    /// replaces classification to position the effect.
    pub fn needs_precision_tracking(&self) -> bool {
        self.tracker.progress().active
    }

    pub fn handle_classification(
        &mut self,
        classification: Option<&Classification>,
        now: f64,
    ) -> AcceptOutcome {
        if !self.detection_enabled() {
            return AcceptOutcome::default();
        }
        let idle = SignToken::idle();
        let (label, confidence) = match classification {
            Some(c) => (&c.label, c.confidence),
            None => (&idle, 0.0),
        };

        let ctx = EffectContext {
            now,
            jutsu: Some(&self.jutsu),
            frame: None,
            anchors: &self.anchors,
        };
        if !label.is_reserved() && confidence > self.config.sequence.min_confidence {
            self.orchestrator.broadcast_sign_detected(label, &ctx);
        }

        let outcome = self.tracker.accept(label, confidence, now);
        if outcome.advanced {
            self.events.push(SessionEvent::SignAccepted {
                sign: label.clone(),
                step: outcome.reached_step,
                total: self.tracker.len(),
            });
        }

        for trigger in self.combo.observe(&outcome) {
            let effect = trigger.effect_kind.name().to_string();
            if self.orchestrator.trigger_passive(&effect, &ctx) {
                self.combo_effects.push(effect.clone());
            }
            self.events.push(SessionEvent::ComboTriggered {
                part: trigger.name,
                effect,
            });
        }

        if outcome.completed {
            let effect = self.definition.effect_kind.name().to_string();
            info!("{} completed at {:.2}s", self.jutsu, now);
            self.orchestrator.start_active(&effect, &ctx);
            self.events.push(SessionEvent::JutsuCompleted {
                jutsu: self.jutsu.clone(),
                effect,
            });
            if let Some(final_time) = self.challenge.complete(now) {
                self.events.push(SessionEvent::RunFinished { final_time });
            }
        }
        outcome
    }

    /// Per-tick timers: challenge countdown and active-effect duration.
    pub fn tick(&mut self, now: f64) {
        if self.challenge.tick(now) {
            let run_start = self.challenge.run_start().unwrap_or(now);
            self.clear_run(now);
            self.tracker.restart_at(run_start);
            self.events.push(SessionEvent::RunStarted { run_start });
        }
        let progress = self.tracker.progress();
        if progress.active {
            let started = progress.active_start_time.unwrap_or(now);
            if now - started >= self.definition.duration {
                self.end_jutsu_effect(now);
            }
        }
    }

    fn end_jutsu_effect(&mut self, now: f64) {
        debug!("{} effect finished at {:.2}s", self.jutsu, now);
        self.tracker.finish_effect();
        let ctx = EffectContext {
            now,
            jutsu: Some(&self.jutsu),
            frame: None,
            anchors: &self.anchors,
        };
        self.orchestrator.end_active(&ctx);
        for name in self.combo_effects.drain(..) {
            self.orchestrator.end_passive(&name, &ctx);
        }
        self.events.push(SessionEvent::EffectEnded {
            jutsu: self.jutsu.clone(),
        });
    }

    pub fn update_effects(&mut self, now: f64, frame: Option<&RgbImage>) {
        let dt = self.last_update.map_or(0.0, |last| (now - last).max(0.0));
        self.last_update = Some(now);
        let ctx = EffectContext {
            now,
            jutsu: Some(&self.jutsu),
            frame,
            anchors: &self.anchors,
        };
        self.orchestrator.update(&ctx, dt);
    }

    /// Composites the running effects over `frame`.
    pub fn render(&mut self, now: f64, frame: &RgbImage) -> RgbImage {
        if !self.effects_enabled {
            return frame.clone();
        }
        let mut surface = Surface::new(frame.clone());
        let ctx = EffectContext {
            now,
            jutsu: Some(&self.jutsu),
            frame: Some(frame),
            anchors: &self.anchors,
        };
        self.orchestrator.render(&ctx, &mut surface);
        surface.into_image()
    }

    fn clear_run(&mut self, now: f64) {
        self.tracker.reset();
        self.combo.reset();
        self.combo_effects.clear();
        let ctx = EffectContext {
            now,
            jutsu: Some(&self.jutsu),
            frame: None,
            anchors: &self.anchors,
        };
        self.orchestrator.reset(&ctx);
    }

    /// Clears progress and effects, keeping the selected jutsu.
    pub fn reset(&mut self, now: f64) {
        self.clear_run(now);
    }

    pub fn select_jutsu(&mut self, name: &str, now: f64) -> Result<bool, CatalogError> {
        if self.challenge.is_running() {
            return Ok(false);
        }
        let definition = self.catalog.require(name)?.clone();
        self.clear_run(now);
        self.jutsu = name.to_string();
        self.tracker = Self::tracker_for(&self.config.sequence, &definition);
        self.combo = ComboResolver::new(definition.combo_parts.clone());
        self.definition = definition;
        info!("Selected {}", name);
        self.events.push(SessionEvent::JutsuSelected {
            jutsu: self.jutsu.clone(),
        });
        Ok(true)
    }

    /// Cycles through the catalog by `delta` positions.
    pub fn switch_jutsu(&mut self, delta: i32, now: f64) -> bool {
        let len = self.catalog.len() as i64;
        if len == 0 || self.challenge.is_running() {
            return false;
        }
        let current = self.catalog.index_of(&self.jutsu).unwrap_or(0) as i64;
        let next = (current + i64::from(delta)).rem_euclid(len) as usize;
        let Some(name) = self.catalog.name_at(next).map(str::to_string) else {
            return false;
        };
        matches!(self.select_jutsu(&name, now), Ok(true))
    }

    pub fn start_challenge(&mut self, now: f64) -> bool {
        if self.mode == SessionMode::Challenge && self.challenge.is_running() {
            return false;
        }
        self.mode = SessionMode::Challenge;
        self.clear_run(now);
        let started = self.challenge.start(now);
        if started {
            self.events.push(SessionEvent::CountdownStarted);
        }
        started
    }

    pub fn restart_challenge(&mut self, now: f64) -> bool {
        if !self.challenge.restart() {
            return false;
        }
        self.clear_run(now);
        true
    }

    pub fn leave_challenge(&mut self, now: f64) {
        self.challenge.cancel();
        self.mode = SessionMode::FreePlay;
        self.clear_run(now);
    }

    pub fn take_submission(&mut self) -> Option<Submission> {
        self.challenge.take_submission(&self.jutsu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::ChromaKeySegmenter;

    fn session(jutsu: &str, level: u32) -> Session {
        let config = SessionConfig::default()
            .with_initial_jutsu(jutsu)
            .with_player_level(level);
        Session::new(
            Arc::new(JutsuCatalog::official()),
            config,
            Ok(Box::new(ChromaKeySegmenter::new([0, 177, 64]))),
        )
        .expect("jutsu exists")
    }

    fn sign(label: &str) -> Classification {
        Classification {
            label: SignToken::new(label),
            confidence: 0.9,
        }
    }

    fn perform(session: &mut Session, signs: &[(&str, f64)]) -> Vec<AcceptOutcome> {
        signs
            .iter()
            .map(|(label, t)| {
                session.tick(*t);
                session.handle_classification(Some(&sign(label)), *t)
            })
            .collect()
    }

    #[test]
    fn completing_a_jutsu_plays_its_effect_for_its_duration() {
        let mut session = session("Shadow Clone", 0);
        let outcomes = perform(
            &mut session,
            &[("ram", 0.0), ("ram", 0.1), ("snake", 0.6), ("tiger", 1.2)],
        );
        assert!(outcomes[3].completed);
        assert!(session.needs_precision_tracking());
        assert_eq!(session.orchestrator().active_name(), Some("clone"));

        session.tick(6.0);
        assert!(session.needs_precision_tracking());
        session.tick(6.5);
        assert!(!session.progress().active);
        assert_eq!(session.orchestrator().active_name(), None);

        let events = session.drain_events();
        assert!(events.contains(&SessionEvent::JutsuCompleted {
            jutsu: "Shadow Clone".to_string(),
            effect: "clone".to_string(),
        }));
        assert!(events.contains(&SessionEvent::EffectEnded {
            jutsu: "Shadow Clone".to_string()
        }));
    }

    #[test]
    fn combo_part_plays_alongside_main_sequence() {
        let mut session = session("Clone Chidori", 2);
        perform(
            &mut session,
            &[("ram", 0.0), ("snake", 1.0), ("tiger", 2.0)],
        );
        let clone = session
            .orchestrator()
            .effect("clone")
            .and_then(|e| e.as_ghost_clone())
            .expect("clone registered");
        assert_eq!(clone.burst_start(), Some(2.0));
        assert!(!session.progress().active);
        assert_eq!(session.progress().current_step, 3);

        perform(
            &mut session,
            &[("tiger", 2.5), ("ox", 3.0), ("hare", 4.0), ("monkey", 5.0)],
        );
        assert_eq!(session.orchestrator().active_name(), Some("lightning"));

        session.tick(10.0);
        let clone = session
            .orchestrator()
            .effect("clone")
            .and_then(|e| e.as_ghost_clone())
            .expect("clone registered");
        assert!(!clone.is_visible());
        let combos = session
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::ComboTriggered { .. }))
            .count();
        assert_eq!(combos, 1);
    }

    #[test]
    fn non_clone_combo_part_runs_as_passive_sub_effect() {
        let catalog = JutsuCatalog::from_json(
            r#"{"Storm": {"sequence": ["ram", "snake", "ox"], "effectKind": "fire",
                "comboParts": [{"name": "flash", "atStep": 1, "effectKind": "lightning"}]}}"#,
        )
        .expect("catalog parses");
        let mut session = Session::new(
            Arc::new(catalog),
            SessionConfig::default().with_initial_jutsu("Storm"),
            Ok(Box::new(ChromaKeySegmenter::new([0, 177, 64]))),
        )
        .expect("jutsu exists");

        perform(&mut session, &[("ram", 0.0)]);
        assert!(session.orchestrator().is_running("lightning"));
        assert_eq!(session.orchestrator().active_name(), None);

        let frame = RgbImage::from_pixel(8, 8, image::Rgb([120, 120, 120]));
        session.update_effects(1.0, Some(&frame));
        assert_ne!(session.render(1.0, &frame), frame);

        perform(&mut session, &[("snake", 1.0), ("ox", 2.0)]);
        assert_eq!(session.orchestrator().active_name(), Some("fire"));
        assert!(session.orchestrator().is_running("lightning"));

        session.tick(7.5);
        assert!(!session.orchestrator().is_running("lightning"));
        assert!(!session.orchestrator().is_running("fire"));
    }

    #[test]
    fn level_gate_blocks_detection() {
        let mut session = session("Water Dragon", 0);
        assert!(!session.detection_enabled());
        let outcome = session.handle_classification(Some(&sign("ox")), 0.0);
        assert!(!outcome.advanced);
        session.set_player_level(2);
        assert!(session.handle_classification(Some(&sign("ox")), 1.0).advanced);
    }

    #[test]
    fn challenge_run_times_from_go() {
        let mut session = session("Chidori", 0);
        assert!(session.start_challenge(0.0));
        session.tick(1.0);
        assert!(!session.handle_classification(Some(&sign("ox")), 1.0).advanced);

        session.tick(3.0);
        assert_eq!(session.challenge().state(), ChallengeState::Active);
        assert!(!session.handle_classification(Some(&sign("ox")), 3.2).advanced);
        perform(
            &mut session,
            &[("ox", 3.6), ("hare", 5.0), ("monkey", 7.37)],
        );
        assert_eq!(session.challenge().state(), ChallengeState::Results);
        let final_time = session.challenge().final_time().expect("run finished");
        assert!((final_time - 4.37).abs() < 1e-9);

        let submission = session.take_submission().expect("first submission");
        assert_eq!(submission.jutsu, "Chidori");
        assert!(session.take_submission().is_none());
        assert!(!session.switch_jutsu(1, 8.0));

        assert!(session.restart_challenge(9.0));
        assert_eq!(session.challenge().state(), ChallengeState::Waiting);
        assert!(!session.challenge().is_submitted());
    }

    #[test]
    fn switching_jutsu_wraps_and_resets_progress() {
        let mut session = session("Fireball", 0);
        session.handle_classification(Some(&sign("horse")), 0.0);
        assert_eq!(session.progress().current_step, 1);

        assert!(session.switch_jutsu(-1, 1.0));
        assert_eq!(session.jutsu(), "Clone Chidori");
        assert_eq!(session.progress().current_step, 0);
        assert!(session.switch_jutsu(1, 2.0));
        assert_eq!(session.jutsu(), "Fireball");
        assert!(session.select_jutsu("Nope", 3.0).is_err());
    }

    #[test]
    fn low_confidence_is_idle() {
        let mut session = session("Rasengan", 0);
        let weak = Classification {
            label: SignToken::new("ram"),
            confidence: 0.3,
        };
        assert!(!session.handle_classification(Some(&weak), 0.0).advanced);
        assert!(!session.handle_classification(None, 0.1).advanced);
        assert!(session.handle_classification(Some(&sign("ram")), 0.2).completed);
    }
}
