use image::RgbImage;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    challenge::ChallengeState,
    common::SessionClock,
    detection::{Classification, Classifier, FrameSource, LandmarkTracker},
    services::{completion_xp, BackgroundWorkers, LeaderboardEntry, PlayerProfile, WorkerResult},
    sequence::AcceptOutcome,
    session::{Session, SessionEvent},
};

/// Input gathered by the presenter for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalControls {
    /// Starts the challenge when waiting, restarts it from results.
    pub start_or_restart: bool,
    pub switch_jutsu: i32,
    pub refresh_leaderboard: bool,
    pub leave_challenge: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub now: f64,
    pub captured: bool,
    pub classification: Option<Classification>,
    pub outcome: AcceptOutcome,
    pub events: Vec<SessionEvent>,
}

/// Single-threaded game loop: capture, classify, track, orchestrate, render.
/// Network work happens on `BackgroundWorkers` and is only ever polled.
pub struct LocalLoop {
    clock: SessionClock,
    session: Session,
    camera: Box<dyn FrameSource>,
    classifier: Box<dyn Classifier>,
    landmarks: Box<dyn LandmarkTracker>,
    workers: BackgroundWorkers,
    player: String,
    mirror: bool,
    min_confidence: f32,
    last_render: Option<RgbImage>,
    leaderboard: Vec<LeaderboardEntry>,
    profile: Option<PlayerProfile>,
    stopped: bool,
}

impl LocalLoop {
    pub fn new(
        session: Session,
        camera: Box<dyn FrameSource>,
        classifier: Box<dyn Classifier>,
        landmarks: Box<dyn LandmarkTracker>,
        workers: BackgroundWorkers,
        player: impl Into<String>,
        min_confidence: f32,
    ) -> Self {
        let player = player.into();
        workers.fetch_profile(&player);
        Self {
            clock: SessionClock::start(),
            session,
            camera,
            classifier,
            landmarks,
            workers,
            player,
            mirror: true,
            min_confidence,
            last_render: None,
            leaderboard: Vec::new(),
            profile: None,
            stopped: false,
        }
    }

    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn last_render(&self) -> Option<&RgbImage> {
        self.last_render.as_ref()
    }

    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    pub fn profile(&self) -> Option<&PlayerProfile> {
        self.profile.as_ref()
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn tick(&mut self, controls: LocalControls) -> TickReport {
        let now = self.clock.now();
        self.tick_at(controls, now)
    }

    pub fn tick_at(&mut self, controls: LocalControls, now: f64) -> TickReport {
        let mut report = TickReport {
            now,
            ..TickReport::default()
        };
        if self.stopped {
            return report;
        }
        self.apply_controls(controls, now);

        let frame = match self.camera.capture() {
            Ok(frame) if self.mirror => Some(frame.mirrored()),
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!("Skipping detection this tick: {}", e);
                None
            }
        };
        report.captured = frame.is_some();

        if let Some(frame) = &frame {
            if self.session.needs_precision_tracking() {
                match self.landmarks.track(frame, false) {
                    Ok(landmarks) => self.session.set_landmarks(&landmarks),
                    Err(e) => debug!("Landmark tracking failed: {}", e),
                }
            } else if self.session.detection_enabled() {
                report.classification = match self.classifier.classify(frame, self.min_confidence)
                {
                    Ok(classification) => classification,
                    Err(e) => {
                        warn!("Classifier failed: {}", e);
                        None
                    }
                };
                report.outcome = self
                    .session
                    .handle_classification(report.classification.as_ref(), now);
            }
        }

        self.session.tick(now);
        self.session
            .update_effects(now, frame.as_ref().map(|f| f.image()));
        if let Some(frame) = &frame {
            self.last_render = Some(self.session.render(now, frame.image()));
        }

        self.poll_workers();
        if let Some(submission) = self.session.take_submission() {
            info!(
                "Submitting {:.2}s on {} for {}",
                submission.final_time, submission.jutsu, self.player
            );
            self.workers.submit_run(&self.player, submission);
        }

        report.events = self.session.drain_events();
        self.record_progress(&report.events);
        report
    }

    fn apply_controls(&mut self, controls: LocalControls, now: f64) {
        if controls.leave_challenge {
            self.session.leave_challenge(now);
        }
        if controls.start_or_restart {
            match self.session.challenge().state() {
                ChallengeState::Waiting => {
                    self.session.start_challenge(now);
                }
                ChallengeState::Results => {
                    self.session.restart_challenge(now);
                }
                ChallengeState::Countdown | ChallengeState::Active => {}
            }
        }
        if controls.switch_jutsu != 0 {
            self.session.switch_jutsu(controls.switch_jutsu, now);
        }
        if controls.refresh_leaderboard {
            self.workers.refresh_leaderboard(self.session.jutsu());
        }
    }

    fn poll_workers(&mut self) {
        for result in self.workers.drain() {
            match result {
                WorkerResult::RankEvaluated { jutsu, rank, .. } => {
                    if jutsu == self.session.jutsu()
                        && self.session.challenge().state() == ChallengeState::Results
                    {
                        self.session.challenge_mut().set_rank(rank);
                    }
                }
                WorkerResult::Leaderboard { jutsu, entries } => {
                    if let Ok(entries) = entries {
                        if jutsu == self.session.jutsu() {
                            self.leaderboard = entries;
                        }
                    }
                }
                WorkerResult::Profile(Ok(Some(profile))) => {
                    self.session.set_player_level(profile.level);
                    self.profile = Some(profile);
                }
                WorkerResult::Profile(Ok(None)) => {
                    debug!("No stored profile for {}", self.player);
                }
                WorkerResult::Profile(Err(_)) | WorkerResult::ProfileSynced(_) => {}
            }
        }
    }

    fn record_progress(&mut self, events: &[SessionEvent]) {
        let awards: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::JutsuCompleted { jutsu, .. } => self
                    .session
                    .catalog()
                    .get(jutsu)
                    .map(|definition| completion_xp(definition.len())),
                _ => None,
            })
            .collect();
        if awards.is_empty() {
            return;
        }
        let profile = self.profile.get_or_insert_with(|| {
            PlayerProfile::new(self.player.clone(), self.session.player_level())
        });
        for xp in awards {
            if profile.add_xp(xp) {
                self.session.set_player_level(profile.level);
            }
        }
        self.workers.sync_profile(profile.clone());
    }

    /// Releases the camera. Background jobs still in flight are abandoned.
    pub fn stop(&mut self) {
        if !self.stopped {
            self.camera.release();
            self.stopped = true;
            info!("Local session stopped");
        }
    }
}

impl Drop for LocalLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drives the loop on a fixed-rate interval without a window.
pub async fn run_headless(
    mut game: LocalLoop,
    target_fps: u32,
    max_ticks: Option<u64>,
    shutdown: CancellationToken,
) -> LocalLoop {
    let period = Duration::from_secs_f64(1.0 / f64::from(target_fps.max(1)));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = 0u64;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Headless loop cancelled after {} ticks", ticks);
                break;
            }
            _ = ticker.tick() => {
                let report = game.tick(LocalControls::default());
                for event in &report.events {
                    info!("{:?}", event);
                }
                ticks += 1;
                if max_ticks.is_some_and(|max| ticks >= max) {
                    break;
                }
            }
        }
    }
    game.stop();
    game
}
