use std::sync::Arc;
use tokio::{
    runtime::Handle,
    sync::mpsc::{self, error::TryRecvError},
};
use tracing::{debug, warn};

use crate::{
    challenge::{evaluate_rank, RankStatus, Submission},
    error::ServiceError,
};

use super::{LeaderboardEntry, PlayerProfile, ScoreService};

/// Everything a background job can report back to the game loop.
#[derive(Debug, Clone)]
pub enum WorkerResult {
    RankEvaluated {
        jutsu: String,
        final_time: f64,
        rank: RankStatus,
    },
    Leaderboard {
        jutsu: String,
        entries: Result<Vec<LeaderboardEntry>, ServiceError>,
    },
    Profile(Result<Option<PlayerProfile>, ServiceError>),
    ProfileSynced(Result<(), ServiceError>),
}

/// Spawns network jobs on the runtime and hands their results back through a
/// bounded channel. The loop drains it without blocking; nothing is joined.
pub struct BackgroundWorkers {
    runtime: Handle,
    service: Arc<dyn ScoreService>,
    tx: mpsc::Sender<WorkerResult>,
    rx: mpsc::Receiver<WorkerResult>,
    leaderboard_limit: usize,
}

impl BackgroundWorkers {
    pub fn new(
        runtime: Handle,
        service: Arc<dyn ScoreService>,
        buffer: usize,
        leaderboard_limit: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        Self {
            runtime,
            service,
            tx,
            rx,
            leaderboard_limit,
        }
    }

    fn spawn_job<F>(&self, job: F)
    where
        F: std::future::Future<Output = WorkerResult> + Send + 'static,
    {
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            let result = job.await;
            if tx.send(result).await.is_err() {
                debug!("Worker result dropped, loop has shut down");
            }
        });
    }

    /// Submits a finished run then looks up its rank on the leaderboard.
    pub fn submit_run(&self, player: &str, submission: Submission) {
        let service = self.service.clone();
        let player = player.to_string();
        let limit = self.leaderboard_limit;
        self.spawn_job(async move {
            let Submission { jutsu, final_time } = submission;
            let rank = match service.submit_score(&player, &jutsu, final_time).await {
                Ok(()) => match service.leaderboard(&jutsu, limit).await {
                    Ok(board) => evaluate_rank(final_time, &board),
                    Err(e) => {
                        warn!("Leaderboard fetch failed for {}: {}", jutsu, e);
                        RankStatus::Unavailable
                    }
                },
                Err(e) => {
                    warn!("Score submission failed for {}: {}", jutsu, e);
                    RankStatus::Unavailable
                }
            };
            WorkerResult::RankEvaluated {
                jutsu,
                final_time,
                rank,
            }
        });
    }

    pub fn refresh_leaderboard(&self, jutsu: &str) {
        let service = self.service.clone();
        let jutsu = jutsu.to_string();
        let limit = self.leaderboard_limit;
        self.spawn_job(async move {
            let entries = service.leaderboard(&jutsu, limit).await;
            if let Err(e) = &entries {
                warn!("Leaderboard refresh failed for {}: {}", jutsu, e);
            }
            WorkerResult::Leaderboard { jutsu, entries }
        });
    }

    pub fn fetch_profile(&self, player: &str) {
        let service = self.service.clone();
        let player = player.to_string();
        self.spawn_job(async move {
            let profile = service.fetch_profile(&player).await;
            if let Err(e) = &profile {
                warn!("Profile fetch failed for {}: {}", player, e);
            }
            WorkerResult::Profile(profile)
        });
    }

    pub fn sync_profile(&self, profile: PlayerProfile) {
        let service = self.service.clone();
        self.spawn_job(async move {
            let result = service.upsert_profile(profile).await;
            if let Err(e) = &result {
                warn!("Profile sync failed: {}", e);
            }
            WorkerResult::ProfileSynced(result)
        });
    }

    /// Everything finished since the last call.
    pub fn drain(&mut self) -> Vec<WorkerResult> {
        let mut results = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(result) => results.push(result),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        results
    }
}
