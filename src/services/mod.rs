pub mod worker;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::ServiceError;

pub use worker::{BackgroundWorkers, WorkerResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player: String,
    pub jutsu: String,
    /// Seconds from "GO" to completion.
    pub time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    pub name: String,
    pub level: u32,
    pub xp: u64,
    pub jutsus_completed: u64,
    #[serde(default)]
    pub rank: String,
}

const RANKS: &[(u32, &str)] = &[
    (0, "Academy Student"),
    (5, "Genin Candidate"),
    (10, "Genin"),
    (25, "Chunin Candidate"),
    (50, "Chunin"),
    (100, "Special Jonin"),
    (250, "Jonin"),
    (500, "ANBU Black Ops"),
    (1000, "S-Rank Shinobi"),
    (2500, "Sanin"),
    (5000, "Hokage Candidate"),
    (10000, "HOKAGE"),
];

/// Rank title for `level`.
pub fn rank_for_level(level: u32) -> &'static str {
    RANKS
        .iter()
        .rev()
        .find(|(min, _)| level >= *min)
        .map_or(RANKS[0].1, |(_, name)| name)
}

/// Total XP needed to reach `level`.
pub fn xp_for_level(level: u32) -> u64 {
    if level == 0 {
        return 0;
    }
    (f64::from(level).powf(1.8) * 150.0) as u64
}

/// XP awarded for completing a jutsu of `sequence_len` signs.
pub fn completion_xp(sequence_len: usize) -> u64 {
    50 + 10 * sequence_len as u64
}

impl PlayerProfile {
    pub fn new(name: impl Into<String>, level: u32) -> Self {
        Self {
            name: name.into(),
            level,
            xp: 0,
            jutsus_completed: 0,
            rank: rank_for_level(level).to_string(),
        }
    }

    pub fn next_level_xp(&self) -> u64 {
        xp_for_level(self.level + 1)
    }

    /// Credits one completed jutsu worth `amount` XP. Returns true when the
    /// profile gained at least one level.
    pub fn add_xp(&mut self, amount: u64) -> bool {
        let previous = self.level;
        self.xp += amount;
        self.jutsus_completed += 1;
        while self.xp >= self.next_level_xp() {
            self.level += 1;
        }
        self.rank = rank_for_level(self.level).to_string();
        if self.level > previous {
            info!("{} reached level {} ({})", self.name, self.level, self.rank);
        }
        self.level > previous
    }
}

/// Remote score / profile backend. Calls are fire-and-forget from the game
/// loop's point of view; only `BackgroundWorkers` awaits them.
#[async_trait]
pub trait ScoreService: Send + Sync {
    async fn submit_score(&self, player: &str, jutsu: &str, time: f64)
        -> Result<(), ServiceError>;

    /// Fastest runs first, at most `limit` entries.
    async fn leaderboard(
        &self,
        jutsu: &str,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, ServiceError>;

    async fn fetch_profile(&self, player: &str) -> Result<Option<PlayerProfile>, ServiceError>;

    async fn upsert_profile(&self, profile: PlayerProfile) -> Result<(), ServiceError>;
}

/// Process-local backend, used when no remote service is configured and in
/// tests.
#[derive(Debug, Default)]
pub struct InMemoryScoreService {
    scores: RwLock<Vec<LeaderboardEntry>>,
    profiles: RwLock<HashMap<String, PlayerProfile>>,
}

impl InMemoryScoreService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScoreService for InMemoryScoreService {
    async fn submit_score(
        &self,
        player: &str,
        jutsu: &str,
        time: f64,
    ) -> Result<(), ServiceError> {
        if !time.is_finite() || time < 0.0 {
            return Err(ServiceError::Request(format!("invalid time {}", time)));
        }
        debug!("Recording {:.3}s for {} on {}", time, player, jutsu);
        self.scores.write().await.push(LeaderboardEntry {
            player: player.to_string(),
            jutsu: jutsu.to_string(),
            time,
        });
        Ok(())
    }

    async fn leaderboard(
        &self,
        jutsu: &str,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, ServiceError> {
        let mut board: Vec<LeaderboardEntry> = self
            .scores
            .read()
            .await
            .iter()
            .filter(|entry| entry.jutsu == jutsu)
            .cloned()
            .collect();
        board.sort_by(|a, b| a.time.total_cmp(&b.time));
        board.truncate(limit);
        Ok(board)
    }

    async fn fetch_profile(&self, player: &str) -> Result<Option<PlayerProfile>, ServiceError> {
        Ok(self.profiles.read().await.get(player).cloned())
    }

    async fn upsert_profile(&self, profile: PlayerProfile) -> Result<(), ServiceError> {
        self.profiles
            .write()
            .await
            .insert(profile.name.clone(), profile);
        Ok(())
    }
}

/// Backend that is never reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineScoreService;

#[async_trait]
impl ScoreService for OfflineScoreService {
    async fn submit_score(&self, _: &str, _: &str, _: f64) -> Result<(), ServiceError> {
        Err(ServiceError::Offline)
    }

    async fn leaderboard(&self, _: &str, _: usize) -> Result<Vec<LeaderboardEntry>, ServiceError> {
        Err(ServiceError::Offline)
    }

    async fn fetch_profile(&self, _: &str) -> Result<Option<PlayerProfile>, ServiceError> {
        Err(ServiceError::Offline)
    }

    async fn upsert_profile(&self, _: PlayerProfile) -> Result<(), ServiceError> {
        Err(ServiceError::Offline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn leaderboard_is_sorted_filtered_and_limited() {
        let service = InMemoryScoreService::new();
        service.submit_score("a", "Chidori", 4.2).await.unwrap();
        service.submit_score("b", "Chidori", 2.1).await.unwrap();
        service.submit_score("c", "Fireball", 1.0).await.unwrap();
        service.submit_score("d", "Chidori", 3.3).await.unwrap();

        let board = service.leaderboard("Chidori", 2).await.unwrap();
        let players: Vec<&str> = board.iter().map(|e| e.player.as_str()).collect();
        assert_eq!(players, vec!["b", "d"]);
    }

    #[tokio::test]
    async fn negative_times_are_rejected() {
        let service = InMemoryScoreService::new();
        assert!(service.submit_score("a", "Chidori", -1.0).await.is_err());
    }

    #[tokio::test]
    async fn profiles_round_trip() {
        let service = InMemoryScoreService::new();
        assert_eq!(service.fetch_profile("guest").await.unwrap(), None);
        service
            .upsert_profile(PlayerProfile::new("guest", 2))
            .await
            .unwrap();
        let profile = service.fetch_profile("guest").await.unwrap();
        assert_eq!(profile.map(|p| p.level), Some(2));
    }

    #[test]
    fn xp_curve_matches_level_thresholds() {
        assert_eq!(xp_for_level(0), 0);
        assert_eq!(xp_for_level(1), 150);
        assert_eq!(xp_for_level(2), 522);
        assert_eq!(completion_xp(3), 80);
    }

    #[test]
    fn adding_xp_levels_up_and_renames_rank() {
        let mut profile = PlayerProfile::new("guest", 0);
        assert_eq!(profile.rank, "Academy Student");
        assert!(!profile.add_xp(completion_xp(3)));
        assert!(profile.add_xp(completion_xp(7)));
        assert_eq!(profile.level, 1);
        assert_eq!(profile.xp, 200);
        assert_eq!(profile.jutsus_completed, 2);

        assert!(profile.add_xp(5000));
        assert_eq!(profile.level, 7);
        assert_eq!(profile.rank, "Genin Candidate");
    }
}
