use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::services::LeaderboardEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
    Waiting,
    Countdown,
    Active,
    Results,
}

/// Outcome of a timed run's leaderboard lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum RankStatus {
    Pending,
    Ranked { rank: usize, top_percent: f64 },
    TopHundredPlus,
    FirstRecord,
    Unavailable,
}

impl fmt::Display for RankStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankStatus::Pending => write!(f, "Calculating rank..."),
            RankStatus::Ranked { rank, top_percent } => {
                write!(f, "Rank: #{} (Top {:.0}%)", rank, top_percent)
            }
            RankStatus::TopHundredPlus => write!(f, "Rank: Top 100+"),
            RankStatus::FirstRecord => write!(f, "Rank: First Record"),
            RankStatus::Unavailable => write!(f, "Rank unavailable"),
        }
    }
}

/// Locates `final_time` in a fetched leaderboard, fastest first.
pub fn evaluate_rank(final_time: f64, board: &[LeaderboardEntry]) -> RankStatus {
    if board.is_empty() {
        return RankStatus::FirstRecord;
    }
    let total = board.len();
    match board
        .iter()
        .position(|entry| (entry.time - final_time).abs() < 0.001)
    {
        Some(index) => {
            let rank = index + 1;
            RankStatus::Ranked {
                rank,
                top_percent: (total - rank + 1) as f64 / total as f64 * 100.0,
            }
        }
        None => RankStatus::TopHundredPlus,
    }
}

/// A finished run waiting to be submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub jutsu: String,
    pub final_time: f64,
}

/// Timed-run state machine: waiting, countdown, active, results.
#[derive(Debug, Clone)]
pub struct ChallengeRun {
    state: ChallengeState,
    countdown_secs: f64,
    countdown_start: Option<f64>,
    run_start: Option<f64>,
    final_time: Option<f64>,
    submitted: bool,
    rank: RankStatus,
}

impl ChallengeRun {
    pub fn new(countdown_secs: f64) -> Self {
        Self {
            state: ChallengeState::Waiting,
            countdown_secs,
            countdown_start: None,
            run_start: None,
            final_time: None,
            submitted: false,
            rank: RankStatus::Pending,
        }
    }

    pub fn state(&self) -> ChallengeState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state != ChallengeState::Waiting
    }

    pub fn run_start(&self) -> Option<f64> {
        self.run_start
    }

    pub fn final_time(&self) -> Option<f64> {
        self.final_time
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub fn rank(&self) -> &RankStatus {
        &self.rank
    }

    /// Whole seconds left on the countdown, for display.
    pub fn countdown_remaining(&self, now: f64) -> Option<u32> {
        match (self.state, self.countdown_start) {
            (ChallengeState::Countdown, Some(start)) => {
                Some((self.countdown_secs - (now - start)).max(0.0).ceil() as u32)
            }
            _ => None,
        }
    }

    /// Time elapsed in the active run, or the final time once finished.
    pub fn elapsed(&self, now: f64) -> Option<f64> {
        match (self.state, self.run_start) {
            (ChallengeState::Active, Some(start)) => Some((now - start).max(0.0)),
            (ChallengeState::Results, _) => self.final_time,
            _ => None,
        }
    }

    pub fn start(&mut self, now: f64) -> bool {
        if self.state != ChallengeState::Waiting {
            return false;
        }
        self.state = ChallengeState::Countdown;
        self.countdown_start = Some(now);
        debug!("Challenge countdown started at {:.2}s", now);
        true
    }

    /// Advances the countdown. Returns true on the tick the run goes active;
    /// the caller resets sequence progress at that point.
    pub fn tick(&mut self, now: f64) -> bool {
        if self.state != ChallengeState::Countdown {
            return false;
        }
        let Some(start) = self.countdown_start else {
            return false;
        };
        if now - start < self.countdown_secs {
            return false;
        }
        self.state = ChallengeState::Active;
        self.run_start = Some(now);
        info!("Challenge run started at {:.2}s", now);
        true
    }

    /// Records the completion timestamp and moves to results.
    pub fn complete(&mut self, completed_at: f64) -> Option<f64> {
        if self.state != ChallengeState::Active {
            return None;
        }
        let start = self.run_start.unwrap_or(completed_at);
        let final_time = (completed_at - start).max(0.0);
        self.final_time = Some(final_time);
        self.state = ChallengeState::Results;
        self.rank = RankStatus::Pending;
        info!("Challenge run finished in {:.2}s", final_time);
        Some(final_time)
    }

    /// Hands out the run's score exactly once while in results.
    pub fn take_submission(&mut self, jutsu: &str) -> Option<Submission> {
        if self.state != ChallengeState::Results || self.submitted {
            return None;
        }
        let final_time = self.final_time?;
        self.submitted = true;
        Some(Submission {
            jutsu: jutsu.to_string(),
            final_time,
        })
    }

    pub fn set_rank(&mut self, rank: RankStatus) {
        self.rank = rank;
    }

    pub fn restart(&mut self) -> bool {
        if self.state != ChallengeState::Results {
            return false;
        }
        *self = Self::new(self.countdown_secs);
        true
    }

    /// Abandons any run regardless of state.
    pub fn cancel(&mut self) {
        *self = Self::new(self.countdown_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(time: f64) -> LeaderboardEntry {
        LeaderboardEntry {
            player: "p".to_string(),
            jutsu: "Chidori".to_string(),
            time,
        }
    }

    #[test]
    fn countdown_then_timed_run() {
        let mut run = ChallengeRun::new(3.0);
        assert!(run.start(0.0));
        assert!(!run.tick(2.9));
        assert_eq!(run.countdown_remaining(2.1), Some(1));
        assert!(run.tick(3.0));
        assert_eq!(run.state(), ChallengeState::Active);
        assert_eq!(run.run_start(), Some(3.0));

        let final_time = run.complete(7.37).expect("run was active");
        assert!((final_time - 4.37).abs() < 1e-9);
        assert_eq!(run.state(), ChallengeState::Results);
    }

    #[test]
    fn final_time_is_never_negative() {
        let mut run = ChallengeRun::new(0.0);
        run.start(1.0);
        run.tick(1.0);
        assert_eq!(run.complete(0.5), Some(0.0));
    }

    #[test]
    fn submission_happens_once_and_restart_clears_it() {
        let mut run = ChallengeRun::new(3.0);
        run.start(0.0);
        run.tick(3.0);
        assert!(run.take_submission("Chidori").is_none());
        run.complete(5.0);

        let submissions: Vec<_> = (0..10)
            .filter_map(|_| run.take_submission("Chidori"))
            .collect();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].final_time, 2.0);
        assert!(run.is_submitted());

        assert!(run.restart());
        assert_eq!(run.state(), ChallengeState::Waiting);
        assert!(!run.is_submitted());
        assert_eq!(run.final_time(), None);
    }

    #[test]
    fn restart_only_from_results() {
        let mut run = ChallengeRun::new(3.0);
        assert!(!run.restart());
        run.start(0.0);
        assert!(!run.restart());
        assert!(!run.start(0.5));
    }

    #[test]
    fn rank_evaluation() {
        assert_eq!(evaluate_rank(3.0, &[]), RankStatus::FirstRecord);

        let board = vec![entry(1.5), entry(2.0), entry(3.0004), entry(4.0)];
        assert_eq!(
            evaluate_rank(3.0, &board),
            RankStatus::Ranked {
                rank: 3,
                top_percent: 50.0
            }
        );
        assert_eq!(evaluate_rank(9.0, &board), RankStatus::TopHundredPlus);
        assert_eq!(
            RankStatus::Ranked {
                rank: 1,
                top_percent: 100.0
            }
            .to_string(),
            "Rank: #1 (Top 100%)"
        );
    }
}
