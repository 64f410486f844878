use tracing::debug;

use crate::common::SignToken;

/// Mutable per-session progress through one jutsu sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceProgress {
    pub current_step: usize,
    pub last_accept_time: Option<f64>,
    /// True while the completed jutsu's primary effect is playing.
    pub active: bool,
    pub active_start_time: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptOutcome {
    pub advanced: bool,
    pub completed: bool,
    /// Step count reached by this accept, before any completion reset.
    pub reached_step: usize,
}

#[derive(Debug, Clone)]
pub struct SequenceTracker {
    sequence: Vec<SignToken>,
    cooldown: f64,
    min_confidence: f32,
    progress: SequenceProgress,
}

impl SequenceTracker {
    pub fn new(sequence: Vec<SignToken>, cooldown: f64) -> Self {
        Self {
            sequence,
            cooldown,
            min_confidence: 0.0,
            progress: SequenceProgress::default(),
        }
    }

    /// Labels at or below this confidence are treated as `idle`.
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn progress(&self) -> &SequenceProgress {
        &self.progress
    }

    pub fn sequence(&self) -> &[SignToken] {
        &self.sequence
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Out-of-range progress counts as a fresh start.
    fn step_index(&self) -> usize {
        if self.progress.current_step >= self.sequence.len() {
            0
        } else {
            self.progress.current_step
        }
    }

    /// The sign that would advance the sequence next.
    pub fn target(&self) -> Option<&SignToken> {
        if self.progress.active {
            return None;
        }
        self.sequence.get(self.step_index())
    }

    pub fn accept(&mut self, label: &SignToken, confidence: f32, now: f64) -> AcceptOutcome {
        let mut outcome = AcceptOutcome {
            reached_step: self.progress.current_step,
            ..AcceptOutcome::default()
        };
        if self.progress.active || label.is_reserved() || confidence <= self.min_confidence {
            return outcome;
        }

        self.progress.current_step = self.step_index();
        let Some(target) = self.sequence.get(self.progress.current_step) else {
            return outcome;
        };
        if label != target {
            return outcome;
        }
        if let Some(last) = self.progress.last_accept_time {
            if now - last <= self.cooldown {
                return outcome;
            }
        }

        self.progress.current_step += 1;
        self.progress.last_accept_time = Some(now);
        outcome.advanced = true;
        outcome.reached_step = self.progress.current_step;
        debug!(
            "Accepted {} ({}/{}) at {:.2}s",
            label,
            self.progress.current_step,
            self.sequence.len(),
            now
        );

        if self.progress.current_step == self.sequence.len() {
            self.progress.active = true;
            self.progress.active_start_time = Some(now);
            self.progress.current_step = 0;
            outcome.completed = true;
        }
        outcome
    }

    /// Called when the primary effect stops playing; input is accepted again.
    pub fn finish_effect(&mut self) {
        self.progress.active = false;
        self.progress.active_start_time = None;
    }

    pub fn reset(&mut self) {
        self.progress = SequenceProgress::default();
    }

    /// Clean progress whose cooldown is measured from `now`.
    pub fn restart_at(&mut self, now: f64) {
        self.progress = SequenceProgress {
            last_accept_time: Some(now),
            ..SequenceProgress::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(signs: &[&str]) -> SequenceTracker {
        SequenceTracker::new(signs.iter().map(|s| SignToken::new(s)).collect(), 0.5)
    }

    #[test]
    fn ram_snake_tiger_scenario() {
        let mut tracker = tracker(&["ram", "snake", "tiger"]);
        let inputs = [("ram", 0.0), ("ram", 0.1), ("snake", 0.6), ("tiger", 1.2)];
        let outcomes: Vec<_> = inputs
            .iter()
            .map(|(label, t)| tracker.accept(&SignToken::new(label), 0.9, *t))
            .collect();

        let advanced: Vec<bool> = outcomes.iter().map(|o| o.advanced).collect();
        assert_eq!(advanced, vec![true, false, true, true]);
        assert!(!outcomes[2].completed);
        assert!(outcomes[3].completed);
        assert!(tracker.progress().active);
        assert_eq!(tracker.progress().current_step, 0);
        assert_eq!(tracker.progress().active_start_time, Some(1.2));
    }

    #[test]
    fn never_skips_ahead() {
        let mut tracker = tracker(&["horse", "snake", "ram", "monkey"]);
        let stream = [
            "monkey", "ram", "horse", "monkey", "snake", "snake", "horse", "ram", "idle", "monkey",
        ];
        let mut previous = 0;
        for (i, label) in stream.iter().enumerate() {
            let outcome = tracker.accept(&SignToken::new(label), 0.9, i as f64);
            let step = if outcome.completed {
                tracker.len()
            } else {
                tracker.progress().current_step
            };
            assert!(step == previous || step == previous + 1);
            assert_eq!(outcome.advanced, step == previous + 1);
            previous = if outcome.completed { 0 } else { step };
        }
        assert!(tracker.progress().active);
    }

    #[test]
    fn cooldown_spaces_consecutive_advances() {
        let mut tracker = tracker(&["ox", "ox", "ox", "ox"]);
        let mut accepted = Vec::new();
        let mut t = 0.0;
        while t < 3.0 {
            if tracker.accept(&SignToken::new("ox"), 0.9, t).advanced {
                accepted.push(t);
            }
            t += 0.1;
        }
        assert_eq!(accepted.len(), 4);
        for pair in accepted.windows(2) {
            assert!(pair[1] - pair[0] > 0.5);
        }
    }

    #[test]
    fn exact_cooldown_boundary_is_rejected() {
        let mut tracker = tracker(&["ox", "hare"]);
        assert!(tracker.accept(&SignToken::new("ox"), 0.9, 1.0).advanced);
        assert!(!tracker.accept(&SignToken::new("hare"), 0.9, 1.5).advanced);
        assert!(tracker.accept(&SignToken::new("hare"), 0.9, 1.51).advanced);
    }

    #[test]
    fn completion_resets_once_and_freezes_input() {
        let mut tracker = tracker(&["ram"]);
        let first = tracker.accept(&SignToken::new("ram"), 0.9, 0.0);
        assert!(first.advanced && first.completed);
        assert_eq!(first.reached_step, 1);
        assert!(tracker.progress().active);
        assert_eq!(tracker.progress().current_step, 0);

        let frozen = tracker.accept(&SignToken::new("ram"), 0.9, 5.0);
        assert!(!frozen.advanced && !frozen.completed);

        tracker.finish_effect();
        assert!(tracker.accept(&SignToken::new("ram"), 0.9, 6.0).completed);
    }

    #[test]
    fn reserved_and_low_confidence_labels_are_ignored() {
        let mut tracker = tracker(&["idle", "ram"]).with_min_confidence(0.5);
        assert!(!tracker.accept(&SignToken::idle(), 1.0, 0.0).advanced);
        assert!(!tracker.accept(&SignToken::unknown(), 1.0, 1.0).advanced);

        let mut tracker = self::tracker(&["ram"]).with_min_confidence(0.5);
        assert!(!tracker.accept(&SignToken::new("ram"), 0.5, 0.0).advanced);
        assert!(tracker.accept(&SignToken::new("ram"), 0.51, 0.0).advanced);
    }

    #[test]
    fn restart_measures_cooldown_from_restart_time() {
        let mut tracker = tracker(&["ram", "snake"]);
        tracker.accept(&SignToken::new("ram"), 0.9, 0.0);
        tracker.restart_at(3.0);
        assert_eq!(tracker.progress().current_step, 0);
        assert!(!tracker.accept(&SignToken::new("ram"), 0.9, 3.2).advanced);
        assert!(tracker.accept(&SignToken::new("ram"), 0.9, 3.6).advanced);
    }

    #[test]
    fn out_of_range_step_restarts_from_first_sign() {
        let mut tracker = tracker(&["ram", "snake"]);
        tracker.progress.current_step = 7;
        assert_eq!(tracker.target(), Some(&SignToken::new("ram")));
        assert!(!tracker.accept(&SignToken::new("snake"), 0.9, 0.0).advanced);
        assert_eq!(tracker.progress().current_step, 0);
        assert!(tracker.accept(&SignToken::new("ram"), 0.9, 0.1).advanced);
        assert_eq!(tracker.target(), Some(&SignToken::new("snake")));
    }
}
