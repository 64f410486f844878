use std::collections::HashSet;
use tracing::info;

use crate::catalog::{ComboPart, EffectKind};

use super::tracker::AcceptOutcome;

/// Sub-effect start requested when a run first reaches a combo step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComboTrigger {
    pub name: String,
    pub effect_kind: EffectKind,
    pub at_step: usize,
}

/// Watches step crossings of one jutsu run and fires each combo part once.
#[derive(Debug, Clone, Default)]
pub struct ComboResolver {
    parts: Vec<ComboPart>,
    fired: HashSet<usize>,
}

impl ComboResolver {
    pub fn new(parts: Vec<ComboPart>) -> Self {
        Self {
            parts,
            fired: HashSet::new(),
        }
    }

    pub fn has_parts(&self) -> bool {
        !self.parts.is_empty()
    }

    pub fn observe(&mut self, outcome: &AcceptOutcome) -> Vec<ComboTrigger> {
        let mut triggers = Vec::new();
        if outcome.advanced {
            for part in &self.parts {
                if part.at_step == outcome.reached_step && self.fired.insert(part.at_step) {
                    info!("Combo part {} reached at step {}", part.name, part.at_step);
                    triggers.push(ComboTrigger {
                        name: part.name.clone(),
                        effect_kind: part.effect_kind.clone(),
                        at_step: part.at_step,
                    });
                }
            }
        }
        if outcome.completed {
            self.fired.clear();
        }
        triggers
    }

    /// Names of the parts already fired in the current run.
    pub fn fired_parts(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter(|part| self.fired.contains(&part.at_step))
            .map(|part| part.name.as_str())
            .collect()
    }

    pub fn reset(&mut self) {
        self.fired.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{common::SignToken, sequence::tracker::SequenceTracker};

    fn combo_tracker() -> (SequenceTracker, ComboResolver) {
        let signs = ["ram", "snake", "tiger", "ox", "hare", "monkey"];
        let tracker = SequenceTracker::new(signs.iter().map(|s| SignToken::new(s)).collect(), 0.5);
        let resolver = ComboResolver::new(vec![
            ComboPart {
                name: "clone".to_string(),
                at_step: 3,
                effect_kind: EffectKind::Clone,
            },
            ComboPart {
                name: "finale".to_string(),
                at_step: 6,
                effect_kind: EffectKind::Eye,
            },
        ]);
        (tracker, resolver)
    }

    #[test]
    fn each_step_fires_once_despite_rejected_labels() {
        let (mut tracker, mut resolver) = combo_tracker();
        let stream = [
            "ram", "snake", "tiger", "tiger", "idle", "tiger", "dog", "ox", "tiger", "hare",
        ];
        let mut fired = Vec::new();
        for (i, label) in stream.iter().enumerate() {
            let outcome = tracker.accept(&SignToken::new(label), 0.9, i as f64);
            fired.extend(resolver.observe(&outcome));
        }
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].name, "clone");
        assert_eq!(fired[0].effect_kind, EffectKind::Clone);
        assert_eq!(resolver.fired_parts(), vec!["clone"]);
    }

    #[test]
    fn final_step_part_fires_on_completion_then_rearms() {
        let (mut tracker, mut resolver) = combo_tracker();
        let signs = ["ram", "snake", "tiger", "ox", "hare", "monkey"];
        let mut fired = Vec::new();
        for (i, label) in signs.iter().enumerate() {
            let outcome = tracker.accept(&SignToken::new(label), 0.9, i as f64);
            fired.extend(resolver.observe(&outcome).into_iter().map(|t| t.name));
        }
        assert_eq!(fired, vec!["clone", "finale"]);
        assert!(resolver.fired_parts().is_empty());

        tracker.finish_effect();
        let mut again = Vec::new();
        for (i, label) in signs.iter().enumerate() {
            let outcome = tracker.accept(&SignToken::new(label), 0.9, 10.0 + i as f64);
            again.extend(resolver.observe(&outcome).into_iter().map(|t| t.name));
        }
        assert_eq!(again, vec!["clone", "finale"]);
    }
}
