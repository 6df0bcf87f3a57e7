//! Per-participant progress records

use crate::catalog::QuestDefinition;
use crate::clock::Timestamp;
use crate::ids::{FlagId, LabNumber, ParticipantId, QuestId, StepId};
use crate::leaderboard::clamp_score;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Lifecycle of one lab for one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabState {
    /// No step done yet
    NotStarted,
    /// Some steps done
    InProgress,
    /// Every step done
    Completed,
}

/// Step, lab and score state owned by one participant's instance
///
/// A step id is in at most one of `completed_steps` / `assisted_steps`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantProgress {
    /// Owner of this record
    pub participant_id: ParticipantId,
    /// Unassisted completions in completion order
    #[serde(default)]
    pub completed_steps: IndexSet<StepId>,
    /// Completions after help was used
    #[serde(default)]
    pub assisted_steps: IndexSet<StepId>,
    /// Labs whose every step is done
    #[serde(default)]
    pub completed_labs: BTreeSet<LabNumber>,
    /// First step time per lab
    #[serde(default)]
    pub lab_start_times: BTreeMap<LabNumber, Timestamp>,
    /// Running score, never negative
    #[serde(default)]
    pub score: u64,
    /// Hint indices already revealed (and penalised) per step
    #[serde(default)]
    pub revealed_hints: BTreeMap<StepId, BTreeSet<u32>>,
    /// Steps whose solution was revealed (and penalised)
    #[serde(default)]
    pub revealed_solutions: BTreeSet<StepId>,
}

impl ParticipantProgress {
    /// Empty progress
    #[must_use]
    pub fn new(participant_id: ParticipantId) -> Self {
        Self {
            participant_id,
            completed_steps: IndexSet::new(),
            assisted_steps: IndexSet::new(),
            completed_labs: BTreeSet::new(),
            lab_start_times: BTreeMap::new(),
            score: 0,
            revealed_hints: BTreeMap::new(),
            revealed_solutions: BTreeSet::new(),
        }
    }

    /// Whether the step has been completed, assisted or not
    #[inline]
    #[must_use]
    pub fn is_step_done(&self, step: &StepId) -> bool {
        self.completed_steps.contains(step) || self.assisted_steps.contains(step)
    }

    /// Record a step completion
    ///
    /// Returns `false` (and changes nothing) when the step was already done.
    pub fn record_step(&mut self, step: StepId, assisted: bool) -> bool {
        if self.is_step_done(&step) {
            return false;
        }
        if assisted {
            self.assisted_steps.insert(step);
        } else {
            self.completed_steps.insert(step);
        }
        true
    }

    /// Number of steps done in total
    #[inline]
    #[must_use]
    pub fn steps_done(&self) -> usize {
        self.completed_steps.len() + self.assisted_steps.len()
    }

    /// Record the first start of a lab; later calls keep the original timestamp
    ///
    /// Returns `true` when this call started the lab.
    pub fn start_lab(&mut self, lab: LabNumber, now: Timestamp) -> bool {
        if self.lab_start_times.contains_key(&lab) {
            return false;
        }
        self.lab_start_times.insert(lab, now);
        true
    }

    /// Current lifecycle state of a lab
    #[must_use]
    pub fn lab_state(&self, lab: LabNumber) -> LabState {
        if self.completed_labs.contains(&lab) {
            LabState::Completed
        } else if self.lab_start_times.contains_key(&lab) {
            LabState::InProgress
        } else {
            LabState::NotStarted
        }
    }

    /// Apply a signed point delta, clamping at zero; returns the applied delta
    pub fn apply_delta(&mut self, delta: i64) -> i64 {
        let before = self.score;
        self.score = clamp_score(self.score, delta);
        i64::try_from(self.score).unwrap_or(i64::MAX) - i64::try_from(before).unwrap_or(i64::MAX)
    }

    /// Mark a hint index as revealed; `false` if it was already revealed
    pub fn reveal_hint(&mut self, step: StepId, index: u32) -> bool {
        self.revealed_hints.entry(step).or_default().insert(index)
    }

    /// Hints already revealed for a step
    #[must_use]
    pub fn hints_revealed(&self, step: &StepId) -> usize {
        self.revealed_hints.get(step).map_or(0, BTreeSet::len)
    }

    /// Mark a step's solution as revealed; `false` if it was already revealed
    pub fn reveal_solution(&mut self, step: StepId) -> bool {
        self.revealed_solutions.insert(step)
    }

    /// Forget everything about one lab's steps and completion
    pub fn clear_lab<'a>(&mut self, lab: LabNumber, steps: impl IntoIterator<Item = &'a StepId>) {
        for step in steps {
            self.completed_steps.shift_remove(step);
            self.assisted_steps.shift_remove(step);
            self.revealed_hints.remove(step);
            self.revealed_solutions.remove(step);
        }
        self.completed_labs.remove(&lab);
        self.lab_start_times.remove(&lab);
    }
}

/// Challenge-mode progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestProgress {
    /// Owner of this record
    pub participant_id: ParticipantId,
    /// Captured flags in capture order
    #[serde(default)]
    pub captured_flags: IndexSet<FlagId>,
    /// Quests whose completion has already been announced
    #[serde(default)]
    pub completed_quests: IndexSet<QuestId>,
}

impl QuestProgress {
    /// Empty quest progress
    #[must_use]
    pub fn new(participant_id: ParticipantId) -> Self {
        Self {
            participant_id,
            captured_flags: IndexSet::new(),
            completed_quests: IndexSet::new(),
        }
    }

    /// Record a captured flag; `false` if already captured
    pub fn capture(&mut self, flag: FlagId) -> bool {
        self.captured_flags.insert(flag)
    }

    /// Completion predicate, recomputed from captured flags every time
    #[inline]
    #[must_use]
    pub fn is_quest_completed(&self, quest: &QuestDefinition) -> bool {
        quest.is_completed_by(&self.captured_flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress() -> ParticipantProgress {
        ParticipantProgress::new(ParticipantId::new("p"))
    }

    #[test]
    fn step_lands_in_exactly_one_set() {
        let mut p = progress();
        assert!(p.record_step(StepId::new("s1"), true));
        assert!(!p.record_step(StepId::new("s1"), false));
        assert!(p.assisted_steps.contains(&StepId::new("s1")));
        assert!(!p.completed_steps.contains(&StepId::new("s1")));
        assert_eq!(p.steps_done(), 1);
    }

    #[test]
    fn lab_start_is_idempotent() {
        let mut p = progress();
        assert_eq!(p.lab_state(LabNumber(2)), LabState::NotStarted);
        assert!(p.start_lab(LabNumber(2), 100));
        assert!(!p.start_lab(LabNumber(2), 900));
        assert_eq!(p.lab_start_times[&LabNumber(2)], 100);
        assert_eq!(p.lab_state(LabNumber(2)), LabState::InProgress);
    }

    #[test]
    fn clear_lab_removes_only_that_lab() {
        let mut p = progress();
        p.record_step(StepId::new("lab1-a"), false);
        p.record_step(StepId::new("lab2-a"), false);
        p.completed_labs.insert(LabNumber(1));
        p.start_lab(LabNumber(1), 0);
        p.clear_lab(LabNumber(1), &[StepId::new("lab1-a")]);
        assert_eq!(p.lab_state(LabNumber(1)), LabState::NotStarted);
        assert!(p.is_step_done(&StepId::new("lab2-a")));
        assert!(!p.is_step_done(&StepId::new("lab1-a")));
    }

    #[test]
    fn hint_reveal_counted_once_per_index() {
        let mut p = progress();
        assert!(p.reveal_hint(StepId::new("s"), 0));
        assert!(!p.reveal_hint(StepId::new("s"), 0));
        assert!(p.reveal_hint(StepId::new("s"), 1));
        assert_eq!(p.hints_revealed(&StepId::new("s")), 2);
    }
}
