//! Per-participant progress engine
//!
//! [`ProgressTracker`] owns one participant's step, lab and quest state. Every
//! mutation is idempotent and reports whether anything changed, so the caller
//! emits exactly one event per first-time completion.

use crate::error::AccessError;
use crate::lab_state::{apply_change, LabChange};
use labsync_model::{
    FlagId, LabDefinition, LabNumber, LabState, ParticipantId, ParticipantProgress, QuestDefinition,
    QuestId, QuestProgress, StepId, Timestamp, WorkshopMode,
};
use labsync_store::{keys, LocalStore, LocalStoreExt};
use std::collections::BTreeSet;
use tracing::debug;

/// Result of a step completion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step was already done; nothing changed
    AlreadyDone,
    /// First completion of the step
    Completed {
        /// Help was used on the step before completion
        assisted: bool,
        /// The lab was started by this completion
        lab_started: bool,
        /// Every required step of the lab is now done
        lab_completed: bool,
    },
}

/// Result of a flag capture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// Flag was not captured before
    pub newly_captured: bool,
    /// Quests whose completion became true with this capture
    pub completed_quests: Vec<QuestId>,
}

/// One participant's progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressTracker {
    progress: ParticipantProgress,
    quests: QuestProgress,
}

impl ProgressTracker {
    /// Fresh tracker
    #[must_use]
    pub fn new(participant: ParticipantId) -> Self {
        Self {
            progress: ParticipantProgress::new(participant.clone()),
            quests: QuestProgress::new(participant),
        }
    }

    /// Restore from the local store, starting fresh when nothing is stored
    #[must_use]
    pub fn load(store: &dyn LocalStore, participant: &ParticipantId) -> Self {
        let progress = store
            .load_or_log::<ParticipantProgress>(&keys::participant(participant, keys::PROGRESS))
            .unwrap_or_else(|| ParticipantProgress::new(participant.clone()));
        let quests = store
            .load_or_log::<QuestProgress>(&keys::participant(participant, keys::COMPLETED_QUESTS))
            .unwrap_or_else(|| QuestProgress::new(participant.clone()));
        Self { progress, quests }
    }

    /// Write every record under its stable key; failures are logged
    pub fn persist(&self, store: &dyn LocalStore) {
        let id = &self.progress.participant_id;
        store.save_or_log(&keys::participant(id, keys::PROGRESS), &self.progress);
        store.save_or_log(
            &keys::participant(id, keys::COMPLETED_LABS),
            &self.progress.completed_labs,
        );
        store.save_or_log(
            &keys::participant(id, keys::LAB_START_TIMES),
            &self.progress.lab_start_times,
        );
        store.save_or_log(
            &keys::participant(id, keys::CAPTURED_FLAGS),
            &self.quests.captured_flags,
        );
        store.save_or_log(&keys::participant(id, keys::COMPLETED_QUESTS), &self.quests);
    }

    /// Write the step-completion set of one lab
    pub fn persist_lab(&self, store: &dyn LocalStore, lab: &LabDefinition) {
        let done: Vec<&StepId> = lab
            .steps
            .iter()
            .map(|s| &s.id)
            .filter(|id| self.progress.is_step_done(id))
            .collect();
        store.save_or_log(
            &keys::participant(&self.progress.participant_id, &keys::lab_step_state(lab.number)),
            &done,
        );
    }

    /// Owner
    #[inline]
    #[must_use]
    pub fn participant(&self) -> &ParticipantId {
        &self.progress.participant_id
    }

    /// Step, lab and score state
    #[inline]
    #[must_use]
    pub fn progress(&self) -> &ParticipantProgress {
        &self.progress
    }

    /// Flag and quest state
    #[inline]
    #[must_use]
    pub fn quests(&self) -> &QuestProgress {
        &self.quests
    }

    /// Current score
    #[inline]
    #[must_use]
    pub fn score(&self) -> u64 {
        self.progress.score
    }

    /// Finished labs
    #[inline]
    #[must_use]
    pub fn completed_labs(&self) -> &BTreeSet<LabNumber> {
        &self.progress.completed_labs
    }

    /// Lifecycle state of `lab`
    #[inline]
    #[must_use]
    pub fn lab_state(&self, lab: LabNumber) -> LabState {
        self.progress.lab_state(lab)
    }

    /// Start a lab; later calls keep the first timestamp
    ///
    /// Returns `Ok(true)` when this call started the lab.
    ///
    /// # Errors
    /// Never fails for labs that are not started; starting a completed lab is
    /// absorbed as a no-op.
    pub fn start_lab(&mut self, lab: LabNumber, now: Timestamp) -> Result<bool, AccessError> {
        match self.progress.lab_state(lab) {
            LabState::NotStarted => {
                apply_change(LabState::NotStarted, LabChange::Start)?;
                Ok(self.progress.start_lab(lab, now))
            }
            LabState::InProgress | LabState::Completed => {
                debug!(participant = %self.participant(), lab = lab.value(), "lab already started");
                Ok(false)
            }
        }
    }

    /// Help was used on this step before completion
    #[must_use]
    pub fn used_help(&self, step: &StepId) -> bool {
        self.progress.hints_revealed(step) > 0 || self.progress.revealed_solutions.contains(step)
    }

    /// Complete a step of `lab`
    ///
    /// The completion counts as assisted when `assisted` is set or help was used
    /// on the step earlier. The lab is started implicitly, and completed once every
    /// step required in `mode` is done.
    ///
    /// # Errors
    /// [`AccessError::UnknownStep`] when the step is not part of `lab`
    pub fn complete_step(
        &mut self,
        lab: &LabDefinition,
        step: &StepId,
        mode: WorkshopMode,
        assisted: bool,
        now: Timestamp,
    ) -> Result<StepOutcome, AccessError> {
        if lab.step(step).is_none() {
            return Err(AccessError::UnknownStep(step.clone()));
        }
        if self.progress.is_step_done(step) {
            return Ok(StepOutcome::AlreadyDone);
        }
        let assisted = assisted || self.used_help(step);
        self.progress.record_step(step.clone(), assisted);
        let lab_started = self.start_lab(lab.number, now)?;
        let lab_completed = self.try_complete_lab(lab, mode)?;
        Ok(StepOutcome::Completed {
            assisted,
            lab_started,
            lab_completed,
        })
    }

    /// Mark the lab completed when every step required in `mode` is done
    ///
    /// Returns `true` only on the transition into `Completed`.
    fn try_complete_lab(&mut self, lab: &LabDefinition, mode: WorkshopMode) -> Result<bool, AccessError> {
        let state = self.progress.lab_state(lab.number);
        if state == LabState::Completed {
            return Ok(false);
        }
        let mut required = lab.required_steps(mode).peekable();
        if required.peek().is_none() {
            return Ok(false);
        }
        if !required.all(|s| self.progress.is_step_done(&s.id)) {
            return Ok(false);
        }
        apply_change(state, LabChange::Finish)?;
        self.progress.completed_labs.insert(lab.number);
        Ok(true)
    }

    /// Record a captured flag and recompute quest completion
    pub fn capture_flag(&mut self, flag: &FlagId, quests: &[&QuestDefinition]) -> CaptureOutcome {
        if !self.quests.capture(flag.clone()) {
            return CaptureOutcome::default();
        }
        let mut completed_quests = Vec::new();
        for quest in quests {
            if self.quests.is_quest_completed(quest)
                && self.quests.completed_quests.insert(quest.id.clone())
            {
                completed_quests.push(quest.id.clone());
            }
        }
        CaptureOutcome {
            newly_captured: true,
            completed_quests,
        }
    }

    /// Is the quest completed right now, from captured flags alone
    #[must_use]
    pub fn is_quest_completed(&self, quest: &QuestDefinition) -> bool {
        self.quests.is_quest_completed(quest)
    }

    /// Reveal hint `index` of a step; `false` when that index was already revealed
    pub fn reveal_hint(&mut self, step: &StepId, index: u32) -> bool {
        self.progress.reveal_hint(step.clone(), index)
    }

    /// Reveal a step's solution; `false` when already revealed
    pub fn reveal_solution(&mut self, step: &StepId) -> bool {
        self.progress.reveal_solution(step.clone())
    }

    /// Apply a point delta, clamped at zero; returns the applied delta
    pub fn apply_points(&mut self, delta: i64) -> i64 {
        self.progress.apply_delta(delta)
    }

    /// Forget one lab and remove its persisted step record
    pub fn reset_lab(&mut self, lab: &LabDefinition, store: &dyn LocalStore) {
        self.progress.clear_lab(lab.number, lab.steps.iter().map(|s| &s.id));
        store.remove_or_log(&keys::participant(
            &self.progress.participant_id,
            &keys::lab_step_state(lab.number),
        ));
        self.persist(store);
    }

    /// Forget everything and remove every persisted record of this participant
    pub fn reset(&mut self, labs: &[&LabDefinition], store: &dyn LocalStore) {
        let id = self.progress.participant_id.clone();
        for key in [
            keys::PROGRESS,
            keys::COMPLETED_LABS,
            keys::LAB_START_TIMES,
            keys::CAPTURED_FLAGS,
            keys::COMPLETED_QUESTS,
        ] {
            store.remove_or_log(&keys::participant(&id, key));
        }
        for lab in labs {
            store.remove_or_log(&keys::participant(&id, &keys::lab_step_state(lab.number)));
        }
        *self = Self::new(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labsync_model::StepDefinition;
    use labsync_store::MemoryLocalStore;

    fn lab() -> LabDefinition {
        LabDefinition::new("lab-1", LabNumber(1), "Basics")
            .with_step(StepDefinition::new("a", "A"))
            .with_step(StepDefinition::new("b", "B"))
            .with_step(StepDefinition::new("c", "Lab only").with_modes([WorkshopMode::Lab]))
    }

    fn tracker() -> ProgressTracker {
        ProgressTracker::new(ParticipantId::new("p"))
    }

    #[test]
    fn completing_twice_is_a_noop() {
        let mut t = tracker();
        let lab = lab();
        let first = t
            .complete_step(&lab, &StepId::new("a"), WorkshopMode::Lab, false, 10)
            .unwrap();
        assert!(matches!(first, StepOutcome::Completed { lab_started: true, .. }));
        let second = t
            .complete_step(&lab, &StepId::new("a"), WorkshopMode::Lab, true, 20)
            .unwrap();
        assert_eq!(second, StepOutcome::AlreadyDone);
        assert_eq!(t.progress().steps_done(), 1);
        assert_eq!(t.progress().lab_start_times[&LabNumber(1)], 10);
    }

    #[test]
    fn lab_completes_only_with_mode_steps() {
        let lab = lab();
        let mut demo = tracker();
        demo.complete_step(&lab, &StepId::new("a"), WorkshopMode::Demo, false, 0)
            .unwrap();
        let out = demo
            .complete_step(&lab, &StepId::new("b"), WorkshopMode::Demo, false, 0)
            .unwrap();
        assert!(matches!(out, StepOutcome::Completed { lab_completed: true, .. }));

        let mut full = tracker();
        for step in ["a", "b"] {
            full.complete_step(&lab, &StepId::new(step), WorkshopMode::Lab, false, 0)
                .unwrap();
        }
        assert_eq!(full.lab_state(LabNumber(1)), LabState::InProgress);
        let out = full
            .complete_step(&lab, &StepId::new("c"), WorkshopMode::Lab, false, 0)
            .unwrap();
        assert!(matches!(out, StepOutcome::Completed { lab_completed: true, .. }));
        assert_eq!(full.lab_state(LabNumber(1)), LabState::Completed);
    }

    #[test]
    fn hint_before_completion_makes_it_assisted() {
        let mut t = tracker();
        assert!(t.reveal_hint(&StepId::new("a"), 0));
        assert!(!t.reveal_hint(&StepId::new("a"), 0));
        assert!(t.reveal_hint(&StepId::new("a"), 1));
        let out = t
            .complete_step(&lab(), &StepId::new("a"), WorkshopMode::Lab, false, 0)
            .unwrap();
        assert!(matches!(out, StepOutcome::Completed { assisted: true, .. }));
        assert!(t.progress().assisted_steps.contains(&StepId::new("a")));
    }

    #[test]
    fn unknown_step_is_rejected() {
        let err = tracker()
            .complete_step(&lab(), &StepId::new("zzz"), WorkshopMode::Lab, false, 0)
            .unwrap_err();
        assert_eq!(err, AccessError::UnknownStep(StepId::new("zzz")));
    }

    #[test]
    fn quest_completes_on_last_required_flag() {
        let quest = QuestDefinition::new("q", "Q")
            .with_required(["A", "B"])
            .with_optional(["C"]);
        let quests = [&quest];
        let mut t = tracker();
        assert!(t.capture_flag(&FlagId::new("A"), &quests).completed_quests.is_empty());
        assert!(t.capture_flag(&FlagId::new("C"), &quests).completed_quests.is_empty());
        assert!(!t.is_quest_completed(&quest));
        let out = t.capture_flag(&FlagId::new("B"), &quests);
        assert_eq!(out.completed_quests, vec![QuestId::new("q")]);
        let again = t.capture_flag(&FlagId::new("B"), &quests);
        assert!(!again.newly_captured);
    }

    #[test]
    fn persisted_progress_reloads_and_reset_lab_removes_record() {
        let store = MemoryLocalStore::new();
        let lab = lab();
        let mut t = tracker();
        t.complete_step(&lab, &StepId::new("a"), WorkshopMode::Lab, false, 5)
            .unwrap();
        t.persist(&store);
        t.persist_lab(&store, &lab);
        let step_key = keys::participant(t.participant(), &keys::lab_step_state(LabNumber(1)));
        assert!(store.get(&step_key).unwrap().is_some());

        let mut reloaded = ProgressTracker::load(&store, &ParticipantId::new("p"));
        assert_eq!(reloaded, t);

        reloaded.reset_lab(&lab, &store);
        assert_eq!(reloaded.lab_state(LabNumber(1)), LabState::NotStarted);
        assert!(store.get(&step_key).unwrap().is_none());
    }
}
