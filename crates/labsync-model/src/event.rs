//! Progress and metrics events
//!
//! Both event kinds are immutable facts. A [`GamificationEvent`] feeds the scorer and
//! leaderboard; a [`MetricsEvent`] is appended to the analytics log and never read back
//! by the progress engine.

use crate::clock::Timestamp;
use crate::ids::{FlagId, LabNumber, ParticipantId, QuestId, SessionId, StepId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Scored event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamificationEventKind {
    /// First completion of a step
    StepCompleted,
    /// First capture of a flag
    FlagCaptured,
    /// All required flags of a quest captured
    QuestCompleted,
    /// Last step of a lab completed
    LabCompleted,
    /// Hint shown for the first time
    HintRevealed,
    /// Solution shown for the first time
    SolutionRevealed,
}

impl GamificationEventKind {
    /// Penalty events subtract points
    #[inline]
    #[must_use]
    pub fn is_penalty(self) -> bool {
        matches!(self, Self::HintRevealed | Self::SolutionRevealed)
    }
}

/// A first-time progress fact for one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamificationEvent {
    /// Event type, `type` on the wire
    #[serde(rename = "type")]
    pub kind: GamificationEventKind,
    /// Who the event belongs to
    pub participant_id: ParticipantId,
    /// Lab of the step, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab: Option<LabNumber>,
    /// Step for step, hint and solution events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    /// Quest for flag and quest events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quest_id: Option<QuestId>,
    /// Flag for capture events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_id: Option<FlagId>,
    /// Completion after a hint or solution was shown
    #[serde(default)]
    pub assisted: bool,
    /// Zero-based hint index for `hint_revealed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint_index: Option<u32>,
    /// When it happened
    pub timestamp: Timestamp,
}

impl GamificationEvent {
    fn bare(kind: GamificationEventKind, participant_id: ParticipantId, timestamp: Timestamp) -> Self {
        Self {
            kind,
            participant_id,
            lab: None,
            step_id: None,
            quest_id: None,
            flag_id: None,
            assisted: false,
            hint_index: None,
            timestamp,
        }
    }

    /// Step completion
    #[must_use]
    pub fn step_completed(
        participant_id: ParticipantId,
        lab: LabNumber,
        step_id: StepId,
        assisted: bool,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            lab: Some(lab),
            step_id: Some(step_id),
            assisted,
            ..Self::bare(GamificationEventKind::StepCompleted, participant_id, timestamp)
        }
    }

    /// Lab completion
    #[must_use]
    pub fn lab_completed(participant_id: ParticipantId, lab: LabNumber, timestamp: Timestamp) -> Self {
        Self {
            lab: Some(lab),
            ..Self::bare(GamificationEventKind::LabCompleted, participant_id, timestamp)
        }
    }

    /// Flag capture
    #[must_use]
    pub fn flag_captured(
        participant_id: ParticipantId,
        quest_id: QuestId,
        flag_id: FlagId,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            quest_id: Some(quest_id),
            flag_id: Some(flag_id),
            ..Self::bare(GamificationEventKind::FlagCaptured, participant_id, timestamp)
        }
    }

    /// Quest completion
    #[must_use]
    pub fn quest_completed(participant_id: ParticipantId, quest_id: QuestId, timestamp: Timestamp) -> Self {
        Self {
            quest_id: Some(quest_id),
            ..Self::bare(GamificationEventKind::QuestCompleted, participant_id, timestamp)
        }
    }

    /// Hint reveal at `index`
    #[must_use]
    pub fn hint_revealed(
        participant_id: ParticipantId,
        lab: Option<LabNumber>,
        step_id: StepId,
        hint_index: u32,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            lab,
            step_id: Some(step_id),
            hint_index: Some(hint_index),
            ..Self::bare(GamificationEventKind::HintRevealed, participant_id, timestamp)
        }
    }

    /// Solution reveal
    #[must_use]
    pub fn solution_revealed(
        participant_id: ParticipantId,
        lab: Option<LabNumber>,
        step_id: StepId,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            lab,
            step_id: Some(step_id),
            ..Self::bare(GamificationEventKind::SolutionRevealed, participant_id, timestamp)
        }
    }
}

/// Analytics event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsEventKind {
    /// Facilitator started a run
    WorkshopStarted,
    /// First step of a lab touched
    LabStarted,
    /// Lab finished
    LabCompleted,
    /// Step finished
    StepCompleted,
    /// First flag of a quest touched
    QuestStarted,
    /// Quest finished
    QuestCompleted,
    /// Flag captured
    FlagCaptured,
    /// Hint shown
    HintRevealed,
    /// Solution shown
    SolutionRevealed,
    /// Oracle rejected a check
    VerificationFailed,
    /// Facilitator closed the run
    WorkshopCompleted,
}

impl MetricsEventKind {
    /// Stable snake_case label, used as the counter tag
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WorkshopStarted => "workshop_started",
            Self::LabStarted => "lab_started",
            Self::LabCompleted => "lab_completed",
            Self::StepCompleted => "step_completed",
            Self::QuestStarted => "quest_started",
            Self::QuestCompleted => "quest_completed",
            Self::FlagCaptured => "flag_captured",
            Self::HintRevealed => "hint_revealed",
            Self::SolutionRevealed => "solution_revealed",
            Self::VerificationFailed => "verification_failed",
            Self::WorkshopCompleted => "workshop_completed",
        }
    }
}

impl fmt::Display for MetricsEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<GamificationEventKind> for MetricsEventKind {
    fn from(kind: GamificationEventKind) -> Self {
        match kind {
            GamificationEventKind::StepCompleted => Self::StepCompleted,
            GamificationEventKind::FlagCaptured => Self::FlagCaptured,
            GamificationEventKind::QuestCompleted => Self::QuestCompleted,
            GamificationEventKind::LabCompleted => Self::LabCompleted,
            GamificationEventKind::HintRevealed => Self::HintRevealed,
            GamificationEventKind::SolutionRevealed => Self::SolutionRevealed,
        }
    }
}

/// One entry in the append-only analytics log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsEvent {
    /// Event type, `type` on the wire
    #[serde(rename = "type")]
    pub kind: MetricsEventKind,
    /// When it happened
    pub timestamp: Timestamp,
    /// Session the event belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workshop_id: Option<SessionId>,
    /// Participant, absent for facilitator events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<ParticipantId>,
    /// Lab involved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab: Option<LabNumber>,
    /// Step involved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    /// Quest involved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quest_id: Option<QuestId>,
    /// Flag involved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_id: Option<FlagId>,
    /// Check that failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_id: Option<String>,
    /// Oracle message of a failed check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Free-form extras
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl MetricsEvent {
    /// Event with only kind and time set
    #[must_use]
    pub fn new(kind: MetricsEventKind, timestamp: Timestamp) -> Self {
        Self {
            kind,
            timestamp,
            workshop_id: None,
            participant_id: None,
            lab: None,
            step_id: None,
            quest_id: None,
            flag_id: None,
            verification_id: None,
            error_message: None,
            metadata: BTreeMap::new(),
        }
    }

    /// With owning workshop
    #[inline]
    #[must_use]
    pub fn with_workshop(mut self, id: SessionId) -> Self {
        self.workshop_id = Some(id);
        self
    }

    /// With participant
    #[inline]
    #[must_use]
    pub fn with_participant(mut self, id: ParticipantId) -> Self {
        self.participant_id = Some(id);
        self
    }

    /// With lab
    #[inline]
    #[must_use]
    pub fn with_lab(mut self, lab: LabNumber) -> Self {
        self.lab = Some(lab);
        self
    }

    /// With step
    #[inline]
    #[must_use]
    pub fn with_step(mut self, step: StepId) -> Self {
        self.step_id = Some(step);
        self
    }

    /// With the failing check and its message
    #[must_use]
    pub fn with_failure(mut self, verification_id: impl Into<String>, message: impl Into<String>) -> Self {
        self.verification_id = Some(verification_id.into());
        self.error_message = Some(message.into());
        self
    }

    /// With one metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl From<&GamificationEvent> for MetricsEvent {
    fn from(event: &GamificationEvent) -> Self {
        let mut metrics = Self::new(event.kind.into(), event.timestamp)
            .with_participant(event.participant_id.clone());
        metrics.lab = event.lab;
        metrics.step_id.clone_from(&event.step_id);
        metrics.quest_id.clone_from(&event.quest_id);
        metrics.flag_id.clone_from(&event.flag_id);
        if event.assisted {
            metrics = metrics.with_metadata("assisted", serde_json::Value::Bool(true));
        }
        metrics
    }
}
