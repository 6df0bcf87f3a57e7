//! Stable local store keys
//!
//! Key names match what the browser client writes so an exported cache can be
//! loaded as-is.

use labsync_model::{LabNumber, ParticipantId};

/// Current workshop session
pub const SESSION: &str = "workshop_session";
/// Leaderboard rows
pub const LEADERBOARD: &str = "workshop_leaderboard";
/// Append-only analytics log
pub const METRICS_EVENTS: &str = "workshop_metrics_events";
/// Completed lab numbers
pub const COMPLETED_LABS: &str = "completedLabs";
/// Lab number to first start timestamp
pub const LAB_START_TIMES: &str = "labStartTimes";
/// Captured flag ids
pub const CAPTURED_FLAGS: &str = "captured_flags";
/// Announced quest completions
pub const COMPLETED_QUESTS: &str = "completed_quests";
/// Full participant progress record
pub const PROGRESS: &str = "participant_progress";

/// Step completion set of one lab
#[must_use]
pub fn lab_step_state(lab: LabNumber) -> String {
    format!("lab{lab}-step-state")
}

/// Scope a per-participant key
///
/// Several participants can share one store in simulations, so participant-owned
/// records are prefixed with the participant id.
#[must_use]
pub fn participant(participant: &ParticipantId, key: &str) -> String {
    format!("{participant}:{key}")
}
