//! Leaderboard row

use crate::clock::Timestamp;
use crate::ids::{LabNumber, ParticipantId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregated per-participant standing
///
/// Each participant only ever writes their own row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// Row owner; `email` on older records
    #[serde(alias = "email")]
    pub participant_id: ParticipantId,
    /// Total points
    pub score: u64,
    /// Finished labs, ascending
    #[serde(default)]
    pub completed_labs: Vec<LabNumber>,
    /// Cumulative time spent per lab, in milliseconds
    #[serde(default)]
    pub lab_times: BTreeMap<LabNumber, u64>,
    /// Last write by the owner
    pub last_active: Timestamp,
    /// Hints revealed across all steps
    #[serde(default)]
    pub hints_used: u32,
    /// Solutions revealed across all steps
    #[serde(default)]
    pub solutions_revealed: u32,
    /// Accounting mark per open lab: time already folded into `lab_times`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lab_clock_marks: BTreeMap<LabNumber, Timestamp>,
}

impl LeaderboardEntry {
    /// Fresh row with zero score
    #[must_use]
    pub fn new(participant_id: ParticipantId, now: Timestamp) -> Self {
        Self {
            participant_id,
            score: 0,
            completed_labs: Vec::new(),
            lab_times: BTreeMap::new(),
            last_active: now,
            hints_used: 0,
            solutions_revealed: 0,
            lab_clock_marks: BTreeMap::new(),
        }
    }

    /// Apply a signed point delta, clamping at zero
    ///
    /// Returns the delta actually applied.
    pub fn apply_delta(&mut self, delta: i64) -> i64 {
        let before = self.score;
        self.score = clamp_score(self.score, delta);
        // both values fit in i64 for any realistic score
        i64::try_from(self.score).unwrap_or(i64::MAX) - i64::try_from(before).unwrap_or(i64::MAX)
    }

    /// Number of completed labs, the ranking tie-breaker
    #[inline]
    #[must_use]
    pub fn completed_lab_count(&self) -> usize {
        self.completed_labs.len()
    }

    /// Record a lab as completed (idempotent)
    pub fn mark_lab_completed(&mut self, lab: LabNumber) -> bool {
        if self.completed_labs.contains(&lab) {
            return false;
        }
        self.completed_labs.push(lab);
        true
    }

    /// Begin accounting time for a lab if it is not already open
    pub fn open_lab(&mut self, lab: LabNumber, now: Timestamp) {
        self.lab_times.entry(lab).or_insert(0);
        self.lab_clock_marks.entry(lab).or_insert(now);
    }

    /// Fold time since the lab's mark into `lab_times` and move the mark to `now`
    ///
    /// Returns the milliseconds added; zero when the lab is not open.
    pub fn accrue_lab_time(&mut self, lab: LabNumber, now: Timestamp) -> u64 {
        let Some(mark) = self.lab_clock_marks.get_mut(&lab) else {
            return 0;
        };
        let elapsed = u64::try_from(now.saturating_sub(*mark)).unwrap_or(0);
        *mark = now.max(*mark);
        *self.lab_times.entry(lab).or_insert(0) += elapsed;
        elapsed
    }

    /// Accrue outstanding time and stop accounting for the lab
    pub fn close_lab(&mut self, lab: LabNumber, now: Timestamp) -> u64 {
        let added = self.accrue_lab_time(lab, now);
        self.lab_clock_marks.remove(&lab);
        added
    }

    /// Labs currently being timed
    pub fn open_labs(&self) -> impl Iterator<Item = LabNumber> + '_ {
        self.lab_clock_marks.keys().copied()
    }

    /// Cumulative milliseconds recorded for a lab
    #[inline]
    #[must_use]
    pub fn lab_time_ms(&self, lab: LabNumber) -> u64 {
        self.lab_times.get(&lab).copied().unwrap_or(0)
    }
}

/// Add a signed delta to an unsigned score without going below zero
#[inline]
#[must_use]
pub(crate) fn clamp_score(score: u64, delta: i64) -> u64 {
    if delta >= 0 {
        score.saturating_add(delta.unsigned_abs())
    } else {
        score.saturating_sub(delta.unsigned_abs())
    }
}
