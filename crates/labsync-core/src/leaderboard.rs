//! Leaderboard aggregator
//!
//! One row per participant, created lazily and never deleted within a session.
//! Lab time is accounted with a per-lab mark: heartbeats and completion both add
//! only the time since the mark, so nothing is counted twice.

use indexmap::IndexMap;
use labsync_model::{
    GamificationEvent, GamificationEventKind, LabNumber, LeaderboardEntry, ParticipantId, Timestamp,
};
use labsync_store::{keys, LocalStore, LocalStoreExt, RemoteError, RemoteStore, SyncHandle};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Ranked, shared leaderboard with single-writer rows
#[derive(Debug)]
pub struct Leaderboard {
    rows: RwLock<IndexMap<ParticipantId, LeaderboardEntry>>,
    /// Rows this instance writes; remote refreshes never overwrite them
    owned: RwLock<HashSet<ParticipantId>>,
    local: Arc<dyn LocalStore>,
    sync: Option<SyncHandle>,
}

impl Leaderboard {
    /// Load rows from the local store
    #[must_use]
    pub fn load(local: Arc<dyn LocalStore>, sync: Option<SyncHandle>) -> Self {
        let rows: IndexMap<ParticipantId, LeaderboardEntry> = local
            .load_or_log::<Vec<LeaderboardEntry>>(keys::LEADERBOARD)
            .unwrap_or_default()
            .into_iter()
            .map(|e| (e.participant_id.clone(), e))
            .collect();
        Self {
            rows: RwLock::new(rows),
            owned: RwLock::new(HashSet::new()),
            local,
            sync,
        }
    }

    fn persist(&self, rows: &IndexMap<ParticipantId, LeaderboardEntry>) {
        let entries: Vec<&LeaderboardEntry> = rows.values().collect();
        self.local.save_or_log(keys::LEADERBOARD, &entries);
    }

    /// Mutate one participant's row, creating it on first use
    fn with_row<R>(&self, participant: &ParticipantId, now: Timestamp, f: impl FnOnce(&mut LeaderboardEntry) -> R) -> R {
        let mut rows = self.rows.write();
        let row = rows
            .entry(participant.clone())
            .or_insert_with(|| LeaderboardEntry::new(participant.clone(), now));
        row.last_active = row.last_active.max(now);
        let out = f(row);
        let snapshot = row.clone();
        self.persist(&rows);
        drop(rows);

        self.owned.write().insert(participant.clone());
        if let Some(sync) = &self.sync {
            sync.push_leaderboard_entry(snapshot);
        }
        out
    }

    /// Apply a scored event to the participant's row
    ///
    /// `delta` is the scorer's output; the row clamps at zero.
    pub fn upsert(&self, event: &GamificationEvent, delta: i64) -> LeaderboardEntry {
        let now = event.timestamp;
        self.with_row(&event.participant_id, now, |row| {
            row.apply_delta(delta);
            match (event.kind, event.lab) {
                (GamificationEventKind::LabCompleted, Some(lab)) => {
                    row.mark_lab_completed(lab);
                    let added = row.close_lab(lab, now);
                    info!(
                        participant = %row.participant_id,
                        lab = lab.value(),
                        total_ms = row.lab_time_ms(lab),
                        added_ms = added,
                        "lab time closed"
                    );
                }
                (GamificationEventKind::StepCompleted, Some(lab)) if !row.completed_labs.contains(&lab) => {
                    row.open_lab(lab, now);
                }
                (GamificationEventKind::HintRevealed, _) => row.hints_used += 1,
                (GamificationEventKind::SolutionRevealed, _) => row.solutions_revealed += 1,
                _ => {}
            }
            row.clone()
        })
    }

    /// Begin timing a lab; an open lab keeps its mark
    pub fn start_lab(&self, participant: &ParticipantId, lab: LabNumber, now: Timestamp) {
        self.with_row(participant, now, |row| {
            if !row.completed_labs.contains(&lab) {
                row.open_lab(lab, now);
            }
        });
    }

    /// Add elapsed time to every open lab and refresh `last_active`
    ///
    /// Returns the milliseconds added across labs. Participants without a row are
    /// ignored.
    pub fn heartbeat(&self, participant: &ParticipantId, now: Timestamp) -> u64 {
        if !self.rows.read().contains_key(participant) {
            debug!(participant = %participant, "heartbeat without leaderboard row ignored");
            return 0;
        }
        self.with_row(participant, now, |row| {
            let open: Vec<LabNumber> = row.open_labs().collect();
            open.into_iter().map(|lab| row.accrue_lab_time(lab, now)).sum()
        })
    }

    /// Row for a participant
    #[must_use]
    pub fn entry(&self, participant: &ParticipantId) -> Option<LeaderboardEntry> {
        self.rows.read().get(participant).cloned()
    }

    /// Rows ordered by score desc, then completed-lab count desc; ties keep
    /// encounter order
    #[must_use]
    pub fn ranked_view(&self) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self.rows.read().values().cloned().collect();
        rank(&mut entries);
        entries
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// No rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Remove every row, returning them ranked
    pub fn drain(&self) -> Vec<LeaderboardEntry> {
        let mut rows = self.rows.write();
        let mut entries: Vec<LeaderboardEntry> = rows.drain(..).map(|(_, e)| e).collect();
        self.persist(&rows);
        drop(rows);
        self.owned.write().clear();
        rank(&mut entries);
        entries
    }

    /// Zero a participant's row in place
    ///
    /// Rows are never deleted within a session; a progress reset leaves a fresh row.
    pub fn reset_participant(&self, participant: &ParticipantId, now: Timestamp) {
        if !self.rows.read().contains_key(participant) {
            return;
        }
        self.with_row(participant, now, |row| {
            *row = LeaderboardEntry::new(participant.clone(), now);
        });
    }

    /// Forget one lab's completion and timing for a participant
    pub fn reset_lab(&self, participant: &ParticipantId, lab: LabNumber, now: Timestamp) {
        if !self.rows.read().contains_key(participant) {
            return;
        }
        self.with_row(participant, now, |row| {
            row.completed_labs.retain(|l| *l != lab);
            row.lab_times.remove(&lab);
            row.lab_clock_marks.remove(&lab);
        });
    }

    /// Replace rows owned by other instances with the remote copies
    ///
    /// A row this instance wrote since start-up is never overwritten. A row
    /// loaded from the local store is only replaced by a remote copy at least as
    /// recent; when the local copy is newer it is pushed again instead.
    ///
    /// # Errors
    /// Returns the remote error; local rows are untouched in that case
    pub async fn refresh_from_remote(&self, remote: &dyn RemoteStore) -> Result<usize, RemoteError> {
        let fetched = remote.fetch_leaderboard().await?;
        let owned = self.owned.read().clone();
        let mut rows = self.rows.write();
        let mut replaced = 0;
        let mut stale = Vec::new();
        for entry in fetched {
            if owned.contains(&entry.participant_id) {
                continue;
            }
            match rows.get(&entry.participant_id) {
                Some(local) if local.last_active > entry.last_active => stale.push(local.clone()),
                _ => {
                    rows.insert(entry.participant_id.clone(), entry);
                    replaced += 1;
                }
            }
        }
        self.persist(&rows);
        drop(rows);

        if let Some(sync) = &self.sync {
            for entry in stale {
                debug!(participant = %entry.participant_id, "remote row older than local, pushing again");
                sync.push_leaderboard_entry(entry);
            }
        }
        debug!(replaced, "leaderboard refreshed from remote");
        Ok(replaced)
    }
}

/// Stable sort by (score desc, completed labs desc)
pub fn rank(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.completed_lab_count().cmp(&a.completed_lab_count()))
    });
}
