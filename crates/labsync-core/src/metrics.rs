//! Metrics recorder
//!
//! Append-only analytics sink. Recording never blocks on I/O beyond the local
//! store and never fails the caller. Nothing here feeds back into progress.

use indexmap::IndexMap;
use labsync_model::{MetricsEvent, MetricsEventKind, ParticipantId, SessionId, StepId, Timestamp};
use labsync_store::{keys, LocalStore, LocalStoreExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::trace;

/// Where participants stall
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePoint {
    /// Step that failed
    pub step_id: StepId,
    /// Failed checks on the step
    pub count: usize,
    /// Most recent non-empty error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Aggregates for one workshop run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    /// Session the numbers cover
    pub workshop_id: SessionId,
    /// From the `workshop_started` event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    /// Leaderboard rows
    pub total_participants: usize,
    /// `lab_started` events
    pub labs_started: usize,
    /// `lab_completed` events
    pub labs_completed: usize,
    /// `step_completed` events
    pub steps_completed: usize,
    /// `quest_completed` events
    pub quests_completed: usize,
    /// `flag_captured` events
    pub flags_captured: usize,
    /// `verification_failed` events
    pub verification_failures: usize,
    /// Mean time from workshop start to each lab start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_time_to_lab_start_ms: Option<f64>,
    /// Participants with a completed lab over participants with any event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_rate: Option<f64>,
}

/// Bounded, persisted event log
#[derive(Debug)]
pub struct MetricsRecorder {
    events: Mutex<VecDeque<MetricsEvent>>,
    capacity: usize,
    local: Arc<dyn LocalStore>,
}

impl MetricsRecorder {
    /// Load the persisted log, keeping at most `capacity` newest events
    #[must_use]
    pub fn load(local: Arc<dyn LocalStore>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut events: VecDeque<MetricsEvent> = local
            .load_or_log::<Vec<MetricsEvent>>(keys::METRICS_EVENTS)
            .unwrap_or_default()
            .into();
        while events.len() > capacity {
            events.pop_front();
        }
        Self {
            events: Mutex::new(events),
            capacity,
            local,
        }
    }

    /// Append an event, dropping the oldest beyond capacity
    pub fn record(&self, event: MetricsEvent) {
        ::metrics::counter!("labsync_events_total", "type" => event.kind.as_str()).increment(1);
        trace!(kind = %event.kind, participant = ?event.participant_id, "metrics event");

        let mut events = self.events.lock();
        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
        }
        self.local.save_or_log(keys::METRICS_EVENTS, &*events);
    }

    /// Snapshot of the log, oldest first
    #[must_use]
    pub fn events(&self) -> Vec<MetricsEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Retained events
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// No events retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drop every event
    pub fn clear(&self) {
        self.events.lock().clear();
        self.local.remove_or_log(keys::METRICS_EVENTS);
    }

    /// Participants with at least one completed lab over participants with any event
    ///
    /// `None` when no participant has recorded anything.
    #[must_use]
    pub fn completion_rate(&self) -> Option<f64> {
        completion_rate(self.events.lock().iter())
    }

    /// `verification_failed` counts per step, most failures first
    #[must_use]
    pub fn failure_points(&self) -> Vec<FailurePoint> {
        let events = self.events.lock();
        let mut by_step: IndexMap<StepId, FailurePoint> = IndexMap::new();
        for event in events.iter().filter(|e| e.kind == MetricsEventKind::VerificationFailed) {
            let Some(step) = &event.step_id else {
                continue;
            };
            let point = by_step.entry(step.clone()).or_insert_with(|| FailurePoint {
                step_id: step.clone(),
                count: 0,
                last_error: None,
            });
            point.count += 1;
            if let Some(message) = event.error_message.as_ref().filter(|m| !m.is_empty()) {
                point.last_error = Some(message.clone());
            }
        }
        let mut points: Vec<FailurePoint> = by_step.into_values().collect();
        points.sort_by(|a, b| b.count.cmp(&a.count));
        points
    }

    /// Aggregates over the events tagged with `workshop_id`
    #[must_use]
    pub fn summary(&self, workshop_id: &SessionId) -> MetricsSummary {
        let events = self.events.lock();
        let scoped: Vec<&MetricsEvent> = events
            .iter()
            .filter(|e| e.workshop_id.as_ref() == Some(workshop_id))
            .collect();
        let count = |kind: MetricsEventKind| scoped.iter().filter(|e| e.kind == kind).count();

        let started_at = scoped
            .iter()
            .find(|e| e.kind == MetricsEventKind::WorkshopStarted)
            .map(|e| e.timestamp);
        let participants: HashSet<&ParticipantId> =
            scoped.iter().filter_map(|e| e.participant_id.as_ref()).collect();
        let distinct_labs = |kind: MetricsEventKind| {
            scoped
                .iter()
                .filter(|e| e.kind == kind)
                .filter_map(|e| Some((e.participant_id.as_ref()?, e.lab?)))
                .collect::<HashSet<_>>()
                .len()
        };
        let lab_starts: Vec<Timestamp> = scoped
            .iter()
            .filter(|e| e.kind == MetricsEventKind::LabStarted)
            .map(|e| e.timestamp)
            .collect();
        #[allow(clippy::cast_precision_loss)]
        let average_time_to_lab_start_ms = started_at.filter(|_| !lab_starts.is_empty()).map(|start| {
            let total: i64 = lab_starts.iter().map(|ts| ts - start).sum();
            total as f64 / lab_starts.len() as f64
        });

        MetricsSummary {
            workshop_id: workshop_id.clone(),
            started_at,
            total_participants: participants.len(),
            labs_started: distinct_labs(MetricsEventKind::LabStarted),
            labs_completed: distinct_labs(MetricsEventKind::LabCompleted),
            steps_completed: count(MetricsEventKind::StepCompleted),
            quests_completed: count(MetricsEventKind::QuestCompleted),
            flags_captured: count(MetricsEventKind::FlagCaptured),
            verification_failures: count(MetricsEventKind::VerificationFailed),
            average_time_to_lab_start_ms,
            completion_rate: completion_rate(scoped.iter().copied()),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn completion_rate<'a>(events: impl Iterator<Item = &'a MetricsEvent>) -> Option<f64> {
    let mut active: HashSet<&ParticipantId> = HashSet::new();
    let mut finished: HashSet<&ParticipantId> = HashSet::new();
    for event in events {
        let Some(p) = event.participant_id.as_ref() else {
            continue;
        };
        active.insert(p);
        if event.kind == MetricsEventKind::LabCompleted {
            finished.insert(p);
        }
    }
    (!active.is_empty()).then(|| finished.len() as f64 / active.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use labsync_model::LabNumber;
    use labsync_store::MemoryLocalStore;
    use pretty_assertions::assert_eq;

    fn recorder(capacity: usize) -> MetricsRecorder {
        MetricsRecorder::load(Arc::new(MemoryLocalStore::new()), capacity)
    }

    fn failure(step: &str, message: &str, at: Timestamp) -> MetricsEvent {
        MetricsEvent::new(MetricsEventKind::VerificationFailed, at)
            .with_participant(ParticipantId::new("p"))
            .with_step(StepId::new(step))
            .with_failure("verify-kms", message)
    }

    #[test]
    fn capacity_drops_oldest() {
        let r = recorder(3);
        for at in 0..5 {
            r.record(MetricsEvent::new(MetricsEventKind::StepCompleted, at));
        }
        let stamps: Vec<Timestamp> = r.events().iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![2, 3, 4]);
    }

    #[test]
    fn completion_rate_counts_participants() {
        let r = recorder(100);
        assert_eq!(r.completion_rate(), None);
        for p in ["a", "b", "c", "d"] {
            r.record(MetricsEvent::new(MetricsEventKind::LabStarted, 0).with_participant(ParticipantId::new(p)));
        }
        r.record(
            MetricsEvent::new(MetricsEventKind::LabCompleted, 1)
                .with_participant(ParticipantId::new("a"))
                .with_lab(LabNumber(1)),
        );
        assert_eq!(r.completion_rate(), Some(0.25));
    }

    #[test]
    fn failure_points_group_and_keep_latest_message() {
        let r = recorder(100);
        r.record(failure("s1", "alias not found", 1));
        r.record(failure("s2", "timeout", 2));
        r.record(failure("s2", "", 3));
        r.record(failure("s1", "wrong profile", 4));
        r.record(failure("s1", "still wrong", 5));
        let points = r.failure_points();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].step_id, StepId::new("s1"));
        assert_eq!(points[0].count, 3);
        assert_eq!(points[0].last_error.as_deref(), Some("still wrong"));
        assert_eq!(points[1].last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn summary_is_scoped_to_workshop() {
        let r = recorder(100);
        let ws = SessionId::generate();
        let other = SessionId::generate();
        let p = ParticipantId::new("p");
        r.record(MetricsEvent::new(MetricsEventKind::WorkshopStarted, 1_000).with_workshop(ws.clone()));
        r.record(
            MetricsEvent::new(MetricsEventKind::LabStarted, 61_000)
                .with_workshop(ws.clone())
                .with_participant(p.clone())
                .with_lab(LabNumber(1)),
        );
        r.record(
            MetricsEvent::new(MetricsEventKind::StepCompleted, 70_000)
                .with_workshop(ws.clone())
                .with_participant(p.clone()),
        );
        r.record(
            MetricsEvent::new(MetricsEventKind::StepCompleted, 70_000)
                .with_workshop(other)
                .with_participant(p),
        );
        let s = r.summary(&ws);
        assert_eq!(s.started_at, Some(1_000));
        assert_eq!(s.total_participants, 1);
        assert_eq!(s.labs_started, 1);
        assert_eq!(s.steps_completed, 1);
        assert_eq!(s.average_time_to_lab_start_ms, Some(60_000.0));
        assert_eq!(s.completion_rate, Some(0.0));
    }

    #[test]
    fn log_is_persisted_and_reloaded() {
        let local: Arc<dyn LocalStore> = Arc::new(MemoryLocalStore::new());
        let r = MetricsRecorder::load(Arc::clone(&local), 10);
        r.record(MetricsEvent::new(MetricsEventKind::FlagCaptured, 9));
        let reloaded = MetricsRecorder::load(local, 10);
        assert_eq!(reloaded.len(), 1);
        reloaded.clear();
        assert!(reloaded.is_empty());
    }
}
