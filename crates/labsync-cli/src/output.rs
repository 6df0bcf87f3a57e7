//! Report rendering

use labsync_core::{FailurePoint, MetricsSummary};
use labsync_model::{LeaderboardEntry, WorkshopSession};
use serde::Serialize;
use std::fmt;

/// Everything `simulate` and `report` print
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Report {
    pub(crate) session: WorkshopSession,
    pub(crate) leaderboard: Vec<LeaderboardEntry>,
    pub(crate) summary: MetricsSummary,
    pub(crate) failure_points: Vec<FailurePoint>,
}

impl Report {
    pub(crate) fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn minutes(ms: u64) -> u64 {
    ms / 60_000
}

fn percent(rate: Option<f64>) -> String {
    rate.map_or_else(|| "-".to_string(), |r| format!("{:.0}%", r * 100.0))
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.session;
        writeln!(
            f,
            "Workshop {} ({}, {}, {} mode)",
            s.id, s.customer_name, s.workshop_date, s.mode
        )?;

        writeln!(f, "\nLeaderboard")?;
        writeln!(
            f,
            "  {:>3}  {:<32} {:>6} {:>5} {:>6} {:>6} {:>9}",
            "#", "participant", "score", "labs", "hints", "sols", "time(min)"
        )?;
        for (rank, row) in self.leaderboard.iter().enumerate() {
            let total: u64 = row.lab_times.values().sum();
            writeln!(
                f,
                "  {:>3}  {:<32} {:>6} {:>5} {:>6} {:>6} {:>9}",
                rank + 1,
                row.participant_id.as_str(),
                row.score,
                row.completed_lab_count(),
                row.hints_used,
                row.solutions_revealed,
                minutes(total)
            )?;
        }

        let m = &self.summary;
        writeln!(f, "\nSummary")?;
        writeln!(f, "  participants          {}", m.total_participants)?;
        writeln!(f, "  labs started          {}", m.labs_started)?;
        writeln!(f, "  labs completed        {}", m.labs_completed)?;
        writeln!(f, "  steps completed       {}", m.steps_completed)?;
        writeln!(f, "  flags captured        {}", m.flags_captured)?;
        writeln!(f, "  quests completed      {}", m.quests_completed)?;
        writeln!(f, "  failed checks         {}", m.verification_failures)?;
        writeln!(f, "  completion rate       {}", percent(m.completion_rate))?;
        if let Some(avg) = m.average_time_to_lab_start_ms {
            writeln!(f, "  avg time to lab start {:.1} min", avg / 60_000.0)?;
        }

        if !self.failure_points.is_empty() {
            writeln!(f, "\nFailure points")?;
            for point in &self.failure_points {
                writeln!(
                    f,
                    "  {:<24} {:>3}  {}",
                    point.step_id.as_str(),
                    point.count,
                    point.last_error.as_deref().unwrap_or("")
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labsync_model::{LabNumber, ParticipantId, StepId};
    use pretty_assertions::assert_eq;

    fn report() -> Report {
        let date = WorkshopSession::parse_date("2026-03-04").unwrap();
        let session = WorkshopSession::new("Acme", date, 0);
        let mut row = LeaderboardEntry::new(ParticipantId::new("ada@example.com"), 0);
        row.score = 40;
        row.completed_labs.push(LabNumber(1));
        row.lab_times.insert(LabNumber(1), 600_000);
        Report {
            summary: MetricsSummary {
                workshop_id: session.id.clone(),
                started_at: Some(0),
                total_participants: 1,
                labs_started: 1,
                labs_completed: 1,
                steps_completed: 4,
                quests_completed: 0,
                flags_captured: 0,
                verification_failures: 1,
                average_time_to_lab_start_ms: Some(120_000.0),
                completion_rate: Some(1.0),
            },
            session,
            leaderboard: vec![row],
            failure_points: vec![FailurePoint {
                step_id: StepId::new("lab1-verify"),
                count: 1,
                last_error: Some("Field is stored in plaintext".into()),
            }],
        }
    }

    #[test]
    fn text_lists_rows_and_failures() {
        let text = report().to_string();
        assert!(text.contains("Acme, 2026-03-04, lab mode"));
        let row = text.lines().find(|l| l.contains("ada@example.com")).unwrap();
        let cells: Vec<&str> = row.split_whitespace().collect();
        assert_eq!(cells, vec!["1", "ada@example.com", "40", "1", "0", "0", "10"]);
        assert!(text.contains("completion rate       100%"));
        assert!(text.contains("avg time to lab start 2.0 min"));
        assert!(text.contains("Field is stored in plaintext"));
    }

    #[test]
    fn json_uses_camel_case_keys() {
        let value: serde_json::Value = serde_json::from_str(&report().to_json().unwrap()).unwrap();
        assert_eq!(value["failurePoints"][0]["stepId"], "lab1-verify");
        assert_eq!(value["leaderboard"][0]["participantId"], "ada@example.com");
        assert_eq!(value["summary"]["totalParticipants"], 1);
        assert!(value["session"]["id"].as_str().is_some_and(|id| id.starts_with("ws_")));
    }

    #[test]
    fn missing_rate_prints_a_dash() {
        assert_eq!(percent(None), "-");
        assert_eq!(percent(Some(0.25)), "25%");
    }
}
