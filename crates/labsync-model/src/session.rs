//! Workshop session record
//!
//! Exactly one session is current at a time. A session is superseded (never
//! mutated into a new workshop) when the facilitator starts a fresh run.

use crate::clock::Timestamp;
use crate::error::ModelError;
use crate::ids::{LabId, QuestId, SessionId, TemplateId};
use crate::leaderboard::LeaderboardEntry;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Delivery mode of the workshop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkshopMode {
    /// Facilitator walks through content
    Demo,
    /// Participants complete guided labs
    #[default]
    Lab,
    /// Participants capture flags in quests
    Challenge,
}

impl WorkshopMode {
    /// All modes in declaration order
    pub const ALL: [Self; 3] = [Self::Demo, Self::Lab, Self::Challenge];

    /// Stable lowercase label
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Lab => "lab",
            Self::Challenge => "challenge",
        }
    }
}

impl fmt::Display for WorkshopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkshopMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ModelError::UnknownMode(s.to_string()))
    }
}

/// Which data store participants' lab actions target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MongoSource {
    /// Participant-local database
    #[default]
    Local,
    /// Shared hosted cluster, requires a connection string
    Atlas,
}

/// Optional facilitator-entered metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorDetails {
    /// Language the labs are run in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub programming_language: Option<String>,
    /// Customer-side champion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_champion_name: Option<String>,
    /// Champion contact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_champion_email: Option<String>,
    /// Database the customer runs today
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_database: Option<String>,
    /// Workload the workshop targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_name: Option<String>,
}

/// Frozen leaderboard of a superseded session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedLeaderboard {
    /// Session the rows came from
    pub session_id: SessionId,
    /// Customer label of that session
    pub customer_name: String,
    /// Date of that session
    pub workshop_date: NaiveDate,
    /// Rows at the time of archiving
    pub entries: Vec<LeaderboardEntry>,
}

/// The single active workshop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkshopSession {
    /// `ws_`-prefixed run id
    pub id: SessionId,
    /// Customer label
    pub customer_name: String,
    /// Calendar date of the run
    pub workshop_date: NaiveDate,
    /// Start of the run
    pub started_at: Timestamp,
    /// Gate for participant lab access
    pub labs_enabled: bool,
    /// Where lab databases live
    #[serde(default)]
    pub mongodb_source: MongoSource,
    /// Shared cluster for `atlas` sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atlas_connection_string: Option<String>,
    /// Demo, lab or challenge
    #[serde(default)]
    pub mode: WorkshopMode,
    /// Template the session was built from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<TemplateId>,
    /// Labs in this run
    #[serde(default)]
    pub lab_ids: Vec<LabId>,
    /// Quests in this run
    #[serde(default)]
    pub quest_ids: Vec<QuestId>,
    /// Leaderboards of superseded runs, oldest first
    #[serde(default)]
    pub archived_leaderboards: Vec<ArchivedLeaderboard>,
    /// Optional metadata, flattened on the wire
    #[serde(default, flatten)]
    pub facilitator: FacilitatorDetails,
}

impl WorkshopSession {
    /// Create a session with a fresh id and labs disabled
    #[must_use]
    pub fn new(customer_name: impl Into<String>, workshop_date: NaiveDate, started_at: Timestamp) -> Self {
        Self {
            id: SessionId::generate(),
            customer_name: customer_name.into(),
            workshop_date,
            started_at,
            labs_enabled: false,
            mongodb_source: MongoSource::Local,
            atlas_connection_string: None,
            mode: WorkshopMode::Lab,
            template_id: None,
            lab_ids: Vec::new(),
            quest_ids: Vec::new(),
            archived_leaderboards: Vec::new(),
            facilitator: FacilitatorDetails::default(),
        }
    }

    /// Parse a `YYYY-MM-DD` workshop date label
    ///
    /// # Errors
    /// Returns [`ModelError::InvalidDate`] for any other format
    pub fn parse_date(label: &str) -> Result<NaiveDate, ModelError> {
        NaiveDate::parse_from_str(label.trim(), "%Y-%m-%d")
            .map_err(|_| ModelError::InvalidDate(label.to_string()))
    }

    /// With data store target
    #[must_use]
    pub fn with_source(mut self, source: MongoSource, connection_string: Option<String>) -> Self {
        self.mongodb_source = source;
        self.atlas_connection_string = connection_string;
        self.normalize();
        self
    }

    /// With workshop mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: WorkshopMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enforce field-level invariants
    ///
    /// A local-source session never stores a remote connection string, and a blank
    /// connection string is treated as absent.
    pub fn normalize(&mut self) {
        if self.mongodb_source == MongoSource::Local {
            self.atlas_connection_string = None;
        }
        if self
            .atlas_connection_string
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            self.atlas_connection_string = None;
        }
        if let Some(s) = self.atlas_connection_string.as_mut() {
            let trimmed = s.trim();
            if trimmed.len() != s.len() {
                *s = trimmed.to_string();
            }
        }
    }

    /// Is the session in challenge mode
    #[inline]
    #[must_use]
    pub fn is_challenge(&self) -> bool {
        self.mode == WorkshopMode::Challenge
    }
}

/// Partial update merged onto the cached session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    /// New customer label
    pub customer_name: Option<String>,
    /// New date
    pub workshop_date: Option<NaiveDate>,
    /// Open or close lab access
    pub labs_enabled: Option<bool>,
    /// New database source
    pub mongodb_source: Option<MongoSource>,
    /// New shared cluster
    pub atlas_connection_string: Option<String>,
    /// New mode
    pub mode: Option<WorkshopMode>,
    /// New template
    pub template_id: Option<TemplateId>,
    /// New lab list
    pub lab_ids: Option<Vec<LabId>>,
    /// New quest list
    pub quest_ids: Option<Vec<QuestId>>,
    /// New metadata
    pub facilitator: Option<FacilitatorDetails>,
}

impl SessionPatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle participant lab access
    #[inline]
    #[must_use]
    pub fn labs_enabled(mut self, enabled: bool) -> Self {
        self.labs_enabled = Some(enabled);
        self
    }

    /// Switch data store target
    #[inline]
    #[must_use]
    pub fn source(mut self, source: MongoSource, connection_string: Option<String>) -> Self {
        self.mongodb_source = Some(source);
        self.atlas_connection_string = connection_string;
        self
    }

    /// Change workshop mode
    #[inline]
    #[must_use]
    pub fn mode(mut self, mode: WorkshopMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Change customer label
    #[inline]
    #[must_use]
    pub fn customer_name(mut self, name: impl Into<String>) -> Self {
        self.customer_name = Some(name.into());
        self
    }

    /// Check whether the patch changes anything
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge onto `session`, leaving unspecified fields untouched
    pub fn apply(self, session: &mut WorkshopSession) {
        if let Some(v) = self.customer_name {
            session.customer_name = v;
        }
        if let Some(v) = self.workshop_date {
            session.workshop_date = v;
        }
        if let Some(v) = self.labs_enabled {
            session.labs_enabled = v;
        }
        if let Some(v) = self.mongodb_source {
            session.mongodb_source = v;
        }
        if let Some(v) = self.atlas_connection_string {
            session.atlas_connection_string = Some(v);
        }
        if let Some(v) = self.mode {
            session.mode = v;
        }
        if let Some(v) = self.template_id {
            session.template_id = Some(v);
        }
        if let Some(v) = self.lab_ids {
            session.lab_ids = v;
        }
        if let Some(v) = self.quest_ids {
            session.quest_ids = v;
        }
        if let Some(v) = self.facilitator {
            session.facilitator = v;
        }
        session.normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date() -> NaiveDate {
        WorkshopSession::parse_date("2026-03-14").unwrap()
    }

    #[test]
    fn switching_back_to_local_drops_connection_string() {
        let mut session = WorkshopSession::new("Acme", date(), 0);
        SessionPatch::new()
            .source(MongoSource::Atlas, Some("mongodb+srv://u:p@c0.example.net".into()))
            .apply(&mut session);
        assert_eq!(
            session.atlas_connection_string.as_deref(),
            Some("mongodb+srv://u:p@c0.example.net")
        );

        SessionPatch::new()
            .source(MongoSource::Local, None)
            .apply(&mut session);
        assert_eq!(session.mongodb_source, MongoSource::Local);
        assert_eq!(session.atlas_connection_string, None);
    }

    #[test]
    fn patch_leaves_unrelated_fields() {
        let mut session = WorkshopSession::new("Acme", date(), 7).with_mode(WorkshopMode::Challenge);
        let id = session.id.clone();
        SessionPatch::new().labs_enabled(true).apply(&mut session);
        assert!(session.labs_enabled);
        assert_eq!(session.mode, WorkshopMode::Challenge);
        assert_eq!(session.id, id);
        assert_eq!(session.started_at, 7);
    }

    #[test]
    fn blank_connection_string_is_absent() {
        let session = WorkshopSession::new("Acme", date(), 0)
            .with_source(MongoSource::Atlas, Some("   ".into()));
        assert_eq!(session.atlas_connection_string, None);
    }

    #[test]
    fn serializes_camel_case_with_flattened_details() {
        let mut session = WorkshopSession::new("Acme", date(), 0);
        session.facilitator.programming_language = Some("python".into());
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["customerName"], "Acme");
        assert_eq!(json["workshopDate"], "2026-03-14");
        assert_eq!(json["mongodbSource"], "local");
        assert_eq!(json["programmingLanguage"], "python");

        let back: WorkshopSession = serde_json::from_value(json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Challenge".parse::<WorkshopMode>().unwrap(), WorkshopMode::Challenge);
        assert!("quiz".parse::<WorkshopMode>().is_err());
    }

    #[test]
    fn bad_date_is_rejected() {
        assert!(matches!(
            WorkshopSession::parse_date("14/03/2026"),
            Err(ModelError::InvalidDate(_))
        ));
    }
}
