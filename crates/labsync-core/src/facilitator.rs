//! Facilitator session lifecycle
//!
//! Only this flow writes the workshop session. Starting a new workshop
//! supersedes the current session: its leaderboard is archived onto the new
//! record and a fresh session id is generated.

use crate::catalog::ContentCatalog;
use crate::environment::validate_connection_string;
use crate::error::{ConfigError, LabSyncError};
use crate::leaderboard::Leaderboard;
use crate::metrics::MetricsRecorder;
use chrono::{DateTime, NaiveDate, Utc};
use labsync_model::{
    ArchivedLeaderboard, Clock, FacilitatorDetails, LabId, MetricsEvent, MetricsEventKind, MongoSource,
    QuestId, SessionPatch, TemplateId, Timestamp, WorkshopMode, WorkshopSession,
};
use labsync_store::SessionStore;
use std::sync::Arc;
use tracing::info;

const DEFAULT_CUSTOMER: &str = "Workshop";

/// Settings for a new workshop run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkshopOptions {
    /// Customer label; a placeholder when blank
    pub customer_name: String,
    /// Defaults to today
    pub workshop_date: Option<NaiveDate>,
    /// Defaults to the template's mode, then lab mode
    pub mode: Option<WorkshopMode>,
    /// Where lab databases live
    pub mongodb_source: MongoSource,
    /// Shared cluster for `atlas` sessions
    pub atlas_connection_string: Option<String>,
    /// Template to build the session from
    pub template_id: Option<TemplateId>,
    /// Defaults to the template's labs
    pub lab_ids: Vec<LabId>,
    /// Defaults to the template's quests
    pub quest_ids: Vec<QuestId>,
    /// Optional metadata
    pub facilitator: FacilitatorDetails,
}

impl WorkshopOptions {
    /// Options for `customer_name`, everything else defaulted
    #[must_use]
    pub fn new(customer_name: impl Into<String>) -> Self {
        Self {
            customer_name: customer_name.into(),
            ..Self::default()
        }
    }

    /// Set the date
    #[inline]
    #[must_use]
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.workshop_date = Some(date);
        self
    }

    /// Set the mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: WorkshopMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Use a shared cluster
    #[inline]
    #[must_use]
    pub fn with_atlas(mut self, connection_string: impl Into<String>) -> Self {
        self.mongodb_source = MongoSource::Atlas;
        self.atlas_connection_string = Some(connection_string.into());
        self
    }

    /// Set the template
    #[inline]
    #[must_use]
    pub fn with_template(mut self, template: impl Into<TemplateId>) -> Self {
        self.template_id = Some(template.into());
        self
    }

    /// Set the labs explicitly
    #[inline]
    #[must_use]
    pub fn with_labs(mut self, labs: impl IntoIterator<Item = impl Into<LabId>>) -> Self {
        self.lab_ids = labs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the quests explicitly
    #[inline]
    #[must_use]
    pub fn with_quests(mut self, quests: impl IntoIterator<Item = impl Into<QuestId>>) -> Self {
        self.quest_ids = quests.into_iter().map(Into::into).collect();
        self
    }

    /// Set the metadata
    #[inline]
    #[must_use]
    pub fn with_details(mut self, details: FacilitatorDetails) -> Self {
        self.facilitator = details;
        self
    }
}

/// Facilitator-side operations on the shared session
#[derive(Debug, Clone)]
pub struct Facilitator {
    sessions: Arc<dyn SessionStore>,
    leaderboard: Arc<Leaderboard>,
    metrics: Arc<MetricsRecorder>,
    catalog: Arc<dyn ContentCatalog>,
    clock: Arc<dyn Clock>,
}

impl Facilitator {
    /// Facilitator over shared engine parts
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        leaderboard: Arc<Leaderboard>,
        metrics: Arc<MetricsRecorder>,
        catalog: Arc<dyn ContentCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            leaderboard,
            metrics,
            catalog,
            clock,
        }
    }

    fn today(now: Timestamp) -> NaiveDate {
        DateTime::<Utc>::from_timestamp_millis(now).map_or_else(|| Utc::now().date_naive(), |t| t.date_naive())
    }

    /// The current session, if any
    #[must_use]
    pub fn current(&self) -> Option<WorkshopSession> {
        self.sessions.read()
    }

    /// Supersede the current session with a fresh one
    ///
    /// The previous leaderboard is archived when a session exists and the
    /// leaderboard has rows; the leaderboard is cleared either way. Labs are
    /// enabled on the new session.
    ///
    /// # Errors
    /// Configuration errors for an unknown template or a missing/malformed
    /// connection string; nothing is changed in that case
    pub fn start_new_workshop(&self, options: WorkshopOptions) -> Result<WorkshopSession, LabSyncError> {
        let template = match &options.template_id {
            Some(id) => Some(
                self.catalog
                    .template(id)
                    .ok_or_else(|| ConfigError::UnknownTemplate(id.clone()))?,
            ),
            None => None,
        };
        if options.mongodb_source == MongoSource::Atlas {
            let uri = options
                .atlas_connection_string
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or(ConfigError::MissingConnectionString)?;
            validate_connection_string(uri)?;
        }

        let now = self.clock.now_ms();
        let previous = self.sessions.read();
        let mut archived = previous
            .as_ref()
            .map(|s| s.archived_leaderboards.clone())
            .unwrap_or_default();
        let entries = self.leaderboard.drain();
        if let Some(prev) = previous.as_ref().filter(|_| !entries.is_empty()) {
            info!(session = %prev.id, rows = entries.len(), "archiving leaderboard");
            archived.push(ArchivedLeaderboard {
                session_id: prev.id.clone(),
                customer_name: prev.customer_name.clone(),
                workshop_date: prev.workshop_date,
                entries,
            });
        }

        let customer = if options.customer_name.trim().is_empty() {
            DEFAULT_CUSTOMER.to_string()
        } else {
            options.customer_name
        };
        let date = options.workshop_date.unwrap_or_else(|| Self::today(now));
        let mode = options
            .mode
            .or_else(|| template.and_then(|t| t.default_mode))
            .unwrap_or_default();

        let mut session = WorkshopSession::new(customer, date, now)
            .with_mode(mode)
            .with_source(options.mongodb_source, options.atlas_connection_string);
        session.labs_enabled = true;
        session.template_id = options.template_id;
        session.lab_ids = match template {
            Some(t) if options.lab_ids.is_empty() => t.lab_ids.clone(),
            _ => options.lab_ids,
        };
        session.quest_ids = match template {
            Some(t) if options.quest_ids.is_empty() => t.quest_ids.clone(),
            _ => options.quest_ids,
        };
        session.archived_leaderboards = archived;
        session.facilitator = options.facilitator;

        self.sessions.write(session.clone());
        self.metrics.record(
            MetricsEvent::new(MetricsEventKind::WorkshopStarted, now)
                .with_workshop(session.id.clone())
                .with_metadata("customerName", session.customer_name.clone().into())
                .with_metadata("mode", session.mode.as_str().into()),
        );
        info!(session = %session.id, customer = %session.customer_name, mode = %session.mode, "workshop started");
        Ok(session)
    }

    /// Open or close labs for participants
    ///
    /// Creates a default session dated today when none exists.
    pub fn set_labs_enabled(&self, enabled: bool) -> WorkshopSession {
        if let Some(updated) = self.sessions.update(SessionPatch::new().labs_enabled(enabled)) {
            info!(session = %updated.id, enabled, "labs toggled");
            return updated;
        }
        let now = self.clock.now_ms();
        let mut session = WorkshopSession::new(DEFAULT_CUSTOMER, Self::today(now), now);
        session.labs_enabled = enabled;
        self.sessions.write(session.clone());
        info!(session = %session.id, enabled, "default session created");
        session
    }

    /// Merge facilitator edits onto the current session
    ///
    /// # Errors
    /// [`LabSyncError::NoSession`] when no session exists, configuration errors
    /// for an unknown template or a malformed connection string
    pub fn update_session(&self, patch: SessionPatch) -> Result<WorkshopSession, LabSyncError> {
        if let Some(id) = &patch.template_id {
            if self.catalog.template(id).is_none() {
                return Err(ConfigError::UnknownTemplate(id.clone()).into());
            }
        }
        if let Some(uri) = patch.atlas_connection_string.as_deref() {
            if patch.mongodb_source != Some(MongoSource::Local) && !uri.trim().is_empty() {
                validate_connection_string(uri.trim())?;
            }
        }
        self.sessions.update(patch).ok_or(LabSyncError::NoSession)
    }

    /// Leaderboards of superseded sessions, oldest first
    #[must_use]
    pub fn workshop_history(&self) -> Vec<ArchivedLeaderboard> {
        self.sessions
            .read()
            .map(|s| s.archived_leaderboards)
            .unwrap_or_default()
    }

    /// Participants with a leaderboard row in the current run
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.leaderboard.len()
    }
}
