//! Workshop engine
//!
//! Front door for participant actions. One action runs the whole pipeline:
//!
//! ```text
//! action -> oracle (if any) -> progress tracker -> scorer -> leaderboard -> metrics
//! ```
//!
//! Each participant's tracker sits behind its own mutex, so that participant's
//! events apply in trigger order. The mutex is never held across an await; oracle
//! calls happen before the tracker is touched, and a dropped call mutates nothing.

use crate::access::{is_quest_unlocked, LabAccessRules};
use crate::catalog::{session_labs, session_quests, ContentCatalog};
use crate::config::EngineConfig;
use crate::enhancement::{EnhancementRegistry, StepEnhancement};
use crate::environment::{validate_key_alias, ResolvedEnvironment};
use crate::error::{AccessError, ConfigError, LabSyncError};
use crate::facilitator::Facilitator;
use crate::leaderboard::Leaderboard;
use crate::metrics::{FailurePoint, MetricsRecorder, MetricsSummary};
use crate::progress::{ProgressTracker, StepOutcome};
use crate::scorer::{ScoreContext, Scorer};
use crate::verification::{
    CheckId, CheckOutcome, CheckParams, CleanupScope, HttpLabResourceCleaner, HttpVerificationOracle,
    InFlight, LabResourceCleaner, OfflineOracle, VerificationOracle,
};
use dashmap::DashMap;
use labsync_model::{
    Clock, FlagId, GamificationEvent, LabDefinition, LabNumber, LeaderboardEntry, MetricsEvent,
    MetricsEventKind, ParticipantId, QuestDefinition, QuestId, StepId, SystemClock, Timestamp, WorkshopSession,
};
use labsync_store::{
    CachedSessionStore, FileLocalStore, HttpRemoteStore, LocalStore, MemoryLocalStore, OfflineRemote,
    RemoteStore, SessionStore,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of a step completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// What the completion did
    pub outcome: StepOutcome,
    /// Points applied by this call, after clamping
    pub points: i64,
    /// Participant score afterwards
    pub score: u64,
}

/// Result of a flag capture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureReport {
    /// `false` for a repeat capture
    pub newly_captured: bool,
    /// Quests this capture finished
    pub completed_quests: Vec<QuestId>,
    /// Points applied, bonuses included
    pub points: i64,
    /// Participant score afterwards
    pub score: u64,
}

/// Earned badges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Achievement {
    /// At least one lab completed
    FirstLab,
    /// Every lab of the session completed
    AllLabs,
}

type TrackerCell = Arc<Mutex<ProgressTracker>>;

/// Session, progress, scoring and leaderboard engine for one instance
#[derive(Debug)]
pub struct WorkshopEngine {
    config: EngineConfig,
    catalog: Arc<dyn ContentCatalog>,
    sessions: Arc<CachedSessionStore>,
    remote: Arc<dyn RemoteStore>,
    local: Arc<dyn LocalStore>,
    leaderboard: Arc<Leaderboard>,
    metrics: Arc<MetricsRecorder>,
    oracle: Arc<dyn VerificationOracle>,
    cleaner: Option<Arc<dyn LabResourceCleaner>>,
    enhancements: EnhancementRegistry,
    facilitator: Facilitator,
    trackers: DashMap<ParticipantId, TrackerCell>,
    in_flight: InFlight,
    clock: Arc<dyn Clock>,
}

/// Builder for [`WorkshopEngine`]
///
/// Collaborators left unset are derived from the configuration: a file store
/// when `storage_path` is set, HTTP clients when `remote` is set, offline
/// stand-ins otherwise.
#[derive(Debug)]
pub struct EngineBuilder {
    config: EngineConfig,
    catalog: Arc<dyn ContentCatalog>,
    local: Option<Arc<dyn LocalStore>>,
    remote: Option<Arc<dyn RemoteStore>>,
    oracle: Option<Arc<dyn VerificationOracle>>,
    cleaner: Option<Arc<dyn LabResourceCleaner>>,
    enhancements: Option<EnhancementRegistry>,
    clock: Option<Arc<dyn Clock>>,
}

impl EngineBuilder {
    /// Replace the local store
    #[inline]
    #[must_use]
    pub fn with_local(mut self, local: Arc<dyn LocalStore>) -> Self {
        self.local = Some(local);
        self
    }

    /// Use a remote store instead of the configured server
    #[inline]
    #[must_use]
    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Use a verification oracle instead of the configured server
    #[inline]
    #[must_use]
    pub fn with_oracle(mut self, oracle: Arc<dyn VerificationOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Use a cleaner instead of the configured server
    #[inline]
    #[must_use]
    pub fn with_cleaner(mut self, cleaner: Arc<dyn LabResourceCleaner>) -> Self {
        self.cleaner = Some(cleaner);
        self
    }

    /// Resolve step enhancements through `registry`
    #[inline]
    #[must_use]
    pub fn with_enhancements(mut self, registry: EnhancementRegistry) -> Self {
        self.enhancements = Some(registry);
        self
    }

    /// Replace the wall clock
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the engine and start its sync worker on the current tokio runtime
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] for unusable settings or when an HTTP client
    /// cannot be built, storage errors opening the file store
    pub fn build(self) -> Result<WorkshopEngine, LabSyncError> {
        let config = self.config;
        config.validate()?;
        let local: Arc<dyn LocalStore> = match (self.local, &config.storage_path) {
            (Some(local), _) => local,
            (None, Some(path)) => Arc::new(FileLocalStore::open(path.clone())?),
            (None, None) => Arc::new(MemoryLocalStore::new()),
        };
        let remote: Arc<dyn RemoteStore> = match (self.remote, &config.remote) {
            (Some(remote), _) => remote,
            (None, Some(rc)) => Arc::new(
                HttpRemoteStore::new(&rc.base_url, rc.timeout())
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?,
            ),
            (None, None) => Arc::new(OfflineRemote),
        };
        let oracle: Arc<dyn VerificationOracle> = match (self.oracle, &config.remote) {
            (Some(oracle), _) => oracle,
            (None, Some(rc)) => Arc::new(
                HttpVerificationOracle::new(&rc.base_url, rc.timeout())
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?,
            ),
            (None, None) => Arc::new(OfflineOracle),
        };
        let cleaner: Option<Arc<dyn LabResourceCleaner>> = match (self.cleaner, &config.remote) {
            (Some(cleaner), _) => Some(cleaner),
            (None, Some(rc)) => {
                let cleaner = HttpLabResourceCleaner::new(&rc.base_url, rc.timeout())
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?;
                Some(Arc::new(cleaner) as Arc<dyn LabResourceCleaner>)
            }
            (None, None) => None,
        };
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let enhancements = self
            .enhancements
            .unwrap_or_else(|| EnhancementRegistry::new(config.enhancement_cache_capacity));

        let sessions = Arc::new(CachedSessionStore::start(Arc::clone(&local), Arc::clone(&remote)));
        let leaderboard = Arc::new(Leaderboard::load(Arc::clone(&local), Some(sessions.sync().clone())));
        let metrics = Arc::new(MetricsRecorder::load(Arc::clone(&local), config.metrics_capacity));
        let facilitator = Facilitator::new(
            Arc::clone(&sessions) as Arc<dyn SessionStore>,
            Arc::clone(&leaderboard),
            Arc::clone(&metrics),
            Arc::clone(&self.catalog),
            Arc::clone(&clock),
        );
        info!(
            labs = self.catalog.labs().len(),
            quests = self.catalog.quests().len(),
            online = config.remote.is_some(),
            "workshop engine ready"
        );
        Ok(WorkshopEngine {
            config,
            catalog: self.catalog,
            sessions,
            remote,
            local,
            leaderboard,
            metrics,
            oracle,
            cleaner,
            enhancements,
            facilitator,
            trackers: DashMap::new(),
            in_flight: InFlight::new(),
            clock,
        })
    }
}

impl WorkshopEngine {
    /// Start building an engine over `catalog`
    #[must_use]
    pub fn builder(config: EngineConfig, catalog: Arc<dyn ContentCatalog>) -> EngineBuilder {
        EngineBuilder {
            config,
            catalog,
            local: None,
            remote: None,
            oracle: None,
            cleaner: None,
            enhancements: None,
            clock: None,
        }
    }

    /// Settings the engine was built with
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Content catalog
    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &dyn ContentCatalog {
        self.catalog.as_ref()
    }

    /// Facilitator-side session operations
    #[inline]
    #[must_use]
    pub fn facilitator(&self) -> &Facilitator {
        &self.facilitator
    }

    /// Cached workshop session
    #[inline]
    #[must_use]
    pub fn session(&self) -> Option<WorkshopSession> {
        self.sessions.read()
    }

    /// Wait for queued remote pushes
    pub async fn flush(&self) {
        self.sessions.flush().await;
    }

    fn tracker(&self, participant: &ParticipantId) -> TrackerCell {
        let cell = self
            .trackers
            .entry(participant.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ProgressTracker::load(self.local.as_ref(), participant))));
        Arc::clone(cell.value())
    }

    /// Snapshot of a participant's progress
    #[must_use]
    pub fn progress(&self, participant: &ParticipantId) -> ProgressTracker {
        self.tracker(participant).lock().clone()
    }

    fn active_session(&self) -> Result<WorkshopSession, LabSyncError> {
        let session = self.sessions.read().ok_or(LabSyncError::NoSession)?;
        if !session.labs_enabled {
            return Err(AccessError::LabsDisabled.into());
        }
        Ok(session)
    }

    fn scorer(&self, session: &WorkshopSession) -> Scorer {
        let template = session.template_id.as_ref().and_then(|id| {
            let found = self.catalog.template(id);
            if found.is_none() {
                warn!(template = %id, "session template not in catalog, using legacy scoring");
            }
            found
        });
        Scorer::for_template(template, self.config.penalties)
    }

    fn access_rules(&self, session: &WorkshopSession) -> LabAccessRules {
        LabAccessRules::from_labs(session_labs(self.catalog.as_ref(), session))
    }

    /// Lab containing `step`, checked against the session and unlock rules
    fn accessible_lab(
        &self,
        session: &WorkshopSession,
        tracker: &ProgressTracker,
        step: &StepId,
    ) -> Result<&LabDefinition, LabSyncError> {
        let (lab, _) = self
            .catalog
            .step(step)
            .ok_or_else(|| AccessError::UnknownStep(step.clone()))?;
        self.check_lab(session, tracker, lab)?;
        Ok(lab)
    }

    fn check_lab(
        &self,
        session: &WorkshopSession,
        tracker: &ProgressTracker,
        lab: &LabDefinition,
    ) -> Result<(), LabSyncError> {
        let in_session = session_labs(self.catalog.as_ref(), session)
            .iter()
            .any(|l| l.number == lab.number);
        if !in_session {
            return Err(AccessError::UnknownLab(lab.number).into());
        }
        if !self
            .access_rules(session)
            .is_accessible(lab.number, tracker.completed_labs())
        {
            return Err(AccessError::LabLocked(lab.number).into());
        }
        Ok(())
    }

    /// Score one event and fan it out to tracker, leaderboard and metrics
    fn emit(
        &self,
        session: &WorkshopSession,
        tracker: &mut ProgressTracker,
        event: &GamificationEvent,
        ctx: ScoreContext<'_>,
    ) -> i64 {
        let delta = self.scorer(session).score(event, ctx);
        let applied = tracker.apply_points(delta);
        self.leaderboard.upsert(event, delta);
        self.metrics
            .record(MetricsEvent::from(event).with_workshop(session.id.clone()));
        debug!(
            participant = %event.participant_id,
            kind = ?event.kind,
            delta,
            applied,
            "event scored"
        );
        applied
    }

    fn record_lab_started(&self, session: &WorkshopSession, participant: &ParticipantId, lab: LabNumber, now: Timestamp) {
        self.leaderboard.start_lab(participant, lab, now);
        self.metrics.record(
            MetricsEvent::new(MetricsEventKind::LabStarted, now)
                .with_workshop(session.id.clone())
                .with_participant(participant.clone())
                .with_lab(lab),
        );
        info!(participant = %participant, lab = lab.value(), "lab started");
    }

    /// Start a lab; repeated starts keep the first timestamp
    ///
    /// # Errors
    /// No session, labs disabled, unknown or locked lab
    pub fn start_lab(&self, participant: &ParticipantId, lab: LabNumber) -> Result<bool, LabSyncError> {
        let session = self.active_session()?;
        let cell = self.tracker(participant);
        let mut tracker = cell.lock();
        let def = self.catalog.lab(lab).ok_or(AccessError::UnknownLab(lab))?;
        self.check_lab(&session, &tracker, def)?;
        let now = self.clock.now_ms();
        let started = tracker.start_lab(lab, now)?;
        if started {
            self.record_lab_started(&session, participant, lab, now);
            tracker.persist(self.local.as_ref());
        }
        Ok(started)
    }

    /// Complete a step
    ///
    /// Idempotent: a second completion changes nothing and scores nothing. The
    /// first completion emits one step event, plus one lab event when it finishes
    /// the lab.
    ///
    /// # Errors
    /// No session, labs disabled, unknown step, locked lab
    pub fn complete_step(
        &self,
        participant: &ParticipantId,
        step: &StepId,
        assisted: bool,
    ) -> Result<StepReport, LabSyncError> {
        let session = self.active_session()?;
        let cell = self.tracker(participant);
        let mut tracker = cell.lock();
        let lab = self.accessible_lab(&session, &tracker, step)?;
        let now = self.clock.now_ms();

        let outcome = tracker.complete_step(lab, step, session.mode, assisted, now)?;
        let StepOutcome::Completed {
            assisted,
            lab_started,
            lab_completed,
        } = outcome
        else {
            debug!(participant = %participant, step = %step, "step already completed");
            return Ok(StepReport {
                outcome,
                points: 0,
                score: tracker.score(),
            });
        };

        if lab_started {
            self.record_lab_started(&session, participant, lab.number, now);
        }
        let event = GamificationEvent::step_completed(participant.clone(), lab.number, step.clone(), assisted, now);
        let mut points = self.emit(&session, &mut tracker, &event, ScoreContext::default());

        if lab_completed {
            let done = GamificationEvent::lab_completed(participant.clone(), lab.number, now);
            points += self.emit(&session, &mut tracker, &done, ScoreContext::default());
            info!(participant = %participant, lab = lab.number.value(), "lab completed");
            self.record_workshop_completion(&session, &tracker, now);
        }

        tracker.persist(self.local.as_ref());
        tracker.persist_lab(self.local.as_ref(), lab);
        Ok(StepReport {
            outcome,
            points,
            score: tracker.score(),
        })
    }

    fn record_workshop_completion(&self, session: &WorkshopSession, tracker: &ProgressTracker, now: Timestamp) {
        let labs = session_labs(self.catalog.as_ref(), session);
        if !labs.is_empty() && labs.iter().all(|l| tracker.completed_labs().contains(&l.number)) {
            self.metrics.record(
                MetricsEvent::new(MetricsEventKind::WorkshopCompleted, now)
                    .with_workshop(session.id.clone())
                    .with_participant(tracker.participant().clone()),
            );
            info!(participant = %tracker.participant(), "all labs completed");
        }
    }

    /// Reveal hint `index` of a step; returns the applied (non-positive) delta
    ///
    /// A hint index revealed again costs nothing.
    ///
    /// # Errors
    /// No session, labs disabled, unknown step, locked lab
    pub fn reveal_hint(&self, participant: &ParticipantId, step: &StepId, index: u32) -> Result<i64, LabSyncError> {
        let session = self.active_session()?;
        let cell = self.tracker(participant);
        let mut tracker = cell.lock();
        let lab = self.accessible_lab(&session, &tracker, step)?;
        if !tracker.reveal_hint(step, index) {
            debug!(participant = %participant, step = %step, index, "hint already revealed");
            return Ok(0);
        }
        let event = GamificationEvent::hint_revealed(
            participant.clone(),
            Some(lab.number),
            step.clone(),
            index,
            self.clock.now_ms(),
        );
        let applied = self.emit(&session, &mut tracker, &event, ScoreContext::default());
        tracker.persist(self.local.as_ref());
        Ok(applied)
    }

    /// Reveal a step's solution; returns the applied (non-positive) delta
    ///
    /// The penalty applies only while the step is still open. A reveal after
    /// completion is recorded but costs nothing.
    ///
    /// # Errors
    /// No session, labs disabled, unknown step, locked lab
    pub fn reveal_solution(&self, participant: &ParticipantId, step: &StepId) -> Result<i64, LabSyncError> {
        let session = self.active_session()?;
        let cell = self.tracker(participant);
        let mut tracker = cell.lock();
        let lab = self.accessible_lab(&session, &tracker, step)?;
        let completed = tracker.progress().is_step_done(step);
        if !tracker.reveal_solution(step) {
            debug!(participant = %participant, step = %step, "solution already revealed");
            return Ok(0);
        }
        let event =
            GamificationEvent::solution_revealed(participant.clone(), Some(lab.number), step.clone(), self.clock.now_ms());
        let ctx = ScoreContext::default().after_completion(completed);
        let applied = self.emit(&session, &mut tracker, &event, ctx);
        tracker.persist(self.local.as_ref());
        Ok(applied)
    }

    /// Quest declaring `flag` and its position among the session's quests
    fn quest_slot<'a>(
        &'a self,
        session: &WorkshopSession,
        flag: &FlagId,
    ) -> Result<(Vec<&'a QuestDefinition>, usize), LabSyncError> {
        let def = self
            .catalog
            .flag(flag)
            .ok_or_else(|| AccessError::UnknownFlag(flag.clone()))?;
        let quests = session_quests(self.catalog.as_ref(), session);
        let index = quests
            .iter()
            .position(|q| q.id == def.quest_id || q.declares(flag))
            .ok_or_else(|| AccessError::UnknownQuest(def.quest_id.clone()))?;
        Ok((quests, index))
    }

    /// Record a captured flag and any quests it completes
    ///
    /// # Errors
    /// No session, labs disabled, unknown flag or quest, locked quest
    pub fn capture_flag(&self, participant: &ParticipantId, flag: &FlagId) -> Result<CaptureReport, LabSyncError> {
        let session = self.active_session()?;
        let cell = self.tracker(participant);
        let mut tracker = cell.lock();
        let (quests, index) = self.quest_slot(&session, flag)?;
        if !is_quest_unlocked(&quests, index, &tracker.quests().captured_flags) {
            return Err(AccessError::QuestLocked(quests[index].id.clone()).into());
        }

        let outcome = tracker.capture_flag(flag, &quests);
        if !outcome.newly_captured {
            debug!(participant = %participant, flag = %flag, "flag already captured");
            return Ok(CaptureReport {
                score: tracker.score(),
                ..CaptureReport::default()
            });
        }

        let now = self.clock.now_ms();
        let def = self.catalog.flag(flag);
        let quest_id = quests[index].id.clone();
        let event = GamificationEvent::flag_captured(participant.clone(), quest_id, flag.clone(), now);
        let ctx = def.map_or_else(ScoreContext::default, |d| ScoreContext::default().with_flag(d));
        let mut points = self.emit(&session, &mut tracker, &event, ctx);

        for quest in &outcome.completed_quests {
            let done = GamificationEvent::quest_completed(participant.clone(), quest.clone(), now);
            points += self.emit(&session, &mut tracker, &done, ScoreContext::default());
            info!(participant = %participant, quest = %quest, "quest completed");
        }

        tracker.persist(self.local.as_ref());
        Ok(CaptureReport {
            newly_captured: true,
            completed_quests: outcome.completed_quests,
            points,
            score: tracker.score(),
        })
    }

    /// Run the oracle for one target, rejecting a duplicate trigger
    ///
    /// Configuration problems surface before the oracle is called. A failed
    /// check is recorded as a `verification_failed` metrics event.
    async fn run_check(
        &self,
        session: &WorkshopSession,
        participant: &ParticipantId,
        target: (Option<LabNumber>, Option<&StepId>),
        check: &CheckId,
        params: CheckParams,
    ) -> Result<CheckOutcome, LabSyncError> {
        let env = ResolvedEnvironment::resolve(Some(session), &self.config.environment)?;
        let params = env.fill(check, params)?;

        let key = format!("{participant}:{check}:{}", target.1.map_or("", StepId::as_str));
        let Some(_guard) = self.in_flight.try_begin(key.clone()) else {
            debug!(participant = %participant, %check, "duplicate verification rejected");
            return Err(LabSyncError::Pending(key));
        };
        let outcome = self.oracle.verify(check, &params).await;

        if !outcome.success {
            let mut event = MetricsEvent::new(MetricsEventKind::VerificationFailed, self.clock.now_ms())
                .with_workshop(session.id.clone())
                .with_participant(participant.clone())
                .with_failure(check.as_str(), outcome.message.clone());
            if let Some(lab) = target.0 {
                event = event.with_lab(lab);
            }
            if let Some(step) = target.1 {
                event = event.with_step(step.clone());
            }
            self.metrics.record(event);
            info!(participant = %participant, %check, message = %outcome.message, "verification failed");
        }
        Ok(outcome)
    }

    fn step_check(&self, step: &StepId) -> Result<(LabNumber, CheckId), LabSyncError> {
        let (lab, def) = self
            .catalog
            .step(step)
            .ok_or_else(|| AccessError::UnknownStep(step.clone()))?;
        let raw = def.verification_id.as_deref().ok_or_else(|| {
            ConfigError::Invalid(format!("step {step} has no verification check"))
        })?;
        Ok((lab.number, raw.parse()?))
    }

    /// Verify a step with the oracle and complete it on success
    ///
    /// # Errors
    /// Access errors as for [`Self::complete_step`], configuration errors before
    /// the oracle is called, [`LabSyncError::Pending`] for a duplicate trigger
    pub async fn verify_step(
        &self,
        participant: &ParticipantId,
        step: &StepId,
        params: CheckParams,
    ) -> Result<CheckOutcome, LabSyncError> {
        let session = self.active_session()?;
        {
            let cell = self.tracker(participant);
            let tracker = cell.lock();
            self.accessible_lab(&session, &tracker, step)?;
        }
        let (lab, check) = self.step_check(step)?;
        let outcome = self
            .run_check(&session, participant, (Some(lab), Some(step)), &check, params)
            .await?;
        if outcome.success {
            self.complete_step(participant, step, false)?;
        }
        Ok(outcome)
    }

    /// Verify a flag with the oracle and capture it on success
    ///
    /// The flag's own id is used as the check when it names none.
    ///
    /// # Errors
    /// Access errors as for [`Self::capture_flag`], configuration errors before
    /// the oracle is called, [`LabSyncError::Pending`] for a duplicate trigger
    pub async fn verify_flag(
        &self,
        participant: &ParticipantId,
        flag: &FlagId,
        params: CheckParams,
    ) -> Result<(CheckOutcome, CaptureReport), LabSyncError> {
        let session = self.active_session()?;
        let check: CheckId = {
            let cell = self.tracker(participant);
            let tracker = cell.lock();
            let (quests, index) = self.quest_slot(&session, flag)?;
            if !is_quest_unlocked(&quests, index, &tracker.quests().captured_flags) {
                return Err(AccessError::QuestLocked(quests[index].id.clone()).into());
            }
            let def = self
                .catalog
                .flag(flag)
                .ok_or_else(|| AccessError::UnknownFlag(flag.clone()))?;
            def.verification_id.as_deref().unwrap_or(flag.as_str()).parse()?
        };
        let outcome = self
            .run_check(&session, participant, (None, None), &check, params)
            .await?;
        let report = if outcome.success {
            self.capture_flag(participant, flag)?
        } else {
            CaptureReport::default()
        };
        Ok((outcome, report))
    }

    /// Record a heartbeat: open labs accrue time since their last mark
    pub fn heartbeat(&self, participant: &ParticipantId) -> u64 {
        self.leaderboard.heartbeat(participant, self.clock.now_ms())
    }

    /// Heartbeat every configured interval until the engine is dropped
    #[must_use]
    pub fn spawn_heartbeat(self: &Arc<Self>, participant: ParticipantId) -> JoinHandle<()> {
        let engine: Weak<Self> = Arc::downgrade(self);
        let period = self.config.heartbeat_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    debug!(participant = %participant, "engine gone, heartbeat stopped");
                    break;
                };
                engine.heartbeat(&participant);
            }
        })
    }

    /// Pull the remote session every configured interval until the engine is dropped
    ///
    /// Keeps participant instances on the facilitator's current session.
    #[must_use]
    pub fn spawn_session_refresh(&self) -> JoinHandle<()> {
        self.sessions.spawn_refresh(self.config.session_refresh_interval())
    }

    /// Pull the remote session once in the background
    pub fn refresh_session(&self) {
        self.sessions.refresh();
    }

    /// Forget one lab of a participant
    ///
    /// Points already earned are kept.
    ///
    /// # Errors
    /// [`AccessError::UnknownLab`]
    pub fn reset_lab(&self, participant: &ParticipantId, lab: LabNumber) -> Result<(), LabSyncError> {
        let def = self.catalog.lab(lab).ok_or(AccessError::UnknownLab(lab))?;
        let cell = self.tracker(participant);
        let mut tracker = cell.lock();
        tracker.reset_lab(def, self.local.as_ref());
        self.leaderboard.reset_lab(participant, lab, self.clock.now_ms());
        info!(participant = %participant, lab = lab.value(), "lab reset");
        Ok(())
    }

    /// Forget all progress of one participant and zero their leaderboard row
    pub fn reset_progress(&self, participant: &ParticipantId) {
        let labs: Vec<&LabDefinition> = self.catalog.labs().iter().collect();
        let cell = self.tracker(participant);
        let mut tracker = cell.lock();
        tracker.reset(&labs, self.local.as_ref());
        self.leaderboard.reset_participant(participant, self.clock.now_ms());
        info!(participant = %participant, "progress reset");
    }

    /// Is `lab` open to the participant right now
    ///
    /// # Errors
    /// No session, labs disabled
    pub fn is_lab_accessible(&self, participant: &ParticipantId, lab: LabNumber) -> Result<bool, LabSyncError> {
        let session = self.active_session()?;
        let cell = self.tracker(participant);
        let tracker = cell.lock();
        Ok(self
            .access_rules(&session)
            .is_accessible(lab, tracker.completed_labs()))
    }

    /// Is `quest` open to the participant right now
    ///
    /// # Errors
    /// No session, labs disabled, quest not in the session
    pub fn is_quest_unlocked(&self, participant: &ParticipantId, quest: &QuestId) -> Result<bool, LabSyncError> {
        let session = self.active_session()?;
        let quests = session_quests(self.catalog.as_ref(), &session);
        let index = quests
            .iter()
            .position(|q| &q.id == quest)
            .ok_or_else(|| AccessError::UnknownQuest(quest.clone()))?;
        let cell = self.tracker(participant);
        let tracker = cell.lock();
        Ok(is_quest_unlocked(&quests, index, &tracker.quests().captured_flags))
    }

    /// Leaderboard rows, best first
    #[must_use]
    pub fn ranked_leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.leaderboard.ranked_view()
    }

    /// Pull other instances' rows; failures are logged and leave rows untouched
    pub async fn refresh_leaderboard(&self) -> usize {
        match self.leaderboard.refresh_from_remote(self.remote.as_ref()).await {
            Ok(replaced) => replaced,
            Err(e) => {
                warn!(error = %e, retryable = e.is_retryable(), "leaderboard refresh failed");
                0
            }
        }
    }

    /// Badges earned by a participant
    #[must_use]
    pub fn achievements(&self, participant: &ParticipantId) -> Vec<Achievement> {
        let cell = self.tracker(participant);
        let tracker = cell.lock();
        let completed = tracker.completed_labs();
        let mut earned = Vec::new();
        if !completed.is_empty() {
            earned.push(Achievement::FirstLab);
        }
        if let Some(session) = self.sessions.read() {
            let labs = session_labs(self.catalog.as_ref(), &session);
            if !labs.is_empty() && labs.iter().all(|l| completed.contains(&l.number)) {
                earned.push(Achievement::AllLabs);
            }
        }
        earned
    }

    /// Extra content for a step, when it references any
    pub async fn step_enhancement(&self, step: &StepId) -> Option<Arc<StepEnhancement>> {
        let (_, def) = self.catalog.step(step)?;
        let id = def.enhancement_id.as_deref()?;
        self.enhancements.resolve(id).await
    }

    /// Tear down cloud resources created by the labs in `scope`
    ///
    /// # Errors
    /// Configuration errors for a missing or malformed key alias; the cleaner
    /// is not called in that case
    pub async fn cleanup(&self, scope: CleanupScope, params: CheckParams) -> Result<CheckOutcome, LabSyncError> {
        let alias = params
            .alias
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ConfigError::MissingKeyIdentifier {
                check: "cleanup-resources".into(),
            })?;
        validate_key_alias(alias)?;
        let Some(cleaner) = &self.cleaner else {
            return Ok(CheckOutcome::fail("Cleanup service is not configured"));
        };
        let env = ResolvedEnvironment::resolve(self.sessions.read().as_ref(), &self.config.environment)?;
        let mut params = params;
        params.profile.get_or_insert_with(|| env.profile.clone());
        params.uri.get_or_insert_with(|| env.connection_uri.clone());
        let resources = cleaner.delete_lab_resources(scope, &params).await;
        if !resources.success {
            warn!(%scope, message = %resources.message, "resource cleanup failed");
            return Ok(resources);
        }
        let vault = cleaner.delete_key_vault(scope, &params).await;
        info!(%scope, success = vault.success, "lab resources cleaned up");
        Ok(vault)
    }

    /// Aggregates for the current session
    ///
    /// # Errors
    /// [`LabSyncError::NoSession`]
    pub fn metrics_summary(&self) -> Result<MetricsSummary, LabSyncError> {
        let session = self.sessions.read().ok_or(LabSyncError::NoSession)?;
        Ok(self.metrics.summary(&session.id))
    }

    /// Steps where verification fails most
    #[must_use]
    pub fn failure_points(&self) -> Vec<FailurePoint> {
        self.metrics.failure_points()
    }

    /// Raw metrics log
    #[must_use]
    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }
}
