//! Testing utilities for the labsync workspace
//!
//! Shared fixtures: a three-lab catalog with two quests, a scripted verification
//! oracle, a recording cleaner and a fully wired engine over in-memory stores.

#![allow(missing_docs)]

use async_trait::async_trait;
use labsync_core::{
    CheckId, CheckOutcome, CheckParams, CleanupScope, ContentCatalog, EngineConfig, LabResourceCleaner, StaticCatalog,
    VerificationOracle, WorkshopEngine, WorkshopOptions,
};
use labsync_model::{
    Clock, FlagDefinition, FlagId, GamificationConfig, LabDefinition, LabNumber, ParticipantId,
    QuestDefinition, StepDefinition, StepId, WorkshopMode, WorkshopTemplate,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use labsync_model::ManualClock;
pub use labsync_store::{MemoryLocalStore, MemoryRemote};

/// 2026-01-01T00:00:00Z
pub const T0: i64 = 1_767_225_600_000;

/// Template with per-template scoring: 10 per step, 20 per quest
pub const GAMIFIED: &str = "gamified";

/// Template with scoring switched off
pub const UNSCORED: &str = "unscored";

/// Challenge template running only the quests
pub const CHALLENGE: &str = "challenge";

pub fn participant(email: &str) -> ParticipantId {
    ParticipantId::new(email)
}

pub fn step(id: &str) -> StepId {
    StepId::new(id)
}

pub fn flag(id: &str) -> FlagId {
    FlagId::new(id)
}

/// Lab 1 has four steps; labs 2 and 3 fall back to the stock "needs lab 1" rule.
///
/// Quest A requires flags A and B with C optional; quest B requires flag D.
pub fn sample_catalog() -> StaticCatalog {
    StaticCatalog::new()
        .with_lab(
            LabDefinition::new("lab-1", LabNumber(1), "Client-side field level encryption")
                .with_step(StepDefinition::new("lab1-connect", "Connect to the cluster"))
                .with_step(
                    StepDefinition::new("lab1-create-key", "Create the customer master key")
                        .with_verification("verify-kms")
                        .with_hints(["Use the key management CLI", "Aliases start with alias/"])
                        .with_enhancement("csfle.create-key"),
                )
                .with_step(StepDefinition::new("lab1-encrypt", "Encrypt a field"))
                .with_step(
                    StepDefinition::new("lab1-verify", "Check the stored ciphertext")
                        .with_verification("verify-field-encrypted"),
                ),
        )
        .with_lab(
            LabDefinition::new("lab-2", LabNumber(2), "Queryable encryption")
                .with_step(
                    StepDefinition::new("lab2-keys", "Create the data keys").with_verification("verify-qe-deks"),
                )
                .with_step(StepDefinition::new("lab2-query", "Run an equality query"))
                .with_step(
                    StepDefinition::new("lab2-walkthrough", "Facilitator walkthrough")
                        .with_modes([WorkshopMode::Demo]),
                ),
        )
        .with_lab(
            LabDefinition::new("lab-3", LabNumber(3), "Key rotation")
                .with_step(StepDefinition::new("lab3-rotate", "Rotate the master key").with_verification("verify-key-rotation")),
        )
        .with_quest(
            QuestDefinition::new("quest-a", "Recon")
                .with_required(["flag-a", "flag-b"])
                .with_optional(["flag-c"]),
        )
        .with_quest(QuestDefinition::new("quest-b", "Breach").with_required(["flag-d"]))
        .with_flag(
            FlagDefinition::new("flag-a", "quest-a", "Find the key vault")
                .with_points(50)
                .with_verification("verify-datakey"),
        )
        .with_flag(FlagDefinition::new("flag-b", "quest-a", "Count the keys").with_points(50))
        .with_flag(FlagDefinition::new("flag-c", "quest-a", "Spot the plaintext").with_points(25))
        .with_flag(FlagDefinition::new("flag-d", "quest-b", "Decrypt the record").with_points(100))
        .with_template(
            WorkshopTemplate::new(GAMIFIED, "Encryption day")
                .with_labs(["lab-1", "lab-2", "lab-3"])
                .with_gamification(GamificationConfig::default().with_base_points(10).with_quest_bonus(20)),
        )
        .with_template(
            WorkshopTemplate::new(UNSCORED, "Dry run")
                .with_labs(["lab-1", "lab-2"])
                .with_gamification(GamificationConfig::disabled()),
        )
        .with_template(
            WorkshopTemplate::new(CHALLENGE, "Capture the flag")
                .with_mode(WorkshopMode::Challenge)
                .with_quests(["quest-a", "quest-b"])
                .with_gamification(GamificationConfig::default().with_quest_bonus(20)),
        )
}

/// Oracle answering from a script; unscripted checks pass
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    script: Mutex<HashMap<String, CheckOutcome>>,
    seen: Mutex<Vec<(CheckId, CheckParams)>>,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `check` with `outcome` from now on
    pub fn script(&self, check: &str, outcome: CheckOutcome) {
        self.script.lock().insert(check.to_string(), outcome);
    }

    /// Sleep this long inside every call
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Checks and filled parameters received, in call order
    pub fn seen(&self) -> Vec<(CheckId, CheckParams)> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl VerificationOracle for ScriptedOracle {
    async fn verify(&self, check: &CheckId, params: &CheckParams) -> CheckOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push((check.clone(), params.clone()));
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .get(check.as_str())
            .cloned()
            .unwrap_or_else(|| CheckOutcome::pass(format!("{check} passed")))
    }
}

/// Cleaner that records every request and succeeds unless told otherwise
#[derive(Debug, Default)]
pub struct RecordingCleaner {
    requests: Mutex<Vec<(&'static str, CleanupScope, CheckParams)>>,
    fail_resources: Mutex<bool>,
}

impl RecordingCleaner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_resources(&self, fail: bool) {
        *self.fail_resources.lock() = fail;
    }

    /// `("resources" | "keyvault", scope, params)` per request
    pub fn requests(&self) -> Vec<(&'static str, CleanupScope, CheckParams)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LabResourceCleaner for RecordingCleaner {
    async fn delete_lab_resources(&self, scope: CleanupScope, params: &CheckParams) -> CheckOutcome {
        self.requests.lock().push(("resources", scope, params.clone()));
        if *self.fail_resources.lock() {
            return CheckOutcome::fail("Key deletion was denied");
        }
        CheckOutcome::pass(format!("Deleted resources for {scope}"))
    }

    async fn delete_key_vault(&self, scope: CleanupScope, params: &CheckParams) -> CheckOutcome {
        self.requests.lock().push(("keyvault", scope, params.clone()));
        CheckOutcome::pass(format!("Dropped key vault for {scope}"))
    }
}

/// Engine over in-memory stores with every collaborator exposed
#[derive(Debug)]
pub struct TestWorkshop {
    pub engine: Arc<WorkshopEngine>,
    pub clock: ManualClock,
    pub local: Arc<MemoryLocalStore>,
    pub remote: Arc<MemoryRemote>,
    pub oracle: Arc<ScriptedOracle>,
    pub cleaner: Arc<RecordingCleaner>,
}

impl TestWorkshop {
    /// Engine with default configuration and no session; needs a tokio runtime
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let clock = ManualClock::new(T0);
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemote::new());
        let oracle = Arc::new(ScriptedOracle::new());
        let cleaner = Arc::new(RecordingCleaner::new());
        let engine = WorkshopEngine::builder(config, Arc::new(sample_catalog()))
            .with_local(local.clone())
            .with_remote(remote.clone())
            .with_oracle(oracle.clone())
            .with_cleaner(cleaner.clone())
            .with_clock(Arc::new(clock.clone()) as Arc<dyn Clock>)
            .build()
            .unwrap();
        Self {
            engine: Arc::new(engine),
            clock,
            local,
            remote,
            oracle,
            cleaner,
        }
    }

    /// Engine with a session started from `options`
    pub fn started(options: WorkshopOptions) -> Self {
        let workshop = Self::new();
        workshop.engine.facilitator().start_new_workshop(options).unwrap();
        workshop
    }

    /// Engine with a session on the gamified template
    pub fn gamified() -> Self {
        Self::started(WorkshopOptions::new("Acme").with_template(GAMIFIED))
    }

    /// Complete every lab-mode step of `lab` unassisted
    pub fn finish_lab(&self, who: &ParticipantId, lab: &str) {
        let steps: Vec<StepId> = self
            .engine
            .catalog()
            .labs()
            .iter()
            .find(|l| l.id.as_str() == lab)
            .unwrap()
            .required_steps(WorkshopMode::Lab)
            .map(|s| s.id.clone())
            .collect();
        for id in &steps {
            self.engine.complete_step(who, id, false).unwrap();
        }
    }
}

impl Default for TestWorkshop {
    fn default() -> Self {
        Self::new()
    }
}
