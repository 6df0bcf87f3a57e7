//! labsync Core
//!
//! Progress, scoring and synchronization engine for facilitator-led workshops.
//!
//! # Core Concepts
//!
//! - [`WorkshopEngine`]: participant actions (complete, verify, capture, reveal)
//!   flowing through progress, scoring, leaderboard and metrics
//! - [`Facilitator`]: the only writer of the workshop session
//! - [`ProgressTracker`]: one participant's idempotent step, lab and quest state
//! - [`Scorer`]: event to point delta, per template or legacy
//! - [`Leaderboard`]: ranked rows with double-count-free lab timing
//! - [`MetricsRecorder`]: bounded append-only analytics log
//!
//! # Example
//!
//! ```rust,ignore
//! use labsync_core::{EngineConfig, StaticCatalog, WorkshopEngine, WorkshopOptions};
//!
//! let engine = WorkshopEngine::builder(EngineConfig::default(), Arc::new(catalog)).build()?;
//! engine.facilitator().start_new_workshop(WorkshopOptions::new("Acme"))?;
//! engine.complete_step(&participant, &StepId::new("lab1-connect"), false)?;
//! ```
//!
//! Network and I/O failures stop at the store and oracle boundaries; they never
//! reach progress state or scoring.

#![warn(unreachable_pub)]

mod access;
mod catalog;
mod config;
mod engine;
mod enhancement;
mod environment;
mod error;
mod facilitator;
mod lab_state;
mod leaderboard;
mod metrics;
mod progress;
mod scorer;
mod verification;

pub use access::{is_quest_unlocked, LabAccessRules, UnlockPredicate};
pub use catalog::{session_labs, session_quests, ContentCatalog, StaticCatalog};
pub use config::{EngineConfig, EnvironmentConfig, PenaltyConfig, RemoteConfig};
pub use engine::{Achievement, CaptureReport, EngineBuilder, StepReport, WorkshopEngine};
pub use enhancement::{
    CodeBlock, EnhancementLoader, EnhancementRegistry, Exercise, ExerciseKind, LoaderError,
    StaticEnhancementLoader, StepEnhancement,
};
pub use environment::{validate_connection_string, validate_key_alias, ResolvedEnvironment};
pub use error::{AccessError, ConfigError, LabSyncError};
pub use facilitator::{Facilitator, WorkshopOptions};
pub use lab_state::{allowed_transitions, apply_change, LabChange};
pub use leaderboard::{rank, Leaderboard};
pub use metrics::{FailurePoint, MetricsRecorder, MetricsSummary};
pub use progress::{CaptureOutcome, ProgressTracker, StepOutcome};
pub use scorer::{ScoreContext, Scorer};
pub use verification::{
    CheckId, CheckOutcome, CheckParams, CleanupScope, HttpLabResourceCleaner, HttpVerificationOracle,
    InFlight, InFlightGuard, LabResourceCleaner, OfflineOracle, VerificationOracle,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
