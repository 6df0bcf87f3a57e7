//! labsync Model
//!
//! Plain, serializable records shared by every labsync crate.
//!
//! # Core Concepts
//!
//! - [`WorkshopSession`]: the single facilitator-owned record describing the current run
//! - [`ParticipantProgress`] / [`QuestProgress`]: per-participant completion state
//! - [`LeaderboardEntry`]: one aggregated row per participant
//! - [`GamificationEvent`] / [`MetricsEvent`]: immutable progress facts
//! - [`LabDefinition`], [`QuestDefinition`], [`FlagDefinition`], [`WorkshopTemplate`]:
//!   content supplied by the external catalog
//!
//! Timestamps are Unix epoch milliseconds ([`Timestamp`]) so records serialize the same
//! way the browser cache stores them.

#![warn(unreachable_pub)]

mod catalog;
mod clock;
mod error;
mod event;
mod ids;
mod leaderboard;
mod progress;
mod session;

pub use catalog::{
    FlagDefinition, FlagVisibility, GamificationConfig, LabDefinition, QuestDefinition,
    StepDefinition, WorkshopTemplate, DEFAULT_BASE_POINTS,
};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use error::ModelError;
pub use event::{GamificationEvent, GamificationEventKind, MetricsEvent, MetricsEventKind};
pub use ids::{FlagId, LabId, LabNumber, ParticipantId, QuestId, SessionId, StepId, TemplateId};
pub use leaderboard::LeaderboardEntry;
pub use progress::{LabState, ParticipantProgress, QuestProgress};
pub use session::{
    ArchivedLeaderboard, FacilitatorDetails, MongoSource, SessionPatch, WorkshopMode,
    WorkshopSession,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
