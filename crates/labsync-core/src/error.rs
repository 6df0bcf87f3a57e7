//! Error types for the labsync engine
//!
//! Provides error handling for:
//! - Configuration problems that must be fixed before a network call
//! - Access rule violations (labs disabled, locked labs and quests)
//! - Unknown catalog references
//! - Local persistence failures
//!
//! Remote failures never appear here: the sync worker swallows them.

use labsync_model::{FlagId, LabNumber, LabState, ModelError, QuestId, StepId, TemplateId};
use labsync_store::StorageError;
use std::path::PathBuf;

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum LabSyncError {
    /// Required configuration is absent or malformed
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Action not allowed in the current progress state
    #[error(transparent)]
    Access(#[from] AccessError),

    /// Local persistence failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Record validation failed
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// No workshop session has been started
    #[error("no workshop session is active")]
    NoSession,

    /// The same check is still running for this participant
    #[error("verification {0} is already pending")]
    Pending(String),
}

impl LabSyncError {
    /// Errors the participant or facilitator can act on directly
    #[inline]
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Access(_) | Self::NoSession | Self::Pending(_)
        )
    }

    /// Instruction shown next to the error, when one exists
    #[must_use]
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::Config(e) => Some(e.remediation()),
            Self::Access(e) => e.remediation(),
            Self::NoSession => Some("Ask the facilitator to start the workshop."),
            Self::Pending(_) => Some("Wait for the running check to finish."),
            Self::Storage(_) | Self::Model(_) => None,
        }
    }
}

/// Configuration errors, surfaced before any dependent call is made
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Atlas source selected without a connection string
    #[error("no connection string configured for the shared cluster")]
    MissingConnectionString,

    /// Connection string has an unsupported scheme
    #[error("connection string {0:?} must start with mongodb:// or mongodb+srv://")]
    MalformedConnectionString(String),

    /// A key check was requested without a key identifier
    #[error("key identifier is required for check {check}")]
    MissingKeyIdentifier {
        /// Check that needed the key
        check: String,
    },

    /// Key identifier is not an alias
    #[error("invalid key alias {0:?}, must start with alias/")]
    InvalidKeyAlias(String),

    /// Session references a template the catalog does not know
    #[error("unknown workshop template {0}")]
    UnknownTemplate(TemplateId),

    /// Config file could not be read
    #[error("cannot read config {path}: {source}")]
    Unreadable {
        /// File that was asked for
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Config value rejected
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// What the user should do about it
    #[must_use]
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::MissingConnectionString => {
                "Enter the cluster connection string in the workshop setup, or switch the data source to local."
            }
            Self::MalformedConnectionString(_) => {
                "Copy the connection string from the cluster's Connect dialog; it starts with mongodb+srv://."
            }
            Self::MissingKeyIdentifier { .. } => {
                "Enter the key alias created in the previous step (for example alias/workshop-cmk)."
            }
            Self::InvalidKeyAlias(_) => "Key aliases start with alias/, for example alias/workshop-cmk.",
            Self::UnknownTemplate(_) => "Pick one of the published workshop templates.",
            Self::Unreadable { .. } | Self::Invalid(_) => "Fix the configuration file and restart.",
        }
    }
}

/// Progress actions rejected by gating rules
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// Facilitator has not opened labs yet
    #[error("labs are not enabled for this workshop yet")]
    LabsDisabled,

    /// Prerequisite labs are incomplete
    #[error("lab {0} is locked")]
    LabLocked(LabNumber),

    /// Previous quest is incomplete
    #[error("quest {0} is locked")]
    QuestLocked(QuestId),

    /// Lab number not in the catalog
    #[error("unknown lab {0}")]
    UnknownLab(LabNumber),

    /// Step id not in the catalog
    #[error("unknown step {0}")]
    UnknownStep(StepId),

    /// Flag id not in the catalog
    #[error("unknown flag {0}")]
    UnknownFlag(FlagId),

    /// Quest id not in the catalog
    #[error("unknown quest {0}")]
    UnknownQuest(QuestId),

    /// Lab lifecycle does not allow the move
    #[error("illegal lab transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: LabState,
        /// Requested state
        to: LabState,
    },
}

impl AccessError {
    /// Instruction for gating errors
    #[must_use]
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::LabsDisabled => Some("Wait for the facilitator to enable labs."),
            Self::LabLocked(_) => Some("Complete the prerequisite labs first."),
            Self::QuestLocked(_) => Some("Complete the previous quest first."),
            _ => None,
        }
    }
}
