//! Error types for the labsync data model

/// Model validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Identifier could not be parsed
    #[error("invalid {kind} identifier: {value:?}")]
    InvalidIdentifier {
        /// What kind of id was expected
        kind: &'static str,
        /// The rejected input
        value: String,
    },

    /// Workshop date label is not `YYYY-MM-DD`
    #[error("invalid workshop date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Workshop mode label not recognised
    #[error("unknown workshop mode {0:?}")]
    UnknownMode(String),
}
