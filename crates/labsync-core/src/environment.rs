//! Participant target environment
//!
//! Resolves where checks should point (connection target, region, profile) from
//! the session and the configured fallbacks, and fills check parameters before
//! any call goes out. Every problem found here is a [`ConfigError`] so the call
//! is never made.

use crate::config::EnvironmentConfig;
use crate::error::ConfigError;
use crate::verification::{CheckId, CheckParams};
use labsync_model::{MongoSource, WorkshopSession};

const SCHEMES: [&str; 2] = ["mongodb://", "mongodb+srv://"];
const KEY_ALIAS_PREFIX: &str = "alias/";
const DEFAULT_DB: &str = "hr";
const DEFAULT_COLLECTION: &str = "employees";

/// Effective environment for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEnvironment {
    /// Connection string lab scripts use
    pub connection_uri: String,
    /// Cloud region for key material
    pub region: String,
    /// Cloud credentials profile
    pub profile: String,
    /// Where the database lives
    pub source: MongoSource,
    config: EnvironmentConfig,
}

impl ResolvedEnvironment {
    /// Resolve the session's data source against the configured fallbacks
    ///
    /// # Errors
    /// [`ConfigError::MissingConnectionString`] for a shared-cluster session
    /// without a connection string, [`ConfigError::MalformedConnectionString`]
    /// when the string has an unsupported scheme
    pub fn resolve(session: Option<&WorkshopSession>, config: &EnvironmentConfig) -> Result<Self, ConfigError> {
        let source = session.map_or(MongoSource::Local, |s| s.mongodb_source);
        let connection_uri = match source {
            MongoSource::Local => config.default_connection_uri.clone(),
            MongoSource::Atlas => {
                let uri = session
                    .and_then(|s| s.atlas_connection_string.as_deref())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or(ConfigError::MissingConnectionString)?;
                validate_connection_string(uri)?;
                uri.to_string()
            }
        };
        Ok(Self {
            connection_uri,
            region: config.default_region.clone(),
            profile: config.default_profile.clone(),
            source,
            config: config.clone(),
        })
    }

    /// Complete `params` for `check`
    ///
    /// Explicit values win over resolved ones. Key checks need a key alias;
    /// tool checks pick up a configured binary path.
    ///
    /// # Errors
    /// [`ConfigError::MissingKeyIdentifier`] or [`ConfigError::InvalidKeyAlias`]
    /// for key checks
    pub fn fill(&self, check: &CheckId, mut params: CheckParams) -> Result<CheckParams, ConfigError> {
        if check.requires_key_alias() {
            let alias = params
                .alias
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .ok_or_else(|| ConfigError::MissingKeyIdentifier {
                    check: check.to_string(),
                })?;
            validate_key_alias(alias)?;
            params.alias = Some(alias.to_string());
            params.profile.get_or_insert_with(|| self.profile.clone());
        }
        if check.uses_connection() {
            params.uri.get_or_insert_with(|| self.connection_uri.clone());
        }
        if check.uses_collection() {
            params.db.get_or_insert_with(|| DEFAULT_DB.to_string());
            params.collection.get_or_insert_with(|| DEFAULT_COLLECTION.to_string());
        }
        if *check == CheckId::ToolInstalled && params.user_path.is_none() {
            params.user_path = params
                .tool
                .as_ref()
                .and_then(|tool| self.config.tool_paths.get(tool))
                .map(|p| p.display().to_string());
        }
        Ok(params)
    }
}

/// Connection strings must use a MongoDB scheme
///
/// # Errors
/// [`ConfigError::MalformedConnectionString`] otherwise
pub fn validate_connection_string(uri: &str) -> Result<(), ConfigError> {
    if SCHEMES.iter().any(|scheme| uri.starts_with(scheme)) {
        Ok(())
    } else {
        Err(ConfigError::MalformedConnectionString(uri.to_string()))
    }
}

/// Key identifiers must be aliases
///
/// # Errors
/// [`ConfigError::InvalidKeyAlias`] when `alias` lacks the `alias/` prefix
pub fn validate_key_alias(alias: &str) -> Result<(), ConfigError> {
    if alias.starts_with(KEY_ALIAS_PREFIX) && alias.len() > KEY_ALIAS_PREFIX.len() {
        Ok(())
    } else {
        Err(ConfigError::InvalidKeyAlias(alias.to_string()))
    }
}
