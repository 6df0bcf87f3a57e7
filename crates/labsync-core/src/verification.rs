//! Verification oracle contract
//!
//! The oracle is an opaque pass/fail service. A failed check is a normal
//! [`CheckOutcome`], never an error: transport problems are folded into the
//! outcome message so nothing network-related reaches the progress engine.
//!
//! [`InFlight`] rejects a second trigger of the same check while the first is
//! still outstanding.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use labsync_model::{LabNumber, ModelError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Server-side check, one endpoint each
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum CheckId {
    /// Customer master key alias exists
    KeyAlias,
    /// Key policy grants the participant
    KeyPolicy,
    /// Unique index on the key vault
    KeyVaultIndex,
    /// Number of data keys in the key vault
    KeyVaultCount,
    /// Data key with a given alt name exists
    DataKey,
    /// A field is stored encrypted
    FieldEncrypted,
    /// Plaintext collection migrated to an encrypted one
    Migration,
    /// Per-tenant data keys
    TenantKeys,
    /// Data key was rewrapped
    KeyRotation,
    /// Queryable encryption data keys
    QeKeys,
    /// Encrypted fields metadata on the collection
    QeMetadata,
    /// Queryable encryption collection exists
    QeCollection,
    /// Range query over encrypted field
    QeRangeQuery,
    /// A command-line tool is installed
    ToolInstalled,
    /// Endpoint not known to this build, passed through verbatim
    Other(String),
}

impl CheckId {
    const KNOWN: [Self; 14] = [
        Self::KeyAlias,
        Self::KeyPolicy,
        Self::KeyVaultIndex,
        Self::KeyVaultCount,
        Self::DataKey,
        Self::FieldEncrypted,
        Self::Migration,
        Self::TenantKeys,
        Self::KeyRotation,
        Self::QeKeys,
        Self::QeMetadata,
        Self::QeCollection,
        Self::QeRangeQuery,
        Self::ToolInstalled,
    ];

    /// Endpoint slug, e.g. `verify-kms`
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::KeyAlias => "verify-kms",
            Self::KeyPolicy => "verify-policy",
            Self::KeyVaultIndex => "verify-index",
            Self::KeyVaultCount => "verify-keyvault-count",
            Self::DataKey => "verify-datakey",
            Self::FieldEncrypted => "verify-field-encrypted",
            Self::Migration => "verify-migration",
            Self::TenantKeys => "verify-tenant-deks",
            Self::KeyRotation => "verify-key-rotation",
            Self::QeKeys => "verify-qe-deks",
            Self::QeMetadata => "verify-qe-metadata",
            Self::QeCollection => "verify-qe-collection",
            Self::QeRangeQuery => "verify-qe-range-query",
            Self::ToolInstalled => "check-tool",
            Self::Other(slug) => slug,
        }
    }

    /// Request path on the workshop server
    #[must_use]
    pub fn path(&self) -> String {
        format!("/api/{}", self.as_str())
    }

    /// Needs a key alias before the call is made
    #[inline]
    #[must_use]
    pub fn requires_key_alias(&self) -> bool {
        matches!(self, Self::KeyAlias | Self::KeyPolicy)
    }

    /// Talks to the participant's database
    #[inline]
    #[must_use]
    pub fn uses_connection(&self) -> bool {
        !matches!(self, Self::KeyAlias | Self::KeyPolicy | Self::ToolInstalled)
    }

    /// Reads a database/collection pair
    #[inline]
    #[must_use]
    pub fn uses_collection(&self) -> bool {
        matches!(self, Self::QeMetadata | Self::QeCollection | Self::QeRangeQuery)
    }

    /// Legacy content ids used by lab definitions
    fn from_content_id(id: &str) -> Option<Self> {
        let check = match id {
            "csfle.verifyCmkExists" => Self::KeyAlias,
            "csfle.verifyKeyPolicy" => Self::KeyPolicy,
            "csfle.verifyKeyVaultIndex" | "verify-indexes" => Self::KeyVaultIndex,
            "csfle.verifyKeyVaultCount" => Self::KeyVaultCount,
            "csfle.verifyDekCreated" | "csfle.verifyDataKey" => Self::DataKey,
            "csfle.verifyMigration" => Self::Migration,
            "csfle.verifyTenantDEKs" | "csfle.verifyMultiTenantKeys" => Self::TenantKeys,
            "csfle.verifyKeyRotation" => Self::KeyRotation,
            "qe.verifyDEKs" | "qe.verifyQEDEKs" => Self::QeKeys,
            "qe.verifyCollection" | "qe.verifyQECollection" => Self::QeCollection,
            "qe.verifyMetadata" | "qe.verifyQEMetadata" => Self::QeMetadata,
            "qe.verifyRangeQuery" | "qe.verifyQERangeQuery" | "verify-queryable-encryption" => {
                Self::QeRangeQuery
            }
            _ => return None,
        };
        Some(check)
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ModelError::InvalidIdentifier {
                kind: "check",
                value: s.to_string(),
            });
        }
        if let Some(known) = Self::KNOWN.into_iter().find(|c| c.as_str() == s) {
            return Ok(known);
        }
        Ok(Self::from_content_id(s).unwrap_or_else(|| Self::Other(s.to_string())))
    }
}

impl From<CheckId> for String {
    fn from(check: CheckId) -> Self {
        check.as_str().to_string()
    }
}

impl TryFrom<String> for CheckId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Query parameters of a check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckParams {
    /// Cluster connection string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Database to inspect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,
    /// Collection to inspect, `coll` on the wire
    #[serde(default, rename = "coll", skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Key alias, `alias/` prefixed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Cloud credentials profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Data key alt name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_alt_name: Option<String>,
    /// Expected document count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_count: Option<u32>,
    /// Tool to look up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Tool path entered by the participant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_path: Option<String>,
}

impl CheckParams {
    /// No parameters
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key alias
    #[inline]
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Set the database and collection
    #[inline]
    #[must_use]
    pub fn with_collection(mut self, db: impl Into<String>, collection: impl Into<String>) -> Self {
        self.db = Some(db.into());
        self.collection = Some(collection.into());
        self
    }

    /// Set the data key alt name
    #[inline]
    #[must_use]
    pub fn with_key_alt_name(mut self, name: impl Into<String>) -> Self {
        self.key_alt_name = Some(name.into());
        self
    }

    /// Set the expected count
    #[inline]
    #[must_use]
    pub fn with_expected_count(mut self, count: u32) -> Self {
        self.expected_count = Some(count);
        self
    }

    /// Set the tool
    #[inline]
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }
}

/// Pass/fail answer of the oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// Check passed
    pub success: bool,
    /// Oracle explanation
    #[serde(default)]
    pub message: String,
    /// Resolved binary location for tool checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl CheckOutcome {
    /// Passing outcome
    #[must_use]
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            path: None,
        }
    }

    /// Failing outcome
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            path: None,
        }
    }
}

/// Opaque pass/fail verification service
#[async_trait]
pub trait VerificationOracle: Send + Sync + fmt::Debug {
    /// Run one check; never errors, failures are outcomes
    async fn verify(&self, check: &CheckId, params: &CheckParams) -> CheckOutcome;
}

/// Oracle backed by the workshop server's `/api/verify-*` endpoints
#[derive(Debug, Clone)]
pub struct HttpVerificationOracle {
    client: Client,
    base_url: String,
}

impl HttpVerificationOracle {
    /// Create a client for `base_url`
    ///
    /// # Errors
    /// Returns the builder error when the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<Q: Serialize + Sync>(&self, path: &str, query: &Q) -> CheckOutcome {
        let url = format!("{}{}", self.base_url, path);
        Self::send(&url, self.client.get(&url).query(query)).await
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> CheckOutcome {
        let url = format!("{}{}", self.base_url, path);
        Self::send(&url, self.client.post(&url).json(body)).await
    }

    async fn send(url: &str, request: reqwest::RequestBuilder) -> CheckOutcome {
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(%url, error = %e, "verification bridge unreachable");
                return CheckOutcome::fail(format!("Verification failed: bridge connection error ({e})"));
            }
        };
        let status = response.status();
        // Failing checks answer 500 with a regular outcome body
        match response.json::<CheckOutcome>().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%url, status = status.as_u16(), error = %e, "undecodable verification response");
                CheckOutcome::fail(format!("Verification failed: unexpected response (HTTP {status})"))
            }
        }
    }
}

#[async_trait]
impl VerificationOracle for HttpVerificationOracle {
    async fn verify(&self, check: &CheckId, params: &CheckParams) -> CheckOutcome {
        debug!(%check, "verification request");
        self.get(&check.path(), params).await
    }
}

/// Oracle for instances without a workshop server; every check fails
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineOracle;

#[async_trait]
impl VerificationOracle for OfflineOracle {
    async fn verify(&self, check: &CheckId, _params: &CheckParams) -> CheckOutcome {
        CheckOutcome::fail(format!("Verification service is not configured ({check})"))
    }
}

/// Which resources a cleanup targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CleanupScope {
    /// One lab's resources
    Lab(LabNumber),
    /// Every lab's resources
    All,
}

impl fmt::Display for CleanupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lab(n) => write!(f, "lab{n}"),
            Self::All => f.write_str("all"),
        }
    }
}

/// Idempotent teardown of lab resources
#[async_trait]
pub trait LabResourceCleaner: Send + Sync + fmt::Debug {
    /// Remove cloud key resources created by the labs in `scope`
    async fn delete_lab_resources(&self, scope: CleanupScope, params: &CheckParams) -> CheckOutcome;

    /// Drop the key vault collection used by the labs in `scope`
    async fn delete_key_vault(&self, scope: CleanupScope, params: &CheckParams) -> CheckOutcome;
}

const CLEANUP_PATH: &str = "/api/cleanup-resources";
const SHELL_PATH: &str = "/api/run-mongosh";
const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, PartialEq, Eq, Serialize)]
struct CleanupQuery<'a> {
    alias: &'a str,
    profile: &'a str,
}

impl<'a> CleanupQuery<'a> {
    fn from_params(params: &'a CheckParams) -> Self {
        Self {
            alias: params.alias.as_deref().unwrap_or_default(),
            profile: params.profile.as_deref().unwrap_or(DEFAULT_PROFILE),
        }
    }
}

#[derive(Debug, Serialize)]
struct ShellBody<'a> {
    code: String,
    uri: &'a str,
}

/// Shell script removing data keys from the labs' key vault
///
/// With a key alt name only that key goes; otherwise the whole vault is emptied.
fn key_vault_script(params: &CheckParams) -> String {
    let db = params.db.as_deref().unwrap_or("encryption");
    let collection = params.collection.as_deref().unwrap_or("__keyVault");
    let filter = match params.key_alt_name.as_deref() {
        Some(name) => format!("{{ keyAltNames: {} }}", serde_json::Value::from(name)),
        None => "{}".to_string(),
    };
    format!(
        "db.getSiblingDB({}).getCollection({}).deleteMany({filter})",
        serde_json::Value::from(db),
        serde_json::Value::from(collection),
    )
}

/// Cleaner backed by the workshop server
///
/// Cloud keys go through `GET /api/cleanup-resources?alias=&profile=`, which
/// deletes the alias and schedules its key for deletion. The key vault is
/// emptied with a shell script posted to `/api/run-mongosh`. Neither route
/// knows about lab scopes; the scope only shows up in logs.
#[derive(Debug, Clone)]
pub struct HttpLabResourceCleaner {
    oracle: HttpVerificationOracle,
}

impl HttpLabResourceCleaner {
    /// Create a client for `base_url`
    ///
    /// # Errors
    /// Returns the builder error when the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            oracle: HttpVerificationOracle::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl LabResourceCleaner for HttpLabResourceCleaner {
    async fn delete_lab_resources(&self, scope: CleanupScope, params: &CheckParams) -> CheckOutcome {
        let query = CleanupQuery::from_params(params);
        if !query.alias.starts_with("alias/") {
            return CheckOutcome::fail("Invalid alias format. Must start with alias/");
        }
        debug!(%scope, alias = query.alias, "cleanup request");
        self.oracle.get(CLEANUP_PATH, &query).await
    }

    async fn delete_key_vault(&self, scope: CleanupScope, params: &CheckParams) -> CheckOutcome {
        let Some(uri) = params.uri.as_deref() else {
            return CheckOutcome::fail("MongoDB URI required");
        };
        debug!(%scope, "key vault cleanup request");
        let body = ShellBody {
            code: key_vault_script(params),
            uri,
        };
        self.oracle.post(SHELL_PATH, &body).await
    }
}

/// Outstanding checks, keyed by caller-chosen strings
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    pending: Arc<DashMap<String, ()>>,
}

impl InFlight {
    /// Empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`; `None` while a previous claim is alive
    #[must_use]
    pub fn try_begin(&self, key: impl Into<String>) -> Option<InFlightGuard> {
        match self.pending.entry(key.into()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let key = slot.key().clone();
                slot.insert(());
                Some(InFlightGuard {
                    pending: Arc::clone(&self.pending),
                    key,
                })
            }
        }
    }

    /// Is `key` claimed
    #[must_use]
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    /// Claimed keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Nothing claimed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Releases its key when dropped, including on early return or cancellation
#[derive(Debug)]
pub struct InFlightGuard {
    pending: Arc<DashMap<String, ()>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.pending.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_ids_parse_slugs_and_content_ids() {
        assert_eq!("verify-kms".parse::<CheckId>().unwrap(), CheckId::KeyAlias);
        assert_eq!("csfle.verifyCmkExists".parse::<CheckId>().unwrap(), CheckId::KeyAlias);
        assert_eq!("qe.verifyQEMetadata".parse::<CheckId>().unwrap(), CheckId::QeMetadata);
        assert_eq!(
            "verify-shard-key".parse::<CheckId>().unwrap(),
            CheckId::Other("verify-shard-key".into())
        );
        assert!(" ".parse::<CheckId>().is_err());
        assert_eq!(CheckId::QeRangeQuery.path(), "/api/verify-qe-range-query");
    }

    #[test]
    fn check_id_serializes_as_slug() {
        let json = serde_json::to_string(&CheckId::TenantKeys).unwrap();
        assert_eq!(json, "\"verify-tenant-deks\"");
        let back: CheckId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CheckId::TenantKeys);
    }

    #[test]
    fn params_use_endpoint_names() {
        let params = CheckParams::new()
            .with_collection("hr", "employees")
            .with_key_alt_name("k1")
            .with_expected_count(2);
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["coll"], "employees");
        assert_eq!(json["keyAltName"], "k1");
        assert_eq!(json["expectedCount"], 2);
        assert!(json.get("uri").is_none());
    }

    #[test]
    fn outcome_body_decodes_with_optional_path() {
        let outcome: CheckOutcome =
            serde_json::from_str(r#"{"success":true,"message":"found","path":"/usr/bin/mongosh"}"#).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.path.as_deref(), Some("/usr/bin/mongosh"));
        let failed: CheckOutcome = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert_eq!(failed, CheckOutcome::fail(""));
    }

    #[test]
    fn in_flight_rejects_duplicates_until_dropped() {
        let inflight = InFlight::new();
        let guard = inflight.try_begin("p:verify-kms").unwrap();
        assert!(inflight.try_begin("p:verify-kms").is_none());
        assert!(inflight.try_begin("q:verify-kms").is_some());
        assert!(inflight.is_pending("p:verify-kms"));
        drop(guard);
        assert!(!inflight.is_pending("p:verify-kms"));
        assert!(inflight.try_begin("p:verify-kms").is_some());
    }

    #[test]
    fn cleanup_query_carries_alias_and_default_profile() {
        let params = CheckParams::new().with_alias("alias/lab1");
        let query = serde_json::to_value(CleanupQuery::from_params(&params)).unwrap();
        assert_eq!(query, serde_json::json!({"alias": "alias/lab1", "profile": "default"}));
    }

    #[test]
    fn key_vault_script_targets_one_key_when_named() {
        let mut params = CheckParams::new();
        assert_eq!(
            key_vault_script(&params),
            r#"db.getSiblingDB("encryption").getCollection("__keyVault").deleteMany({})"#
        );
        params.key_alt_name = Some("user-'42".into());
        assert_eq!(
            key_vault_script(&params),
            r#"db.getSiblingDB("encryption").getCollection("__keyVault").deleteMany({ keyAltNames: "user-'42" })"#
        );
    }

    #[tokio::test]
    async fn key_vault_cleanup_needs_a_uri() {
        let cleaner = HttpLabResourceCleaner::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let outcome = cleaner.delete_key_vault(CleanupScope::All, &CheckParams::new()).await;
        assert_eq!(outcome, CheckOutcome::fail("MongoDB URI required"));
    }

    #[test]
    fn cleanup_scope_labels() {
        assert_eq!(CleanupScope::Lab(LabNumber(2)).to_string(), "lab2");
        assert_eq!(CleanupScope::All.to_string(), "all");
    }
}
