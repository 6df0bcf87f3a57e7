//! Step enhancement registry
//!
//! Steps may reference extra content (code blocks, tips, troubleshooting) by an
//! enhancement id such as `rich-query.compound`. The part before the first `.`
//! selects a loader. Resolved content is cached; a loader failure is logged and the
//! static fallback table answers instead.

use async_trait::async_trait;
use labsync_model::{LabDefinition, StepId};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, warn};

/// Code sample attached to a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeBlock {
    /// Suggested file name
    pub filename: String,
    /// Highlighting language
    pub language: String,
    /// Full solution
    pub code: String,
    /// Fill-in-the-blanks variant shown before the solution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skeleton: Option<String>,
}

/// Kind of practice exercise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    /// Multiple choice
    Quiz,
    /// Complete a skeleton
    FillBlank,
    /// Open task
    Challenge,
}

/// Practice exercise attached to a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    /// Exercise id, unique within the step
    pub id: String,
    /// Exercise type, `type` on the wire
    #[serde(rename = "type")]
    pub kind: ExerciseKind,
    /// Display title
    pub title: String,
    /// Reward when solved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
}

/// Extra content for one step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEnhancement {
    /// Code samples
    #[serde(default)]
    pub code_blocks: Vec<CodeBlock>,
    /// Short tips
    #[serde(default)]
    pub tips: Vec<String>,
    /// Known problems and fixes
    #[serde(default)]
    pub troubleshooting: Vec<String>,
    /// Practice exercises
    #[serde(default)]
    pub exercises: Vec<Exercise>,
}

/// Enhancement loading errors
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// Source document could not be decoded
    #[error("malformed enhancement document: {0}")]
    Decode(#[from] serde_json::Error),

    /// Source is unavailable
    #[error("enhancement source unavailable: {0}")]
    Unavailable(String),
}

/// Loads the enhancements of one id prefix
#[async_trait]
pub trait EnhancementLoader: Send + Sync + Debug {
    /// Content for `id`, `None` when the source has no entry
    async fn load(&self, id: &str) -> Result<Option<StepEnhancement>, LoaderError>;
}

/// Loader over an in-memory id table
#[derive(Debug, Clone, Default)]
pub struct StaticEnhancementLoader {
    entries: HashMap<String, StepEnhancement>,
}

impl StaticEnhancementLoader {
    /// Loader with no entries
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object mapping enhancement id to content
    ///
    /// # Errors
    /// [`LoaderError::Decode`] for malformed documents
    pub fn from_json(raw: &str) -> Result<Self, LoaderError> {
        Ok(Self {
            entries: serde_json::from_str(raw)?,
        })
    }

    /// Add content under `id`
    #[must_use]
    pub fn with_entry(mut self, id: impl Into<String>, enhancement: StepEnhancement) -> Self {
        self.entries.insert(id.into(), enhancement);
        self
    }
}

#[async_trait]
impl EnhancementLoader for StaticEnhancementLoader {
    async fn load(&self, id: &str) -> Result<Option<StepEnhancement>, LoaderError> {
        Ok(self.entries.get(id).cloned())
    }
}

/// Prefix-keyed loader registry with a result cache
#[derive(Debug, Clone)]
pub struct EnhancementRegistry {
    loaders: HashMap<String, Arc<dyn EnhancementLoader>>,
    fallback: HashMap<String, Arc<StepEnhancement>>,
    cache: Cache<String, Option<Arc<StepEnhancement>>>,
}

impl EnhancementRegistry {
    /// Create an empty registry caching up to `capacity` ids
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            loaders: HashMap::new(),
            fallback: HashMap::new(),
            cache: Cache::new(capacity),
        }
    }

    /// Route ids starting with `prefix.` to `loader`
    #[must_use]
    pub fn with_loader(mut self, prefix: impl Into<String>, loader: Arc<dyn EnhancementLoader>) -> Self {
        self.loaders.insert(prefix.into(), loader);
        self
    }

    /// Static entry used when no loader answers for `id`
    #[must_use]
    pub fn with_fallback(mut self, id: impl Into<String>, enhancement: StepEnhancement) -> Self {
        self.fallback.insert(id.into(), Arc::new(enhancement));
        self
    }

    /// Loader prefix of an enhancement id
    #[must_use]
    pub fn prefix(id: &str) -> &str {
        id.split('.').next().unwrap_or(id)
    }

    /// Resolve `id` once; later calls hit the cache
    ///
    /// Loader failures are not cached so the next call retries the loader.
    pub async fn resolve(&self, id: &str) -> Option<Arc<StepEnhancement>> {
        if let Some(cached) = self.cache.get(id).await {
            return cached;
        }
        let prefix = Self::prefix(id);
        let loaded = match self.loaders.get(prefix) {
            Some(loader) => match loader.load(id).await {
                Ok(found) => found.map(Arc::new),
                Err(e) => {
                    warn!(enhancement = id, error = %e, "enhancement loader failed, using fallback");
                    return self.fallback.get(id).cloned();
                }
            },
            None => {
                debug!(enhancement = id, prefix, "no loader for prefix");
                None
            }
        };
        let resolved = loaded.or_else(|| self.fallback.get(id).cloned());
        self.cache.insert(id.to_string(), resolved.clone()).await;
        resolved
    }

    /// Resolved enhancements of every step in `lab` that references one
    pub async fn lab_enhancements(&self, lab: &LabDefinition) -> Vec<(StepId, Arc<StepEnhancement>)> {
        let mut out = Vec::new();
        for step in &lab.steps {
            let Some(id) = step.enhancement_id.as_deref() else {
                continue;
            };
            if let Some(found) = self.resolve(id).await {
                out.push((step.id.clone(), found));
            }
        }
        out
    }

    /// Drop every cached resolution
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labsync_model::{LabNumber, StepDefinition};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingLoader {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EnhancementLoader for CountingLoader {
        async fn load(&self, id: &str) -> Result<Option<StepEnhancement>, LoaderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LoaderError::Unavailable("offline".into()));
            }
            Ok(Some(StepEnhancement {
                tips: vec![format!("tip for {id}")],
                ..StepEnhancement::default()
            }))
        }
    }

    fn legacy() -> StepEnhancement {
        StepEnhancement {
            troubleshooting: vec!["check the alias".into()],
            ..StepEnhancement::default()
        }
    }

    #[test]
    fn prefix_is_first_segment() {
        assert_eq!(EnhancementRegistry::prefix("rich-query.compound"), "rich-query");
        assert_eq!(EnhancementRegistry::prefix("csfle"), "csfle");
    }

    #[tokio::test]
    async fn resolves_once_and_caches() {
        let loader = Arc::new(CountingLoader::default());
        let registry = EnhancementRegistry::new(16).with_loader("rich-query", loader.clone());
        let first = registry.resolve("rich-query.compound").await.unwrap();
        let second = registry.resolve("rich-query.compound").await.unwrap();
        assert_eq!(first.tips, vec!["tip for rich-query.compound".to_string()]);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_loader_falls_back_and_retries() {
        let loader = Arc::new(CountingLoader {
            fail: true,
            ..CountingLoader::default()
        });
        let registry = EnhancementRegistry::new(16)
            .with_loader("csfle", loader.clone())
            .with_fallback("csfle.create-key", legacy());
        let found = registry.resolve("csfle.create-key").await.unwrap();
        assert_eq!(found.troubleshooting, vec!["check the alias".to_string()]);
        registry.resolve("csfle.create-key").await;
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_prefix_uses_fallback_table() {
        let registry = EnhancementRegistry::new(16).with_fallback("portable.docker", legacy());
        assert!(registry.resolve("portable.docker").await.is_some());
        assert!(registry.resolve("portable.k8s").await.is_none());
    }

    #[tokio::test]
    async fn lab_enhancements_skip_plain_steps() {
        let loader = StaticEnhancementLoader::from_json(
            r#"{"rich-query.compound": {"codeBlocks": [{"filename": "q.js", "language": "javascript",
                "code": "db.c.find({a: 1, b: 2})", "skeleton": "db.c.find({___})"}],
                "exercises": [{"id": "e1", "type": "fill_blank", "title": "Blank", "points": 5}]}}"#,
        )
        .unwrap();
        let registry = EnhancementRegistry::new(16).with_loader("rich-query", Arc::new(loader));
        let lab = LabDefinition::new("lab-1", LabNumber(1), "Queries")
            .with_step(StepDefinition::new("s1", "Compound").with_enhancement("rich-query.compound"))
            .with_step(StepDefinition::new("s2", "Plain"));
        let found = registry.lab_enhancements(&lab).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, StepId::new("s1"));
        assert_eq!(found[0].1.code_blocks[0].skeleton.as_deref(), Some("db.c.find({___})"));
        assert_eq!(found[0].1.exercises[0].kind, ExerciseKind::FillBlank);
    }
}
