//! Artifacts flowing between stages.

use super::ExecutionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// An opaque reference to stored artifact bytes.
///
/// The core never reads payload contents; the locator is meaningful
/// only to the backing store and the executors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadRef {
    /// Backend-specific locator (e.g. an object-store path).
    pub locator: String,

    /// SHA-256 content digest, when the producer computed one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl PayloadRef {
    /// Creates a payload reference without a digest.
    #[must_use]
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            digest: None,
        }
    }

    /// Creates a payload reference with a digest computed over `bytes`.
    #[must_use]
    pub fn with_digest_of(locator: impl Into<String>, bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            locator: locator.into(),
            digest: Some(hex::encode(hasher.finalize())),
        }
    }

    /// Sets a precomputed digest.
    #[must_use]
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }
}

/// An immutable artifact produced by a stage.
///
/// Produced exactly once per execution. Named string variables travel
/// with the artifact so that downstream stages can read values resolved
/// during production (e.g. the image tag a build stage settled on)
/// without rebuilding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// The artifact name, unique within an execution.
    pub name: String,

    /// Reference to the stored payload.
    pub payload: PayloadRef,

    /// The stage that produced the artifact.
    pub produced_by: String,

    /// The execution the artifact belongs to.
    pub execution: ExecutionId,

    /// Namespace under which variables are published, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Named string variables readable by downstream stages.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, String>,

    /// When the artifact was produced.
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Creates a new artifact.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        produced_by: impl Into<String>,
        execution: ExecutionId,
        payload: PayloadRef,
    ) -> Self {
        Self {
            name: name.into(),
            payload,
            produced_by: produced_by.into(),
            execution,
            namespace: None,
            variables: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Sets the variable namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Publishes a named variable.
    #[must_use]
    pub fn with_variable(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Reads a published variable by unqualified key.
    #[must_use]
    pub fn variable(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    /// Returns the qualified name of a variable, if a namespace is set.
    #[must_use]
    pub fn qualified_variable(&self, key: &str) -> Option<String> {
        self.namespace
            .as_ref()
            .map(|ns| format!("{ns}.{key}"))
    }
}
