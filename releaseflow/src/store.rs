//! The per-execution artifact store.
//!
//! Writes are serialized through a single lock so the
//! produced-exactly-once invariant holds under concurrent action
//! completion.

use crate::core::{Artifact, ExecutionId};
use crate::errors::{ArtifactNotReadyError, DuplicateArtifactError};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Stores the artifacts produced during one execution.
#[derive(Debug)]
pub struct ArtifactStore {
    /// The owning execution.
    execution: ExecutionId,
    /// Produced artifacts by name.
    artifacts: RwLock<HashMap<String, Artifact>>,
}

impl ArtifactStore {
    /// Creates an empty store for an execution.
    #[must_use]
    pub fn new(execution: ExecutionId) -> Self {
        Self {
            execution,
            artifacts: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the owning execution.
    #[must_use]
    pub fn execution(&self) -> ExecutionId {
        self.execution
    }

    /// Records a produced artifact.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateArtifactError` if the name was already
    /// produced in this execution.
    pub fn put(&self, artifact: Artifact) -> Result<(), DuplicateArtifactError> {
        let mut artifacts = self.artifacts.write();

        if let Some(existing) = artifacts.get(&artifact.name) {
            return Err(DuplicateArtifactError::new(
                &artifact.name,
                &artifact.produced_by,
                &existing.produced_by,
            ));
        }

        artifacts.insert(artifact.name.clone(), artifact);
        Ok(())
    }

    /// Fetches a produced artifact.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactNotReadyError` if the artifact has not been
    /// produced yet.
    pub fn get(&self, name: &str) -> Result<Artifact, ArtifactNotReadyError> {
        self.artifacts
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ArtifactNotReadyError::new(name))
    }

    /// Returns true if the artifact exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.artifacts.read().contains_key(name)
    }

    /// Resolves a qualified variable (`Namespace.KEY`) published by any
    /// produced artifact.
    #[must_use]
    pub fn variable(&self, qualified: &str) -> Option<String> {
        let (namespace, key) = qualified.split_once('.')?;
        self.artifacts.read().values().find_map(|artifact| {
            if artifact.namespace.as_deref() == Some(namespace) {
                artifact.variable(key).map(ToString::to_string)
            } else {
                None
            }
        })
    }

    /// Returns all produced artifact names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.artifacts.read().keys().cloned().collect()
    }

    /// Returns copies of all produced artifacts.
    #[must_use]
    pub fn artifacts(&self) -> Vec<Artifact> {
        self.artifacts.read().values().cloned().collect()
    }

    /// Returns the number of produced artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    /// Returns true if nothing has been produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }
}
