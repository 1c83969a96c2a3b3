//! Embedding registry — an immutable snapshot of enrolled embeddings.
//!
//! Readers take an `Arc<Snapshot>` and keep it for as long as they need;
//! a rebuild constructs a fresh snapshot off to the side and swaps the
//! handle, so no reader ever sees a half-updated roster.

use crate::types::{Embedding, Identity};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// One enrolled identity as seen by the matcher.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub key: String,
    pub name: String,
    pub embedding: Embedding,
}

/// Read-only view of the roster at one point in time.
#[derive(Debug, Default)]
pub struct Snapshot {
    dimension: usize,
    entries: Vec<RosterEntry>,
}

impl Snapshot {
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&RosterEntry> {
        self.entries.iter().find(|e| e.key == key)
    }
}

/// Outcome of a rebuild: how many entries made it in and which were dropped.
#[derive(Debug, Default)]
pub struct RebuildReport {
    pub loaded: usize,
    pub skipped: Vec<(String, RegistryError)>,
}

pub struct Registry {
    dimension: usize,
    current: RwLock<Arc<Snapshot>>,
}

impl Registry {
    /// Create an empty registry accepting embeddings of `dimension` values.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            current: RwLock::new(Arc::new(Snapshot {
                dimension,
                entries: Vec::new(),
            })),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Check that an embedding has the registry's dimension.
    pub fn validate(&self, embedding: &Embedding) -> Result<(), RegistryError> {
        if embedding.dimension() != self.dimension {
            return Err(RegistryError::InvalidDimension {
                expected: self.dimension,
                actual: embedding.dimension(),
            });
        }
        Ok(())
    }

    /// Replace the whole roster.
    ///
    /// Entries with the wrong dimension are skipped and reported; they
    /// never abort the rebuild. A repeated key keeps its first occurrence.
    pub fn rebuild<I>(&self, identities: I) -> RebuildReport
    where
        I: IntoIterator<Item = Identity>,
    {
        let mut report = RebuildReport::default();
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for identity in identities {
            if let Err(e) = self.validate(&identity.embedding) {
                tracing::warn!(key = %identity.key, error = %e, "skipping identity");
                report.skipped.push((identity.key, e));
                continue;
            }
            if !seen.insert(identity.key.clone()) {
                tracing::warn!(key = %identity.key, "duplicate identity key in rebuild; keeping first");
                continue;
            }
            entries.push(RosterEntry {
                key: identity.key,
                name: identity.name,
                embedding: identity.embedding,
            });
        }

        report.loaded = entries.len();
        let snapshot = Arc::new(Snapshot {
            dimension: self.dimension,
            entries,
        });

        *self.current.write() = snapshot;

        tracing::info!(
            loaded = report.loaded,
            skipped = report.skipped.len(),
            "registry rebuilt"
        );
        report
    }

    /// Current roster. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }
}
