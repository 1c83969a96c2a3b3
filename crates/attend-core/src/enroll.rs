//! Enrollment and removal of identities.
//!
//! Every successful change to the identity store is followed by a full
//! registry rebuild from `list_all()`, so the matcher only ever sees what
//! the store holds.

use crate::attendance::AttendanceGate;
use crate::greeting::GreetingGate;
use crate::oracle::{EmbeddingOracle, OracleError};
use crate::registry::{RebuildReport, Registry, RegistryError};
use crate::store::{IdentityStore, StoreError};
use crate::types::Identity;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("identity {0} is already enrolled")]
    DuplicateIdentity(String),
    #[error("no face detected in enrollment image")]
    NoFaceDetected,
    #[error("expected one face in enrollment image, found {0}")]
    MultipleFaces(usize),
    #[error(transparent)]
    InvalidDimension(#[from] RegistryError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Enrollment {
    store: Arc<dyn IdentityStore>,
    registry: Arc<Registry>,
    gates: Option<(Arc<AttendanceGate>, Arc<GreetingGate>)>,
    /// Serializes check-then-write sequences against the store.
    write_lock: Mutex<()>,
}

impl Enrollment {
    pub fn new(store: Arc<dyn IdentityStore>, registry: Arc<Registry>) -> Self {
        Self {
            store,
            registry,
            gates: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Clear a removed identity's gate state as part of [`remove`](Self::remove).
    pub fn with_gates(mut self, attendance: Arc<AttendanceGate>, greetings: Arc<GreetingGate>) -> Self {
        self.gates = Some((attendance, greetings));
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    /// Rebuild the registry from everything in the store.
    pub fn reload(&self) -> Result<RebuildReport, StoreError> {
        let identities = self.store.list_all()?;
        Ok(self.registry.rebuild(identities))
    }

    /// Enroll a new identity from an image holding exactly one face.
    ///
    /// Nothing is written unless every check passes.
    pub fn enroll<O: EmbeddingOracle>(
        &self,
        oracle: &O,
        key: &str,
        name: &str,
        image: &O::Image,
        now: DateTime<Local>,
    ) -> Result<Identity, EnrollError> {
        let _guard = self.write_lock.lock();

        if self.store.get(key)?.is_some() {
            return Err(EnrollError::DuplicateIdentity(key.to_string()));
        }

        let mut faces = oracle.extract(image)?;
        let embedding = match faces.len() {
            0 => return Err(EnrollError::NoFaceDetected),
            1 => faces.remove(0),
            n => return Err(EnrollError::MultipleFaces(n)),
        };
        self.registry.validate(&embedding)?;

        let identity = Identity {
            key: key.to_string(),
            name: name.to_string(),
            embedding,
            created_at: now,
        };
        self.store.put(&identity)?;
        tracing::info!(key, name, "identity enrolled");

        self.reload()?;
        Ok(identity)
    }

    /// Remove an identity. Returns whether it existed.
    pub fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock();

        let removed = self.store.delete(key)?;
        if removed {
            tracing::info!(key, "identity removed");
            if let Some((attendance, greetings)) = &self.gates {
                attendance.forget(key);
                greetings.forget(key);
            }
            self.reload()?;
        }
        Ok(removed)
    }
}
