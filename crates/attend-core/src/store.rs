use crate::types::Identity;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("identity store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent home of enrolled identities.
pub trait IdentityStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Identity>, StoreError>;
    /// Insert or replace the identity under its key.
    fn put(&self, identity: &Identity) -> Result<(), StoreError>;
    /// Remove an identity. Returns whether one existed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
    fn list_all(&self) -> Result<Vec<Identity>, StoreError>;
}
