use std::{
    collections::{hash_map::Entry, HashMap},
    error::Error as StdError,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::CredentialRecord;

/// Storage client the credential service is built on.
///
/// `insert` must reject a second record for an existing username atomically,
/// returning [`StoreError::Duplicate`]; the service relies on this rather
/// than on its own lookup.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persists a new record.
    async fn insert(&self, record: &CredentialRecord) -> Result<(), StoreError>;

    /// Loads the record for the exact (case-sensitive) username.
    async fn find(&self, username: &str) -> Result<Option<CredentialRecord>, StoreError>;
}

/// Errors reported by a [`CredentialStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a credential for this username already exists")]
    Duplicate,
    #[error("storage round-trip exceeded {0:?}")]
    Timeout(Duration),
    #[error("storage backend failure: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}

/// Process-local store keyed by username.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    records: Mutex<HashMap<String, CredentialRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn insert(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::backend(PoisonedStore))?;
        match records.entry(record.username.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn find(&self, username: &str) -> Result<Option<CredentialRecord>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError::backend(PoisonedStore))?;
        Ok(records.get(username).cloned())
    }
}

#[derive(Debug, Error)]
#[error("in-memory credential store lock is poisoned")]
struct PoisonedStore;
