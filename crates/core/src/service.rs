use std::{future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::password::{HashError, PasswordHasher};
use crate::store::{CredentialStore, StoreError};
use crate::types::{Authenticated, CredentialRecord};

pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Registers credentials and verifies sign-in attempts against a
/// [`CredentialStore`].
///
/// Hashing runs on the blocking pool and every storage round-trip is bounded
/// by the configured timeout.
#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    storage_timeout: Duration,
}

impl CredentialService {
    pub fn new(store: Arc<dyn CredentialStore>, hasher: PasswordHasher) -> Self {
        Self {
            store,
            hasher,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }

    pub fn with_storage_timeout(mut self, storage_timeout: Duration) -> Self {
        self.storage_timeout = storage_timeout;
        self
    }

    /// Creates a credential for `username`.
    pub async fn register(&self, username: &str, password: &str) -> Result<(), AuthError> {
        self.register_with_domain(username, password, None).await
    }

    /// Creates a credential for `username`, storing `domain` alongside it.
    ///
    /// The domain is opaque: it takes no part in uniqueness or verification.
    pub async fn register_with_domain(
        &self,
        username: &str,
        password: &str,
        domain: Option<&str>,
    ) -> Result<(), AuthError> {
        require("username", username)?;
        require("password", password)?;
        self.hasher.check_length(password)?;

        // Fast path only; the store's insert is the authority on uniqueness.
        if self.bounded(self.store.find(username)).await?.is_some() {
            debug!(stage = "auth", %username, "registration rejected, username taken");
            return Err(AuthError::DuplicateUsername);
        }

        let password_hash = self.hash(password).await?;
        let record = CredentialRecord {
            username: username.to_string(),
            password_hash,
            domain: domain.filter(|value| !value.is_empty()).map(str::to_string),
            created_at: Utc::now(),
        };

        self.bounded(self.store.insert(&record)).await?;
        debug!(stage = "auth", %username, "credential registered");
        Ok(())
    }

    /// Checks `password` against the credential stored for `username`.
    pub async fn verify(&self, username: &str, password: &str) -> Result<Authenticated, AuthError> {
        require("username", username)?;
        require("password", password)?;

        let Some(record) = self.bounded(self.store.find(username)).await? else {
            self.burn_dummy(password).await;
            return Err(AuthError::UnknownUser);
        };

        if self.check(password, &record.password_hash).await? {
            Ok(record.into())
        } else {
            Err(AuthError::InvalidCredential)
        }
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let outcome = match timeout(self.storage_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.storage_timeout)),
        };

        outcome.map_err(|err| {
            if !matches!(err, StoreError::Duplicate) {
                warn!(stage = "auth", error = %err, "credential storage round-trip failed");
            }
            AuthError::from(err)
        })
    }

    async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|_| HashError::Failed)?
            .map_err(AuthError::from)
    }

    async fn check(&self, password: &str, stored: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let stored = stored.to_string();
        let matched = tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
            .await
            .map_err(|_| HashError::Failed)?;

        matched.map_err(|err| {
            warn!(stage = "auth", error = %err, "stored credential could not be checked");
            AuthError::from(err)
        })
    }

    async fn burn_dummy(&self, password: &str) {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let _ = tokio::task::spawn_blocking(move || hasher.verify_dummy(&password)).await;
    }
}

fn require(field: &'static str, value: &str) -> Result<(), AuthError> {
    if value.is_empty() {
        return Err(AuthError::MissingField(field));
    }
    Ok(())
}
