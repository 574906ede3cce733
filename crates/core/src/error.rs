use thiserror::Error;

use crate::password::HashError;
use crate::store::StoreError;

/// Failures surfaced by [`crate::service::CredentialService`].
///
/// None of the variants carry plaintext passwords or stored hashes, so the
/// `Display` output is safe to log.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0} must not be empty")]
    MissingField(&'static str),
    #[error("password is longer than 72 bytes")]
    PasswordTooLong,
    #[error("username is already registered")]
    DuplicateUsername,
    #[error("no credential is registered for this username")]
    UnknownUser,
    #[error("password does not match the stored credential")]
    InvalidCredential,
    #[error("credential storage is unavailable: {0}")]
    StorageUnavailable(#[source] StoreError),
    #[error(transparent)]
    Hashing(HashError),
}

impl AuthError {
    /// Returns the stable label used for metrics and problem types.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "missing_field",
            Self::PasswordTooLong => "password_too_long",
            Self::DuplicateUsername => "duplicate_username",
            Self::UnknownUser => "unknown_user",
            Self::InvalidCredential => "invalid_credential",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::Hashing(_) => "hashing",
        }
    }
}

impl From<HashError> for AuthError {
    fn from(err: HashError) -> Self {
        match err {
            HashError::PasswordTooLong => Self::PasswordTooLong,
            other => Self::Hashing(other),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => Self::DuplicateUsername,
            other => Self::StorageUnavailable(other),
        }
    }
}
