//! Credential registration and verification.
//!
//! [`CredentialService`] hashes passwords with bcrypt and checks sign-in
//! attempts against records held by an injected [`CredentialStore`].

pub mod error;
pub mod password;
pub mod service;
pub mod store;
pub mod types;

pub use error::AuthError;
pub use password::{HashError, PasswordHasher};
pub use service::CredentialService;
pub use store::{CredentialStore, MemoryCredentialStore, StoreError};
pub use types::{Authenticated, CredentialRecord};
