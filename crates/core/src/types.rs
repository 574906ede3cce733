use std::fmt;

use chrono::{DateTime, Utc};

/// Persisted association between a username and the bcrypt hash of its password.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub username: String,
    pub password_hash: String,
    pub domain: Option<String>,
    pub created_at: DateTime<Utc>,
}

// Debug output never includes the hash.
impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("domain", &self.domain)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Outcome of a successful credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub username: String,
    pub domain: Option<String>,
}

impl From<CredentialRecord> for Authenticated {
    fn from(record: CredentialRecord) -> Self {
        Self {
            username: record.username,
            domain: record.domain,
        }
    }
}
