use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;

/// Longest input bcrypt reads; later bytes are silently dropped.
pub const MAX_PASSWORD_BYTES: usize = 72;

const TIMING_DUMMY_PASSWORD: &str = "credvault-timing-equalizer";

/// Errors raised while hashing or checking a password.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("bcrypt cost must be between 4 and 31 (got {0})")]
    InvalidCost(u32),
    #[error("password is longer than 72 bytes")]
    PasswordTooLong,
    #[error("stored password hash is malformed")]
    MalformedHash,
    #[error("password hashing failed")]
    Failed,
}

/// Salted one-way password hashing backed by bcrypt.
///
/// Every call to [`PasswordHasher::hash`] draws a fresh random salt, which
/// bcrypt embeds in the returned modular-crypt string. When a pepper is set
/// the password is first reduced to `hex(HMAC-SHA256(pepper, password))`,
/// which also keeps long passwords under bcrypt's 72-byte input limit.
/// Without a pepper, passwords longer than [`MAX_PASSWORD_BYTES`] are
/// refused rather than truncated.
///
/// The dummy hash used for unknown usernames is built at the configured
/// cost only. A stored record hashed at another cost (a legacy `$2a$10$`
/// hash, or one written before `BCRYPT_COST` changed) takes a different time
/// to check than the dummy, so timing can still separate those users from
/// unknown ones.
#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    pepper: Option<Arc<[u8]>>,
    dummy_hash: Arc<str>,
}

impl PasswordHasher {
    /// Builds a hasher for the given work factor.
    ///
    /// This computes one bcrypt hash up front, used by
    /// [`PasswordHasher::verify_dummy`].
    pub fn new(cost: u32, pepper: Option<Vec<u8>>) -> Result<Self, HashError> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(HashError::InvalidCost(cost));
        }

        let mut hasher = Self {
            cost,
            pepper: pepper.map(Arc::from),
            dummy_hash: Arc::from(""),
        };
        hasher.dummy_hash = Arc::from(hasher.hash(TIMING_DUMMY_PASSWORD)?);
        Ok(hasher)
    }

    /// Fails with [`HashError::PasswordTooLong`] when bcrypt would truncate
    /// the password.
    pub fn check_length(&self, password: &str) -> Result<(), HashError> {
        if self.pepper.is_none() && password.len() > MAX_PASSWORD_BYTES {
            return Err(HashError::PasswordTooLong);
        }
        Ok(())
    }

    /// Hashes the password with a fresh salt.
    pub fn hash(&self, password: &str) -> Result<String, HashError> {
        let material = self.material(password)?;
        bcrypt::hash(material, self.cost).map_err(|_| HashError::Failed)
    }

    /// Checks the password against a stored hash.
    ///
    /// The salt and cost are read from `stored`; digests are compared in
    /// constant time by `bcrypt::verify`. A password that could never have
    /// been hashed (see [`PasswordHasher::check_length`]) never matches, but
    /// still pays for a full bcrypt round against `stored`.
    pub fn verify(&self, password: &str, stored: &str) -> Result<bool, HashError> {
        match self.material(password) {
            Ok(material) => bcrypt::verify(material, stored).map_err(|_| HashError::MalformedHash),
            Err(HashError::PasswordTooLong) => {
                let prefix = &password.as_bytes()[..MAX_PASSWORD_BYTES];
                bcrypt::verify(prefix, stored)
                    .map(|_| false)
                    .map_err(|_| HashError::MalformedHash)
            }
            Err(err) => Err(err),
        }
    }

    /// Runs a full verification against an internal hash of the configured cost
    /// and discards the result.
    pub fn verify_dummy(&self, password: &str) {
        let _ = self.verify(password, &self.dummy_hash);
    }

    fn material(&self, password: &str) -> Result<Vec<u8>, HashError> {
        self.check_length(password)?;
        let Some(pepper) = self.pepper.as_deref() else {
            return Ok(password.as_bytes().to_vec());
        };

        let mut mac = HmacSha256::new_from_slice(pepper).map_err(|_| HashError::Failed)?;
        mac.update(password.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()).into_bytes())
    }
}
