use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use thiserror::Error;
use uuid::Uuid;

use credvault_core::{CredentialRecord, CredentialStore, StoreError};

const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        Self::connect_with_timeout(database_url, DEFAULT_ACQUIRE_TIMEOUT).await
    }

    /// Same as [`Database::connect`], bounding pool checkout by `acquire_timeout`.
    pub async fn connect_with_timeout(
        database_url: &str,
        acquire_timeout: Duration,
    ) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle for reading and creating credential records.
    pub fn credentials(&self) -> CredentialRepository {
        CredentialRepository {
            pool: self.pool.clone(),
        }
    }

    /// Closes every pooled connection; later queries fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
}

/// Repository responsible for the `credentials` table.
#[derive(Clone)]
pub struct CredentialRepository {
    pool: SqlitePool,
}

impl CredentialRepository {
    /// Inserts a credential, relying on the `UNIQUE(username)` constraint to
    /// reject a second registration.
    pub async fn insert(&self, record: &CredentialRecord) -> Result<(), CredentialError> {
        let result = sqlx::query(
            "INSERT INTO credentials (id, username, password_hash, domain, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&record.username)
        .bind(&record.password_hash)
        .bind(&record.domain)
        .bind(to_rfc3339(record.created_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) => {
                if db_err.code().as_deref() == Some("2067") {
                    return Err(CredentialError::DuplicateUsername);
                }
                Err(CredentialError::Database(sqlx::Error::Database(db_err)))
            }
            Err(err) => Err(CredentialError::Database(err)),
        }
    }

    /// Loads the credential for `username` (compared byte-wise).
    pub async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<CredentialRecord>, CredentialError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT username, password_hash, domain, created_at \
             FROM credentials WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CredentialRow::into_domain))
    }

    /// Counts stored credentials.
    pub async fn count(&self) -> Result<u64, CredentialError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM credentials")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl CredentialStore for CredentialRepository {
    async fn insert(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        CredentialRepository::insert(self, record)
            .await
            .map_err(StoreError::from)
    }

    async fn find(&self, username: &str) -> Result<Option<CredentialRecord>, StoreError> {
        self.find_by_username(username)
            .await
            .map_err(StoreError::from)
    }
}

/// Errors that can occur while reading or writing credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("a credential with the same username already exists")]
    DuplicateUsername,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for CredentialError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

impl From<CredentialError> for StoreError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::DuplicateUsername => StoreError::Duplicate,
            CredentialError::Database(err) => StoreError::backend(err),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialRow {
    username: String,
    password_hash: String,
    domain: Option<String>,
    created_at: DateTime<Utc>,
}

impl CredentialRow {
    fn into_domain(self) -> CredentialRecord {
        CredentialRecord {
            username: self.username,
            password_hash: self.password_hash,
            domain: self.domain,
            created_at: self.created_at,
        }
    }
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
