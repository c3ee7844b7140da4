//! Off-chain persistence: image blobs and photo/vouch records.
//!
//! Both stores are external collaborators. [`MemoryStore`] implements both
//! traits for tests and dry runs; [`PgRecordStore`] and [`StorageBucket`] are
//! the production adapters behind the `postgres` and `network` features.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "network")]
mod storage;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgRecordStore;
#[cfg(feature = "network")]
pub use storage::{StorageBucket, StorageBucketConfig};

use async_trait::async_trait;
use thiserror::Error;

use crate::record::{Earnings, NewPhoto, NewVouch, PhotoId, StoredPhoto, StoredVouch, VouchWrite};

/// Bucket captured images are written to.
pub const PHOTO_BUCKET: &str = "photos";

/// Content type of every uploaded capture.
pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The record itself is unacceptable; retrying cannot help.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Query(_) | Self::Upload(_)
        )
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(e.to_string())
            }
            sqlx::Error::Database(ref db) => from_database_error(db.kind(), db.message()),
            _ => Self::Query(e.to_string()),
        }
    }
}

/// Constraint violations are permanent: the same row fails the same way again.
#[cfg(feature = "postgres")]
fn from_database_error(kind: sqlx::error::ErrorKind, message: &str) -> StorageError {
    use sqlx::error::ErrorKind;

    match kind {
        ErrorKind::UniqueViolation => StorageError::Conflict(message.to_string()),
        ErrorKind::ForeignKeyViolation | ErrorKind::NotNullViolation | ErrorKind::CheckViolation => {
            StorageError::InvalidRecord(message.to_string())
        }
        _ => StorageError::Query(message.to_string()),
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::Connection(format!("migration failed: {e}"))
    }
}

/// Object storage for captured images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return the public URL. Never overwrites.
    async fn upload(&self, bytes: &[u8], key: &str, content_type: &str)
        -> Result<String, StorageError>;
}

/// Relational store for photos and vouches.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a verified photo. Refuses a record whose ledger step is still
    /// pending. Inserting the same `(creator, hash)` twice returns the
    /// existing id.
    async fn insert_photo(&self, photo: &NewPhoto) -> Result<PhotoId, StorageError>;

    /// Insert the vouch row and bump the photo's counters as one operation.
    /// A repeat with the same transaction signature changes nothing.
    async fn record_vouch(&self, vouch: &NewVouch) -> Result<VouchWrite, StorageError>;

    async fn photo(&self, id: PhotoId) -> Result<Option<StoredPhoto>, StorageError>;

    /// Vouches for a photo, newest first.
    async fn vouches_for_photo(&self, id: PhotoId) -> Result<Vec<StoredVouch>, StorageError>;

    /// Vouches given by a wallet, newest first.
    async fn vouches_by_wallet(&self, wallet: &str) -> Result<Vec<StoredVouch>, StorageError>;

    /// Up to `limit` photos across all creators, newest first.
    async fn recent_photos(&self, limit: u32) -> Result<Vec<StoredPhoto>, StorageError>;

    /// Photos verified by `wallet`, newest first.
    async fn photos_by_creator(&self, wallet: &str) -> Result<Vec<StoredPhoto>, StorageError>;

    /// Vouch totals over every photo `wallet` created. Zero for unknown wallets.
    async fn earnings(&self, wallet: &str) -> Result<Earnings, StorageError>;
}

/// Shared guard for every store: a pending verification must never be written.
pub(crate) fn ensure_resolved(photo: &NewPhoto) -> Result<(), StorageError> {
    if photo.verification.is_resolved() {
        Ok(())
    } else {
        Err(StorageError::InvalidRecord(
            "verification still pending".into(),
        ))
    }
}

/// Amounts are stored as signed 64-bit integers.
pub(crate) fn lamports_column(amount: u64) -> Result<i64, StorageError> {
    i64::try_from(amount)
        .map_err(|_| StorageError::InvalidRecord(format!("amount {amount} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::Connection("reset".into()).is_transient());
        assert!(StorageError::Query("timeout".into()).is_transient());
        assert!(StorageError::Upload("502".into()).is_transient());
        assert!(!StorageError::InvalidRecord("pending".into()).is_transient());
        assert!(!StorageError::Serialization("bad".into()).is_transient());
        assert!(!StorageError::Conflict("exists".into()).is_transient());
    }

    #[test]
    fn test_lamports_column_range() {
        assert_eq!(lamports_column(5_000_000), Ok(5_000_000));
        assert!(lamports_column(u64::MAX).is_err());
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn test_constraint_violations_are_not_retried() {
        use sqlx::error::ErrorKind;

        let missing_photo = from_database_error(
            ErrorKind::ForeignKeyViolation,
            "insert or update on table \"vouches\" violates foreign key constraint",
        );
        assert!(matches!(missing_photo, StorageError::InvalidRecord(_)));
        assert!(!missing_photo.is_transient());

        let duplicate = from_database_error(ErrorKind::UniqueViolation, "duplicate key");
        assert!(matches!(duplicate, StorageError::Conflict(_)));

        let other = from_database_error(ErrorKind::Other, "deadlock detected");
        assert!(other.is_transient());
    }
}
