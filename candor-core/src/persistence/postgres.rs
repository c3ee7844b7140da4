//! PostgreSQL record store.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ensure_resolved, lamports_column, RecordStore, StorageError};
use crate::record::{Earnings, NewPhoto, NewVouch, PhotoId, StoredPhoto, StoredVouch, VouchWrite};

const PHOTO_COLUMNS: &str = "id, creator_wallet, image_url, image_hash, caption, latitude, \
     longitude, location_accuracy, verification_tx, vouch_count, total_earned_lamports, created_at";

const VOUCH_COLUMNS: &str = "id, photo_id, voucher_wallet, amount_lamports, tx_signature, created_at";

/// `photos` and `vouches` tables behind a connection pool.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Connect and apply the embedded migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        info!("Record store connected and migrations applied");
        Ok(store)
    }

    /// Wrap an existing pool. Migrations are not run.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn check_health(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert_photo(&self, photo: &NewPhoto) -> Result<PhotoId, StorageError> {
        ensure_resolved(photo)?;

        // The no-op update makes RETURNING yield the existing id on conflict.
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO photos (
                creator_wallet, image_url, image_hash, caption,
                latitude, longitude, location_accuracy, verification_tx
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (creator_wallet, image_hash) DO UPDATE SET
                creator_wallet = EXCLUDED.creator_wallet
            RETURNING id
            "#,
        )
        .bind(photo.creator_wallet.to_string())
        .bind(&photo.image_url)
        .bind(photo.image_hash.to_hex())
        .bind(&photo.caption)
        .bind(photo.location.map(|l| l.latitude()))
        .bind(photo.location.map(|l| l.longitude()))
        .bind(photo.location.and_then(|l| l.accuracy()))
        .bind(photo.verification_tx())
        .fetch_one(&self.pool)
        .await?;

        debug!(%id, image_hash = %photo.image_hash, "Photo row written");
        Ok(id)
    }

    async fn record_vouch(&self, vouch: &NewVouch) -> Result<VouchWrite, StorageError> {
        let amount = lamports_column(vouch.amount_lamports)?;
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO vouches (photo_id, voucher_wallet, amount_lamports, tx_signature)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tx_signature) DO NOTHING
            "#,
        )
        .bind(vouch.photo_id)
        .bind(vouch.voucher_wallet.to_string())
        .bind(amount)
        .bind(vouch.tx_signature.to_string())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            debug!(signature = %vouch.tx_signature, "Vouch already recorded");
            return Ok(VouchWrite::AlreadyRecorded);
        }

        sqlx::query(
            r#"
            UPDATE photos
            SET vouch_count = vouch_count + 1,
                total_earned_lamports = total_earned_lamports + $2
            WHERE id = $1
            "#,
        )
        .bind(vouch.photo_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(VouchWrite::Recorded)
    }

    async fn photo(&self, id: PhotoId) -> Result<Option<StoredPhoto>, StorageError> {
        let row = sqlx::query_as::<_, StoredPhoto>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn vouches_for_photo(&self, id: PhotoId) -> Result<Vec<StoredVouch>, StorageError> {
        let rows = sqlx::query_as::<_, StoredVouch>(&format!(
            "SELECT {VOUCH_COLUMNS} FROM vouches WHERE photo_id = $1 ORDER BY created_at DESC"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn vouches_by_wallet(&self, wallet: &str) -> Result<Vec<StoredVouch>, StorageError> {
        let rows = sqlx::query_as::<_, StoredVouch>(&format!(
            "SELECT {VOUCH_COLUMNS} FROM vouches WHERE voucher_wallet = $1 ORDER BY created_at DESC"
        ))
        .bind(wallet)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn recent_photos(&self, limit: u32) -> Result<Vec<StoredPhoto>, StorageError> {
        let rows = sqlx::query_as::<_, StoredPhoto>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn photos_by_creator(&self, wallet: &str) -> Result<Vec<StoredPhoto>, StorageError> {
        let rows = sqlx::query_as::<_, StoredPhoto>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE creator_wallet = $1 ORDER BY created_at DESC"
        ))
        .bind(wallet)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn earnings(&self, wallet: &str) -> Result<Earnings, StorageError> {
        let earnings = sqlx::query_as::<_, Earnings>(
            r#"
            SELECT
                COALESCE(SUM(total_earned_lamports), 0)::BIGINT AS total_earned_lamports,
                COALESCE(SUM(vouch_count), 0)::BIGINT AS total_vouches,
                COUNT(*) AS photo_count
            FROM photos
            WHERE creator_wallet = $1
            "#,
        )
        .bind(wallet)
        .fetch_one(&self.pool)
        .await?;
        Ok(earnings)
    }
}
