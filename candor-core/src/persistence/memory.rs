//! In-memory record and blob store with failure injection.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{ensure_resolved, lamports_column, BlobStore, RecordStore, StorageError};
use crate::record::{Earnings, NewPhoto, NewVouch, PhotoId, StoredPhoto, StoredVouch, VouchWrite};

const MEMORY_URL_PREFIX: &str = "memory://photos/";

#[derive(Default)]
struct Faults {
    inserts: AtomicU32,
    vouch_writes: AtomicU32,
    uploads: AtomicU32,
    error: Mutex<Option<StorageError>>,
}

impl Faults {
    /// Consume one injected failure from `counter`, if any are left.
    fn take(&self, counter: &AtomicU32) -> Result<(), StorageError> {
        let injected = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            Err(self
                .error
                .lock()
                .clone()
                .unwrap_or_else(|| StorageError::Connection("injected failure".into())))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct Calls {
    inserts: AtomicU32,
    vouch_writes: AtomicU32,
    uploads: AtomicU32,
}

#[derive(Default)]
struct Inner {
    photos: DashMap<PhotoId, StoredPhoto>,
    /// `(creator, hex hash)` to photo id; the uniqueness constraint.
    photo_keys: DashMap<(String, String), PhotoId>,
    vouches: DashMap<String, StoredVouch>,
    blobs: DashMap<String, Vec<u8>>,
    faults: Faults,
    calls: Calls,
}

/// Record store and blob store held in process memory.
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` photo inserts.
    pub fn fail_inserts(&self, n: u32) {
        self.inner.faults.inserts.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` vouch bookkeeping writes.
    pub fn fail_vouch_writes(&self, n: u32) {
        self.inner.faults.vouch_writes.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` uploads.
    pub fn fail_uploads(&self, n: u32) {
        self.inner.faults.uploads.store(n, Ordering::SeqCst);
    }

    /// Error returned by injected failures. Defaults to a transient
    /// connection error.
    pub fn set_failure(&self, error: StorageError) {
        *self.inner.faults.error.lock() = Some(error);
    }

    pub fn insert_calls(&self) -> u32 {
        self.inner.calls.inserts.load(Ordering::SeqCst)
    }

    pub fn vouch_write_calls(&self) -> u32 {
        self.inner.calls.vouch_writes.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> u32 {
        self.inner.calls.uploads.load(Ordering::SeqCst)
    }

    pub fn photo_count(&self) -> usize {
        self.inner.photos.len()
    }

    pub fn vouch_count(&self) -> usize {
        self.inner.vouches.len()
    }

    pub fn blob_keys(&self) -> Vec<String> {
        self.inner.blobs.iter().map(|e| e.key().clone()).collect()
    }

    pub fn blob(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.blobs.get(key).map(|e| e.value().clone())
    }

    /// All stored photos, in no particular order.
    pub fn photos(&self) -> Vec<StoredPhoto> {
        self.inner.photos.iter().map(|e| e.value().clone()).collect()
    }

    fn photos_where(&self, keep: impl Fn(&StoredPhoto) -> bool) -> Vec<StoredPhoto> {
        let mut photos: Vec<StoredPhoto> = self
            .inner
            .photos
            .iter()
            .filter(|e| keep(e.value()))
            .map(|e| e.value().clone())
            .collect();
        photos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        photos
    }

    fn vouches_where(&self, keep: impl Fn(&StoredVouch) -> bool) -> Vec<StoredVouch> {
        let mut vouches: Vec<StoredVouch> = self
            .inner
            .vouches
            .iter()
            .filter(|e| keep(e.value()))
            .map(|e| e.value().clone())
            .collect();
        vouches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        vouches
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn upload(
        &self,
        bytes: &[u8],
        key: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        self.inner.calls.uploads.fetch_add(1, Ordering::SeqCst);
        self.inner.faults.take(&self.inner.faults.uploads)?;

        match self.inner.blobs.entry(key.to_string()) {
            Entry::Occupied(_) => {
                Err(StorageError::Conflict(format!("object {key} already exists")))
            }
            Entry::Vacant(slot) => {
                slot.insert(bytes.to_vec());
                debug!(key, bytes = bytes.len(), "Blob stored");
                Ok(format!("{MEMORY_URL_PREFIX}{key}"))
            }
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_photo(&self, photo: &NewPhoto) -> Result<PhotoId, StorageError> {
        self.inner.calls.inserts.fetch_add(1, Ordering::SeqCst);
        ensure_resolved(photo)?;
        self.inner.faults.take(&self.inner.faults.inserts)?;

        let creator = photo.creator_wallet.to_string();
        let hash = photo.image_hash.to_hex();
        let slot = match self.inner.photo_keys.entry((creator.clone(), hash.clone())) {
            Entry::Occupied(existing) => return Ok(*existing.get()),
            Entry::Vacant(slot) => slot,
        };

        let id = Uuid::new_v4();
        self.inner.photos.insert(
            id,
            StoredPhoto {
                id,
                creator_wallet: creator,
                image_url: photo.image_url.clone(),
                image_hash: hash,
                caption: photo.caption.clone(),
                latitude: photo.location.map(|l| l.latitude()),
                longitude: photo.location.map(|l| l.longitude()),
                location_accuracy: photo.location.and_then(|l| l.accuracy()),
                verification_tx: photo.verification_tx(),
                vouch_count: 0,
                total_earned_lamports: 0,
                created_at: Utc::now(),
            },
        );
        slot.insert(id);
        Ok(id)
    }

    async fn record_vouch(&self, vouch: &NewVouch) -> Result<VouchWrite, StorageError> {
        self.inner.calls.vouch_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.faults.take(&self.inner.faults.vouch_writes)?;

        let amount = lamports_column(vouch.amount_lamports)?;
        let signature = vouch.tx_signature.to_string();

        let Some(mut photo) = self.inner.photos.get_mut(&vouch.photo_id) else {
            return Err(StorageError::InvalidRecord(format!(
                "photo {} does not exist",
                vouch.photo_id
            )));
        };

        match self.inner.vouches.entry(signature.clone()) {
            Entry::Occupied(_) => return Ok(VouchWrite::AlreadyRecorded),
            Entry::Vacant(slot) => {
                slot.insert(StoredVouch {
                    id: Uuid::new_v4(),
                    photo_id: vouch.photo_id,
                    voucher_wallet: vouch.voucher_wallet.to_string(),
                    amount_lamports: amount,
                    tx_signature: signature,
                    created_at: Utc::now(),
                });
            }
        }

        photo.vouch_count += 1;
        photo.total_earned_lamports += amount;
        Ok(VouchWrite::Recorded)
    }

    async fn photo(&self, id: PhotoId) -> Result<Option<StoredPhoto>, StorageError> {
        Ok(self.inner.photos.get(&id).map(|e| e.value().clone()))
    }

    async fn vouches_for_photo(&self, id: PhotoId) -> Result<Vec<StoredVouch>, StorageError> {
        Ok(self.vouches_where(|v| v.photo_id == id))
    }

    async fn vouches_by_wallet(&self, wallet: &str) -> Result<Vec<StoredVouch>, StorageError> {
        Ok(self.vouches_where(|v| v.voucher_wallet == wallet))
    }

    async fn recent_photos(&self, limit: u32) -> Result<Vec<StoredPhoto>, StorageError> {
        let mut photos = self.photos_where(|_| true);
        photos.truncate(limit as usize);
        Ok(photos)
    }

    async fn photos_by_creator(&self, wallet: &str) -> Result<Vec<StoredPhoto>, StorageError> {
        Ok(self.photos_where(|p| p.creator_wallet == wallet))
    }

    async fn earnings(&self, wallet: &str) -> Result<Earnings, StorageError> {
        Ok(Earnings::from_photos(
            self.photos_where(|p| p.creator_wallet == wallet).iter(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ImageHash;
    use crate::record::VerificationTx;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Signature;

    fn new_photo(verification: VerificationTx) -> NewPhoto {
        NewPhoto {
            creator_wallet: Pubkey::new_unique(),
            image_url: "memory://photos/a.jpg".into(),
            image_hash: ImageHash::of(b"a"),
            caption: Some("sunset".into()),
            location: None,
            verification,
        }
    }

    #[tokio::test]
    async fn test_refuses_pending_verification() {
        let store = MemoryStore::new();
        let result = store.insert_photo(&new_photo(VerificationTx::Pending)).await;
        assert!(matches!(result, Err(StorageError::InvalidRecord(_))));
        assert_eq!(store.photo_count(), 0);
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_per_creator_and_hash() {
        let store = MemoryStore::new();
        let photo = new_photo(VerificationTx::Skipped);
        let first = store.insert_photo(&photo).await.unwrap();
        let second = store.insert_photo(&photo).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.photo_count(), 1);
    }

    #[tokio::test]
    async fn test_record_vouch_once_per_signature() {
        let store = MemoryStore::new();
        let photo_id = store
            .insert_photo(&new_photo(VerificationTx::Skipped))
            .await
            .unwrap();
        let vouch = NewVouch {
            photo_id,
            voucher_wallet: Pubkey::new_unique(),
            amount_lamports: 5_000_000,
            tx_signature: Signature::new_unique(),
        };

        assert_eq!(store.record_vouch(&vouch).await, Ok(VouchWrite::Recorded));
        assert_eq!(
            store.record_vouch(&vouch).await,
            Ok(VouchWrite::AlreadyRecorded)
        );

        let photo = store.photo(photo_id).await.unwrap().unwrap();
        assert_eq!(photo.vouch_count, 1);
        assert_eq!(photo.total_earned_lamports, 5_000_000);
        assert_eq!(store.vouches_for_photo(photo_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_uploads(1);

        assert!(store.upload(b"x", "k1", "image/jpeg").await.is_err());
        let url = store.upload(b"x", "k1", "image/jpeg").await.unwrap();
        assert_eq!(url, "memory://photos/k1");
        assert_eq!(store.upload_calls(), 2);
    }

    #[tokio::test]
    async fn test_upload_never_overwrites() {
        let store = MemoryStore::new();
        store.upload(b"first", "k", "image/jpeg").await.unwrap();
        let second = store.upload(b"second", "k", "image/jpeg").await;
        assert!(matches!(second, Err(StorageError::Conflict(_))));
        assert_eq!(store.blob("k"), Some(b"first".to_vec()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_of_same_photo_share_one_row() {
        let store = MemoryStore::new();
        let photo = new_photo(VerificationTx::Skipped);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let photo = photo.clone();
                tokio::spawn(async move { store.insert_photo(&photo).await.unwrap() })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.photo_count(), 1);
    }

    #[tokio::test]
    async fn test_vouch_for_missing_photo_is_invalid() {
        let store = MemoryStore::new();
        let result = store
            .record_vouch(&NewVouch {
                photo_id: Uuid::new_v4(),
                voucher_wallet: Pubkey::new_unique(),
                amount_lamports: 5_000_000,
                tx_signature: Signature::new_unique(),
            })
            .await;

        assert!(matches!(result, Err(StorageError::InvalidRecord(_))));
        assert_eq!(store.vouch_count(), 0);
    }

    #[tokio::test]
    async fn test_photo_views_and_earnings() {
        let store = MemoryStore::new();
        let creator = Pubkey::new_unique();
        let mut ids = Vec::new();
        for bytes in [&b"one"[..], &b"two"[..], &b"three"[..]] {
            let photo = NewPhoto {
                creator_wallet: creator,
                image_hash: ImageHash::of(bytes),
                ..new_photo(VerificationTx::Skipped)
            };
            ids.push(store.insert_photo(&photo).await.unwrap());
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        store
            .insert_photo(&new_photo(VerificationTx::Skipped))
            .await
            .unwrap();

        for (amount, photo_id) in [(1_000, ids[0]), (2_500, ids[2]), (500, ids[2])] {
            store
                .record_vouch(&NewVouch {
                    photo_id,
                    voucher_wallet: Pubkey::new_unique(),
                    amount_lamports: amount,
                    tx_signature: Signature::new_unique(),
                })
                .await
                .unwrap();
        }

        let mine = store.photos_by_creator(&creator.to_string()).await.unwrap();
        let mine: Vec<PhotoId> = mine.iter().map(|p| p.id).collect();
        assert_eq!(mine, vec![ids[2], ids[1], ids[0]]);

        assert_eq!(store.recent_photos(2).await.unwrap().len(), 2);
        assert_eq!(store.recent_photos(50).await.unwrap().len(), 4);

        assert_eq!(
            store.earnings(&creator.to_string()).await.unwrap(),
            Earnings {
                total_earned_lamports: 4_000,
                total_vouches: 3,
                photo_count: 3,
            }
        );
        assert_eq!(
            store.earnings("nobody").await.unwrap(),
            Earnings::default()
        );
    }
}
