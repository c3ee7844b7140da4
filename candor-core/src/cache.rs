//! Cached read views over the record store.
//!
//! Views are stored as JSON values so one cache serves every view type. Writes
//! that change what a view shows invalidate its whole scope.
//!
//! Each scope carries a generation that every invalidation bumps. A read that
//! started before an invalidation never writes its result back.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use crate::persistence::{RecordStore, StorageError};
use crate::record::{Earnings, PhotoId, StoredPhoto, StoredVouch};

/// Photos shown in the feed view.
pub const FEED_LIMIT: u32 = 50;

/// Group of views that go stale together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewScope {
    Photos,
    Vouches,
}

impl ViewScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photos => "photos",
            Self::Vouches => "vouches",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewKey {
    Photo(PhotoId),
    /// Newest photos across all creators.
    Feed,
    CreatorPhotos(String),
    Earnings(String),
    PhotoVouches(PhotoId),
    WalletVouches(String),
}

impl ViewKey {
    pub fn scope(&self) -> ViewScope {
        match self {
            Self::Photo(_) | Self::Feed | Self::CreatorPhotos(_) | Self::Earnings(_) => {
                ViewScope::Photos
            }
            Self::PhotoVouches(_) | Self::WalletVouches(_) => ViewScope::Vouches,
        }
    }
}

#[derive(Debug, Default)]
struct Generations {
    photos: u64,
    vouches: u64,
}

impl Generations {
    fn get(&self, scope: ViewScope) -> u64 {
        match scope {
            ViewScope::Photos => self.photos,
            ViewScope::Vouches => self.vouches,
        }
    }

    fn bump(&mut self, scope: ViewScope) {
        match scope {
            ViewScope::Photos => self.photos += 1,
            ViewScope::Vouches => self.vouches += 1,
        }
    }
}

#[derive(Clone, Default)]
pub struct ViewCache {
    views: Arc<DashMap<ViewKey, serde_json::Value>>,
    // Held shared while a conditional write checks and stores, exclusive
    // while a scope is invalidated.
    generations: Arc<RwLock<Generations>>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached view, if present and still decodable as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &ViewKey) -> Option<T> {
        let value = self.views.get(key)?.value().clone();
        serde_json::from_value(value).ok()
    }

    pub fn put<T: Serialize>(&self, key: ViewKey, view: &T) -> Result<(), StorageError> {
        self.views.insert(key, to_value(view)?);
        Ok(())
    }

    /// Current generation of `scope`.
    pub fn generation(&self, scope: ViewScope) -> u64 {
        self.generations.read().get(scope)
    }

    /// Store `view` only if its scope is still at `generation`. Returns
    /// whether the view was stored.
    pub fn put_if_current<T: Serialize>(
        &self,
        key: ViewKey,
        view: &T,
        generation: u64,
    ) -> Result<bool, StorageError> {
        let value = to_value(view)?;
        let generations = self.generations.read();
        if generations.get(key.scope()) != generation {
            return Ok(false);
        }
        self.views.insert(key, value);
        Ok(true)
    }

    /// Drop every view in `scope`. Returns how many were dropped.
    pub fn invalidate(&self, scope: ViewScope) -> usize {
        let mut generations = self.generations.write();
        generations.bump(scope);
        let before = self.views.len();
        self.views.retain(|key, _| key.scope() != scope);
        let dropped = before.saturating_sub(self.views.len());
        debug!(
            scope = scope.as_str(),
            generation = generations.get(scope),
            dropped,
            "View cache invalidated"
        );
        dropped
    }

    pub fn contains(&self, key: &ViewKey) -> bool {
        self.views.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

fn to_value<T: Serialize>(view: &T) -> Result<serde_json::Value, StorageError> {
    serde_json::to_value(view).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Reads photo and vouch views through a [`ViewCache`].
#[derive(Clone)]
pub struct FeedReader {
    store: Arc<dyn RecordStore>,
    cache: ViewCache,
}

impl FeedReader {
    pub fn new(store: Arc<dyn RecordStore>, cache: ViewCache) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &ViewCache {
        &self.cache
    }

    pub async fn photo(&self, id: PhotoId) -> Result<Option<StoredPhoto>, StorageError> {
        self.read_through(ViewKey::Photo(id), self.store.photo(id)).await
    }

    /// The [`FEED_LIMIT`] newest photos.
    pub async fn feed(&self) -> Result<Vec<StoredPhoto>, StorageError> {
        self.read_through(ViewKey::Feed, self.store.recent_photos(FEED_LIMIT)).await
    }

    pub async fn photos_by_creator(&self, wallet: &str) -> Result<Vec<StoredPhoto>, StorageError> {
        self.read_through(
            ViewKey::CreatorPhotos(wallet.to_string()),
            self.store.photos_by_creator(wallet),
        )
        .await
    }

    pub async fn earnings(&self, wallet: &str) -> Result<Earnings, StorageError> {
        self.read_through(
            ViewKey::Earnings(wallet.to_string()),
            self.store.earnings(wallet),
        )
        .await
    }

    pub async fn vouches_for_photo(&self, id: PhotoId) -> Result<Vec<StoredVouch>, StorageError> {
        self.read_through(ViewKey::PhotoVouches(id), self.store.vouches_for_photo(id))
            .await
    }

    pub async fn vouches_by_wallet(&self, wallet: &str) -> Result<Vec<StoredVouch>, StorageError> {
        self.read_through(
            ViewKey::WalletVouches(wallet.to_string()),
            self.store.vouches_by_wallet(wallet),
        )
        .await
    }

    async fn read_through<T, F>(&self, key: ViewKey, load: F) -> Result<T, StorageError>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<T, StorageError>>,
    {
        if let Some(hit) = self.cache.get::<T>(&key) {
            trace!(?key, "View cache hit");
            return Ok(hit);
        }

        let generation = self.cache.generation(key.scope());
        let view = load.await?;
        if !self.cache.put_if_current(key.clone(), &view, generation)? {
            debug!(?key, "View invalidated during read, not cached");
        }
        Ok(view)
    }
}
