//! Candor Core - capture, verify and vouch for photos on Solana
//!
//! This crate implements the client core of the Candor photo verification app:
//! sealed captures (content hash plus privacy-fuzzed location), the ledger
//! instructions of the Candor program, and the two end-to-end flows built on
//! them.
//!
//! # Features
//!
//! - SHA-256 content hash taken from the exact captured bytes
//! - Coordinates fuzzed to ~111m before they leave the capture step
//! - Byte-exact `verify_photo` / `vouch` instruction encoding
//! - Bounded retries for stale block references and database writes
//! - Ledger success is never hidden behind a persistence failure
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use candor_core::{
//!     CapturePipeline, Capturer, FixtureCamera, MemoryStore, NoLocation, PipelineConfig,
//!     Session,
//! };
//! use solana_sdk::pubkey::Pubkey;
//!
//! # async fn example() -> candor_core::Result<()> {
//! let capturer = Capturer::new(
//!     FixtureCamera::new("file:///photo.jpg", b"jpeg bytes".to_vec()),
//!     NoLocation,
//!     3,
//! );
//! let metadata = capturer.capture(false).await?;
//!
//! // Placeholder program: the ledger step is skipped.
//! let store = Arc::new(MemoryStore::new());
//! let pipeline = CapturePipeline::new(PipelineConfig::offline(), store.clone(), store);
//!
//! let session = Session::connected(Pubkey::new_unique());
//! let outcome = pipeline.verify_and_upload(&session, metadata, "sunset").await?;
//! assert!(outcome.is_fully_persisted());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod capture;
pub mod config;
pub mod error;
pub mod format;
pub mod inflight;
pub mod ledger;
pub mod persistence;
pub mod pipeline;
pub mod record;
pub mod retry;
pub mod session;

pub use cache::{FeedReader, ViewCache, ViewKey, ViewScope, FEED_LIMIT};
pub use capture::{
    fuzz_coordinate, hash_image, CameraSource, CaptureError, CaptureMetadata, Capturer,
    FileCamera, FixedLocation, FixtureCamera, ImageHash, ImageRef, Location, LocationSource,
    NoLocation, RawPosition,
};
pub use config::{
    Cluster, PipelineConfig, DEFAULT_PROGRAM_ID, DEFAULT_VOUCH_LAMPORTS, ESTIMATED_FEE_LAMPORTS,
    MAX_VOUCH_LAMPORTS, PLACEHOLDER_PROGRAM_ID,
};
pub use error::{CandorError, Result, ValidationError};
pub use format::{explorer_address_url, explorer_tx_url, format_sol, sol_to_lamports};
pub use ledger::{
    photo_record_address, vouch_record_address, BlockRef, LedgerError, LedgerIntent, LedgerRpc,
    LedgerSubmitter, ScriptedLedger, Step, WalletSigner,
};
pub use persistence::{BlobStore, MemoryStore, RecordStore, StorageError};
pub use pipeline::{
    CaptureOutcome, CapturePipeline, PersistenceStatus, UserNotice, VouchOutcome, VouchPipeline,
    VouchRequest,
};
pub use record::{
    Earnings, NewPhoto, NewVouch, PhotoId, StoredPhoto, StoredVouch, VerificationTx, VouchWrite,
};
pub use retry::{Delay, RetryPolicy};
pub use session::Session;
