//! Photo verification: ledger record, image upload, photo row.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use tracing::{error, info, instrument};

use super::{PersistenceStatus, UserNotice};
use crate::capture::{CaptureMetadata, ImageHash, Location};
use crate::config::PipelineConfig;
use crate::error::{CandorError, Result, ValidationError};
use crate::inflight::InFlight;
use crate::ledger::{LedgerIntent, LedgerRpc, LedgerSubmitter, WalletSigner};
use crate::persistence::{BlobStore, RecordStore, IMAGE_CONTENT_TYPE};
use crate::record::{NewPhoto, VerificationTx};
use crate::retry::RetryPolicy;
use crate::session::Session;

/// Stages of one verification, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    LedgerSubmit,
    LedgerConfirmed,
    LedgerSkipped,
    Upload,
    Uploaded,
    DbInsert,
    Done,
}

impl CaptureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LedgerSubmit => "ledger_submit",
            Self::LedgerConfirmed => "ledger_confirmed",
            Self::LedgerSkipped => "ledger_skipped",
            Self::Upload => "upload",
            Self::Uploaded => "uploaded",
            Self::DbInsert => "db_insert",
            Self::Done => "done",
        }
    }
}

/// Everything known about a verified photo once the pipeline finishes.
#[derive(Debug, Clone, Serialize)]
pub struct PhotoUpload {
    #[serde(serialize_with = "crate::record::serialize_pubkey")]
    pub creator_wallet: Pubkey,
    pub image_uri: String,
    pub image_url: String,
    pub image_hash: ImageHash,
    pub caption: Option<String>,
    pub location: Option<Location>,
    pub timestamp: i64,
    pub verification: VerificationTx,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureOutcome {
    pub photo: PhotoUpload,
    pub persistence: PersistenceStatus,
}

impl CaptureOutcome {
    pub fn is_fully_persisted(&self) -> bool {
        self.persistence.is_stored()
    }

    /// Alert for a photo that verified but could not be saved.
    pub fn user_notice(&self) -> Option<UserNotice> {
        if self.persistence.is_stored() {
            return None;
        }
        let tx = match self.photo.verification.signature() {
            Some(signature) => format!(" (tx: {signature})"),
            None => String::new(),
        };
        Some(UserNotice {
            title: "Photo verified, but save failed".into(),
            body: format!(
                "Your photo was verified on-chain{tx} but we couldn't save the record. \
                 It may appear after a refresh."
            ),
        })
    }
}

/// Verifies sealed captures for one front end.
pub struct CapturePipeline {
    config: PipelineConfig,
    submitter: Option<LedgerSubmitter>,
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn RecordStore>,
    in_flight: InFlight,
}

impl CapturePipeline {
    pub fn new(
        config: PipelineConfig,
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            config,
            submitter: None,
            blobs,
            records,
            in_flight: InFlight::new(),
        }
    }

    /// Attach the ledger boundary. Not needed when the program is the
    /// placeholder.
    pub fn with_ledger(mut self, rpc: Arc<dyn LedgerRpc>, signer: Arc<dyn WalletSigner>) -> Self {
        self.submitter = Some(LedgerSubmitter::new(rpc, signer, self.config.program_id));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_verifying(&self) -> bool {
        self.in_flight.is_active()
    }

    /// Record `metadata` on the ledger, upload the image and save the photo
    /// row. Stages run strictly in order; upload starts only after the ledger
    /// step resolved.
    #[instrument(skip_all, fields(image_hash = %metadata.image_hash()))]
    pub async fn verify_and_upload(
        &self,
        session: &Session,
        metadata: CaptureMetadata,
        caption: &str,
    ) -> Result<CaptureOutcome> {
        let creator = *session.wallet().ok_or(ValidationError::Unauthenticated)?;
        let _guard = self
            .in_flight
            .try_acquire()
            .ok_or(CandorError::Busy("Photo verification"))?;

        let verification = self.record_on_ledger(creator, &metadata).await?;

        log_stage(CaptureStage::Upload);
        let key = upload_key(&creator, Utc::now().timestamp_millis());
        let image_url = self
            .blobs
            .upload(metadata.image().bytes(), &key, IMAGE_CONTENT_TYPE)
            .await
            .map_err(|source| CandorError::Upload {
                verification,
                source,
            })?;
        info!(stage = CaptureStage::Uploaded.as_str(), %image_url, "Image uploaded");

        let caption = Some(caption.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let new_photo = NewPhoto {
            creator_wallet: creator,
            image_url: image_url.clone(),
            image_hash: *metadata.image_hash(),
            caption: caption.clone(),
            location: metadata.location().copied(),
            verification,
        };

        log_stage(CaptureStage::DbInsert);
        let policy =
            RetryPolicy::persistence(self.config.db_retry_count, self.config.db_retry_base_delay);
        let persistence = match policy
            .run(|_| self.records.insert_photo(&new_photo))
            .await
        {
            Ok((id, attempts)) => PersistenceStatus::Stored { id, attempts },
            Err(failure) => {
                error!(
                    verification = %verification,
                    image_hash = %new_photo.image_hash,
                    attempts = failure.attempts,
                    error = %failure.error,
                    "Photo verified but record could not be saved"
                );
                PersistenceStatus::Deferred {
                    attempts: failure.attempts,
                    last_error: failure.error,
                }
            }
        };
        info!(
            stage = CaptureStage::Done.as_str(),
            stored = persistence.is_stored(),
            "Verification finished"
        );

        Ok(CaptureOutcome {
            photo: PhotoUpload {
                creator_wallet: creator,
                image_uri: metadata.image().uri().to_string(),
                image_url,
                image_hash: *metadata.image_hash(),
                caption,
                location: metadata.location().copied(),
                timestamp: metadata.timestamp(),
                verification,
            },
            persistence,
        })
    }

    async fn record_on_ledger(
        &self,
        creator: Pubkey,
        metadata: &CaptureMetadata,
    ) -> Result<VerificationTx> {
        if !self.config.ledger_enabled() {
            info!(
                stage = CaptureStage::LedgerSkipped.as_str(),
                "Program not deployed, skipping ledger step"
            );
            return Ok(VerificationTx::Skipped);
        }
        let submitter = self.submitter.as_ref().ok_or_else(|| {
            CandorError::Config("program is configured but no ledger client is attached".into())
        })?;

        log_stage(CaptureStage::LedgerSubmit);
        let intent = LedgerIntent::verify_photo(creator, metadata);
        let policy = RetryPolicy::stale_block_ref(self.config.ledger_stale_retries);
        let signature = submitter.submit(&intent, &policy).await?;
        info!(
            stage = CaptureStage::LedgerConfirmed.as_str(),
            %signature,
            "Verification confirmed"
        );

        Ok(VerificationTx::Confirmed(signature))
    }
}

fn log_stage(stage: CaptureStage) {
    info!(stage = stage.as_str(), "Entering stage");
}

/// Storage key `<wallet>/<unix_millis>.jpg`.
pub fn upload_key(wallet: &Pubkey, unix_millis: i64) -> String {
    format!("{wallet}/{unix_millis}.jpg")
}
