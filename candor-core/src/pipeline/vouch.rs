//! Paid endorsement: local checks, balance preflight, transfer, bookkeeping.

use std::sync::Arc;

use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use tracing::{error, info, instrument, warn};

use super::{PersistenceStatus, UserNotice};
use crate::cache::{ViewCache, ViewScope};
use crate::capture::ImageHash;
use crate::config::PipelineConfig;
use crate::error::{CandorError, Result, ValidationError};
use crate::format::format_sol;
use crate::inflight::InFlight;
use crate::ledger::{
    photo_record_address, LedgerIntent, LedgerRpc, LedgerSubmitter, WalletSigner,
};
use crate::persistence::RecordStore;
use crate::record::{NewVouch, PhotoId, VouchWrite};
use crate::retry::RetryPolicy;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VouchStage {
    Validated,
    BalanceChecked,
    LedgerSubmit,
    LedgerConfirmed,
    Bookkeeping,
    Done,
}

impl VouchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::BalanceChecked => "balance_checked",
            Self::LedgerSubmit => "ledger_submit",
            Self::LedgerConfirmed => "ledger_confirmed",
            Self::Bookkeeping => "bookkeeping",
            Self::Done => "done",
        }
    }
}

/// Which photo to endorse and with how much.
#[derive(Debug, Clone)]
pub struct VouchRequest {
    pub photo_id: PhotoId,
    pub creator_wallet: Pubkey,
    pub image_hash: ImageHash,
    pub amount_lamports: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VouchOutcome {
    #[serde(serialize_with = "serialize_signature")]
    pub signature: Signature,
    pub amount_lamports: u64,
    #[serde(serialize_with = "crate::record::serialize_pubkey")]
    pub photo_record: Pubkey,
    pub persistence: PersistenceStatus,
    /// `None` when bookkeeping never succeeded.
    #[serde(skip)]
    pub write: Option<VouchWrite>,
}

fn serialize_signature<S: serde::Serializer>(
    signature: &Signature,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(signature)
}

impl VouchOutcome {
    pub fn is_fully_persisted(&self) -> bool {
        self.persistence.is_stored()
    }

    /// Alert for a transfer that landed but could not be recorded.
    pub fn user_notice(&self) -> Option<UserNotice> {
        if self.persistence.is_stored() {
            return None;
        }
        Some(UserNotice {
            title: "Vouch sent, but recording failed".into(),
            body: format!(
                "Your {} was sent on-chain (tx: {}) but we couldn't save the record. \
                 It may appear after a refresh.",
                format_sol(self.amount_lamports),
                self.signature
            ),
        })
    }
}

pub struct VouchPipeline {
    config: PipelineConfig,
    rpc: Arc<dyn LedgerRpc>,
    submitter: LedgerSubmitter,
    records: Arc<dyn RecordStore>,
    cache: ViewCache,
    in_flight: InFlight,
}

impl VouchPipeline {
    pub fn new(
        config: PipelineConfig,
        rpc: Arc<dyn LedgerRpc>,
        signer: Arc<dyn WalletSigner>,
        records: Arc<dyn RecordStore>,
        cache: ViewCache,
    ) -> Self {
        let submitter = LedgerSubmitter::new(rpc.clone(), signer, config.program_id);
        Self {
            config,
            rpc,
            submitter,
            records,
            cache,
            in_flight: InFlight::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_vouching(&self) -> bool {
        self.in_flight.is_active()
    }

    /// Check the request locally, preflight the balance, transfer on the
    /// ledger and record the vouch. Nothing reaches the network unless the
    /// local checks pass, and nothing is submitted unless the balance covers
    /// the amount plus fees.
    #[instrument(skip_all, fields(photo_id = %request.photo_id, amount = request.amount_lamports))]
    pub async fn vouch(&self, session: &Session, request: VouchRequest) -> Result<VouchOutcome> {
        let voucher = *session.wallet().ok_or(ValidationError::Unauthenticated)?;
        self.validate(&voucher, &request)?;
        info!(stage = VouchStage::Validated.as_str(), %voucher, "Vouch request accepted");

        let _guard = self
            .in_flight
            .try_acquire()
            .ok_or(CandorError::Busy("Vouch"))?;

        self.preflight_balance(&voucher, request.amount_lamports)
            .await?;
        info!(stage = VouchStage::BalanceChecked.as_str(), "Balance covers vouch");

        let (photo_record, _) = photo_record_address(
            &self.config.program_id,
            &request.creator_wallet,
            &request.image_hash,
        );
        let intent = LedgerIntent::vouch(
            voucher,
            request.creator_wallet,
            photo_record,
            request.amount_lamports,
        );

        info!(stage = VouchStage::LedgerSubmit.as_str(), %photo_record, "Submitting vouch");
        let signature = self
            .submitter
            .submit(&intent, &RetryPolicy::single_attempt("vouch-submit"))
            .await?;
        info!(stage = VouchStage::LedgerConfirmed.as_str(), %signature, "Vouch confirmed");

        let (persistence, write) = self.record(&request, voucher, signature).await;

        self.cache.invalidate(ViewScope::Vouches);
        self.cache.invalidate(ViewScope::Photos);
        info!(
            stage = VouchStage::Done.as_str(),
            stored = persistence.is_stored(),
            "Vouch finished"
        );

        Ok(VouchOutcome {
            signature,
            amount_lamports: request.amount_lamports,
            photo_record,
            persistence,
            write,
        })
    }

    fn validate(&self, voucher: &Pubkey, request: &VouchRequest) -> Result<()> {
        if *voucher == request.creator_wallet {
            return Err(ValidationError::SelfVouchForbidden.into());
        }
        if request.amount_lamports > self.config.max_vouch_lamports {
            return Err(ValidationError::AmountTooLarge {
                amount: request.amount_lamports,
                max: self.config.max_vouch_lamports,
            }
            .into());
        }
        if request.amount_lamports == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        Ok(())
    }

    async fn preflight_balance(&self, voucher: &Pubkey, amount: u64) -> Result<()> {
        let available = self.rpc.balance(voucher).await?;
        let required = amount.saturating_add(self.config.estimated_fee_lamports);
        if available < required {
            warn!(required, available, "Insufficient balance for vouch");
            return Err(ValidationError::InsufficientBalance {
                required,
                available,
                shortfall: required - available,
            }
            .into());
        }
        Ok(())
    }

    async fn record(
        &self,
        request: &VouchRequest,
        voucher: Pubkey,
        signature: Signature,
    ) -> (PersistenceStatus, Option<VouchWrite>) {
        info!(stage = VouchStage::Bookkeeping.as_str(), "Recording vouch");
        let new_vouch = NewVouch {
            photo_id: request.photo_id,
            voucher_wallet: voucher,
            amount_lamports: request.amount_lamports,
            tx_signature: signature,
        };

        let policy =
            RetryPolicy::persistence(self.config.db_retry_count, self.config.db_retry_base_delay);
        match policy
            .run(|_| self.records.record_vouch(&new_vouch))
            .await
        {
            Ok((write, attempts)) => (
                PersistenceStatus::Stored {
                    id: request.photo_id,
                    attempts,
                },
                Some(write),
            ),
            Err(failure) => {
                error!(
                    %signature,
                    attempts = failure.attempts,
                    error = %failure.error,
                    "Vouch transferred but could not be recorded"
                );
                (
                    PersistenceStatus::Deferred {
                        attempts: failure.attempts,
                        last_error: failure.error,
                    },
                    None,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{MemoryStore, StorageError};

    fn outcome(persistence: PersistenceStatus) -> VouchOutcome {
        VouchOutcome {
            signature: Signature::new_unique(),
            amount_lamports: 5_000_000,
            photo_record: Pubkey::new_unique(),
            persistence,
            write: None,
        }
    }

    #[test]
    fn test_notice_only_for_deferred() {
        let stored = outcome(PersistenceStatus::Stored {
            id: PhotoId::new_v4(),
            attempts: 1,
        });
        assert!(stored.user_notice().is_none());

        let deferred = outcome(PersistenceStatus::Deferred {
            attempts: 3,
            last_error: StorageError::Connection("down".into()),
        });
        let notice = deferred.user_notice().expect("notice");
        assert_eq!(notice.title, "Vouch sent, but recording failed");
        assert!(notice.body.contains(&deferred.signature.to_string()));
        assert!(notice.body.contains("0.0050 SOL"));
    }

    #[test]
    fn test_validation_order() {
        let ledger = crate::ledger::ScriptedLedger::new(0);
        let pipeline = VouchPipeline::new(
            PipelineConfig::default(),
            Arc::new(ledger.clone()),
            Arc::new(ledger),
            Arc::new(MemoryStore::new()),
            ViewCache::new(),
        );
        let voucher = Pubkey::new_unique();
        let request = |creator, amount_lamports| VouchRequest {
            photo_id: PhotoId::new_v4(),
            creator_wallet: creator,
            image_hash: ImageHash::of(b"x"),
            amount_lamports,
        };

        // Self-vouch is reported even when the amount is also invalid.
        assert!(matches!(
            pipeline.validate(&voucher, &request(voucher, u64::MAX)),
            Err(CandorError::Validation(ValidationError::SelfVouchForbidden))
        ));
        assert!(matches!(
            pipeline.validate(&voucher, &request(Pubkey::new_unique(), 5_000_000_001)),
            Err(CandorError::Validation(ValidationError::AmountTooLarge { .. }))
        ));
        assert!(matches!(
            pipeline.validate(&voucher, &request(Pubkey::new_unique(), 0)),
            Err(CandorError::Validation(ValidationError::ZeroAmount))
        ));
        assert!(pipeline
            .validate(&voucher, &request(Pubkey::new_unique(), 5_000_000_000))
            .is_ok());
    }
}
