//! Photo and vouch records as the pipelines hand them to persistence.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use uuid::Uuid;

use crate::capture::{ImageHash, Location};

pub type PhotoId = Uuid;

/// Ledger state of a verification.
///
/// `Pending` exists only inside the capture pipeline before the ledger step
/// resolves; persistence refuses it. `Confirmed` is produced only by the
/// submitter after confirmation, so a stored signature always refers to a
/// confirmed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationTx {
    Pending,
    Confirmed(Signature),
    Skipped,
}

impl VerificationTx {
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Self::Confirmed(signature) => Some(signature),
            Self::Pending | Self::Skipped => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for VerificationTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("ledger step pending"),
            Self::Confirmed(signature) => write!(f, "tx {signature}"),
            Self::Skipped => f.write_str("ledger step skipped"),
        }
    }
}

impl Serialize for VerificationTx {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Pending => serializer.serialize_unit_variant("VerificationTx", 0, "pending"),
            Self::Confirmed(signature) => serializer.serialize_newtype_variant(
                "VerificationTx",
                1,
                "confirmed",
                &signature.to_string(),
            ),
            Self::Skipped => serializer.serialize_unit_variant("VerificationTx", 2, "skipped"),
        }
    }
}

/// Serialize a key as its base58 string.
pub(crate) fn serialize_pubkey<S: Serializer>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(key)
}

/// Photo row to insert after upload.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub creator_wallet: Pubkey,
    pub image_url: String,
    pub image_hash: ImageHash,
    pub caption: Option<String>,
    pub location: Option<Location>,
    pub verification: VerificationTx,
}

impl NewPhoto {
    /// Value for the nullable `verification_tx` column.
    pub fn verification_tx(&self) -> Option<String> {
        self.verification.signature().map(|s| s.to_string())
    }
}

/// Vouch row plus counter bump, written once per confirmed transfer.
#[derive(Debug, Clone)]
pub struct NewVouch {
    pub photo_id: PhotoId,
    pub voucher_wallet: Pubkey,
    pub amount_lamports: u64,
    pub tx_signature: Signature,
}

/// Result of the idempotent vouch bookkeeping write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VouchWrite {
    Recorded,
    /// A row with this transaction signature already exists; counters untouched.
    AlreadyRecorded,
}

/// Photo as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct StoredPhoto {
    pub id: PhotoId,
    pub creator_wallet: String,
    pub image_url: String,
    pub image_hash: String,
    pub caption: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_accuracy: Option<f64>,
    pub verification_tx: Option<String>,
    pub vouch_count: i64,
    pub total_earned_lamports: i64,
    pub created_at: DateTime<Utc>,
}

/// Vouch as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct StoredVouch {
    pub id: Uuid,
    pub photo_id: PhotoId,
    pub voucher_wallet: String,
    pub amount_lamports: i64,
    pub tx_signature: String,
    pub created_at: DateTime<Utc>,
}

/// What a creator has earned across all of their photos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Earnings {
    pub total_earned_lamports: i64,
    pub total_vouches: i64,
    pub photo_count: i64,
}

impl Earnings {
    /// Totals over a creator's photo rows.
    pub fn from_photos<'a>(photos: impl IntoIterator<Item = &'a StoredPhoto>) -> Self {
        photos.into_iter().fold(Self::default(), |acc, photo| Self {
            total_earned_lamports: acc.total_earned_lamports + photo.total_earned_lamports,
            total_vouches: acc.total_vouches + photo.vouch_count,
            photo_count: acc.photo_count + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_confirmed_has_signature() {
        let signature = Signature::new_unique();
        assert_eq!(
            VerificationTx::Confirmed(signature).signature(),
            Some(&signature)
        );
        assert_eq!(VerificationTx::Skipped.signature(), None);
        assert_eq!(VerificationTx::Pending.signature(), None);
        assert!(!VerificationTx::Pending.is_resolved());
        assert!(VerificationTx::Skipped.is_resolved());
    }

    #[test]
    fn test_verification_serialization() {
        let signature = Signature::new_unique();
        assert_eq!(
            serde_json::to_value(VerificationTx::Skipped).unwrap(),
            serde_json::json!("skipped")
        );
        assert_eq!(
            serde_json::to_value(VerificationTx::Confirmed(signature)).unwrap(),
            serde_json::json!({ "confirmed": signature.to_string() })
        );
    }
}
