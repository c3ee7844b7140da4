//! End-to-end flows driven by a front end.
//!
//! Both pipelines share the same shape: local checks, one ledger submission,
//! then off-chain writes under a retry policy. Once the ledger has confirmed,
//! a persistence failure never turns into an error; it is reported through
//! [`PersistenceStatus::Deferred`] together with the signature.

pub mod capture;
pub mod vouch;

pub use capture::{CaptureOutcome, CapturePipeline, CaptureStage, PhotoUpload};
pub use vouch::{VouchOutcome, VouchPipeline, VouchRequest, VouchStage};

use std::fmt;

use serde::Serialize;

use crate::persistence::StorageError;
use crate::record::PhotoId;

/// Outcome of the off-chain write that follows a resolved ledger step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceStatus {
    Stored {
        /// Photo the write belongs to.
        id: PhotoId,
        attempts: u32,
    },
    /// Every attempt failed. The ledger state is final regardless.
    Deferred {
        attempts: u32,
        last_error: StorageError,
    },
}

impl PersistenceStatus {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Stored { attempts, .. } | Self::Deferred { attempts, .. } => *attempts,
        }
    }
}

impl Serialize for PersistenceStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("PersistenceStatus", 3)?;
        match self {
            Self::Stored { id, attempts } => {
                state.serialize_field("status", "stored")?;
                state.serialize_field("id", id)?;
                state.serialize_field("attempts", attempts)?;
            }
            Self::Deferred {
                attempts,
                last_error,
            } => {
                state.serialize_field("status", "deferred")?;
                state.serialize_field("attempts", attempts)?;
                state.serialize_field("last_error", &last_error.to_string())?;
            }
        }
        state.end()
    }
}

/// Message a front end shows as an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserNotice {
    pub title: String,
    pub body: String,
}

impl fmt::Display for UserNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.body)
    }
}
