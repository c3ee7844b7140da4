use thiserror::Error;

use crate::capture::CaptureError;
use crate::format::format_sol;
use crate::ledger::LedgerError;
use crate::persistence::StorageError;
use crate::record::VerificationTx;

/// Local precondition failures. None of these ever reach the network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Wallet not connected")]
    Unauthenticated,

    #[error("Cannot vouch for your own photo")]
    SelfVouchForbidden,

    #[error("Vouch amount of {} exceeds maximum of {}", sol(.amount), sol(.max))]
    AmountTooLarge { amount: u64, max: u64 },

    #[error("Vouch amount must be greater than zero")]
    ZeroAmount,

    #[error(
        "Insufficient SOL. You need {} but only have {} ({shortfall} lamports short)",
        sol(.required),
        sol(.available)
    )]
    InsufficientBalance {
        required: u64,
        available: u64,
        shortfall: u64,
    },
}

fn sol(lamports: &u64) -> String {
    format_sol(*lamports)
}

#[derive(Error, Debug)]
pub enum CandorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0} already in progress")]
    Busy(&'static str),

    #[error("Signing request declined")]
    UserCancelled,

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Upload failed after the ledger step resolved. The verification state is
    /// carried so the confirmed signature is never lost.
    #[error("Image upload failed ({verification}): {source}")]
    Upload {
        verification: VerificationTx,
        #[source]
        source: StorageError,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(String),
}

impl CandorError {
    /// Whether the user declined to sign. Front ends absorb this silently.
    pub fn is_user_cancelled(&self) -> bool {
        matches!(self, Self::UserCancelled)
    }

    /// Signature of a ledger transaction that already confirmed, if this error
    /// happened after one.
    pub fn confirmed_signature(&self) -> Option<String> {
        match self {
            Self::Upload { verification, .. } => verification.signature().map(|s| s.to_string()),
            _ => None,
        }
    }
}

impl From<LedgerError> for CandorError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UserDeclined => Self::UserCancelled,
            other => Self::Ledger(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CandorError>;
