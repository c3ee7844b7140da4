//! Exit codes following sysexits.h conventions.
//!
//! Scripts can tell a rejected request apart from an unreachable ledger or
//! database without parsing messages.

use candor_core::{CandorError, CaptureError};

pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Request refused by a local check (self-vouch, amount, balance).
/// Maps to EX_DATAERR from sysexits.h.
pub const REJECTED: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Ledger RPC, database or storage unavailable.
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const NETWORK_ERROR: i32 = 69;

/// I/O error (cannot write session file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Another operation is in flight.
/// Maps to EX_TEMPFAIL from sysexits.h.
pub const BUSY: i32 = 75;

/// Missing or invalid configuration.
/// Maps to EX_CONFIG from sysexits.h.
pub const CONFIG_ERROR: i32 = 78;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        let code = match err.downcast_ref::<CandorError>() {
            Some(candor) => Self::code_for(candor),
            None if message.contains("Failed to read") => INPUT_ERROR,
            None if message.contains("Failed to write") => IO_ERROR,
            None if message.contains("must be set") || message.contains("Invalid") => USAGE_ERROR,
            None => GENERAL_ERROR,
        };

        Self {
            code,
            message: Some(message),
        }
    }

    fn code_for(err: &CandorError) -> i32 {
        match err {
            CandorError::Validation(_) => REJECTED,
            CandorError::Busy(_) => BUSY,
            CandorError::UserCancelled => SUCCESS,
            CandorError::Capture(CaptureError::Camera(_)) => INPUT_ERROR,
            CandorError::Capture(CaptureError::InvalidHash(_)) => USAGE_ERROR,
            CandorError::Capture(_) => GENERAL_ERROR,
            CandorError::Ledger(_) | CandorError::Upload { .. } | CandorError::Persistence(_) => {
                NETWORK_ERROR
            }
            CandorError::Config(_) => CONFIG_ERROR,
            CandorError::Session(_) => IO_ERROR,
        }
    }
}
