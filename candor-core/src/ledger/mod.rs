//! Ledger boundary: instruction encoding, address derivation and submission.
//!
//! The RPC client and the wallet signer are external collaborators behind
//! [`LedgerRpc`] and [`WalletSigner`]. Implementations classify their own
//! failures into [`LedgerError`] where the concrete error type is known; the
//! pipelines never inspect error text.

pub mod address;
pub mod instruction;
mod mock;
mod submitter;

pub use address::{photo_record_address, vouch_record_address};
pub use instruction::LedgerIntent;
pub use mock::{ScriptedLedger, Step};
pub use submitter::LedgerSubmitter;

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The block reference expired before the transaction landed. Transient.
    #[error("Block reference expired: {0}")]
    StaleBlockRef(String),

    /// The wallet holder declined to sign.
    #[error("Signing request declined")]
    UserDeclined,

    #[error("Ledger RPC error: {0}")]
    Rpc(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Invalid account: {0}")]
    InvalidAccount(String),
}

impl LedgerError {
    pub fn is_stale_block_ref(&self) -> bool {
        matches!(self, Self::StaleBlockRef(_))
    }

    pub fn is_user_declined(&self) -> bool {
        matches!(self, Self::UserDeclined)
    }
}

/// Recent block reference a transaction is built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Read and confirmation side of the ledger RPC.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Fetch a fresh block reference.
    async fn latest_block_ref(&self) -> Result<BlockRef, LedgerError>;

    /// Current balance in lamports. Never cached.
    async fn balance(&self, wallet: &Pubkey) -> Result<u64, LedgerError>;

    /// Wait for `signature` to confirm against the reference it was built with.
    async fn confirm(&self, signature: &Signature, block_ref: &BlockRef)
        -> Result<(), LedgerError>;
}

/// Wallet that signs and broadcasts transactions.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Sign `transaction` (its recent blockhash is already set) and broadcast it.
    async fn sign_and_send(&self, transaction: Transaction) -> Result<Signature, LedgerError>;
}
