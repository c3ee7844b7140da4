//! Build, sign, send and confirm one ledger intent.

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use tracing::{debug, info, instrument};

use super::{LedgerError, LedgerIntent, LedgerRpc, WalletSigner};
use crate::retry::RetryPolicy;

/// Submits intents through a wallet and waits for confirmation.
///
/// Every attempt fetches its own block reference, builds the transaction
/// against it and confirms against that same reference, so a retry after a
/// stale reference never reuses an expired blockhash.
#[derive(Clone)]
pub struct LedgerSubmitter {
    rpc: Arc<dyn LedgerRpc>,
    signer: Arc<dyn WalletSigner>,
    program_id: Pubkey,
}

impl LedgerSubmitter {
    pub fn new(rpc: Arc<dyn LedgerRpc>, signer: Arc<dyn WalletSigner>, program_id: Pubkey) -> Self {
        Self {
            rpc,
            signer,
            program_id,
        }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn rpc(&self) -> &Arc<dyn LedgerRpc> {
        &self.rpc
    }

    /// Submit `intent` under `policy`. Returns the signature only once the
    /// transaction is confirmed.
    #[instrument(skip(self, policy), fields(kind = intent.kind(), policy = policy.name()))]
    pub async fn submit(
        &self,
        intent: &LedgerIntent,
        policy: &RetryPolicy<LedgerError>,
    ) -> Result<Signature, LedgerError> {
        let (signature, attempts) = policy
            .run(|attempt| self.attempt(intent, attempt))
            .await
            .map_err(|failure| failure.error)?;

        info!(%signature, attempts, "Ledger transaction confirmed");
        Ok(signature)
    }

    async fn attempt(&self, intent: &LedgerIntent, attempt: u32) -> Result<Signature, LedgerError> {
        let block_ref = self.rpc.latest_block_ref().await?;
        debug!(
            attempt,
            blockhash = %block_ref.blockhash,
            last_valid_block_height = block_ref.last_valid_block_height,
            "Building transaction"
        );

        let transaction = intent.transaction(&self.program_id, &block_ref);
        let signature = self.signer.sign_and_send(transaction).await?;
        debug!(attempt, %signature, "Transaction sent, awaiting confirmation");

        self.rpc.confirm(&signature, &block_ref).await?;
        Ok(signature)
    }
}
