//! Solana RPC client and file-keypair wallet behind the core ledger traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use candor_core::{BlockRef, LedgerError, LedgerRpc, WalletSigner};
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::transaction::{Transaction, TransactionError};
use tracing::{debug, warn};

/// Interval between signature status polls.
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Map an RPC client failure onto the ledger error taxonomy.
fn classify(err: ClientError) -> LedgerError {
    match err.get_transaction_error() {
        Some(TransactionError::BlockhashNotFound) => LedgerError::StaleBlockRef(err.to_string()),
        Some(tx_err) => LedgerError::Rejected(tx_err.to_string()),
        None => LedgerError::Rpc(err.to_string()),
    }
}

/// `LedgerRpc` over a JSON-RPC endpoint at `confirmed` commitment.
pub struct RpcLedger {
    client: Arc<RpcClient>,
}

impl RpcLedger {
    pub fn new(url: impl Into<String>) -> Self {
        let client = RpcClient::new_with_timeout_and_commitment(
            url.into(),
            RPC_TIMEOUT,
            CommitmentConfig::confirmed(),
        );
        Self {
            client: Arc::new(client),
        }
    }

    pub fn client(&self) -> Arc<RpcClient> {
        self.client.clone()
    }
}

#[async_trait]
impl LedgerRpc for RpcLedger {
    async fn latest_block_ref(&self) -> Result<BlockRef, LedgerError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.client.commitment())
            .await
            .map_err(classify)?;
        Ok(BlockRef {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn balance(&self, wallet: &Pubkey) -> Result<u64, LedgerError> {
        self.client.get_balance(wallet).await.map_err(classify)
    }

    async fn confirm(&self, signature: &Signature, block_ref: &BlockRef) -> Result<(), LedgerError> {
        loop {
            let status = self
                .client
                .get_signature_status_with_commitment(signature, self.client.commitment())
                .await
                .map_err(classify)?;

            match status {
                Some(Ok(())) => return Ok(()),
                Some(Err(tx_err)) => return Err(LedgerError::Rejected(tx_err.to_string())),
                None => {}
            }

            let height = self
                .client
                .get_block_height_with_commitment(self.client.commitment())
                .await
                .map_err(classify)?;
            if height > block_ref.last_valid_block_height {
                warn!(%signature, height, "Block reference expired before confirmation");
                return Err(LedgerError::StaleBlockRef(format!(
                    "block height {height} exceeded {}",
                    block_ref.last_valid_block_height
                )));
            }

            debug!(%signature, height, "Awaiting confirmation");
            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }
}

/// Wallet backed by a local keypair file. Signing is never declined.
pub struct KeypairSigner {
    keypair: Keypair,
    client: Arc<RpcClient>,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair, client: Arc<RpcClient>) -> Self {
        Self { keypair, client }
    }
}

#[async_trait]
impl WalletSigner for KeypairSigner {
    async fn sign_and_send(&self, mut transaction: Transaction) -> Result<Signature, LedgerError> {
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_sign(&[&self.keypair], blockhash)
            .map_err(|e| LedgerError::InvalidAccount(e.to_string()))?;

        self.client
            .send_transaction(&transaction)
            .await
            .map_err(classify)
    }
}
