//! Scripted in-memory ledger for tests and offline runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use super::{BlockRef, LedgerError, LedgerRpc, WalletSigner};

/// Scripted outcome for one send or confirm call. Calls past the end of a
/// script succeed.
#[derive(Debug, Clone)]
pub enum Step {
    Ok,
    Err(LedgerError),
}

#[derive(Default)]
struct Inner {
    balance: AtomicU64,
    balance_error: Mutex<Option<LedgerError>>,
    send_script: Mutex<VecDeque<Step>>,
    confirm_script: Mutex<VecDeque<Step>>,
    block_height: AtomicU64,
    latency_ms: AtomicU64,
    block_ref_fetches: AtomicU32,
    balance_queries: AtomicU32,
    submissions: AtomicU32,
    confirmations: AtomicU32,
    transactions: Mutex<Vec<Transaction>>,
    sent: Mutex<Vec<Signature>>,
    confirmed_refs: Mutex<Vec<BlockRef>>,
}

/// Both halves of the ledger boundary, backed by scripts and counters.
///
/// Clones share state, so one handle can be given to a submitter as RPC and
/// signer while the test keeps another to inspect.
#[derive(Clone, Default)]
pub struct ScriptedLedger {
    inner: Arc<Inner>,
}

impl ScriptedLedger {
    pub fn new(balance_lamports: u64) -> Self {
        let ledger = Self::default();
        ledger.set_balance(balance_lamports);
        ledger
    }

    pub fn set_balance(&self, lamports: u64) {
        self.inner.balance.store(lamports, Ordering::SeqCst);
    }

    /// Delay every balance query and send by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make balance queries fail with `error` until cleared with `None`.
    pub fn fail_balance(&self, error: Option<LedgerError>) {
        *self.inner.balance_error.lock() = error;
    }

    pub fn script_send(&self, steps: impl IntoIterator<Item = Step>) {
        self.inner.send_script.lock().extend(steps);
    }

    pub fn script_confirm(&self, steps: impl IntoIterator<Item = Step>) {
        self.inner.confirm_script.lock().extend(steps);
    }

    pub fn block_ref_fetches(&self) -> u32 {
        self.inner.block_ref_fetches.load(Ordering::SeqCst)
    }

    pub fn balance_queries(&self) -> u32 {
        self.inner.balance_queries.load(Ordering::SeqCst)
    }

    /// Calls to `sign_and_send`, including declined and failed ones.
    pub fn submissions(&self) -> u32 {
        self.inner.submissions.load(Ordering::SeqCst)
    }

    pub fn confirmations(&self) -> u32 {
        self.inner.confirmations.load(Ordering::SeqCst)
    }

    /// Transactions handed to the signer, in order.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.inner.transactions.lock().clone()
    }

    /// Signatures of successfully broadcast transactions.
    pub fn sent_signatures(&self) -> Vec<Signature> {
        self.inner.sent.lock().clone()
    }

    /// Block references passed to `confirm`, in order.
    pub fn confirmed_block_refs(&self) -> Vec<BlockRef> {
        self.inner.confirmed_refs.lock().clone()
    }

    /// Fee payers of every transaction handed to the signer.
    pub fn fee_payers(&self) -> Vec<Pubkey> {
        self.inner
            .transactions
            .lock()
            .iter()
            .filter_map(|tx| tx.message.account_keys.first().copied())
            .collect()
    }

    async fn simulate_latency(&self) {
        let ms = self.inner.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn next(script: &Mutex<VecDeque<Step>>) -> Result<(), LedgerError> {
        match script.lock().pop_front() {
            None | Some(Step::Ok) => Ok(()),
            Some(Step::Err(err)) => Err(err),
        }
    }
}

#[async_trait]
impl LedgerRpc for ScriptedLedger {
    async fn latest_block_ref(&self) -> Result<BlockRef, LedgerError> {
        self.inner.block_ref_fetches.fetch_add(1, Ordering::SeqCst);
        let height = self.inner.block_height.fetch_add(10, Ordering::SeqCst);
        Ok(BlockRef {
            blockhash: Hash::new_unique(),
            last_valid_block_height: height + 150,
        })
    }

    async fn balance(&self, _wallet: &Pubkey) -> Result<u64, LedgerError> {
        self.inner.balance_queries.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if let Some(err) = self.inner.balance_error.lock().clone() {
            return Err(err);
        }
        Ok(self.inner.balance.load(Ordering::SeqCst))
    }

    async fn confirm(&self, _signature: &Signature, block_ref: &BlockRef) -> Result<(), LedgerError> {
        self.inner.confirmations.fetch_add(1, Ordering::SeqCst);
        self.inner.confirmed_refs.lock().push(*block_ref);
        Self::next(&self.inner.confirm_script)
    }
}

#[async_trait]
impl WalletSigner for ScriptedLedger {
    async fn sign_and_send(&self, transaction: Transaction) -> Result<Signature, LedgerError> {
        self.inner.submissions.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.inner.transactions.lock().push(transaction);
        Self::next(&self.inner.send_script)?;

        let signature = Signature::new_unique();
        self.inner.sent.lock().push(signature);
        Ok(signature)
    }
}
