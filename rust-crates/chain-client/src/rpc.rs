//! The node boundary.
//!
//! [`Connection`] is the only way the rest of the workspace talks to a chain.
//! Every operation is a single request; nothing here retries. Callers that want
//! resilience loop explicitly.

use crate::{
    Error,
    LogEntry,
    LogFilter,
    Receipt,
    Result,
};
use alloy::primitives::{
    Address,
    Bytes,
    TxHash,
    U256,
};
use std::time::Duration;
use tokio::time::{
    Instant,
    sleep,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// How long and how often [`Connection::wait_for_receipt`] polls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }
}

pub trait Connection {
    fn chain_id(&self) -> u64;

    fn signer_address(&self) -> Option<Address>;

    fn wait_policy(&self) -> WaitPolicy;

    /// Read-only `eth_call`. `calldata` is selector plus encoded arguments.
    fn call(
        &self,
        to: Address,
        calldata: Bytes,
    ) -> impl Future<Output = Result<Bytes>>;

    /// Signs and submits a transaction, returning as soon as the node accepts it.
    fn send(
        &self,
        to: Address,
        calldata: Bytes,
        value: U256,
    ) -> impl Future<Output = Result<TxHash>>;

    fn receipt(&self, hash: TxHash) -> impl Future<Output = Result<Option<Receipt>>>;

    /// Re-executes a mined transaction as a call against the state it saw, to
    /// recover revert data the receipt does not carry.
    fn replay(&self, hash: TxHash, block: u64) -> impl Future<Output = Result<Bytes>>;

    fn block_number(&self) -> impl Future<Output = Result<u64>>;

    fn balance(&self, address: Address) -> impl Future<Output = Result<U256>>;

    fn logs(&self, filter: &LogFilter) -> impl Future<Output = Result<Vec<LogEntry>>>;

    /// Raw 32-byte word at `slot` of `address`'s storage.
    fn storage_at(&self, address: Address, slot: U256) -> impl Future<Output = Result<U256>>;

    /// Deployed bytecode; empty for externally owned accounts.
    fn code_at(&self, address: Address) -> impl Future<Output = Result<Bytes>>;

    /// Gas the node expects the transaction to use. A transaction that would
    /// revert fails here with [`Error::Revert`]; nothing is signed or sent.
    fn estimate_gas(
        &self,
        to: Address,
        calldata: Bytes,
        value: U256,
    ) -> impl Future<Output = Result<u64>>;

    /// Polls until the transaction has `confirmations` blocks on top of and
    /// including its own, or the policy timeout elapses.
    ///
    /// A mined-but-failed transaction is an [`Error::Revert`], never a receipt.
    fn wait_for_receipt(
        &self,
        hash: TxHash,
        confirmations: u64,
    ) -> impl Future<Output = Result<Receipt>> {
        async move {
            let policy = self.wait_policy();
            let required = confirmations.max(1);
            let started = Instant::now();
            tracing::debug!(%hash, required, "waiting for receipt");
            loop {
                if let Some(receipt) = self.receipt(hash).await? {
                    if !receipt.success {
                        return Err(self.revert_of(hash, receipt.block_number).await);
                    }
                    let head = self.block_number().await?;
                    let seen = head.saturating_sub(receipt.block_number) + 1;
                    if seen >= required {
                        tracing::info!(
                            %hash,
                            block = receipt.block_number,
                            gas_used = receipt.gas_used,
                            "transaction confirmed"
                        );
                        return Ok(receipt);
                    }
                    tracing::trace!(%hash, seen, required, "awaiting confirmations");
                }
                let waited = started.elapsed();
                if waited >= policy.timeout {
                    return Err(Error::Timeout { hash, waited });
                }
                sleep(policy.poll_interval).await;
            }
        }
    }

    #[doc(hidden)]
    fn revert_of(&self, hash: TxHash, block: u64) -> impl Future<Output = Error> {
        async move {
            match self.replay(hash, block).await {
                Err(err @ Error::Revert { .. }) => err,
                Ok(_) => {
                    tracing::warn!(
                        %hash,
                        "transaction reverted but replay succeeded; revert data unavailable"
                    );
                    Error::revert(Bytes::new())
                }
                Err(other) => {
                    tracing::warn!(%hash, "failed to replay reverted transaction: {other}");
                    Error::revert(Bytes::new())
                }
            }
        }
    }
}
