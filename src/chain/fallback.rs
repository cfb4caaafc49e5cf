//! Priority-ordered fallback over a weighted group of endpoints

use super::rpc::ChainRpc;
use crate::error::{MesonError, MesonResult};

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Block, BlockId, Bytes, Transaction, TransactionReceipt, H256, U256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One endpoint of a fallback group
pub struct FallbackEntry {
    pub rpc: Arc<dyn ChainRpc>,
    pub label: String,
    /// Lower is tried first
    pub priority: u32,
    pub weight: u32,
    /// Bound on a single attempt before moving to the next endpoint
    pub stall_timeout: Duration,
}

/// Issues each read against endpoints in priority order until one answers
pub struct FallbackRpc {
    entries: Vec<FallbackEntry>,
    threshold: u32,
}

impl FallbackRpc {
    pub fn new(mut entries: Vec<FallbackEntry>, threshold: u32) -> MesonResult<Self> {
        if entries.is_empty() {
            return Err(MesonError::Config(
                "fallback group needs at least one endpoint".to_string(),
            ));
        }
        if let Some(entry) = entries.iter().find(|e| e.weight == 0) {
            return Err(MesonError::Config(format!(
                "endpoint {} has zero weight",
                entry.label
            )));
        }
        let total_weight: u32 = entries.iter().map(|e| e.weight).sum();
        if threshold == 0 || threshold > total_weight {
            return Err(MesonError::Config(format!(
                "threshold {} outside 1..={}",
                threshold, total_weight
            )));
        }

        entries.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.weight.cmp(&a.weight))
        });

        Ok(Self { entries, threshold })
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }

    async fn read<T, F, Fut>(&self, operation: &'static str, request: F) -> MesonResult<T>
    where
        F: Fn(Arc<dyn ChainRpc>) -> Fut + Send + Sync,
        Fut: Future<Output = MesonResult<T>> + Send,
        T: Send,
    {
        let mut last_error = None;

        for (idx, entry) in self.entries.iter().enumerate() {
            let attempt = tokio::time::timeout(entry.stall_timeout, request(entry.rpc.clone()));
            let result = match attempt.await {
                Ok(result) => result,
                Err(_) => Err(MesonError::Timeout {
                    operation: format!("{} on {}", operation, entry.label),
                    tx_hash: None,
                }),
            };

            match result {
                Ok(value) => {
                    if idx > 0 {
                        debug!("{} answered by fallback endpoint {}", operation, entry.label);
                        crate::metrics::record_rpc_fallback(&entry.label);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!("{} failed on {}: {}", operation, entry.label, e);
                    crate::metrics::record_rpc_failure(&entry.label);
                    last_error = Some(e);
                }
            }
        }

        Err(exhausted(self.entries.len(), last_error))
    }
}

fn exhausted(attempts: usize, last_error: Option<MesonError>) -> MesonError {
    MesonError::AllProvidersFailed {
        attempts,
        last_error: Box::new(
            last_error.unwrap_or_else(|| MesonError::Provider("no endpoint attempted".to_string())),
        ),
    }
}

#[async_trait]
impl ChainRpc for FallbackRpc {
    async fn call(&self, tx: &TypedTransaction, block: Option<BlockId>) -> MesonResult<Bytes> {
        self.read("eth_call", |rpc| {
            let tx = tx.clone();
            async move { rpc.call(&tx, block).await }
        })
        .await
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> MesonResult<U256> {
        self.read("eth_estimateGas", |rpc| {
            let tx = tx.clone();
            async move { rpc.estimate_gas(&tx).await }
        })
        .await
    }

    async fn get_transaction_count(
        &self,
        address: Address,
        block: Option<BlockId>,
    ) -> MesonResult<U256> {
        self.read("eth_getTransactionCount", |rpc| async move {
            rpc.get_transaction_count(address, block).await
        })
        .await
    }

    /// Broadcast to endpoints in order until the accepting weight reaches the threshold
    async fn send_raw_transaction(&self, raw: Bytes) -> MesonResult<H256> {
        let mut accepted_weight = 0u32;
        let mut accepted_hash = None;
        let mut last_error = None;

        for entry in &self.entries {
            let attempt = tokio::time::timeout(
                entry.stall_timeout,
                entry.rpc.send_raw_transaction(raw.clone()),
            );
            let result = match attempt.await {
                Ok(result) => result,
                Err(_) => Err(MesonError::Timeout {
                    operation: format!("eth_sendRawTransaction on {}", entry.label),
                    tx_hash: None,
                }),
            };

            match result {
                Ok(hash) => {
                    accepted_weight += entry.weight;
                    accepted_hash = Some(hash);
                    if accepted_weight >= self.threshold {
                        return Ok(hash);
                    }
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!("Broadcast failed on {}: {}", entry.label, e);
                    crate::metrics::record_rpc_failure(&entry.label);
                    last_error = Some(e);
                }
            }
        }

        match accepted_hash {
            Some(hash) => {
                warn!(
                    "Broadcast of {:?} accepted with weight {} below threshold {}",
                    hash, accepted_weight, self.threshold
                );
                Ok(hash)
            }
            None => Err(exhausted(self.entries.len(), last_error)),
        }
    }

    async fn get_block_with_txs(&self, block: BlockId) -> MesonResult<Option<Block<Transaction>>> {
        self.read("eth_getBlockByNumber", |rpc| async move {
            rpc.get_block_with_txs(block).await
        })
        .await
    }

    async fn get_block_number(&self) -> MesonResult<u64> {
        self.read("eth_blockNumber", |rpc| async move { rpc.get_block_number().await })
            .await
    }

    async fn get_gas_price(&self) -> MesonResult<U256> {
        self.read("eth_gasPrice", |rpc| async move { rpc.get_gas_price().await })
            .await
    }

    async fn get_transaction_receipt(
        &self,
        hash: H256,
    ) -> MesonResult<Option<TransactionReceipt>> {
        self.read("eth_getTransactionReceipt", |rpc| async move {
            rpc.get_transaction_receipt(hash).await
        })
        .await
    }

    async fn get_chain_id(&self) -> MesonResult<u64> {
        self.read("eth_chainId", |rpc| async move { rpc.get_chain_id().await })
            .await
    }
}
