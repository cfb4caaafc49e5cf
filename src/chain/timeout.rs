//! Wall-clock bounds on individual RPC requests

use super::rpc::ChainRpc;
use crate::error::{MesonError, MesonResult};

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Block, BlockId, Bytes, Transaction, TransactionReceipt, H256, U256};
use ethers::utils::keccak256;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounds requests; a timeout cancels only the request that expired
pub struct TimeoutRpc<R> {
    inner: R,
    /// `None` leaves reads to the inner layer
    call_timeout: Option<Duration>,
    send_timeout: Duration,
}

impl<R: ChainRpc> TimeoutRpc<R> {
    pub fn new(inner: R, call_timeout: Duration, send_timeout: Duration) -> Self {
        Self {
            inner,
            call_timeout: Some(call_timeout),
            send_timeout,
        }
    }

    /// Bound broadcasts only, for an inner layer that already bounds its reads
    pub fn sends_only(inner: R, send_timeout: Duration) -> Self {
        Self {
            inner,
            call_timeout: None,
            send_timeout,
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    async fn bounded<T, F>(&self, operation: &str, request: F) -> MesonResult<T>
    where
        F: Future<Output = MesonResult<T>> + Send,
    {
        let Some(limit) = self.call_timeout else {
            return request.await;
        };
        match tokio::time::timeout(limit, request).await {
            Ok(result) => result,
            Err(_) => Err(MesonError::Timeout {
                operation: operation.to_string(),
                tx_hash: None,
            }),
        }
    }
}

#[async_trait]
impl<R: ChainRpc> ChainRpc for TimeoutRpc<R> {
    async fn call(&self, tx: &TypedTransaction, block: Option<BlockId>) -> MesonResult<Bytes> {
        self.bounded("eth_call", self.inner.call(tx, block)).await
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> MesonResult<U256> {
        self.bounded("eth_estimateGas", self.inner.estimate_gas(tx))
            .await
    }

    async fn get_transaction_count(
        &self,
        address: Address,
        block: Option<BlockId>,
    ) -> MesonResult<U256> {
        self.bounded(
            "eth_getTransactionCount",
            self.inner.get_transaction_count(address, block),
        )
        .await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> MesonResult<H256> {
        // the hash is known up front, so a caller can still poll for the
        // transaction after the broadcast timed out
        let tx_hash = H256(keccak256(&raw));
        let send = self.inner.send_raw_transaction(raw);
        match tokio::time::timeout(self.send_timeout, send).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Broadcast of {:?} did not resolve within {:?}",
                    tx_hash, self.send_timeout
                );
                Err(MesonError::Timeout {
                    operation: "eth_sendRawTransaction".to_string(),
                    tx_hash: Some(tx_hash),
                })
            }
        }
    }

    async fn get_block_with_txs(&self, block: BlockId) -> MesonResult<Option<Block<Transaction>>> {
        self.bounded("eth_getBlockByNumber", self.inner.get_block_with_txs(block))
            .await
    }

    async fn get_block_number(&self) -> MesonResult<u64> {
        self.bounded("eth_blockNumber", self.inner.get_block_number())
            .await
    }

    async fn get_gas_price(&self) -> MesonResult<U256> {
        self.bounded("eth_gasPrice", self.inner.get_gas_price())
            .await
    }

    async fn get_transaction_receipt(
        &self,
        hash: H256,
    ) -> MesonResult<Option<TransactionReceipt>> {
        self.bounded(
            "eth_getTransactionReceipt",
            self.inner.get_transaction_receipt(hash),
        )
        .await
    }

    async fn get_chain_id(&self) -> MesonResult<u64> {
        self.bounded("eth_chainId", self.inner.get_chain_id()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Transport whose broadcasts never resolve
    struct Stalled {
        completed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChainRpc for Stalled {
        async fn call(&self, _: &TypedTransaction, _: Option<BlockId>) -> MesonResult<Bytes> {
            std::future::pending().await
        }
        async fn estimate_gas(&self, _: &TypedTransaction) -> MesonResult<U256> {
            Ok(U256::from(21_000))
        }
        async fn get_transaction_count(
            &self,
            _: Address,
            _: Option<BlockId>,
        ) -> MesonResult<U256> {
            Ok(U256::zero())
        }
        async fn send_raw_transaction(&self, _: Bytes) -> MesonResult<H256> {
            std::future::pending().await
        }
        async fn get_block_with_txs(
            &self,
            _: BlockId,
        ) -> MesonResult<Option<Block<Transaction>>> {
            Ok(None)
        }
        async fn get_block_number(&self) -> MesonResult<u64> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        }
        async fn get_gas_price(&self) -> MesonResult<U256> {
            Ok(U256::one())
        }
        async fn get_transaction_receipt(
            &self,
            _: H256,
        ) -> MesonResult<Option<TransactionReceipt>> {
            Ok(None)
        }
        async fn get_chain_id(&self) -> MesonResult<u64> {
            Ok(1)
        }
    }

    fn stalled() -> (TimeoutRpc<Stalled>, Arc<AtomicUsize>) {
        let completed = Arc::new(AtomicUsize::new(0));
        let rpc = TimeoutRpc::new(
            Stalled {
                completed: completed.clone(),
            },
            Duration::from_millis(50),
            Duration::from_millis(50),
        );
        (rpc, completed)
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout_reports_local_hash() {
        let (rpc, _) = stalled();
        let raw = Bytes::from(vec![0x02, 0xf8, 0x6b]);

        let err = rpc.send_raw_transaction(raw.clone()).await.unwrap_err();
        assert_eq!(
            err,
            MesonError::Timeout {
                operation: "eth_sendRawTransaction".to_string(),
                tx_hash: Some(H256(keccak256(&raw))),
            }
        );
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_does_not_cancel_other_requests() {
        let (rpc, completed) = stalled();
        let rpc = Arc::new(rpc);

        let stuck = {
            let rpc = rpc.clone();
            tokio::spawn(async move { rpc.call(&TypedTransaction::default(), None).await })
        };
        assert_eq!(rpc.get_block_number().await.unwrap(), 7);

        assert!(matches!(
            stuck.await.unwrap(),
            Err(MesonError::Timeout { tx_hash: None, .. })
        ));
        assert_eq!(rpc.get_block_number().await.unwrap(), 7);
        assert_eq!(completed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_only_leaves_reads_unbounded() {
        let completed = Arc::new(AtomicUsize::new(0));
        let rpc = TimeoutRpc::sends_only(
            Stalled {
                completed: completed.clone(),
            },
            Duration::from_millis(50),
        );

        let read = tokio::time::timeout(
            Duration::from_secs(60),
            rpc.call(&TypedTransaction::default(), None),
        )
        .await;
        assert!(read.is_err(), "read should still be pending");

        let err = rpc.send_raw_transaction(Bytes::from(vec![1])).await.unwrap_err();
        assert!(matches!(err, MesonError::Timeout { tx_hash: Some(_), .. }));
    }
}
