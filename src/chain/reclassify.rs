//! Call-exception reclassification
//!
//! Nodes report a reverted read as a call exception whether the contract
//! rejected the call or the node itself misbehaved (pruned state, stale head,
//! proxy glitch). Retry logic upstream only retries server-class failures, so
//! generic call exceptions are re-tagged as server errors here. Reverts whose
//! reason matches a known business rule stay permanent.

use super::rpc::ChainRpc;
use crate::error::{MesonError, MesonResult};

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Block, BlockId, Bytes, Transaction, TransactionReceipt, H256, U256};

pub struct ReclassifyRpc<R> {
    inner: R,
    /// Lowercased revert reasons that are definite business-logic rejections
    business_reverts: Vec<String>,
}

impl<R: ChainRpc> ReclassifyRpc<R> {
    pub fn new<I, S>(inner: R, business_reverts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            inner,
            business_reverts: business_reverts
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    fn is_business_revert(&self, reason: &str) -> bool {
        let reason = reason.to_lowercase();
        self.business_reverts
            .iter()
            .any(|pattern| reason.contains(pattern.as_str()))
    }

    fn reclassify(&self, err: MesonError) -> MesonError {
        match err {
            MesonError::CallException {
                reason: Some(reason),
            } if self.is_business_revert(&reason) => MesonError::Revert { reason },
            MesonError::CallException { reason } => MesonError::ServerError {
                message: "call exception".to_string(),
                reason,
            },
            other => other,
        }
    }
}

#[async_trait]
impl<R: ChainRpc> ChainRpc for ReclassifyRpc<R> {
    async fn call(&self, tx: &TypedTransaction, block: Option<BlockId>) -> MesonResult<Bytes> {
        self.inner
            .call(tx, block)
            .await
            .map_err(|e| self.reclassify(e))
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> MesonResult<U256> {
        self.inner
            .estimate_gas(tx)
            .await
            .map_err(|e| self.reclassify(e))
    }

    async fn get_transaction_count(
        &self,
        address: Address,
        block: Option<BlockId>,
    ) -> MesonResult<U256> {
        self.inner
            .get_transaction_count(address, block)
            .await
            .map_err(|e| self.reclassify(e))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> MesonResult<H256> {
        self.inner
            .send_raw_transaction(raw)
            .await
            .map_err(|e| self.reclassify(e))
    }

    async fn get_block_with_txs(&self, block: BlockId) -> MesonResult<Option<Block<Transaction>>> {
        self.inner
            .get_block_with_txs(block)
            .await
            .map_err(|e| self.reclassify(e))
    }

    async fn get_block_number(&self) -> MesonResult<u64> {
        self.inner
            .get_block_number()
            .await
            .map_err(|e| self.reclassify(e))
    }

    async fn get_gas_price(&self) -> MesonResult<U256> {
        self.inner
            .get_gas_price()
            .await
            .map_err(|e| self.reclassify(e))
    }

    async fn get_transaction_receipt(
        &self,
        hash: H256,
    ) -> MesonResult<Option<TransactionReceipt>> {
        self.inner
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| self.reclassify(e))
    }

    async fn get_chain_id(&self) -> MesonResult<u64> {
        self.inner
            .get_chain_id()
            .await
            .map_err(|e| self.reclassify(e))
    }
}
