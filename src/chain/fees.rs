//! Priority fee recommendation from recent block contents

use super::rpc::ChainRpc;
use crate::error::MesonResult;

use ethers::types::{BlockId, BlockNumber, U256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Used when no recent block carries an EIP-1559 transaction (2.5 gwei)
pub const FALLBACK_PRIORITY_FEE: u64 = 2_500_000_000;

/// Blocks stepped back per retry when a block has no priority fees
pub const LOOKBACK_STEP: u64 = 5;

/// Retries after the latest block
pub const EXTRA_LOOKBACKS: usize = 3;

/// Fee parameters for a new transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeData {
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
}

impl FeeData {
    pub fn is_eip1559(&self) -> bool {
        self.max_fee_per_gas.is_some()
    }
}

pub struct PriorityFeeOracle {
    rpc: Arc<dyn ChainRpc>,
    network: String,
}

impl PriorityFeeOracle {
    pub fn new(rpc: Arc<dyn ChainRpc>, network: impl Into<String>) -> Self {
        Self {
            rpc,
            network: network.into(),
        }
    }

    /// 80th percentile of the priority fees in the latest block that has any
    pub async fn recommended_priority_fee(&self) -> MesonResult<U256> {
        let mut block_id = BlockId::Number(BlockNumber::Latest);

        for attempt in 0..=EXTRA_LOOKBACKS {
            let Some(block) = self.rpc.get_block_with_txs(block_id).await? else {
                break;
            };

            let mut fees: Vec<U256> = block
                .transactions
                .iter()
                .filter_map(|tx| tx.max_priority_fee_per_gas)
                .filter(|fee| !fee.is_zero())
                .collect();

            if !fees.is_empty() {
                fees.sort();
                let fee = fees[percentile_index(fees.len())];
                debug!(
                    "Priority fee on {} from {} samples: {}",
                    self.network,
                    fees.len(),
                    fee
                );
                return Ok(fee);
            }

            let Some(number) = block.number.map(|n| n.as_u64()) else {
                break;
            };
            if number < LOOKBACK_STEP || attempt == EXTRA_LOOKBACKS {
                break;
            }
            block_id = BlockId::Number(BlockNumber::Number((number - LOOKBACK_STEP).into()));
        }

        warn!(
            "No priority fees observed on {}, using fallback {}",
            self.network, FALLBACK_PRIORITY_FEE
        );
        crate::metrics::record_fee_fallback(&self.network);
        Ok(U256::from(FALLBACK_PRIORITY_FEE))
    }

    /// EIP-1559 fields when the chain reports a base fee, legacy gas price otherwise
    pub async fn fee_data(&self) -> MesonResult<FeeData> {
        let gas_price = self.rpc.get_gas_price().await?;
        let base_fee = self
            .rpc
            .get_block_with_txs(BlockId::Number(BlockNumber::Latest))
            .await?
            .and_then(|block| block.base_fee_per_gas);

        match base_fee {
            Some(base_fee) => {
                let priority_fee = self.recommended_priority_fee().await?;
                Ok(FeeData {
                    gas_price: Some(gas_price),
                    max_fee_per_gas: Some(base_fee * 2 + priority_fee),
                    max_priority_fee_per_gas: Some(priority_fee),
                })
            }
            None => Ok(FeeData {
                gas_price: Some(gas_price),
                max_fee_per_gas: None,
                max_priority_fee_per_gas: None,
            }),
        }
    }
}

/// `min(ceil(0.8 * n), n - 1)`
fn percentile_index(n: usize) -> usize {
    ((4 * n + 4) / 5).min(n - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::rpc::MockChainRpc;
    use ethers::types::{Block, Transaction, U64};

    fn tx_with_tip(tip: Option<u64>) -> Transaction {
        Transaction {
            max_priority_fee_per_gas: tip.map(U256::from),
            ..Default::default()
        }
    }

    fn block(number: u64, tips: &[Option<u64>], base_fee: Option<u64>) -> Block<Transaction> {
        Block {
            number: Some(U64::from(number)),
            base_fee_per_gas: base_fee.map(U256::from),
            transactions: tips.iter().map(|tip| tx_with_tip(*tip)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_percentile_index() {
        assert_eq!(percentile_index(1), 0);
        assert_eq!(percentile_index(2), 1);
        assert_eq!(percentile_index(5), 4);
        assert_eq!(percentile_index(10), 8);
    }

    #[tokio::test]
    async fn test_recommends_high_percentile_of_latest_block() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_get_block_with_txs().times(1).returning(|_| {
            Ok(Some(block(
                100,
                &[Some(5), Some(1), None, Some(0), Some(3), Some(2), Some(4)],
                Some(10),
            )))
        });

        let oracle = PriorityFeeOracle::new(Arc::new(rpc), "ethereum");
        // [1, 2, 3, 4, 5] -> index 4
        assert_eq!(
            oracle.recommended_priority_fee().await.unwrap(),
            U256::from(5)
        );
    }

    #[tokio::test]
    async fn test_steps_back_when_latest_block_is_empty() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_get_block_with_txs()
            .withf(|id| *id == BlockId::Number(BlockNumber::Latest))
            .times(1)
            .returning(|_| Ok(Some(block(100, &[], Some(10)))));
        rpc.expect_get_block_with_txs()
            .withf(|id| *id == BlockId::Number(BlockNumber::Number(U64::from(95u64))))
            .times(1)
            .returning(|_| Ok(Some(block(95, &[Some(7)], Some(10)))));

        let oracle = PriorityFeeOracle::new(Arc::new(rpc), "ethereum");
        assert_eq!(
            oracle.recommended_priority_fee().await.unwrap(),
            U256::from(7)
        );
    }

    #[tokio::test]
    async fn test_falls_back_after_four_empty_blocks() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_get_block_with_txs()
            .times(4)
            .returning(|id| {
                let number = match id {
                    BlockId::Number(BlockNumber::Number(n)) => n.as_u64(),
                    _ => 100,
                };
                Ok(Some(block(number, &[None, Some(0)], Some(10))))
            });

        let oracle = PriorityFeeOracle::new(Arc::new(rpc), "ethereum");
        assert_eq!(
            oracle.recommended_priority_fee().await.unwrap(),
            U256::from(FALLBACK_PRIORITY_FEE)
        );
    }

    #[tokio::test]
    async fn test_fee_data_with_base_fee() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_get_gas_price()
            .returning(|| Ok(U256::from(30)));
        rpc.expect_get_block_with_txs()
            .returning(|_| Ok(Some(block(100, &[Some(2)], Some(10)))));

        let oracle = PriorityFeeOracle::new(Arc::new(rpc), "ethereum");
        let fees = oracle.fee_data().await.unwrap();

        assert!(fees.is_eip1559());
        assert_eq!(fees.max_priority_fee_per_gas, Some(U256::from(2)));
        assert_eq!(fees.max_fee_per_gas, Some(U256::from(22)));
        assert_eq!(fees.gas_price, Some(U256::from(30)));
    }

    #[tokio::test]
    async fn test_fee_data_without_base_fee_is_legacy() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_get_gas_price()
            .returning(|| Ok(U256::from(5_000_000_000u64)));
        rpc.expect_get_block_with_txs()
            .times(1)
            .returning(|_| Ok(Some(block(100, &[Some(2)], None))));

        let oracle = PriorityFeeOracle::new(Arc::new(rpc), "bnb");
        assert_eq!(
            oracle.fee_data().await.unwrap(),
            FeeData {
                gas_price: Some(U256::from(5_000_000_000u64)),
                max_fee_per_gas: None,
                max_priority_fee_per_gas: None,
            }
        );
    }
}
