//! Transaction sender for contract writes

use crate::chain::{FeeData, ResilientProvider};
use crate::error::{MesonError, MesonResult};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, BlockId, BlockNumber, Bytes, Eip1559TransactionRequest, TransactionRequest, H256,
    U256,
};
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_000);

/// Signs writes locally and broadcasts them through a resilient provider
pub struct TransactionSender {
    wallet: LocalWallet,
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
    max_attempts: u32,
    retry_delay: Duration,
}

impl TransactionSender {
    pub fn new(wallet: LocalWallet) -> Self {
        Self {
            wallet,
            gas_limit_buffer_percent: 20,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retries(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Gas limit with the configured buffer on top of an estimate
    pub fn buffered_gas(&self, estimate: U256) -> U256 {
        estimate + estimate * self.gas_limit_buffer_percent / 100
    }

    /// Build, sign and broadcast a call to `to`
    pub async fn send(
        &self,
        provider: &ResilientProvider,
        to: Address,
        data: Bytes,
    ) -> MesonResult<H256> {
        let rpc = provider.rpc();
        let chain_id = rpc.get_chain_id().await?;
        let from = self.wallet.address();

        let nonce = rpc
            .get_transaction_count(from, Some(BlockId::Number(BlockNumber::Pending)))
            .await?;
        let fees = provider.fee_data().await?;

        let mut tx = build_tx(from, to, data, nonce, chain_id, &fees)?;
        let estimate = rpc.estimate_gas(&tx).await?;
        tx.set_gas(self.buffered_gas(estimate));

        let wallet = self.wallet.clone().with_chain_id(chain_id);
        let signature = wallet.sign_transaction(&tx).await?;
        let raw = tx.rlp_signed(&signature);
        debug!(
            "Signed transaction to {:?} on {} with nonce {}",
            to,
            provider.network(),
            nonce
        );

        self.send_with_retry(provider, raw).await
    }

    /// Rebroadcast the same signed bytes on retryable failures
    async fn send_with_retry(&self, provider: &ResilientProvider, raw: Bytes) -> MesonResult<H256> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match provider.rpc().send_raw_transaction(raw.clone()).await {
                Ok(tx_hash) => {
                    info!(
                        "Transaction sent: {:?} (attempt {}/{})",
                        tx_hash, attempts, self.max_attempts
                    );
                    return Ok(tx_hash);
                }
                Err(e) if e.is_retryable() && attempts < self.max_attempts => {
                    warn!(
                        "Transaction send failed on {} (attempt {}): {}",
                        provider.network(),
                        attempts,
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn build_tx(
    from: Address,
    to: Address,
    data: Bytes,
    nonce: U256,
    chain_id: u64,
    fees: &FeeData,
) -> MesonResult<TypedTransaction> {
    match (fees.max_fee_per_gas, fees.max_priority_fee_per_gas) {
        (Some(max_fee), Some(priority_fee)) => Ok(Eip1559TransactionRequest::new()
            .from(from)
            .to(to)
            .data(data)
            .nonce(nonce)
            .chain_id(chain_id)
            .max_fee_per_gas(max_fee)
            .max_priority_fee_per_gas(priority_fee)
            .into()),
        _ => {
            let gas_price = fees.gas_price.ok_or_else(|| {
                MesonError::Provider("no gas price available".to_string())
            })?;
            Ok(TransactionRequest::new()
                .from(from)
                .to(to)
                .data(data)
                .nonce(nonce)
                .chain_id(chain_id)
                .gas_price(gas_price)
                .into())
        }
    }
}
