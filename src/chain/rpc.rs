//! RPC seam shared by every layer of the resilient provider

use crate::error::{MesonError, MesonResult};

use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::providers::{
    Http, JsonRpcClient, JsonRpcError, Middleware, Provider, ProviderError, RpcError, Ws,
};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Block, BlockId, Bytes, Transaction, TransactionReceipt, H256, U256,
};
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use tracing::debug;

/// Selector of Solidity's `Error(string)`
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// JSON-RPC error code geth uses for reverted calls
const EXECUTION_REVERTED_CODE: i64 = 3;

lazy_static! {
    static ref REVERT_MESSAGE: Regex = Regex::new(
        r"(?i)(?:execution reverted|reverted with reason string|revert)[:\s]*'?([^']*)'?$"
    )
    .expect("static regex");
}

/// Chain RPC operations the core depends on
///
/// Each decorator of the provider stack implements this trait over an inner
/// implementation, so timeouts, reclassification and fallback compose freely.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Execute a read-only call
    async fn call(&self, tx: &TypedTransaction, block: Option<BlockId>) -> MesonResult<Bytes>;

    async fn estimate_gas(&self, tx: &TypedTransaction) -> MesonResult<U256>;

    async fn get_transaction_count(
        &self,
        address: Address,
        block: Option<BlockId>,
    ) -> MesonResult<U256>;

    /// Broadcast a signed transaction, returning its hash
    async fn send_raw_transaction(&self, raw: Bytes) -> MesonResult<H256>;

    async fn get_block_with_txs(&self, block: BlockId) -> MesonResult<Option<Block<Transaction>>>;

    async fn get_block_number(&self) -> MesonResult<u64>;

    async fn get_gas_price(&self) -> MesonResult<U256>;

    async fn get_transaction_receipt(&self, hash: H256)
        -> MesonResult<Option<TransactionReceipt>>;

    async fn get_chain_id(&self) -> MesonResult<u64>;
}

/// Base transport over an ethers provider
pub struct EthersRpc<P> {
    provider: Provider<P>,
    label: String,
}

impl<P: JsonRpcClient> EthersRpc<P> {
    pub fn new(provider: Provider<P>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl EthersRpc<Http> {
    pub fn http(url: &str) -> MesonResult<Self> {
        let provider = Provider::<Http>::try_from(url)
            .map_err(|e| MesonError::Config(format!("invalid RPC url {}: {}", url, e)))?
            .interval(Duration::from_millis(100));
        Ok(Self::new(provider, url))
    }
}

impl EthersRpc<Ws> {
    pub async fn ws(url: &str) -> MesonResult<Self> {
        let provider = Provider::<Ws>::connect(url)
            .await
            .map_err(|e| MesonError::Provider(format!("websocket {}: {}", url, e)))?;
        Ok(Self::new(provider, url))
    }
}

/// Map a provider failure, keeping chain rejections apart from transport errors
pub fn classify_provider_error(err: ProviderError) -> MesonError {
    match err.as_error_response() {
        Some(response) if is_revert(response) => MesonError::CallException {
            reason: revert_reason(response),
        },
        Some(response) => MesonError::Provider(format!(
            "{} (code {})",
            response.message, response.code
        )),
        None => MesonError::Provider(err.to_string()),
    }
}

fn is_revert(response: &JsonRpcError) -> bool {
    response.code == EXECUTION_REVERTED_CODE || response.message.to_lowercase().contains("revert")
}

/// Extract the reason of a reverted call from its error payload or message
pub fn revert_reason(response: &JsonRpcError) -> Option<String> {
    if let Some(data) = response.data.as_ref().and_then(|d| d.as_str()) {
        if let Some(reason) = decode_error_string(data) {
            return Some(reason);
        }
    }
    REVERT_MESSAGE
        .captures(&response.message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|reason| !reason.is_empty())
}

fn decode_error_string(data: &str) -> Option<String> {
    let bytes = hex::decode(data.trim_start_matches("0x")).ok()?;
    if bytes.len() < 4 || bytes[..4] != ERROR_SELECTOR {
        return None;
    }
    match abi::decode(&[ParamType::String], &bytes[4..]).ok()?.pop()? {
        Token::String(reason) => Some(reason),
        _ => None,
    }
}

#[async_trait]
impl<P: JsonRpcClient + 'static> ChainRpc for EthersRpc<P> {
    async fn call(&self, tx: &TypedTransaction, block: Option<BlockId>) -> MesonResult<Bytes> {
        debug!("eth_call via {}", self.label);
        self.provider
            .call(tx, block)
            .await
            .map_err(classify_provider_error)
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> MesonResult<U256> {
        self.provider
            .estimate_gas(tx, None)
            .await
            .map_err(classify_provider_error)
    }

    async fn get_transaction_count(
        &self,
        address: Address,
        block: Option<BlockId>,
    ) -> MesonResult<U256> {
        self.provider
            .get_transaction_count(address, block)
            .await
            .map_err(classify_provider_error)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> MesonResult<H256> {
        debug!("eth_sendRawTransaction via {}", self.label);
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(classify_provider_error)?;
        Ok(pending.tx_hash())
    }

    async fn get_block_with_txs(&self, block: BlockId) -> MesonResult<Option<Block<Transaction>>> {
        self.provider
            .get_block_with_txs(block)
            .await
            .map_err(classify_provider_error)
    }

    async fn get_block_number(&self) -> MesonResult<u64> {
        self.provider
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(classify_provider_error)
    }

    async fn get_gas_price(&self) -> MesonResult<U256> {
        self.provider
            .get_gas_price()
            .await
            .map_err(classify_provider_error)
    }

    async fn get_transaction_receipt(
        &self,
        hash: H256,
    ) -> MesonResult<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(hash)
            .await
            .map_err(classify_provider_error)
    }

    async fn get_chain_id(&self) -> MesonResult<u64> {
        self.provider
            .get_chainid()
            .await
            .map(|id| id.as_u64())
            .map_err(classify_provider_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rpc_error(code: i64, message: &str, data: Option<serde_json::Value>) -> JsonRpcError {
        JsonRpcError {
            code,
            message: message.to_string(),
            data,
        }
    }

    #[test]
    fn test_revert_reason_from_error_data() {
        let mut data = ERROR_SELECTOR.to_vec();
        data.extend(abi::encode(&[Token::String("swap not found".to_string())]));
        let response = rpc_error(
            3,
            "execution reverted",
            Some(json!(format!("0x{}", hex::encode(data)))),
        );
        assert_eq!(revert_reason(&response).as_deref(), Some("swap not found"));
    }

    #[test]
    fn test_revert_reason_from_message() {
        let response = rpc_error(-32000, "execution reverted: Swap expired", None);
        assert_eq!(revert_reason(&response).as_deref(), Some("Swap expired"));

        let hardhat = rpc_error(
            -32603,
            "Error: VM Exception while processing transaction: reverted with reason string 'pool not registered'",
            None,
        );
        assert_eq!(
            revert_reason(&hardhat).as_deref(),
            Some("pool not registered")
        );

        let bare = rpc_error(3, "execution reverted", None);
        assert_eq!(revert_reason(&bare), None);
    }

    #[test]
    fn test_non_revert_errors_are_transport() {
        let response = rpc_error(-32005, "daily request limit exceeded", None);
        assert!(!is_revert(&response));
    }
}
