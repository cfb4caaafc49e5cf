//! Client module - typed access to the Meson contract on one network
//!
//! This module provides:
//! - Swap state reads on origin and destination chains
//! - Pool deposits and token registration
//! - A per-network client cache with explicit disposal

pub mod contract;
pub mod registry;
pub mod sender;

pub use contract::{LockedSwap, LockedSwapStatus, PostedSwap, PostedSwapStatus};
pub use registry::ClientRegistry;
pub use sender::TransactionSender;

use crate::chain::ResilientProvider;
use crate::error::{MesonError, MesonResult};
use crate::network::NetworkPreset;
use crate::swap::EncodedSwap;
use contract::non_zero;

use ethers::abi::{Function, Token};
use ethers::contract::BaseContract;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockId, Bytes, TransactionReceipt, TransactionRequest, H256, U256};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Meson contract bound to a network and its provider
pub struct ChainClient {
    network: NetworkPreset,
    address: Address,
    contract: BaseContract,
    /// Cleared on dispose
    provider: RwLock<Option<Arc<ResilientProvider>>>,
    sender: Option<TransactionSender>,
}

impl ChainClient {
    pub fn new(network: NetworkPreset, provider: Arc<ResilientProvider>) -> MesonResult<Self> {
        Ok(Self {
            address: network.meson_address,
            network,
            contract: contract::meson_contract()?,
            provider: RwLock::new(Some(provider)),
            sender: None,
        })
    }

    /// Target a contract other than the preset deployment
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    /// Enable contract writes
    pub fn with_sender(mut self, sender: TransactionSender) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn network(&self) -> &NetworkPreset {
        &self.network
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn is_disposed(&self) -> bool {
        self.provider.read().await.is_none()
    }

    async fn provider(&self) -> MesonResult<Arc<ResilientProvider>> {
        self.provider
            .read()
            .await
            .clone()
            .ok_or_else(|| MesonError::ClientDisposed {
                network: self.network.id.clone(),
            })
    }

    fn function(&self, name: &str) -> MesonResult<&Function> {
        Ok(self.contract.abi().function(name)?)
    }

    async fn read(
        &self,
        name: &str,
        args: &[Token],
        block: Option<BlockId>,
    ) -> MesonResult<Vec<Token>> {
        let provider = self.provider().await?;
        let function = self.function(name)?;
        let data = function.encode_input(args)?;

        let tx: TypedTransaction = TransactionRequest::new()
            .to(self.address)
            .data(data)
            .into();
        debug!("{} on {}", name, self.network.id);
        let output = provider.rpc().call(&tx, block).await?;

        Ok(function.decode_output(&output)?)
    }

    async fn write(&self, name: &'static str, args: &[Token]) -> MesonResult<H256> {
        let provider = self.provider().await?;
        let sender = self
            .sender
            .as_ref()
            .ok_or(MesonError::NotImplemented { method: name })?;
        let data = self.function(name)?.encode_input(args)?;

        let tx_hash = sender
            .send(&provider, self.address, Bytes::from(data))
            .await?;
        info!("{} submitted on {}: {:?}", name, self.network.id, tx_hash);
        Ok(tx_hash)
    }

    /// Origin-chain state of a swap
    pub async fn get_posted_swap(
        &self,
        encoded: &EncodedSwap,
        initiator: Option<Address>,
        block: Option<BlockId>,
    ) -> MesonResult<PostedSwap> {
        let output = self
            .read("getPostedSwap", &[Token::Uint(encoded.to_u256())], block)
            .await?;
        let (on_chain_initiator, pool_owner, exist) = match output.as_slice() {
            [Token::Address(initiator), Token::Address(pool_owner), Token::Bool(exist)] => {
                (*initiator, *pool_owner, *exist)
            }
            _ => return Err(unexpected("getPostedSwap")),
        };

        let status = PostedSwapStatus::derive(
            exist,
            on_chain_initiator,
            pool_owner,
            encoded.expire_ts(),
            now(),
        );
        Ok(PostedSwap {
            status,
            initiator: non_zero(on_chain_initiator).or(initiator),
            provider: non_zero(pool_owner),
        })
    }

    /// Destination-chain state of a swap; locks are keyed by initiator
    pub async fn get_locked_swap(
        &self,
        encoded: &EncodedSwap,
        initiator: Option<Address>,
        block: Option<BlockId>,
    ) -> MesonResult<LockedSwap> {
        let initiator = initiator.ok_or_else(|| {
            MesonError::InvalidParameter("initiator is required to look up a locked swap".into())
        })?;
        let output = self
            .read(
                "getLockedSwap",
                &[Token::Uint(encoded.to_u256()), Token::Address(initiator)],
                block,
            )
            .await?;
        let (pool_owner, until) = match output.as_slice() {
            [Token::Address(pool_owner), Token::Uint(until)] => (*pool_owner, until.low_u64()),
            _ => return Err(unexpected("getLockedSwap")),
        };

        Ok(LockedSwap {
            status: LockedSwapStatus::derive(pool_owner, until, now()),
            initiator: Some(initiator),
            provider: non_zero(pool_owner),
            until: (until != 0).then_some(until),
        })
    }

    /// Pool index registered for an address, 0 if none
    pub async fn index_of_address(&self, address: Address) -> MesonResult<u64> {
        match self
            .read("indexOfAddress", &[Token::Address(address)], None)
            .await?
            .as_slice()
        {
            [Token::Uint(index)] => Ok(index.low_u64()),
            _ => Err(unexpected("indexOfAddress")),
        }
    }

    /// Owner of a pool index, `None` when unregistered
    pub async fn address_of_index(&self, index: u64) -> MesonResult<Option<Address>> {
        match self
            .read("addressOfIndex", &[Token::Uint(U256::from(index))], None)
            .await?
            .as_slice()
        {
            [Token::Address(address)] => Ok(non_zero(*address)),
            _ => Err(unexpected("addressOfIndex")),
        }
    }

    pub async fn get_short_coin_type(&self) -> MesonResult<u16> {
        match self.read("getShortCoinType", &[], None).await?.as_slice() {
            [Token::FixedBytes(bytes)] if bytes.len() == 2 => {
                Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
            }
            _ => Err(unexpected("getShortCoinType")),
        }
    }

    pub async fn deposit(&self, amount: U256, token_index: u8) -> MesonResult<H256> {
        self.write(
            "deposit",
            &[Token::Uint(amount), Token::Uint(U256::from(token_index))],
        )
        .await
    }

    pub async fn deposit_and_register(
        &self,
        amount: U256,
        token_index: u8,
        pool_index: u64,
    ) -> MesonResult<H256> {
        if pool_index == 0 {
            return Err(MesonError::InvalidParameter(
                "pool index 0 is reserved".to_string(),
            ));
        }
        self.write(
            "depositAndRegister",
            &[
                Token::Uint(amount),
                Token::Uint(U256::from(token_index)),
                Token::Uint(U256::from(pool_index)),
            ],
        )
        .await
    }

    pub async fn add_multiple_supported_tokens(
        &self,
        tokens: &[Address],
        indexes: &[u8],
    ) -> MesonResult<H256> {
        if tokens.len() != indexes.len() {
            return Err(MesonError::InvalidParameter(format!(
                "{} tokens but {} indexes",
                tokens.len(),
                indexes.len()
            )));
        }
        self.write(
            "addMultipleSupportedTokens",
            &[
                Token::Array(tokens.iter().copied().map(Token::Address).collect()),
                Token::Array(
                    indexes
                        .iter()
                        .map(|i| Token::Uint(U256::from(*i)))
                        .collect(),
                ),
            ],
        )
        .await
    }

    pub async fn transaction_receipt(&self, hash: H256) -> MesonResult<Option<TransactionReceipt>> {
        self.provider()
            .await?
            .rpc()
            .get_transaction_receipt(hash)
            .await
    }

    /// Check the provider; a disposed client reports unhealthy
    pub async fn health_check(&self) -> bool {
        match self.provider().await {
            Ok(provider) => provider.health_check().await,
            Err(_) => {
                crate::metrics::record_client_health(&self.network.id, false);
                false
            }
        }
    }

    /// Release the provider; every later call fails with `ClientDisposed`
    pub async fn dispose(&self) {
        if self.provider.write().await.take().is_some() {
            info!("Client for {} disposed", self.network.id);
        }
    }
}

fn unexpected(function: &str) -> MesonError {
    MesonError::Abi(format!("unexpected output shape from {}", function))
}

fn now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chain::rpc::MockChainRpc;
    use crate::network::NetworkRegistry;
    use ethers::abi;
    use ethers::signers::LocalWallet;
    use ethers::types::Block;

    pub(crate) const FIXTURE: &str =
        "0x000000000000000000000064000003c1000000000a00620a4c3e000101000101";

    pub(crate) fn preset() -> NetworkPreset {
        NetworkRegistry::builtin(false)
            .unwrap()
            .get("eth")
            .unwrap()
            .clone()
    }

    pub(crate) fn client_with(rpc: MockChainRpc) -> ChainClient {
        let provider = ResilientProvider::from_rpc("eth", Arc::new(rpc));
        ChainClient::new(preset(), Arc::new(provider)).unwrap()
    }

    /// Mock answering every eth_call with the given ABI-encoded tokens
    pub(crate) fn answering(tokens: Vec<Token>) -> MockChainRpc {
        let mut rpc = MockChainRpc::new();
        let output = Bytes::from(abi::encode(&tokens));
        rpc.expect_call()
            .returning(move |_, _| Ok(output.clone()));
        rpc
    }

    fn far_future_swap() -> EncodedSwap {
        // fixture with expire_ts pushed to 2^40 - 1
        let mut bytes = *FIXTURE.parse::<EncodedSwap>().unwrap().as_bytes();
        bytes[21..26].copy_from_slice(&[0xff; 5]);
        EncodedSwap::from_bytes(bytes)
    }

    #[tokio::test]
    async fn test_posted_swap_bonded() {
        let initiator = Address::repeat_byte(1);
        let lp = Address::repeat_byte(2);
        let client = client_with(answering(vec![
            Token::Address(initiator),
            Token::Address(lp),
            Token::Bool(true),
        ]));

        let posted = client
            .get_posted_swap(&far_future_swap(), None, None)
            .await
            .unwrap();
        assert_eq!(posted.status, PostedSwapStatus::Bonded);
        assert_eq!(posted.initiator, Some(initiator));
        assert_eq!(posted.provider, Some(lp));
    }

    #[tokio::test]
    async fn test_posted_swap_expired_fixture() {
        let client = client_with(answering(vec![
            Token::Address(Address::repeat_byte(1)),
            Token::Address(Address::zero()),
            Token::Bool(true),
        ]));

        let encoded: EncodedSwap = FIXTURE.parse().unwrap();
        let posted = client.get_posted_swap(&encoded, None, None).await.unwrap();
        assert_eq!(posted.status, PostedSwapStatus::ErrorExpired);
        assert_eq!(posted.provider, None);
    }

    #[tokio::test]
    async fn test_posted_swap_absent_keeps_caller_initiator() {
        let client = client_with(answering(vec![
            Token::Address(Address::zero()),
            Token::Address(Address::zero()),
            Token::Bool(false),
        ]));
        let initiator = Address::repeat_byte(9);

        let posted = client
            .get_posted_swap(&far_future_swap(), Some(initiator), None)
            .await
            .unwrap();
        assert_eq!(posted.status, PostedSwapStatus::NoneOrAfterRunning);
        assert_eq!(posted.initiator, Some(initiator));
    }

    #[tokio::test]
    async fn test_locked_swap_states() {
        let lp = Address::repeat_byte(2);
        let initiator = Address::repeat_byte(1);
        let until = now() + 3_600;

        let client = client_with(answering(vec![
            Token::Address(lp),
            Token::Uint(U256::from(until)),
        ]));
        let locked = client
            .get_locked_swap(&far_future_swap(), Some(initiator), None)
            .await
            .unwrap();
        assert_eq!(locked.status, LockedSwapStatus::Locked);
        assert_eq!(locked.until, Some(until));
        assert_eq!(locked.provider, Some(lp));

        let client = client_with(answering(vec![
            Token::Address(lp),
            Token::Uint(U256::zero()),
        ]));
        let locked = client
            .get_locked_swap(&far_future_swap(), Some(initiator), None)
            .await
            .unwrap();
        assert_eq!(locked.status, LockedSwapStatus::Released);
        assert_eq!(locked.until, None);

        let err = client
            .get_locked_swap(&far_future_swap(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MesonError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_revert_reason_surfaces() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_call().returning(|_, _| {
            Err(MesonError::Revert {
                reason: "Swap does not exist".to_string(),
            })
        });
        let client = client_with(rpc);

        let err = client
            .get_posted_swap(&far_future_swap(), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.revert_reason(), Some("Swap does not exist"));
    }

    #[tokio::test]
    async fn test_pool_index_lookups() {
        let client = client_with(answering(vec![Token::Address(Address::zero())]));
        assert_eq!(client.address_of_index(5).await.unwrap(), None);

        let owner = Address::repeat_byte(4);
        let client = client_with(answering(vec![Token::Address(owner)]));
        assert_eq!(client.address_of_index(5).await.unwrap(), Some(owner));

        let client = client_with(answering(vec![Token::Uint(U256::from(5))]));
        assert_eq!(client.index_of_address(owner).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_short_coin_type() {
        let client = client_with(answering(vec![Token::FixedBytes(vec![0x00, 0x3c])]));
        assert_eq!(client.get_short_coin_type().await.unwrap(), 0x003c);
    }

    #[tokio::test]
    async fn test_writes_require_sender() {
        let client = client_with(MockChainRpc::new());
        let err = client.deposit(U256::from(1_000), 1).await.unwrap_err();
        assert_eq!(err, MesonError::NotImplemented { method: "deposit" });

        let err = client
            .add_multiple_supported_tokens(&[Address::zero()], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, MesonError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_deposit_sends_encoded_call() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_get_chain_id().returning(|| Ok(1));
        rpc.expect_get_transaction_count()
            .returning(|_, _| Ok(U256::zero()));
        rpc.expect_get_gas_price().returning(|| Ok(U256::from(10)));
        rpc.expect_get_block_with_txs()
            .returning(|_| Ok(Some(Block::default())));
        rpc.expect_estimate_gas().returning(|tx| {
            let data = tx.data().cloned().unwrap_or_default();
            // deposit(uint256,uint8) selector
            assert_eq!(&data[..4], &ethers::utils::id("deposit(uint256,uint8)")[..]);
            Ok(U256::from(60_000))
        });
        rpc.expect_send_raw_transaction()
            .times(1)
            .returning(|_| Ok(H256::repeat_byte(0x42)));

        let wallet: LocalWallet = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
            .parse()
            .unwrap();
        let client = client_with(rpc).with_sender(TransactionSender::new(wallet));
        assert_eq!(
            client.deposit(U256::from(1_000_000), 1).await.unwrap(),
            H256::repeat_byte(0x42)
        );
    }

    #[tokio::test]
    async fn test_dispose_rejects_later_calls() {
        let client = client_with(answering(vec![Token::Uint(U256::from(1))]));
        assert!(!client.is_disposed().await);

        client.dispose().await;
        assert!(client.is_disposed().await);
        let err = client
            .index_of_address(Address::zero())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MesonError::ClientDisposed {
                network: "eth".to_string()
            }
        );
        client.dispose().await;
    }

    #[tokio::test]
    async fn test_health_check_follows_provider_and_disposal() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_get_block_number().times(1).returning(|| Ok(18_000_000));
        let client = client_with(rpc);

        assert!(client.health_check().await);
        client.dispose().await;
        assert!(!client.health_check().await);
    }
}
