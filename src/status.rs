//! Cross-chain swap status reconciliation
//!
//! The origin chain is always consulted. The destination chain is only asked
//! when the origin state leaves the lock state meaningful, and a failure there
//! degrades the answer to origin-only instead of failing the check.

use crate::client::{ChainClient, ClientRegistry, LockedSwap, PostedSwap};
use crate::error::{MesonError, MesonResult};
use crate::network::NetworkRegistry;
use crate::swap::EncodedSwap;

use ethers::types::Address;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reconciled view of one swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapStatus {
    pub posted: PostedSwap,
    /// Absent when not queried or when the destination chain failed
    pub locked: Option<LockedSwap>,
}

impl SwapStatus {
    pub fn into_tuple(self) -> (PostedSwap, Option<LockedSwap>) {
        (self.posted, self.locked)
    }
}

pub struct SwapStatusCoordinator {
    networks: Arc<NetworkRegistry>,
    clients: Arc<ClientRegistry>,
}

impl SwapStatusCoordinator {
    pub fn new(networks: Arc<NetworkRegistry>, clients: Arc<ClientRegistry>) -> Self {
        Self { networks, clients }
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    /// Cached client for a short coin type; never creates one
    fn client_for(&self, coin_type: u16) -> MesonResult<Arc<ChainClient>> {
        let network = self
            .networks
            .by_short_coin_type(coin_type)
            .ok_or_else(|| MesonError::UnsupportedNetwork(format!("0x{:04x}", coin_type)))?;
        self.clients
            .get(&network.id)
            .ok_or_else(|| MesonError::ClientNotInitialized {
                network: network.id.clone(),
            })
    }

    /// Status of a swap on both of its chains
    ///
    /// `initiator` is used for the destination lookup; without it the
    /// initiator recorded on the origin chain is used.
    pub async fn check_swap_status(
        &self,
        encoded: &EncodedSwap,
        initiator: Option<Address>,
    ) -> MesonResult<SwapStatus> {
        encoded.version()?;
        let origin = self.client_for(encoded.in_chain())?;
        let destination = self.client_for(encoded.out_chain())?;

        let posted = match origin.get_posted_swap(encoded, initiator, None).await {
            Ok(posted) => posted,
            Err(e) => {
                crate::metrics::record_status_check("error");
                return Err(e);
            }
        };
        debug!(
            "Swap {} on {}: {}",
            encoded,
            origin.network().id,
            posted.status
        );

        if !posted.status.needs_lock_check() {
            crate::metrics::record_status_check("posted_only");
            return Ok(SwapStatus {
                posted,
                locked: None,
            });
        }

        let lock_initiator = initiator.or(posted.initiator);
        let locked = match destination
            .get_locked_swap(encoded, lock_initiator, None)
            .await
        {
            Ok(locked) => {
                crate::metrics::record_status_check("complete");
                Some(locked)
            }
            Err(e) => {
                warn!(
                    "Lock state of {} on {} unavailable: {}",
                    encoded,
                    destination.network().id,
                    e
                );
                crate::metrics::record_status_check("partial");
                None
            }
        };

        Ok(SwapStatus { posted, locked })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::rpc::MockChainRpc;
    use crate::chain::ResilientProvider;
    use crate::client::tests::answering;
    use crate::client::{LockedSwapStatus, PostedSwapStatus};
    use crate::network::NetworkPreset;
    use ethers::abi::Token;
    use ethers::types::U256;

    const ORIGIN: u16 = 0x003c;
    const DESTINATION: u16 = 0x02ca;

    fn registry() -> Arc<NetworkRegistry> {
        Arc::new(NetworkRegistry::builtin(false).unwrap())
    }

    fn swap(in_chain: u16, out_chain: u16) -> EncodedSwap {
        let mut bytes = [0u8; 32];
        bytes[0] = 1;
        bytes[5] = 100;
        bytes[21..26].copy_from_slice(&[0xff; 5]);
        bytes[26..28].copy_from_slice(&out_chain.to_be_bytes());
        bytes[28] = 1;
        bytes[29..31].copy_from_slice(&in_chain.to_be_bytes());
        bytes[31] = 1;
        EncodedSwap::from_bytes(bytes)
    }

    async fn install(clients: &ClientRegistry, preset: &NetworkPreset, rpc: MockChainRpc) {
        clients
            .get_or_create(&preset.id, || async {
                let provider = ResilientProvider::from_rpc(preset.id.clone(), Arc::new(rpc));
                ChainClient::new(preset.clone(), Arc::new(provider))
            })
            .await
            .unwrap();
    }

    fn posted_reply(initiator: Address, pool_owner: Address, exist: bool) -> MockChainRpc {
        answering(vec![
            Token::Address(initiator),
            Token::Address(pool_owner),
            Token::Bool(exist),
        ])
    }

    async fn coordinator(origin: MockChainRpc, destination: MockChainRpc) -> SwapStatusCoordinator {
        let networks = registry();
        let clients = Arc::new(ClientRegistry::new());
        install(&clients, networks.get("eth").unwrap(), origin).await;
        install(&clients, networks.get("bnb").unwrap(), destination).await;
        SwapStatusCoordinator::new(networks, clients)
    }

    #[tokio::test]
    async fn test_bonded_swap_with_failing_destination_degrades() {
        let mut failing = MockChainRpc::new();
        failing
            .expect_call()
            .times(1)
            .returning(|_, _| {
                Err(MesonError::AllProvidersFailed {
                    attempts: 2,
                    last_error: Box::new(MesonError::Provider("connection refused".to_string())),
                })
            });

        let coordinator = coordinator(
            posted_reply(Address::repeat_byte(1), Address::repeat_byte(2), true),
            failing,
        )
        .await;

        let (posted, locked) = coordinator
            .check_swap_status(&swap(ORIGIN, DESTINATION), None)
            .await
            .unwrap()
            .into_tuple();
        assert_eq!(posted.status, PostedSwapStatus::Bonded);
        assert!(locked.is_none());
    }

    #[tokio::test]
    async fn test_bonded_swap_reports_lock() {
        let lp = Address::repeat_byte(2);
        let coordinator = coordinator(
            posted_reply(Address::repeat_byte(1), lp, true),
            answering(vec![Token::Address(lp), Token::Uint(U256::from(0xff_ffff_ffffu64))]),
        )
        .await;

        let status = coordinator
            .check_swap_status(&swap(ORIGIN, DESTINATION), None)
            .await
            .unwrap();
        let locked = status.locked.unwrap();
        assert_eq!(locked.status, LockedSwapStatus::Locked);
        assert_eq!(locked.initiator, Some(Address::repeat_byte(1)));
        assert_eq!(locked.provider, Some(lp));
    }

    #[tokio::test]
    async fn test_posted_swap_skips_destination() {
        let mut untouched = MockChainRpc::new();
        untouched.expect_call().never();

        let coordinator = coordinator(
            posted_reply(Address::repeat_byte(1), Address::zero(), true),
            untouched,
        )
        .await;

        let status = coordinator
            .check_swap_status(&swap(ORIGIN, DESTINATION), None)
            .await
            .unwrap();
        assert_eq!(status.posted.status, PostedSwapStatus::Posted);
        assert!(status.locked.is_none());
    }

    #[tokio::test]
    async fn test_caller_initiator_wins_for_lock_lookup() {
        let caller = Address::repeat_byte(7);
        let mut destination = MockChainRpc::new();
        destination
            .expect_call()
            .withf(move |tx, _| {
                tx.data()
                    .map(|d| d.windows(20).any(|w| w == caller.as_bytes()))
                    .unwrap_or(false)
            })
            .times(1)
            .returning(|_, _| {
                Ok(ethers::abi::encode(&[
                    Token::Address(Address::zero()),
                    Token::Uint(U256::zero()),
                ])
                .into())
            });

        let coordinator = coordinator(
            posted_reply(Address::zero(), Address::zero(), false),
            destination,
        )
        .await;

        let status = coordinator
            .check_swap_status(&swap(ORIGIN, DESTINATION), Some(caller))
            .await
            .unwrap();
        assert_eq!(status.posted.status, PostedSwapStatus::NoneOrAfterRunning);
        assert_eq!(status.locked.unwrap().status, LockedSwapStatus::None);
    }

    #[tokio::test]
    async fn test_origin_failure_propagates() {
        let mut origin = MockChainRpc::new();
        origin.expect_call().returning(|_, _| {
            Err(MesonError::Timeout {
                operation: "eth_call".to_string(),
                tx_hash: None,
            })
        });

        let coordinator = coordinator(origin, MockChainRpc::new()).await;
        let err = coordinator
            .check_swap_status(&swap(ORIGIN, DESTINATION), None)
            .await
            .unwrap_err();
        assert!(matches!(err, MesonError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_client_and_network() {
        let networks = registry();
        let clients = Arc::new(ClientRegistry::new());
        install(&clients, networks.get("eth").unwrap(), MockChainRpc::new()).await;
        let coordinator = SwapStatusCoordinator::new(networks, clients);

        let err = coordinator
            .check_swap_status(&swap(ORIGIN, DESTINATION), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MesonError::ClientNotInitialized {
                network: "bnb".to_string()
            }
        );

        let err = coordinator
            .check_swap_status(&swap(ORIGIN, 0x7777), None)
            .await
            .unwrap_err();
        assert!(matches!(err, MesonError::UnsupportedNetwork(_)));
    }
}
