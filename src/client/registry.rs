//! Per-network client cache

use super::{ChainClient, TransactionSender};
use crate::chain::ResilientProvider;
use crate::config::{ProviderConfig, QuorumConfig};
use crate::error::{MesonError, MesonResult};
use crate::network::NetworkPreset;

use dashmap::DashMap;
use ethers::signers::LocalWallet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Clients keyed by network id
///
/// `get_or_create` is atomic per network id: concurrent callers for the same
/// id await one construction and share the resulting instance. A failed
/// construction leaves the slot empty so the next caller retries. Disposing
/// an id while its client is still being built makes that construction fail
/// with `ClientDisposed` and releases the client it produced.
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<String, Arc<OnceCell<Arc<ChainClient>>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create<F, Fut>(
        &self,
        network_id: &str,
        create: F,
    ) -> MesonResult<Arc<ChainClient>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MesonResult<ChainClient>>,
    {
        // the map guard must be released before awaiting
        let cell = self
            .clients
            .entry(network_id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let client = cell
            .get_or_try_init(|| async {
                debug!("Creating client for {}", network_id);
                create().await.map(Arc::new)
            })
            .await?
            .clone();

        // a dispose that ran during construction detached this cell
        let still_cached = self
            .clients
            .get(network_id)
            .map(|entry| Arc::ptr_eq(entry.value(), &cell))
            .unwrap_or(false);
        if !still_cached {
            warn!("Client for {} disposed while it was being created", network_id);
            client.dispose().await;
            return Err(MesonError::ClientDisposed {
                network: network_id.to_string(),
            });
        }
        Ok(client)
    }

    /// Connect a client from a preset and its quorum unless one is cached
    pub async fn connect(
        &self,
        preset: &NetworkPreset,
        quorum: &QuorumConfig,
        settings: &ProviderConfig,
        wallet: Option<LocalWallet>,
    ) -> MesonResult<Arc<ChainClient>> {
        self.get_or_create(&preset.id, || async {
            let provider = ResilientProvider::connect(&preset.id, quorum, settings).await?;
            let mut client = ChainClient::new(preset.clone(), Arc::new(provider))?;
            if let Some(wallet) = wallet {
                client = client.with_sender(TransactionSender::new(wallet));
            }
            info!("Client for {} connected", preset.id);
            Ok(client)
        })
        .await
    }

    /// Cached client, if one was created
    pub fn get(&self, network_id: &str) -> Option<Arc<ChainClient>> {
        self.clients
            .get(network_id)
            .and_then(|cell| cell.get().cloned())
    }

    pub fn contains(&self, network_id: &str) -> bool {
        self.get(network_id).is_some()
    }

    /// Drop and dispose the client of one network; false if none was cached
    pub async fn dispose(&self, network_id: &str) -> bool {
        let Some((_, cell)) = self.clients.remove(network_id) else {
            return false;
        };
        match cell.get() {
            Some(client) => {
                client.dispose().await;
                true
            }
            None => false,
        }
    }

    pub async fn dispose_all(&self) {
        let ids: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.dispose(&id).await;
        }
    }
}
