//! Resilient provider assembled from a quorum definition

use super::fallback::{FallbackEntry, FallbackRpc};
use super::fees::{FeeData, PriorityFeeOracle};
use super::reclassify::ReclassifyRpc;
use super::rpc::{ChainRpc, EthersRpc};
use super::timeout::TimeoutRpc;
use crate::config::{ProviderConfig, QuorumConfig, Transport};
use crate::error::{MesonError, MesonResult};

use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// RPC stack for one network: reclassification per endpoint, priority
/// fallback across endpoints, and a wall-clock bound on every request
pub struct ResilientProvider {
    network: String,
    rpc: Arc<dyn ChainRpc>,
    fees: PriorityFeeOracle,
}

impl ResilientProvider {
    /// Wrap an already assembled stack
    pub fn from_rpc(network: impl Into<String>, rpc: Arc<dyn ChainRpc>) -> Self {
        let network = network.into();
        let fees = PriorityFeeOracle::new(rpc.clone(), network.clone());
        Self { network, rpc, fees }
    }

    /// Create a provider for every endpoint of the quorum
    pub async fn connect(
        network: &str,
        quorum: &QuorumConfig,
        settings: &ProviderConfig,
    ) -> MesonResult<Self> {
        quorum.validate()?;

        let mut entries = Vec::with_capacity(quorum.list.len());
        for endpoint in &quorum.list {
            let rpc: Arc<dyn ChainRpc> = match endpoint.transport()? {
                Transport::Http(url) => {
                    let base = EthersRpc::http(url)?;
                    debug!("Added HTTP endpoint for {}: {}", network, url);
                    Arc::new(ReclassifyRpc::new(base, &settings.business_reverts))
                }
                Transport::Ws(url) => match EthersRpc::ws(url).await {
                    Ok(base) => {
                        info!("WebSocket connected for {}: {}", network, url);
                        Arc::new(ReclassifyRpc::new(base, &settings.business_reverts))
                    }
                    Err(e) => {
                        warn!("WebSocket connection failed for {}: {}", network, e);
                        continue;
                    }
                },
            };

            entries.push(FallbackEntry {
                rpc,
                label: endpoint.display_url().to_string(),
                priority: endpoint.priority,
                weight: endpoint.weight,
                stall_timeout: endpoint.stall_timeout(),
            });
        }

        if entries.is_empty() {
            return Err(MesonError::Provider(format!(
                "no reachable endpoint for {}",
                network
            )));
        }

        let available_weight: u32 = entries.iter().map(|e| e.weight).sum();
        let threshold = if quorum.threshold > available_weight {
            warn!(
                "Quorum threshold for {} lowered to {} after unreachable endpoints",
                network, available_weight
            );
            available_weight
        } else {
            quorum.threshold
        };

        let rpc = assemble(entries, threshold, settings)?;
        Ok(Self::from_rpc(network, Arc::new(rpc)))
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn rpc(&self) -> &Arc<dyn ChainRpc> {
        &self.rpc
    }

    pub fn fees(&self) -> &PriorityFeeOracle {
        &self.fees
    }

    pub async fn fee_data(&self) -> MesonResult<FeeData> {
        self.fees.fee_data().await
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        let healthy = match self.rpc.get_block_number().await {
            Ok(block) => {
                debug!("{} at block {}", self.network, block);
                true
            }
            Err(e) => {
                error!("Health check failed for {}: {}", self.network, e);
                false
            }
        };
        crate::metrics::record_client_health(&self.network, healthy);
        healthy
    }
}

/// Fallback group whose attempts are each bounded by the call timeout, with
/// broadcasts bounded as a whole by the send timeout
fn assemble(
    mut entries: Vec<FallbackEntry>,
    threshold: u32,
    settings: &ProviderConfig,
) -> MesonResult<TimeoutRpc<FallbackRpc>> {
    let call_timeout = settings.call_timeout();
    for entry in &mut entries {
        entry.stall_timeout = entry.stall_timeout.min(call_timeout);
    }
    let fallback = FallbackRpc::new(entries, threshold)?;
    Ok(TimeoutRpc::sends_only(fallback, settings.send_timeout()))
}
