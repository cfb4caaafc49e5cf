//! Chain module - resilient RPC access per network
//!
//! This module provides:
//! - A `ChainRpc` seam over ethers providers
//! - Call-exception reclassification and per-request timeouts
//! - Priority/weight fallback across a quorum of endpoints
//! - Priority fee recommendation

pub mod fallback;
pub mod fees;
pub mod provider;
pub mod reclassify;
pub mod rpc;
pub mod timeout;

pub use fallback::{FallbackEntry, FallbackRpc};
pub use fees::{FeeData, PriorityFeeOracle};
pub use provider::ResilientProvider;
pub use reclassify::ReclassifyRpc;
pub use rpc::{ChainRpc, EthersRpc};
pub use timeout::TimeoutRpc;
