//! Meson relayer core
//!
//! Swap identifier encoding, dual-signature authorization and cross-chain
//! status reconciliation for Meson atomic swaps, on top of a resilient
//! multi-endpoint RPC layer.

pub mod chain;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod network;
pub mod signer;
pub mod status;
pub mod swap;

pub use chain::ResilientProvider;
pub use client::{ChainClient, ClientRegistry};
pub use error::{MesonError, MesonResult};
pub use network::{NetworkPreset, NetworkRegistry};
pub use signer::{SignerSlot, SwapSignature, SwapSigner};
pub use status::{SwapStatus, SwapStatusCoordinator};
pub use swap::{EncodedSwap, SwapRelease, SwapRequest, SwapVersion};
