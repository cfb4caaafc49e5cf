//! Swap authorization signers
//!
//! An initiator authorizes a swap twice: once to post the request on the
//! origin chain and once, independently, to release funds on the destination
//! chain. Both signatures are produced by a [`SwapSigner`] strategy:
//! - [`LocalSwapSigner`] signs with a private key held in memory
//! - [`RemoteSwapSigner`] delegates to an external JSON-RPC signer
//!
//! [`SignerSlot`] holds the strategy chosen at construction, or none at all.

mod local;
mod remote;

pub use local::LocalSwapSigner;
pub use remote::RemoteSwapSigner;

use crate::config::SignerConfig;
use crate::error::{MesonError, MesonResult};
use crate::swap::{release_hash, request_hash, EncodedSwap};

use async_trait::async_trait;
use ethers::providers::{Http, Provider};
use ethers::types::{Address, Signature, H256, U256};
use std::sync::Arc;
use tracing::info;

/// Signature split into its `(r, s, v)` components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapSignature {
    pub r: H256,
    pub s: H256,
    pub v: u8,
}

impl SwapSignature {
    pub const LEN: usize = 65;

    /// Split a 65-byte `r ‖ s ‖ v` blob
    pub fn from_bytes(bytes: &[u8]) -> MesonResult<Self> {
        if bytes.len() != Self::LEN {
            return Err(MesonError::InvalidParameter(format!(
                "signature must be {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }
        Ok(Self {
            r: H256::from_slice(&bytes[0..32]),
            s: H256::from_slice(&bytes[32..64]),
            v: bytes[64],
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0..32].copy_from_slice(self.r.as_bytes());
        out[32..64].copy_from_slice(self.s.as_bytes());
        out[64] = self.v;
        out
    }

    /// Address that produced this signature over `hash`
    pub fn recover(&self, hash: H256) -> MesonResult<Address> {
        let signature = Signature {
            r: U256::from_big_endian(self.r.as_bytes()),
            s: U256::from_big_endian(self.s.as_bytes()),
            v: u64::from(self.v),
        };
        signature
            .recover(hash)
            .map_err(|e| MesonError::InvalidParameter(format!("unrecoverable signature: {}", e)))
    }
}

impl From<Signature> for SwapSignature {
    fn from(signature: Signature) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        signature.r.to_big_endian(&mut r);
        signature.s.to_big_endian(&mut s);
        Self {
            r: H256(r),
            s: H256(s),
            v: signature.v as u8,
        }
    }
}

/// Capability shared by every signing strategy
#[async_trait]
pub trait SwapSigner: Send + Sync {
    /// Address of the initiator this signer signs for
    async fn address(&self) -> MesonResult<Address>;

    /// Sign the request hash of `encoded`
    async fn sign_swap_request(
        &self,
        encoded: &EncodedSwap,
        testnet: bool,
    ) -> MesonResult<SwapSignature>;

    /// Sign the release hash of `encoded` towards `recipient`
    async fn sign_swap_release(
        &self,
        encoded: &EncodedSwap,
        recipient: &[u8],
        testnet: bool,
    ) -> MesonResult<SwapSignature>;
}

/// Which strategy a [`SignerSlot`] was built with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerKind {
    LocalKey,
    Remote,
}

/// Optional signing strategy, fixed at construction
#[derive(Clone, Default)]
pub struct SignerSlot {
    strategy: Option<(SignerKind, Arc<dyn SwapSigner>)>,
}

impl SignerSlot {
    pub fn empty() -> Self {
        Self { strategy: None }
    }

    pub fn local(signer: LocalSwapSigner) -> Self {
        Self {
            strategy: Some((SignerKind::LocalKey, Arc::new(signer))),
        }
    }

    pub fn remote<P>(signer: RemoteSwapSigner<P>) -> Self
    where
        P: ethers::providers::JsonRpcClient + 'static,
    {
        Self {
            strategy: Some((SignerKind::Remote, Arc::new(signer))),
        }
    }

    /// Build the strategy described in the signer configuration
    pub fn from_config(config: &SignerConfig) -> MesonResult<Self> {
        if let Some(ref var) = config.private_key_env {
            let key = std::env::var(var).map_err(|_| {
                MesonError::Config(format!("environment variable {} is not set", var))
            })?;
            let signer = LocalSwapSigner::from_private_key(&key)?;
            info!("Using local-key swap signer {:?}", signer.wallet_address());
            return Ok(Self::local(signer));
        }

        if let Some(ref url) = config.remote_url {
            let provider = Provider::<Http>::try_from(url.as_str())
                .map_err(|e| MesonError::Config(format!("invalid remote signer url: {}", e)))?;
            let mut signer = RemoteSwapSigner::new(provider);
            if let Some(ref account) = config.remote_account {
                let account = account
                    .parse::<Address>()
                    .map_err(|e| MesonError::Config(format!("invalid remote account: {}", e)))?;
                signer = signer.with_account(account);
            }
            info!("Using remote swap signer at {}", url);
            return Ok(Self::remote(signer));
        }

        Ok(Self::empty())
    }

    pub fn kind(&self) -> Option<SignerKind> {
        self.strategy.as_ref().map(|(kind, _)| *kind)
    }

    pub fn is_configured(&self) -> bool {
        self.strategy.is_some()
    }

    fn strategy(&self, method: &'static str) -> MesonResult<&Arc<dyn SwapSigner>> {
        self.strategy
            .as_ref()
            .map(|(_, signer)| signer)
            .ok_or(MesonError::NotImplemented { method })
    }
}

#[async_trait]
impl SwapSigner for SignerSlot {
    async fn address(&self) -> MesonResult<Address> {
        self.strategy("address")?.address().await
    }

    async fn sign_swap_request(
        &self,
        encoded: &EncodedSwap,
        testnet: bool,
    ) -> MesonResult<SwapSignature> {
        self.strategy("sign_swap_request")?
            .sign_swap_request(encoded, testnet)
            .await
    }

    async fn sign_swap_release(
        &self,
        encoded: &EncodedSwap,
        recipient: &[u8],
        testnet: bool,
    ) -> MesonResult<SwapSignature> {
        self.strategy("sign_swap_release")?
            .sign_swap_release(encoded, recipient, testnet)
            .await
    }
}

/// Address that signed the request hash of `encoded`
pub fn recover_request_signer(
    encoded: &EncodedSwap,
    testnet: bool,
    signature: &SwapSignature,
) -> MesonResult<Address> {
    signature.recover(request_hash(encoded, testnet)?)
}

/// Address that signed the release hash of `encoded` towards `recipient`
pub fn recover_release_signer(
    encoded: &EncodedSwap,
    recipient: &[u8],
    testnet: bool,
    signature: &SwapSignature,
) -> MesonResult<Address> {
    signature.recover(release_hash(encoded, recipient, testnet)?)
}
