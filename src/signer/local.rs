//! Private-key signer, no network access

use super::{SwapSignature, SwapSigner};
use crate::error::{MesonError, MesonResult};
use crate::swap::{release_hash, request_hash, EncodedSwap};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256};

/// Signs swap hashes with an in-memory key
#[derive(Debug, Clone)]
pub struct LocalSwapSigner {
    wallet: LocalWallet,
}

impl LocalSwapSigner {
    pub fn new(wallet: LocalWallet) -> Self {
        Self { wallet }
    }

    /// Parse a hex private key, with or without `0x`
    pub fn from_private_key(key: &str) -> MesonResult<Self> {
        let key = key.trim();
        let wallet = key
            .strip_prefix("0x")
            .unwrap_or(key)
            .parse::<LocalWallet>()
            .map_err(|e| MesonError::Wallet(format!("invalid private key: {}", e)))?;
        Ok(Self::new(wallet))
    }

    pub fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }

    /// Address derived from the key
    pub fn wallet_address(&self) -> Address {
        self.wallet.address()
    }

    pub fn sign_hash(&self, hash: H256) -> MesonResult<SwapSignature> {
        Ok(self.wallet.sign_hash(hash)?.into())
    }

    pub fn sign_request(&self, encoded: &EncodedSwap, testnet: bool) -> MesonResult<SwapSignature> {
        self.sign_hash(request_hash(encoded, testnet)?)
    }

    pub fn sign_release(
        &self,
        encoded: &EncodedSwap,
        recipient: &[u8],
        testnet: bool,
    ) -> MesonResult<SwapSignature> {
        self.sign_hash(release_hash(encoded, recipient, testnet)?)
    }
}

#[async_trait]
impl SwapSigner for LocalSwapSigner {
    async fn address(&self) -> MesonResult<Address> {
        Ok(self.wallet_address())
    }

    async fn sign_swap_request(
        &self,
        encoded: &EncodedSwap,
        testnet: bool,
    ) -> MesonResult<SwapSignature> {
        self.sign_request(encoded, testnet)
    }

    async fn sign_swap_release(
        &self,
        encoded: &EncodedSwap,
        recipient: &[u8],
        testnet: bool,
    ) -> MesonResult<SwapSignature> {
        self.sign_release(encoded, recipient, testnet)
    }
}
