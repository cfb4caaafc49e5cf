//! Signer backed by an external JSON-RPC endpoint (hardware wallet bridge,
//! custody service)

use super::{SwapSignature, SwapSigner};
use crate::error::{MesonError, MesonResult};
use crate::swap::{EncodedSwap, NetworkClass, SwapReleasePayload, SwapRequestPayload};

use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, Provider, ProviderError, RpcError};
use ethers::types::{Address, Bytes};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

/// EIP-1193 code for a request the user declined
const USER_REJECTED_CODE: i64 = 4001;

/// Delegates signing to `eth_signTypedData_v4` on a remote endpoint
pub struct RemoteSwapSigner<P> {
    provider: Provider<P>,
    account: OnceCell<Address>,
}

impl<P: JsonRpcClient> RemoteSwapSigner<P> {
    pub fn new(provider: Provider<P>) -> Self {
        Self {
            provider,
            account: OnceCell::new(),
        }
    }

    /// Pin the signing account instead of asking the endpoint for it
    pub fn with_account(self, account: Address) -> Self {
        Self {
            provider: self.provider,
            account: OnceCell::new_with(Some(account)),
        }
    }

    async fn account(&self) -> MesonResult<Address> {
        self.account
            .get_or_try_init(|| async {
                let accounts: Vec<Address> = self
                    .provider
                    .request("eth_accounts", ())
                    .await
                    .map_err(classify)?;
                accounts.first().copied().ok_or_else(|| {
                    MesonError::SignerUnavailable("remote signer exposes no accounts".to_string())
                })
            })
            .await
            .copied()
    }

    async fn sign_typed_data(&self, typed_data: Value) -> MesonResult<SwapSignature> {
        let account = self.account().await?;
        debug!("Requesting remote signature from {:?}", account);

        let raw: Bytes = self
            .provider
            .request("eth_signTypedData_v4", (account, typed_data.to_string()))
            .await
            .map_err(classify)?;

        SwapSignature::from_bytes(&raw).map_err(|_| {
            MesonError::SignerUnavailable(format!(
                "remote signer returned {} bytes instead of a signature",
                raw.len()
            ))
        })
    }
}

fn classify(err: ProviderError) -> MesonError {
    match err.as_error_response() {
        Some(response) if response.code == USER_REJECTED_CODE => MesonError::UserRejected,
        Some(response) => MesonError::SignerUnavailable(response.message.clone()),
        None => MesonError::SignerUnavailable(err.to_string()),
    }
}

#[async_trait]
impl<P: JsonRpcClient + 'static> SwapSigner for RemoteSwapSigner<P> {
    async fn address(&self) -> MesonResult<Address> {
        self.account().await
    }

    async fn sign_swap_request(
        &self,
        encoded: &EncodedSwap,
        testnet: bool,
    ) -> MesonResult<SwapSignature> {
        let payload = SwapRequestPayload::new(encoded, NetworkClass::from_testnet(testnet))?;
        self.sign_typed_data(payload.typed_data()).await
    }

    async fn sign_swap_release(
        &self,
        encoded: &EncodedSwap,
        recipient: &[u8],
        testnet: bool,
    ) -> MesonResult<SwapSignature> {
        let payload =
            SwapReleasePayload::new(encoded, recipient, NetworkClass::from_testnet(testnet))?;
        self.sign_typed_data(payload.typed_data()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{recover_request_signer, LocalSwapSigner};
    use ethers::providers::{JsonRpcError, MockResponse};

    const FIXTURE: &str = "0x000000000000000000000064000003c1000000000a00620a4c3e000101000101";

    #[tokio::test]
    async fn test_address_needs_a_round_trip() {
        let (provider, mock) = Provider::mocked();
        let account = Address::repeat_byte(0x0a);
        mock.push::<Vec<Address>, _>(vec![account]).unwrap();

        let signer = RemoteSwapSigner::new(provider);
        assert_eq!(signer.address().await.unwrap(), account);
        // cached after the first request
        assert_eq!(signer.address().await.unwrap(), account);
        mock.assert_request("eth_accounts", ()).unwrap();
    }

    #[tokio::test]
    async fn test_remote_signature_is_split_and_recoverable() {
        let local = LocalSwapSigner::from_private_key(
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        )
        .unwrap();
        let encoded: EncodedSwap = FIXTURE.parse().unwrap();
        let expected = local.sign_request(&encoded, false).unwrap();

        let (provider, mock) = Provider::mocked();
        mock.push::<Bytes, _>(Bytes::from(expected.to_bytes().to_vec()))
            .unwrap();

        let remote = RemoteSwapSigner::new(provider).with_account(local.wallet_address());
        let sig = remote.sign_swap_request(&encoded, false).await.unwrap();

        assert_eq!(sig, expected);
        assert_eq!(
            recover_request_signer(&encoded, false, &sig).unwrap(),
            local.wallet_address()
        );
    }

    #[tokio::test]
    async fn test_user_rejection_is_reported() {
        let (provider, mock) = Provider::mocked();
        mock.push_response(MockResponse::Error(JsonRpcError {
            code: 4001,
            message: "User rejected the request.".to_string(),
            data: None,
        }));

        let remote = RemoteSwapSigner::new(provider).with_account(Address::repeat_byte(1));
        let encoded: EncodedSwap = FIXTURE.parse().unwrap();
        assert_eq!(
            remote.sign_swap_request(&encoded, true).await.unwrap_err(),
            MesonError::UserRejected
        );
    }

    #[tokio::test]
    async fn test_unreachable_signer_is_unavailable() {
        // no queued responses: the mock transport fails the request
        let (provider, _mock) = Provider::mocked();
        let remote = RemoteSwapSigner::new(provider).with_account(Address::repeat_byte(1));
        let encoded: EncodedSwap = FIXTURE.parse().unwrap();

        assert!(matches!(
            remote.sign_swap_release(&encoded, &[7; 20], true).await,
            Err(MesonError::SignerUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_reply_is_unavailable() {
        let (provider, mock) = Provider::mocked();
        mock.push::<Bytes, _>(Bytes::from(vec![0u8; 12])).unwrap();

        let remote = RemoteSwapSigner::new(provider).with_account(Address::repeat_byte(1));
        let encoded: EncodedSwap = FIXTURE.parse().unwrap();
        assert!(matches!(
            remote.sign_swap_request(&encoded, true).await,
            Err(MesonError::SignerUnavailable(_))
        ));
    }
}
