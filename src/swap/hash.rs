//! Domain-separated signing hashes for swap requests and releases
//!
//! Both hashes follow EIP-712: `keccak256(0x1901 ‖ domainSeparator ‖ structHash)`.
//! The domain binds the product name, the protocol version, the short coin
//! type of the chain that verifies the signature and, optionally, the
//! verifying contract. Mainnet and testnet differ in the domain salt.

use super::{codec, EncodedSwap, SwapRequest};
use crate::error::{MesonError, MesonResult};

use ethers::abi::{self, Token};
use ethers::types::transaction::eip712::{EIP712Domain, Eip712};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use serde_json::{json, Value};

pub const DOMAIN_NAME: &str = "Meson Fi";
pub const DOMAIN_VERSION: &str = "1";

pub const REQUEST_TYPE: &str = "SwapRequest(uint8 version,uint256 amount,uint256 salt,uint256 fee,uint256 expireTs,uint16 inChain,uint8 inToken,uint16 outChain,uint8 outToken)";
pub const RELEASE_TYPE: &str = "SwapRelease(bytes32 swapId,bytes recipient)";

/// Network class a signature is valid for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkClass {
    Mainnet,
    Testnet,
}

impl NetworkClass {
    pub fn from_testnet(testnet: bool) -> Self {
        if testnet {
            NetworkClass::Testnet
        } else {
            NetworkClass::Mainnet
        }
    }

    /// Domain salt separating the two network classes
    pub fn salt(&self) -> [u8; 32] {
        match self {
            NetworkClass::Mainnet => keccak256("meson:mainnet"),
            NetworkClass::Testnet => keccak256("meson:testnet"),
        }
    }
}

/// Signature domain for one verifying chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningDomain {
    pub network: NetworkClass,
    /// Short coin type of the verifying chain
    pub coin_type: u16,
    pub verifying_contract: Option<Address>,
}

impl SigningDomain {
    pub fn new(network: NetworkClass, coin_type: u16) -> Self {
        Self {
            network,
            coin_type,
            verifying_contract: None,
        }
    }

    pub fn with_contract(mut self, contract: Address) -> Self {
        self.verifying_contract = Some(contract);
        self
    }

    pub fn eip712(&self) -> EIP712Domain {
        EIP712Domain {
            name: Some(DOMAIN_NAME.to_string()),
            version: Some(DOMAIN_VERSION.to_string()),
            chain_id: Some(U256::from(self.coin_type)),
            verifying_contract: self.verifying_contract,
            salt: Some(self.network.salt()),
        }
    }

    fn type_fields(&self) -> Value {
        let mut fields = vec![
            json!({ "name": "name", "type": "string" }),
            json!({ "name": "version", "type": "string" }),
            json!({ "name": "chainId", "type": "uint256" }),
        ];
        if self.verifying_contract.is_some() {
            fields.push(json!({ "name": "verifyingContract", "type": "address" }));
        }
        fields.push(json!({ "name": "salt", "type": "bytes32" }));
        Value::Array(fields)
    }

    fn to_json(&self) -> Value {
        let mut domain = json!({
            "name": DOMAIN_NAME,
            "version": DOMAIN_VERSION,
            "chainId": self.coin_type,
            "salt": format!("0x{}", hex::encode(self.network.salt())),
        });
        if let Some(contract) = self.verifying_contract {
            domain["verifyingContract"] = json!(format!("{:?}", contract));
        }
        domain
    }
}

/// Typed payload behind the request hash
#[derive(Debug, Clone)]
pub struct SwapRequestPayload {
    request: SwapRequest,
    domain: SigningDomain,
}

impl SwapRequestPayload {
    /// Payload verified on the origin chain of the swap
    pub fn new(encoded: &EncodedSwap, network: NetworkClass) -> MesonResult<Self> {
        let request = codec::decode(encoded)?;
        let domain = SigningDomain::new(network, request.in_chain);
        Ok(Self { request, domain })
    }

    pub fn in_domain(encoded: &EncodedSwap, domain: SigningDomain) -> MesonResult<Self> {
        Ok(Self {
            request: codec::decode(encoded)?,
            domain,
        })
    }

    /// JSON accepted by `eth_signTypedData_v4`
    pub fn typed_data(&self) -> Value {
        let r = &self.request;
        json!({
            "types": {
                "EIP712Domain": self.domain.type_fields(),
                "SwapRequest": [
                    { "name": "version", "type": "uint8" },
                    { "name": "amount", "type": "uint256" },
                    { "name": "salt", "type": "uint256" },
                    { "name": "fee", "type": "uint256" },
                    { "name": "expireTs", "type": "uint256" },
                    { "name": "inChain", "type": "uint16" },
                    { "name": "inToken", "type": "uint8" },
                    { "name": "outChain", "type": "uint16" },
                    { "name": "outToken", "type": "uint8" },
                ],
            },
            "primaryType": "SwapRequest",
            "domain": self.domain.to_json(),
            "message": {
                "version": r.version as u8,
                "amount": r.amount.to_string(),
                "salt": r.salt.to_string(),
                "fee": r.fee.to_string(),
                "expireTs": r.expire_ts.to_string(),
                "inChain": r.in_chain,
                "inToken": r.in_token,
                "outChain": r.out_chain,
                "outToken": r.out_token,
            },
        })
    }
}

impl Eip712 for SwapRequestPayload {
    type Error = MesonError;

    fn domain(&self) -> Result<EIP712Domain, Self::Error> {
        Ok(self.domain.eip712())
    }

    fn type_hash() -> Result<[u8; 32], Self::Error> {
        Ok(keccak256(REQUEST_TYPE))
    }

    fn struct_hash(&self) -> Result<[u8; 32], Self::Error> {
        let r = &self.request;
        let encoded = abi::encode(&[
            Token::FixedBytes(Self::type_hash()?.to_vec()),
            Token::Uint(U256::from(r.version as u8)),
            Token::Uint(U256::from(r.amount)),
            Token::Uint(U256::from(r.salt)),
            Token::Uint(U256::from(r.fee)),
            Token::Uint(U256::from(r.expire_ts)),
            Token::Uint(U256::from(r.in_chain)),
            Token::Uint(U256::from(r.in_token)),
            Token::Uint(U256::from(r.out_chain)),
            Token::Uint(U256::from(r.out_token)),
        ]);
        Ok(keccak256(encoded))
    }
}

/// Typed payload behind the release hash
#[derive(Debug, Clone)]
pub struct SwapReleasePayload {
    encoded: EncodedSwap,
    recipient: Vec<u8>,
    domain: SigningDomain,
}

impl SwapReleasePayload {
    /// Payload verified on the destination chain of the swap
    pub fn new(
        encoded: &EncodedSwap,
        recipient: &[u8],
        network: NetworkClass,
    ) -> MesonResult<Self> {
        let domain = SigningDomain::new(network, encoded.out_chain());
        Self::in_domain(encoded, recipient, domain)
    }

    pub fn in_domain(
        encoded: &EncodedSwap,
        recipient: &[u8],
        domain: SigningDomain,
    ) -> MesonResult<Self> {
        // unknown layouts are rejected before anything is signed
        encoded.version()?;
        if recipient.is_empty() {
            return Err(MesonError::InvalidParameter(
                "recipient must not be empty".to_string(),
            ));
        }
        Ok(Self {
            encoded: *encoded,
            recipient: recipient.to_vec(),
            domain,
        })
    }

    /// JSON accepted by `eth_signTypedData_v4`
    pub fn typed_data(&self) -> Value {
        json!({
            "types": {
                "EIP712Domain": self.domain.type_fields(),
                "SwapRelease": [
                    { "name": "swapId", "type": "bytes32" },
                    { "name": "recipient", "type": "bytes" },
                ],
            },
            "primaryType": "SwapRelease",
            "domain": self.domain.to_json(),
            "message": {
                "swapId": self.encoded.to_string(),
                "recipient": format!("0x{}", hex::encode(&self.recipient)),
            },
        })
    }
}

impl Eip712 for SwapReleasePayload {
    type Error = MesonError;

    fn domain(&self) -> Result<EIP712Domain, Self::Error> {
        Ok(self.domain.eip712())
    }

    fn type_hash() -> Result<[u8; 32], Self::Error> {
        Ok(keccak256(RELEASE_TYPE))
    }

    fn struct_hash(&self) -> Result<[u8; 32], Self::Error> {
        let encoded = abi::encode(&[
            Token::FixedBytes(Self::type_hash()?.to_vec()),
            Token::FixedBytes(self.encoded.as_bytes().to_vec()),
            Token::FixedBytes(keccak256(&self.recipient).to_vec()),
        ]);
        Ok(keccak256(encoded))
    }
}

/// Hash the initiator signs to post a swap on its origin chain
pub fn request_hash(encoded: &EncodedSwap, testnet: bool) -> MesonResult<H256> {
    let payload = SwapRequestPayload::new(encoded, NetworkClass::from_testnet(testnet))?;
    Ok(H256(payload.encode_eip712()?))
}

pub fn request_hash_in(encoded: &EncodedSwap, domain: SigningDomain) -> MesonResult<H256> {
    let payload = SwapRequestPayload::in_domain(encoded, domain)?;
    Ok(H256(payload.encode_eip712()?))
}

/// Hash the initiator signs to release a swap to `recipient` on the destination chain
pub fn release_hash(encoded: &EncodedSwap, recipient: &[u8], testnet: bool) -> MesonResult<H256> {
    let payload =
        SwapReleasePayload::new(encoded, recipient, NetworkClass::from_testnet(testnet))?;
    Ok(H256(payload.encode_eip712()?))
}

pub fn release_hash_in(
    encoded: &EncodedSwap,
    recipient: &[u8],
    domain: SigningDomain,
) -> MesonResult<H256> {
    let payload = SwapReleasePayload::in_domain(encoded, recipient, domain)?;
    Ok(H256(payload.encode_eip712()?))
}
