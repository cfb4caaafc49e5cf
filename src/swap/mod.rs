//! Swap parameters and their compact on-chain identifier
//!
//! A swap request is packed into a fixed 32-byte identifier (the *encoded
//! swap*). The identifier is the key the Meson contract stores swaps under and
//! the input to both signing hashes:
//! - the request hash, signed by the initiator to post the swap on the origin chain
//! - the release hash, signed by the initiator to release funds to a recipient
//!   on the destination chain

mod codec;
mod hash;

pub use codec::{decode, encode};
pub use hash::{
    release_hash, release_hash_in, request_hash, request_hash_in, NetworkClass,
    SigningDomain, SwapReleasePayload, SwapRequestPayload, DOMAIN_NAME, DOMAIN_VERSION,
    RELEASE_TYPE, REQUEST_TYPE,
};

use crate::error::{MesonError, MesonResult};

use ethers::types::{Bytes, U256};
use std::fmt;
use std::str::FromStr;

/// Identifier layout version, stored in the first byte of the encoded swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SwapVersion {
    /// Legacy layout: 88-bit amount, 32-bit salt
    V0 = 0,
    /// Current layout: 40-bit amount, 80-bit salt
    V1 = 1,
}

impl SwapVersion {
    pub const CURRENT: SwapVersion = SwapVersion::V1;
}

impl TryFrom<u8> for SwapVersion {
    type Error = MesonError;

    fn try_from(tag: u8) -> MesonResult<Self> {
        match tag {
            0 => Ok(SwapVersion::V0),
            1 => Ok(SwapVersion::V1),
            other => Err(MesonError::MalformedIdentifier(format!(
                "unknown version tag {}",
                other
            ))),
        }
    }
}

/// Parameters of a single swap request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapRequest {
    pub version: SwapVersion,
    /// Amount in the token's smallest unit
    pub amount: u128,
    pub salt: u128,
    /// Fee paid to the liquidity provider, smallest unit
    pub fee: u64,
    /// Unix seconds after which the request can no longer be bonded
    pub expire_ts: u64,
    /// Short coin type of the origin chain
    pub in_chain: u16,
    pub in_token: u8,
    /// Short coin type of the destination chain
    pub out_chain: u16,
    pub out_token: u8,
}

impl SwapRequest {
    /// Check creation-time invariants against the current unix time
    pub fn validated(self, now: u64) -> MesonResult<Self> {
        if self.amount == 0 {
            return Err(MesonError::InvalidParameter(
                "amount must be greater than zero".to_string(),
            ));
        }
        if self.expire_ts <= now {
            return Err(MesonError::InvalidParameter(format!(
                "expire_ts {} is not in the future (now {})",
                self.expire_ts, now
            )));
        }
        Ok(self)
    }

    /// Validate against the wall clock and encode
    pub fn encode_now(self) -> MesonResult<EncodedSwap> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        encode(&self.validated(now)?)
    }
}

/// 32-byte swap identifier, used verbatim as the on-chain key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodedSwap([u8; EncodedSwap::LEN]);

impl EncodedSwap {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> MesonResult<Self> {
        let bytes: [u8; Self::LEN] = bytes.try_into().map_err(|_| {
            MesonError::MalformedIdentifier(format!(
                "expected {} bytes, got {}",
                Self::LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// The identifier as the contract's `uint256 encodedSwap` argument
    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    pub fn version(&self) -> MesonResult<SwapVersion> {
        SwapVersion::try_from(self.0[0])
    }

    pub fn amount(&self) -> MesonResult<u128> {
        let layout = codec::Layout::of(self.version()?);
        Ok(codec::read_be(&self.0[layout.amount]))
    }

    pub fn fee(&self) -> u64 {
        codec::read_be(&self.0[codec::FEE]) as u64
    }

    pub fn expire_ts(&self) -> u64 {
        codec::read_be(&self.0[codec::EXPIRE_TS]) as u64
    }

    pub fn in_chain(&self) -> u16 {
        codec::read_be(&self.0[codec::IN_CHAIN]) as u16
    }

    pub fn out_chain(&self) -> u16 {
        codec::read_be(&self.0[codec::OUT_CHAIN]) as u16
    }

    pub fn in_token(&self) -> u8 {
        self.0[codec::IN_TOKEN]
    }

    pub fn out_token(&self) -> u8 {
        self.0[codec::OUT_TOKEN]
    }
}

impl fmt::Display for EncodedSwap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for EncodedSwap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedSwap({})", self)
    }
}

impl FromStr for EncodedSwap {
    type Err = MesonError;

    fn from_str(s: &str) -> MesonResult<Self> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped)
            .map_err(|e| MesonError::MalformedIdentifier(format!("invalid hex: {}", e)))?;
        Self::from_slice(&bytes)
    }
}

/// Authorization to release a posted swap to a recipient on the destination chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRelease {
    pub encoded: EncodedSwap,
    /// Destination address bytes, width depends on the destination chain
    pub recipient: Bytes,
}

impl SwapRelease {
    pub fn new(encoded: EncodedSwap, recipient: impl Into<Bytes>) -> MesonResult<Self> {
        let recipient = recipient.into();
        if recipient.is_empty() {
            return Err(MesonError::InvalidParameter(
                "recipient must not be empty".to_string(),
            ));
        }
        Ok(Self { encoded, recipient })
    }

    pub fn hash(&self, testnet: bool) -> MesonResult<ethers::types::H256> {
        release_hash(&self.encoded, &self.recipient, testnet)
    }
}
