//! Meson contract surface and swap state derivation

use crate::error::MesonResult;

use ethers::abi::{parse_abi, Abi};
use ethers::contract::BaseContract;
use ethers::types::Address;
use std::fmt;

/// Human-readable ABI of the functions the relayer calls
pub const MESON_ABI: &[&str] = &[
    "function getPostedSwap(uint256 encodedSwap) external view returns (address initiator, address poolOwner, bool exist)",
    "function getLockedSwap(uint256 encodedSwap, address initiator) external view returns (address poolOwner, uint40 until)",
    "function indexOfAddress(address addr) external view returns (uint40)",
    "function addressOfIndex(uint40 poolIndex) external view returns (address)",
    "function getShortCoinType() external pure returns (bytes2)",
    "function deposit(uint256 amount, uint8 tokenIndex) external",
    "function depositAndRegister(uint256 amount, uint8 tokenIndex, uint40 poolIndex) external",
    "function addMultipleSupportedTokens(address[] tokens, uint8[] indexes) external",
];

pub fn meson_abi() -> MesonResult<Abi> {
    Ok(parse_abi(MESON_ABI)?)
}

pub fn meson_contract() -> MesonResult<BaseContract> {
    Ok(BaseContract::from(meson_abi()?))
}

/// State of a swap on its origin chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostedSwapStatus {
    /// Never posted, or already settled and cleared
    NoneOrAfterRunning,
    Posted,
    /// An LP has bonded the swap
    Bonded,
    Executed,
    ErrorExpired,
    ErrorExpiredButBonded,
}

impl PostedSwapStatus {
    /// Map a `getPostedSwap` reply to a status at time `now` (unix seconds)
    pub fn derive(
        exist: bool,
        initiator: Address,
        pool_owner: Address,
        expire_ts: u64,
        now: u64,
    ) -> Self {
        let expired = expire_ts <= now;
        if !exist {
            PostedSwapStatus::NoneOrAfterRunning
        } else if initiator.is_zero() {
            PostedSwapStatus::Executed
        } else if pool_owner.is_zero() {
            if expired {
                PostedSwapStatus::ErrorExpired
            } else {
                PostedSwapStatus::Posted
            }
        } else if expired {
            PostedSwapStatus::ErrorExpiredButBonded
        } else {
            PostedSwapStatus::Bonded
        }
    }

    /// Whether the destination chain can tell anything more about the swap
    pub fn needs_lock_check(&self) -> bool {
        matches!(
            self,
            PostedSwapStatus::NoneOrAfterRunning
                | PostedSwapStatus::Bonded
                | PostedSwapStatus::Executed
                | PostedSwapStatus::ErrorExpiredButBonded
        )
    }
}

impl fmt::Display for PostedSwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PostedSwapStatus::NoneOrAfterRunning => "NoneOrAfterRunning",
            PostedSwapStatus::Posted => "Posted",
            PostedSwapStatus::Bonded => "Bonded",
            PostedSwapStatus::Executed => "Executed",
            PostedSwapStatus::ErrorExpired => "ErrorExpired",
            PostedSwapStatus::ErrorExpiredButBonded => "ErrorExpiredButBonded",
        };
        f.write_str(name)
    }
}

/// State of a swap on its destination chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockedSwapStatus {
    None,
    Locked,
    Released,
    Expired,
}

impl LockedSwapStatus {
    /// Map a `getLockedSwap` reply to a status at time `now` (unix seconds)
    pub fn derive(pool_owner: Address, until: u64, now: u64) -> Self {
        if until == 0 {
            if pool_owner.is_zero() {
                LockedSwapStatus::None
            } else {
                LockedSwapStatus::Released
            }
        } else if until <= now {
            LockedSwapStatus::Expired
        } else {
            LockedSwapStatus::Locked
        }
    }
}

impl fmt::Display for LockedSwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockedSwapStatus::None => "None",
            LockedSwapStatus::Locked => "Locked",
            LockedSwapStatus::Released => "Released",
            LockedSwapStatus::Expired => "Expired",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedSwap {
    pub status: PostedSwapStatus,
    pub initiator: Option<Address>,
    /// Pool owner of the bonding LP
    pub provider: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedSwap {
    pub status: LockedSwapStatus,
    pub initiator: Option<Address>,
    pub provider: Option<Address>,
    pub until: Option<u64>,
}

pub(crate) fn non_zero(address: Address) -> Option<Address> {
    (!address.is_zero()).then_some(address)
}
