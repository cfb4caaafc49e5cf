//! Fixed-width packing of swap parameters
//!
//! Byte 0 carries the version tag. The head (bytes 1..16) differs per version,
//! the tail (bytes 16..32) is shared:
//!
//! | bytes  | v0          | v1          |
//! |--------|-------------|-------------|
//! | 1..16  | amount(11) salt(4) | amount(5) salt(10) |
//! | 16..21 | fee         | fee         |
//! | 21..26 | expire_ts   | expire_ts   |
//! | 26..28 | out_chain   | out_chain   |
//! | 28     | out_token   | out_token   |
//! | 29..31 | in_chain    | in_chain    |
//! | 31     | in_token    | in_token    |

use super::{EncodedSwap, SwapRequest, SwapVersion};
use crate::error::{MesonError, MesonResult};

use std::ops::Range;

pub(super) const FEE: Range<usize> = 16..21;
pub(super) const EXPIRE_TS: Range<usize> = 21..26;
pub(super) const OUT_CHAIN: Range<usize> = 26..28;
pub(super) const OUT_TOKEN: usize = 28;
pub(super) const IN_CHAIN: Range<usize> = 29..31;
pub(super) const IN_TOKEN: usize = 31;

/// Version-dependent part of the layout
pub(super) struct Layout {
    pub amount: Range<usize>,
    pub salt: Range<usize>,
}

impl Layout {
    pub fn of(version: SwapVersion) -> Self {
        match version {
            SwapVersion::V0 => Layout {
                amount: 1..12,
                salt: 12..16,
            },
            SwapVersion::V1 => Layout {
                amount: 1..6,
                salt: 6..16,
            },
        }
    }
}

/// Pack a swap request into its identifier
pub fn encode(request: &SwapRequest) -> MesonResult<EncodedSwap> {
    if request.amount == 0 {
        return Err(MesonError::InvalidParameter(
            "amount must be greater than zero".to_string(),
        ));
    }

    let layout = Layout::of(request.version);
    let mut out = [0u8; EncodedSwap::LEN];
    out[0] = request.version as u8;
    write_be(&mut out[layout.amount], request.amount, "amount")?;
    write_be(&mut out[layout.salt], request.salt, "salt")?;
    write_be(&mut out[FEE], request.fee as u128, "fee")?;
    write_be(&mut out[EXPIRE_TS], request.expire_ts as u128, "expire_ts")?;
    out[OUT_CHAIN].copy_from_slice(&request.out_chain.to_be_bytes());
    out[OUT_TOKEN] = request.out_token;
    out[IN_CHAIN].copy_from_slice(&request.in_chain.to_be_bytes());
    out[IN_TOKEN] = request.in_token;

    Ok(EncodedSwap::from_bytes(out))
}

/// Unpack an identifier produced by [`encode`]
pub fn decode(encoded: &EncodedSwap) -> MesonResult<SwapRequest> {
    let bytes = encoded.as_bytes();
    let version = SwapVersion::try_from(bytes[0])?;
    let layout = Layout::of(version);

    Ok(SwapRequest {
        version,
        amount: read_be(&bytes[layout.amount]),
        salt: read_be(&bytes[layout.salt]),
        fee: read_be(&bytes[FEE]) as u64,
        expire_ts: read_be(&bytes[EXPIRE_TS]) as u64,
        in_chain: read_be(&bytes[IN_CHAIN]) as u16,
        in_token: bytes[IN_TOKEN],
        out_chain: read_be(&bytes[OUT_CHAIN]) as u16,
        out_token: bytes[OUT_TOKEN],
    })
}

pub(super) fn read_be(src: &[u8]) -> u128 {
    src.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b))
}

fn write_be(dst: &mut [u8], value: u128, field: &str) -> MesonResult<()> {
    let bytes = value.to_be_bytes();
    let width = dst.len();
    let (overflow, fitted) = bytes.split_at(bytes.len() - width);
    if overflow.iter().any(|b| *b != 0) {
        return Err(MesonError::InvalidParameter(format!(
            "{} {} does not fit in {} bytes",
            field, value, width
        )));
    }
    dst.copy_from_slice(fitted);
    Ok(())
}
