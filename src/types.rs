//! Shared identifier and amount types

use num_bigint::BigUint;
use num_traits::ToPrimitive;

/// Account identifier - end users, delegatees and avatars all live in the
/// same address space
pub type Address = String;

/// Underlying asset identifier (BAT, ZRX, ETH, ...)
pub type Asset = String;

/// Money-market identifier, one per listed underlying (cBAT, cZRX, cETH)
pub type MarketId = String;

/// Raw market result code. Zero is success, nonzero is a market-defined
/// failure that the wrapper translates.
pub type ResultCode = u32;

/// Underlying amounts carry 18 decimals
pub const EXP_SCALE: u128 = 1_000_000_000_000_000_000;

/// Wrapper shares mirror the market's share precision
pub const SHARE_DECIMALS: u8 = 8;

/// One whole unit of an 18-decimal underlying
pub fn whole(n: u64) -> u128 {
    n as u128 * EXP_SCALE
}

/// Exact `a * b / c` over u128 amounts. The intermediate product of an
/// 18-decimal amount and an exchange-rate mantissa does not fit in u128,
/// so widen through BigUint and narrow back.
pub fn mul_div(a: u128, b: u128, c: u128) -> Option<u128> {
    if c == 0 {
        return None;
    }
    let product = BigUint::from(a) * BigUint::from(b);
    (product / BigUint::from(c)).to_u128()
}

/// `a * b / c` rounded up. Used where the party initiating a conversion
/// must absorb the rounding remainder instead of the counterparty.
pub fn mul_div_up(a: u128, b: u128, c: u128) -> Option<u128> {
    if c == 0 {
        return None;
    }
    let product = BigUint::from(a) * BigUint::from(b) + BigUint::from(c - 1);
    (product / BigUint::from(c)).to_u128()
}
