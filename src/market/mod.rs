//! Money-market interface boundary
//!
//! The underlying market is an external collaborator: the wrapper only sees
//! this trait and the numeric result codes it returns. Zero is success,
//! anything else is a market-defined failure the wrapper translates. An
//! in-memory reference implementation lives in [`memory`].

pub mod memory;

use crate::types::{Address, MarketId, ResultCode};

pub mod codes {
    use crate::types::ResultCode;

    pub const NO_ERROR: ResultCode = 0;
    pub const UNKNOWN_MARKET: ResultCode = 1;
    pub const INSUFFICIENT_CASH: ResultCode = 2;
    pub const INSUFFICIENT_COLLATERAL: ResultCode = 3;
    pub const INSUFFICIENT_BALANCE: ResultCode = 4;
    pub const REPAY_EXCEEDS_DEBT: ResultCode = 5;
    pub const SELF_TRANSFER: ResultCode = 6;
    pub const MATH_ERROR: ResultCode = 7;
}

/// Bank address holding a market's underlying cash
pub fn treasury_address(market: &MarketId) -> Address {
    format!("market:{}", market)
}

pub trait MoneyMarket {
    /// Deposit underlying for the avatar, crediting shares at the live
    /// exchange rate
    fn deposit(&mut self, market: &MarketId, avatar: &Address, amount: u128) -> ResultCode;

    /// Redeem by share amount
    fn withdraw(&mut self, market: &MarketId, avatar: &Address, shares: u128) -> ResultCode;

    /// Redeem by underlying amount, converted at the live exchange rate
    fn withdraw_underlying(&mut self, market: &MarketId, avatar: &Address, amount: u128)
        -> ResultCode;

    fn borrow(&mut self, market: &MarketId, avatar: &Address, amount: u128) -> ResultCode;

    fn repay(&mut self, market: &MarketId, avatar: &Address, amount: u128) -> ResultCode;

    /// Move shares between two avatars
    fn transfer_shares(
        &mut self,
        market: &MarketId,
        from: &Address,
        to: &Address,
        shares: u128,
    ) -> ResultCode;

    fn share_balance(&self, market: &MarketId, avatar: &Address) -> u128;

    fn underlying_balance(&self, market: &MarketId, avatar: &Address) -> u128;

    fn borrow_balance(&self, market: &MarketId, avatar: &Address) -> u128;

    fn total_shares(&self, market: &MarketId) -> u128;

    /// Live exchange rate, 1e18-scaled mantissa of underlying per share
    fn exchange_rate(&self, market: &MarketId) -> u128;

    /// Underlying cash reserve held by the market
    fn cash(&self, market: &MarketId) -> u128;
}
