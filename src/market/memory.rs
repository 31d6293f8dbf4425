//! In-memory reference money market
//!
//! A minimal multi-market lender good enough to exercise the wrapper layer:
//! per-market cash, share and borrow ledgers, a fixed exchange rate and a
//! cross-market collateral check. Interest accrual is out of scope, so the
//! exchange rate only moves when a test moves it.

use super::{codes, MoneyMarket};
use crate::types::{mul_div, mul_div_up, Address, MarketId, ResultCode, EXP_SCALE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Observed initial exchange rate: 2e27, i.e. one 8-decimal share redeems
/// for 2e9 underlying wei
pub const INITIAL_EXCHANGE_RATE: u128 = 2_000_000_000_000_000_000_000_000_000;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MarketState {
    pub cash: u128,
    pub shares: HashMap<Address, u128>,
    pub borrows: HashMap<Address, u128>,
    /// 1e18-scaled underlying-per-share mantissa
    pub exchange_rate: u128,
    /// 1e18-scaled reference price of the underlying
    pub price: u128,
}

impl MarketState {
    fn new(price: u128) -> Self {
        Self {
            cash: 0,
            shares: HashMap::new(),
            borrows: HashMap::new(),
            exchange_rate: INITIAL_EXCHANGE_RATE,
            price,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InMemoryMarket {
    markets: HashMap<MarketId, MarketState>,
    /// 1e18-scaled collateral factor applied to deposited value
    collateral_factor: u128,
}

impl InMemoryMarket {
    pub fn new(collateral_factor_percent: u64) -> Self {
        Self {
            markets: HashMap::new(),
            collateral_factor: collateral_factor_percent as u128 * EXP_SCALE / 100,
        }
    }

    /// List a market for an underlying at a 1e18-scaled reference price
    pub fn list_market(&mut self, market: &MarketId, price: u128) {
        self.markets
            .entry(market.clone())
            .or_insert_with(|| MarketState::new(price));
    }

    pub fn set_price(&mut self, market: &MarketId, price: u128) {
        if let Some(state) = self.markets.get_mut(market) {
            state.price = price;
        }
    }

    pub fn set_exchange_rate(&mut self, market: &MarketId, rate: u128) {
        if let Some(state) = self.markets.get_mut(market) {
            state.exchange_rate = rate;
        }
    }

    fn shares_for(state: &MarketState, underlying: u128) -> Option<u128> {
        mul_div(underlying, EXP_SCALE, state.exchange_rate)
    }

    fn underlying_for(state: &MarketState, shares: u128) -> Option<u128> {
        mul_div(shares, state.exchange_rate, EXP_SCALE)
    }

    /// (collateral value adjusted by the collateral factor, borrowed value),
    /// both 1e18-scaled and summed across markets
    fn account_liquidity(&self, avatar: &Address) -> Option<(u128, u128)> {
        let mut collateral = 0u128;
        let mut borrowed = 0u128;
        for state in self.markets.values() {
            if let Some(shares) = state.shares.get(avatar) {
                let underlying = Self::underlying_for(state, *shares)?;
                let value = mul_div(underlying, state.price, EXP_SCALE)?;
                collateral = collateral.checked_add(value)?;
            }
            if let Some(debt) = state.borrows.get(avatar) {
                let value = mul_div(*debt, state.price, EXP_SCALE)?;
                borrowed = borrowed.checked_add(value)?;
            }
        }
        let adjusted = mul_div(collateral, self.collateral_factor, EXP_SCALE)?;
        Some((adjusted, borrowed))
    }

    /// Would the avatar stay solvent after losing `underlying` worth of
    /// collateral in `market` and gaining `extra_debt` of its underlying?
    fn check_liquidity(
        &self,
        market: &MarketId,
        avatar: &Address,
        underlying_out: u128,
        extra_debt: u128,
    ) -> ResultCode {
        let state = match self.markets.get(market) {
            Some(s) => s,
            None => return codes::UNKNOWN_MARKET,
        };
        let (collateral, borrowed) = match self.account_liquidity(avatar) {
            Some(v) => v,
            None => return codes::MATH_ERROR,
        };
        let out_value = match mul_div(underlying_out, state.price, EXP_SCALE) {
            Some(v) => match mul_div(v, self.collateral_factor, EXP_SCALE) {
                Some(v) => v,
                None => return codes::MATH_ERROR,
            },
            None => return codes::MATH_ERROR,
        };
        let debt_value = match mul_div(extra_debt, state.price, EXP_SCALE) {
            Some(v) => v,
            None => return codes::MATH_ERROR,
        };
        let remaining = collateral.saturating_sub(out_value);
        let owed = match borrowed.checked_add(debt_value) {
            Some(v) => v,
            None => return codes::MATH_ERROR,
        };
        if remaining < owed {
            return codes::INSUFFICIENT_COLLATERAL;
        }
        codes::NO_ERROR
    }

    /// Shared redeem path. `shares` and `underlying` are given as a matched
    /// pair so cash always moves by exactly what the redeemer receives;
    /// converting between the two is the caller's concern.
    fn redeem_position(
        &mut self,
        market: &MarketId,
        avatar: &Address,
        shares: u128,
        underlying: u128,
    ) -> ResultCode {
        let held = match self.markets.get(market) {
            Some(state) => state.shares.get(avatar).copied().unwrap_or(0),
            None => return codes::UNKNOWN_MARKET,
        };
        if held < shares {
            return codes::INSUFFICIENT_BALANCE;
        }
        if self.markets[market].cash < underlying {
            return codes::INSUFFICIENT_CASH;
        }
        let code = self.check_liquidity(market, avatar, underlying, 0);
        if code != codes::NO_ERROR {
            return code;
        }
        let state = match self.markets.get_mut(market) {
            Some(s) => s,
            None => return codes::UNKNOWN_MARKET,
        };
        let remaining = held - shares;
        if remaining == 0 {
            state.shares.remove(avatar);
        } else {
            state.shares.insert(avatar.clone(), remaining);
        }
        state.cash -= underlying;
        debug!(market = %market, avatar = %avatar, shares, underlying, "withdraw");
        codes::NO_ERROR
    }

    pub fn load(path: &str) -> crate::error::Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| crate::error::ProtocolError::Io(e.to_string()))?;
        serde_json::from_str(&data).map_err(|e| crate::error::ProtocolError::Parse(e.to_string()))
    }

    pub fn save(&self, path: &str) -> crate::error::Result<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::ProtocolError::Parse(e.to_string()))?;
        std::fs::write(path, data).map_err(|e| crate::error::ProtocolError::Io(e.to_string()))
    }
}

impl MoneyMarket for InMemoryMarket {
    fn deposit(&mut self, market: &MarketId, avatar: &Address, amount: u128) -> ResultCode {
        let state = match self.markets.get_mut(market) {
            Some(s) => s,
            None => return codes::UNKNOWN_MARKET,
        };
        let shares = match Self::shares_for(state, amount) {
            Some(s) => s,
            None => return codes::MATH_ERROR,
        };
        let entry = state.shares.entry(avatar.clone()).or_insert(0);
        *entry = match entry.checked_add(shares) {
            Some(v) => v,
            None => return codes::MATH_ERROR,
        };
        state.cash = match state.cash.checked_add(amount) {
            Some(v) => v,
            None => return codes::MATH_ERROR,
        };
        debug!(market = %market, avatar = %avatar, amount, shares, "deposit");
        codes::NO_ERROR
    }

    fn withdraw(&mut self, market: &MarketId, avatar: &Address, shares: u128) -> ResultCode {
        let underlying = match self.markets.get(market) {
            Some(state) => match Self::underlying_for(state, shares) {
                Some(u) => u,
                None => return codes::MATH_ERROR,
            },
            None => return codes::UNKNOWN_MARKET,
        };
        self.redeem_position(market, avatar, shares, underlying)
    }

    fn withdraw_underlying(
        &mut self,
        market: &MarketId,
        avatar: &Address,
        amount: u128,
    ) -> ResultCode {
        // Shares round up: the redeemer absorbs the sub-share remainder, so
        // the remaining supply is never backed by less cash than it redeems
        // for
        let shares = match self.markets.get(market) {
            Some(state) => match mul_div_up(amount, EXP_SCALE, state.exchange_rate) {
                Some(s) => s,
                None => return codes::MATH_ERROR,
            },
            None => return codes::UNKNOWN_MARKET,
        };
        self.redeem_position(market, avatar, shares, amount)
    }

    fn borrow(&mut self, market: &MarketId, avatar: &Address, amount: u128) -> ResultCode {
        match self.markets.get(market) {
            Some(state) if state.cash < amount => return codes::INSUFFICIENT_CASH,
            Some(_) => {}
            None => return codes::UNKNOWN_MARKET,
        }
        let code = self.check_liquidity(market, avatar, 0, amount);
        if code != codes::NO_ERROR {
            return code;
        }
        let state = match self.markets.get_mut(market) {
            Some(s) => s,
            None => return codes::UNKNOWN_MARKET,
        };
        let entry = state.borrows.entry(avatar.clone()).or_insert(0);
        *entry = match entry.checked_add(amount) {
            Some(v) => v,
            None => return codes::MATH_ERROR,
        };
        state.cash -= amount;
        debug!(market = %market, avatar = %avatar, amount, "borrow");
        codes::NO_ERROR
    }

    fn repay(&mut self, market: &MarketId, avatar: &Address, amount: u128) -> ResultCode {
        let state = match self.markets.get_mut(market) {
            Some(s) => s,
            None => return codes::UNKNOWN_MARKET,
        };
        let debt = state.borrows.get(avatar).copied().unwrap_or(0);
        if amount > debt {
            return codes::REPAY_EXCEEDS_DEBT;
        }
        let remaining = debt - amount;
        if remaining == 0 {
            state.borrows.remove(avatar);
        } else {
            state.borrows.insert(avatar.clone(), remaining);
        }
        state.cash = match state.cash.checked_add(amount) {
            Some(v) => v,
            None => return codes::MATH_ERROR,
        };
        debug!(market = %market, avatar = %avatar, amount, remaining, "repay");
        codes::NO_ERROR
    }

    fn transfer_shares(
        &mut self,
        market: &MarketId,
        from: &Address,
        to: &Address,
        shares: u128,
    ) -> ResultCode {
        if from == to {
            return codes::SELF_TRANSFER;
        }
        let held = match self.markets.get(market) {
            Some(state) => state.shares.get(from).copied().unwrap_or(0),
            None => return codes::UNKNOWN_MARKET,
        };
        if held < shares {
            return codes::INSUFFICIENT_BALANCE;
        }
        let underlying = {
            let state = &self.markets[market];
            match Self::underlying_for(state, shares) {
                Some(u) => u,
                None => return codes::MATH_ERROR,
            }
        };
        // Source must stay solvent after giving up the collateral
        let code = self.check_liquidity(market, from, underlying, 0);
        if code != codes::NO_ERROR {
            return code;
        }
        let state = match self.markets.get_mut(market) {
            Some(s) => s,
            None => return codes::UNKNOWN_MARKET,
        };
        let remaining = held - shares;
        if remaining == 0 {
            state.shares.remove(from);
        } else {
            state.shares.insert(from.clone(), remaining);
        }
        let entry = state.shares.entry(to.clone()).or_insert(0);
        *entry = match entry.checked_add(shares) {
            Some(v) => v,
            None => return codes::MATH_ERROR,
        };
        debug!(market = %market, from = %from, to = %to, shares, "share transfer");
        codes::NO_ERROR
    }

    fn share_balance(&self, market: &MarketId, avatar: &Address) -> u128 {
        self.markets
            .get(market)
            .and_then(|s| s.shares.get(avatar))
            .copied()
            .unwrap_or(0)
    }

    fn underlying_balance(&self, market: &MarketId, avatar: &Address) -> u128 {
        self.markets
            .get(market)
            .and_then(|state| {
                let shares = state.shares.get(avatar).copied().unwrap_or(0);
                Self::underlying_for(state, shares)
            })
            .unwrap_or(0)
    }

    fn borrow_balance(&self, market: &MarketId, avatar: &Address) -> u128 {
        self.markets
            .get(market)
            .and_then(|s| s.borrows.get(avatar))
            .copied()
            .unwrap_or(0)
    }

    fn total_shares(&self, market: &MarketId) -> u128 {
        self.markets
            .get(market)
            .map(|s| s.shares.values().sum())
            .unwrap_or(0)
    }

    fn exchange_rate(&self, market: &MarketId) -> u128 {
        self.markets
            .get(market)
            .map(|s| s.exchange_rate)
            .unwrap_or(0)
    }

    fn cash(&self, market: &MarketId) -> u128 {
        self.markets.get(market).map(|s| s.cash).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::whole;

    fn cbat() -> MarketId {
        "cBAT".to_string()
    }

    fn market() -> InMemoryMarket {
        let mut m = InMemoryMarket::new(50);
        m.list_market(&cbat(), EXP_SCALE);
        m
    }

    #[test]
    fn test_deposit_credits_shares_at_rate() {
        let mut m = market();
        let code = m.deposit(&cbat(), &"av1".to_string(), whole(1000));
        assert_eq!(code, codes::NO_ERROR);
        // 1000e18 * 1e18 / 2e27 = 5000 * 1e8
        assert_eq!(m.share_balance(&cbat(), &"av1".to_string()), 5000 * 100_000_000);
        assert_eq!(m.underlying_balance(&cbat(), &"av1".to_string()), whole(1000));
        assert_eq!(m.cash(&cbat()), whole(1000));
    }

    #[test]
    fn test_borrow_requires_collateral() {
        let mut m = market();
        assert_eq!(
            m.borrow(&cbat(), &"av1".to_string(), whole(10)),
            codes::INSUFFICIENT_CASH
        );

        m.deposit(&cbat(), &"av1".to_string(), whole(1000));
        // 50% collateral factor: 500 borrowable
        assert_eq!(
            m.borrow(&cbat(), &"av1".to_string(), whole(501)),
            codes::INSUFFICIENT_COLLATERAL
        );
        assert_eq!(m.borrow(&cbat(), &"av1".to_string(), whole(100)), codes::NO_ERROR);
        assert_eq!(m.borrow_balance(&cbat(), &"av1".to_string()), whole(100));
        assert_eq!(m.cash(&cbat()), whole(900));
    }

    #[test]
    fn test_cross_market_collateral() {
        let mut m = market();
        m.list_market(&"cZRX".to_string(), EXP_SCALE);
        m.deposit(&"cZRX".to_string(), &"av1".to_string(), whole(1000));
        // Someone else supplies BAT cash
        m.deposit(&cbat(), &"av2".to_string(), whole(1000));

        // ZRX collateral covers a BAT borrow
        assert_eq!(m.borrow(&cbat(), &"av1".to_string(), whole(100)), codes::NO_ERROR);
    }

    #[test]
    fn test_repay_caps_at_debt() {
        let mut m = market();
        m.deposit(&cbat(), &"av1".to_string(), whole(1000));
        m.borrow(&cbat(), &"av1".to_string(), whole(100));

        assert_eq!(
            m.repay(&cbat(), &"av1".to_string(), whole(101)),
            codes::REPAY_EXCEEDS_DEBT
        );
        assert_eq!(m.repay(&cbat(), &"av1".to_string(), whole(100)), codes::NO_ERROR);
        assert_eq!(m.borrow_balance(&cbat(), &"av1".to_string()), 0);
        assert_eq!(m.cash(&cbat()), whole(1000));
    }

    #[test]
    fn test_withdraw_checks_balance_and_liquidity() {
        let mut m = market();
        m.deposit(&cbat(), &"av1".to_string(), whole(1000));

        let all_shares = m.share_balance(&cbat(), &"av1".to_string());
        assert_eq!(
            m.withdraw(&cbat(), &"av1".to_string(), all_shares + 1),
            codes::INSUFFICIENT_BALANCE
        );

        // Borrow against it, then a full withdraw must fail the check
        m.borrow(&cbat(), &"av1".to_string(), whole(100));
        assert_eq!(
            m.withdraw(&cbat(), &"av1".to_string(), all_shares),
            codes::INSUFFICIENT_CASH
        );
        assert_eq!(
            m.withdraw_underlying(&cbat(), &"av1".to_string(), whole(900)),
            codes::INSUFFICIENT_COLLATERAL
        );

        assert_eq!(
            m.withdraw_underlying(&cbat(), &"av1".to_string(), whole(500)),
            codes::NO_ERROR
        );
        assert_eq!(m.underlying_balance(&cbat(), &"av1".to_string()), whole(500));
    }

    #[test]
    fn test_withdraw_underlying_dust_amount_debits_cash_exactly() {
        let mut m = market();
        m.deposit(&cbat(), &"av1".to_string(), whole(1000));

        // One wei past a share boundary: cash drops by exactly the request
        let amount = whole(500) + 1;
        assert_eq!(
            m.withdraw_underlying(&cbat(), &"av1".to_string(), amount),
            codes::NO_ERROR
        );
        assert_eq!(m.cash(&cbat()), whole(1000) - amount);

        // The remaining position never redeems for more than the cash
        // backing it, and a full share redeem still clears
        assert!(m.underlying_balance(&cbat(), &"av1".to_string()) <= m.cash(&cbat()));
        let rest = m.share_balance(&cbat(), &"av1".to_string());
        assert_eq!(m.withdraw(&cbat(), &"av1".to_string(), rest), codes::NO_ERROR);
        assert_eq!(m.share_balance(&cbat(), &"av1".to_string()), 0);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut m = market();
        m.deposit(&cbat(), &"av1".to_string(), whole(100));
        m.borrow(&cbat(), &"av1".to_string(), whole(10));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market.json");
        m.save(path.to_str().unwrap()).unwrap();

        let loaded = InMemoryMarket::load(path.to_str().unwrap()).unwrap();
        assert_eq!(
            loaded.share_balance(&cbat(), &"av1".to_string()),
            m.share_balance(&cbat(), &"av1".to_string())
        );
        assert_eq!(loaded.borrow_balance(&cbat(), &"av1".to_string()), whole(10));
        assert_eq!(loaded.cash(&cbat()), m.cash(&cbat()));
        assert_eq!(loaded.exchange_rate(&cbat()), INITIAL_EXCHANGE_RATE);
    }

    #[test]
    fn test_transfer_shares_rules() {
        let mut m = market();
        m.deposit(&cbat(), &"av1".to_string(), whole(100));
        let shares = m.share_balance(&cbat(), &"av1".to_string());

        assert_eq!(
            m.transfer_shares(&cbat(), &"av1".to_string(), &"av1".to_string(), 1),
            codes::SELF_TRANSFER
        );
        assert_eq!(
            m.transfer_shares(&cbat(), &"av1".to_string(), &"av2".to_string(), shares + 1),
            codes::INSUFFICIENT_BALANCE
        );
        assert_eq!(
            m.transfer_shares(&cbat(), &"av1".to_string(), &"av2".to_string(), shares),
            codes::NO_ERROR
        );
        assert_eq!(m.share_balance(&cbat(), &"av2".to_string()), shares);
        assert_eq!(m.share_balance(&cbat(), &"av1".to_string()), 0);
        assert_eq!(m.total_shares(&cbat()), shares);
    }
}
