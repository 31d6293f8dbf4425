//! Wrapper token over one money-market listing
//!
//! A BToken presents a user's avatar position as a transferable share
//! balance. Every state-changing entry point runs the same three-phase
//! protocol: resolve the target user's avatar through the registry,
//! authorize the caller (self-service, or the avatar's single registered
//! delegatee), then execute against the market and translate its result
//! code. The `*_on_avatar` variants are the delegatee path: they take the
//! avatar address and resolve its owner, then share the exact same core as
//! the self-service entry points.
//!
//! Balances and total supply are read-through views of the market keyed by
//! avatar; only allowances are wrapper-local, because the market has no
//! notion of the end user behind an avatar.

use crate::avatar::Avatar;
use crate::bank::AssetBank;
use crate::error::{ProtocolError, Result};
use crate::market::{codes, treasury_address, MoneyMarket};
use crate::registry::Registry;
use crate::types::{mul_div, Address, Asset, MarketId, EXP_SCALE, SHARE_DECIMALS};
use std::collections::HashMap;
use tracing::debug;

/// Asset name the native-variant wrapper settles in
pub const NATIVE_ASSET: &str = "ETH";

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// Underlying pulled from the caller's wallet balance
    Fungible,
    /// Value attached to the call; repay overpayment is capped and the
    /// excess stays with the caller
    Native,
}

#[derive(Clone, Debug)]
pub struct BToken {
    name: String,
    symbol: String,
    market: MarketId,
    underlying: Asset,
    kind: TokenKind,
    /// (owner avatar, spender avatar) -> share allowance
    allowances: HashMap<(Address, Address), u128>,
}

impl BToken {
    pub fn fungible(market: MarketId, underlying: Asset, name: String, symbol: String) -> Self {
        Self {
            name,
            symbol,
            market,
            underlying,
            kind: TokenKind::Fungible,
            allowances: HashMap::new(),
        }
    }

    pub fn native(market: MarketId, name: String, symbol: String) -> Self {
        Self {
            name,
            symbol,
            market,
            underlying: NATIVE_ASSET.to_string(),
            kind: TokenKind::Native,
            allowances: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Fixed to the market's share precision
    pub fn decimals(&self) -> u8 {
        SHARE_DECIMALS
    }

    pub fn market(&self) -> &MarketId {
        &self.market
    }

    pub fn underlying(&self) -> &Asset {
        &self.underlying
    }

    pub fn kind(&self) -> &TokenKind {
        &self.kind
    }

    // ---- identity + authorization core --------------------------------

    /// Phase 1 and 2 of every operation: resolve the target's avatar and
    /// verify the caller may act for it.
    fn resolve_authorized(
        &self,
        registry: &mut Registry,
        target: &Address,
        caller: &Address,
    ) -> Result<Avatar> {
        let address = registry.get_or_create_avatar(target)?;
        if caller != target && !registry.delegate(&address, caller) {
            return Err(ProtocolError::DelegateeNotAuthorized);
        }
        Ok(Avatar::new(address))
    }

    fn owner_of_avatar(&self, registry: &Registry, avatar: &Address) -> Result<Address> {
        registry
            .owner_of(avatar)
            .cloned()
            .ok_or_else(|| ProtocolError::UnknownAvatar(avatar.clone()))
    }

    // ---- mint ----------------------------------------------------------

    pub fn mint(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        bank: &mut AssetBank,
        caller: &Address,
        amount: u128,
    ) -> Result<()> {
        let target = caller.clone();
        self.mint_for(registry, market, bank, &target, caller, amount)
    }

    pub fn mint_on_avatar(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        bank: &mut AssetBank,
        caller: &Address,
        avatar: &Address,
        amount: u128,
    ) -> Result<()> {
        let owner = self.owner_of_avatar(registry, avatar)?;
        self.mint_for(registry, market, bank, &owner, caller, amount)
    }

    fn mint_for(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        bank: &mut AssetBank,
        target: &Address,
        caller: &Address,
        amount: u128,
    ) -> Result<()> {
        let avatar = self.resolve_authorized(registry, target, caller)?;
        avatar.pull(bank, &self.market, &self.underlying, caller, amount)?;
        let code = avatar.do_mint(market, &self.market, amount);
        if code != codes::NO_ERROR {
            // A failed deposit must not leave pulled asset stranded
            avatar.push_back(bank, &self.market, &self.underlying, caller, amount)?;
            return Err(ProtocolError::Market { op: "mint", code });
        }
        debug!(symbol = %self.symbol, target = %target, caller = %caller, amount, "mint");
        Ok(())
    }

    // ---- redeem --------------------------------------------------------

    pub fn redeem(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        bank: &mut AssetBank,
        caller: &Address,
        shares: u128,
    ) -> Result<()> {
        let target = caller.clone();
        self.redeem_for(registry, market, bank, &target, caller, shares)
    }

    pub fn redeem_on_avatar(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        bank: &mut AssetBank,
        caller: &Address,
        avatar: &Address,
        shares: u128,
    ) -> Result<()> {
        let owner = self.owner_of_avatar(registry, avatar)?;
        self.redeem_for(registry, market, bank, &owner, caller, shares)
    }

    fn redeem_for(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        bank: &mut AssetBank,
        target: &Address,
        caller: &Address,
        shares: u128,
    ) -> Result<()> {
        let avatar = self.resolve_authorized(registry, target, caller)?;
        let rate = market.exchange_rate(&self.market);
        let underlying = mul_div(shares, rate, EXP_SCALE).ok_or(ProtocolError::Overflow)?;
        let code = avatar.do_redeem(market, &self.market, shares);
        if code != codes::NO_ERROR {
            return Err(ProtocolError::Market { op: "redeem", code });
        }
        // Proceeds go to the initiating caller: the delegatee in the
        // on-behalf path
        self.payout(market, bank, &avatar, caller, underlying)
    }

    pub fn redeem_underlying(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        bank: &mut AssetBank,
        caller: &Address,
        amount: u128,
    ) -> Result<()> {
        let target = caller.clone();
        self.redeem_underlying_for(registry, market, bank, &target, caller, amount)
    }

    pub fn redeem_underlying_on_avatar(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        bank: &mut AssetBank,
        caller: &Address,
        avatar: &Address,
        amount: u128,
    ) -> Result<()> {
        let owner = self.owner_of_avatar(registry, avatar)?;
        self.redeem_underlying_for(registry, market, bank, &owner, caller, amount)
    }

    fn redeem_underlying_for(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        bank: &mut AssetBank,
        target: &Address,
        caller: &Address,
        amount: u128,
    ) -> Result<()> {
        let avatar = self.resolve_authorized(registry, target, caller)?;
        let code = avatar.do_redeem_underlying(market, &self.market, amount);
        if code != codes::NO_ERROR {
            return Err(ProtocolError::Market { op: "redeemUnderlying", code });
        }
        self.payout(market, bank, &avatar, caller, amount)
    }

    /// Move withdrawn underlying from the treasury to its recipient. A
    /// failed credit restores the withdrawn position so nothing is left
    /// half-applied.
    fn payout(
        &self,
        market: &mut dyn MoneyMarket,
        bank: &mut AssetBank,
        avatar: &Avatar,
        to: &Address,
        underlying: u128,
    ) -> Result<()> {
        if let Err(e) =
            bank.transfer(&treasury_address(&self.market), to, &self.underlying, underlying)
        {
            avatar.do_mint(market, &self.market, underlying);
            return Err(e);
        }
        Ok(())
    }

    // ---- borrow --------------------------------------------------------

    pub fn borrow(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        bank: &mut AssetBank,
        caller: &Address,
        amount: u128,
    ) -> Result<()> {
        let target = caller.clone();
        self.borrow_for(registry, market, bank, &target, caller, amount)
    }

    pub fn borrow_on_avatar(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        bank: &mut AssetBank,
        caller: &Address,
        avatar: &Address,
        amount: u128,
    ) -> Result<()> {
        let owner = self.owner_of_avatar(registry, avatar)?;
        self.borrow_for(registry, market, bank, &owner, caller, amount)
    }

    fn borrow_for(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        bank: &mut AssetBank,
        target: &Address,
        caller: &Address,
        amount: u128,
    ) -> Result<()> {
        let avatar = self.resolve_authorized(registry, target, caller)?;
        let code = avatar.do_borrow(market, &self.market, amount);
        if code != codes::NO_ERROR {
            return Err(ProtocolError::BorrowFailed(code));
        }
        // Funds are delivered to the initiating caller
        if let Err(e) =
            bank.transfer(&treasury_address(&self.market), caller, &self.underlying, amount)
        {
            avatar.do_repay(market, &self.market, amount);
            return Err(e);
        }
        debug!(symbol = %self.symbol, target = %target, caller = %caller, amount, "borrow");
        Ok(())
    }

    // ---- repay ---------------------------------------------------------

    pub fn repay_borrow(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        bank: &mut AssetBank,
        caller: &Address,
        amount: u128,
    ) -> Result<()> {
        let target = caller.clone();
        self.repay_for(registry, market, bank, &target, caller, amount)
    }

    pub fn repay_borrow_on_avatar(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        bank: &mut AssetBank,
        caller: &Address,
        avatar: &Address,
        amount: u128,
    ) -> Result<()> {
        let owner = self.owner_of_avatar(registry, avatar)?;
        self.repay_for(registry, market, bank, &owner, caller, amount)
    }

    fn repay_for(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        bank: &mut AssetBank,
        target: &Address,
        caller: &Address,
        amount: u128,
    ) -> Result<()> {
        let avatar = self.resolve_authorized(registry, target, caller)?;
        let debt = avatar.borrow_balance(market, &self.market);
        let pay = match self.kind {
            // Fungible: overpayment is rejected outright, nothing pulled
            TokenKind::Fungible if amount > debt => {
                return Err(ProtocolError::Market {
                    op: "repayBorrow",
                    code: codes::REPAY_EXCEEDS_DEBT,
                });
            }
            TokenKind::Fungible => amount,
            // Native: cap at the outstanding debt; the excess never leaves
            // the caller's wallet, which is the refund
            TokenKind::Native if debt == 0 => {
                return Err(ProtocolError::Market {
                    op: "repayBorrow",
                    code: codes::REPAY_EXCEEDS_DEBT,
                });
            }
            TokenKind::Native => amount.min(debt),
        };
        avatar.pull(bank, &self.market, &self.underlying, caller, pay)?;
        let code = avatar.do_repay(market, &self.market, pay);
        if code != codes::NO_ERROR {
            avatar.push_back(bank, &self.market, &self.underlying, caller, pay)?;
            return Err(ProtocolError::Market { op: "repayBorrow", code });
        }
        debug!(symbol = %self.symbol, target = %target, caller = %caller, pay, "repay");
        Ok(())
    }

    // ---- transfer / approve -------------------------------------------

    pub fn transfer(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        caller: &Address,
        to: &Address,
        shares: u128,
    ) -> Result<()> {
        let target = caller.clone();
        self.transfer_for(registry, market, &target, caller, to, shares)
    }

    pub fn transfer_on_avatar(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        caller: &Address,
        avatar: &Address,
        to: &Address,
        shares: u128,
    ) -> Result<()> {
        let owner = self.owner_of_avatar(registry, avatar)?;
        self.transfer_for(registry, market, &owner, caller, to, shares)
    }

    fn transfer_for(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        target: &Address,
        caller: &Address,
        to: &Address,
        shares: u128,
    ) -> Result<()> {
        let avatar = self.resolve_authorized(registry, target, caller)?;
        if market.share_balance(&self.market, &avatar.address) < shares {
            return Err(ProtocolError::Market {
                op: "transfer",
                code: codes::INSUFFICIENT_BALANCE,
            });
        }
        // The central no-avatar-of-avatar enforcement point: a transfer
        // target is exactly the kind of new mapping the registry refuses to
        // create for an avatar address
        let to_avatar = registry.get_or_create_avatar(to)?;
        if to_avatar == avatar.address {
            return Err(ProtocolError::SelfTransfer);
        }
        let code = avatar.do_transfer(market, &self.market, &to_avatar, shares);
        match code {
            codes::NO_ERROR => {
                debug!(symbol = %self.symbol, from = %target, to = %to, shares, "transfer");
                Ok(())
            }
            codes::SELF_TRANSFER => Err(ProtocolError::SelfTransfer),
            code => Err(ProtocolError::Market { op: "transfer", code }),
        }
    }

    pub fn approve(
        &mut self,
        registry: &mut Registry,
        caller: &Address,
        spender: &Address,
        shares: u128,
    ) -> Result<()> {
        let target = caller.clone();
        self.approve_for(registry, &target, caller, spender, shares)
    }

    pub fn approve_on_avatar(
        &mut self,
        registry: &mut Registry,
        caller: &Address,
        avatar: &Address,
        spender: &Address,
        shares: u128,
    ) -> Result<()> {
        let owner = self.owner_of_avatar(registry, avatar)?;
        self.approve_for(registry, &owner, caller, spender, shares)
    }

    fn approve_for(
        &mut self,
        registry: &mut Registry,
        target: &Address,
        caller: &Address,
        spender: &Address,
        shares: u128,
    ) -> Result<()> {
        let avatar = self.resolve_authorized(registry, target, caller)?;
        let spender_avatar = registry.get_or_create_avatar(spender)?;
        self.allowances
            .insert((avatar.address, spender_avatar), shares);
        Ok(())
    }

    pub fn transfer_from(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        caller: &Address,
        owner: &Address,
        to: &Address,
        shares: u128,
    ) -> Result<()> {
        let target = caller.clone();
        self.transfer_from_for(registry, market, &target, caller, owner, to, shares)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn transfer_from_on_avatar(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        caller: &Address,
        spender_avatar: &Address,
        owner: &Address,
        to: &Address,
        shares: u128,
    ) -> Result<()> {
        let spender = self.owner_of_avatar(registry, spender_avatar)?;
        self.transfer_from_for(registry, market, &spender, caller, owner, to, shares)
    }

    #[allow(clippy::too_many_arguments)]
    fn transfer_from_for(
        &mut self,
        registry: &mut Registry,
        market: &mut dyn MoneyMarket,
        spender: &Address,
        caller: &Address,
        owner: &Address,
        to: &Address,
        shares: u128,
    ) -> Result<()> {
        let spender_avatar = self.resolve_authorized(registry, spender, caller)?;
        // No avatar for the owner means no allowance was ever granted
        let owner_avatar = registry
            .avatar_of(owner)
            .cloned()
            .ok_or(ProtocolError::InsufficientAllowance)?;
        let key = (owner_avatar.clone(), spender_avatar.address.clone());
        let allowed = self.allowances.get(&key).copied().unwrap_or(0);
        if allowed < shares {
            return Err(ProtocolError::InsufficientAllowance);
        }
        let to_avatar = registry.get_or_create_avatar(to)?;
        if to_avatar == owner_avatar {
            return Err(ProtocolError::SelfTransfer);
        }
        let code = market.transfer_shares(&self.market, &owner_avatar, &to_avatar, shares);
        match code {
            codes::NO_ERROR => {
                self.allowances.insert(key, allowed - shares);
                debug!(symbol = %self.symbol, owner = %owner, to = %to, shares, "transferFrom");
                Ok(())
            }
            codes::SELF_TRANSFER => Err(ProtocolError::SelfTransfer),
            code => Err(ProtocolError::Market { op: "transferFrom", code }),
        }
    }

    // ---- read-through views -------------------------------------------

    pub fn balance_of(&self, registry: &Registry, market: &dyn MoneyMarket, user: &Address) -> u128 {
        registry
            .avatar_of(user)
            .map(|a| market.share_balance(&self.market, a))
            .unwrap_or(0)
    }

    pub fn balance_of_underlying(
        &self,
        registry: &Registry,
        market: &dyn MoneyMarket,
        user: &Address,
    ) -> u128 {
        registry
            .avatar_of(user)
            .map(|a| market.underlying_balance(&self.market, a))
            .unwrap_or(0)
    }

    pub fn borrow_balance_current(
        &self,
        registry: &Registry,
        market: &dyn MoneyMarket,
        user: &Address,
    ) -> u128 {
        registry
            .avatar_of(user)
            .map(|a| market.borrow_balance(&self.market, a))
            .unwrap_or(0)
    }

    pub fn allowance(&self, registry: &Registry, owner: &Address, spender: &Address) -> u128 {
        match (registry.avatar_of(owner), registry.avatar_of(spender)) {
            (Some(o), Some(s)) => self
                .allowances
                .get(&(o.clone(), s.clone()))
                .copied()
                .unwrap_or(0),
            _ => 0,
        }
    }

    pub fn total_supply(&self, market: &dyn MoneyMarket) -> u128 {
        market.total_shares(&self.market)
    }

    pub fn exchange_rate_current(&self, market: &dyn MoneyMarket) -> u128 {
        market.exchange_rate(&self.market)
    }
}
