//! Per-user proxy account
//!
//! An avatar is the address that actually holds positions in the money
//! market. It forwards market calls 1:1 on behalf of its own address and
//! surfaces raw result codes unmodified; interpreting them is the wrapper's
//! job. Avatars hold no independent funds: asset pulled for a deposit goes
//! straight to the market treasury.

use crate::bank::AssetBank;
use crate::error::Result;
use crate::market::{treasury_address, MoneyMarket};
use crate::types::{Address, Asset, MarketId, ResultCode};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Avatar {
    pub address: Address,
}

impl Avatar {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Move underlying from a wallet into the market treasury ahead of a
    /// mint or repay. The asset originates from the end user's wallet, never
    /// from the avatar itself.
    pub fn pull(
        &self,
        bank: &mut AssetBank,
        market: &MarketId,
        asset: &Asset,
        from: &Address,
        amount: u128,
    ) -> Result<()> {
        bank.transfer(from, &treasury_address(market), asset, amount)
    }

    /// Return pulled underlying to a wallet (rollback path)
    pub fn push_back(
        &self,
        bank: &mut AssetBank,
        market: &MarketId,
        asset: &Asset,
        to: &Address,
        amount: u128,
    ) -> Result<()> {
        bank.transfer(&treasury_address(market), to, asset, amount)
    }

    pub fn do_mint(&self, market: &mut dyn MoneyMarket, id: &MarketId, amount: u128) -> ResultCode {
        market.deposit(id, &self.address, amount)
    }

    pub fn do_redeem(
        &self,
        market: &mut dyn MoneyMarket,
        id: &MarketId,
        shares: u128,
    ) -> ResultCode {
        market.withdraw(id, &self.address, shares)
    }

    pub fn do_redeem_underlying(
        &self,
        market: &mut dyn MoneyMarket,
        id: &MarketId,
        amount: u128,
    ) -> ResultCode {
        market.withdraw_underlying(id, &self.address, amount)
    }

    pub fn do_borrow(
        &self,
        market: &mut dyn MoneyMarket,
        id: &MarketId,
        amount: u128,
    ) -> ResultCode {
        market.borrow(id, &self.address, amount)
    }

    pub fn do_repay(
        &self,
        market: &mut dyn MoneyMarket,
        id: &MarketId,
        amount: u128,
    ) -> ResultCode {
        market.repay(id, &self.address, amount)
    }

    pub fn do_transfer(
        &self,
        market: &mut dyn MoneyMarket,
        id: &MarketId,
        to_avatar: &Address,
        shares: u128,
    ) -> ResultCode {
        market.transfer_shares(id, &self.address, to_avatar, shares)
    }

    pub fn share_balance(&self, market: &dyn MoneyMarket, id: &MarketId) -> u128 {
        market.share_balance(id, &self.address)
    }

    pub fn borrow_balance(&self, market: &dyn MoneyMarket, id: &MarketId) -> u128 {
        market.borrow_balance(id, &self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::memory::InMemoryMarket;
    use crate::market::codes;
    use crate::types::{whole, EXP_SCALE};

    #[test]
    fn test_forwarding_surfaces_raw_codes() {
        let mut market = InMemoryMarket::new(50);
        let id = "cBAT".to_string();
        market.list_market(&id, EXP_SCALE);

        let avatar = Avatar::new("0xabc".to_string());
        assert_eq!(avatar.do_mint(&mut market, &id, whole(100)), codes::NO_ERROR);
        assert_eq!(avatar.share_balance(&market, &id), market.share_balance(&id, &avatar.address));

        // Market failure comes back verbatim
        assert_eq!(
            avatar.do_repay(&mut market, &id, whole(1)),
            codes::REPAY_EXCEEDS_DEBT
        );
    }

    #[test]
    fn test_pull_moves_wallet_funds_to_treasury() {
        let mut bank = AssetBank::new();
        let id = "cBAT".to_string();
        let bat = "BAT".to_string();
        bank.set_balance(&"user1".to_string(), &bat, whole(10));

        let avatar = Avatar::new("0xabc".to_string());
        avatar
            .pull(&mut bank, &id, &bat, &"user1".to_string(), whole(4))
            .unwrap();
        assert_eq!(bank.balance_of(&"user1".to_string(), &bat), whole(6));
        assert_eq!(
            bank.balance_of(&treasury_address(&id), &bat),
            whole(4)
        );

        avatar
            .push_back(&mut bank, &id, &bat, &"user1".to_string(), whole(4))
            .unwrap();
        assert_eq!(bank.balance_of(&"user1".to_string(), &bat), whole(10));
    }
}
