//! Underlying-asset wallet ledger
//!
//! Plays the role the underlying token contracts play for the wrapper: it
//! tracks who holds how much of each underlying asset outside the money
//! market. Each market has a treasury address holding the cash that backs
//! deposits.

use crate::error::{ProtocolError, Result};
use crate::types::{Address, Asset};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Balances of every underlying asset, keyed asset -> holder -> amount
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AssetBank {
    balances: HashMap<Asset, HashMap<Address, u128>>,
}

impl AssetBank {
    pub fn new() -> Self {
        Self {
            balances: HashMap::new(),
        }
    }

    pub fn balance_of(&self, holder: &Address, asset: &Asset) -> u128 {
        self.balances
            .get(asset)
            .and_then(|m| m.get(holder))
            .copied()
            .unwrap_or(0)
    }

    pub fn credit(&mut self, holder: &Address, asset: &Asset, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let entry = self
            .balances
            .entry(asset.clone())
            .or_default()
            .entry(holder.clone())
            .or_insert(0);
        *entry = entry.checked_add(amount).ok_or(ProtocolError::Overflow)?;
        Ok(())
    }

    pub fn debit(&mut self, holder: &Address, asset: &Asset, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let holders = self
            .balances
            .get_mut(asset)
            .ok_or_else(|| ProtocolError::InsufficientFunds(asset.clone()))?;
        let current = holders.get(holder).copied().unwrap_or(0);
        if current < amount {
            return Err(ProtocolError::InsufficientFunds(asset.clone()));
        }
        let remaining = current - amount;
        if remaining == 0 {
            holders.remove(holder);
        } else {
            holders.insert(holder.clone(), remaining);
        }
        Ok(())
    }

    pub fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        asset: &Asset,
        amount: u128,
    ) -> Result<()> {
        self.debit(from, asset, amount)?;
        if let Err(e) = self.credit(to, asset, amount) {
            // Rollback the debit so a failed credit leaves no movement
            self.credit(from, asset, amount).ok();
            return Err(e);
        }
        Ok(())
    }

    /// Provision a balance directly (genesis / test-harness funding)
    pub fn set_balance(&mut self, holder: &Address, asset: &Asset, amount: u128) {
        let holders = self.balances.entry(asset.clone()).or_default();
        if amount == 0 {
            holders.remove(holder);
        } else {
            holders.insert(holder.clone(), amount);
        }
    }

    pub fn total_supply(&self, asset: &Asset) -> u128 {
        self.balances
            .get(asset)
            .map(|m| m.values().sum())
            .unwrap_or(0)
    }

    pub fn load(path: &str) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| ProtocolError::Io(e.to_string()))?;
        serde_json::from_str(&data).map_err(|e| ProtocolError::Parse(e.to_string()))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let data =
            serde_json::to_string_pretty(self).map_err(|e| ProtocolError::Parse(e.to_string()))?;
        std::fs::write(path, data).map_err(|e| ProtocolError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.to_string()
    }

    #[test]
    fn test_credit_debit() {
        let mut bank = AssetBank::new();
        bank.credit(&addr("alice"), &"BAT".to_string(), 1000).unwrap();
        assert_eq!(bank.balance_of(&addr("alice"), &"BAT".to_string()), 1000);

        bank.debit(&addr("alice"), &"BAT".to_string(), 300).unwrap();
        assert_eq!(bank.balance_of(&addr("alice"), &"BAT".to_string()), 700);

        assert_eq!(
            bank.debit(&addr("alice"), &"BAT".to_string(), 1000),
            Err(ProtocolError::InsufficientFunds("BAT".to_string()))
        );
    }

    #[test]
    fn test_transfer() {
        let mut bank = AssetBank::new();
        bank.credit(&addr("alice"), &"BAT".to_string(), 1000).unwrap();
        bank.transfer(&addr("alice"), &addr("bob"), &"BAT".to_string(), 400)
            .unwrap();
        assert_eq!(bank.balance_of(&addr("alice"), &"BAT".to_string()), 600);
        assert_eq!(bank.balance_of(&addr("bob"), &"BAT".to_string()), 400);
    }

    #[test]
    fn test_transfer_insufficient_leaves_state() {
        let mut bank = AssetBank::new();
        bank.credit(&addr("alice"), &"BAT".to_string(), 10).unwrap();
        assert!(bank
            .transfer(&addr("alice"), &addr("bob"), &"BAT".to_string(), 11)
            .is_err());
        assert_eq!(bank.balance_of(&addr("alice"), &"BAT".to_string()), 10);
        assert_eq!(bank.balance_of(&addr("bob"), &"BAT".to_string()), 0);
    }

    #[test]
    fn test_total_supply() {
        let mut bank = AssetBank::new();
        bank.set_balance(&addr("alice"), &"ZRX".to_string(), 1000);
        bank.set_balance(&addr("bob"), &"ZRX".to_string(), 500);
        assert_eq!(bank.total_supply(&"ZRX".to_string()), 1500);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut bank = AssetBank::new();
        bank.set_balance(&addr("alice"), &"BAT".to_string(), 42);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.json");
        bank.save(path.to_str().unwrap()).unwrap();

        let loaded = AssetBank::load(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.balance_of(&addr("alice"), &"BAT".to_string()), 42);
    }
}
