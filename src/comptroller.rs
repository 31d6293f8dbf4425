//! Wrapper-token factory and wiring
//!
//! One wrapper per market, registered exactly once; re-registering the same
//! market returns the existing wrapper instead of duplicating it. The
//! registry must be bound before any wrapper is created, and every wrapper
//! created afterwards implicitly shares that one registry.

use crate::btoken::BToken;
use crate::error::{ProtocolError, Result};
use crate::registry::Registry;
use crate::types::{Asset, MarketId};
use std::collections::HashMap;
use tracing::info;

#[derive(Clone, Debug, Default)]
pub struct BComptroller {
    registry_id: Option<u64>,
    btokens: HashMap<MarketId, BToken>,
}

impl BComptroller {
    pub fn new() -> Self {
        Self {
            registry_id: None,
            btokens: HashMap::new(),
        }
    }

    /// One-time wiring. Re-binding the same registry is a no-op; a different
    /// one is rejected so existing wrappers can never point at two
    /// registries.
    pub fn set_registry(&mut self, registry: &Registry) -> Result<()> {
        match self.registry_id {
            None => {
                self.registry_id = Some(registry.id());
                info!(registry = registry.id(), "comptroller bound to registry");
                Ok(())
            }
            Some(id) if id == registry.id() => Ok(()),
            Some(_) => Err(ProtocolError::RegistryMismatch),
        }
    }

    pub fn registry_id(&self) -> Option<u64> {
        self.registry_id
    }

    /// Deploy (or return) the fungible wrapper for a market
    pub fn new_btoken(
        &mut self,
        market: &MarketId,
        underlying: &Asset,
        name: &str,
        symbol: &str,
    ) -> Result<&mut BToken> {
        if self.registry_id.is_none() {
            return Err(ProtocolError::RegistryNotSet);
        }
        Ok(self.btokens.entry(market.clone()).or_insert_with(|| {
            info!(market = %market, symbol = %symbol, "wrapper deployed");
            BToken::fungible(
                market.clone(),
                underlying.clone(),
                name.to_string(),
                symbol.to_string(),
            )
        }))
    }

    /// Deploy (or return) the native-asset wrapper for a market
    pub fn new_bether(&mut self, market: &MarketId, name: &str, symbol: &str) -> Result<&mut BToken> {
        if self.registry_id.is_none() {
            return Err(ProtocolError::RegistryNotSet);
        }
        Ok(self.btokens.entry(market.clone()).or_insert_with(|| {
            info!(market = %market, symbol = %symbol, "native wrapper deployed");
            BToken::native(market.clone(), name.to_string(), symbol.to_string())
        }))
    }

    pub fn btoken(&self, market: &MarketId) -> Option<&BToken> {
        self.btokens.get(market)
    }

    pub fn btoken_mut(&mut self, market: &MarketId) -> Option<&mut BToken> {
        self.btokens.get_mut(market)
    }

    pub fn markets(&self) -> Vec<&MarketId> {
        self.btokens.keys().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_registry() {
        let mut comp = BComptroller::new();
        assert_eq!(
            comp.new_btoken(&"cZRX".to_string(), &"ZRX".to_string(), "B ZRX", "bZRX")
                .unwrap_err(),
            ProtocolError::RegistryNotSet
        );
    }

    #[test]
    fn test_registry_binding_is_one_time() {
        let mut comp = BComptroller::new();
        let reg1 = Registry::new();
        let reg2 = Registry::new();

        comp.set_registry(&reg1).unwrap();
        comp.set_registry(&reg1).unwrap(); // same registry: no-op
        assert_eq!(comp.set_registry(&reg2), Err(ProtocolError::RegistryMismatch));
        assert_eq!(comp.registry_id(), Some(reg1.id()));
    }

    #[test]
    fn test_wrapper_registration_is_idempotent() {
        let mut comp = BComptroller::new();
        let reg = Registry::new();
        comp.set_registry(&reg).unwrap();

        comp.new_btoken(&"cZRX".to_string(), &"ZRX".to_string(), "B ZRX", "bZRX")
            .unwrap();
        // Second registration returns the existing wrapper, names unchanged
        let again = comp
            .new_btoken(&"cZRX".to_string(), &"ZRX".to_string(), "other name", "oZRX")
            .unwrap();
        assert_eq!(again.symbol(), "bZRX");
        assert_eq!(comp.markets().len(), 1);
    }

    #[test]
    fn test_native_wrapper() {
        let mut comp = BComptroller::new();
        let reg = Registry::new();
        comp.set_registry(&reg).unwrap();

        let beth = comp.new_bether(&"cETH".to_string(), "B Ether", "bETH").unwrap();
        assert_eq!(beth.underlying(), crate::btoken::NATIVE_ASSET);
        assert!(comp.btoken(&"cETH".to_string()).is_some());
    }
}
