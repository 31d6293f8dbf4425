//! Avatar identity and delegation
//!
//! The registry is the single source of truth for who owns which avatar and
//! who may act for it. Avatars are created lazily, at most once per user,
//! and are never destroyed. Each avatar has at most one delegatee at a time;
//! delegating again replaces the previous delegatee.

use crate::error::{ProtocolError, Result};
use crate::types::Address;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Registry {
    id: u64,
    /// user -> avatar
    avatars: HashMap<Address, Address>,
    /// avatar -> owning user
    owners: HashMap<Address, Address>,
    /// avatar -> current delegatee (one slot, overwrite on re-delegate)
    delegates: HashMap<Address, Address>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            avatars: HashMap::new(),
            owners: HashMap::new(),
            delegates: HashMap::new(),
        }
    }

    /// Process-unique instance id, used by the comptroller wiring check
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Pure lookup, `None` when the user has no avatar yet
    pub fn avatar_of(&self, user: &Address) -> Option<&Address> {
        self.avatars.get(user)
    }

    /// Reverse lookup from an avatar address to its owning user
    pub fn owner_of(&self, avatar: &Address) -> Option<&Address> {
        self.owners.get(avatar)
    }

    pub fn is_avatar(&self, addr: &Address) -> bool {
        self.owners.contains_key(addr)
    }

    pub fn avatar_count(&self) -> usize {
        self.owners.len()
    }

    /// Explicit creation path. Idempotent per caller.
    pub fn new_avatar(&mut self, caller: &Address) -> Result<Address> {
        self.get_or_create_avatar(caller)
    }

    /// Get-or-create for any operation target. Enforces the
    /// no-avatar-of-avatar invariant and is safe to call repeatedly: the
    /// derived address is the same regardless of which entry point created
    /// it first.
    pub fn get_or_create_avatar(&mut self, user: &Address) -> Result<Address> {
        if self.is_avatar(user) {
            return Err(ProtocolError::AvatarOfAvatar(user.clone()));
        }
        if let Some(avatar) = self.avatars.get(user) {
            return Ok(avatar.clone());
        }
        let avatar = derive_avatar_address(user);
        self.avatars.insert(user.clone(), avatar.clone());
        self.owners.insert(avatar.clone(), user.clone());
        info!(user = %user, avatar = %avatar, "avatar created");
        Ok(avatar)
    }

    /// Set or replace the caller's delegatee. Lazily creates the caller's
    /// avatar when missing.
    pub fn delegate_avatar(&mut self, caller: &Address, delegatee: &Address) -> Result<()> {
        let avatar = self.get_or_create_avatar(caller)?;
        self.delegates.insert(avatar.clone(), delegatee.clone());
        info!(avatar = %avatar, delegatee = %delegatee, "delegatee set");
        Ok(())
    }

    /// Clear the caller's delegatee slot
    pub fn revoke_delegate(&mut self, caller: &Address) -> Result<()> {
        let avatar = self
            .avatars
            .get(caller)
            .cloned()
            .ok_or_else(|| ProtocolError::UnknownAvatar(caller.clone()))?;
        self.delegates.remove(&avatar);
        info!(avatar = %avatar, "delegatee revoked");
        Ok(())
    }

    pub fn delegate_of(&self, avatar: &Address) -> Option<&Address> {
        self.delegates.get(avatar)
    }

    /// Authorization predicate: true iff `who` owns the avatar or is its
    /// current delegatee
    pub fn delegate(&self, avatar: &Address, who: &Address) -> bool {
        if self.owners.get(avatar) == Some(who) {
            return true;
        }
        self.delegates.get(avatar) == Some(who)
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

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic avatar address for a user: first 20 bytes of
/// sha256("avatar:" || user), hex encoded
fn derive_avatar_address(user: &Address) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(b"avatar:");
    hasher.update(user.as_bytes());
    let digest = hasher.finalize();
    format!("0x{}", hex::encode(&digest[..20]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.to_string()
    }

    #[test]
    fn test_idempotent_creation() {
        let mut reg = Registry::new();
        let a1 = reg.new_avatar(&addr("user1")).unwrap();
        let a2 = reg.new_avatar(&addr("user1")).unwrap();
        assert_eq!(a1, a2);
        assert_eq!(reg.avatar_count(), 1);

        // Implicit path resolves to the same address
        let a3 = reg.get_or_create_avatar(&addr("user1")).unwrap();
        assert_eq!(a1, a3);
    }

    #[test]
    fn test_same_address_regardless_of_entry_point() {
        let mut reg1 = Registry::new();
        let mut reg2 = Registry::new();
        let explicit = reg1.new_avatar(&addr("user1")).unwrap();
        let implicit = reg2.get_or_create_avatar(&addr("user1")).unwrap();
        assert_eq!(explicit, implicit);
    }

    #[test]
    fn test_no_avatar_of_avatar() {
        let mut reg = Registry::new();
        let avatar = reg.new_avatar(&addr("user1")).unwrap();
        assert_eq!(
            reg.new_avatar(&avatar),
            Err(ProtocolError::AvatarOfAvatar(avatar.clone()))
        );
        assert_eq!(
            reg.get_or_create_avatar(&avatar),
            Err(ProtocolError::AvatarOfAvatar(avatar))
        );
    }

    #[test]
    fn test_owner_lookup() {
        let mut reg = Registry::new();
        let avatar = reg.new_avatar(&addr("user1")).unwrap();
        assert_eq!(reg.owner_of(&avatar), Some(&addr("user1")));
        assert!(reg.is_avatar(&avatar));
        assert!(!reg.is_avatar(&addr("user1")));
    }

    #[test]
    fn test_single_delegate_slot() {
        let mut reg = Registry::new();
        reg.delegate_avatar(&addr("user1"), &addr("d1")).unwrap();
        let avatar = reg.avatar_of(&addr("user1")).unwrap().clone();

        assert!(reg.delegate(&avatar, &addr("d1")));
        assert!(reg.delegate(&avatar, &addr("user1"))); // owner always passes
        assert!(!reg.delegate(&avatar, &addr("d2")));

        // Re-delegating replaces the slot
        reg.delegate_avatar(&addr("user1"), &addr("d2")).unwrap();
        assert!(!reg.delegate(&avatar, &addr("d1")));
        assert!(reg.delegate(&avatar, &addr("d2")));
    }

    #[test]
    fn test_revoke_delegate() {
        let mut reg = Registry::new();
        reg.delegate_avatar(&addr("user1"), &addr("d1")).unwrap();
        let avatar = reg.avatar_of(&addr("user1")).unwrap().clone();

        reg.revoke_delegate(&addr("user1")).unwrap();
        assert!(!reg.delegate(&avatar, &addr("d1")));
        assert!(reg.delegate(&avatar, &addr("user1")));

        assert!(reg.revoke_delegate(&addr("nobody")).is_err());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut reg = Registry::new();
        let avatar = reg.new_avatar(&addr("user1")).unwrap();
        reg.delegate_avatar(&addr("user1"), &addr("d1")).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        reg.save(path.to_str().unwrap()).unwrap();

        let loaded = Registry::load(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.avatar_of(&addr("user1")), Some(&avatar));
        assert!(loaded.delegate(&avatar, &addr("d1")));
    }
}
