use crate::types::{Address, Asset, MarketId, ResultCode};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("delegatee not authorized")]
    DelegateeNotAuthorized,
    #[error("cannot create an avatar of an avatar: {0}")]
    AvatarOfAvatar(Address),
    #[error("{op} rejected by market (code {code})")]
    Market { op: &'static str, code: ResultCode },
    #[error("borrow failed (code {0})")]
    BorrowFailed(ResultCode),
    #[error("transfer target resolves to the source avatar")]
    SelfTransfer,
    #[error("insufficient {0} balance")]
    InsufficientFunds(Asset),
    #[error("amount overflow")]
    Overflow,
    #[error("insufficient allowance")]
    InsufficientAllowance,
    #[error("no avatar registered at {0}")]
    UnknownAvatar(Address),
    #[error("unknown market: {0}")]
    UnknownMarket(MarketId),
    #[error("comptroller registry not set")]
    RegistryNotSet,
    #[error("comptroller already bound to a different registry")]
    RegistryMismatch,
    #[error("snapshot io error: {0}")]
    Io(String),
    #[error("snapshot parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
