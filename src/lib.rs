pub mod avatar;
pub mod bank;
pub mod btoken;
pub mod comptroller;
pub mod config;
pub mod error;
pub mod market;
pub mod registry;
pub mod types;

pub use avatar::Avatar;
pub use bank::AssetBank;
pub use btoken::{BToken, TokenKind, NATIVE_ASSET};
pub use comptroller::BComptroller;
pub use config::ProtocolConfig;
pub use error::{ProtocolError, Result};
pub use market::{memory::InMemoryMarket, MoneyMarket};
pub use registry::Registry;
