use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProtocolConfig {
    pub node: NodeConfig,
    pub market: MarketConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeConfig {
    pub log_level: String,
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

fn default_state_dir() -> String {
    "./data".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MarketConfig {
    /// Fraction of deposited value usable as borrow collateral, in percent
    pub collateral_factor_percent: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                log_level: "info".to_string(),
                state_dir: "./data".to_string(),
            },
            market: MarketConfig {
                collateral_factor_percent: 50,
            },
        }
    }
}

impl ProtocolConfig {
    pub fn load_or_default(path: &str) -> Self {
        if std::path::Path::new(path).exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => {
                        tracing::info!("Config loaded from {}", path);
                        c
                    }
                    Err(e) => {
                        tracing::warn!("Error parsing config: {}. Using defaults.", e);
                        Self::default()
                    }
                },
                Err(e) => {
                    tracing::warn!("Error reading config: {}. Using defaults.", e);
                    Self::default()
                }
            }
        } else {
            let config = Self::default();
            if let Ok(s) = toml::to_string_pretty(&config) {
                let _ = std::fs::write(path, s);
            }
            config
        }
    }
}
