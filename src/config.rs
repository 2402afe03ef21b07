use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceLevelSeed {
    pub price: f64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitialDepth {
    #[serde(default)]
    pub bids: Vec<PriceLevelSeed>,
    #[serde(default)]
    pub asks: Vec<PriceLevelSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolConfig {
    pub symbol: String,
    #[serde(default = "default_max_depth_levels")]
    pub max_depth_levels: usize,
    #[serde(default)]
    pub initial_depth: InitialDepth,
}

fn default_max_depth_levels() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub min_order_size: u32,
    pub max_order_size: u32,
    pub price_variance: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            enabled: false,
            interval_ms: 100,
            min_order_size: 1,
            max_order_size: 10,
            price_variance: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub symbols: Vec<SymbolConfig>,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        Ok(config)
    }
}
