use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Agent configuration loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// REST API base URL
    pub rest_url: String,
    /// WebSocket base URL
    pub ws_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    /// Traded instrument
    pub symbol: String,
    /// Asset whose balance is tracked; defaults to the quote asset
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default = "default_depth_limit")]
    pub depth_limit: u32,
    #[serde(default = "default_depth_queue")]
    pub depth_queue: usize,
    #[serde(default = "default_timeframe")]
    pub cluster_timeframe_minutes: u32,
    #[serde(default = "default_timeframe")]
    pub candle_interval_minutes: u32,
    #[serde(default = "default_candle_seed")]
    pub candle_seed_limit: u32,
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
}

fn default_depth_limit() -> u32 {
    1000
}

fn default_depth_queue() -> usize {
    10
}

fn default_timeframe() -> u32 {
    5
}

fn default_candle_seed() -> u32 {
    100
}

fn default_retry_budget() -> u32 {
    1
}

/// Load configuration from a JSON file
pub fn load_config(path: impl AsRef<Path>) -> Result<AgentConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config: AgentConfig = serde_json::from_str(
            r#"{
                "rest_url": "https://fapi.binance.com",
                "ws_url": "wss://fstream.binance.com",
                "symbol": "BTCUSDT"
            }"#,
        )
        .unwrap();

        assert_eq!(config.depth_limit, 1000);
        assert_eq!(config.depth_queue, 10);
        assert_eq!(config.cluster_timeframe_minutes, 5);
        assert_eq!(config.retry_budget, 1);
        assert!(config.asset.is_none());
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn test_missing_required_field_fails() {
        let result: Result<AgentConfig, _> = serde_json::from_str(r#"{"symbol": "BTCUSDT"}"#);
        assert!(result.is_err());
    }
}
