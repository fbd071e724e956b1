use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_ALL_TOKEN: &str = "TODAS";
pub const DEFAULT_WORKSHOP_ORDER_TYPE: &str = "OFICINA";
pub const DEFAULT_MIN_DAYS_OPTIONS: [u32; 4] = [10, 15, 20, 30];
pub const DEFAULT_MIN_DAYS: u32 = 10;
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Engine settings shared by filter validation, the normalizer, the aggregator and the
/// dimension cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Selection token meaning "no restriction" in list-valued filters.
    #[serde(default = "default_all_token")]
    pub all_token: String,
    /// Order-type tag that marks a workshop service order; other types are excluded.
    #[serde(default = "default_workshop_order_type")]
    pub workshop_order_type: String,
    /// Thresholds offered to users; requests with any other value are rejected.
    #[serde(default = "default_min_days_options")]
    pub min_days_options: Vec<u32>,
    #[serde(default = "default_min_days")]
    pub default_min_days: u32,
    /// Drop the last `min_days + 1` days of the window from dashboard counts.
    #[serde(default = "default_true")]
    pub trim_report_window: bool,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            all_token: default_all_token(),
            workshop_order_type: default_workshop_order_type(),
            min_days_options: default_min_days_options(),
            default_min_days: default_min_days(),
            trim_report_window: true,
            cache_ttl_seconds: default_cache_ttl_seconds(),
        }
    }
}

impl EngineConfig {
    pub fn is_allowed_min_days(&self, min_days: u32) -> bool {
        self.min_days_options.contains(&min_days)
    }
}

fn default_all_token() -> String {
    DEFAULT_ALL_TOKEN.to_owned()
}

fn default_workshop_order_type() -> String {
    DEFAULT_WORKSHOP_ORDER_TYPE.to_owned()
}

fn default_min_days_options() -> Vec<u32> {
    DEFAULT_MIN_DAYS_OPTIONS.to_vec()
}

fn default_min_days() -> u32 {
    DEFAULT_MIN_DAYS
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_seconds() -> u64 {
    DEFAULT_CACHE_TTL_SECONDS
}

/// Parse TOML text into a normalized, validated config.
pub fn parse_config(raw: &str) -> Result<EngineConfig, AppError> {
    let parsed: EngineConfig = toml::from_str(raw).map_err(|e| {
        AppError::new("CONFIG_PARSE_FAILED", "Failed to parse engine config TOML")
            .with_details(e.to_string())
    })?;
    let config = normalize_config(parsed);
    validate_config(&config)?;
    Ok(config)
}

/// Load the engine config; a missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<EngineConfig, AppError> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        AppError::new("CONFIG_READ_FAILED", "Failed to read engine config")
            .with_details(format!("path={}; err={e}", path.display()))
    })?;
    parse_config(&raw)
}

fn normalize_config(mut config: EngineConfig) -> EngineConfig {
    config.all_token = config.all_token.trim().to_owned();
    config.workshop_order_type = config.workshop_order_type.trim().to_owned();
    config.min_days_options.sort_unstable();
    config.min_days_options.dedup();
    config
}

fn validate_config(config: &EngineConfig) -> Result<(), AppError> {
    if config.all_token.is_empty() {
        return Err(AppError::new(
            "CONFIG_INVALID",
            "all_token must not be empty",
        ));
    }
    if config.workshop_order_type.is_empty() {
        return Err(AppError::new(
            "CONFIG_INVALID",
            "workshop_order_type must not be empty",
        ));
    }
    if config.min_days_options.is_empty() {
        return Err(AppError::new(
            "CONFIG_INVALID",
            "min_days_options must list at least one threshold",
        ));
    }
    if !config.is_allowed_min_days(config.default_min_days) {
        return Err(AppError::new(
            "CONFIG_INVALID",
            "default_min_days must be one of min_days_options",
        )
        .with_details(format!(
            "default_min_days={}; options={:?}",
            config.default_min_days, config.min_days_options
        )));
    }
    Ok(())
}
