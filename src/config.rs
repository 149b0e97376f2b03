use crate::error::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Runtime configuration for both roles.
///
/// Every section falls back to its defaults, so a config file only needs
/// the fields it changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub validator: ValidatorConfig,
    pub channel: ChannelConfig,
    pub vault: VaultConfig,
    pub guard: GuardConfig,
    pub risk: RiskConfig,
    pub processor: ProcessorConfig,
    pub merchant: MerchantConfig,
}

impl Config {
    /// Reads a JSON config file, or returns the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                Ok(serde_json::from_str(&contents)?)
            }
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Two-digit year; expiries before it are rejected.
    pub min_expiry_year: u32,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self { min_expiry_year: 23 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub poll_interval_ms: u64,
}

impl ChannelConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub token_length: usize,
    pub max_issue_attempts: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            token_length: 16,
            max_issue_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub max_failed_attempts: u32,
    pub lockout_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 3,
            lockout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Leading four digits of issuers treated as fraudulent.
    pub suspicious_bins: Vec<String>,
    pub high_amount_threshold: Decimal,
    pub high_amount_flag_probability: f64,
    pub suspicious_pattern_probability: f64,
    pub velocity_probability: f64,
    pub geographic_probability: f64,
}

impl RiskConfig {
    /// Same block list and threshold, with every random roll disabled.
    pub fn without_random_rolls(mut self) -> Self {
        self.high_amount_flag_probability = 0.0;
        self.suspicious_pattern_probability = 0.0;
        self.velocity_probability = 0.0;
        self.geographic_probability = 0.0;
        self
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            suspicious_bins: vec!["6060".to_string(), "5110".to_string()],
            high_amount_threshold: dec!(1000.00),
            high_amount_flag_probability: 0.30,
            suspicious_pattern_probability: 0.05,
            velocity_probability: 0.05,
            geographic_probability: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub history_limit: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self { history_limit: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerchantConfig {
    pub merchant_id: String,
    pub response_timeout_secs: u64,
    pub payment_log_limit: usize,
}

impl MerchantConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

impl Default for MerchantConfig {
    fn default() -> Self {
        Self {
            merchant_id: "VENDOR_001".to_string(),
            response_timeout_secs: 30,
            payment_log_limit: 100,
        }
    }
}
