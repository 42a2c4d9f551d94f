use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::{
    is_null_address, Address, CYCLE_UNIT_SECS, DEFAULT_COMMUNITY_FUND_NUMERATOR,
    DEFAULT_HOURLY_WITHHELD_NUMERATOR, NUMERATOR_DENOMINATOR,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("environment variable {var}: {reason}")]
    Env { var: &'static str, reason: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Reward ledger configuration.
/// Each deployment carries its own owner, community fund and fractions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewardsConfig {
    /// Administrator allowed to call the owner-gated setters.
    pub owner: Address,
    pub community_fund: Address,
    /// Share of every payout sent to the community fund (of NUMERATOR_DENOMINATOR).
    #[serde(default = "default_community_fund_numerator")]
    pub community_fund_numerator: u64,
    /// Share of the free balance retained per elapsed cycle unit.
    #[serde(default = "default_hourly_withheld_numerator")]
    pub hourly_withheld_numerator: u64,
    #[serde(default = "default_cycle_unit_secs")]
    pub cycle_unit_secs: u64,
    /// Minimum gap between two manual rollovers.
    #[serde(default = "default_cycle_unit_secs")]
    pub minimum_cycle_interval_secs: u64,
}

fn default_community_fund_numerator() -> u64 {
    DEFAULT_COMMUNITY_FUND_NUMERATOR
}

fn default_hourly_withheld_numerator() -> u64 {
    DEFAULT_HOURLY_WITHHELD_NUMERATOR
}

fn default_cycle_unit_secs() -> u64 {
    CYCLE_UNIT_SECS
}

impl RewardsConfig {
    pub fn new(owner: &str, community_fund: &str) -> Self {
        Self {
            owner: owner.to_string(),
            community_fund: community_fund.to_string(),
            community_fund_numerator: DEFAULT_COMMUNITY_FUND_NUMERATOR,
            hourly_withheld_numerator: DEFAULT_HOURLY_WITHHELD_NUMERATOR,
            cycle_unit_secs: CYCLE_UNIT_SECS,
            minimum_cycle_interval_secs: CYCLE_UNIT_SECS,
        }
    }

    /// Load config from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: RewardsConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from environment variables
    /// Useful for containerized deployments
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let owner = std::env::var("DARKPAY_OWNER").map_err(|_| ConfigError::Env {
            var: "DARKPAY_OWNER",
            reason: "not set".to_string(),
        })?;
        let community_fund =
            std::env::var("DARKPAY_COMMUNITY_FUND").map_err(|_| ConfigError::Env {
                var: "DARKPAY_COMMUNITY_FUND",
                reason: "not set".to_string(),
            })?;

        let config = Self {
            owner,
            community_fund,
            community_fund_numerator: env_u64(
                "DARKPAY_COMMUNITY_FUND_NUMERATOR",
                DEFAULT_COMMUNITY_FUND_NUMERATOR,
            )?,
            hourly_withheld_numerator: env_u64(
                "DARKPAY_HOURLY_WITHHELD_NUMERATOR",
                DEFAULT_HOURLY_WITHHELD_NUMERATOR,
            )?,
            cycle_unit_secs: env_u64("DARKPAY_CYCLE_UNIT_SECS", CYCLE_UNIT_SECS)?,
            minimum_cycle_interval_secs: env_u64(
                "DARKPAY_MIN_CYCLE_INTERVAL_SECS",
                CYCLE_UNIT_SECS,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if is_null_address(&self.owner) {
            return Err(ConfigError::Invalid("owner cannot be the null address".into()));
        }
        if is_null_address(&self.community_fund) {
            return Err(ConfigError::Invalid(
                "community_fund cannot be the null address".into(),
            ));
        }
        if self.community_fund_numerator > NUMERATOR_DENOMINATOR {
            return Err(ConfigError::Invalid(format!(
                "community_fund_numerator {} exceeds denominator {}",
                self.community_fund_numerator, NUMERATOR_DENOMINATOR
            )));
        }
        if self.hourly_withheld_numerator > NUMERATOR_DENOMINATOR {
            return Err(ConfigError::Invalid(format!(
                "hourly_withheld_numerator {} exceeds denominator {}",
                self.hourly_withheld_numerator, NUMERATOR_DENOMINATOR
            )));
        }
        if self.cycle_unit_secs == 0 {
            return Err(ConfigError::Invalid("cycle_unit_secs must be non-zero".into()));
        }
        if self.minimum_cycle_interval_secs < self.cycle_unit_secs {
            return Err(ConfigError::Invalid(format!(
                "minimum_cycle_interval_secs {} is shorter than one cycle unit ({})",
                self.minimum_cycle_interval_secs, self.cycle_unit_secs
            )));
        }
        Ok(())
    }
}

fn env_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|e| ConfigError::Env {
            var,
            reason: format!("{}", e),
        }),
        Err(_) => Ok(default),
    }
}
