//! Configuration loading and management.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use usage_billing::MeteringClient;
use usage_core::{
    BillingController, DEFAULT_CREDITS_PER_HOUR, DEFAULT_WORKSPACE_CLASS, NoOpBillingController,
    PricingError, WorkspacePricer,
};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Credits per hour by workspace class. Must include `default`.
    #[serde(default = "default_pricing")]
    pub pricing: BTreeMap<String, i64>,
    #[serde(default)]
    pub billing: BillingConfig,
}

/// Where reconciled usage is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingMode {
    /// Usage is stored locally only.
    #[default]
    None,
    /// Team credit summaries are posted to `billing.endpoint`.
    Metering,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct BillingConfig {
    #[serde(default)]
    pub mode: BillingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("pricing", &self.pricing)
            .field("billing", &self.billing)
            .finish()
    }
}

impl fmt::Debug for BillingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BillingConfig")
            .field("mode", &self.mode)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("usage.db"),
            pricing: default_pricing(),
            billing: BillingConfig::default(),
        }
    }
}

fn default_pricing() -> BTreeMap<String, i64> {
    BTreeMap::from([(DEFAULT_WORKSPACE_CLASS.to_string(), DEFAULT_CREDITS_PER_HOUR)])
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later sources win: defaults, `~/.config/usage/config.toml`, the given
    /// file, then `USAGE_*` environment variables (`__` separates nested keys,
    /// e.g. `USAGE_BILLING__MODE=metering`).
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("USAGE_").split("__"));

        figment.extract()
    }

    /// Builds the pricer from the `pricing` table.
    pub fn pricer(&self) -> Result<WorkspacePricer, PricingError> {
        WorkspacePricer::new(
            self.pricing
                .iter()
                .map(|(class, rate)| (class.as_str(), *rate)),
        )
    }
}

impl BillingConfig {
    /// Builds the billing controller selected by `mode`.
    pub fn controller(&self) -> Result<Box<dyn BillingController>> {
        match self.mode {
            BillingMode::None => Ok(Box::new(NoOpBillingController)),
            BillingMode::Metering => {
                let endpoint = self
                    .endpoint
                    .as_deref()
                    .context("billing.endpoint is required for metering mode")?;
                let api_key = self
                    .api_key
                    .as_deref()
                    .context("billing.api_key is required for metering mode")?;
                let client = MeteringClient::new(endpoint, api_key)
                    .context("failed to create metering client")?;
                Ok(Box::new(client))
            }
        }
    }
}

/// Returns the platform-specific config directory for usage.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("usage"))
}

/// Returns the platform-specific data directory for usage.
///
/// On Linux: `~/.local/share/usage`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("usage"))
}
