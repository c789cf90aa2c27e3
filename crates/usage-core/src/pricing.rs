//! Workspace class pricing.
//!
//! Rates are whole credits per hour. Credits for a runtime are computed with
//! integer arithmetic on milliseconds and rounded half up, so a run of exactly
//! half a credit bills one credit.

use std::collections::HashMap;

use chrono::Duration;
use thiserror::Error;

/// Name of the workspace class every instance falls back to.
pub const DEFAULT_WORKSPACE_CLASS: &str = "default";

/// Credits per hour charged for the default workspace class.
pub const DEFAULT_CREDITS_PER_HOUR: i64 = 10;

const MS_PER_HOUR: i128 = 3_600_000;

/// Errors building a pricer from a rate table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PricingError {
    /// The rate table has no entry for the default class.
    #[error("pricing table must define a rate for the \"default\" workspace class")]
    MissingDefaultClass,
    /// A rate was negative.
    #[error("negative rate {rate} for workspace class {class}")]
    NegativeRate { class: String, rate: i64 },
}

/// Maps workspace classes to credit-per-hour rates.
///
/// Unknown classes are billed at the default rate instead of failing, so a
/// pricing table that lags behind newly introduced classes never blocks
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePricer {
    rates: HashMap<String, i64>,
    default_rate: i64,
}

impl WorkspacePricer {
    /// Creates a pricer from a `class -> credits per hour` table.
    pub fn new<I, K>(rates: I) -> Result<Self, PricingError>
    where
        I: IntoIterator<Item = (K, i64)>,
        K: Into<String>,
    {
        let mut table = HashMap::new();
        for (class, rate) in rates {
            let class = class.into();
            if rate < 0 {
                return Err(PricingError::NegativeRate { class, rate });
            }
            table.insert(class, rate);
        }
        let default_rate = *table
            .get(DEFAULT_WORKSPACE_CLASS)
            .ok_or(PricingError::MissingDefaultClass)?;
        Ok(Self {
            rates: table,
            default_rate,
        })
    }

    /// Returns the credits per hour for a workspace class.
    ///
    /// Empty and unrecognised classes use the default rate.
    pub fn credits_per_hour(&self, workspace_class: &str) -> i64 {
        self.rates
            .get(workspace_class)
            .copied()
            .unwrap_or(self.default_rate)
    }

    /// Returns the credits a workspace class accrues over `runtime`.
    ///
    /// Negative runtimes bill zero credits.
    pub fn credits(&self, workspace_class: &str, runtime: Duration) -> i64 {
        let runtime_ms = i128::from(runtime.num_milliseconds().max(0));
        let rate = i128::from(self.credits_per_hour(workspace_class));
        let credits = (runtime_ms * rate + MS_PER_HOUR / 2) / MS_PER_HOUR;
        i64::try_from(credits).unwrap_or(i64::MAX)
    }
}

impl Default for WorkspacePricer {
    fn default() -> Self {
        Self {
            rates: HashMap::from([(
                DEFAULT_WORKSPACE_CLASS.to_string(),
                DEFAULT_CREDITS_PER_HOUR,
            )]),
            default_rate: DEFAULT_CREDITS_PER_HOUR,
        }
    }
}
