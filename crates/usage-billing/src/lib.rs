//! Metering endpoint integration for usage reconciliation.
//!
//! [`MeteringClient`] implements [`BillingController`] by posting each
//! report's per-team credit summary to an HTTP endpoint:
//!
//! ```json
//! {"teams": [{"team_id": "team-1", "credits": 470}], "total_credits": 470}
//! ```
//!
//! User-attributed usage is not sent; only teams are invoiced.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use usage_core::{BillingController, BillingError, UsageReport};

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Metering client errors.
#[derive(Debug, Error)]
pub enum MeteringError {
    /// The provided API key was invalid.
    #[error("invalid API key: {reason}")]
    InvalidApiKey { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Endpoint returned an error response.
    #[error("metering API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl From<MeteringError> for BillingError {
    fn from(err: MeteringError) -> Self {
        match err {
            MeteringError::Api { .. } => Self::Rejected {
                message: err.to_string(),
            },
            other => Self::transport(other),
        }
    }
}

/// HTTP client for the metering endpoint.
///
/// # Thread Safety
///
/// The blocking client owns its own runtime. Do not call it from inside an
/// async context.
pub struct MeteringClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
}

impl fmt::Debug for MeteringClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeteringClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl MeteringClient {
    /// Creates a new client posting to `endpoint` with the given API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is empty or whitespace-only, or if
    /// the HTTP client fails to build.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, MeteringError> {
        let api_key = api_key.into();

        if api_key.is_empty() {
            return Err(MeteringError::InvalidApiKey {
                reason: "API key cannot be empty",
            });
        }
        if api_key.trim().is_empty() {
            return Err(MeteringError::InvalidApiKey {
                reason: "API key cannot be whitespace-only",
            });
        }

        let http = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(MeteringError::ClientBuild)?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    /// Posts the team credit summary of `report`.
    ///
    /// Reports without team usage are not sent.
    pub fn submit(&self, report: &UsageReport) -> Result<(), MeteringError> {
        let request = MeteringRequest::from_report(report);
        if request.teams.is_empty() {
            tracing::debug!("no team usage to submit");
            return Ok(());
        }

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(MeteringError::Api {
                status: status.as_u16(),
                message: parse_api_error(&body).unwrap_or(body),
            });
        }

        tracing::info!(
            teams = request.teams.len(),
            total_credits = request.total_credits,
            "submitted usage to metering endpoint"
        );
        Ok(())
    }
}

impl BillingController for MeteringClient {
    fn reconcile(&self, report: &UsageReport) -> Result<(), BillingError> {
        self.submit(report).map_err(BillingError::from)
    }
}

#[derive(Debug, Serialize)]
struct MeteringRequest {
    teams: Vec<TeamCredits>,
    total_credits: i64,
}

#[derive(Debug, Serialize)]
struct TeamCredits {
    team_id: String,
    credits: i64,
}

impl MeteringRequest {
    fn from_report(report: &UsageReport) -> Self {
        let teams: Vec<_> = report
            .credit_summary_for_teams()
            .into_iter()
            .map(|(team_id, credits)| TeamCredits {
                team_id: team_id.as_str().to_string(),
                credits,
            })
            .collect();
        let total_credits = teams.iter().map(|team| team.credits).sum();
        Self {
            teams,
            total_credits,
        }
    }
}

fn parse_api_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: ErrorDetails,
    }

    #[derive(Deserialize)]
    struct ErrorDetails {
        message: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| payload.error.message)
}
