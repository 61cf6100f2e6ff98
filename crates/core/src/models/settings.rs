use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Default number of trailing months shown on the carbon chart.
pub const DEFAULT_CHART_MONTHS: usize = 6;

/// Runtime configuration for the GreenFlow core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the GreenFlow backend (no trailing slash needed).
    pub api_base_url: String,

    /// Bearer token for authenticated endpoints.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Trailing months shown on the carbon chart (1..=6).
    pub chart_window_months: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            auth_token: None,
            request_timeout_secs: 30,
            chart_window_months: DEFAULT_CHART_MONTHS,
        }
    }
}

impl Settings {
    /// Build settings from the environment, loading a `.env` file first if
    /// one exists.
    ///
    /// - `GREENFLOW_API_URL` (required)
    /// - `GREENFLOW_AUTH_TOKEN`
    /// - `GREENFLOW_TIMEOUT_SECS`
    /// - `GREENFLOW_CHART_MONTHS`
    pub fn from_env() -> Result<Self, CoreError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup (environment, config map, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_base_url = lookup("GREENFLOW_API_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| CoreError::Config("GREENFLOW_API_URL is not set".into()))?;

        let auth_token = lookup("GREENFLOW_AUTH_TOKEN").filter(|v| !v.trim().is_empty());

        let request_timeout_secs = match lookup("GREENFLOW_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                CoreError::Config(format!("GREENFLOW_TIMEOUT_SECS '{raw}' is not a number: {e}"))
            })?,
            None => defaults.request_timeout_secs,
        };

        let chart_window_months = match lookup("GREENFLOW_CHART_MONTHS") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|e| {
                CoreError::Config(format!("GREENFLOW_CHART_MONTHS '{raw}' is not a number: {e}"))
            })?,
            None => defaults.chart_window_months,
        };

        let settings = Self {
            api_base_url: api_base_url.trim().trim_end_matches('/').to_string(),
            auth_token,
            request_timeout_secs,
            chart_window_months,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the rest of the core cannot work with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://")) {
            return Err(CoreError::Config(format!(
                "API URL must start with http:// or https://, got '{}'",
                self.api_base_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config("Request timeout must be at least 1 second".into()));
        }
        if !(1..=DEFAULT_CHART_MONTHS).contains(&self.chart_window_months) {
            return Err(CoreError::Config(format!(
                "Chart window must be between 1 and {DEFAULT_CHART_MONTHS} months, got {}",
                self.chart_window_months
            )));
        }
        Ok(())
    }
}
