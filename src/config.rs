//! Configuration loading from environment variables.
//!
//! Every knob has a working default so the binary runs with nothing set;
//! deployments override through `PARCELSCOPE_*` variables.

use anyhow::{Context, Result};

/// Application configuration: HTTP bind, upstream form URL, and the
/// timing bounds of the lookup flow.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Port the REST API binds to.
    pub port: u16,
    /// The assessor search-form URL. The contract with it is purely
    /// behavioral (cascading selects, a submit action, a results page).
    pub form_url: String,
    /// Hard bound on the initial page load. Expiry is fatal.
    pub page_load_timeout_ms: u64,
    /// Bound on waiting for a dependent dropdown to repopulate after an
    /// upstream selection. Expiry is non-fatal.
    pub repopulate_timeout_ms: u64,
    /// Poll interval used inside the repopulation wait.
    pub repopulate_poll_ms: u64,
    /// Fixed delay applied when a repopulation wait times out; some pages
    /// repopulate without a detectable DOM signal.
    pub grace_delay_ms: u64,
    /// Fixed delay after form submission before the response page is read.
    pub settle_delay_ms: u64,
    /// Bound on the opportunistic wait for a results table. Non-fatal.
    pub results_timeout_ms: u64,
    /// Transactional-mail settings for the quote route.
    pub mail: MailConfig,
}

/// Settings for the third-party transactional-email API.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// HTTP endpoint of the mail API.
    pub endpoint: String,
    /// Bearer token for the mail API.
    pub api_key: String,
    /// Sender address.
    pub from: String,
    /// Destination inbox for quote submissions.
    pub to: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            form_url: "https://assessor.example.gov/propertysearch.aspx".to_string(),
            page_load_timeout_ms: 30_000,
            repopulate_timeout_ms: 8_000,
            repopulate_poll_ms: 250,
            grace_delay_ms: 1_500,
            settle_delay_ms: 2_000,
            results_timeout_ms: 5_000,
            mail: MailConfig {
                endpoint: "https://api.mail.example.com/v1/send".to_string(),
                api_key: String::new(),
                from: "quotes@parcelscope.example".to_string(),
                to: "intake@parcelscope.example".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Build a config from `PARCELSCOPE_*` environment variables,
    /// falling back to the defaults above.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("PARCELSCOPE_PORT", defaults.port),
            form_url: env_str("PARCELSCOPE_FORM_URL", &defaults.form_url),
            page_load_timeout_ms: env_parse(
                "PARCELSCOPE_PAGE_LOAD_TIMEOUT_MS",
                defaults.page_load_timeout_ms,
            ),
            repopulate_timeout_ms: env_parse(
                "PARCELSCOPE_REPOPULATE_TIMEOUT_MS",
                defaults.repopulate_timeout_ms,
            ),
            repopulate_poll_ms: env_parse(
                "PARCELSCOPE_REPOPULATE_POLL_MS",
                defaults.repopulate_poll_ms,
            ),
            grace_delay_ms: env_parse("PARCELSCOPE_GRACE_DELAY_MS", defaults.grace_delay_ms),
            settle_delay_ms: env_parse("PARCELSCOPE_SETTLE_DELAY_MS", defaults.settle_delay_ms),
            results_timeout_ms: env_parse(
                "PARCELSCOPE_RESULTS_TIMEOUT_MS",
                defaults.results_timeout_ms,
            ),
            mail: MailConfig {
                endpoint: env_str("PARCELSCOPE_MAIL_ENDPOINT", &defaults.mail.endpoint),
                api_key: env_str("PARCELSCOPE_MAIL_API_KEY", &defaults.mail.api_key),
                from: env_str("PARCELSCOPE_MAIL_FROM", &defaults.mail.from),
                to: env_str("PARCELSCOPE_MAIL_TO", &defaults.mail.to),
            },
        }
    }

    /// Check that the configured URLs actually parse.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.form_url)
            .with_context(|| format!("invalid form URL: {}", self.form_url))?;
        url::Url::parse(&self.mail.endpoint)
            .with_context(|| format!("invalid mail endpoint: {}", self.mail.endpoint))?;
        Ok(())
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
