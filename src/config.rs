//! Process configuration, read once from the environment at startup.
//!
//! The reporter/contact identity and the reporting API endpoints are static
//! per deployment and never user-supplied. Everything is collected into an
//! immutable [`ReportingConfig`] injected into the builder and transports —
//! nothing reads the environment after startup.

use anyhow::Context;
use std::time::Duration;

/// What to do when a built document fails schema validation.
///
/// The legacy tool validated and printed diagnostics but still performed the
/// network call; `Warn` reproduces that, `Block` makes validation a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// Record violations and proceed with the stage's network call.
    Warn,
    /// Record violations and skip the stage's network call.
    Block,
}

/// Static contact person fields sent with every report.
#[derive(Debug, Clone)]
pub struct ContactIdentity {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

/// Static business address used for both the reporting person and the
/// contact person sections.
#[derive(Debug, Clone)]
pub struct BusinessAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

/// Which wiki farm the notification collaborator targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Test,
    Production,
}

/// Immutable gateway configuration.
#[derive(Debug, Clone)]
pub struct ReportingConfig {
    /// Reporting API base URL used when a submission is flagged production.
    pub production_url: String,
    /// Reporting API base URL used for test submissions.
    pub test_url: String,
    /// HTTP basic credentials for the reporting API, if required.
    pub credentials: Option<(String, String)>,
    pub contact: ContactIdentity,
    pub address: BusinessAddress,
    pub http_timeout: Duration,
    pub validation_policy: ValidationPolicy,
    pub environment: Environment,
}

impl ReportingConfig {
    /// Build the configuration from environment variables.
    ///
    /// The reporting URLs and contact identity are required; credentials,
    /// timeout, policy, and environment have sensible fallbacks.
    pub fn from_env() -> anyhow::Result<Self> {
        let production_url = required("REPORTING_URL_PRODUCTION")?;
        let test_url = required("REPORTING_URL_TEST")?;

        let credentials = match (
            std::env::var("REPORTING_USER").ok(),
            std::env::var("REPORTING_PASSWORD").ok(),
        ) {
            (Some(user), Some(pass)) => Some((user, pass)),
            (None, None) => None,
            _ => anyhow::bail!(
                "REPORTING_USER and REPORTING_PASSWORD must be set together or not at all"
            ),
        };

        let contact = ContactIdentity {
            first_name: required("CONTACT_FIRST_NAME")?,
            last_name: required("CONTACT_LAST_NAME")?,
            email: required("CONTACT_EMAIL")?,
            phone: required("CONTACT_PHONE")?,
        };

        let address = BusinessAddress {
            street: required("CONTACT_STREET_ADDRESS")?,
            city: required("CONTACT_CITY")?,
            state: required("CONTACT_STATE")?,
            zip: required("CONTACT_ZIP")?,
            country: required("CONTACT_COUNTRY")?,
        };

        let http_timeout = std::env::var("REPORTING_TIMEOUT_SECS")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("REPORTING_TIMEOUT_SECS must be an integer")?
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let validation_policy = match std::env::var("VALIDATION_POLICY").as_deref() {
            Ok("block") => ValidationPolicy::Block,
            Ok("warn") | Err(_) => ValidationPolicy::Warn,
            Ok(other) => anyhow::bail!("VALIDATION_POLICY must be 'block' or 'warn', got '{other}'"),
        };

        let environment = match std::env::var("GATEWAY_ENV").as_deref() {
            Ok("prod") | Ok("production") => Environment::Production,
            _ => Environment::Test,
        };

        Ok(Self {
            production_url: normalize_base(production_url),
            test_url: normalize_base(test_url),
            credentials,
            contact,
            address,
            http_timeout,
            validation_policy,
            environment,
        })
    }

    /// Base URL for one submission, chosen by the caller's test flag.
    pub fn base_url(&self, is_test: bool) -> &str {
        if is_test {
            &self.test_url
        } else {
            &self.production_url
        }
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

/// Endpoint paths are joined by concatenation, so the base must end in `/`.
fn normalize_base(mut url: String) -> String {
    if !url.ends_with('/') {
        url.push('/');
    }
    url
}

/// Fixture used by tests across the crate.
#[cfg(test)]
pub(crate) fn test_config() -> ReportingConfig {
    ReportingConfig {
        production_url: "https://report.example.org/ispws/".into(),
        test_url: "https://exttest.example.org/ispws/".into(),
        credentials: None,
        contact: ContactIdentity {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            email: "legal@example.org".into(),
            phone: "+1-555-0100".into(),
        },
        address: BusinessAddress {
            street: "1 Montgomery St".into(),
            city: "San Francisco".into(),
            state: "CA".into(),
            zip: "94104".into(),
            country: "US".into(),
        },
        http_timeout: Duration::from_secs(30),
        validation_policy: ValidationPolicy::Warn,
        environment: Environment::Test,
    }
}
