//! Shared application state injected into every Axum handler.

use crate::audit::AuditLog;
use crate::config::ReportingConfig;
use crate::reporting::HttpReportingApi;
use crate::wiki::MediaWikiClient;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub config: ReportingConfig,
    pub api: HttpReportingApi,
    pub wiki: MediaWikiClient,
    pub audit: AuditLog,
}

impl AppState {
    /// Build the full state from the environment.
    ///
    /// The database is optional — without `DATABASE_URL` the gateway still
    /// runs, audit entries go to the process log, and `GET /audit` answers 503.
    pub async fn from_env() -> anyhow::Result<Self> {
        let config = ReportingConfig::from_env()?;
        let api = HttpReportingApi::new(config.http_timeout, config.credentials.clone())?;
        let wiki = MediaWikiClient::new(config.environment, config.http_timeout)?;

        let pool = match std::env::var("DATABASE_URL") {
            Ok(url) => match PgPool::connect(&url).await {
                Ok(pool) => {
                    tracing::info!("audit database connected");
                    Some(pool)
                }
                Err(e) => {
                    tracing::warn!("audit database connect failed (audit persistence disabled): {e}");
                    None
                }
            },
            Err(_) => {
                tracing::warn!("DATABASE_URL not set — audit persistence disabled");
                None
            }
        };

        Ok(Self {
            config,
            api,
            wiki,
            audit: AuditLog::new(pool),
        })
    }
}
