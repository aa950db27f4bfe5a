//! Audit log: one entry per submission attempt.
//!
//! The entry is written after the pipeline finishes, whatever the outcome —
//! partial failures are logged with whichever identifiers were obtained.
//! Persistence is optional infrastructure: without a configured database the
//! entry still lands in the process log.

use crate::error::GatewayError;
use crate::models::{ReportCase, ReportId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// Log category for reports filed with the child-safety clearinghouse.
pub const CATEGORY_CHILD_PROTECTION: &str = "Child Protection";

/// One audit log row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: Uuid,
    /// The submitting user.
    pub actor: String,
    pub category: String,
    pub title: String,
    pub is_test: bool,
    pub created_at: DateTime<Utc>,
}

/// Build the entry for one submission attempt.
///
/// The title embeds the reported username, the incident datetime, and the
/// report id when one was obtained.
pub fn build_entry(actor: &str, case: &ReportCase, report_id: Option<&ReportId>) -> AuditLogEntry {
    let report_ref = report_id.map(|id| id.0.as_str()).unwrap_or("none");
    AuditLogEntry {
        id: Uuid::new_v4(),
        actor: actor.to_string(),
        category: CATEGORY_CHILD_PROTECTION.to_string(),
        title: format!(
            "Report to NCMEC for file uploaded by {} {} - Report# {report_ref}",
            case.reported_user.username, case.incident_datetime
        ),
        is_test: case.is_test,
        created_at: Utc::now(),
    }
}

/// Audit persistence. The pool is optional so the gateway can run (and be
/// tested) without a database; entries are then emitted to the log only.
#[derive(Clone)]
pub struct AuditLog {
    pool: Option<PgPool>,
}

impl AuditLog {
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    /// Record one entry. Never drops the information: without a pool the
    /// entry goes to the process log instead.
    pub async fn record(&self, entry: &AuditLogEntry) -> Result<(), GatewayError> {
        let Some(pool) = &self.pool else {
            tracing::warn!(
                actor = %entry.actor,
                title = %entry.title,
                is_test = entry.is_test,
                "audit store not configured — entry logged only"
            );
            return Ok(());
        };

        sqlx::query(
            "INSERT INTO audit_log (id, actor, category, title, is_test, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.id)
        .bind(&entry.actor)
        .bind(&entry.category)
        .bind(&entry.title)
        .bind(entry.is_test)
        .bind(entry.created_at)
        .execute(pool)
        .await?;

        tracing::info!(audit_id = %entry.id, "audit entry recorded");
        Ok(())
    }

    /// Most recent entries, newest first.
    pub async fn list(&self, limit: i64) -> Result<Vec<AuditLogEntry>, GatewayError> {
        let pool = self.pool.as_ref().ok_or(GatewayError::AuditUnavailable)?;

        let entries = sqlx::query_as::<_, AuditLogEntry>(
            "SELECT id, actor, category, title, is_test, created_at
             FROM audit_log
             ORDER BY created_at DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(entries)
    }
}
