//! Axum route handlers for the Takedown Gateway.
//!
//! ## Endpoints
//!
//! - `GET  /health`            — Health check
//! - `POST /takedown`          — File a takedown report (multipart form + evidence file)
//! - `POST /takedown/retract`  — Withdraw a previously opened report
//! - `GET  /audit`             — List recent audit log entries
//! - `POST /notify/user-talk`  — Post a removal notice to a user's talk page
//! - `POST /notify/commons`    — Post a takedown notice to a central wiki page

use crate::{
    audit,
    error::GatewayError,
    models::{
        normalize_datetime, Attachment, IncidentType, ReportCase, ReportedUser, ReporterIdentity,
        SubmissionTrace,
    },
    pipeline,
    reporting::ReportingApi,
    state::AppState,
    wiki::EditOutcome,
    xml,
};
use axum::{
    extract::{Multipart, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::IpAddr;
use std::sync::Arc;

// ── Health ────────────────────────────────────────────────────────────────────

/// `GET /health` — Health check
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "takedown-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Submission ────────────────────────────────────────────────────────────────

/// Case fields as they arrive on the multipart form. Everything is optional
/// here; [`SubmissionForm::into_case`] decides what is required.
#[derive(Debug, Default)]
struct SubmissionForm {
    reporter_first_name: Option<String>,
    reporter_last_name: Option<String>,
    reporter_email: Option<String>,
    file_name: Option<String>,
    incident_date: Option<String>,
    incident_hour: Option<String>,
    incident_min: Option<String>,
    access_date: Option<String>,
    access_hour: Option<String>,
    access_min: Option<String>,
    uploader_username: Option<String>,
    uploader_ip: Option<String>,
    uploader_email: Option<String>,
    comments: Option<String>,
    is_test: Option<String>,
}

impl SubmissionForm {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "reporter_first_name" => self.reporter_first_name = Some(value),
            "reporter_last_name" => self.reporter_last_name = Some(value),
            "reporter_email" => self.reporter_email = Some(value),
            "file_name" => self.file_name = Some(value),
            "incident_date" => self.incident_date = Some(value),
            "incident_hour" => self.incident_hour = Some(value),
            "incident_min" => self.incident_min = Some(value),
            "access_date" => self.access_date = Some(value),
            "access_hour" => self.access_hour = Some(value),
            "access_min" => self.access_min = Some(value),
            "uploader_username" => self.uploader_username = Some(value),
            "uploader_ip" => self.uploader_ip = Some(value),
            "uploader_email" => self.uploader_email = Some(value),
            "comments" => self.comments = Some(value),
            "is_test" => self.is_test = Some(value),
            other => tracing::debug!("ignoring unknown form field '{other}'"),
        }
    }

    fn into_case(self) -> Result<ReportCase, GatewayError> {
        let incident_datetime = normalize_datetime(
            &required(self.incident_date, "incident_date")?,
            &required(self.incident_hour, "incident_hour")?,
            &required(self.incident_min, "incident_min")?,
        )?;
        let access_datetime = normalize_datetime(
            &required(self.access_date, "access_date")?,
            &required(self.access_hour, "access_hour")?,
            &required(self.access_min, "access_min")?,
        )?;

        let file_name = required(self.file_name, "file_name")?;

        let ip = optional(self.uploader_ip);
        if let Some(ip) = &ip {
            ip.parse::<IpAddr>()
                .map_err(|_| GatewayError::Validation(format!("invalid uploader IP '{ip}'")))?;
        }

        // Production is opt-in: anything other than an explicit "N" stays on
        // the test endpoint.
        let is_test = self.is_test.as_deref().map(str::trim) != Some("N");

        Ok(ReportCase {
            incident_type: IncidentType::ChildAbuseMaterial,
            incident_datetime,
            access_datetime,
            page_url: format!(
                "https://commons.wikimedia.org/wiki/File:{}",
                file_name.replace(' ', "_")
            ),
            reporter: ReporterIdentity {
                first_name: required(self.reporter_first_name, "reporter_first_name")?,
                last_name: required(self.reporter_last_name, "reporter_last_name")?,
                email: required(self.reporter_email, "reporter_email")?,
            },
            reported_user: ReportedUser {
                username: required(self.uploader_username, "uploader_username")?,
                email: optional(self.uploader_email),
                ip,
            },
            additional_info: self.comments.unwrap_or_default(),
            is_test,
        })
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, GatewayError> {
    optional(value)
        .ok_or_else(|| GatewayError::Validation(format!("missing required field '{name}'")))
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `POST /takedown` — File a takedown report.
///
/// Multipart form: the case fields above plus one `evidence` file part.
/// Returns the consolidated per-stage trace, the audit entry, and the final
/// narrative — stage failures are reported in the trace, not as HTTP errors.
pub async fn submit_takedown(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>, GatewayError> {
    let mut form = SubmissionForm::default();
    let mut attachment: Option<Attachment> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::Validation(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "evidence" {
            let file_name = field.file_name().unwrap_or("evidence").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| GatewayError::Validation(format!("failed to read evidence file: {e}")))?;
            attachment = Some(Attachment {
                file_name,
                size: bytes.len() as u64,
                content_type,
                bytes: bytes.to_vec(),
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| GatewayError::Validation(format!("unreadable field '{name}': {e}")))?;
            form.set(&name, value);
        }
    }

    let case = form.into_case()?;
    let actor = headers
        .get("x-forwarded-user")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    let trace = pipeline::run(&state.api, &state.config, &case, attachment).await;

    // Logged once per attempt, whatever the pipeline outcome. By this point
    // the external report may already be filed, so an audit-store fault must
    // not destroy the trace — it is reported alongside it instead.
    let entry = audit::build_entry(&actor, &case, trace.report_id.as_ref());
    let audit_error = match state.audit.record(&entry).await {
        Ok(()) => None,
        Err(e) => {
            tracing::error!("audit write failed after submission: {e}");
            Some(e.to_string())
        }
    };

    Ok(Json(submission_response(trace, entry, audit_error)))
}

/// Assemble the submission response. The trace is always present; a failed
/// audit write only adds an `audit_error` field.
fn submission_response(
    trace: SubmissionTrace,
    entry: audit::AuditLogEntry,
    audit_error: Option<String>,
) -> Value {
    let message = trace.message.clone();
    let mut response = json!({
        "message": message,
        "trace": trace,
        "audit": entry,
    });
    if let Some(err) = audit_error {
        response["audit_error"] = Value::String(err);
    }
    response
}

// ── Retract ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RetractRequest {
    pub report_id: String,
    #[serde(default = "default_true")]
    pub is_test: bool,
}

fn default_true() -> bool {
    true
}

/// `POST /takedown/retract` — Withdraw a previously opened report.
pub async fn retract_report(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RetractRequest>,
) -> Result<Json<Value>, GatewayError> {
    if req.report_id.trim().is_empty() {
        return Err(GatewayError::Validation("report_id must not be empty".into()));
    }

    let base = state.config.base_url(req.is_test);
    let body = state.api.retract_report(base, &req.report_id).await?;
    let parsed = xml::parse_api_response(&body)?;
    let retracted = parsed.response_code == Some(0);

    tracing::info!(report_id = %req.report_id, retracted, "retract requested");

    Ok(Json(json!({
        "report_id": req.report_id,
        "response_code": parsed.response_code,
        "retracted": retracted,
        "raw_response": body,
    })))
}

// ── Audit ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<i64>,
}

/// `GET /audit` — List recent audit log entries, newest first.
pub async fn list_audit(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AuditQuery>,
) -> Result<Json<Value>, GatewayError> {
    let limit = q.limit.unwrap_or(50).clamp(1, 200);
    let entries = state.audit.list(limit).await?;

    Ok(Json(json!({
        "count": entries.len(),
        "entries": entries,
    })))
}

// ── Notifications ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UserTalkRequest {
    /// Domain of the wiki the reported user belongs to.
    pub domain: String,
    pub username: String,
    pub notice: String,
}

/// `POST /notify/user-talk` — Post a removal notice on a user's talk page.
///
/// A CAPTCHA challenge from the wiki is relayed as a distinct non-error
/// outcome carrying the absolute challenge URL.
pub async fn notify_user_talk(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UserTalkRequest>,
) -> Result<Json<Value>, GatewayError> {
    let outcome = state
        .wiki
        .post_user_talk(&req.domain, &req.username, &req.notice)
        .await?;
    Ok(Json(edit_outcome_json(outcome)))
}

#[derive(Debug, Deserialize)]
pub struct CommonsRequest {
    pub text: String,
    /// `dmca_notices` (default) or `village_pump`.
    pub venue: Option<String>,
}

/// `POST /notify/commons` — Append a takedown notice to a central wiki page.
pub async fn notify_commons(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CommonsRequest>,
) -> Result<Json<Value>, GatewayError> {
    let outcome = match req.venue.as_deref() {
        None | Some("dmca_notices") => state.wiki.post_commons(&req.text).await?,
        Some("village_pump") => state.wiki.post_village_pump(&req.text).await?,
        Some(other) => {
            return Err(GatewayError::Validation(format!(
                "venue must be 'dmca_notices' or 'village_pump', got '{other}'"
            )))
        }
    };
    Ok(Json(edit_outcome_json(outcome)))
}

fn edit_outcome_json(outcome: EditOutcome) -> Value {
    match outcome {
        EditOutcome::Edited(edit) => json!({ "status": "posted", "edit": edit }),
        EditOutcome::Captcha(challenge) => json!({ "status": "captcha", "captcha": challenge }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
