//! Domain models for the Takedown Gateway.

use crate::error::GatewayError;
use crate::schema::SchemaViolation;
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

/// Incident classification sent to the reporting service.
///
/// The clearinghouse schema defines several, but the gateway currently files
/// a single kind of report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    ChildAbuseMaterial,
}

impl IncidentType {
    /// Fixed wire value required by the clearinghouse schema.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            IncidentType::ChildAbuseMaterial => {
                "Child Pornography (possession, manufacture, and distribution)"
            }
        }
    }
}

/// The person filing the report, taken from the submission form.
#[derive(Debug, Clone, Serialize)]
pub struct ReporterIdentity {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// The user whose upload is being reported.
#[derive(Debug, Clone, Serialize)]
pub struct ReportedUser {
    pub username: String,
    /// Only present when known; absence omits the person section entirely.
    pub email: Option<String>,
    /// IP captured at upload time, if any; absence omits the capture event.
    pub ip: Option<String>,
}

/// One takedown case, fully normalized and ready for the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ReportCase {
    pub incident_type: IncidentType,
    /// Incident timestamp, normalized to `YYYY-MM-DDTHH:MM:SSZ`.
    pub incident_datetime: String,
    /// When the reporter accessed the material, same normalized form.
    pub access_datetime: String,
    /// Public URL of the reported media page.
    pub page_url: String,
    pub reporter: ReporterIdentity,
    pub reported_user: ReportedUser,
    pub additional_info: String,
    /// Routes the submission to the test endpoint when set.
    pub is_test: bool,
}

/// Evidence file uploaded with the submission.
///
/// Read exactly once, by the attachment transport stage.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub size: u64,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Opaque report correlation token issued by the reporting API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReportId(pub String);

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque uploaded-file token issued by the reporting API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The four remote round-trips of one submission, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Submit,
    Upload,
    FileInfo,
    Finish,
}

/// Everything one stage produced, retained verbatim for audit/debugging.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    /// False when a missing precondition skipped the stage without any
    /// network call.
    pub attempted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    pub request_violations: Vec<SchemaViolation>,
    pub response_violations: Vec<SchemaViolation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<i32>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl StageReport {
    /// A stage that has not run yet; fields are filled in as it progresses.
    pub fn pending(stage: Stage) -> Self {
        Self {
            stage,
            attempted: false,
            request_body: None,
            response_body: None,
            request_violations: Vec::new(),
            response_violations: Vec::new(),
            extracted_id: None,
            response_code: None,
            success: false,
            diagnostic: None,
        }
    }

    /// A stage skipped because a precondition from an earlier stage failed.
    pub fn skipped(stage: Stage, diagnostic: impl Into<String>) -> Self {
        Self {
            diagnostic: Some(diagnostic.into()),
            ..Self::pending(stage)
        }
    }
}

/// Consolidated result of one submission attempt — every stage's request,
/// response, and validation outcome plus the final narrative.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionTrace {
    pub submission_id: Uuid,
    pub is_test: bool,
    pub stages: Vec<StageReport>,
    pub report_id: Option<ReportId>,
    pub file_id: Option<FileId>,
    pub success: bool,
    pub message: String,
}

/// Where a submission stands in the pipeline. Transitions only happen when
/// the identifier the next stage requires is actually present.
#[derive(Debug, Clone)]
pub enum PipelineState {
    Pending,
    Opened(ReportId),
    Uploaded(ReportId, FileId),
    Finalized { report_id: ReportId, closed: bool },
}

impl PipelineState {
    pub fn report_id(&self) -> Option<&ReportId> {
        match self {
            PipelineState::Pending => None,
            PipelineState::Opened(id) => Some(id),
            PipelineState::Uploaded(id, _) => Some(id),
            PipelineState::Finalized { report_id, .. } => Some(report_id),
        }
    }

    pub fn file_id(&self) -> Option<&FileId> {
        match self {
            PipelineState::Uploaded(_, fid) => Some(fid),
            _ => None,
        }
    }
}

/// Combine a form date and an hour/minute pair into the normalized UTC
/// datetime string the clearinghouse schema requires.
///
/// `("2024-03-02", "09", "05")` becomes `"2024-03-02T09:05:00Z"`.
pub fn normalize_datetime(date: &str, hour: &str, min: &str) -> Result<String, GatewayError> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| GatewayError::Validation(format!("invalid date '{date}': {e}")))?;

    let hour: u32 = hour
        .parse()
        .map_err(|_| GatewayError::Validation(format!("invalid hour '{hour}'")))?;
    let min: u32 = min
        .parse()
        .map_err(|_| GatewayError::Validation(format!("invalid minute '{min}'")))?;

    if hour > 23 {
        return Err(GatewayError::Validation(format!("hour {hour} out of range")));
    }
    if min > 59 {
        return Err(GatewayError::Validation(format!("minute {min} out of range")));
    }

    Ok(format!("{}T{hour:02}:{min:02}:00Z", date.format("%Y-%m-%d")))
}

/// Fixture used by tests across the crate.
#[cfg(test)]
pub(crate) fn test_case() -> ReportCase {
    ReportCase {
        incident_type: IncidentType::ChildAbuseMaterial,
        incident_datetime: "2024-01-06T10:30:00Z".into(),
        access_datetime: "2024-01-06T11:00:00Z".into(),
        page_url: "https://commons.wikimedia.org/wiki/File:photo.jpg".into(),
        reporter: ReporterIdentity {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            email: "jdoe@example.org".into(),
        },
        reported_user: ReportedUser {
            username: "Example".into(),
            email: None,
            ip: Some("203.0.113.5".into()),
        },
        additional_info: "Uploaded to the shared media repository.".into(),
        is_test: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_datetime_formats_exactly() {
        assert_eq!(
            normalize_datetime("2024-03-02", "09", "05").unwrap(),
            "2024-03-02T09:05:00Z"
        );
    }

    #[test]
    fn normalize_datetime_pads_single_digits() {
        assert_eq!(
            normalize_datetime("2024-01-06", "10", "30").unwrap(),
            "2024-01-06T10:30:00Z"
        );
        assert_eq!(
            normalize_datetime("2024-01-06", "7", "5").unwrap(),
            "2024-01-06T07:05:00Z"
        );
    }

    #[test]
    fn normalize_datetime_rejects_bad_input() {
        assert!(normalize_datetime("2024-13-40", "09", "05").is_err());
        assert!(normalize_datetime("2024-03-02", "24", "05").is_err());
        assert!(normalize_datetime("2024-03-02", "09", "60").is_err());
        assert!(normalize_datetime("2024-03-02", "ab", "05").is_err());
    }

    #[test]
    fn pipeline_state_exposes_identifiers() {
        let opened = PipelineState::Opened(ReportId("R1".into()));
        assert_eq!(opened.report_id(), Some(&ReportId("R1".into())));
        assert!(opened.file_id().is_none());

        let uploaded = PipelineState::Uploaded(ReportId("R1".into()), FileId("F1".into()));
        assert_eq!(uploaded.file_id(), Some(&FileId("F1".into())));
    }
}
