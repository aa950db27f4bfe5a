//! The report submission pipeline.
//!
//! Four strictly sequential stages, each depending on state produced by the
//! one before it:
//!
//! 1. **Submit** — build and validate the report document, POST it, extract
//!    the report id.
//! 2. **Upload** — multipart-POST the evidence file, extract the file id.
//! 3. **FileInfo** — POST file metadata for the uploaded evidence.
//! 4. **Finish** — mark the report closed.
//!
//! No stage failure aborts the submission handler: every stage's request,
//! response, and validation outcome is captured in the
//! [`SubmissionTrace`] so the caller sees the full picture. Stages whose
//! required identifier never materialized are skipped with an explicit
//! diagnostic instead of attempting the call.

use crate::config::{ReportingConfig, ValidationPolicy};
use crate::models::{
    Attachment, FileId, PipelineState, ReportCase, ReportId, Stage, StageReport, SubmissionTrace,
};
use crate::reporting::ReportingApi;
use crate::schema;
use crate::xml;
use uuid::Uuid;

const NO_REPORT_ID: &str = "no reportId element in submit response — report open failed";
const MISSING_UPLOAD_INPUT: &str = "missing report ID or file — upload skipped";
const NEVER_OPENED: &str = "No report ID detected — did you ever actually open a report?";

/// Run the full pipeline for one case.
///
/// The attachment is consumed here: it is read exactly once, by the upload
/// stage.
pub async fn run<R: ReportingApi>(
    api: &R,
    cfg: &ReportingConfig,
    case: &ReportCase,
    attachment: Option<Attachment>,
) -> SubmissionTrace {
    let submission_id = Uuid::new_v4();
    let base = cfg.base_url(case.is_test);
    let mut state = PipelineState::Pending;
    let mut stages = Vec::with_capacity(4);

    tracing::info!(
        %submission_id,
        is_test = case.is_test,
        reported_user = %case.reported_user.username,
        "starting takedown submission"
    );

    // ── Stage 1: open the report ──────────────────────────────────────────────
    let submit = submit_stage(api, cfg, base, case).await;
    if let Some(id) = &submit.extracted_id {
        state = PipelineState::Opened(ReportId(id.clone()));
    }
    stages.push(submit);

    // ── Stage 2: upload the evidence file ─────────────────────────────────────
    // A zero-byte part is what browsers send when no file was selected;
    // treat it the same as an absent attachment.
    let upload = match (state.report_id().cloned(), &attachment) {
        (Some(report_id), Some(file)) if !file.bytes.is_empty() => {
            let report = upload_stage(api, base, &report_id, file).await;
            if let Some(fid) = &report.extracted_id {
                state = PipelineState::Uploaded(report_id, FileId(fid.clone()));
            }
            report
        }
        _ => StageReport::skipped(Stage::Upload, MISSING_UPLOAD_INPUT),
    };
    stages.push(upload);

    // ── Stage 3: file metadata ────────────────────────────────────────────────
    let file_name = attachment.as_ref().map(|a| a.file_name.clone());
    let file_info = match state.report_id() {
        Some(report_id) => {
            file_info_stage(
                api,
                cfg,
                base,
                report_id,
                state.file_id(),
                file_name.as_deref().unwrap_or_default(),
            )
            .await
        }
        None => StageReport::skipped(Stage::FileInfo, NO_REPORT_ID),
    };
    stages.push(file_info);

    // ── Stage 4: close the report ─────────────────────────────────────────────
    // Attempted whenever a report was opened, even after a file-info failure:
    // closing depends only on the report id.
    let (finish, closed) = match state.report_id().cloned() {
        Some(report_id) => {
            let report = finish_stage(api, base, &report_id).await;
            let closed = report.success;
            state = PipelineState::Finalized { report_id, closed };
            (report, closed)
        }
        None => (StageReport::skipped(Stage::Finish, NEVER_OPENED), false),
    };
    stages.push(finish);

    let report_id = state.report_id().cloned();
    let file_id = stages
        .iter()
        .find(|s| s.stage == Stage::Upload)
        .and_then(|s| s.extracted_id.clone())
        .map(FileId);

    let message = final_message(report_id.as_ref(), closed, &stages[0]);

    let trace = SubmissionTrace {
        submission_id,
        is_test: case.is_test,
        stages,
        report_id,
        file_id,
        success: closed,
        message,
    };

    tracing::info!(
        %submission_id,
        success = trace.success,
        report_id = ?trace.report_id,
        "takedown submission finished"
    );

    trace
}

fn final_message(report_id: Option<&ReportId>, closed: bool, submit: &StageReport) -> String {
    match (report_id, closed) {
        (Some(id), true) => format!(
            "Thank you — report {id} has been submitted and closed, and all log \
             information has been saved. Remember to notify the legal team so the \
             file is permanently deleted."
        ),
        (Some(id), false) => format!(
            "Report {id} was opened but there may have been an issue closing it or \
             earlier in the process — check the stage reports."
        ),
        (None, _) if !submit.attempted => {
            "The report document was never sent — see the submit stage diagnostics; \
             no report was opened."
                .to_string()
        }
        (None, _) if submit.response_body.is_none() => {
            "The reporting service could not be reached — no report was opened.".to_string()
        }
        (None, _) => format!("{NO_REPORT_ID}; nothing was uploaded or closed."),
    }
}

// ── Stages ────────────────────────────────────────────────────────────────────

async fn submit_stage<R: ReportingApi>(
    api: &R,
    cfg: &ReportingConfig,
    base: &str,
    case: &ReportCase,
) -> StageReport {
    let mut report = StageReport::pending(Stage::Submit);

    let document = match xml::build_report(case, cfg) {
        Ok(doc) => doc,
        Err(e) => {
            report.diagnostic = Some(format!("failed to build report document: {e}"));
            return report;
        }
    };
    report.request_violations = validate_request(&document, schema::validate_report);
    report.request_body = Some(document.clone());

    if blocked(cfg, &report.request_violations) {
        report.diagnostic = Some(blocked_diagnostic(&report.request_violations));
        return report;
    }

    report.attempted = true;
    let body = match api.submit_report(base, &document).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("submit stage transport failure: {e}");
            report.diagnostic = Some(e.to_string());
            return report;
        }
    };

    match xml::parse_api_response(&body) {
        Ok(parsed) => {
            report.response_violations = validate_response_body(&body);
            report.extracted_id = parsed.report_id;
            report.success = report.extracted_id.is_some();
            if !report.success {
                report.diagnostic = Some(NO_REPORT_ID.to_string());
            }
        }
        Err(e) => {
            report.diagnostic = Some(format!("unparseable submit response: {e}"));
        }
    }
    report.response_body = Some(body);
    report
}

async fn upload_stage<R: ReportingApi>(
    api: &R,
    base: &str,
    report_id: &ReportId,
    attachment: &Attachment,
) -> StageReport {
    let mut report = StageReport::pending(Stage::Upload);
    report.attempted = true;

    let body = match api.upload_file(base, &report_id.0, attachment).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("upload stage transport failure: {e}");
            report.diagnostic = Some(e.to_string());
            return report;
        }
    };

    match xml::parse_api_response(&body) {
        Ok(parsed) => {
            report.response_violations = validate_response_body(&body);
            report.extracted_id = parsed.file_id;
            report.success = report.extracted_id.is_some();
            if !report.success {
                report.diagnostic =
                    Some("no fileId element in upload response — file upload failed".to_string());
            }
        }
        Err(e) => {
            report.diagnostic = Some(format!("unparseable upload response: {e}"));
        }
    }
    report.response_body = Some(body);
    report
}

async fn file_info_stage<R: ReportingApi>(
    api: &R,
    cfg: &ReportingConfig,
    base: &str,
    report_id: &ReportId,
    file_id: Option<&FileId>,
    file_name: &str,
) -> StageReport {
    let mut report = StageReport::pending(Stage::FileInfo);

    let document = match xml::build_file_details(report_id, file_id, file_name) {
        Ok(doc) => doc,
        Err(e) => {
            report.diagnostic = Some(format!("failed to build fileDetails document: {e}"));
            return report;
        }
    };
    report.request_violations = validate_request(&document, schema::validate_file_details);
    report.request_body = Some(document.clone());

    if blocked(cfg, &report.request_violations) {
        report.diagnostic = Some(blocked_diagnostic(&report.request_violations));
        return report;
    }

    report.attempted = true;
    let body = match api.send_file_info(base, &document).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("file-info stage transport failure: {e}");
            report.diagnostic = Some(e.to_string());
            return report;
        }
    };

    finish_from_response_code(&mut report, &body, "file details were not accepted");
    report
}

async fn finish_stage<R: ReportingApi>(api: &R, base: &str, report_id: &ReportId) -> StageReport {
    let mut report = StageReport::pending(Stage::Finish);
    report.attempted = true;

    let body = match api.close_report(base, &report_id.0).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("finish stage transport failure: {e}");
            report.diagnostic = Some(e.to_string());
            return report;
        }
    };

    finish_from_response_code(&mut report, &body, "the report was not closed");
    report
}

/// Shared tail for the two responseCode-style stages.
fn finish_from_response_code(report: &mut StageReport, body: &str, failure: &str) {
    match xml::parse_api_response(body) {
        Ok(parsed) => {
            report.response_violations = validate_response_body(body);
            report.response_code = parsed.response_code;
            report.success = parsed.response_code == Some(0);
            if !report.success {
                report.diagnostic = Some(match parsed.response_code {
                    Some(code) => format!("{failure}: responseCode {code}"),
                    None => format!("{failure}: no responseCode in response"),
                });
            }
        }
        Err(e) => {
            report.diagnostic = Some(format!("unparseable response: {e}"));
        }
    }
    report.response_body = Some(body.to_string());
}

fn validate_request(
    document: &str,
    validate: impl Fn(&xml::XmlNode) -> Vec<schema::SchemaViolation>,
) -> Vec<schema::SchemaViolation> {
    match xml::parse(document) {
        Ok(root) => validate(&root),
        Err(e) => vec![schema::SchemaViolation {
            path: "/".into(),
            message: format!("document did not parse: {e}"),
        }],
    }
}

fn validate_response_body(body: &str) -> Vec<schema::SchemaViolation> {
    match xml::parse(body) {
        Ok(root) => schema::validate_response(&root),
        Err(e) => vec![schema::SchemaViolation {
            path: "/".into(),
            message: format!("response did not parse: {e}"),
        }],
    }
}

fn blocked(cfg: &ReportingConfig, violations: &[schema::SchemaViolation]) -> bool {
    cfg.validation_policy == ValidationPolicy::Block && !violations.is_empty()
}

fn blocked_diagnostic(violations: &[schema::SchemaViolation]) -> String {
    format!(
        "schema validation failed and policy is 'block' ({} violation(s)) — stage not attempted",
        violations.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::error::TransportError;
    use crate::models::test_case;
    use std::sync::Mutex;

    /// Scripted reporting API that records every call it receives.
    struct MockApi {
        submit: Result<String, TransportError>,
        upload: Result<String, TransportError>,
        file_info: Result<String, TransportError>,
        finish: Result<String, TransportError>,
        calls: Mutex<Vec<(&'static str, String)>>,
    }

    impl MockApi {
        fn happy_path() -> Self {
            Self {
                submit: Ok("<report><reportId>R1</reportId></report>".into()),
                upload: Ok("<report><fileId>F1</fileId></report>".into()),
                file_info: Ok("<report><responseCode>0</responseCode></report>".into()),
                finish: Ok("<report><responseCode>0</responseCode></report>".into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, call: &'static str, base: &str) {
            self.calls.lock().unwrap().push((call, base.to_string()));
        }

        fn call_names(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().iter().map(|(c, _)| *c).collect()
        }
    }

    impl ReportingApi for MockApi {
        async fn submit_report(
            &self,
            base_url: &str,
            _report_xml: &str,
        ) -> Result<String, TransportError> {
            self.record("submit", base_url);
            self.submit.clone()
        }

        async fn upload_file(
            &self,
            base_url: &str,
            _report_id: &str,
            _attachment: &Attachment,
        ) -> Result<String, TransportError> {
            self.record("upload", base_url);
            self.upload.clone()
        }

        async fn send_file_info(
            &self,
            base_url: &str,
            _file_details_xml: &str,
        ) -> Result<String, TransportError> {
            self.record("fileinfo", base_url);
            self.file_info.clone()
        }

        async fn close_report(
            &self,
            base_url: &str,
            _report_id: &str,
        ) -> Result<String, TransportError> {
            self.record("finish", base_url);
            self.finish.clone()
        }

        async fn retract_report(
            &self,
            base_url: &str,
            _report_id: &str,
        ) -> Result<String, TransportError> {
            self.record("retract", base_url);
            Ok("<report><responseCode>0</responseCode></report>".into())
        }
    }

    fn attachment() -> Attachment {
        Attachment {
            file_name: "photo.jpg".into(),
            size: 4,
            content_type: "image/jpeg".into(),
            bytes: b"jpeg".to_vec(),
        }
    }

    #[tokio::test]
    async fn full_success_runs_all_stages_in_order() {
        let api = MockApi::happy_path();
        let trace = run(&api, &test_config(), &test_case(), Some(attachment())).await;

        assert_eq!(api.call_names(), ["submit", "upload", "fileinfo", "finish"]);
        assert!(trace.success);
        assert_eq!(trace.report_id, Some(ReportId("R1".into())));
        assert_eq!(trace.file_id, Some(FileId("F1".into())));
        assert!(trace.message.contains("R1"));
        assert!(trace.stages.iter().all(|s| s.attempted && s.success));
    }

    #[tokio::test]
    async fn test_flag_selects_test_base_url() {
        let api = MockApi::happy_path();
        let cfg = test_config();
        run(&api, &cfg, &test_case(), Some(attachment())).await;

        let calls = api.calls.lock().unwrap();
        assert!(calls.iter().all(|(_, base)| base == &cfg.test_url));
    }

    #[tokio::test]
    async fn production_flag_selects_production_base_url() {
        let api = MockApi::happy_path();
        let cfg = test_config();
        let mut case = test_case();
        case.is_test = false;
        run(&api, &cfg, &case, Some(attachment())).await;

        let calls = api.calls.lock().unwrap();
        assert!(calls.iter().all(|(_, base)| base == &cfg.production_url));
    }

    #[tokio::test]
    async fn failed_close_keeps_identifiers_and_reports_failure() {
        let api = MockApi {
            finish: Ok("<report><responseCode>1</responseCode></report>".into()),
            ..MockApi::happy_path()
        };
        let trace = run(&api, &test_config(), &test_case(), Some(attachment())).await;

        assert!(!trace.success);
        assert_eq!(trace.report_id, Some(ReportId("R1".into())));
        assert_eq!(trace.file_id, Some(FileId("F1".into())));
        assert!(!trace.message.contains("Thank you"));

        let finish = trace.stages.iter().find(|s| s.stage == Stage::Finish).unwrap();
        assert_eq!(finish.response_code, Some(1));
        assert!(!finish.success);
    }

    #[tokio::test]
    async fn missing_report_id_short_circuits_everything() {
        let api = MockApi {
            submit: Ok("<report><somethingElse>x</somethingElse></report>".into()),
            ..MockApi::happy_path()
        };
        let trace = run(&api, &test_config(), &test_case(), Some(attachment())).await;

        // Only the submit call went out on the wire.
        assert_eq!(api.call_names(), ["submit"]);
        assert!(!trace.success);
        assert!(trace.report_id.is_none());
        assert!(trace.message.contains("no reportId"));

        for stage in &trace.stages[1..] {
            assert!(!stage.attempted);
            assert!(stage.diagnostic.is_some());
        }
        let finish = trace.stages.iter().find(|s| s.stage == Stage::Finish).unwrap();
        assert!(finish
            .diagnostic
            .as_deref()
            .unwrap()
            .contains("did you ever actually open a report"));
    }

    #[tokio::test]
    async fn missing_attachment_skips_upload_without_a_call() {
        let api = MockApi::happy_path();
        let trace = run(&api, &test_config(), &test_case(), None).await;

        assert_eq!(api.call_names(), ["submit", "fileinfo", "finish"]);

        let upload = trace.stages.iter().find(|s| s.stage == Stage::Upload).unwrap();
        assert!(!upload.attempted);
        assert_eq!(
            upload.diagnostic.as_deref(),
            Some("missing report ID or file — upload skipped")
        );
        assert!(trace.file_id.is_none());
    }

    #[tokio::test]
    async fn empty_evidence_file_skips_upload() {
        let api = MockApi::happy_path();
        let mut file = attachment();
        file.bytes.clear();
        file.size = 0;
        let trace = run(&api, &test_config(), &test_case(), Some(file)).await;

        // No upload call goes out for a zero-byte part.
        assert_eq!(api.call_names(), ["submit", "fileinfo", "finish"]);

        let upload = trace.stages.iter().find(|s| s.stage == Stage::Upload).unwrap();
        assert!(!upload.attempted);
        assert_eq!(
            upload.diagnostic.as_deref(),
            Some("missing report ID or file — upload skipped")
        );
        assert!(trace.file_id.is_none());
    }

    #[tokio::test]
    async fn submit_transport_failure_aborts_all_later_stages() {
        let api = MockApi {
            submit: Err(TransportError {
                endpoint: "https://exttest.example.org/ispws/submit".into(),
                message: "connection refused".into(),
            }),
            ..MockApi::happy_path()
        };
        let trace = run(&api, &test_config(), &test_case(), Some(attachment())).await;

        assert_eq!(api.call_names(), ["submit"]);
        assert!(!trace.success);
        assert!(trace.message.contains("could not be reached"));

        let submit = &trace.stages[0];
        assert!(submit.attempted);
        assert!(submit.diagnostic.as_deref().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn upload_transport_failure_still_attempts_finalize() {
        let api = MockApi {
            upload: Err(TransportError {
                endpoint: "https://exttest.example.org/ispws/upload".into(),
                message: "timed out".into(),
            }),
            ..MockApi::happy_path()
        };
        let trace = run(&api, &test_config(), &test_case(), Some(attachment())).await;

        // Close depends only on the report id, so fileinfo and finish still run.
        assert_eq!(api.call_names(), ["submit", "upload", "fileinfo", "finish"]);
        assert!(trace.success);
        assert!(trace.file_id.is_none());
    }

    #[tokio::test]
    async fn file_info_failure_does_not_block_close() {
        let api = MockApi {
            file_info: Ok("<report><responseCode>7</responseCode></report>".into()),
            ..MockApi::happy_path()
        };
        let trace = run(&api, &test_config(), &test_case(), Some(attachment())).await;

        let file_info = trace.stages.iter().find(|s| s.stage == Stage::FileInfo).unwrap();
        assert!(!file_info.success);
        assert_eq!(file_info.response_code, Some(7));
        assert!(trace.success);
    }

    #[tokio::test]
    async fn block_policy_stops_invalid_document_before_the_wire() {
        let api = MockApi::happy_path();
        let mut cfg = test_config();
        cfg.validation_policy = ValidationPolicy::Block;
        let mut case = test_case();
        case.incident_datetime = "not-a-datetime".into();

        let trace = run(&api, &cfg, &case, Some(attachment())).await;

        assert!(api.call_names().is_empty());
        let submit = &trace.stages[0];
        assert!(!submit.attempted);
        assert!(!submit.request_violations.is_empty());
        assert!(submit.diagnostic.as_deref().unwrap().contains("policy is 'block'"));

        // The narrative says the document never went out, not that the
        // response lacked a reportId.
        assert!(trace.message.contains("never sent"));
        assert!(!trace.message.contains("submit response"));
    }

    #[tokio::test]
    async fn warn_policy_records_violations_but_proceeds() {
        let api = MockApi::happy_path();
        let mut case = test_case();
        case.incident_datetime = "not-a-datetime".into();

        let trace = run(&api, &test_config(), &case, Some(attachment())).await;

        assert_eq!(api.call_names(), ["submit", "upload", "fileinfo", "finish"]);
        assert!(!trace.stages[0].request_violations.is_empty());
        assert!(trace.success);
    }

    #[tokio::test]
    async fn stage_bodies_are_retained_verbatim() {
        let api = MockApi::happy_path();
        let trace = run(&api, &test_config(), &test_case(), Some(attachment())).await;

        let submit = &trace.stages[0];
        let request = submit.request_body.as_deref().unwrap();
        assert!(request.contains("<screenName>Example</screenName>"));
        assert_eq!(
            submit.response_body.as_deref(),
            Some("<report><reportId>R1</reportId></report>")
        );
    }
}
