//! Structural validation against the reporting service's fixed schema.
//!
//! The service publishes an XSD; the gateway checks the same structural
//! rules locally before (and after) each round-trip so that a bad document
//! is caught with a readable diagnostic instead of an opaque rejection.
//! Violations are plain data — whether they gate the network call is the
//! [`ValidationPolicy`](crate::config::ValidationPolicy) decision.

use crate::xml::XmlNode;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// One schema rule the document broke, located by element path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

fn violation(path: impl Into<String>, message: impl Into<String>) -> SchemaViolation {
    SchemaViolation {
        path: path.into(),
        message: message.into(),
    }
}

fn datetime_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z$").expect("static regex")
    })
}

/// Validate a full report document.
pub fn validate_report(root: &XmlNode) -> Vec<SchemaViolation> {
    let mut out = Vec::new();

    if root.name != "report" {
        out.push(violation(
            "/",
            format!("expected root element 'report', found '{}'", root.name),
        ));
        return out;
    }

    match root.child("incidentSummary") {
        Some(summary) => {
            require_text(summary, "/report/incidentSummary", "incidentType", &mut out);
            require_datetime(summary, "/report/incidentSummary", "incidentDateTime", &mut out);
        }
        None => out.push(violation("/report", "missing required element 'incidentSummary'")),
    }

    match root.at(&["internetDetails", "webPageIncident"]) {
        Some(page) => {
            require_text(page, "/report/internetDetails/webPageIncident", "url", &mut out)
        }
        None => out.push(violation(
            "/report",
            "missing required element 'internetDetails/webPageIncident'",
        )),
    }

    match root.child("reporter") {
        Some(reporter) => {
            match reporter.child("reportingPerson") {
                Some(person) => {
                    validate_person("/report/reporter/reportingPerson", person, &mut out)
                }
                None => out.push(violation(
                    "/report/reporter",
                    "missing required element 'reportingPerson'",
                )),
            }
            match reporter.child("contactPerson") {
                Some(person) => {
                    validate_person("/report/reporter/contactPerson", person, &mut out);
                    require_text(person, "/report/reporter/contactPerson", "phone", &mut out);
                }
                None => out.push(violation(
                    "/report/reporter",
                    "missing required element 'contactPerson'",
                )),
            }
        }
        None => out.push(violation("/report", "missing required element 'reporter'")),
    }

    match root.child("personOrUserReported") {
        Some(reported) => validate_reported_user(reported, &mut out),
        None => out.push(violation(
            "/report",
            "missing required element 'personOrUserReported'",
        )),
    }

    out
}

fn validate_person(path: &str, person: &XmlNode, out: &mut Vec<SchemaViolation>) {
    require_text(person, path, "firstName", out);
    require_text(person, path, "lastName", out);
    require_text(person, path, "email", out);

    match person.child("address") {
        Some(address) => {
            let addr_path = format!("{path}/address");
            if address.attr("type") != Some("Business") {
                out.push(violation(&addr_path, "address must carry type=\"Business\""));
            }
            for leaf in ["address", "city", "zipCode", "state", "country"] {
                require_text(address, &addr_path, leaf, out);
            }
        }
        None => out.push(violation(path, "missing required element 'address'")),
    }
}

fn validate_reported_user(reported: &XmlNode, out: &mut Vec<SchemaViolation>) {
    let path = "/report/personOrUserReported";
    require_text(reported, path, "screenName", out);

    // Optional sections must be complete when present.
    if let Some(person) = reported.child("personOrUserReportedPerson") {
        require_text(person, &format!("{path}/personOrUserReportedPerson"), "email", out);
    }
    if let Some(event) = reported.child("ipCaptureEvent") {
        let event_path = format!("{path}/ipCaptureEvent");
        require_text(event, &event_path, "ipAddress", out);
        require_text(event, &event_path, "eventName", out);
        require_datetime(event, &event_path, "dateTime", out);
    }
}

/// Validate the `fileDetails` document posted at finalize time.
pub fn validate_file_details(root: &XmlNode) -> Vec<SchemaViolation> {
    let mut out = Vec::new();

    if root.name != "fileDetails" {
        out.push(violation(
            "/",
            format!("expected root element 'fileDetails', found '{}'", root.name),
        ));
        return out;
    }

    require_text(root, "/fileDetails", "reportId", &mut out);
    require_text(root, "/fileDetails", "fileId", &mut out);
    require_text(root, "/fileDetails", "fileName", &mut out);

    out
}

/// Lenient check for response bodies: the service answers with the same
/// document vocabulary, so any recognizable identifier or response code is
/// accepted; a body carrying none of them is flagged.
pub fn validate_response(root: &XmlNode) -> Vec<SchemaViolation> {
    let known = ["reportId", "fileId", "responseCode"];
    let mut found = false;
    walk(root, &mut |node| {
        if known.contains(&node.name.as_str()) {
            found = true;
        }
    });

    if found {
        Vec::new()
    } else {
        vec![violation(
            "/",
            "response carries none of reportId, fileId, responseCode",
        )]
    }
}

fn walk(node: &XmlNode, f: &mut impl FnMut(&XmlNode)) {
    f(node);
    for child in &node.children {
        walk(child, f);
    }
}

fn require_text(parent: &XmlNode, path: &str, name: &str, out: &mut Vec<SchemaViolation>) {
    match parent.child(name) {
        Some(el) if !el.text.trim().is_empty() => {}
        Some(_) => out.push(violation(
            format!("{path}/{name}"),
            format!("element '{name}' must not be empty"),
        )),
        None => out.push(violation(
            path.to_string(),
            format!("missing required element '{name}'"),
        )),
    }
}

fn require_datetime(parent: &XmlNode, path: &str, name: &str, out: &mut Vec<SchemaViolation>) {
    require_text(parent, path, name, out);
    if let Some(text) = parent.text_at(&[name]) {
        if !text.is_empty() && !datetime_re().is_match(text) {
            out.push(violation(
                format!("{path}/{name}"),
                format!("'{text}' is not a YYYY-MM-DDTHH:MM:SSZ datetime"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::models::test_case;
    use crate::xml;

    #[test]
    fn built_report_is_schema_valid() {
        let doc = xml::build_report(&test_case(), &test_config()).unwrap();
        let root = xml::parse(&doc).unwrap();
        assert_eq!(validate_report(&root), Vec::new());
    }

    #[test]
    fn built_report_without_optionals_is_schema_valid() {
        let mut case = test_case();
        case.reported_user.email = None;
        case.reported_user.ip = None;

        let doc = xml::build_report(&case, &test_config()).unwrap();
        let root = xml::parse(&doc).unwrap();
        assert_eq!(validate_report(&root), Vec::new());
    }

    #[test]
    fn missing_screen_name_is_flagged() {
        let doc = "<report>\
             <incidentSummary><incidentType>x</incidentType>\
             <incidentDateTime>2024-01-06T10:30:00Z</incidentDateTime></incidentSummary>\
             <internetDetails><webPageIncident><url>https://x</url></webPageIncident></internetDetails>\
             <personOrUserReported><additionalInfo>y</additionalInfo></personOrUserReported>\
             </report>";
        let root = xml::parse(doc).unwrap();
        let violations = validate_report(&root);

        assert!(violations
            .iter()
            .any(|v| v.message.contains("'screenName'")));
        assert!(violations.iter().any(|v| v.message.contains("'reporter'")));
    }

    #[test]
    fn malformed_datetime_is_flagged() {
        let mut case = test_case();
        case.incident_datetime = "2024-01-06 10:30".into();

        let doc = xml::build_report(&case, &test_config()).unwrap();
        let root = xml::parse(&doc).unwrap();
        let violations = validate_report(&root);

        assert!(violations
            .iter()
            .any(|v| v.path == "/report/incidentSummary/incidentDateTime"));
    }

    #[test]
    fn wrong_root_short_circuits() {
        let root = xml::parse("<notareport/>").unwrap();
        let violations = validate_report(&root);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("expected root element"));
    }

    #[test]
    fn file_details_missing_file_id_is_flagged() {
        let root =
            xml::parse("<fileDetails><reportId>R1</reportId><fileName>a.jpg</fileName></fileDetails>")
                .unwrap();
        let violations = validate_file_details(&root);
        assert!(violations.iter().any(|v| v.message.contains("'fileId'")));
    }

    #[test]
    fn response_with_known_field_passes_lenient_check() {
        let root = xml::parse("<report><reportId>R1</reportId></report>").unwrap();
        assert!(validate_response(&root).is_empty());

        let root = xml::parse("<report><other>1</other></report>").unwrap();
        assert_eq!(validate_response(&root).len(), 1);
    }
}
