//! Building and parsing the reporting API's fixed XML documents.
//!
//! The wire schema is owned by the report-receiving service: root `report`
//! with `incidentSummary`, `internetDetails`, `reporter`, and
//! `personOrUserReported` sections, plus a small `fileDetails` document for
//! the finalize step. Responses carry `reportId`, `fileId`, or
//! `responseCode`.

use crate::config::ReportingConfig;
use crate::error::XmlError;
use crate::models::{FileId, ReportCase, ReportId};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

/// Fixed event name for IP capture entries — uploads are the only event the
/// wiki platform records.
pub const IP_CAPTURE_EVENT: &str = "Upload";

// ── Document tree ─────────────────────────────────────────────────────────────

/// A parsed XML element. The reporting schema has no mixed content, so text
/// and children are kept side by side.
#[derive(Debug, Clone, Default)]
pub struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    pub text: String,
}

impl XmlNode {
    fn named(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// First direct child with the given element name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Descend through a chain of child element names.
    pub fn at(&self, path: &[&str]) -> Option<&XmlNode> {
        let mut node = self;
        for name in path {
            node = node.child(name)?;
        }
        Some(node)
    }

    /// Trimmed text content at a child path, if the element exists.
    pub fn text_at(&self, path: &[&str]) -> Option<&str> {
        self.at(path).map(|n| n.text.trim())
    }

    /// Value of a named attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse a document into an [`XmlNode`] tree.
pub fn parse(xml: &str) -> Result<XmlNode, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                stack.push(node_from_start(&e)?);
            }
            Event::Empty(e) => {
                let node = node_from_start(&e)?;
                attach(node, &mut stack, &mut root)?;
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape()?);
                }
            }
            Event::End(_) => {
                let node = stack.pop().ok_or(XmlError::Unbalanced)?;
                attach(node, &mut stack, &mut root)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Unbalanced);
    }
    root.ok_or(XmlError::Empty)
}

fn node_from_start(e: &BytesStart<'_>) -> Result<XmlNode, XmlError> {
    let name = String::from_utf8(e.name().as_ref().to_vec())?;
    let mut node = XmlNode::named(name);
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8(attr.key.as_ref().to_vec())?;
        let value = attr
            .unescape_value()
            .map_err(quick_xml::Error::from)?
            .into_owned();
        node.attrs.push((key, value));
    }
    Ok(node)
}

fn attach(
    node: XmlNode,
    stack: &mut Vec<XmlNode>,
    root: &mut Option<XmlNode>,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_some() {
                return Err(XmlError::Unbalanced);
            }
            *root = Some(node);
        }
    }
    Ok(())
}

// ── Typed responses ───────────────────────────────────────────────────────────

/// Fields the reporting API may return. Absence is an explicit `None`, never
/// a failed lookup at a call site.
#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    pub report_id: Option<String>,
    pub file_id: Option<String>,
    pub response_code: Option<i32>,
}

/// Parse a response body into its typed fields.
///
/// The service nests identifiers at varying depths, so each field is taken
/// from the first element carrying its tag. An unparseable `responseCode`
/// is treated as absent; callers treat absence as failure.
pub fn parse_api_response(xml: &str) -> Result<ApiResponse, XmlError> {
    let root = parse(xml)?;
    Ok(ApiResponse {
        report_id: find_text(&root, "reportId"),
        file_id: find_text(&root, "fileId"),
        response_code: find_text(&root, "responseCode").and_then(|s| s.trim().parse().ok()),
    })
}

fn find_text(node: &XmlNode, name: &str) -> Option<String> {
    if node.name == name {
        let text = node.text.trim();
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }
    node.children.iter().find_map(|c| find_text(c, name))
}

// ── Report builder ────────────────────────────────────────────────────────────

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Build the full report document for one case.
///
/// Static reporter/contact fields come from configuration only; the
/// reported user's email and IP sections are emitted only when the value is
/// present — never as empty placeholders.
pub fn build_report(case: &ReportCase, cfg: &ReportingConfig) -> Result<String, XmlError> {
    let mut w = writer();

    open(&mut w, "report")?;

    open(&mut w, "incidentSummary")?;
    leaf(&mut w, "incidentType", case.incident_type.as_wire_str())?;
    leaf(&mut w, "incidentDateTime", &case.incident_datetime)?;
    close(&mut w, "incidentSummary")?;

    open(&mut w, "internetDetails")?;
    open(&mut w, "webPageIncident")?;
    leaf(&mut w, "url", &case.page_url)?;
    close(&mut w, "webPageIncident")?;
    close(&mut w, "internetDetails")?;

    open(&mut w, "reporter")?;

    open(&mut w, "reportingPerson")?;
    leaf(&mut w, "firstName", &case.reporter.first_name)?;
    leaf(&mut w, "lastName", &case.reporter.last_name)?;
    leaf(&mut w, "email", &case.reporter.email)?;
    business_address(&mut w, cfg)?;
    close(&mut w, "reportingPerson")?;

    open(&mut w, "contactPerson")?;
    leaf(&mut w, "firstName", &cfg.contact.first_name)?;
    leaf(&mut w, "lastName", &cfg.contact.last_name)?;
    typed_leaf(&mut w, "phone", "Business", &cfg.contact.phone)?;
    leaf(&mut w, "email", &cfg.contact.email)?;
    business_address(&mut w, cfg)?;
    close(&mut w, "contactPerson")?;

    close(&mut w, "reporter")?;

    open(&mut w, "personOrUserReported")?;
    if let Some(email) = non_empty(case.reported_user.email.as_deref()) {
        open(&mut w, "personOrUserReportedPerson")?;
        leaf(&mut w, "email", email)?;
        close(&mut w, "personOrUserReportedPerson")?;
    }
    leaf(&mut w, "screenName", &case.reported_user.username)?;
    if let Some(ip) = non_empty(case.reported_user.ip.as_deref()) {
        open(&mut w, "ipCaptureEvent")?;
        leaf(&mut w, "ipAddress", ip)?;
        leaf(&mut w, "eventName", IP_CAPTURE_EVENT)?;
        leaf(&mut w, "dateTime", &case.incident_datetime)?;
        close(&mut w, "ipCaptureEvent")?;
    }
    leaf(&mut w, "additionalInfo", &case.additional_info)?;
    close(&mut w, "personOrUserReported")?;

    close(&mut w, "report")?;

    finish(w)
}

/// Build the small `fileDetails` document for the finalize step.
///
/// The `fileId` element is omitted when the upload stage never produced
/// one; the schema check will flag the omission as a recorded violation.
pub fn build_file_details(
    report_id: &ReportId,
    file_id: Option<&FileId>,
    file_name: &str,
) -> Result<String, XmlError> {
    let mut w = writer();

    open(&mut w, "fileDetails")?;
    leaf(&mut w, "reportId", &report_id.0)?;
    if let Some(fid) = file_id {
        leaf(&mut w, "fileId", &fid.0)?;
    }
    leaf(&mut w, "fileName", file_name)?;
    close(&mut w, "fileDetails")?;

    finish(w)
}

fn writer() -> XmlWriter {
    Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2)
}

fn finish(w: XmlWriter) -> Result<String, XmlError> {
    let bytes = w.into_inner().into_inner();
    let body = String::from_utf8(bytes)?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}\n"))
}

fn open(w: &mut XmlWriter, tag: &str) -> Result<(), XmlError> {
    w.write_event(Event::Start(BytesStart::new(tag)))
        .map_err(XmlError::from)
}

fn close(w: &mut XmlWriter, tag: &str) -> Result<(), XmlError> {
    w.write_event(Event::End(BytesEnd::new(tag)))
        .map_err(XmlError::from)
}

fn leaf(w: &mut XmlWriter, tag: &str, value: &str) -> Result<(), XmlError> {
    open(w, tag)?;
    w.write_event(Event::Text(BytesText::new(value)))?;
    close(w, tag)
}

/// Leaf element carrying the schema's `type` attribute.
fn typed_leaf(w: &mut XmlWriter, tag: &str, ty: &str, value: &str) -> Result<(), XmlError> {
    let mut start = BytesStart::new(tag);
    start.push_attribute(("type", ty));
    w.write_event(Event::Start(start))?;
    w.write_event(Event::Text(BytesText::new(value)))?;
    close(w, tag)
}

fn business_address(w: &mut XmlWriter, cfg: &ReportingConfig) -> Result<(), XmlError> {
    let mut start = BytesStart::new("address");
    start.push_attribute(("type", "Business"));
    w.write_event(Event::Start(start))?;
    leaf(w, "address", &cfg.address.street)?;
    leaf(w, "city", &cfg.address.city)?;
    leaf(w, "zipCode", &cfg.address.zip)?;
    leaf(w, "state", &cfg.address.state)?;
    leaf(w, "country", &cfg.address.country)?;
    close(w, "address")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
