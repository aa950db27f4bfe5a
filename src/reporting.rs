//! Transport to the external reporting API.
//!
//! The service exposes five endpoints under one base URL: `submit`
//! (open a report), `upload` (attach the evidence file), `fileinfo`
//! (file metadata), `finish` (close), and `retract`. The base URL switches
//! between a test and a production deployment per submission.
//!
//! The pipeline talks to the API through the [`ReportingApi`] trait so the
//! stage sequencing can be exercised without a network.

use crate::error::TransportError;
use crate::models::Attachment;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;

/// Remote calls the reporting service accepts. Every method returns the raw
/// response body; parsing and identifier extraction stay with the caller so
/// the trace can retain the body verbatim.
#[allow(async_fn_in_trait)]
pub trait ReportingApi {
    /// POST the report document to `{base}submit`.
    async fn submit_report(&self, base_url: &str, report_xml: &str)
        -> Result<String, TransportError>;

    /// Multipart-POST the evidence file to `{base}upload`, correlated by
    /// report id.
    async fn upload_file(
        &self,
        base_url: &str,
        report_id: &str,
        attachment: &Attachment,
    ) -> Result<String, TransportError>;

    /// POST the `fileDetails` document to `{base}fileinfo`.
    async fn send_file_info(
        &self,
        base_url: &str,
        file_details_xml: &str,
    ) -> Result<String, TransportError>;

    /// Form-POST the report id to `{base}finish`, marking the report closed.
    async fn close_report(&self, base_url: &str, report_id: &str)
        -> Result<String, TransportError>;

    /// Form-POST the report id to `{base}retract`, withdrawing it.
    async fn retract_report(
        &self,
        base_url: &str,
        report_id: &str,
    ) -> Result<String, TransportError>;
}

/// Production implementation over reqwest.
#[derive(Clone)]
pub struct HttpReportingApi {
    http: reqwest::Client,
    credentials: Option<(String, String)>,
}

impl HttpReportingApi {
    pub fn new(
        timeout: Duration,
        credentials: Option<(String, String)>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("takedown-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, credentials })
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some((user, pass)) => req.basic_auth(user, Some(pass)),
            None => req,
        }
    }

    async fn send(
        &self,
        url: &str,
        req: reqwest::RequestBuilder,
    ) -> Result<String, TransportError> {
        let response = self
            .authed(req)
            .send()
            .await
            .map_err(|e| TransportError::new(url, &e))?
            .error_for_status()
            .map_err(|e| TransportError::new(url, &e))?;

        response
            .text()
            .await
            .map_err(|e| TransportError::new(url, &e))
    }
}

impl ReportingApi for HttpReportingApi {
    async fn submit_report(
        &self,
        base_url: &str,
        report_xml: &str,
    ) -> Result<String, TransportError> {
        let url = format!("{base_url}submit");
        let req = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header(ACCEPT, "text/xml")
            .body(report_xml.to_owned());
        self.send(&url, req).await
    }

    async fn upload_file(
        &self,
        base_url: &str,
        report_id: &str,
        attachment: &Attachment,
    ) -> Result<String, TransportError> {
        let url = format!("{base_url}upload");

        let part = reqwest::multipart::Part::bytes(attachment.bytes.clone())
            .file_name(attachment.file_name.clone())
            .mime_str(&attachment.content_type)
            .map_err(|e| TransportError::new(&url, &e))?;
        let form = reqwest::multipart::Form::new()
            .text("id", report_id.to_owned())
            .part("file", part);

        let req = self.http.post(&url).multipart(form);
        self.send(&url, req).await
    }

    async fn send_file_info(
        &self,
        base_url: &str,
        file_details_xml: &str,
    ) -> Result<String, TransportError> {
        let url = format!("{base_url}fileinfo");
        let req = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header(ACCEPT, "text/xml")
            .body(file_details_xml.to_owned());
        self.send(&url, req).await
    }

    async fn close_report(
        &self,
        base_url: &str,
        report_id: &str,
    ) -> Result<String, TransportError> {
        let url = format!("{base_url}finish");
        let req = self.http.post(&url).form(&[("id", report_id)]);
        self.send(&url, req).await
    }

    async fn retract_report(
        &self,
        base_url: &str,
        report_id: &str,
    ) -> Result<String, TransportError> {
        let url = format!("{base_url}retract");
        let req = self.http.post(&url).form(&[("id", report_id)]);
        self.send(&url, req).await
    }
}
