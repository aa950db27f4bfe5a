//! Wiki-edit collaborator: posts human-readable notices to wiki pages.
//!
//! Independent of the report pipeline and best-effort: a fresh edit token
//! is fetched per call, and a CAPTCHA challenge from the wiki is a distinct
//! outcome — not an error — that the caller must relay to a human, with the
//! challenge URL made absolute.

use crate::config::Environment;
use crate::error::WikiError;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const USER_TALK_SECTION: &str = "Notice of upload removal";
const DMCA_EDIT_SUMMARY: &str = "new takedown";
const VILLAGE_PUMP_EDIT_SUMMARY: &str = "new DMCA takedown notification";

/// CAPTCHA challenge returned by a wiki edit attempt.
#[derive(Debug, Clone, Serialize)]
pub struct CaptchaChallenge {
    #[serde(rename = "type")]
    pub kind: String,
    pub mime: String,
    pub id: String,
    /// Absolute URL of the challenge image.
    pub url: String,
}

/// Result of one wiki edit.
#[derive(Debug, Clone)]
pub enum EditOutcome {
    /// The edit went through; payload is the wiki's `edit` object.
    Edited(Value),
    /// The wiki demands a CAPTCHA before accepting the edit.
    Captcha(CaptchaChallenge),
}

/// Client for the MediaWiki edit API.
#[derive(Clone)]
pub struct MediaWikiClient {
    http: reqwest::Client,
    environment: Environment,
}

impl MediaWikiClient {
    pub fn new(environment: Environment, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("takedown-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, environment })
    }

    /// Post a removal notice as a new section on a user's talk page.
    ///
    /// Outside production all edits land on the test wiki regardless of the
    /// requested site.
    pub async fn post_user_talk(
        &self,
        site_domain: &str,
        username: &str,
        notice: &str,
    ) -> Result<EditOutcome, WikiError> {
        let domain = match self.environment {
            Environment::Production => site_domain,
            Environment::Test => "test2.wikipedia.org",
        };
        let title = format!("User_talk:{}", username.replace(' ', "_"));

        self.edit(
            domain,
            &[
                ("title", title.as_str()),
                ("sectiontitle", USER_TALK_SECTION),
                ("section", "new"),
                ("summary", USER_TALK_SECTION),
                ("text", notice),
                ("recreate", "true"),
            ],
        )
        .await
    }

    /// Append a takedown notice to the central DMCA notices page.
    pub async fn post_commons(&self, text: &str) -> Result<EditOutcome, WikiError> {
        let (domain, title) = match self.environment {
            Environment::Production => ("commons.wikimedia.org", "Commons:Office_actions/DMCA_notices"),
            Environment::Test => ("test2.wikipedia.org", "Office_actions/DMCA_notices"),
        };

        self.edit(
            domain,
            &[
                ("title", title),
                ("summary", DMCA_EDIT_SUMMARY),
                ("appendtext", text),
                ("recreate", "true"),
            ],
        )
        .await
    }

    /// Append a takedown notification to the community noticeboard.
    pub async fn post_village_pump(&self, text: &str) -> Result<EditOutcome, WikiError> {
        let (domain, title) = match self.environment {
            Environment::Production => ("commons.wikimedia.org", "Commons:Village_pump"),
            Environment::Test => ("test2.wikipedia.org", "Wikipedia:Simple_talk"),
        };

        self.edit(
            domain,
            &[
                ("title", title),
                ("summary", VILLAGE_PUMP_EDIT_SUMMARY),
                ("appendtext", text),
                ("recreate", "true"),
            ],
        )
        .await
    }

    /// One edit round-trip: fetch a fresh token, then post the edit form.
    async fn edit(&self, domain: &str, form: &[(&str, &str)]) -> Result<EditOutcome, WikiError> {
        let url = format!("https://{domain}/w/api.php");
        let token = self.get_token(&url).await?;

        let mut params: Vec<(&str, &str)> = form.to_vec();
        params.push(("token", token.as_str()));

        let response = self
            .http
            .post(&url)
            .query(&[("action", "edit"), ("format", "json")])
            .form(&params)
            .send()
            .await?;
        let data: Value = response.json().await?;

        parse_edit_response(domain, &data)
    }

    /// Fetch an edit token. Tokens expire, so one is fetched per edit call.
    async fn get_token(&self, api_url: &str) -> Result<String, WikiError> {
        let response = self
            .http
            .get(api_url)
            .query(&[("action", "tokens"), ("format", "json")])
            .send()
            .await?;
        let data: Value = response.json().await?;

        if let Some(error) = data.get("error") {
            return Err(WikiError::Api(api_error_info(error)));
        }

        data.pointer("/tokens/edittoken")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .ok_or(WikiError::MissingToken)
    }
}

/// Interpret a MediaWiki edit response.
///
/// `error` payloads are errors; an `edit.captcha` object is the CAPTCHA
/// outcome with its URL rewritten to be absolute against the edited domain.
fn parse_edit_response(domain: &str, data: &Value) -> Result<EditOutcome, WikiError> {
    if let Some(error) = data.get("error") {
        return Err(WikiError::Api(api_error_info(error)));
    }

    if let Some(captcha) = data.pointer("/edit/captcha") {
        let relative = captcha.get("url").and_then(Value::as_str).unwrap_or_default();
        return Ok(EditOutcome::Captcha(CaptchaChallenge {
            kind: str_field(captcha, "type"),
            mime: str_field(captcha, "mime"),
            id: str_field(captcha, "id"),
            url: format!("https://{domain}{relative}"),
        }));
    }

    match data.get("edit") {
        Some(edit) => Ok(EditOutcome::Edited(edit.clone())),
        None => Err(WikiError::Api("response carried no edit result".into())),
    }
}

fn api_error_info(error: &Value) -> String {
    error
        .get("info")
        .and_then(Value::as_str)
        .unwrap_or("unknown wiki API error")
        .to_string()
}

/// MediaWiki is loose about scalar types (CAPTCHA ids arrive as numbers or
/// strings), so stringify whatever is there.
fn str_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn captcha_url_is_made_absolute() {
        let data = json!({
            "edit": {
                "captcha": {
                    "type": "image",
                    "mime": "image/png",
                    "id": "1221847824",
                    "url": "/w/index.php?title=Special:Captcha/image&wpCaptchaId=1221847824"
                },
                "result": "Failure"
            }
        });

        let outcome = parse_edit_response("test2.wikipedia.org", &data).unwrap();
        match outcome {
            EditOutcome::Captcha(challenge) => {
                assert_eq!(challenge.kind, "image");
                assert_eq!(challenge.id, "1221847824");
                assert!(challenge.url.starts_with("https://test2.wikipedia.org/w/index.php"));
            }
            EditOutcome::Edited(_) => panic!("expected a captcha outcome"),
        }
    }

    #[test]
    fn api_error_payload_becomes_error() {
        let data = json!({
            "error": { "code": "badtoken", "info": "Invalid CSRF token." }
        });

        let err = parse_edit_response("test2.wikipedia.org", &data).unwrap_err();
        assert!(matches!(err, WikiError::Api(info) if info == "Invalid CSRF token."));
    }

    #[test]
    fn successful_edit_returns_the_edit_object() {
        let data = json!({
            "edit": { "result": "Success", "newrevid": 42 }
        });

        let outcome = parse_edit_response("commons.wikimedia.org", &data).unwrap();
        match outcome {
            EditOutcome::Edited(edit) => assert_eq!(edit["result"], "Success"),
            EditOutcome::Captcha(_) => panic!("expected an edit outcome"),
        }
    }

    #[test]
    fn response_without_edit_is_an_error() {
        let err = parse_edit_response("x", &json!({})).unwrap_err();
        assert!(matches!(err, WikiError::Api(_)));
    }

    #[test]
    fn numeric_captcha_id_is_stringified() {
        let data = json!({
            "edit": { "captcha": { "type": "image", "mime": "image/png", "id": 99, "url": "/c" } }
        });

        match parse_edit_response("x", &data).unwrap() {
            EditOutcome::Captcha(c) => assert_eq!(c.id, "99"),
            EditOutcome::Edited(_) => panic!("expected a captcha outcome"),
        }
    }
}
