//! Blocking client for the backend REST API. Every request carries the
//! bearer credential in an `Authorization` header.

pub mod error;

use std::io::Write;
use std::time::Duration;

use log::{debug, warn};
use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use crate::domain::mail::{Attachment, MailRecord};
use crate::domain::mailbox::{MailboxPage, MailboxUpdate, NewMailbox};
use crate::domain::platform::{
    GraphApiStatus, PlatformCorrection, PlatformEntry, PlatformMailboxes, PlatformRule,
    RuleDraft, RuleUpdate, ScanSummary, UnregisteredPick,
};
use crate::feed::SnapshotSource;

pub use error::ApiError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    #[serde(default, deserialize_with = "crate::domain::mail::flag")]
    pub is_admin: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: SessionUser,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Ack {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    skipped: Option<u64>,
}

impl Ack {
    fn text(self) -> String {
        self.message.unwrap_or_else(|| "ok".to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

pub struct ApiClient {
    base: Url,
    token: Option<String>,
    http: Client,
}

impl ApiClient {
    pub fn new(base: Url) -> anyhow::Result<Self> {
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            anyhow::bail!("server_url must be an http(s) URL, got {base}");
        }
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base,
            token: None,
            http,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut u = self.base.clone();
        u.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(u)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let url = self.url(segments)?;
        debug!("{method} {url}");
        let rb = self.http.request(method, url);
        Ok(match &self.token {
            Some(t) => rb.bearer_auth(t),
            None => rb,
        })
    }

    fn execute(rb: RequestBuilder) -> Result<Response, ApiError> {
        let resp = rb.send()?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        let err = ApiError::from_response(status.as_u16(), &body);
        warn!("request failed ({status}): {err}");
        Err(err)
    }

    fn fetch<T: DeserializeOwned>(rb: RequestBuilder) -> Result<T, ApiError> {
        let body = Self::execute(rb)?.text()?;
        Ok(serde_json::from_str(&body)?)
    }

    // ----- session -----

    pub fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let rb = self
            .request(Method::POST, &["api", "auth", "login"])?
            .json(&json!({ "username": username, "password": password }));
        Self::fetch(rb)
    }

    pub fn health(&self) -> Result<Health, ApiError> {
        Self::fetch(self.request(Method::GET, &["api", "health"])?)
    }

    // ----- mail records -----

    pub fn latest_mail_records(&self) -> Result<Vec<MailRecord>, ApiError> {
        Self::fetch(self.request(Method::GET, &["api", "mail_records", "latest"])?)
    }

    pub fn mailbox_records(&self, mailbox_id: i64) -> Result<Vec<MailRecord>, ApiError> {
        let id = mailbox_id.to_string();
        Self::fetch(self.request(Method::GET, &["api", "emails", &id, "mail_records"])?)
    }

    pub fn mail_attachments(&self, mail_id: i64) -> Result<Vec<Attachment>, ApiError> {
        let id = mail_id.to_string();
        Self::fetch(self.request(Method::GET, &["api", "mail_records", &id, "attachments"])?)
    }

    /// Streams one attachment's bytes into `out`, returning the number of bytes written.
    pub fn download_attachment<W: Write>(&self, id: i64, out: &mut W) -> Result<u64, ApiError> {
        let id = id.to_string();
        let rb = self.request(Method::GET, &["api", "attachments", &id, "download"])?;
        let mut resp = Self::execute(rb)?;
        let n = resp.copy_to(out)?;
        out.flush()?;
        Ok(n)
    }

    // ----- mailboxes -----

    pub fn list_mailboxes(
        &self,
        page: u32,
        page_size: u32,
        search: Option<&str>,
    ) -> Result<MailboxPage, ApiError> {
        let mut query = vec![
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ];
        if let Some(s) = search.map(str::trim).filter(|s| !s.is_empty()) {
            query.push(("search", s.to_string()));
        }
        Self::fetch(self.request(Method::GET, &["api", "emails"])?.query(&query))
    }

    pub fn add_mailbox(&self, mailbox: &NewMailbox) -> Result<String, ApiError> {
        let rb = self
            .request(Method::POST, &["api", "emails"])?
            .json(&mailbox.to_body());
        Ok(Self::fetch::<Ack>(rb)?.text())
    }

    pub fn update_mailbox(&self, id: i64, update: &MailboxUpdate) -> Result<String, ApiError> {
        let id = id.to_string();
        let rb = self.request(Method::PUT, &["api", "emails", &id])?.json(update);
        Ok(Self::fetch::<Ack>(rb)?.text())
    }

    pub fn delete_mailbox(&self, id: i64) -> Result<String, ApiError> {
        let id = id.to_string();
        Ok(Self::fetch::<Ack>(self.request(Method::DELETE, &["api", "emails", &id])?)?.text())
    }

    /// Asks the backend to retrieve new mail for one mailbox now.
    pub fn check_mailbox(&self, id: i64) -> Result<String, ApiError> {
        let id = id.to_string();
        let rb = self.request(Method::POST, &["api", "emails", &id, "check"])?;
        Ok(Self::fetch::<Ack>(rb)?.text())
    }

    /// Starts retrieval for several mailboxes at once; an empty list means all of them.
    /// Mailboxes already being processed are skipped by the backend.
    pub fn batch_check(&self, ids: &[i64]) -> Result<String, ApiError> {
        let rb = self
            .request(Method::POST, &["api", "emails", "batch_check"])?
            .json(&json!({ "email_ids": ids }));
        let ack: Ack = Self::fetch(rb)?;
        Ok(match ack.skipped {
            Some(n) if n > 0 => format!("{} ({n} already in progress)", ack.text()),
            _ => ack.text(),
        })
    }

    /// Streams the mailbox export into `out`, returning the number of bytes written.
    pub fn export_mailboxes<W: Write>(&self, out: &mut W) -> Result<u64, ApiError> {
        let mut resp = Self::execute(self.request(Method::GET, &["api", "emails", "export"])?)?;
        let n = resp.copy_to(out)?;
        out.flush()?;
        Ok(n)
    }

    // ----- platform tags -----

    pub fn list_platforms(&self) -> Result<Vec<PlatformEntry>, ApiError> {
        Self::fetch(self.request(Method::GET, &["api", "platforms"])?)
    }

    /// Renames a platform on every mailbox; returns how many were updated.
    pub fn rename_platform(&self, old_name: &str, new_name: &str) -> Result<u64, ApiError> {
        let rb = self
            .request(Method::POST, &["api", "platforms", "rename"])?
            .json(&json!({ "old_name": old_name.trim(), "new_name": new_name.trim() }));
        Ok(Self::fetch::<Ack>(rb)?.count.unwrap_or(0))
    }

    pub fn tag_mailbox(&self, id: i64, platform: &str) -> Result<String, ApiError> {
        let id = id.to_string();
        let rb = self
            .request(Method::POST, &["api", "emails", &id, "platforms"])?
            .json(&json!({ "platform_name": platform.trim() }));
        Ok(Self::fetch::<Ack>(rb)?.text())
    }

    pub fn untag_mailbox(&self, id: i64, platform: &str) -> Result<String, ApiError> {
        let id = id.to_string();
        let rb = self.request(Method::DELETE, &["api", "emails", &id, "platforms", platform])?;
        Ok(Self::fetch::<Ack>(rb)?.text())
    }

    pub fn correct_platform(
        &self,
        id: i64,
        old_name: Option<&str>,
        new_name: &str,
        sender: Option<&str>,
    ) -> Result<String, ApiError> {
        let id = id.to_string();
        let rb = self
            .request(Method::POST, &["api", "emails", &id, "correct_platform"])?
            .json(&json!({
                "old_name": old_name.unwrap_or_default(),
                "new_name": new_name.trim(),
                "sender": sender.unwrap_or_default(),
            }));
        Ok(Self::fetch::<Ack>(rb)?.text())
    }

    /// Re-runs corrections and rules over every stored message.
    pub fn scan_emails_for_platforms(&self) -> Result<ScanSummary, ApiError> {
        Self::fetch(self.request(Method::POST, &["api", "platforms", "scan_emails"])?)
    }

    pub fn registered_mailboxes(&self, platform: &str) -> Result<PlatformMailboxes, ApiError> {
        Self::fetch(self.request(Method::GET, &["api", "platforms", platform, "registered"])?)
    }

    /// Asks the backend for one healthy mailbox not yet tagged with `platform`.
    pub fn unregistered_mailbox(&self, platform: &str) -> Result<UnregisteredPick, ApiError> {
        Self::fetch(self.request(Method::GET, &["api", "platforms", platform, "unregistered"])?)
    }

    pub fn delete_platform_correction(&self, id: i64) -> Result<String, ApiError> {
        let id = id.to_string();
        let rb = self.request(Method::DELETE, &["api", "platform_corrections", &id])?;
        Ok(Self::fetch::<Ack>(rb)?.text())
    }

    pub fn platform_corrections(&self) -> Result<Vec<PlatformCorrection>, ApiError> {
        Self::fetch(self.request(Method::GET, &["api", "platform_corrections"])?)
    }

    // ----- platform rules -----

    pub fn list_rules(&self) -> Result<Vec<PlatformRule>, ApiError> {
        Self::fetch(self.request(Method::GET, &["api", "platform_rules"])?)
    }

    /// Creates a rule and returns its id.
    pub fn add_rule(&self, draft: &RuleDraft) -> Result<i64, ApiError> {
        let rb = self
            .request(Method::POST, &["api", "platform_rules"])?
            .json(draft);
        let ack: Ack = Self::fetch(rb)?;
        ack.id.ok_or_else(|| ApiError::Status {
            status: 200,
            message: "server did not return the new rule id".to_string(),
        })
    }

    pub fn update_rule(&self, id: i64, update: &RuleUpdate) -> Result<String, ApiError> {
        let id = id.to_string();
        let rb = self
            .request(Method::PUT, &["api", "platform_rules", &id])?
            .json(update);
        Ok(Self::fetch::<Ack>(rb)?.text())
    }

    pub fn delete_rule(&self, id: i64) -> Result<String, ApiError> {
        let id = id.to_string();
        let rb = self.request(Method::DELETE, &["api", "platform_rules", &id])?;
        Ok(Self::fetch::<Ack>(rb)?.text())
    }

    // ----- push subscriptions -----

    pub fn graph_api_status(&self) -> Result<GraphApiStatus, ApiError> {
        Self::fetch(self.request(Method::GET, &["api", "config", "graph_api"])?)
    }

    pub fn set_graph_api(&self, enabled: bool) -> Result<String, ApiError> {
        let rb = self
            .request(Method::POST, &["api", "graph", "config"])?
            .json(&json!({ "use_graph_api": enabled }));
        Ok(Self::fetch::<Ack>(rb)?.text())
    }

    pub fn create_all_subscriptions(&self) -> Result<String, ApiError> {
        let rb = self
            .request(Method::POST, &["api", "graph", "subscriptions", "create_all"])?
            .json(&json!({ "async": true }));
        Ok(Self::fetch::<Ack>(rb)?.text())
    }
}

impl SnapshotSource for ApiClient {
    fn latest_mail_records(&self) -> Result<Vec<MailRecord>, ApiError> {
        ApiClient::latest_mail_records(self)
    }
}
