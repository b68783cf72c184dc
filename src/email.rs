//! Email import API client
//!
//! The invoice server owns the mailbox connection; this client only carries
//! the opaque session id it hands out. Everything the web page used to keep in
//! module globals (session id, connected account, selected messages, request
//! delays) lives in an explicit [`ImportContext`] passed to each call.

use std::collections::BTreeSet;
use std::fmt;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{get_json, ExpiringCache, FetchError};
use crate::config::AppConfig;
use crate::fields::{FieldResolver, NormalizedRecord};

/// Cache key for the saved account list
pub const ACCOUNTS_CACHE_KEY: &str = "email-accounts";

/// Errors that can occur talking to the email import API
#[derive(Debug, Error)]
pub enum EmailError {
    /// No session has been established
    #[error("Please connect to an email account first")]
    NotConnected,

    /// The server dropped the mailbox session; the context has been reset
    #[error("Connection lost. Please reconnect: {0}")]
    ReconnectRequired(String),

    /// The server reported a failure
    #[error("{0}")]
    Api(String),

    /// Non-2xx response without a readable error body
    #[error("HTTP error! status: {status} ({url})")]
    Status { status: u16, url: String },

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Reading through the cache failed
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Caller-held state of an email import session
#[derive(Debug, Clone)]
pub struct ImportContext {
    /// Session id issued by the server on connect
    pub session_id: Option<String>,
    /// Address of the connected account
    pub account: Option<String>,
    /// Message ids picked for processing
    pub selected: BTreeSet<String>,
    /// Server-side pause between search commands, in seconds
    pub search_delay_secs: f64,
}

impl Default for ImportContext {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl ImportContext {
    pub fn new(search_delay_secs: f64) -> Self {
        Self {
            session_id: None,
            account: None,
            selected: BTreeSet::new(),
            search_delay_secs,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.search_delay_secs)
    }

    pub fn is_connected(&self) -> bool {
        self.session_id.is_some()
    }

    /// Fetch delay is double the search delay
    pub fn fetch_delay_secs(&self) -> f64 {
        self.search_delay_secs * 2.0
    }

    /// Flips selection of `email_id`, returning whether it is now selected
    pub fn toggle_selection(&mut self, email_id: &str) -> bool {
        if self.selected.remove(email_id) {
            false
        } else {
            self.selected.insert(email_id.to_string());
            true
        }
    }

    fn session(&self) -> Result<&str, EmailError> {
        self.session_id.as_deref().ok_or(EmailError::NotConnected)
    }

    fn reset(&mut self) {
        self.session_id = None;
        self.account = None;
        self.selected.clear();
    }
}

/// Credentials and server settings for `POST /api/email/connect`
#[derive(Clone, Default, Serialize)]
pub struct ConnectRequest {
    pub email: String,
    pub password: String,
    pub imap_server: String,
    pub port: Option<u16>,
    pub use_ssl: bool,
    pub is_custom: bool,
    pub custom_server: Option<String>,
    pub save_account: bool,
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("email", &self.email)
            .field("password", &"***")
            .field("imap_server", &self.imap_server)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("is_custom", &self.is_custom)
            .field("custom_server", &self.custom_server)
            .field("save_account", &self.save_account)
            .finish()
    }
}

/// Accepts ids sent either as strings or as numbers
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// One row of a mailbox search
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmailSummary {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, rename = "hasAttachment", alias = "has_attachment")]
    pub has_attachment: bool,
}

/// Attachment metadata on a fetched message
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AttachmentInfo {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub size: u64,
}

/// A fetched message
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmailMessage {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub html_body: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentInfo>,
}

impl EmailMessage {
    /// HTML body when present, else the plain text body
    pub fn display_body(&self) -> &str {
        self.html_body
            .as_deref()
            .filter(|html| !html.is_empty())
            .unwrap_or(&self.body)
    }
}

/// Result of saving an attachment on the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentDownload {
    pub filename: String,
    pub download_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl AttachmentDownload {
    /// Invoice fields known from the download alone (the stored file path)
    pub fn invoice_fields(&self) -> NormalizedRecord {
        match serde_json::to_value(self) {
            Ok(value) => FieldResolver::default().extract(&value),
            Err(_) => NormalizedRecord::new(),
        }
    }
}

/// A stored mailbox account
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct SavedAccount {
    pub id: i64,
    pub email: String,
    pub imap_server: Option<String>,
    pub port: Option<u16>,
    pub use_ssl: bool,
}

fn default_true() -> bool {
    true
}

/// A stored mailbox account including its credentials
#[derive(Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct SavedAccountDetails {
    pub id: i64,
    pub email: String,
    pub password: String,
    pub imap_server: Option<String>,
    pub port: Option<u16>,
    #[serde(default = "default_true")]
    pub use_ssl: bool,
    pub is_custom: bool,
    pub custom_server: Option<String>,
}

impl fmt::Debug for SavedAccountDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavedAccountDetails")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password", &"***")
            .field("imap_server", &self.imap_server)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("is_custom", &self.is_custom)
            .field("custom_server", &self.custom_server)
            .finish()
    }
}

impl SavedAccountDetails {
    /// Connect settings prefilled from the stored account
    ///
    /// Custom servers default to port 993 when none was stored.
    pub fn to_connect_request(&self) -> ConnectRequest {
        let port = if self.is_custom {
            self.port.or(Some(993))
        } else {
            self.port
        };
        ConnectRequest {
            email: self.email.clone(),
            password: self.password.clone(),
            imap_server: self.imap_server.clone().unwrap_or_default(),
            port,
            use_ssl: self.use_ssl,
            is_custom: self.is_custom,
            custom_server: self.custom_server.clone(),
            save_account: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Envelope {
    success: bool,
    error: Option<String>,
    message: Option<String>,
    reconnect_required: bool,
}

#[derive(Deserialize)]
struct ConnectPayload {
    session_id: String,
}

#[derive(Deserialize)]
struct SearchPayload {
    #[serde(default)]
    emails: Vec<EmailSummary>,
}

#[derive(Deserialize)]
struct FetchPayload {
    email: EmailMessage,
}

#[derive(Deserialize)]
struct AccountPayload {
    account: SavedAccountDetails,
}

#[derive(Deserialize)]
struct AccountsPayload {
    #[serde(default)]
    accounts: Vec<SavedAccount>,
}

/// Client for the server's `/api/email/*` endpoints
#[derive(Debug, Clone)]
pub struct EmailClient {
    http: Client,
    base_url: String,
    cache: Option<ExpiringCache>,
}

impl EmailClient {
    /// Creates a client for the configured server
    pub fn new(config: &AppConfig) -> Result<Self, EmailError> {
        Ok(Self::with_base_url(
            config.http_client()?,
            config.api_url.clone(),
        ))
    }

    /// Creates a client for a specific server with a custom HTTP client
    pub fn with_base_url(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            cache: None,
        }
    }

    /// Caches the saved account list in `cache`
    pub fn with_cache(mut self, cache: ExpiringCache) -> Self {
        self.cache = Some(cache);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Opens a mailbox session and records it in `ctx`
    ///
    /// Returns the server's status message.
    pub async fn connect(
        &self,
        ctx: &mut ImportContext,
        request: &ConnectRequest,
    ) -> Result<String, EmailError> {
        let (payload, message): (ConnectPayload, _) =
            self.post(ctx, "/api/email/connect", request).await?;

        ctx.reset();
        ctx.session_id = Some(payload.session_id);
        ctx.account = Some(request.email.clone());

        if request.save_account {
            if let Some(cache) = &self.cache {
                cache.clear(ACCOUNTS_CACHE_KEY);
            }
        }

        info!(account = %request.email, "Successfully connected");
        Ok(message.unwrap_or_else(|| format!("Connected as {}", request.email)))
    }

    /// Closes the session and clears `ctx`
    pub async fn disconnect(&self, ctx: &mut ImportContext) -> Result<(), EmailError> {
        let body = json!({ "session_id": ctx.session()? });
        let _: (Value, _) = self.post(ctx, "/api/email/disconnect", &body).await?;
        ctx.reset();
        info!("Disconnected from email server");
        Ok(())
    }

    /// Searches the connected mailbox; empty criteria match everything
    pub async fn search(
        &self,
        ctx: &mut ImportContext,
        criteria: &str,
    ) -> Result<Vec<EmailSummary>, EmailError> {
        let body = json!({
            "session_id": ctx.session()?,
            "criteria": criteria,
            "delay": ctx.search_delay_secs,
        });
        let shown = if criteria.is_empty() { "ALL" } else { criteria };
        debug!(criteria = shown, "Searching emails");

        let (payload, _): (SearchPayload, _) = self.post(ctx, "/api/email/search", &body).await?;
        info!(count = payload.emails.len(), "Found emails");
        Ok(payload.emails)
    }

    /// Fetches one message with its attachment list
    pub async fn fetch_email(
        &self,
        ctx: &mut ImportContext,
        email_id: &str,
    ) -> Result<EmailMessage, EmailError> {
        let body = json!({
            "session_id": ctx.session()?,
            "email_id": email_id,
            "delay": ctx.fetch_delay_secs(),
        });

        let (payload, _): (FetchPayload, _) = self.post(ctx, "/api/email/fetch", &body).await?;
        Ok(payload.email)
    }

    /// Asks the server to store an attachment and returns where it went
    pub async fn download_attachment(
        &self,
        ctx: &mut ImportContext,
        email_id: &str,
        attachment_id: &str,
    ) -> Result<AttachmentDownload, EmailError> {
        let body = json!({
            "session_id": ctx.session()?,
            "email_id": email_id,
            "attachment_id": attachment_id,
            "delay": ctx.fetch_delay_secs(),
        });

        let (download, _): (AttachmentDownload, _) = self
            .post(ctx, "/api/email/download-attachment", &body)
            .await?;
        info!(filename = %download.filename, "Attachment downloaded");
        Ok(download)
    }

    /// Lists saved accounts, served from the cache when one is configured
    pub async fn accounts(&self, force_refresh: bool) -> Result<Vec<SavedAccount>, EmailError> {
        let url = self.url("/api/email/accounts");

        let value = match &self.cache {
            Some(cache) => {
                cache
                    .fetch_with_cache(
                        &url,
                        ACCOUNTS_CACHE_KEY,
                        cache.default_ttl_minutes(),
                        force_refresh,
                    )
                    .await?
            }
            None => get_json(&self.http, &url).await?,
        };

        let envelope: Envelope = serde_json::from_value(value.clone())?;
        if !envelope.success {
            if let Some(cache) = &self.cache {
                cache.clear(ACCOUNTS_CACHE_KEY);
            }
            return Err(EmailError::Api(
                envelope
                    .error
                    .unwrap_or_else(|| "Failed to retrieve email accounts".to_string()),
            ));
        }

        let payload: AccountsPayload = serde_json::from_value(value)?;
        Ok(payload.accounts)
    }

    /// Loads one saved account with its credentials
    pub async fn account(&self, id: i64) -> Result<SavedAccountDetails, EmailError> {
        let path = format!("/api/email/account/{id}");
        let request = self.http.get(self.url(&path));
        let (payload, _): (AccountPayload, _) = self.send(None, request, &path).await?;
        Ok(payload.account)
    }

    /// Deletes a saved account and drops the cached account list
    ///
    /// Returns the server's status message.
    pub async fn delete_account(&self, id: i64) -> Result<String, EmailError> {
        let path = format!("/api/email/account/{id}");
        let request = self.http.delete(self.url(&path));
        let (_, message): (Value, _) = self.send(None, request, &path).await?;

        if let Some(cache) = &self.cache {
            cache.clear(ACCOUNTS_CACHE_KEY);
        }

        info!(account_id = id, "Account removed from saved accounts");
        Ok(message.unwrap_or_else(|| "Email account deleted".to_string()))
    }

    /// POSTs `body` and unwraps the `{success, error, ...}` envelope
    ///
    /// The server answers failures with an envelope even on 4xx/5xx, so the
    /// body is read before the status is considered.
    async fn post<B, T>(
        &self,
        ctx: &mut ImportContext,
        path: &str,
        body: &B,
    ) -> Result<(T, Option<String>), EmailError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.http.post(self.url(path)).json(body);
        self.send(Some(ctx), request, path).await
    }

    /// Sends `request` and unwraps the envelope; `ctx` is reset when the
    /// server reports the session as lost
    async fn send<T: DeserializeOwned>(
        &self,
        ctx: Option<&mut ImportContext>,
        request: RequestBuilder,
        path: &str,
    ) -> Result<(T, Option<String>), EmailError> {
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().to_string();
        let text = response.text().await?;

        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) if !status.is_success() => {
                return Err(EmailError::Status {
                    status: status.as_u16(),
                    url,
                })
            }
            Err(e) => return Err(EmailError::Decode(e)),
        };

        let envelope: Envelope = serde_json::from_value(value.clone())?;
        if !envelope.success {
            let error = envelope
                .error
                .unwrap_or_else(|| "Unknown error".to_string());
            if envelope.reconnect_required {
                warn!(path, error = %error, "Email session lost");
                if let Some(ctx) = ctx {
                    ctx.reset();
                }
                return Err(EmailError::ReconnectRequired(error));
            }
            warn!(path, error = %error, "Email API request failed");
            return Err(EmailError::Api(error));
        }

        Ok((serde_json::from_value(value)?, envelope.message))
    }
}
