//! BambooHR source adapter
//!
//! Implements [`ChangeFeed`] over the "changed employees" endpoint and
//! [`DirectorySource`] over the employee directory. Both are plain GETs with
//! the API key as the basic-auth username.

pub mod changes;
pub mod directory;

use async_trait::async_trait;
use quick_xml::events::BytesStart;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::api::client::{ensure_success, retry_after, retry_transient, status_error};
use crate::api::{
    truncate, ApiError, ChangeFeed, ChangePage, DirectorySnapshot, DirectorySource, Result,
};

/// Connection details for one BambooHR company
#[derive(Clone)]
pub struct BambooHrConfig {
    /// Company subdomain, as in `https://{domain}.bamboohr.com`
    pub company_domain: String,
    pub api_key: String,
    /// Upper bound on retrying transient failures; zero disables retries
    pub retry_max_elapsed: Duration,
}

impl fmt::Debug for BambooHrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BambooHrConfig")
            .field("company_domain", &self.company_domain)
            .field("api_key", &"<redacted>")
            .field("retry_max_elapsed", &self.retry_max_elapsed)
            .finish()
    }
}

pub struct BambooHrClient {
    http: reqwest::Client,
    api_key: String,
    changed_url: Url,
    directory_url: Url,
    retry_max_elapsed: Duration,
}

impl BambooHrClient {
    pub fn new(http: reqwest::Client, config: BambooHrConfig) -> Result<Self> {
        let domain = config.company_domain.trim();
        if domain.is_empty() {
            return Err(ApiError::Config(
                "BambooHR company domain is not configured".to_string(),
            ));
        }
        if config.api_key.is_empty() {
            return Err(ApiError::Config("BambooHR API key is empty".to_string()));
        }

        let changed_url = Url::parse(&format!(
            "https://{domain}.bamboohr.com/api/v1/employees/changed"
        ))?;
        let directory_url = Url::parse(&format!(
            "https://api.bamboohr.com/api/gateway.php/{domain}/v1/employees/directory"
        ))?;

        Ok(Self {
            http,
            api_key: config.api_key,
            changed_url,
            directory_url,
            retry_max_elapsed: config.retry_max_elapsed,
        })
    }

    /// For testing: point both endpoints at a mock server.
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        self.changed_url = Url::parse(&format!("{base}/api/v1/employees/changed"))
            .expect("mock base URL is valid");
        self.directory_url = Url::parse(&format!("{base}/api/gateway.php/acme/v1/employees/directory"))
            .expect("mock base URL is valid");
        self
    }

    async fn fetch_changes_once(&self, since: &str) -> Result<ChangePage> {
        let response = self
            .http
            .get(self.changed_url.clone())
            .query(&[("since", since)])
            .header(ACCEPT, "application/xml")
            .basic_auth(&self.api_key, Some("x"))
            .send()
            .await?;

        let status = response.status();
        let content_type = header_value(&response, CONTENT_TYPE);
        debug!(
            status = status.as_u16(),
            content_type = %content_type,
            "BambooHR changed-employees response"
        );

        let retry_after = retry_after(&response);
        let body = response.text().await?;
        debug!(
            body_head = %truncate(&body, 300).replace('\n', " "),
            "BambooHR changed-employees body"
        );

        if !status.is_success() {
            return Err(status_error(status, retry_after, &body));
        }

        changes::parse_change_feed(self.changed_url.as_str(), &content_type, &body, since)
    }

    async fn fetch_directory_once(&self) -> Result<DirectorySnapshot> {
        let response = self
            .http
            .get(self.directory_url.clone())
            .header(ACCEPT, "application/xml")
            .basic_auth(&self.api_key, Some("x"))
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let body = response.text().await?;

        if body.trim().is_empty() {
            warn!("BambooHR directory response was empty");
            return Ok(DirectorySnapshot::new());
        }

        directory::parse_directory(&body)
    }
}

#[async_trait]
impl ChangeFeed for BambooHrClient {
    async fn fetch_changes(&self, since: &str) -> Result<ChangePage> {
        let page = retry_transient(self.retry_max_elapsed, || self.fetch_changes_once(since)).await?;

        info!(
            since,
            total_changed = page.total(),
            latest = %page.latest,
            "Fetched BambooHR change feed"
        );
        Ok(page)
    }
}

#[async_trait]
impl DirectorySource for BambooHrClient {
    async fn fetch_directory(&self) -> Result<DirectorySnapshot> {
        let snapshot = retry_transient(self.retry_max_elapsed, || self.fetch_directory_once()).await?;

        info!(employees = snapshot.len(), "Fetched BambooHR directory");
        Ok(snapshot)
    }
}

fn header_value(response: &reqwest::Response, name: reqwest::header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Unescaped value of the attribute whose local name is `name`.
pub(crate) fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in element.attributes().flatten() {
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
