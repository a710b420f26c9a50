use std::time::Duration;

use constellation_core::ClientId;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA, USER_AGENT};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Task;

/// Header carrying the module's client identity on every call
pub const CLIENT_ID_HEADER: &str = "X-Latipium-Client-Id";

/// Fixed client string sent as the user agent
pub const CLIENT_USER_AGENT: &str = "Latipium Daemon (https://github.com/latipium/daemon)";

/// Stateless HTTP transport used when no persistent channel is available
///
/// Every task becomes its own `POST` to the daemon, with the task's command
/// path appended to the base URL. Responses are never cached.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// Create a transport with default settings
    pub fn new(base_url: Url, client_id: ClientId) -> Result<Self> {
        Self::builder()
            .base_url(base_url)
            .client_id(client_id)
            .build()
    }

    /// Create a builder for configuring the transport
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::new()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Perform one task and return the response body
    pub async fn post(&self, task: &Task) -> Result<String> {
        let url = self.endpoint(&task.url)?;
        debug!(%url, "Posting task");

        let response = self
            .client
            .post(url)
            .body(task.request.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    /// Perform every task concurrently, returning responses in task order
    pub async fn send_tasks(&self, tasks: &[Task]) -> Result<Vec<String>> {
        futures::future::try_join_all(tasks.iter().map(|task| self.post(task))).await
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{path}"))
            .map_err(|e| Error::Custom(format!("Invalid task URL '{path}': {e}")))
    }
}

/// Builder for configuring HTTP transport
#[derive(Default)]
pub struct HttpTransportBuilder {
    base_url: Option<Url>,
    client_id: Option<ClientId>,
    timeout: Option<Duration>,
}

impl HttpTransportBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `http://` or `https://` base URL of the daemon
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set the identity sent with every call
    pub fn client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Set the per-call timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the transport
    pub fn build(self) -> Result<HttpTransport> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Custom("Base URL not set".to_string()))?;
        let client_id = self
            .client_id
            .ok_or_else(|| Error::Custom("Client id not set".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(
            CLIENT_ID_HEADER,
            HeaderValue::from_str(&client_id.to_string())
                .map_err(|e| Error::Custom(e.to_string()))?,
        );

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(HttpTransport {
            client: builder.build()?,
            base_url,
        })
    }
}
