use std::time::Duration;

use constellation_core::ClientId;
use constellation_fabric::connection::{ConnectionBuilder, CLOSE_TIMEOUT, CONNECT_TIMEOUT};
use constellation_fabric::transport::MAX_MESSAGE_SIZE;
use url::Url;

use crate::error::{Error, Result};

/// Shortest time between the starts of two work fetches
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Settings for one module process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    pub daemon_url: Url,
    pub client_id: ClientId,
    pub connect_timeout: Duration,
    pub close_timeout: Duration,
    pub poll_interval: Duration,
    pub max_message_size: usize,
}

impl ModuleConfig {
    /// Configuration with default timeouts
    pub fn new(daemon_url: Url, client_id: ClientId) -> Self {
        Self {
            daemon_url,
            client_id,
            connect_timeout: CONNECT_TIMEOUT,
            close_timeout: CLOSE_TIMEOUT,
            poll_interval: POLL_INTERVAL,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Parse the process arguments the daemon launches a module with
    ///
    /// Exactly two are expected, excluding the program name: the daemon URL
    /// and the client id.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let [url, client_id] = <[String; 2]>::try_from(args).map_err(|args| {
            Error::Configuration(format!(
                "expected 2 arguments (daemon URL, client id), got {}",
                args.len()
            ))
        })?;

        let daemon_url = Url::parse(&url)
            .map_err(|e| Error::Configuration(format!("invalid daemon URL '{url}': {e}")))?;
        let client_id = client_id
            .parse::<ClientId>()
            .map_err(|e| Error::Configuration(format!("invalid client id '{client_id}': {e}")))?;

        Ok(Self::new(daemon_url, client_id))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Zero disables pacing between fetches
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Connection settings derived from this configuration
    pub fn connection(&self) -> ConnectionBuilder {
        ConnectionBuilder::new()
            .url(self.daemon_url.clone())
            .client_id(self.client_id)
            .connect_timeout(self.connect_timeout)
            .close_timeout(self.close_timeout)
            .max_message_size(self.max_message_size)
    }
}
