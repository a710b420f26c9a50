//! The single logical connection between a module and its daemon.
//!
//! A [`Connection`] first tries to establish a persistent WebSocket channel.
//! If that does not succeed within the connect timeout it settles on
//! per-task HTTP calls for the rest of its life. Either way the caller sees
//! the same [`Connection::send_tasks`] operation.
//!
//! Connections are single-shot: once closed they never reconnect.
//!
//! The persistent channel is only read while an exchange waits for its
//! reply. A binary or close frame the daemon sends between exchanges is
//! therefore only noticed, and `closed` only fires, during the next exchange.
//!
//! Dropping a [`Connection::send_tasks`] future after its envelope went out
//! but before the reply arrived closes the connection, since later replies
//! could no longer be matched to their requests.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use constellation_core::ClientId;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::channel::Channel;
use crate::codec::{Codec, JsonCodec};
use crate::error::{Error, Result};
use crate::protocol::{RequestEnvelope, ResponseEnvelope, Task};
use crate::transport::{HttpTransport, WebSocketTransportBuilder, MAX_MESSAGE_SIZE};

/// How long to wait for the persistent channel before falling back to HTTP
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// How long disposal waits for the close handshake
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal
    Closed,
}

/// Wire mechanism selected when the connection opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Persistent,
    Fallback,
}

enum Link {
    Persistent(Channel<JsonCodec>),
    Fallback(HttpTransport),
}

/// Closes the connection if the channel lost track of its replies
struct DesyncWatch<'a> {
    shared: &'a Shared,
    channel: &'a Channel<JsonCodec>,
}

impl Drop for DesyncWatch<'_> {
    fn drop(&mut self) {
        if self.channel.is_desynced() {
            self.shared.mark_closed("exchange abandoned");
        }
    }
}

struct Shared {
    client_id: ClientId,
    link: OnceLock<Link>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    disposed: AtomicBool,
    close_timeout: Duration,
}

impl Shared {
    /// Move to `next` unless already there or closed. Returns whether it moved.
    fn transition(&self, next: ConnectionState) -> bool {
        self.state.send_if_modified(|current| {
            if *current == ConnectionState::Closed || *current == next {
                return false;
            }
            *current = next;
            true
        })
    }

    fn mark_closed(&self, reason: &str) {
        if self.transition(ConnectionState::Closed) {
            info!(client_id = %self.client_id, reason, "Connection closed");
        }
    }
}

/// Handle to the daemon connection
///
/// Clones share the same underlying connection. The owner must call
/// [`Connection::dispose`] when done; dropping the last handle does not
/// perform the close handshake.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Create a builder for configuring the connection
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Open a connection with default timeouts
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(url: Url, client_id: ClientId) -> Result<Self> {
        Self::builder().url(url).client_id(client_id).open()
    }

    pub fn client_id(&self) -> ClientId {
        self.shared.client_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The selected wire mechanism, once the connection has opened
    pub fn mode(&self) -> Option<Mode> {
        self.shared.link.get().map(|link| match link {
            Link::Persistent(_) => Mode::Persistent,
            Link::Fallback(_) => Mode::Fallback,
        })
    }

    /// Wait until the connection is open
    ///
    /// Returns immediately if it already is, and fails if the connection
    /// closed without ever opening.
    pub async fn opened(&self) -> Result<()> {
        let mut state = self.shared.state.subscribe();
        let reached = *state
            .wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Closed))
            .await
            .map_err(|_| Error::ConnectionClosed)?;

        match reached {
            ConnectionState::Connected => Ok(()),
            _ => Err(Error::ConnectionClosed),
        }
    }

    /// Run `callback` once the connection opens
    ///
    /// If the connection is already open the callback runs before this call
    /// returns.
    pub fn on_opened<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_open() {
            callback();
            return;
        }

        let mut state = self.shared.state.subscribe();
        tokio::spawn(async move {
            let reached = state
                .wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Closed))
                .await
                .map(|s| *s);
            if let Ok(ConnectionState::Connected) = reached {
                callback();
            }
        });
    }

    /// Wait until the connection has closed
    pub async fn closed(&self) {
        let mut state = self.shared.state.subscribe();
        let _ = state.wait_for(|s| *s == ConnectionState::Closed).await;
    }

    /// Run `callback` once the connection closes
    pub fn on_closed<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.subscribe();
        tokio::spawn(async move {
            if state
                .wait_for(|s| *s == ConnectionState::Closed)
                .await
                .is_ok()
            {
                callback();
            }
        });
    }

    /// Send a batch of tasks, returning one response per task in task order
    ///
    /// Waits for the connection to open first. On the persistent channel
    /// batches are exchanged one at a time; in fallback mode every task is its
    /// own HTTP call and calls run concurrently.
    pub async fn send_tasks(&self, tasks: Vec<Task>) -> Result<ResponseEnvelope> {
        self.opened().await?;
        let link = self.shared.link.get().ok_or(Error::ConnectionClosed)?;
        let expected = tasks.len();

        let responses = match link {
            Link::Persistent(channel) => {
                let envelope = RequestEnvelope {
                    client_id: self.shared.client_id,
                    tasks,
                };
                let reply: ResponseEnvelope = self
                    .guarded(channel, channel.exchange(&envelope))
                    .await?;
                reply.responses
            }
            Link::Fallback(http) => self.post_all(http, &tasks).await?,
        };

        if responses.len() != expected {
            return Err(Error::ResponseMismatch {
                expected,
                actual: responses.len(),
            });
        }
        Ok(ResponseEnvelope { responses })
    }

    /// Send an already encoded request envelope and return the raw reply
    ///
    /// In fallback mode the envelope is unpacked into individual calls and
    /// the responses are packed into a response envelope again.
    pub async fn send_raw(&self, envelope: &str) -> Result<String> {
        self.opened().await?;
        let link = self.shared.link.get().ok_or(Error::ConnectionClosed)?;

        match link {
            Link::Persistent(channel) => {
                self.guarded(channel, channel.exchange_raw(envelope)).await
            }
            Link::Fallback(http) => {
                let request: RequestEnvelope = JsonCodec.decode(envelope)?;
                let responses = self.post_all(http, &request.tasks).await?;
                JsonCodec.encode(&ResponseEnvelope { responses })
            }
        }
    }

    /// Run one channel exchange under the connection's cancellation
    ///
    /// Failures of the socket itself close the connection, and so does
    /// abandoning the exchange while its reply is outstanding.
    async fn guarded<T, F>(&self, channel: &Channel<JsonCodec>, exchange: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _watch = DesyncWatch {
            shared: &self.shared,
            channel,
        };

        let result = tokio::select! {
            _ = self.shared.cancel.cancelled() => Err(Error::Cancelled),
            result = exchange => result,
        };
        if let Err(e) = &result {
            if e.ends_session() {
                self.shared.mark_closed(&e.to_string());
            }
        }
        result
    }

    async fn post_all(&self, http: &HttpTransport, tasks: &[Task]) -> Result<Vec<String>> {
        tokio::select! {
            _ = self.shared.cancel.cancelled() => Err(Error::Cancelled),
            result = http.send_tasks(tasks) => result,
        }
    }

    /// Close the connection and release its resources
    ///
    /// Cancels everything in flight, then races the close handshake against
    /// the close timeout. Calling this more than once is harmless.
    pub async fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shared.cancel.cancel();
        self.shared.mark_closed("disposed");

        if let Some(Link::Persistent(channel)) = self.shared.link.get() {
            close_channel(channel, self.shared.close_timeout).await;
        }
    }

    async fn establish(self, websocket: WebSocketTransportBuilder, http: HttpTransport) {
        let attempt = tokio::select! {
            _ = self.shared.cancel.cancelled() => return,
            attempt = websocket.connect() => attempt,
        };

        let link = match attempt {
            Ok(transport) => {
                info!(client_id = %self.shared.client_id, "Persistent channel established");
                Link::Persistent(Channel::from_transport(transport, JsonCodec))
            }
            Err(e) => {
                info!(
                    client_id = %self.shared.client_id,
                    base_url = %http.base_url(),
                    error = %e,
                    "Persistent channel unavailable, using HTTP"
                );
                Link::Fallback(http)
            }
        };

        if self.shared.link.set(link).is_err() {
            return;
        }

        // Disposed while connecting: the channel missed its close handshake
        if self.shared.cancel.is_cancelled() {
            if let Some(Link::Persistent(channel)) = self.shared.link.get() {
                close_channel(channel, self.shared.close_timeout).await;
            }
            return;
        }

        self.shared.transition(ConnectionState::Connected);
    }
}

async fn close_channel(channel: &Channel<JsonCodec>, timeout: Duration) {
    match tokio::time::timeout(timeout, channel.close()).await {
        Ok(Ok(())) => debug!("Close handshake sent"),
        Ok(Err(e)) => debug!(error = %e, "Close handshake failed"),
        Err(_) => warn!(?timeout, "Close handshake timed out"),
    }
}

/// Builder for configuring a connection
#[derive(Debug, Default)]
pub struct ConnectionBuilder {
    url: Option<Url>,
    client_id: Option<ClientId>,
    connect_timeout: Option<Duration>,
    close_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    max_message_size: Option<usize>,
}

impl ConnectionBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the daemon URL
    ///
    /// Either `http(s)://` or `ws(s)://`; the other form is derived from it.
    pub fn url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Set how long to wait for the persistent channel
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set how long disposal waits for the close handshake
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = Some(timeout);
        self
    }

    /// Set the per-call timeout used in fallback mode
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the largest inbound message accepted on the persistent channel
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = Some(size);
        self
    }

    /// Start connecting
    ///
    /// Returns as soon as the attempt has started; use
    /// [`Connection::opened`] to wait for it. Must be called from within a
    /// Tokio runtime.
    pub fn open(self) -> Result<Connection> {
        let url = self
            .url
            .ok_or_else(|| Error::Custom("URL not set".to_string()))?;
        let client_id = self
            .client_id
            .ok_or_else(|| Error::Custom("Client id not set".to_string()))?;

        let websocket = WebSocketTransportBuilder::new()
            .url(with_scheme(&url, SchemeKind::WebSocket)?)
            .connect_timeout(self.connect_timeout.unwrap_or(CONNECT_TIMEOUT))
            .max_message_size(self.max_message_size.unwrap_or(MAX_MESSAGE_SIZE));

        let mut http = HttpTransport::builder()
            .base_url(with_scheme(&url, SchemeKind::Http)?)
            .client_id(client_id);
        if let Some(timeout) = self.request_timeout {
            http = http.timeout(timeout);
        }
        let http = http.build()?;

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let connection = Connection {
            shared: Arc::new(Shared {
                client_id,
                link: OnceLock::new(),
                state,
                cancel: CancellationToken::new(),
                disposed: AtomicBool::new(false),
                close_timeout: self.close_timeout.unwrap_or(CLOSE_TIMEOUT),
            }),
        };

        connection.shared.transition(ConnectionState::Connecting);
        debug!(%url, %client_id, "Connecting to daemon");
        tokio::spawn(connection.clone().establish(websocket, http));

        Ok(connection)
    }
}

enum SchemeKind {
    WebSocket,
    Http,
}

fn with_scheme(url: &Url, kind: SchemeKind) -> Result<Url> {
    let secure = match url.scheme() {
        "http" | "ws" => false,
        "https" | "wss" => true,
        other => return Err(Error::Custom(format!("Unsupported URL scheme '{other}'"))),
    };
    let scheme = match (kind, secure) {
        (SchemeKind::WebSocket, false) => "ws",
        (SchemeKind::WebSocket, true) => "wss",
        (SchemeKind::Http, false) => "http",
        (SchemeKind::Http, true) => "https",
    };

    let mut converted = url.clone();
    converted
        .set_scheme(scheme)
        .map_err(|()| Error::Custom(format!("Cannot use '{url}' as a {scheme} URL")))?;
    Ok(converted)
}
