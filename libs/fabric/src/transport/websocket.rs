use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::SUBPROTOCOL;
use crate::transport::Transport;

/// Largest text message accepted from the daemon
pub const MAX_MESSAGE_SIZE: usize = 8192;

/// WebSocket transport speaking the daemon subprotocol
///
/// Only complete text messages are accepted. A binary message closes the
/// socket with status 1003, a message larger than the configured limit closes
/// it with status 1009, and a close frame from the daemon is answered with a
/// normal closure.
///
/// Fragmented messages are reassembled before they are inspected, so the
/// size limit applies to the whole message as well as to each frame. A
/// fragmented message within the limit is accepted like any other.
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    max_message_size: usize,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to a daemon with no timeout
    pub async fn connect(url: &Url) -> Result<Self> {
        Self::builder().url(url.clone()).connect().await
    }

    /// Connect with a connect timeout
    pub async fn connect_timeout(url: &Url, timeout: Duration) -> Result<Self> {
        Self::builder()
            .url(url.clone())
            .connect_timeout(timeout)
            .connect()
            .await
    }

    /// Create a builder for configuring the transport
    pub fn builder() -> WebSocketTransportBuilder {
        WebSocketTransportBuilder::new()
    }

    /// Whether a close frame has been sent or the socket has failed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close_with(&mut self, code: CloseCode, reason: &'static str) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        debug!(?code, reason, "Closing WebSocket");
        match self.stream.close(Some(frame)).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, text: &str) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        self.stream.send(Message::Text(text.to_owned())).await.map_err(|e| {
            self.closed = true;
            e.into()
        })
    }

    async fn receive(&mut self) -> Result<String> {
        loop {
            if self.closed {
                return Err(Error::ConnectionClosed);
            }

            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(tungstenite::Error::Capacity(e))) => {
                    warn!(error = %e, "Inbound message over limit");
                    self.close_with(CloseCode::Size, "Message too big").await?;
                    return Err(Error::MessageTooBig {
                        max: self.max_message_size,
                    });
                }
                Some(Err(e)) => {
                    self.closed = true;
                    return Err(e.into());
                }
                None => {
                    self.closed = true;
                    return Err(Error::ConnectionClosed);
                }
            };

            match message {
                Message::Text(text) => {
                    if text.len() > self.max_message_size {
                        warn!(size = text.len(), "Inbound message over limit");
                        self.close_with(CloseCode::Size, "Message too big").await?;
                        return Err(Error::MessageTooBig {
                            max: self.max_message_size,
                        });
                    }
                    return Ok(text);
                }
                Message::Binary(_) => {
                    self.close_with(CloseCode::Unsupported, "Binary messages are not supported")
                        .await?;
                    return Err(Error::ProtocolViolation(
                        "binary message received".to_string(),
                    ));
                }
                Message::Close(frame) => {
                    debug!(?frame, "Daemon closed the channel");
                    self.close_with(CloseCode::Normal, "Client closed").await?;
                    return Err(Error::ConnectionClosed);
                }
                // Pings are answered by tungstenite on the next write
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.close_with(CloseCode::Normal, "Module disposed").await
    }
}

/// Builder for configuring WebSocket transport
#[derive(Default)]
pub struct WebSocketTransportBuilder {
    url: Option<Url>,
    connect_timeout: Option<Duration>,
    max_message_size: Option<usize>,
}

impl WebSocketTransportBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `ws://` or `wss://` URL to connect to
    pub fn url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the largest inbound message accepted, in bytes
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = Some(size);
        self
    }

    /// Connect with the configured settings
    pub async fn connect(self) -> Result<WebSocketTransport> {
        let url = self
            .url
            .ok_or_else(|| Error::Custom("URL not set".to_string()))?;
        let max_message_size = self.max_message_size.unwrap_or(MAX_MESSAGE_SIZE);

        let mut request = url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));

        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(max_message_size);
        config.max_frame_size = Some(max_message_size);

        let connect_op = tokio_tungstenite::connect_async_with_config(request, Some(config), false);

        let (stream, _response) = if let Some(timeout) = self.connect_timeout {
            tokio::time::timeout(timeout, connect_op)
                .await
                .map_err(|_| Error::ConnectTimeout(timeout))??
        } else {
            connect_op.await?
        };
        debug!(%url, "WebSocket connected");

        Ok(WebSocketTransport {
            stream,
            max_message_size,
            closed: false,
        })
    }
}
