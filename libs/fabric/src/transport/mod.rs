//! Ways of reaching the daemon.
//!
//! [`WebSocketTransport`] is the persistent, message oriented link used by a
//! [`Channel`](crate::channel::Channel). [`HttpTransport`] is stateless and
//! performs one request per task, so it sits outside the [`Transport`] trait.

use crate::error::Result;

pub mod http;
pub mod websocket;

pub use self::http::{HttpTransport, HttpTransportBuilder};
pub use self::websocket::{WebSocketTransport, WebSocketTransportBuilder, MAX_MESSAGE_SIZE};

/// A single persistent connection carrying whole text messages
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&mut self, text: &str) -> Result<()>;

    /// Wait for the next complete message
    async fn receive(&mut self) -> Result<String>;

    /// Close the connection; closing twice is a no-op
    async fn close(&mut self) -> Result<()>;
}
