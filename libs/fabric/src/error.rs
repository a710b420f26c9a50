use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Message exceeds {max} bytes")]
    MessageTooBig { max: usize },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Connect timeout of {0:?} exceeded")]
    ConnectTimeout(Duration),

    #[error("Expected {expected} responses, got {actual}")]
    ResponseMismatch { expected: usize, actual: usize },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Whether this failure ends the persistent channel
    ///
    /// Codec and correlation failures affect a single exchange; everything
    /// touching the socket itself does not recover.
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::ConnectionClosed
                | Error::ProtocolViolation(_)
                | Error::MessageTooBig { .. }
                | Error::WebSocket(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
