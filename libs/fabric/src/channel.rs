use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Request/response channel over one persistent transport
///
/// The transport has no multiplexing, so each exchange holds the transport
/// from the start of its send until its reply has been received. Concurrent
/// callers queue in arrival order.
///
/// Replies are matched to requests by position only. An exchange dropped
/// after sending but before its reply arrived leaves that reply unread, so
/// the channel is then desynchronized and refuses every further exchange.
pub struct Channel<C> {
    transport: Mutex<Box<dyn Transport>>,
    codec: C,
    desynced: AtomicBool,
}

impl<C: Codec> Channel<C> {
    /// Create a channel from an existing transport
    pub fn from_transport(transport: impl Transport + 'static, codec: C) -> Self {
        Self {
            transport: Mutex::new(Box::new(transport)),
            codec,
            desynced: AtomicBool::new(false),
        }
    }

    /// Whether an abandoned exchange left a reply unread
    pub fn is_desynced(&self) -> bool {
        self.desynced.load(Ordering::Acquire)
    }

    /// Send a message and wait for its reply
    pub async fn exchange<Req, Res>(&self, message: &Req) -> Result<Res>
    where
        Req: Serialize,
        Res: for<'de> Deserialize<'de>,
    {
        let text = self.codec.encode(message)?;
        let reply = self.exchange_raw(&text).await?;
        self.codec.decode(&reply)
    }

    /// Send already encoded text and wait for the raw reply
    pub async fn exchange_raw(&self, text: &str) -> Result<String> {
        let mut transport = self.transport.lock().await;
        if self.is_desynced() {
            // Stale reply still queued; nothing read from here on can be trusted
            let _ = transport.close().await;
            return Err(Error::ConnectionClosed);
        }

        let pending = PendingReply {
            desynced: &self.desynced,
            settled: false,
        };
        if let Err(e) = transport.send(text).await {
            pending.settle();
            return Err(e);
        }
        let reply = transport.receive().await;
        pending.settle();

        reply
    }

    /// Close the channel
    ///
    /// Waits for any exchange in progress to release the transport first.
    pub async fn close(&self) -> Result<()> {
        self.transport.lock().await.close().await
    }
}

/// Flags the channel when dropped before the reply was read
struct PendingReply<'a> {
    desynced: &'a AtomicBool,
    settled: bool,
}

impl PendingReply<'_> {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Exchange abandoned before its reply arrived");
            self.desynced.store(true, Ordering::Release);
        }
    }
}
