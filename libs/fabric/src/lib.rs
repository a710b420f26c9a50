//! Constellation Fabric - connection layer between a module and its daemon
//!
//! Provides the wire contracts, a JSON codec, a persistent WebSocket
//! transport, a stateless HTTP fallback transport, and the [`Connection`]
//! that chooses between them.
//!
//! # Example
//!
//! ```no_run
//! use constellation_core::ClientId;
//! use constellation_fabric::protocol::{Task, WorkUnit, WORK_GET};
//! use constellation_fabric::{request, Connection};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let url = "http://127.0.0.1:8080".parse()?;
//! let client_id: ClientId = "11111111-1111-1111-1111-111111111111".parse()?;
//!
//! let connection = Connection::open(url, client_id)?;
//! connection.opened().await?;
//!
//! // One task, typed response
//! let work: WorkUnit = request::request(&connection, Task::empty(WORK_GET)).await?;
//! println!("{} pending requests", work.requests.len());
//!
//! connection.dispose().await;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod request;
pub mod transport;

// Re-exports for convenience
pub use channel::Channel;
pub use connection::{Connection, ConnectionBuilder, ConnectionState, Mode};
pub use error::{Error, Result};
