//! Constellation Core - contracts shared by modules and their services
//!
//! A service receives opaque JSON payloads from the daemon. Implement
//! [`TypedService`] to work with typed requests and responses instead; the
//! opaque [`Service`] contract is derived from it.
//!
//! # Example
//!
//! ```
//! use constellation_core::{Result, Service, TypedService};
//!
//! struct Echo;
//!
//! impl TypedService for Echo {
//!     type Request = String;
//!     type Response = String;
//!
//!     fn id(&self) -> &str {
//!         "echo"
//!     }
//!
//!     fn handle(&self, request: String) -> Result<String> {
//!         Ok(request)
//!     }
//! }
//!
//! let reply = Echo.handle_request("\"hi\"").unwrap();
//! assert_eq!(reply, "\"hi\"");
//! ```

pub mod error;
pub mod id;
pub mod service;

// Re-exports for convenience
pub use error::{Error, Result};
pub use id::{ClientId, RequestId};
pub use service::{Service, TypedService};
