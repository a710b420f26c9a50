//! Constellation Node - the module side of the daemon protocol
//!
//! A module registers its services, connects to the daemon, and then loops
//! forever: fetch a work unit, run every request against the registry, report
//! the results. [`run`] wires all of it together for a module's `main`.
//!
//! # Example
//!
//! ```no_run
//! use constellation_core::{Result, TypedService};
//! use constellation_node::registry::ServiceRegistry;
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
//! # async fn example() -> constellation_node::Result<()> {
//! let services = ServiceRegistry::builder().register(|| Echo);
//! constellation_node::run(std::env::args().skip(1), services).await
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod process;
pub mod registry;

// Re-exports for convenience
pub use config::ModuleConfig;
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use process::{run, serve};
pub use registry::{RegistryBuilder, ServiceRegistry};
