//! Example module serving an `echo` service.
//!
//! Launched by the daemon as `constellation-echo-module <daemon-url> <client-id>`.

use anyhow::Result;
use constellation_core::{Result as ServiceResult, TypedService};
use constellation_node::{logging, ServiceRegistry};
use serde_json::Value;

/// Replies with whatever JSON it receives
struct EchoService;

impl TypedService for EchoService {
    type Request = Value;
    type Response = Value;

    fn id(&self) -> &str {
        "echo"
    }

    fn handle(&self, request: Value) -> ServiceResult<Value> {
        Ok(request)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();

    let services = ServiceRegistry::builder().register(|| EchoService);
    constellation_node::run(std::env::args().skip(1), services).await?;

    Ok(())
}
