use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// A named handler the daemon can address
///
/// Requests and responses cross this boundary as opaque JSON text. Most
/// services implement [`TypedService`] and get this trait through the blanket
/// implementation.
pub trait Service: Send + Sync {
    /// Identifier the daemon uses to route requests to this service
    fn id(&self) -> &str;

    /// Handle one opaque request payload, returning the opaque response
    fn handle_request(&self, request: &str) -> Result<String>;

    /// Release anything the service holds
    ///
    /// Called once when the owning registry is torn down.
    fn teardown(&mut self) {}
}

/// A service with typed request and response payloads
pub trait TypedService: Send + Sync {
    type Request: DeserializeOwned;
    type Response: Serialize;

    /// Identifier the daemon uses to route requests to this service
    fn id(&self) -> &str;

    fn handle(&self, request: Self::Request) -> Result<Self::Response>;

    fn teardown(&mut self) {}
}

impl<T: TypedService> Service for T {
    fn id(&self) -> &str {
        TypedService::id(self)
    }

    fn handle_request(&self, request: &str) -> Result<String> {
        let request = serde_json::from_str(request).map_err(Error::Deserialization)?;
        let response = self.handle(request)?;
        serde_json::to_string(&response).map_err(Error::Serialization)
    }

    fn teardown(&mut self) {
        TypedService::teardown(self)
    }
}
