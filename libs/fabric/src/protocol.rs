//! Wire-level contracts exchanged with the daemon.
//!
//! Field names are PascalCase on the wire. Request and response payloads
//! inside tasks are opaque JSON text and are never interpreted here.

use std::collections::BTreeMap;

use constellation_core::{ClientId, RequestId};
use serde::{Deserialize, Deserializer, Serialize};

/// Subprotocol token offered during the WebSocket handshake
pub const SUBPROTOCOL: &str = "latipium";

/// Command path for fetching the next work unit
pub const WORK_GET: &str = "/module/work/get";

/// Command path for reporting the results of a work unit
pub const WORK_FINISH: &str = "/module/work/finish";

/// One request/response exchange addressed by a command path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Task {
    pub url: String,
    pub request: String,
}

impl Task {
    pub fn new(url: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request: request.into(),
        }
    }

    /// A task carrying no request payload
    pub fn empty(url: impl Into<String>) -> Self {
        Self::new(url, String::new())
    }
}

/// Batch of tasks sent over the persistent channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestEnvelope {
    pub client_id: ClientId,
    pub tasks: Vec<Task>,
}

/// Responses to a [`RequestEnvelope`], in task order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseEnvelope {
    pub responses: Vec<String>,
}

/// Pending service requests handed out by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkUnit {
    pub successful: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub requests: BTreeMap<RequestId, ServiceRequest>,
}

impl WorkUnit {
    /// Whether there is anything to execute
    pub fn has_work(&self) -> bool {
        self.successful && !self.requests.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRequest {
    pub service_id: String,
    pub message: String,
}

/// Outcome of every request in a work unit, keyed by request id
///
/// Failed requests carry an [`ErrorPayload`] in their slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkResults {
    pub results: BTreeMap<RequestId, String>,
}

/// Which side of the connection raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Module,
    Daemon,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorPayload {
    pub message: String,
    pub side: Side,
}

impl ErrorPayload {
    /// An error raised inside this module
    pub fn module(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            side: Side::Module,
        }
    }

    /// Encode as the opaque payload stored in a result slot
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
