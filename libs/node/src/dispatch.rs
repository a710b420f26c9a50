//! The fetch, execute, report cycle.
//!
//! Once the connection opens the dispatcher asks the daemon for work, runs
//! every request in the returned work unit against the registry, reports the
//! results, and asks again. It stops only when the connection closes.
//!
//! A failing request never affects its siblings: its slot in the result set
//! holds an error payload instead of a response.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use constellation_core::{Error as ServiceError, RequestId, Result as ServiceResult};
use constellation_fabric::protocol::{
    ErrorPayload, ServiceRequest, Task, WorkResults, WorkUnit, WORK_FINISH, WORK_GET,
};
use constellation_fabric::{request, Connection, Error, Result};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::POLL_INTERVAL;
use crate::registry::ServiceRegistry;

/// Drives the work cycle for one connection
pub struct Dispatcher {
    connection: Connection,
    registry: Arc<ServiceRegistry>,
    poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(connection: Connection, registry: Arc<ServiceRegistry>) -> Self {
        Self {
            connection,
            registry,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Set the shortest time between the starts of two fetches
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run until the connection closes
    pub async fn run(&self) {
        if let Err(e) = self.connection.opened().await {
            warn!(error = %e, "Connection closed before opening");
            return;
        }
        info!(mode = ?self.connection.mode(), "Dispatch loop started");

        tokio::select! {
            () = self.connection.closed() => {}
            () = self.poll() => {}
        }

        info!("Dispatch loop stopped");
    }

    async fn poll(&self) {
        loop {
            let started = Instant::now();

            match self.cycle().await {
                Ok(0) => {}
                Ok(count) => debug!(count, "Work unit completed"),
                Err(e) => warn!(error = %e, "Work cycle failed"),
            }

            if !self.connection.is_open() {
                break;
            }
            tokio::time::sleep_until(started + self.poll_interval).await;
        }
    }

    /// Fetch one work unit, execute it, and report the results
    ///
    /// Returns how many requests were executed. Nothing is reported for an
    /// empty or unsuccessful fetch.
    pub async fn cycle(&self) -> Result<usize> {
        let work: WorkUnit = request::request(&self.connection, Task::empty(WORK_GET)).await?;
        if !work.has_work() {
            return Ok(0);
        }

        let count = work.requests.len();
        let results = execute(&self.registry, work.requests)?;
        let body = serde_json::to_string(&results).map_err(|e| Error::Codec(e.to_string()))?;
        request::send(&self.connection, Task::new(WORK_FINISH, body)).await?;

        Ok(count)
    }
}

/// Run every request against the registry
///
/// The result set has one entry per request. Requests that fail, name an
/// unknown service, or panic get an [`ErrorPayload`] in their slot.
///
/// # Errors
///
/// Fails only if an error payload cannot be encoded.
pub fn execute(
    registry: &ServiceRegistry,
    requests: BTreeMap<RequestId, ServiceRequest>,
) -> Result<WorkResults> {
    let results = requests
        .into_iter()
        .map(|(id, request)| -> Result<(RequestId, String)> {
            let payload = match invoke(registry, &request) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(
                        request_id = %id,
                        service = %request.service_id,
                        error = %e,
                        "Service request failed"
                    );
                    ErrorPayload::module(e.to_string())
                        .to_json()
                        .map_err(|e| Error::Codec(e.to_string()))?
                }
            };
            Ok((id, payload))
        })
        .collect::<Result<_>>()?;

    Ok(WorkResults { results })
}

fn invoke(registry: &ServiceRegistry, request: &ServiceRequest) -> ServiceResult<String> {
    panic::catch_unwind(AssertUnwindSafe(|| {
        registry.dispatch(&request.service_id, &request.message)
    }))
    .unwrap_or_else(|payload| Err(ServiceError::Panic(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
