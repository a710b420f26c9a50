//! Service lookup by identifier.
//!
//! Services are registered as factories before the module connects. The
//! registry instantiates all of them once and indexes each by the identifier
//! it reports. Two services reporting the same identifier is a startup error.

use std::collections::HashMap;
use std::fmt;

use constellation_core::{Error, Result, Service};
use tracing::debug;

type Factory = Box<dyn FnOnce() -> Box<dyn Service> + Send>;

/// Collects service factories ahead of building a [`ServiceRegistry`]
#[derive(Default)]
pub struct RegistryBuilder {
    factories: Vec<Factory>,
}

impl RegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, called once when the registry is built
    pub fn register<S, F>(mut self, factory: F) -> Self
    where
        S: Service + 'static,
        F: FnOnce() -> S + Send + 'static,
    {
        self.factories
            .push(Box::new(move || Box::new(factory()) as Box<dyn Service>));
        self
    }

    /// Register an already constructed service
    pub fn register_service<S>(self, service: S) -> Self
    where
        S: Service + 'static,
    {
        self.register(move || service)
    }

    /// Instantiate every registered service
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateService`] if two services report the same
    /// identifier. Services built so far are torn down first.
    pub fn build(self) -> Result<ServiceRegistry> {
        let mut registry = ServiceRegistry {
            services: HashMap::with_capacity(self.factories.len()),
        };

        for factory in self.factories {
            let mut service = factory();
            let id = service.id().to_owned();
            if registry.services.contains_key(&id) {
                service.teardown();
                registry.teardown();
                return Err(Error::DuplicateService(id));
            }
            debug!(service = %id, "Registered service");
            registry.services.insert(id, service);
        }

        Ok(registry)
    }
}

/// Identifier to service mapping, fixed once built
pub struct ServiceRegistry {
    services: HashMap<String, Box<dyn Service>>,
}

impl ServiceRegistry {
    /// Create a builder for registering services
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Looks up a service by identifier
    pub fn get(&self, id: &str) -> Option<&dyn Service> {
        self.services.get(id).map(|service| service.as_ref())
    }

    /// Route one opaque request to the service it names
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownService`] if no service has that identifier,
    /// otherwise whatever the service returns.
    pub fn dispatch(&self, service_id: &str, message: &str) -> Result<String> {
        let service = self
            .get(service_id)
            .ok_or_else(|| Error::UnknownService(service_id.to_owned()))?;
        service.handle_request(message)
    }

    /// Registered identifiers, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.services.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Release every service
    pub fn teardown(self) {
        for (id, mut service) in self.services {
            debug!(service = %id, "Tearing down service");
            service.teardown();
        }
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.ids())
            .finish()
    }
}
