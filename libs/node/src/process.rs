use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ModuleConfig;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::registry::{RegistryBuilder, ServiceRegistry};

/// Entry point for a module process
///
/// `args` are the process arguments without the program name. They are
/// validated before anything else happens, so a misconfigured module exits
/// without ever contacting the daemon.
pub async fn run<I, S>(args: I, services: RegistryBuilder) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let config = ModuleConfig::from_args(args)?;
    serve(config, services).await
}

/// Serve the daemon until the connection closes or the process is interrupted
///
/// The connection is disposed and every service torn down before returning.
pub async fn serve(config: ModuleConfig, services: RegistryBuilder) -> Result<()> {
    let registry = Arc::new(services.build()?);
    info!(
        client_id = %config.client_id,
        daemon = %config.daemon_url,
        services = ?registry.ids(),
        "Starting module"
    );

    let connection = match config.connection().open() {
        Ok(connection) => connection,
        Err(e) => {
            teardown(registry);
            return Err(e.into());
        }
    };
    let dispatcher = Dispatcher::new(connection.clone(), Arc::clone(&registry))
        .poll_interval(config.poll_interval);

    tokio::select! {
        () = dispatcher.run() => {}
        () = interrupted() => info!("Interrupted, shutting down"),
    }

    connection.dispose().await;
    drop(dispatcher);
    teardown(registry);

    Ok(())
}

/// Resolves on Ctrl-C, or never if the handler cannot be installed
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for interrupts");
        std::future::pending::<()>().await;
    }
}

fn teardown(registry: Arc<ServiceRegistry>) {
    match Arc::try_unwrap(registry) {
        Ok(registry) => registry.teardown(),
        Err(_) => warn!("Service registry still shared, skipping teardown"),
    }
}
