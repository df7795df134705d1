use std::net::SocketAddr;

use anyhow::{Context, Result};
use repoproxy_service::config::Config;
use repoproxy_service::metric;

use crate::endpoints;
use crate::service::RequestService;

/// Creates the service and runs the HTTP server until it is shut down.
pub fn run(config: Config) -> Result<()> {
    // Log this metric before actually starting the server. This allows to see restarts even if
    // service creation fails.
    metric!(counter("server.starting") += 1);

    let web_pool = tokio::runtime::Builder::new_multi_thread()
        .thread_name("repoproxy-web")
        .enable_all()
        .build()?;

    let socket = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid bind address `{}`", config.bind))?;
    let service = RequestService::create(config).context("failed to create service state")?;

    let server = axum_server::bind(socket).serve(endpoints::create_app(service).into_make_service());
    tracing::info!("Starting HTTP server on {}", socket);

    web_pool.block_on(server)?;
    tracing::info!("System shutdown complete");

    Ok(())
}
