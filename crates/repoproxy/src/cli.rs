//! Exposes the command line application.
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use repoproxy_service::config::Config;
use repoproxy_service::metrics;

use crate::healthcheck;
use crate::logging;
use crate::server;

/// Repoproxy commands.
#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Run the web server.
    Run,

    /// Check the health of a running web server.
    Healthcheck {
        /// The address of the server, defaults to the `bind` address of the configuration.
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// Timeout for the request, in seconds.
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

/// Command line interface parser.
#[derive(Clone, Debug, Parser)]
#[command(bin_name = "repoproxy", version, about)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// The tags sent along with every metric.
fn metric_tags(config: &Config, environment: Option<&str>) -> BTreeMap<String, String> {
    let mut tags = config.metrics.custom_tags.clone();

    if let Some(tag) = &config.metrics.hostname_tag {
        if let Some(hostname) = hostname::get().ok().and_then(|s| s.into_string().ok()) {
            tags.insert(tag.clone(), hostname);
        }
    }
    if let (Some(tag), Some(environment)) = (&config.metrics.environment_tag, environment) {
        tags.insert(tag.clone(), environment.to_owned());
    }

    tags
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    let sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: sentry::release_name!(),
        enable_logs: true,
        ..Default::default()
    });

    // SAFETY: The runtime has not been started yet, so this is still single-threaded.
    unsafe { logging::init_logging(&config) };

    if let Some(ref statsd) = config.metrics.statsd {
        let environment = sentry.options().environment.as_deref();
        let tags = metric_tags(&config, environment);
        metrics::configure_statsd(&config.metrics.prefix, statsd.as_str(), tags)
            .context("failed to configure metrics")?;
    }

    match cli.command {
        Command::Run => server::run(config).context("failed to start the server")?,
        Command::Healthcheck { addr, timeout } => healthcheck::healthcheck(config, addr, timeout)?,
    }

    Ok(())
}
