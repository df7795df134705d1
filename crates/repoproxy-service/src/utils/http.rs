use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::GitHubConfig;

/// Timeouts for all outgoing requests.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// The timeout for establishing a connection.
    pub connect: Duration,
    /// Global timeout for one request, including the body.
    pub request: Duration,
}

impl HttpTimeouts {
    pub fn from_config(config: &GitHubConfig) -> Self {
        Self {
            connect: config.connect_timeout,
            request: config.timeout,
        }
    }
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            request: Duration::from_secs(30),
        }
    }
}

/// Creates the [`reqwest::Client`] shared by the GitHub client and the notifiers.
pub fn create_client(timeouts: &HttpTimeouts) -> Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .gzip(true)
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.request)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .context("failed to create http client")
}
