//! The state shared by all request handlers.

use std::sync::Arc;

use anyhow::Result;
use repoproxy_service::config::Config;
use repoproxy_service::services::{GitHubService, create_service};

/// A cheaply clonable handle to the [`GitHubService`].
#[derive(Clone, Debug)]
pub struct RequestService {
    github: Arc<GitHubService>,
}

impl RequestService {
    pub fn create(config: Config) -> Result<Self> {
        let github = create_service(&config)?;
        Ok(Self {
            github: Arc::new(github),
        })
    }

    pub fn github(&self) -> &GitHubService {
        &self.github
    }
}
