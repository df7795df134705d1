//! Caching and rate-limit aware access to the GitHub API.
//!
//! The building blocks, leaf first:
//!
//! - [`caching::CacheStore`]: a byte bounded LRU store of the last known validator and payload
//!   per logical request.
//! - [`upstream::RetryingUpstream`]: wraps an [`upstream::Upstream`] with the single-retry
//!   rate-limit policy.
//! - [`fetcher::ConditionalFetcher`]: revalidates cached entries with `If-None-Match`.
//! - [`error::FetchError`]: the outward error taxonomy.
//!
//! [`services::GitHubService`] wires them together with the [`upstream::GitHubClient`].

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod issues;
pub mod notify;
pub mod services;
pub mod upstream;
pub mod utils;
