//! Repoproxy.
//!
//! Repoproxy is a small web service in front of the GitHub API. It lists repository contents
//! through a byte bounded cache that revalidates entries with conditional requests, so repeated
//! listings cost no request quota. It also files bug reports as issues and reports the state of
//! the quota and the cache.

#![warn(missing_debug_implementations, unused_crate_dependencies, clippy::all)]

mod cli;
mod endpoints;
mod healthcheck;
mod logging;
mod server;
mod service;


fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
