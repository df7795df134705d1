// See <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

pub mod contents;
pub mod issues;
pub mod rate_limits;
pub mod utils;

pub use utils::*;
