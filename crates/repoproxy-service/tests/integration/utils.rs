use repoproxy_service::config::Config;
use repoproxy_service::services::{GitHubService, create_service};
use repoproxy_test as test;

pub use test::{FakeGitHub, FakeResponse};

/// The path GitHub lists the root of `gobstones/demo` under.
pub const DEMO_ROOT: &str = "/repos/gobstones/demo/contents/";

/// Setup tests and create a service talking to `github`.
///
/// The service authenticates with the token `test-token` and files issues to `gobstones/bugs`.
/// The `update_config` closure can modify any default configuration if needed before the service
/// is created.
pub fn setup_service(github: &FakeGitHub, update_config: impl FnOnce(&mut Config)) -> GitHubService {
    test::setup();

    let mut config = Config::default();
    config.github.api_url = github.api_url();
    config.github.token = Some("test-token".into());
    config.notifications.discord_webhook_url = None;
    config.issues.repository = Some("gobstones/bugs".into());
    update_config(&mut config);

    create_service(&config).unwrap()
}
