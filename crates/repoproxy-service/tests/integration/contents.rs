use reqwest::StatusCode;
use serde_json::json;

use repoproxy_service::error::FetchError;
use repoproxy_service::services::ServiceError;

use crate::{DEMO_ROOT, FakeGitHub, FakeResponse, setup_service};

#[tokio::test]
async fn test_conditional_refetch() {
    let github = FakeGitHub::new();
    let service = setup_service(&github, |config| config.cache.max_size_bytes = 5000);

    let listing = json!([{"name": "file.txt"}]);
    github
        .respond(DEMO_ROOT, FakeResponse::json(listing.clone()).etag("W/\"1234\""))
        .respond(DEMO_ROOT, FakeResponse::not_modified());

    let first = service
        .repository_contents("gobstones/demo", None)
        .await
        .unwrap();
    assert_eq!(*first, listing);

    let usage = service.cache_usage();
    assert_eq!(
        (usage.raw.limit, usage.raw.used, usage.raw.remaining),
        (5000, 48, 4952)
    );

    let second = service
        .repository_contents("gobstones/demo", Some("."))
        .await
        .unwrap();
    assert_eq!(*second, listing);

    let requests = github.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].header("if-none-match"), None);
    assert_eq!(requests[1].header("if-none-match"), Some("\"1234\""));

    for request in &requests {
        assert_eq!(request.header("authorization"), Some("Bearer test-token"));
        assert_eq!(request.header("accept"), Some("application/vnd.github+json"));
        assert!(request.header("user-agent").unwrap().starts_with("repoproxy/"));
    }
}

#[tokio::test]
async fn test_nested_path() {
    let github = FakeGitHub::new();
    let service = setup_service(&github, |_| {});

    github.respond(
        "/repos/gobstones/demo/contents/src/main.gbs",
        FakeResponse::json(json!({"name": "main.gbs", "type": "file"})).etag("\"abc\""),
    );

    let file = service
        .repository_contents("gobstones/demo", Some("src/main.gbs"))
        .await
        .unwrap();
    assert_eq!(file["name"], "main.gbs");
    assert_eq!(github.hits("/repos/gobstones/demo/contents/src/main.gbs"), 1);
}

#[tokio::test]
async fn test_not_found() {
    let github = FakeGitHub::new();
    let service = setup_service(&github, |_| {});

    let err = service
        .repository_contents("gobstones/missing", None)
        .await
        .unwrap_err();

    let ServiceError::Fetch(err) = err else {
        panic!("expected a fetch error, got {err:?}");
    };
    assert!(matches!(err, FetchError::Http { status, .. } if status == StatusCode::NOT_FOUND));
    assert_eq!(err.to_string(), "Not Found");
    assert_eq!(service.cache_usage().raw.used, 0);
}

#[tokio::test]
async fn test_forbidden_is_not_a_rate_limit() {
    let github = FakeGitHub::new();
    let service = setup_service(&github, |_| {});

    github.respond(
        DEMO_ROOT,
        FakeResponse::error(403, "Resource not accessible by integration")
            .header("x-ratelimit-remaining", "4000"),
    );

    let err = service
        .repository_contents("gobstones/demo", None)
        .await
        .unwrap_err();
    let ServiceError::Fetch(err) = err else {
        panic!("expected a fetch error, got {err:?}");
    };
    assert_eq!(err.status(), StatusCode::FORBIDDEN);
    assert!(matches!(err, FetchError::Http { .. }));
    assert_eq!(github.hits(DEMO_ROOT), 1);
}

#[tokio::test]
async fn test_upstream_unreachable() {
    // a port that was free a moment ago, nothing listens on it anymore
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let github = FakeGitHub::new();
    let service = setup_service(&github, |config| {
        config.github.api_url = format!("http://127.0.0.1:{port}/").parse().unwrap();
        config.github.connect_timeout = std::time::Duration::from_secs(1);
    });

    let err = service
        .repository_contents("gobstones/demo", None)
        .await
        .unwrap_err();
    let ServiceError::Fetch(err) = err else {
        panic!("expected a fetch error, got {err:?}");
    };
    assert!(matches!(err, FetchError::Unknown(_)));
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(github.requests().is_empty());
}
