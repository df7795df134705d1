use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;

use repoproxy_service::error::FetchError;
use repoproxy_service::services::ServiceError;

use crate::{DEMO_ROOT, FakeGitHub, FakeResponse, setup_service};

fn fetch_error(err: ServiceError) -> FetchError {
    match err {
        ServiceError::Fetch(err) => err,
        err => panic!("expected a fetch error, got {err:?}"),
    }
}

#[tokio::test]
async fn test_primary_rate_limit_is_retried_once() {
    let github = FakeGitHub::new();
    let service = setup_service(&github, |_| {});

    // the window already reset, so the retry happens right away
    github
        .respond(DEMO_ROOT, FakeResponse::rate_limited(-10))
        .respond(DEMO_ROOT, FakeResponse::json(json!([])).etag("W/\"1\""));

    let listing = service
        .repository_contents("gobstones/demo", None)
        .await
        .unwrap();
    assert_eq!(*listing, json!([]));
    assert_eq!(github.hits(DEMO_ROOT), 2);
}

#[tokio::test]
async fn test_primary_rate_limit_twice_is_terminal() {
    let github = FakeGitHub::new();
    let service = setup_service(&github, |_| {});

    github
        .respond(DEMO_ROOT, FakeResponse::rate_limited(-10))
        .respond(DEMO_ROOT, FakeResponse::rate_limited(-10))
        .respond(DEMO_ROOT, FakeResponse::json(json!([])));

    let err = service
        .repository_contents("gobstones/demo", None)
        .await
        .unwrap_err();
    let err = fetch_error(err);

    assert!(matches!(err, FetchError::RateLimited { .. }));
    assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(err.to_string(), "API rate limit exceeded for 127.0.0.1.");
    assert_eq!(github.hits(DEMO_ROOT), 2);
}

#[tokio::test]
async fn test_abuse_is_not_retried() {
    let github = FakeGitHub::new();
    let service = setup_service(&github, |_| {});

    github
        .respond(DEMO_ROOT, FakeResponse::abuse())
        .respond(DEMO_ROOT, FakeResponse::json(json!([])));

    let err = service
        .repository_contents("gobstones/demo", None)
        .await
        .unwrap_err();
    let err = fetch_error(err);

    assert!(matches!(err, FetchError::AbuseDetected { .. }));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
    assert_eq!(github.hits(DEMO_ROOT), 1);
}

#[tokio::test]
async fn test_rate_limit_status() {
    let github = FakeGitHub::new();
    let service = setup_service(&github, |_| {});

    github.respond(
        "/rate_limit",
        FakeResponse::json(json!({
            "resources": {
                "core": {"limit": 5000, "used": 1, "remaining": 4999, "reset": 1700000000},
                "search": {"limit": 30, "used": 0, "remaining": 30, "reset": 1700000000}
            },
            "rate": {"limit": 5000, "used": 1, "remaining": 4999, "reset": 1700000000}
        })),
    );

    let core = service.rate_limit().await.unwrap();
    assert_eq!(
        core,
        json!({"limit": 5000, "used": 1, "remaining": 4999, "reset": 1700000000})
    );
    assert_eq!(service.cache_usage().raw.used, 0);
}
