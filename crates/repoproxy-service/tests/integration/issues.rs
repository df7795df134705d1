use reqwest::Method;
use serde_json::json;

use repoproxy_service::issues::BugReport;
use repoproxy_service::services::ServiceError;

use crate::{FakeGitHub, FakeResponse, setup_service};

fn report() -> BugReport {
    serde_json::from_value(json!({
        "description": "The board does not render.",
        "title": "Broken board",
        "url": "https://gobstones.github.io/gobstones-web/",
        "mode": "code"
    }))
    .unwrap()
}

#[tokio::test]
async fn test_create_issue() {
    let github = FakeGitHub::new();
    let service = setup_service(&github, |_| {});

    github.respond(
        "/repos/gobstones/bugs/issues",
        FakeResponse::json(json!({
            "number": 7,
            "html_url": "https://github.com/gobstones/bugs/issues/7"
        }))
        .with_status(201),
    );

    let url = service.create_issue(&report()).await.unwrap();
    assert_eq!(url, "https://github.com/gobstones/bugs/issues/7");

    let requests = github.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::POST);
    let body = requests[0].body.as_ref().unwrap();
    assert_eq!(body["title"], "Broken board");
    assert_eq!(body["body"], report().to_markdown_body());
}

#[tokio::test]
async fn test_issues_disabled() {
    let github = FakeGitHub::new();
    let service = setup_service(&github, |config| config.issues.repository = None);

    let err = service.create_issue(&report()).await.unwrap_err();
    assert!(matches!(err, ServiceError::IssuesDisabled));
    assert!(github.requests().is_empty());
}
