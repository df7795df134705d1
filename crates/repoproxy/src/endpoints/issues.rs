use axum::Json;
use axum::extract::State;
use repoproxy_service::issues::BugReport;
use serde::Serialize;

use crate::service::RequestService;

use super::ResponseError;

#[derive(Debug, Serialize)]
pub struct IssueCreated {
    url: String,
}

pub async fn create_issue(
    State(service): State<RequestService>,
    Json(report): Json<BugReport>,
) -> Result<Json<IssueCreated>, ResponseError> {
    sentry::configure_scope(|scope| {
        scope.set_transaction(Some("POST /issues"));
    });

    let url = service.github().create_issue(&report).await?;
    Ok(Json(IssueCreated { url }))
}
