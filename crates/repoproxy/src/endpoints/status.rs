use axum::Json;
use axum::extract::State;
use repoproxy_service::caching::CacheUsage;
use serde::Serialize;
use serde_json::{Value, json};

use crate::service::RequestService;

use super::ResponseError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    github_rate: Value,
    cache_usage: CacheUsage,
}

pub async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

pub async fn status(
    State(service): State<RequestService>,
) -> Result<Json<StatusResponse>, ResponseError> {
    sentry::configure_scope(|scope| {
        scope.set_transaction(Some("GET /status"));
    });

    let github = service.github();
    let (github_rate, cache_usage) =
        futures::join!(github.rate_limit(), async { github.cache_usage() });

    Ok(Json(StatusResponse {
        github_rate: github_rate?,
        cache_usage,
    }))
}
