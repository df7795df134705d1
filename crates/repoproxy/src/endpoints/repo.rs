use axum::Json;
use axum::extract::{Path, Query, State};
use repoproxy_service::fetcher::Payload;
use serde::Deserialize;

use crate::service::RequestService;

use super::ResponseError;

#[derive(Debug, Default, Deserialize)]
pub struct ContentsQuery {
    /// The file or directory to fetch, the root of the repository when missing.
    path: Option<String>,
}

pub async fn repository_contents(
    State(service): State<RequestService>,
    Path(slug): Path<String>,
    Query(query): Query<ContentsQuery>,
) -> Result<Json<Payload>, ResponseError> {
    sentry::configure_scope(|scope| {
        scope.set_transaction(Some("GET /repo"));
        scope.set_tag("repository", &slug);
    });

    let contents = service
        .github()
        .repository_contents(&slug, query.path.as_deref())
        .await?;

    Ok(Json(contents))
}
