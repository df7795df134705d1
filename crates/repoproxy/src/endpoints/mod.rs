use axum::Router;
use axum::routing::{get, post};
use repoproxy_service::metric;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::service::RequestService;

mod error;
mod issues;
mod metrics;
mod repo;
mod status;

pub use error::ResponseError;
use metrics::MetricsLayer;

use issues::create_issue;
use repo::repository_contents;
use status::{ping, status};

pub async fn healthcheck() -> &'static str {
    metric!(counter("healthcheck") += 1);
    "ok"
}

pub fn create_app(service: RequestService) -> Router {
    // The layers here go "top to bottom" according to the reading order here.
    let layer = ServiceBuilder::new()
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(MetricsLayer)
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/repo/{*slug}", get(repository_contents))
        .route("/issues", post(create_issue))
        .route("/ping", get(ping))
        .route("/status", get(status))
        .with_state(service)
        .layer(layer)
        // the healthcheck is last, as it will bypass all the middlewares
        .route("/healthcheck", get(healthcheck))
}
