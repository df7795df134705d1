use std::time::Duration;

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use repoproxy_service::services::ServiceError;
use sentry::integrations::anyhow::capture_anyhow;
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub struct ResponseError {
    status: StatusCode,
    retry_after: Option<Duration>,
    err: anyhow::Error,
}

impl From<ServiceError> for ResponseError {
    fn from(err: ServiceError) -> Self {
        let (status, retry_after) = match &err {
            ServiceError::InvalidSlug(_) | ServiceError::InvalidReport(_) => {
                (StatusCode::BAD_REQUEST, None)
            }
            ServiceError::IssuesDisabled => (StatusCode::NOT_FOUND, None),
            ServiceError::MalformedResponse(_) => (StatusCode::BAD_GATEWAY, None),
            ServiceError::Fetch(err) => (err.status(), err.retry_after()),
        };

        Self {
            status,
            retry_after,
            err: err.into(),
        }
    }
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            capture_anyhow(&self.err);
        }
        let mut response = Json(ApiErrorResponse::from(self.err)).into_response();
        *response.status_mut() = self.status;
        if let Some(retry_after) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after.as_secs()));
        }
        response
    }
}

/// An error response from an api.
#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq)]
pub struct ApiErrorResponse {
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    causes: Option<Vec<String>>,
}

impl From<anyhow::Error> for ApiErrorResponse {
    fn from(err: anyhow::Error) -> Self {
        let mut chain = err.chain().map(|err| err.to_string());
        let detail = chain.next();
        let causes: Vec<_> = chain.collect();
        let causes = if causes.is_empty() {
            None
        } else {
            Some(causes)
        };

        ApiErrorResponse { detail, causes }
    }
}
