use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::Value;

use super::{
    RateLimitKind, Throttled, Upstream, UpstreamError, UpstreamRequest, UpstreamResponse,
};
use crate::caching::Validator;

pub type Outcome = Result<UpstreamResponse, UpstreamError>;

pub fn ok(etag: Option<&str>, payload: Value) -> Outcome {
    Ok(UpstreamResponse {
        validator: etag.map(Validator::from_etag),
        payload,
    })
}

pub fn throttled(kind: RateLimitKind, retry_after_secs: u64) -> Outcome {
    Err(UpstreamError::RateLimited(Throttled {
        kind,
        retry_after: Duration::from_secs(retry_after_secs),
        status: StatusCode::FORBIDDEN,
        message: "API rate limit exceeded".into(),
    }))
}

/// An upstream answering with a fixed sequence of outcomes.
#[derive(Debug, Default)]
pub struct ScriptedUpstream {
    script: Mutex<VecDeque<Outcome>>,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl ScriptedUpstream {
    pub fn new(script: impl IntoIterator<Item = Outcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().clone()
    }
}

impl Upstream for ScriptedUpstream {
    fn call(&self, request: &UpstreamRequest) -> impl Future<Output = Outcome> + Send {
        self.requests.lock().push(request.clone());
        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted response left").into()));
        async move {
            tokio::task::yield_now().await;
            outcome
        }
    }
}
