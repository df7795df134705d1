//! Helpers for testing the web server and service.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using a [`Server`] or [`FakeGitHub`], make sure it is held until all requests to it
//!    have been made. Dropping it stops serving, and all further connections are refused.

use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use reqwest::Url;
use serde_json::{Value, json};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `repoproxy` crates and mutes all
///    other logs (such as hyper or reqwest).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("repoproxy=trace,repoproxy_service=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a `tokio::test`. It
/// automatically stops serving when dropped.
#[derive(Debug)]
pub struct Server {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
}

impl Server {
    pub fn with_router(router: Router) -> Self {
        let listener = std::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();
        let listener = tokio::net::TcpListener::from_std(listener).unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A canned response of the [`FakeGitHub`].
#[derive(Clone, Debug)]
pub struct FakeResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Option<Value>,
}

impl FakeResponse {
    /// A `200 OK` with a JSON body.
    pub fn json(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: Some(body),
        }
    }

    /// A `304 Not Modified` without a body.
    pub fn not_modified() -> Self {
        Self {
            status: StatusCode::NOT_MODIFIED,
            headers: Vec::new(),
            body: None,
        }
    }

    /// An error in GitHub's format, `{"message": ...}`.
    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            headers: Vec::new(),
            body: Some(json!({ "message": message })),
        }
    }

    /// Exhaustion of the primary rate limit, resetting in `reset_in` seconds.
    pub fn rate_limited(reset_in: i64) -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        Self::error(403, "API rate limit exceeded for 127.0.0.1.")
            .header("x-ratelimit-remaining", "0")
            .header("x-ratelimit-reset", &(now + reset_in).to_string())
    }

    /// GitHub's secondary rate limit.
    pub fn abuse() -> Self {
        Self::error(
            403,
            "You have exceeded a secondary rate limit. Please wait a few minutes before you try again.",
        )
        .header("retry-after", "60")
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = StatusCode::from_u16(status).unwrap();
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn etag(self, etag: &str) -> Self {
        self.header("etag", etag)
    }

    fn into_response(self) -> Response {
        let mut builder = Response::builder().status(self.status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        match self.body {
            Some(body) => builder
                .header("content-type", "application/json; charset=utf-8")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap()
    }
}

/// A request received by the [`FakeGitHub`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    /// The path and query.
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

#[derive(Debug, Default)]
struct FakeState {
    responses: BTreeMap<String, VecDeque<FakeResponse>>,
    requests: Vec<RecordedRequest>,
}

/// A scripted stand-in for the GitHub API.
///
/// Responses are queued per path and served in order. Requests to a path without queued
/// responses are answered with `404`, just like GitHub does for unknown repositories.
pub struct FakeGitHub {
    server: Server,
    state: Arc<Mutex<FakeState>>,
}

async fn respond(
    State(state): State<Arc<Mutex<FakeState>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut state = state.lock().unwrap();
    state.requests.push(RecordedRequest {
        method,
        uri: uri.to_string(),
        headers,
        body: serde_json::from_slice(&body).ok(),
    });

    state
        .responses
        .get_mut(uri.path())
        .and_then(VecDeque::pop_front)
        .unwrap_or_else(|| FakeResponse::error(404, "Not Found"))
        .into_response()
}

impl FakeGitHub {
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(FakeState::default()));
        let router = Router::new().fallback(respond).with_state(state.clone());

        Self {
            server: Server::with_router(router),
            state,
        }
    }

    /// Queues `response` for the next request to `path`.
    pub fn respond(&self, path: &str, response: FakeResponse) -> &Self {
        self.state
            .lock()
            .unwrap()
            .responses
            .entry(path.to_owned())
            .or_default()
            .push_back(response);
        self
    }

    /// The base URL of the API, to be used as `github.api_url`.
    pub fn api_url(&self) -> Url {
        self.server.url("/")
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// The number of requests received for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|request| request.uri.split('?').next() == Some(path))
            .count()
    }
}

impl Default for FakeGitHub {
    fn default() -> Self {
        Self::new()
    }
}
