use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// A request as the fake application endpoint saw it.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Value,
}

/// What the fake endpoint answers with.
#[derive(Debug, Clone, Copy)]
pub struct Reply {
    pub status: StatusCode,
    pub retry_after: Option<&'static str>,
}

impl Reply {
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            retry_after: None,
        }
    }

    pub fn retry_after(mut self, value: &'static str) -> Self {
        self.retry_after = Some(value);
        self
    }
}

#[derive(Clone)]
struct AppState {
    reply: Reply,
    seen: Arc<Mutex<Vec<CapturedRequest>>>,
}

pub struct FakeApp {
    pub url: String,
    seen: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl FakeApp {
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.seen.lock().unwrap().clone()
    }
}

async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let header_text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    state.seen.lock().unwrap().push(CapturedRequest {
        authorization: header_text(header::AUTHORIZATION),
        content_type: header_text(header::CONTENT_TYPE),
        body,
    });

    match state.reply.retry_after {
        Some(retry_after) => {
            (state.reply.status, [(header::RETRY_AFTER, retry_after)]).into_response()
        }
        None => state.reply.status.into_response(),
    }
}

/// Serve a fake application endpoint on an ephemeral port.
pub async fn spawn_app(reply: Reply) -> FakeApp {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().route("/jobs", post(handle)).with_state(AppState {
        reply,
        seen: seen.clone(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeApp {
        url: format!("http://{}/jobs", addr),
        seen,
    }
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
