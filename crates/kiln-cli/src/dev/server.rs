//! HTTP and WebSocket front of the dev server.
//!
//! Fixed routes serve the browser client, the environment snapshot and the
//! hot-update socket; everything else goes through the module pipeline.

use std::future::Future;

use axum::{
    Router,
    body::Body,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use kiln_core::HmrPayload;
use kiln_core::compile::env_module;
use kiln_core::paths::{CLIENT_PUBLIC_PATH, ENV_PUBLIC_PATH};
use tower_http::cors::{Any, CorsLayer};

use crate::dev::middleware::{self, ModuleRequest, Served};
use crate::dev::state::SharedState;
use crate::error::{CliError, Result};

/// Sub-protocol token the client asks for when opening the socket.
pub const HMR_PROTOCOL: &str = "kiln-hmr";

/// Path of the hot-update socket.
pub const HMR_PATH: &str = "/@kiln/hmr";

const CLIENT_SCRIPT: &str = include_str!("../../assets/client.js");

pub struct DevServer {
    host: String,
    port: u16,
    cors: bool,
    state: SharedState,
}

impl DevServer {
    pub fn new(host: impl Into<String>, port: u16, cors: bool, state: SharedState) -> Self {
        Self {
            host: host.into(),
            port,
            cors,
            state,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Bind and serve until `shutdown` resolves.
    pub async fn start(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let url = self.url();
        let app = build_router(self.state, self.cors);

        let listener = tokio::net::TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                CliError::Server(format!("Failed to bind to {}:{}: {e}", self.host, self.port))
            })?;

        crate::ui::success(&format!("Dev server running at {url}"));

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| CliError::Server(e.to_string()))
    }
}

/// Router for `state`.
pub fn build_router(state: SharedState, cors: bool) -> Router {
    let router = Router::new()
        .route(CLIENT_PUBLIC_PATH, get(handle_client))
        .route(ENV_PUBLIC_PATH, get(handle_env))
        .route(HMR_PATH, get(handle_upgrade))
        .fallback(handle_request);

    let router = if cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };
    router.with_state(state)
}

async fn handle_upgrade(State(state): State<SharedState>, ws: WebSocketUpgrade) -> Response {
    ws.protocols([HMR_PROTOCOL])
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: SharedState) {
    let (id, mut rx) = state.register_client();
    tracing::debug!(client = id, "hot-update client connected");

    let connected = serde_json::to_string(&HmrPayload::Connected).unwrap_or_default();
    if socket.send(Message::Text(connected.into())).await.is_err() {
        state.unregister_client(id);
        return;
    }

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                let Some(json) = outgoing else { break };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.unregister_client(id);
    tracing::debug!(client = id, "hot-update client disconnected");
}

async fn handle_client() -> Response {
    javascript(CLIENT_SCRIPT.to_string())
}

async fn handle_env(State(state): State<SharedState>) -> Response {
    javascript(env_module(&state.env, &state.mode))
}

fn javascript(code: String) -> Response {
    let mut response = Response::new(Body::from(code));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/javascript"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

async fn handle_request(State(state): State<SharedState>, uri: Uri, headers: HeaderMap) -> Response {
    let url = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let header_text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value: &HeaderValue| value.to_str().ok())
            .map(String::from)
    };
    let request = ModuleRequest {
        url,
        if_none_match: header_text(header::IF_NONE_MATCH),
        referer: header_text(header::REFERER),
    };

    let served = middleware::serve(&state, &request).await;
    if served.status.is_server_error() {
        tracing::error!(url = %request.url, status = %served.status, "request failed");
    }
    into_response(served)
}

fn into_response(served: Served) -> Response {
    let mut response = Response::new(Body::from(served.body));
    *response.status_mut() = served.status;

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if served.status != StatusCode::NOT_MODIFIED {
        if let Ok(value) = HeaderValue::from_str(&served.content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
    }
    if let Some(etag) = served.etag.and_then(|etag| HeaderValue::from_str(&etag).ok()) {
        headers.insert(header::ETAG, etag);
    }
    response.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn not_modified_has_no_content_type() {
        let response = into_response(Served {
            status: StatusCode::NOT_MODIFIED,
            content_type: Cow::Borrowed(""),
            body: Vec::new(),
            etag: Some("\"abc\"".into()),
        });
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
        assert_eq!(response.headers()[header::ETAG], "\"abc\"");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    }

    #[test]
    fn client_script_uses_the_protocol_token() {
        assert!(CLIENT_SCRIPT.contains(HMR_PROTOCOL));
        assert!(CLIENT_SCRIPT.contains(HMR_PATH));
        assert!(CLIENT_SCRIPT.contains("export function createHotContext"));
        assert!(CLIENT_SCRIPT.contains("export function updateStyle"));
    }
}
