//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all echo handler
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Bind server to listener with per-connection address info
//! - Buffer each request, build its snapshot and reply with it
//!
//! # Design Decisions
//! - The snapshot reports the headers the client sent; the generated
//!   `x-request-id` only shows up on the response and the request span
//! - Only a body over the size limit is a 413; other read failures are a 400

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use http_body_util::LengthLimitError;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::http::request::{self, ConnectionAddrs, MakeRequestUuidV4};
use crate::observability::metrics;
use crate::snapshot::{RequestSnapshotBuilder, SnapshotOptions};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub builder: Arc<RequestSnapshotBuilder>,
    pub session_cookie: Arc<str>,
    pub max_body_size: usize,
}

/// HTTP server answering every request with its own snapshot.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let state = AppState {
            builder: Arc::new(RequestSnapshotBuilder::new(SnapshotOptions::from(&config.echo))),
            session_cookie: Arc::from(config.echo.session_cookie.as_str()),
            max_body_size: config.listener.max_body_size,
        };

        let router = Self::build_router(&config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(echo_handler))
            .route("/", any(echo_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request::request_id(request.extensions()),
                )
            }))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
            .layer(middleware::from_fn(request::capture_received_headers))
    }

    /// The router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        let app = self
            .router
            .into_make_service_with_connect_info::<ConnectionAddrs>();

        // Serve with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Whether a body read failed on the size limit rather than on transport.
fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// Catch-all handler: reply with the snapshot of the request.
async fn echo_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let conn = request
        .extensions()
        .get::<ConnectInfo<ConnectionAddrs>>()
        .map(|ConnectInfo(addrs)| *addrs)
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(peer)| ConnectionAddrs {
                    local: None,
                    peer: Some(*peer),
                })
        })
        .unwrap_or_default();

    let (mut parts, body) = request.into_parts();
    let request_id = request::request_id(&parts.extensions).to_string();
    request::restore_received_headers(&mut parts);

    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) if is_length_limit(&e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Request body over size limit");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to read request body");
            return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        path = %parts.uri.path(),
        body_len = body.len(),
        "Echoing request"
    );
    metrics::record_request(parts.method.as_str(), body.len());

    let metadata = request::metadata(&parts, conn, &state.session_cookie);
    let snapshot = state.builder.build(&parts, &body, Some(&metadata)).await;
    state.builder.log_request(&parts, &body);

    Json(snapshot).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::X_REQUEST_ID;
    use axum::body::Bytes;
    use axum::http::header;
    use http_body_util::BodyExt; // for `collect`
    use serde_json::{json, Value};
    use tower::ServiceExt; // for `oneshot`

    async fn echo(config: ServerConfig, request: Request<Body>) -> (StatusCode, Value) {
        let app = HttpServer::new(config).router();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_get_any_path() {
        let (status, body) = echo(
            ServerConfig::default(),
            Request::builder().uri("/foo/bar").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["request-method"], "GET");
        assert_eq!(body["request-uri"], "/foo/bar");
        assert_eq!(body["servlet-path"], "/foo/bar");
        assert!(body.get("body").is_none());
        assert!(body.get("headers").is_none());
    }

    #[tokio::test]
    async fn test_request_id_stays_off_the_snapshot() {
        let app = HttpServer::new(ServerConfig::default()).router();
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let id = response.headers()[X_REQUEST_ID].to_str().unwrap().to_string();
        assert!(uuid::Uuid::parse_str(&id).is_ok());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert!(body.get("headers").is_none(), "unexpected headers: {}", body);
    }

    #[tokio::test]
    async fn test_client_request_id_is_echoed_and_propagated() {
        let app = HttpServer::new(ServerConfig::default()).router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(X_REQUEST_ID, "client-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[X_REQUEST_ID], "client-id");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["headers"], json!({"x-request-id": "client-id"}));
    }

    #[tokio::test]
    async fn test_root_and_any_method() {
        let (status, body) = echo(
            ServerConfig::default(),
            Request::builder()
                .method("DELETE")
                .uri("/?a=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["request-method"], "DELETE");
        assert_eq!(body["request-uri"], "/");
        assert_eq!(body["request-query"], "a=1");
    }

    #[tokio::test]
    async fn test_json_body_is_structured() {
        let (_, body) = echo(
            ServerConfig::default(),
            Request::builder()
                .method("POST")
                .uri("/foo")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"foo":"bar"}"#))
                .unwrap(),
        )
        .await;

        assert_eq!(body["body"], json!({"foo": "bar"}));
        assert_eq!(body["headers"]["content-type"], "application/json");
    }

    #[tokio::test]
    async fn test_error_descriptor_fallback() {
        let mut config = ServerConfig::default();
        config.echo.body_fallback = crate::snapshot::BodyFallback::ErrorDescriptor;

        let (_, body) = echo(
            config,
            Request::builder()
                .method("POST")
                .uri("/")
                .body(Body::from("not-json"))
                .unwrap(),
        )
        .await;

        assert!(body["body"].as_str().unwrap().starts_with("SyntaxError: "));
    }

    #[tokio::test]
    async fn test_repeated_header_becomes_list() {
        let (_, body) = echo(
            ServerConfig::default(),
            Request::builder()
                .uri("/")
                .header("X-Tag", "a")
                .header("X-Tag", "b")
                .header("X-Once", "c")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(body["headers"]["x-tag"], json!(["a", "b"]));
        assert_eq!(body["headers"]["x-once"], "c");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let mut config = ServerConfig::default();
        config.listener.max_body_size = 4;

        let (status, _) = echo(
            config,
            Request::builder()
                .method("POST")
                .uri("/")
                .body(Body::from("too large"))
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_streamed_oversized_body_is_rejected() {
        let mut config = ServerConfig::default();
        config.listener.max_body_size = 4;

        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"def")),
        ];
        let (status, _) = echo(
            config,
            Request::builder()
                .method("POST")
                .uri("/")
                .body(Body::from_stream(futures_util::stream::iter(chunks)))
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_broken_body_stream_is_bad_request() {
        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let (status, _) = echo(
            ServerConfig::default(),
            Request::builder()
                .method("POST")
                .uri("/")
                .body(Body::from_stream(futures_util::stream::iter(chunks)))
                .unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_metadata_disabled() {
        let mut config = ServerConfig::default();
        config.echo.metadata_enabled = false;

        let (_, body) = echo(
            config,
            Request::builder().uri("/x").body(Body::empty()).unwrap(),
        )
        .await;

        assert!(body.get("servlet-path").is_none());
    }
}
