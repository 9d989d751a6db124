//! Connection and server details of an inbound request.
//!
//! # Responsibilities
//! - Derive the metadata fields of a snapshot from the request and the
//!   socket addresses of its connection
//! - Generate request IDs for the `x-request-id` header
//! - Keep the headers as the client sent them, before any layer adds to them
//!
//! # Design Decisions
//! - No DNS: host names are reported as the textual IP address
//! - `remote-user` comes from a `Basic` Authorization header; it is reported,
//!   never verified

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::connect_info::Connected;
use axum::http::{header, request::Parts, uri::Authority, Extensions, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use axum::serve::IncomingStream;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::net::TcpListener;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::snapshot::cookies;
use crate::snapshot::RequestMetadata;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        Uuid::new_v4().to_string().parse().ok().map(RequestId::new)
    }
}

/// Request ID stored by the request ID layer, or `"unknown"`.
pub fn request_id(extensions: &Extensions) -> &str {
    extensions
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
}

/// Request headers exactly as they arrived on the wire.
#[derive(Debug, Clone)]
pub struct ReceivedHeaders(pub HeaderMap);

/// Stash a copy of the incoming headers.
///
/// Must run outside every layer that edits request headers.
pub async fn capture_received_headers(mut request: Request<Body>, next: Next) -> Response {
    let received = ReceivedHeaders(request.headers().clone());
    request.extensions_mut().insert(received);
    next.run(request).await
}

/// Put the captured headers back in place of the ones layers have edited.
pub fn restore_received_headers(parts: &mut Parts) {
    if let Some(ReceivedHeaders(headers)) = parts.extensions.remove::<ReceivedHeaders>() {
        parts.headers = headers;
    }
}

/// Socket addresses of the connection a request arrived on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionAddrs {
    pub local: Option<SocketAddr>,
    pub peer: Option<SocketAddr>,
}

impl Connected<IncomingStream<'_, TcpListener>> for ConnectionAddrs {
    fn connect_info(stream: IncomingStream<'_, TcpListener>) -> Self {
        Self {
            local: stream.io().local_addr().ok(),
            peer: Some(*stream.remote_addr()),
        }
    }
}

/// Collect the metadata fields for `parts`.
pub fn metadata(parts: &Parts, conn: ConnectionAddrs, session_cookie: &str) -> RequestMetadata {
    let local_ip = conn.local.map(|addr| addr.ip().to_string());
    let peer_ip = conn.peer.map(|addr| addr.ip().to_string());

    RequestMetadata {
        servlet_path: Some(parts.uri.path().to_string()),
        server_port: host_port(parts).or(conn.local.map(|addr| addr.port())),
        local_port: conn.local.map(|addr| addr.port()),
        local_addr: local_ip.clone(),
        local_name: local_ip,
        session_id: session_id(&parts.headers, session_cookie),
        remote_addr: peer_ip.clone(),
        remote_user: basic_auth_user(&parts.headers),
        remote_host: peer_ip,
        remote_port: conn.peer.map(|addr| addr.port()),
    }
}

/// Port named by the `Host` header, or by an absolute request URI.
fn host_port(parts: &Parts) -> Option<u16> {
    parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .and_then(|host| host.parse::<Authority>().ok())
        .and_then(|authority| authority.port_u16())
        .or_else(|| parts.uri.port_u16())
}

fn session_id(headers: &HeaderMap, session_cookie: &str) -> Option<String> {
    cookies::parse(headers)
        .into_iter()
        .filter(|c| c.name == session_cookie)
        .last()
        .and_then(|c| c.value)
}

fn basic_auth_user(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, credentials) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(credentials.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let user = decoded.split_once(':').map_or(decoded.as_str(), |(user, _)| user);
    Some(user.to_string())
}
