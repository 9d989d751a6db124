//! Request snapshot assembly and the request log line.
//!
//! # Data Flow
//! ```text
//! request parts + buffered body + connection metadata
//!     → body.rs       (body)
//!     → multipart.rs  (multipart)
//!     → method, uri, query
//!     → headers.rs    (headers)
//!     → cookies.rs    (cookies)
//!     → metadata fields
//!     → FieldBag (response) + log line (tracing)
//! ```
//!
//! # Design Decisions
//! - Field order is fixed and independent of the request
//! - Extraction failures become absent fields, never errors
//! - The builder is immutable; one instance serves concurrent requests

use std::fmt::Write;

use axum::body::Bytes;
use axum::http::request::Parts;
use serde_json::Map;

use crate::config::EchoConfig;
use crate::observability::metrics;
use crate::snapshot::body::{preview, BodyCodec, BodyFallback, DEFAULT_PREVIEW_LIMIT};
use crate::snapshot::headers::{self, HeaderMultiMap};
use crate::snapshot::{cookies, multipart, FieldBag};

pub const REQUEST_METHOD: &str = "request-method";
pub const REQUEST_URI: &str = "request-uri";
pub const REQUEST_QUERY: &str = "request-query";
pub const HEADERS: &str = "headers";
pub const COOKIES: &str = "cookies";
pub const BODY: &str = "body";
pub const MULTIPART: &str = "multipart";

/// Server and connection details the host knows about a request.
///
/// Every field is optional; unknown values are left out of the snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestMetadata {
    pub servlet_path: Option<String>,
    pub server_port: Option<u16>,
    pub local_port: Option<u16>,
    pub local_addr: Option<String>,
    pub local_name: Option<String>,
    pub session_id: Option<String>,
    pub remote_addr: Option<String>,
    pub remote_user: Option<String>,
    pub remote_host: Option<String>,
    pub remote_port: Option<u16>,
}

/// Knobs controlling what goes into a snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    pub body_fallback: BodyFallback,
    pub preview_limit: usize,
    pub multipart_enabled: bool,
    pub metadata_enabled: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            body_fallback: BodyFallback::default(),
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            multipart_enabled: true,
            metadata_enabled: true,
        }
    }
}

impl From<&EchoConfig> for SnapshotOptions {
    fn from(config: &EchoConfig) -> Self {
        Self {
            body_fallback: config.body_fallback,
            preview_limit: config.preview_limit,
            multipart_enabled: config.multipart_enabled,
            metadata_enabled: config.metadata_enabled,
        }
    }
}

/// Turns one request into a [`FieldBag`] and a log line.
#[derive(Debug, Clone)]
pub struct RequestSnapshotBuilder {
    codec: BodyCodec,
    options: SnapshotOptions,
}

impl Default for RequestSnapshotBuilder {
    fn default() -> Self {
        Self::new(SnapshotOptions::default())
    }
}

impl RequestSnapshotBuilder {
    pub fn new(options: SnapshotOptions) -> Self {
        Self {
            codec: BodyCodec::new(options.body_fallback),
            options,
        }
    }

    /// Build the snapshot for one request.
    pub async fn build(
        &self,
        parts: &Parts,
        body: &Bytes,
        metadata: Option<&RequestMetadata>,
    ) -> FieldBag {
        let mut snapshot = FieldBag::new().with_field_if_value(
            BODY,
            self.codec.decode(body),
            Option::is_some,
        );

        if self.options.multipart_enabled {
            let parts_bag =
                match multipart::extract(&parts.headers, body.clone(), self.options.preview_limit)
                    .await
                {
                    Ok(bag) => bag,
                    Err(e) => {
                        tracing::warn!(error = %e, "Ignoring unreadable multipart body");
                        metrics::record_extraction_failure("multipart");
                        None
                    }
                };
            if let Some(bag) = parts_bag {
                snapshot = snapshot.with_field_if_value_not(MULTIPART, bag, FieldBag::is_empty);
            }
        }

        snapshot = snapshot
            .with_field(REQUEST_METHOD, parts.method.as_str())
            .with_field(REQUEST_URI, parts.uri.path())
            .with_field_if_value(REQUEST_QUERY, parts.uri.query(), Option::is_some)
            .with_field_if_value_not(
                HEADERS,
                headers::to_json(headers::collapse(headers::collect(&parts.headers))),
                Map::is_empty,
            );

        if let Some(bag) = cookies::extract(&parts.headers) {
            snapshot = snapshot.with_field_if_value_not(COOKIES, bag, FieldBag::is_empty);
        }

        match metadata {
            Some(meta) if self.options.metadata_enabled => with_metadata(snapshot, meta),
            _ => snapshot,
        }
    }

    /// Emit the request log line at `info`.
    ///
    /// Rendering failures are logged and otherwise ignored.
    pub fn log_request(&self, parts: &Parts, body: &[u8]) {
        let headers = headers::collect(&parts.headers);
        match self.render_log_line(parts.method.as_str(), parts.uri.path(), &headers, body) {
            Ok(line) => tracing::info!("{}", line),
            Err(e) => tracing::error!(kind = "fmt::Error", error = %e, "Failed to render request log"),
        }
    }

    /// Render the multi-line request summary.
    ///
    /// ```text
    /// >>> GET /foo
    ///
    /// accept: */*
    /// host: example.com
    ///
    /// <body preview>
    /// ```
    pub fn render_log_line(
        &self,
        method: &str,
        uri: &str,
        headers: &HeaderMultiMap,
        body: &[u8],
    ) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        write!(out, ">>> {} {}", method, uri)?;

        if !headers.is_empty() {
            out.push_str("\n\n");
            for (name, value) in headers::collapse(headers.clone()) {
                if let Some(value) = value {
                    writeln!(out, "{}: {}", name, value)?;
                }
            }
        }

        if !body.is_empty() {
            out.push_str(if headers.is_empty() { "\n\n" } else { "\n" });
            writeln!(out, "{}", preview(body, self.options.preview_limit))?;
        }

        Ok(out)
    }
}

fn with_metadata(snapshot: FieldBag, meta: &RequestMetadata) -> FieldBag {
    snapshot
        .with_field_if_value("servlet-path", meta.servlet_path.clone(), Option::is_some)
        .with_field_if_value("server-port", meta.server_port, Option::is_some)
        .with_field_if_value("local-port", meta.local_port, Option::is_some)
        .with_field_if_value("local-addr", meta.local_addr.clone(), Option::is_some)
        .with_field_if_value("local-name", meta.local_name.clone(), Option::is_some)
        .with_field_if_value("session-id", meta.session_id.clone(), Option::is_some)
        .with_field_if_value("remote-addr", meta.remote_addr.clone(), Option::is_some)
        .with_field_if_value("remote-user", meta.remote_user.clone(), Option::is_some)
        .with_field_if_value("remote-host", meta.remote_host.clone(), Option::is_some)
        .with_field_if_value("remote-port", meta.remote_port, Option::is_some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, Request};
    use serde_json::json;

    fn parts_of(request: Request<()>) -> Parts {
        request.into_parts().0
    }

    #[tokio::test]
    async fn test_minimal_get() {
        let parts = parts_of(Request::builder().method("GET").uri("/foo").body(()).unwrap());
        let snapshot = RequestSnapshotBuilder::default()
            .build(&parts, &Bytes::new(), None)
            .await;

        assert_eq!(
            serde_json::to_value(&snapshot).unwrap(),
            json!({"request-method": "GET", "request-uri": "/foo"})
        );
    }

    #[tokio::test]
    async fn test_field_order() {
        let parts = parts_of(
            Request::builder()
                .method("POST")
                .uri("/a/b?x=1&y=2")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, "session=abc")
                .body(())
                .unwrap(),
        );
        let metadata = RequestMetadata {
            servlet_path: Some("/a/b".into()),
            server_port: Some(8080),
            local_port: Some(8080),
            local_addr: Some("127.0.0.1".into()),
            local_name: Some("127.0.0.1".into()),
            session_id: None,
            remote_addr: Some("127.0.0.1".into()),
            remote_user: None,
            remote_host: Some("127.0.0.1".into()),
            remote_port: Some(50000),
        };

        let snapshot = RequestSnapshotBuilder::default()
            .build(&parts, &Bytes::from_static(br#"{"foo":"bar"}"#), Some(&metadata))
            .await;

        let keys: Vec<_> = snapshot.keys().collect();
        assert_eq!(
            keys,
            vec![
                "body",
                "request-method",
                "request-uri",
                "request-query",
                "headers",
                "cookies",
                "servlet-path",
                "server-port",
                "local-port",
                "local-addr",
                "local-name",
                "remote-addr",
                "remote-host",
                "remote-port",
            ]
        );
        assert_eq!(snapshot.get(BODY), Some(&json!({"foo": "bar"})));
        assert_eq!(snapshot.get(REQUEST_QUERY), Some(&json!("x=1&y=2")));
        assert_eq!(snapshot.get(COOKIES), Some(&json!({"session": {"value": "abc"}})));
    }

    #[tokio::test]
    async fn test_metadata_toggle() {
        let parts = parts_of(Request::builder().uri("/").body(()).unwrap());
        let metadata = RequestMetadata {
            remote_port: Some(1),
            ..Default::default()
        };
        let builder = RequestSnapshotBuilder::new(SnapshotOptions {
            metadata_enabled: false,
            ..Default::default()
        });

        let snapshot = builder.build(&parts, &Bytes::new(), Some(&metadata)).await;
        assert!(snapshot.get("remote-port").is_none());
    }

    #[tokio::test]
    async fn test_multipart_toggle_and_broken_multipart() {
        let parts = parts_of(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .header(header::CONTENT_TYPE, "multipart/form-data")
                .body(())
                .unwrap(),
        );
        let snapshot = RequestSnapshotBuilder::default()
            .build(&parts, &Bytes::from_static(b"junk"), None)
            .await;

        // No boundary: multipart is dropped, the rest is still there
        assert!(snapshot.get(MULTIPART).is_none());
        assert_eq!(snapshot.get(BODY), Some(&json!("junk")));
        assert_eq!(snapshot.get(REQUEST_METHOD), Some(&json!("POST")));
    }

    #[test]
    fn test_log_line_format() {
        let builder = RequestSnapshotBuilder::default();
        let headers = vec![
            ("host".to_string(), vec!["example.com".to_string()]),
            ("accept".to_string(), vec!["*/*".to_string()]),
            ("x-tag".to_string(), vec!["a".to_string(), "b".to_string()]),
        ];

        let line = builder.render_log_line("GET", "/foo", &headers, b"").unwrap();
        assert_eq!(
            line,
            ">>> GET /foo\n\naccept: */*\nhost: example.com\nx-tag: [a, b]\n"
        );

        let line = builder.render_log_line("POST", "/foo", &headers, b"hello").unwrap();
        assert!(line.ends_with("x-tag: [a, b]\n\nhello\n"));
    }

    #[test]
    fn test_log_line_without_headers() {
        let builder = RequestSnapshotBuilder::default();
        assert_eq!(builder.render_log_line("GET", "/", &Vec::new(), b"").unwrap(), ">>> GET /");
        assert_eq!(
            builder.render_log_line("PUT", "/", &Vec::new(), b"x").unwrap(),
            ">>> PUT /\n\nx\n"
        );
    }

    #[test]
    fn test_log_line_truncates_body() {
        let builder = RequestSnapshotBuilder::default();
        let body = vec![b'a'; 1500];
        let line = builder.render_log_line("POST", "/", &Vec::new(), &body).unwrap();
        assert!(line.ends_with(&format!("{} ... (omitted 500 bytes)\n", "a".repeat(1000))));
    }
}
