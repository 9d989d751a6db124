//! Multipart part extraction.
//!
//! # Responsibilities
//! - Split a buffered `multipart/*` body into parts
//! - Describe each part (size, file name, content type, preview, headers)
//!
//! # Design Decisions
//! - Parts are best-effort: a broken stream yields an error the caller turns
//!   into "no multipart field"
//! - A part whose content cannot be read is still reported, without size or
//!   content
//! - Parts that end up with no fields at all are left out

use axum::body::Bytes;
use axum::http::{header, HeaderMap};
use futures_util::stream;
use serde_json::Map;
use thiserror::Error;

use crate::snapshot::body::preview;
use crate::snapshot::headers;
use crate::snapshot::FieldBag;

/// Failures while reading multipart data.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Content type claims multipart but carries no usable boundary.
    #[error("invalid multipart boundary: {0}")]
    Boundary(#[source] multer::Error),

    /// The part stream itself is malformed.
    #[error("multipart stream error: {0}")]
    Stream(#[source] multer::Error),
}

/// Returns the multipart boundary if `headers` declare a multipart body.
fn boundary(headers: &HeaderMap) -> Result<Option<String>, ExtractError> {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return Ok(None);
    };

    if !content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("multipart/")
    {
        return Ok(None);
    }

    multer::parse_boundary(content_type)
        .map(Some)
        .map_err(ExtractError::Boundary)
}

/// Describe every part of a multipart body.
///
/// Returns `Ok(None)` when the request is not multipart.
pub async fn extract(
    headers: &HeaderMap,
    body: Bytes,
    preview_limit: usize,
) -> Result<Option<FieldBag>, ExtractError> {
    let Some(boundary) = boundary(headers)? else {
        return Ok(None);
    };

    let body_stream = stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(body_stream, boundary);

    let mut parts = FieldBag::new();
    while let Some(field) = multipart.next_field().await.map_err(ExtractError::Stream)? {
        let name = field.name().map(str::to_string).unwrap_or_default();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(|m| m.to_string());
        let part_headers = headers::to_json(headers::collapse(headers::collect(field.headers())));

        let content = match field.bytes().await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(part = %name, error = %e, "Failed to read multipart content");
                crate::observability::metrics::record_extraction_failure("multipart_content");
                None
            }
        };

        let entry = describe_part(
            file_name,
            content_type,
            content.as_deref(),
            part_headers,
            preview_limit,
        );
        parts = parts.with_field_if_value_not(name, entry, FieldBag::is_empty);
    }

    Ok(Some(parts))
}

/// Entry for one part. `content` is `None` when the part could not be read,
/// which drops `size` and `content` but keeps everything else.
fn describe_part(
    file_name: Option<String>,
    content_type: Option<String>,
    content: Option<&[u8]>,
    part_headers: Map<String, serde_json::Value>,
    preview_limit: usize,
) -> FieldBag {
    FieldBag::new()
        .with_field_if_value("size", content.map(<[u8]>::len), Option::is_some)
        .with_field_if_value("file-name", file_name, Option::is_some)
        .with_field_if_value("content-type", content_type, Option::is_some)
        .with_field_if_value(
            "content",
            content.map(|c| preview(c, preview_limit)),
            Option::is_some,
        )
        .with_field_if_value_not("headers", part_headers, Map::is_empty)
}
