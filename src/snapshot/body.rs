//! Request body decoding and bounded text previews.
//!
//! # Responsibilities
//! - Decode raw body bytes into a generic JSON tree
//! - Fall back to a textual capture when the bytes are not JSON
//! - Render length-bounded previews for logging and multipart content
//!
//! # Design Decisions
//! - A missing body and a zero-length body are both "no body": nothing is
//!   decoded and no field is emitted
//! - Truncation happens on the byte count, invalid UTF-8 is replaced lossily
//! - Numbers keep their literal text, so integers wider than 64 bits echo
//!   back unchanged

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default number of bytes kept by [`preview`].
pub const DEFAULT_PREVIEW_LIMIT: usize = 1000;

/// What to report when the body is not a JSON document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyFallback {
    /// The raw body text.
    #[default]
    RawText,
    /// A `"<kind>: <message>"` string describing the parse failure.
    ErrorDescriptor,
}

/// Decodes request bodies according to a fallback policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyCodec {
    fallback: BodyFallback,
}

impl BodyCodec {
    pub fn new(fallback: BodyFallback) -> Self {
        Self { fallback }
    }

    /// Decode `bytes` into a JSON value.
    ///
    /// Returns `None` when there is no body to report.
    pub fn decode(&self, bytes: &[u8]) -> Option<Value> {
        if bytes.is_empty() {
            return None;
        }

        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(error = %e, "Body is not JSON, using fallback");
                Some(Value::String(match self.fallback {
                    BodyFallback::RawText => String::from_utf8_lossy(bytes).into_owned(),
                    BodyFallback::ErrorDescriptor => describe_error(&e),
                }))
            }
        }
    }
}

fn describe_error(e: &serde_json::Error) -> String {
    let kind = match e.classify() {
        serde_json::error::Category::Io => "IoError",
        serde_json::error::Category::Syntax => "SyntaxError",
        serde_json::error::Category::Data => "DataError",
        serde_json::error::Category::Eof => "EofError",
    };
    format!("{}: {}", kind, e)
}

/// Render `bytes` as text, keeping at most `limit` bytes.
///
/// Truncated output carries a ` ... (omitted N bytes)` suffix. Text of
/// exactly `limit` bytes is returned whole, without an
/// ` ... (omitted 0 bytes)` suffix.
pub fn preview(bytes: &[u8], limit: usize) -> String {
    if bytes.len() <= limit {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    format!(
        "{} ... (omitted {} bytes)",
        String::from_utf8_lossy(&bytes[..limit]),
        bytes.len() - limit
    )
}
