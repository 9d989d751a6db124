//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the echo
//! server. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

pub use crate::snapshot::BodyFallback;

/// Root configuration for the echo server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// What goes into each request snapshot.
    pub echo: EchoConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum request body buffered per request, in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Snapshot settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EchoConfig {
    /// What the `body` field holds when the body is not JSON.
    pub body_fallback: BodyFallback,

    /// Bytes kept by body and multipart previews.
    pub preview_limit: usize,

    /// Report multipart parts.
    pub multipart_enabled: bool,

    /// Report server and connection metadata.
    pub metadata_enabled: bool,

    /// Cookie reported as `session-id`.
    pub session_cookie: String,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            body_fallback: BodyFallback::RawText,
            preview_limit: crate::snapshot::body::DEFAULT_PREVIEW_LIMIT,
            multipart_enabled: true,
            metadata_enabled: true,
            session_cookie: "JSESSIONID".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
