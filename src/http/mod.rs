//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, body buffering)
//!     → request.rs (connection metadata, request ID)
//!     → snapshot (build FieldBag + log line)
//!     → JSON response, always 200 once the body is buffered
//! ```

pub mod request;
pub mod server;

pub use request::{ConnectionAddrs, MakeRequestUuidV4, X_REQUEST_ID};
pub use server::HttpServer;
