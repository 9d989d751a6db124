//! HTTP echo server library.
//!
//! Every request, on any path and with any method, is answered with a JSON
//! snapshot of what the server observed: method, URI, query, headers,
//! cookies, multipart parts, body and connection details.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod snapshot;

pub use config::schema::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use snapshot::{FieldBag, RequestSnapshotBuilder};
