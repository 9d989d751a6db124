//! Request introspection: turns an HTTP request into a structured snapshot.
//!
//! # Data Flow
//! ```text
//! request (parts + buffered body)
//!     → builder.rs (field order, failure handling)
//!         → body.rs      (JSON decode / text fallback / previews)
//!         → multipart.rs (per-part descriptions)
//!         → headers.rs   (multi-map → sorted single-or-list map)
//!         → cookies.rs   (cookie header → per-cookie bags)
//!     → field_bag.rs (ordered JSON object)
//! ```
//!
//! # Design Decisions
//! - Everything is built fresh per request; no shared mutable state
//! - No extraction failure ever turns into an HTTP error

pub mod body;
pub mod builder;
pub mod cookies;
pub mod field_bag;
pub mod headers;
pub mod multipart;

pub use body::{BodyCodec, BodyFallback};
pub use builder::{RequestMetadata, RequestSnapshotBuilder, SnapshotOptions};
pub use field_bag::FieldBag;
