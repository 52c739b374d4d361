//! Local persistence for API data.
//!
//! Two layers share one tenant store:
//! - [`QueryCache`] caches arbitrary response payloads by key, with separate
//!   staleness and expiry deadlines and a durable refresh queue for
//!   stale-while-revalidate consumers.
//! - [`ReferenceCache`] mirrors coarse reference entities (projects, people,
//!   services, ...) with denormalized searchable columns so common lookups
//!   never touch the network.

mod query;
mod reference;

pub use query::{CachedResponse, QueryCache, RefreshJob};
pub use reference::{RefHit, ReferenceCache, ReferenceRecord};

/// Escape LIKE wildcards so user-supplied terms match literally.
pub(crate) fn like_escape(term: &str) -> String {
  term
    .replace('\\', "\\\\")
    .replace('%', "\\%")
    .replace('_', "\\_")
}
