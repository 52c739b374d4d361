//! rolodex: human-friendly identifier resolution and a staleness-aware local
//! cache for project-management APIs.
//!
//! Callers address remote entities (people, projects, deals, services,
//! companies) by emails, project/deal numbers or free-text names instead of
//! opaque numeric IDs. A per-tenant SQLite store mirrors reference data and
//! caches generic API responses so repeated lookups avoid network round trips.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod resolver;
pub mod store;
pub mod telemetry;

pub use api::{ApiRecord, HttpResourceApi, ResourceApi, ResourceType};
pub use cache::{CachedResponse, QueryCache, RefHit, ReferenceCache, ReferenceRecord, RefreshJob};
pub use config::Config;
pub use error::ResolveError;
pub use resolver::{
  FilterMetadata, FilterResolver, ResolveMatch, ResolveMode, ResolveScope, ResolvedFilters,
  ResourceResolver,
};
pub use store::{StoreRegistry, TenantStore};
