//! Identifier resolution: human-friendly queries to canonical IDs.
//!
//! Resolution is cache-first: the reference mirror answers exact and
//! substring lookups when it can, the API fills the gaps, and anything
//! fetched is mirrored back best-effort.

pub mod detect;
pub mod kinds;

mod filters;

pub use filters::{FilterMetadata, FilterResolver, ResolveMode, ResolvedFilters};

use std::sync::Arc;
use tracing::warn;

use crate::api::{ApiRecord, ResourceApi, ResourceType};
use crate::cache::{RefHit, ReferenceCache, ReferenceRecord};
use crate::error::ResolveError;

/// Cap on fuzzy-match result lists.
const MAX_MATCHES: usize = 10;

/// Scoping context for kinds that are not unique across a tenant.
#[derive(Debug, Clone, Default)]
pub struct ResolveScope {
  pub project_id: Option<String>,
}

impl ResolveScope {
  pub fn for_project(project_id: impl Into<String>) -> Self {
    Self {
      project_id: Some(project_id.into()),
    }
  }
}

/// One resolution result. `exact` is true iff the match came from a
/// uniquely-keyed field (email, project number, deal number) and exactly one
/// record matched.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveMatch {
  pub id: String,
  pub kind: ResourceType,
  pub label: String,
  /// The raw query this match answered.
  pub query: String,
  pub exact: bool,
}

/// Resolves a single query string to matching entities.
#[derive(Clone)]
pub struct ResourceResolver {
  api: Arc<dyn ResourceApi>,
  reference: ReferenceCache,
  /// Mirror age beyond which fuzzy lookups prefer the API.
  reference_max_age: chrono::Duration,
}

impl ResourceResolver {
  pub fn new(api: Arc<dyn ResourceApi>, reference: ReferenceCache) -> Self {
    Self {
      api,
      reference,
      reference_max_age: chrono::Duration::hours(24),
    }
  }

  pub fn with_reference_max_age(mut self, max_age: chrono::Duration) -> Self {
    self.reference_max_age = max_age;
    self
  }

  /// Resolve a query to matching entities.
  ///
  /// Numeric queries are already canonical and return immediately without
  /// touching the cache or the network. Unique-field queries (email, project
  /// number, deal number) resolve to a single exact match; free text resolves
  /// to up to [`MAX_MATCHES`] fuzzy matches.
  pub async fn resolve(
    &self,
    query: &str,
    kind: Option<ResourceType>,
    scope: Option<&ResolveScope>,
  ) -> Result<Vec<ResolveMatch>, ResolveError> {
    let query = query.trim();

    if detect::is_numeric_id(query) {
      let kind = kind.unwrap_or(ResourceType::Project);
      return Ok(vec![ResolveMatch {
        id: query.to_string(),
        kind,
        label: query.to_string(),
        query: query.to_string(),
        exact: true,
      }]);
    }

    let kind = kind
      .or_else(|| detect::detect(query))
      .ok_or_else(|| ResolveError::AmbiguousType {
        query: query.to_string(),
      })?;

    let project_scope = scope.and_then(|s| s.project_id.as_deref());
    if kinds::spec(kind).scope_column.is_some() && project_scope.is_none() {
      return Err(ResolveError::MissingScope {
        query: query.to_string(),
      });
    }

    if detect::matches_unique(kind, query) {
      self.resolve_unique(query, kind).await
    } else {
      self.resolve_fuzzy(query, kind, project_scope).await
    }
  }

  /// Exact lookup on the kind's uniquely-keyed column, cache first.
  async fn resolve_unique(
    &self,
    query: &str,
    kind: ResourceType,
  ) -> Result<Vec<ResolveMatch>, ResolveError> {
    let unique = match kinds::spec(kind).unique_column {
      Some(col) => col,
      None => {
        return Err(ResolveError::NotFound {
          query: query.to_string(),
          kind,
        })
      }
    };
    let needle = detect::normalize_unique(kind, query);

    // A broken local store must not fail resolution; treat it as a miss.
    let mut hits = match self.reference.find_by_unique(kind, &needle) {
      Ok(hits) => hits,
      Err(e) => {
        warn!(error = %e, kind = %kind, "reference lookup failed, falling back to API");
        Vec::new()
      }
    };

    if hits.is_empty() {
      let records = self
        .api
        .list(kind, &[(unique, needle.as_str())])
        .await
        .map_err(ResolveError::Backend)?;
      self.remember(kind, &records);
      hits = records.iter().map(|r| hit_from_api(kind, r)).collect();
    }

    match hits.len() {
      0 => Err(ResolveError::NotFound {
        query: query.to_string(),
        kind,
      }),
      1 => Ok(vec![to_match(kind, &hits[0], query, true)]),
      // A unique field matching several records loses the exactness
      // guarantee; return them all and let the caller disambiguate.
      _ => Ok(
        hits
          .iter()
          .take(MAX_MATCHES)
          .map(|hit| to_match(kind, hit, query, false))
          .collect(),
      ),
    }
  }

  /// Substring search, mirror first, API fallback. A stale mirror still
  /// serves when the API is unreachable.
  async fn resolve_fuzzy(
    &self,
    query: &str,
    kind: ResourceType,
    project_scope: Option<&str>,
  ) -> Result<Vec<ResolveMatch>, ResolveError> {
    let cached = match self.reference.search(kind, query, project_scope, MAX_MATCHES) {
      Ok(hits) => hits,
      Err(e) => {
        warn!(error = %e, kind = %kind, "reference search failed, falling back to API");
        Vec::new()
      }
    };
    let mirror_valid = self
      .reference
      .is_cache_valid(kind, self.reference_max_age)
      .unwrap_or(false);

    if !cached.is_empty() && mirror_valid {
      return Ok(
        cached
          .iter()
          .map(|hit| to_match(kind, hit, query, false))
          .collect(),
      );
    }

    let mut filter: Vec<(&str, &str)> = vec![("query", query)];
    if let Some(project_id) = project_scope {
      filter.push(("project_id", project_id));
    }

    match self.api.list(kind, &filter).await {
      Ok(records) => {
        self.remember(kind, &records);

        let scope_column = kinds::spec(kind).scope_column;
        let mut matches: Vec<ResolveMatch> = records
          .iter()
          .filter(|record| match (project_scope, scope_column) {
            (Some(project_id), Some(col)) => {
              record.attr_str(col).as_deref() == Some(project_id)
            }
            _ => true,
          })
          .map(|record| to_match(kind, &hit_from_api(kind, record), query, false))
          .collect();
        matches.truncate(MAX_MATCHES);

        if matches.is_empty() {
          Err(ResolveError::NotFound {
            query: query.to_string(),
            kind,
          })
        } else {
          Ok(matches)
        }
      }
      Err(e) => {
        if cached.is_empty() {
          Err(ResolveError::Backend(e))
        } else {
          warn!(error = %e, kind = %kind, "API search failed, serving aged reference data");
          Ok(
            cached
              .iter()
              .map(|hit| to_match(kind, hit, query, false))
              .collect(),
          )
        }
      }
    }
  }

  /// Mirror fetched records, best-effort. Resolution already succeeded;
  /// a failing local store only costs the next lookup a network call.
  fn remember(&self, kind: ResourceType, records: &[ApiRecord]) {
    if records.is_empty() {
      return;
    }

    let mirrored: Vec<ReferenceRecord> = records
      .iter()
      .map(|record| ReferenceRecord::from_api(kind, record))
      .collect();

    if let Err(e) = self.reference.upsert(&mirrored) {
      warn!(error = %e, kind = %kind, count = mirrored.len(), "failed to mirror fetched records");
    }
  }
}

fn hit_from_api(kind: ResourceType, record: &ApiRecord) -> RefHit {
  let mirrored = ReferenceRecord::from_api(kind, record);
  RefHit {
    id: mirrored.id.clone(),
    label: mirrored.label(),
    raw: mirrored.raw.clone(),
  }
}

fn to_match(kind: ResourceType, hit: &RefHit, query: &str, exact: bool) -> ResolveMatch {
  ResolveMatch {
    id: hit.id.clone(),
    kind,
    label: hit.label.clone(),
    query: query.to_string(),
    exact,
  }
}
