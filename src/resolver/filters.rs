//! Whole-filter-map resolution.
//!
//! Callers hand over a filter map where any value may be human-friendly; each
//! resolvable key is rewritten to a canonical ID independently, with audit
//! metadata describing what was substituted. One bad value never aborts the
//! rest of the map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::api::ResourceType;

use super::{detect, ResolveScope, ResourceResolver};

/// Ambiguity policy for fuzzy filter matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
  /// Substitute the first ranked match even when it is not exact.
  #[default]
  Lenient,
  /// Substitute only unique exact matches; anything fuzzy passes through
  /// unresolved.
  Strict,
}

/// Audit record for one substituted filter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterMetadata {
  pub input: String,
  pub id: String,
  pub label: String,
  /// Safe for the caller to cache and reuse: true only for a unique exact
  /// match.
  pub reusable: bool,
}

/// A rewritten filter map plus what was substituted where.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedFilters {
  pub resolved: BTreeMap<String, String>,
  pub metadata: BTreeMap<String, FilterMetadata>,
}

/// Filter keys with a well-known target type. Everything else passes through
/// untouched.
pub fn filter_key_type(key: &str) -> Option<ResourceType> {
  match key {
    "person_id" | "assignee_id" | "creator_id" | "responsible_id" => Some(ResourceType::Person),
    "project_id" => Some(ResourceType::Project),
    "company_id" => Some(ResourceType::Company),
    "deal_id" => Some(ResourceType::Deal),
    "service_id" => Some(ResourceType::Service),
    _ => None,
  }
}

/// Applies [`ResourceResolver`] across a whole filter map.
#[derive(Clone)]
pub struct FilterResolver {
  resolver: Arc<ResourceResolver>,
  mode: ResolveMode,
}

impl FilterResolver {
  pub fn new(resolver: Arc<ResourceResolver>) -> Self {
    Self {
      resolver,
      mode: ResolveMode::default(),
    }
  }

  pub fn with_mode(mut self, mode: ResolveMode) -> Self {
    self.mode = mode;
    self
  }

  /// Rewrite every resolvable value in a filter map. Never fails: keys that
  /// cannot be resolved keep their raw value and get no metadata entry.
  ///
  /// Keys are independent and resolved concurrently; the result is identical
  /// to resolving them one by one.
  pub async fn resolve_filters(
    &self,
    filters: &BTreeMap<String, String>,
    scope: Option<&ResolveScope>,
  ) -> ResolvedFilters {
    let pending = filters.iter().map(|(key, value)| async move {
      let (id, metadata) = self.resolve_one(key, value, scope).await;
      (key.clone(), id, metadata)
    });
    let results = futures::future::join_all(pending).await;

    let mut out = ResolvedFilters::default();
    for (key, id, metadata) in results {
      if let Some(metadata) = metadata {
        out.metadata.insert(key.clone(), metadata);
      }
      out.resolved.insert(key, id);
    }

    out
  }

  async fn resolve_one(
    &self,
    key: &str,
    value: &str,
    scope: Option<&ResolveScope>,
  ) -> (String, Option<FilterMetadata>) {
    let kind = match filter_key_type(key) {
      Some(kind) => kind,
      None => return (value.to_string(), None),
    };

    // Already canonical
    if detect::is_numeric_id(value) {
      return (value.to_string(), None);
    }

    match self.resolver.resolve(value, Some(kind), scope).await {
      Ok(matches) => {
        let first = match matches.first() {
          Some(first) => first,
          None => return (value.to_string(), None),
        };
        let reusable = matches.len() == 1 && first.exact;

        if self.mode == ResolveMode::Strict && !reusable {
          debug!(
            key,
            value,
            candidates = matches.len(),
            "strict mode left ambiguous filter unresolved"
          );
          return (value.to_string(), None);
        }

        (
          first.id.clone(),
          Some(FilterMetadata {
            input: value.to_string(),
            id: first.id.clone(),
            label: first.label.clone(),
            reusable,
          }),
        )
      }
      Err(e) => {
        debug!(key, value, error = %e, "filter value left unresolved");
        (value.to_string(), None)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use color_eyre::Result;
  use serde_json::json;
  use std::collections::HashMap;

  use crate::api::{ApiRecord, ResourceApi};
  use crate::cache::ReferenceCache;
  use crate::store::TenantStore;

  struct FakeApi {
    records: HashMap<ResourceType, Vec<ApiRecord>>,
  }

  #[async_trait]
  impl ResourceApi for FakeApi {
    async fn list(&self, kind: ResourceType, filter: &[(&str, &str)]) -> Result<Vec<ApiRecord>> {
      let records = self.records.get(&kind).cloned().unwrap_or_default();
      Ok(
        records
          .into_iter()
          .filter(|record| {
            filter.iter().all(|(field, value)| match *field {
              "query" => record
                .attr_str("name")
                .map(|name| name.to_lowercase().contains(&value.to_lowercase()))
                .unwrap_or(false),
              field => record
                .attr_str(field)
                .map(|attr| attr.eq_ignore_ascii_case(value))
                .unwrap_or(false),
            })
          })
          .collect(),
      )
    }
  }

  fn filter_resolver(records: HashMap<ResourceType, Vec<ApiRecord>>) -> FilterResolver {
    let store = Arc::new(TenantStore::open_in_memory("test-org").unwrap());
    let resolver = ResourceResolver::new(
      Arc::new(FakeApi { records }),
      ReferenceCache::new(store),
    );
    FilterResolver::new(Arc::new(resolver))
  }

  fn filters(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  #[tokio::test]
  async fn test_numeric_values_pass_through_without_metadata() {
    let resolver = filter_resolver(HashMap::new());

    let out = resolver
      .resolve_filters(&filters(&[("project_id", "123")]), None)
      .await;
    assert_eq!(out.resolved.get("project_id").unwrap(), "123");
    assert!(out.metadata.is_empty());
  }

  #[tokio::test]
  async fn test_unknown_keys_pass_through_unresolved() {
    let resolver = filter_resolver(HashMap::new());

    let out = resolver
      .resolve_filters(&filters(&[("unrelated_key", "abc")]), None)
      .await;
    assert_eq!(out.resolved.get("unrelated_key").unwrap(), "abc");
    assert!(out.metadata.is_empty());
  }

  #[tokio::test]
  async fn test_exact_match_is_substituted_and_reusable() {
    let records = HashMap::from([(
      ResourceType::Person,
      vec![ApiRecord {
        id: "p1".to_string(),
        attributes: json!({ "name": "Jane Doe", "email": "jane@example.com" }),
      }],
    )]);
    let resolver = filter_resolver(records);

    let out = resolver
      .resolve_filters(&filters(&[("assignee_id", "jane@example.com")]), None)
      .await;
    assert_eq!(out.resolved.get("assignee_id").unwrap(), "p1");

    let metadata = out.metadata.get("assignee_id").unwrap();
    assert_eq!(metadata.input, "jane@example.com");
    assert_eq!(metadata.label, "Jane Doe");
    assert!(metadata.reusable);
  }

  #[tokio::test]
  async fn test_lenient_mode_takes_first_fuzzy_match_without_reuse_guarantee() {
    let records = HashMap::from([(
      ResourceType::Project,
      vec![
        ApiRecord {
          id: "1".to_string(),
          attributes: json!({ "name": "Website Redesign" }),
        },
        ApiRecord {
          id: "2".to_string(),
          attributes: json!({ "name": "Website Migration" }),
        },
      ],
    )]);
    let resolver = filter_resolver(records);

    let out = resolver
      .resolve_filters(&filters(&[("project_id", "website")]), None)
      .await;
    // First ranked candidate wins
    let id = out.resolved.get("project_id").unwrap();
    assert!(id == "1" || id == "2");

    let metadata = out.metadata.get("project_id").unwrap();
    assert!(!metadata.reusable);
  }

  #[tokio::test]
  async fn test_strict_mode_leaves_fuzzy_matches_unresolved() {
    let records = HashMap::from([(
      ResourceType::Project,
      vec![
        ApiRecord {
          id: "1".to_string(),
          attributes: json!({ "name": "Website Redesign" }),
        },
        ApiRecord {
          id: "2".to_string(),
          attributes: json!({ "name": "Website Migration" }),
        },
      ],
    )]);
    let resolver = filter_resolver(records).with_mode(ResolveMode::Strict);

    let out = resolver
      .resolve_filters(&filters(&[("project_id", "website")]), None)
      .await;
    assert_eq!(out.resolved.get("project_id").unwrap(), "website");
    assert!(out.metadata.is_empty());
  }

  #[tokio::test]
  async fn test_per_key_failure_does_not_abort_siblings() {
    let records = HashMap::from([(
      ResourceType::Person,
      vec![ApiRecord {
        id: "p1".to_string(),
        attributes: json!({ "name": "Jane Doe", "email": "jane@example.com" }),
      }],
    )]);
    let resolver = filter_resolver(records);

    let out = resolver
      .resolve_filters(
        &filters(&[
          ("assignee_id", "jane@example.com"),
          ("deal_id", "nobody-knows"),
        ]),
        None,
      )
      .await;

    // The failing key keeps its raw value and gets no metadata
    assert_eq!(out.resolved.get("deal_id").unwrap(), "nobody-knows");
    assert!(!out.metadata.contains_key("deal_id"));

    // The sibling still resolved
    assert_eq!(out.resolved.get("assignee_id").unwrap(), "p1");
    assert!(out.metadata.contains_key("assignee_id"));
  }

  #[tokio::test]
  async fn test_key_table_covers_all_person_aliases() {
    for key in ["person_id", "assignee_id", "creator_id", "responsible_id"] {
      assert_eq!(filter_key_type(key), Some(ResourceType::Person));
    }
    assert_eq!(filter_key_type("service_id"), Some(ResourceType::Service));
    assert_eq!(filter_key_type("order_id"), None);
  }
}
