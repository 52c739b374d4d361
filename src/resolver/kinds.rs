//! Per-kind resolution strategy table.
//!
//! Adding a resolvable kind means adding a row here plus its mirror table in
//! the store schema, not new branches scattered across the resolver.

use crate::api::ResourceType;

pub struct KindSpec {
  pub kind: ResourceType,
  /// Mirror table in the tenant store.
  pub table: &'static str,
  /// Column match labels are taken from.
  pub label_column: &'static str,
  /// Denormalized columns stored for the kind, in schema order.
  pub columns: &'static [&'static str],
  /// Columns substring search runs over.
  pub search_columns: &'static [&'static str],
  /// Uniquely-keyed column backing exact lookups, when the kind has one.
  pub unique_column: Option<&'static str>,
  /// Column a query must additionally be scoped by (services per project,
  /// because service names are not unique across a tenant).
  pub scope_column: Option<&'static str>,
}

static PERSON: KindSpec = KindSpec {
  kind: ResourceType::Person,
  table: "people",
  label_column: "name",
  columns: &["name", "email", "company_id"],
  search_columns: &["name", "email"],
  unique_column: Some("email"),
  scope_column: None,
};

static PROJECT: KindSpec = KindSpec {
  kind: ResourceType::Project,
  table: "projects",
  label_column: "name",
  columns: &["name", "project_number", "company_id"],
  search_columns: &["name", "project_number"],
  unique_column: Some("project_number"),
  scope_column: None,
};

static DEAL: KindSpec = KindSpec {
  kind: ResourceType::Deal,
  table: "deals",
  label_column: "name",
  columns: &["name", "deal_number", "company_id"],
  search_columns: &["name", "deal_number"],
  unique_column: Some("deal_number"),
  scope_column: None,
};

static SERVICE: KindSpec = KindSpec {
  kind: ResourceType::Service,
  table: "services",
  label_column: "name",
  columns: &["name", "project_id", "deal_id"],
  search_columns: &["name"],
  unique_column: None,
  scope_column: Some("project_id"),
};

static COMPANY: KindSpec = KindSpec {
  kind: ResourceType::Company,
  table: "companies",
  label_column: "name",
  columns: &["name"],
  search_columns: &["name"],
  unique_column: None,
  scope_column: None,
};

pub fn spec(kind: ResourceType) -> &'static KindSpec {
  match kind {
    ResourceType::Person => &PERSON,
    ResourceType::Project => &PROJECT,
    ResourceType::Deal => &DEAL,
    ResourceType::Service => &SERVICE,
    ResourceType::Company => &COMPANY,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_search_columns_are_stored_columns() {
    for kind in [
      ResourceType::Person,
      ResourceType::Project,
      ResourceType::Deal,
      ResourceType::Service,
      ResourceType::Company,
    ] {
      let spec = spec(kind);
      for col in spec.search_columns {
        assert!(spec.columns.contains(col), "{kind}: {col} not stored");
      }
      if let Some(unique) = spec.unique_column {
        assert!(spec.columns.contains(&unique));
      }
      assert!(spec.columns.contains(&spec.label_column));
    }
  }
}
