//! Typed failures of identifier resolution.

use crate::api::ResourceType;

/// Why a query could not be resolved to a remote entity.
///
/// `resolve()` surfaces these to the caller; `resolve_filters()` swallows them
/// per key and passes the raw value through instead.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
  /// The query was classified (or explicitly typed) but matched nothing.
  #[error("no {kind} found matching '{query}'")]
  NotFound { query: String, kind: ResourceType },

  /// No explicit type was supplied and pattern classification was
  /// inconclusive. The caller must pass a type for free-text queries.
  #[error("cannot infer a resource type for '{query}'; supply one explicitly")]
  AmbiguousType { query: String },

  /// Service names are only unique within a project, so resolving one
  /// requires a project id in the scope.
  #[error("resolving service '{query}' requires a project id in the scope")]
  MissingScope { query: String },

  /// The external API (or an explicitly required cache read) failed.
  #[error("backend request failed: {0}")]
  Backend(color_eyre::Report),
}

impl From<color_eyre::Report> for ResolveError {
  fn from(report: color_eyre::Report) -> Self {
    Self::Backend(report)
  }
}

impl ResolveError {
  /// The raw query the failure refers to, when one is attached.
  pub fn query(&self) -> Option<&str> {
    match self {
      Self::NotFound { query, .. }
      | Self::AmbiguousType { query }
      | Self::MissingScope { query } => Some(query),
      Self::Backend(_) => None,
    }
  }
}
