//! Boundary to the remote project-management API.
//!
//! The resolver and caches only depend on the [`ResourceApi`] trait: one
//! "list by filter" operation per resource kind, returning paged collections
//! of id + attributes records. [`HttpResourceApi`] is the real implementation;
//! tests substitute their own.

mod client;

pub use client::HttpResourceApi;

use async_trait::async_trait;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The resource kinds this crate knows how to resolve and mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
  Person,
  Project,
  Deal,
  Service,
  Company,
}

impl ResourceType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Person => "person",
      Self::Project => "project",
      Self::Deal => "deal",
      Self::Service => "service",
      Self::Company => "company",
    }
  }

  /// Path segment of the kind's list endpoint.
  pub fn api_path(&self) -> &'static str {
    match self {
      Self::Person => "people",
      Self::Project => "projects",
      Self::Deal => "deals",
      Self::Service => "services",
      Self::Company => "companies",
    }
  }
}

impl std::fmt::Display for ResourceType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One record from a list endpoint: the canonical id plus the raw attribute
/// object, untyped because each kind carries different fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRecord {
  pub id: String,
  #[serde(default)]
  pub attributes: Value,
}

impl ApiRecord {
  /// Read a string-ish attribute (strings and numbers both count; remote
  /// payloads are not consistent about which one ids come back as).
  pub fn attr_str(&self, name: &str) -> Option<String> {
    match self.attributes.get(name)? {
      Value::String(s) => Some(s.clone()),
      Value::Number(n) => Some(n.to_string()),
      _ => None,
    }
  }
}

/// The only network-facing contract this crate depends on.
#[async_trait]
pub trait ResourceApi: Send + Sync {
  /// List records of `kind` matching all of the given filter pairs.
  ///
  /// Filter fields are attribute names (`email`, `project_number`, ...) plus
  /// the pseudo-field `query` for free-text substring search.
  async fn list(&self, kind: ResourceType, filter: &[(&str, &str)]) -> Result<Vec<ApiRecord>>;
}
