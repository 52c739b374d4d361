//! Durable mirror of coarse reference entities.
//!
//! One table per kind with denormalized searchable columns, so substring
//! lookups stay local. Records are fully replaced on upsert; partially
//! written rows do not exist.

use chrono::{Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use std::sync::Arc;

use crate::api::{ApiRecord, ResourceType};
use crate::resolver::detect;
use crate::resolver::kinds;
use crate::store::TenantStore;

use super::like_escape;

/// A record ready to be mirrored: the id, the kind's denormalized columns in
/// schema order, and the raw payload.
#[derive(Debug, Clone)]
pub struct ReferenceRecord {
  pub kind: ResourceType,
  pub id: String,
  pub columns: Vec<(&'static str, Option<String>)>,
  pub raw: Value,
}

impl ReferenceRecord {
  /// Denormalize an API record. Unique-field columns are stored in canonical
  /// form (lowercased emails, `PRJ-`/`D-` numbers) so exact lookups are
  /// normalization-insensitive.
  pub fn from_api(kind: ResourceType, record: &ApiRecord) -> Self {
    let spec = kinds::spec(kind);

    let columns = spec
      .columns
      .iter()
      .map(|col| {
        let value = match *col {
          "name" if kind == ResourceType::Person => person_display_name(record),
          "email" => record
            .attr_str(col)
            .map(|v| detect::normalize_unique(kind, &v)),
          "project_number" | "deal_number" => record
            .attr_str(col)
            .map(|v| detect::normalize_unique(kind, &v)),
          other => record.attr_str(other),
        };
        (*col, value)
      })
      .collect();

    Self {
      kind,
      id: record.id.clone(),
      columns,
      raw: serde_json::json!({ "id": record.id, "attributes": record.attributes }),
    }
  }

  pub fn column(&self, name: &str) -> Option<&str> {
    self
      .columns
      .iter()
      .find(|(col, _)| *col == name)
      .and_then(|(_, value)| value.as_deref())
  }

  /// Human-readable label, falling back to the id when the record has none.
  pub fn label(&self) -> String {
    let spec = kinds::spec(self.kind);
    self
      .column(spec.label_column)
      .map(String::from)
      .unwrap_or_else(|| self.id.clone())
  }
}

/// People usually carry first/last name attributes rather than one field.
fn person_display_name(record: &ApiRecord) -> Option<String> {
  if let Some(name) = record.attr_str("name") {
    return Some(name);
  }

  let first = record.attr_str("first_name");
  let last = record.attr_str("last_name");
  match (first, last) {
    (Some(f), Some(l)) => Some(format!("{} {}", f, l)),
    (Some(f), None) => Some(f),
    (None, Some(l)) => Some(l),
    (None, None) => None,
  }
}

/// A mirror row matched by a lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RefHit {
  pub id: String,
  pub label: String,
  pub raw: Value,
}

/// Queryable mirror over one tenant store.
#[derive(Clone)]
pub struct ReferenceCache {
  store: Arc<TenantStore>,
}

impl ReferenceCache {
  pub fn new(store: Arc<TenantStore>) -> Self {
    Self { store }
  }

  /// Insert-or-replace records by id, stamping `synced_at = now`. Idempotent;
  /// a record's row is always rewritten whole.
  pub fn upsert(&self, records: &[ReferenceRecord]) -> Result<()> {
    if records.is_empty() {
      return Ok(());
    }

    let now = Utc::now().timestamp_millis();
    let conn = self.store.conn()?;

    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for record in records {
      let spec = kinds::spec(record.kind);

      let column_names = spec.columns.join(", ");
      let placeholders = vec!["?"; spec.columns.len() + 3].join(", ");
      let sql = format!(
        "INSERT OR REPLACE INTO {} (id, {}, data, synced_at) VALUES ({})",
        spec.table, column_names, placeholders
      );

      let blob = serde_json::to_vec(&record.raw)
        .map_err(|e| eyre!("Failed to serialize reference record: {}", e))?;

      let mut values: Vec<SqlValue> = Vec::with_capacity(spec.columns.len() + 3);
      values.push(SqlValue::Text(record.id.clone()));
      for col in spec.columns {
        values.push(match record.column(col) {
          Some(v) => SqlValue::Text(v.to_string()),
          None => SqlValue::Null,
        });
      }
      values.push(SqlValue::Blob(blob));
      values.push(SqlValue::Integer(now));

      conn
        .execute(&sql, rusqlite::params_from_iter(values))
        .map_err(|e| eyre!("Failed to upsert {} '{}': {}", record.kind, record.id, e))?;
    }

    conn
      .execute("COMMIT", [])
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  /// Case-insensitive substring search over the kind's searchable columns.
  /// Prefix matches on the label sort first, then lexical order by label and
  /// id, so results are deterministic for a fixed dataset.
  ///
  /// `scope` restricts results by the kind's scope column and is ignored for
  /// unscoped kinds.
  pub fn search(
    &self,
    kind: ResourceType,
    term: &str,
    scope: Option<&str>,
    limit: usize,
  ) -> Result<Vec<RefHit>> {
    let spec = kinds::spec(kind);
    let scope = scope.filter(|_| spec.scope_column.is_some());

    let clauses: Vec<String> = spec
      .search_columns
      .iter()
      .map(|col| format!(r"lower({}) LIKE '%' || lower(?1) || '%' ESCAPE '\'", col))
      .collect();
    let scope_clause = match (scope, spec.scope_column) {
      (Some(_), Some(col)) => format!("AND {} = ?2", col),
      _ => String::new(),
    };

    let sql = format!(
      r"SELECT id, {label}, data FROM {table}
        WHERE ({clauses}) {scope_clause}
        ORDER BY CASE WHEN lower({label}) LIKE lower(?1) || '%' ESCAPE '\' THEN 0 ELSE 1 END,
                 lower({label}), id
        LIMIT {limit}",
      label = spec.label_column,
      table = spec.table,
      clauses = clauses.join(" OR "),
    );

    let mut params: Vec<String> = vec![like_escape(term.trim())];
    if let Some(value) = scope {
      params.push(value.to_string());
    }

    self.query_hits(&sql, params)
  }

  /// Exact lookup on the kind's uniquely-keyed column. The value is
  /// normalized the same way stored columns are, so `DEAL-456` finds a deal
  /// mirrored as `D-456`. Kinds without a unique column match nothing.
  pub fn find_by_unique(&self, kind: ResourceType, value: &str) -> Result<Vec<RefHit>> {
    let spec = kinds::spec(kind);
    let unique = match spec.unique_column {
      Some(col) => col,
      None => return Ok(Vec::new()),
    };

    let needle = detect::normalize_unique(kind, value);
    let sql = format!(
      "SELECT id, {label}, data FROM {table} WHERE lower({unique}) = lower(?1) ORDER BY id",
      label = spec.label_column,
      table = spec.table,
    );

    self.query_hits(&sql, vec![needle])
  }

  fn query_hits(&self, sql: &str, params: Vec<String>) -> Result<Vec<RefHit>> {
    let conn = self.store.conn()?;

    let mut stmt = conn
      .prepare(sql)
      .map_err(|e| eyre!("Failed to prepare reference query: {}", e))?;

    let rows: Vec<(String, Option<String>, Vec<u8>)> = stmt
      .query_map(rusqlite::params_from_iter(params), |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
      })
      .map_err(|e| eyre!("Failed to run reference query: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    let mut hits = Vec::with_capacity(rows.len());
    for (id, label, blob) in rows {
      let raw: Value = serde_json::from_slice(&blob)
        .map_err(|e| eyre!("Failed to deserialize reference record '{}': {}", id, e))?;
      hits.push(RefHit {
        label: label.unwrap_or_else(|| id.clone()),
        id,
        raw,
      });
    }

    Ok(hits)
  }

  /// Whether the kind's mirror was synced recently enough to be trusted
  /// without a bulk resync. An empty mirror is never valid.
  pub fn is_cache_valid(&self, kind: ResourceType, max_age: Duration) -> Result<bool> {
    let spec = kinds::spec(kind);
    let conn = self.store.conn()?;

    let freshest: Option<i64> = conn
      .query_row(
        &format!("SELECT MAX(synced_at) FROM {}", spec.table),
        [],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to read sync age for {}: {}", spec.table, e))?;

    let freshest = match freshest {
      Some(ms) => ms,
      None => return Ok(false),
    };

    Ok(Utc::now().timestamp_millis() - freshest <= max_age.num_milliseconds())
  }

  /// Atomically wipe all reference tables and the query-cache tables.
  /// Reserved for explicit "reset local cache" operations.
  pub fn clear(&self) -> Result<()> {
    let conn = self.store.conn()?;

    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for table in ["cache", "refresh_queue"] {
      conn
        .execute(&format!("DELETE FROM {}", table), [])
        .map_err(|e| eyre!("Failed to clear {}: {}", table, e))?;
    }
    for kind in [
      ResourceType::Person,
      ResourceType::Project,
      ResourceType::Deal,
      ResourceType::Service,
      ResourceType::Company,
    ] {
      let table = kinds::spec(kind).table;
      conn
        .execute(&format!("DELETE FROM {}", table), [])
        .map_err(|e| eyre!("Failed to clear {}: {}", table, e))?;
    }

    conn
      .execute("COMMIT", [])
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }
}
