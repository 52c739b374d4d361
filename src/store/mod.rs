//! Per-tenant SQLite stores and the registry handing out handles.

pub mod schema;

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// One tenant's persistent store: the generic response cache, the refresh
/// queue and the reference mirror all live in a single SQLite file.
pub struct TenantStore {
  organization_id: String,
  conn: Mutex<Connection>,
}

impl TenantStore {
  /// Open (or create) the store for one organization.
  pub fn open(organization_id: &str, data_dir: Option<&Path>) -> Result<Self> {
    let path = Self::store_path(organization_id, data_dir)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))?;

    let store = Self {
      organization_id: organization_id.to_string(),
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Open an ephemeral in-memory store. Nothing survives the handle.
  pub fn open_in_memory(organization_id: &str) -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;

    let store = Self {
      organization_id: organization_id.to_string(),
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  fn store_path(organization_id: &str, data_dir: Option<&Path>) -> Result<PathBuf> {
    let base = match data_dir {
      Some(dir) => dir.to_path_buf(),
      None => dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
        .ok_or_else(|| eyre!("Could not determine data directory"))?
        .join("rolodex"),
    };

    Ok(base.join(format!("{}.db", organization_id)))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.conn()?;

    conn
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?)",
        params![schema::SCHEMA_VERSION.to_string()],
      )
      .map_err(|e| eyre!("Failed to record schema version: {}", e))?;

    Ok(())
  }

  pub fn organization_id(&self) -> &str {
    &self.organization_id
  }

  pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Explicit registry of tenant stores, constructed by the caller and passed
/// down. Opening the same organization twice returns the same handle.
pub struct StoreRegistry {
  data_dir: Option<PathBuf>,
  stores: Mutex<HashMap<String, Arc<TenantStore>>>,
}

impl StoreRegistry {
  pub fn new(data_dir: Option<PathBuf>) -> Self {
    Self {
      data_dir,
      stores: Mutex::new(HashMap::new()),
    }
  }

  /// Get the store handle for a tenant, opening it on first use.
  pub fn open(&self, organization_id: &str) -> Result<Arc<TenantStore>> {
    let mut stores = self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if let Some(store) = stores.get(organization_id) {
      return Ok(Arc::clone(store));
    }

    let store = Arc::new(TenantStore::open(
      organization_id,
      self.data_dir.as_deref(),
    )?);
    stores.insert(organization_id.to_string(), Arc::clone(&store));

    Ok(store)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_open_is_idempotent_per_tenant() {
    let dir = tempfile::tempdir().unwrap();
    let registry = StoreRegistry::new(Some(dir.path().to_path_buf()));

    let a = registry.open("org-1").unwrap();
    let b = registry.open("org-1").unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let other = registry.open("org-2").unwrap();
    assert!(!Arc::ptr_eq(&a, &other));
  }

  #[test]
  fn test_tenants_get_separate_files() {
    let dir = tempfile::tempdir().unwrap();
    let registry = StoreRegistry::new(Some(dir.path().to_path_buf()));

    registry.open("org-1").unwrap();
    registry.open("org-2").unwrap();

    assert!(dir.path().join("org-1.db").exists());
    assert!(dir.path().join("org-2.db").exists());
  }

  #[test]
  fn test_migrations_record_schema_version() {
    let store = TenantStore::open_in_memory("org-1").unwrap();
    let conn = store.conn().unwrap();
    let version: String = conn
      .query_row(
        "SELECT value FROM meta WHERE key = 'schema_version'",
        [],
        |row| row.get(0),
      )
      .unwrap();
    assert_eq!(version, schema::SCHEMA_VERSION.to_string());
  }
}
