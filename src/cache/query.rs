//! Generic response cache with independent staleness and expiry deadlines,
//! plus the companion refresh queue.
//!
//! Entry lifecycle: fresh (`now < stale_at`), then stale (servable, refresh
//! wanted), then expired (`now >= expires_at`, a miss). Rows disappear via
//! `invalidate` or the periodic `cleanup` pass. Draining the refresh queue is
//! an external consumer's job; this module only enqueues, lists and removes.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use std::sync::Arc;

use crate::store::TenantStore;

use super::like_escape;

/// A servable cache hit and where it came from.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub data: Value,
  /// Past the soft freshness deadline; serve it, but trigger a refresh.
  pub is_stale: bool,
  pub endpoint: String,
  pub params: Option<Value>,
}

/// One pending revalidation, keyed by the cache entry it refreshes.
#[derive(Debug, Clone)]
pub struct RefreshJob {
  pub cache_key: String,
  pub endpoint: String,
  pub params: Option<Value>,
  pub queued_at: DateTime<Utc>,
}

/// Key/value cache over one tenant store.
#[derive(Clone)]
pub struct QueryCache {
  store: Arc<TenantStore>,
  /// Fraction of the TTL after which an entry counts as stale.
  stale_fraction: f64,
}

impl QueryCache {
  pub fn new(store: Arc<TenantStore>) -> Self {
    Self {
      store,
      stale_fraction: 0.5,
    }
  }

  pub fn with_stale_fraction(mut self, fraction: f64) -> Self {
    self.stale_fraction = fraction.clamp(0.0, 1.0);
    self
  }

  /// Get cached data for a key. Fresh and stale entries hit; expired entries
  /// are a miss even though the row may still be on disk until `cleanup`.
  pub fn get(&self, key: &str) -> Result<Option<Value>> {
    Ok(self.get_with_meta(key)?.map(|response| response.data))
  }

  /// Like `get`, but also reports staleness and the request that produced the
  /// entry, so a caller can serve immediately and revalidate asynchronously.
  pub fn get_with_meta(&self, key: &str) -> Result<Option<CachedResponse>> {
    let now = Utc::now().timestamp_millis();
    let conn = self.store.conn()?;

    let row: Option<(Vec<u8>, String, Option<String>, i64, i64)> = conn
      .query_row(
        "SELECT data, endpoint, params, stale_at, expires_at FROM cache WHERE key = ?",
        params![key],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry '{}': {}", key, e))?;

    let (blob, endpoint, params_text, stale_at, expires_at) = match row {
      Some(row) => row,
      None => return Ok(None),
    };

    if now >= expires_at {
      return Ok(None);
    }

    let data: Value = serde_json::from_slice(&blob)
      .map_err(|e| eyre!("Failed to deserialize cache entry '{}': {}", key, e))?;
    let params = parse_params(params_text.as_deref())?;

    Ok(Some(CachedResponse {
      data,
      is_stale: now >= stale_at,
      endpoint,
      params,
    }))
  }

  /// Store a response. The staleness deadline lands at `stale_fraction` of
  /// the TTL, expiry at the full TTL. A successful write satisfies any
  /// pending refresh job for the same key.
  pub fn set(
    &self,
    key: &str,
    data: &Value,
    endpoint: &str,
    request_params: Option<&Value>,
    ttl: Duration,
  ) -> Result<()> {
    self.set_at(key, data, endpoint, request_params, ttl, Utc::now())
  }

  fn set_at(
    &self,
    key: &str,
    data: &Value,
    endpoint: &str,
    request_params: Option<&Value>,
    ttl: Duration,
    now: DateTime<Utc>,
  ) -> Result<()> {
    let created_at = now.timestamp_millis();
    let ttl_ms = ttl.num_milliseconds().max(0);
    let stale_at = created_at + (ttl_ms as f64 * self.stale_fraction).round() as i64;
    let expires_at = created_at + ttl_ms;

    let blob =
      serde_json::to_vec(data).map_err(|e| eyre!("Failed to serialize cache data: {}", e))?;
    let params_text = request_params.map(Value::to_string);

    let conn = self.store.conn()?;

    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache (key, data, endpoint, params, created_at, stale_at, expires_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![key, blob, endpoint, params_text, created_at, stale_at, expires_at],
      )
      .map_err(|e| eyre!("Failed to store cache entry '{}': {}", key, e))?;

    conn
      .execute(
        "DELETE FROM refresh_queue WHERE cache_key = ?",
        params![key],
      )
      .map_err(|e| eyre!("Failed to dequeue refresh for '{}': {}", key, e))?;

    conn
      .execute("COMMIT", [])
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  /// Delete entries whose key contains `pattern` as a substring, or all
  /// entries when no pattern is given. Returns the number deleted.
  pub fn invalidate(&self, pattern: Option<&str>) -> Result<usize> {
    let conn = self.store.conn()?;

    let deleted = match pattern {
      Some(p) => conn
        .execute(
          r"DELETE FROM cache WHERE key LIKE '%' || ? || '%' ESCAPE '\'",
          params![like_escape(p)],
        )
        .map_err(|e| eyre!("Failed to invalidate cache entries '{}': {}", p, e))?,
      None => conn
        .execute("DELETE FROM cache", [])
        .map_err(|e| eyre!("Failed to invalidate cache: {}", e))?,
    };

    tracing::debug!(pattern, deleted, "invalidated cache entries");
    Ok(deleted)
  }

  /// Remove entries past their expiry. Periodic maintenance, not the hot
  /// read path.
  pub fn cleanup(&self) -> Result<usize> {
    let now = Utc::now().timestamp_millis();
    let conn = self.store.conn()?;

    let deleted = conn
      .execute("DELETE FROM cache WHERE expires_at < ?", params![now])
      .map_err(|e| eyre!("Failed to clean up cache: {}", e))?;

    Ok(deleted)
  }

  /// Enqueue a revalidation for a key, replacing any existing job for it.
  pub fn queue_refresh(
    &self,
    key: &str,
    endpoint: &str,
    request_params: Option<&Value>,
  ) -> Result<()> {
    let queued_at = Utc::now().timestamp_millis();
    let params_text = request_params.map(Value::to_string);
    let conn = self.store.conn()?;

    conn
      .execute(
        "INSERT OR REPLACE INTO refresh_queue (cache_key, endpoint, params, queued_at)
         VALUES (?, ?, ?, ?)",
        params![key, endpoint, params_text, queued_at],
      )
      .map_err(|e| eyre!("Failed to queue refresh for '{}': {}", key, e))?;

    Ok(())
  }

  /// Remove a pending job. Returns whether one existed.
  pub fn dequeue_refresh(&self, key: &str) -> Result<bool> {
    let conn = self.store.conn()?;

    let deleted = conn
      .execute(
        "DELETE FROM refresh_queue WHERE cache_key = ?",
        params![key],
      )
      .map_err(|e| eyre!("Failed to dequeue refresh for '{}': {}", key, e))?;

    Ok(deleted > 0)
  }

  /// Pending jobs, oldest first. The fetch-and-store cycle belongs to an
  /// external consumer loop.
  pub fn pending_refresh_jobs(&self) -> Result<Vec<RefreshJob>> {
    let conn = self.store.conn()?;

    let mut stmt = conn
      .prepare(
        "SELECT cache_key, endpoint, params, queued_at FROM refresh_queue
         ORDER BY queued_at, cache_key",
      )
      .map_err(|e| eyre!("Failed to prepare refresh query: {}", e))?;

    let rows: Vec<(String, String, Option<String>, i64)> = stmt
      .query_map([], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .map_err(|e| eyre!("Failed to list refresh jobs: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    let mut jobs = Vec::with_capacity(rows.len());
    for (cache_key, endpoint, params_text, queued_at) in rows {
      jobs.push(RefreshJob {
        cache_key,
        endpoint,
        params: parse_params(params_text.as_deref())?,
        queued_at: millis_to_datetime(queued_at)?,
      });
    }

    Ok(jobs)
  }
}

fn parse_params(text: Option<&str>) -> Result<Option<Value>> {
  match text {
    Some(t) => serde_json::from_str(t)
      .map(Some)
      .map_err(|e| eyre!("Failed to parse cached params: {}", e)),
    None => Ok(None),
  }
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp_millis(ms).ok_or_else(|| eyre!("Timestamp out of range: {}", ms))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn cache() -> QueryCache {
    let store = Arc::new(TenantStore::open_in_memory("test-org").unwrap());
    QueryCache::new(store)
  }

  #[test]
  fn test_round_trip() {
    let cache = cache();
    cache
      .set("k", &json!({"a": 1}), "/x", None, Duration::milliseconds(60_000))
      .unwrap();

    assert_eq!(cache.get("k").unwrap(), Some(json!({"a": 1})));
  }

  #[test]
  fn test_miss_on_unknown_key() {
    let cache = cache();
    assert!(cache.get("nope").unwrap().is_none());
  }

  #[test]
  fn test_expired_entry_is_a_miss() {
    let cache = cache();
    let past = Utc::now() - Duration::milliseconds(120_000);
    cache
      .set_at("k", &json!(1), "/x", None, Duration::milliseconds(60_000), past)
      .unwrap();

    assert!(cache.get("k").unwrap().is_none());
    assert!(cache.get_with_meta("k").unwrap().is_none());
  }

  #[test]
  fn test_stale_entry_still_serves_with_flag() {
    let cache = cache();
    // Half the TTL elapsed: past stale_at (50% of TTL), before expires_at
    let earlier = Utc::now() - Duration::milliseconds(40_000);
    cache
      .set_at("k", &json!([1, 2]), "/x", Some(&json!({"page": 1})), Duration::milliseconds(60_000), earlier)
      .unwrap();

    let meta = cache.get_with_meta("k").unwrap().unwrap();
    assert!(meta.is_stale);
    assert_eq!(meta.data, json!([1, 2]));
    assert_eq!(meta.endpoint, "/x");
    assert_eq!(meta.params, Some(json!({"page": 1})));
  }

  #[test]
  fn test_fresh_entry_is_not_stale() {
    let cache = cache();
    cache
      .set("k", &json!(1), "/x", None, Duration::milliseconds(60_000))
      .unwrap();

    let meta = cache.get_with_meta("k").unwrap().unwrap();
    assert!(!meta.is_stale);
  }

  #[test]
  fn test_invalidate_by_substring() {
    let cache = cache();
    let ttl = Duration::milliseconds(60_000);
    cache.set("projects:list", &json!(1), "/projects", None, ttl).unwrap();
    cache.set("projects:42", &json!(2), "/projects/42", None, ttl).unwrap();
    cache.set("people:list", &json!(3), "/people", None, ttl).unwrap();

    let deleted = cache.invalidate(Some("projects")).unwrap();
    assert_eq!(deleted, 2);
    assert!(cache.get("projects:list").unwrap().is_none());
    assert_eq!(cache.get("people:list").unwrap(), Some(json!(3)));
  }

  #[test]
  fn test_invalidate_all() {
    let cache = cache();
    let ttl = Duration::milliseconds(60_000);
    cache.set("a", &json!(1), "/a", None, ttl).unwrap();
    cache.set("b", &json!(2), "/b", None, ttl).unwrap();

    assert_eq!(cache.invalidate(None).unwrap(), 2);
    assert!(cache.get("a").unwrap().is_none());
  }

  #[test]
  fn test_invalidate_escapes_like_wildcards() {
    let cache = cache();
    let ttl = Duration::milliseconds(60_000);
    cache.set("a:b", &json!(1), "/a", None, ttl).unwrap();
    cache.set("axb", &json!(2), "/a", None, ttl).unwrap();

    // '_' must match literally, not as a single-char wildcard
    assert_eq!(cache.invalidate(Some("a_b")).unwrap(), 0);
    assert_eq!(cache.invalidate(Some("a:b")).unwrap(), 1);
  }

  #[test]
  fn test_cleanup_removes_only_expired() {
    let cache = cache();
    let past = Utc::now() - Duration::milliseconds(120_000);
    cache
      .set_at("old", &json!(1), "/x", None, Duration::milliseconds(60_000), past)
      .unwrap();
    cache
      .set("live", &json!(2), "/x", None, Duration::milliseconds(60_000))
      .unwrap();

    assert_eq!(cache.cleanup().unwrap(), 1);
    assert_eq!(cache.get("live").unwrap(), Some(json!(2)));
  }

  #[test]
  fn test_queue_refresh_replaces_existing_job() {
    let cache = cache();
    cache.queue_refresh("k", "/x", None).unwrap();
    cache.queue_refresh("k", "/y", Some(&json!({"p": 2}))).unwrap();

    let jobs = cache.pending_refresh_jobs().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].endpoint, "/y");
    assert_eq!(jobs[0].params, Some(json!({"p": 2})));
  }

  #[test]
  fn test_set_dequeues_pending_refresh() {
    let cache = cache();
    cache.queue_refresh("k", "/x", None).unwrap();
    cache
      .set("k", &json!(1), "/x", None, Duration::milliseconds(60_000))
      .unwrap();

    assert!(cache.pending_refresh_jobs().unwrap().is_empty());
  }

  #[test]
  fn test_dequeue_refresh_reports_presence() {
    let cache = cache();
    cache.queue_refresh("k", "/x", None).unwrap();

    assert!(cache.dequeue_refresh("k").unwrap());
    assert!(!cache.dequeue_refresh("k").unwrap());
  }

  #[test]
  fn test_pending_jobs_ordered_by_queue_time() {
    let cache = cache();
    let conn_store = cache.store.clone();
    cache.queue_refresh("b", "/b", None).unwrap();
    cache.queue_refresh("a", "/a", None).unwrap();

    // Force distinct queue times so ordering is observable
    conn_store
      .conn()
      .unwrap()
      .execute(
        "UPDATE refresh_queue SET queued_at = queued_at - 1000 WHERE cache_key = 'b'",
        [],
      )
      .unwrap();

    let jobs = cache.pending_refresh_jobs().unwrap();
    let keys: Vec<&str> = jobs.iter().map(|j| j.cache_key.as_str()).collect();
    assert_eq!(keys, vec!["b", "a"]);
  }
}
