//! SQLite schema for one tenant store.

pub const SCHEMA_VERSION: i64 = 1;

pub const SCHEMA: &str = r#"
-- Generic response cache. Timestamps are unix epoch milliseconds,
-- created_at <= stale_at <= expires_at.
CREATE TABLE IF NOT EXISTS cache (
    key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    endpoint TEXT NOT NULL,
    params TEXT,
    created_at INTEGER NOT NULL,
    stale_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache(expires_at);

-- Keys awaiting asynchronous revalidation. At most one job per key;
-- re-enqueueing replaces the existing row.
CREATE TABLE IF NOT EXISTS refresh_queue (
    cache_key TEXT PRIMARY KEY,
    endpoint TEXT NOT NULL,
    params TEXT,
    queued_at INTEGER NOT NULL
);

-- Reference mirror, one table per kind. Searchable columns are denormalized
-- out of the raw payload on upsert.
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT,
    project_number TEXT,
    company_id TEXT,
    data BLOB NOT NULL,
    synced_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_projects_name ON projects(name);
CREATE INDEX IF NOT EXISTS idx_projects_number ON projects(project_number);

CREATE TABLE IF NOT EXISTS people (
    id TEXT PRIMARY KEY,
    name TEXT,
    email TEXT,
    company_id TEXT,
    data BLOB NOT NULL,
    synced_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_people_name ON people(name);
CREATE INDEX IF NOT EXISTS idx_people_email ON people(email);

CREATE TABLE IF NOT EXISTS deals (
    id TEXT PRIMARY KEY,
    name TEXT,
    deal_number TEXT,
    company_id TEXT,
    data BLOB NOT NULL,
    synced_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_deals_name ON deals(name);
CREATE INDEX IF NOT EXISTS idx_deals_number ON deals(deal_number);

CREATE TABLE IF NOT EXISTS services (
    id TEXT PRIMARY KEY,
    name TEXT,
    project_id TEXT,
    deal_id TEXT,
    data BLOB NOT NULL,
    synced_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_services_project ON services(project_id);

CREATE TABLE IF NOT EXISTS companies (
    id TEXT PRIMARY KEY,
    name TEXT,
    data BLOB NOT NULL,
    synced_at INTEGER NOT NULL
);

-- Housekeeping
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
