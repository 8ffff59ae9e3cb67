//! Table layout for the libSQL graph store.
//!
//! Timestamps are stored as RFC 3339 text with microseconds and a `Z` suffix
//! so lexical order equals chronological order.

pub const TABLE_PAPERS: &str = "papers";
pub const TABLE_AUTHORS: &str = "authors";
pub const TABLE_CATEGORIES: &str = "categories";
pub const TABLE_ORGANIZATIONS: &str = "organizations";
pub const TABLE_EDGES: &str = "edges";
pub const TABLE_CHECKPOINTS: &str = "checkpoints";

/// Idempotent DDL, executed on every open.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS papers (
    arxiv_id         TEXT PRIMARY KEY,
    title            TEXT NOT NULL,
    abstract         TEXT NOT NULL DEFAULT '',
    submitter        TEXT,
    journal_ref      TEXT,
    doi              TEXT,
    license          TEXT,
    update_date      TEXT,
    last_modified    TEXT NOT NULL,
    openalex_id      TEXT,
    cited_by_count   INTEGER,
    topics           TEXT,
    referenced_works TEXT
);
CREATE INDEX IF NOT EXISTS idx_papers_doi ON papers(doi);
CREATE INDEX IF NOT EXISTS idx_papers_openalex ON papers(openalex_id);

CREATE TABLE IF NOT EXISTS authors (
    name        TEXT PRIMARY KEY,
    openalex_id TEXT,
    orcid       TEXT
);

CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS organizations (
    openalex_id  TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    country_code TEXT,
    org_type     TEXT,
    ror          TEXT,
    lineage      TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS edges (
    kind TEXT NOT NULL,
    src  TEXT NOT NULL,
    dst  TEXT NOT NULL,
    PRIMARY KEY (kind, src, dst)
);
CREATE INDEX IF NOT EXISTS idx_edges_dst ON edges(kind, dst);

CREATE TABLE IF NOT EXISTS checkpoints (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace   TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    created     INTEGER NOT NULL DEFAULT 0,
    updated     INTEGER NOT NULL DEFAULT 0,
    deleted     INTEGER NOT NULL DEFAULT 0,
    errors      INTEGER NOT NULL DEFAULT 0,
    success     INTEGER NOT NULL,
    marker      TEXT,
    recorded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_checkpoints_ns ON checkpoints(namespace, success, id);
"#;
