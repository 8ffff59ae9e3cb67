//! Durable [`GraphStore`] on libSQL (a local SQLite file or a remote libSQL server).
//!
//! One connection is held behind an async mutex, so writes are serialised and
//! every multi-statement operation runs inside its own transaction.

use crate::error::{DbError, Result};
use crate::schema::{self, SCHEMA};
use crate::store::{
    endpoints, unique_preserving_order, CheckpointRecord, EnrichmentBatch, EnrichmentOutcome,
    GraphStats, GraphStore, MatchedPaperRefs, NodeKind, SyncBatch, UpsertOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Builder, Connection, Value};
use paperweave_common::clock::{Clock, SystemClock};
use paperweave_common::entities::PaperSide;
use paperweave_common::{EdgeKind, Enrichment, Paper, RunStats, StoredPaper};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Upper bound on bound parameters per `IN (...)` query.
const IN_CHUNK: usize = 400;

pub struct LibsqlGraphStore {
    _db: libsql::Database,
    conn: Mutex<Connection>,
    location: String,
    clock: Arc<dyn Clock>,
}

impl LibsqlGraphStore {
    /// Open or create a database file at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open_local(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let location = path.to_string_lossy().to_string();
        let db = Builder::new_local(location.clone()).build().await?;
        let conn = db.connect()?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;").await?;
        Self::init(db, conn, location).await
    }

    /// Connect to a remote libSQL server (`libsql://...`).
    #[instrument(skip(auth_token))]
    pub async fn open_remote(url: &str, auth_token: &str) -> Result<Self> {
        let db = Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await?;
        let conn = db.connect()?;
        Self::init(db, conn, url.to_string()).await
    }

    /// Private in-memory database; gone when dropped.
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let conn = db.connect()?;
        Self::init(db, conn, ":memory:".to_string()).await
    }

    async fn init(db: libsql::Database, conn: Connection, location: String) -> Result<Self> {
        conn.execute_batch(SCHEMA).await?;
        info!(location = %location, "Graph store ready");
        Ok(Self { _db: db, conn: Mutex::new(conn), location, clock: Arc::new(SystemClock) })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Stamp `last_modified` from `clock` instead of the system time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

// ---------------------------------------------------------------------------
// Value conversion
// ---------------------------------------------------------------------------

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str, table: &'static str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::corrupt(table, format!("bad timestamp {raw:?}: {e}")))
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn opt_text(s: Option<&str>) -> Value {
    s.map(text).unwrap_or(Value::Null)
}

fn int(n: u64) -> Value {
    Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

fn col_text(row: &libsql::Row, idx: i32, table: &'static str) -> Result<String> {
    match row.get_value(idx)? {
        Value::Text(s) => Ok(s),
        other => Err(DbError::corrupt(table, format!("column {idx}: expected text, got {other:?}"))),
    }
}

fn col_opt_text(row: &libsql::Row, idx: i32, table: &'static str) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        other => Err(DbError::corrupt(table, format!("column {idx}: expected text, got {other:?}"))),
    }
}

fn col_int(row: &libsql::Row, idx: i32, table: &'static str) -> Result<i64> {
    match row.get_value(idx)? {
        Value::Integer(n) => Ok(n),
        Value::Null => Ok(0),
        other => Err(DbError::corrupt(table, format!("column {idx}: expected integer, got {other:?}"))),
    }
}

fn col_count(row: &libsql::Row, idx: i32, table: &'static str) -> Result<u64> {
    Ok(u64::try_from(col_int(row, idx, table)?).unwrap_or(0))
}

fn col_json_list(row: &libsql::Row, idx: i32, table: &'static str) -> Result<Vec<String>> {
    match col_opt_text(row, idx, table)? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(Vec::new()),
    }
}

fn node_table(kind: NodeKind) -> (&'static str, &'static str) {
    match kind {
        NodeKind::Paper => (schema::TABLE_PAPERS, "arxiv_id"),
        NodeKind::Author => (schema::TABLE_AUTHORS, "name"),
        NodeKind::Category => (schema::TABLE_CATEGORIES, "id"),
        NodeKind::Organization => (schema::TABLE_ORGANIZATIONS, "openalex_id"),
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ---------------------------------------------------------------------------
// Statements shared by the trait methods; all take a connection so they can
// run inside a caller's transaction.
// ---------------------------------------------------------------------------

async fn paper_exists(conn: &Connection, key: &str) -> Result<bool> {
    let mut rows = conn
        .query("SELECT 1 FROM papers WHERE arxiv_id = ?", libsql::params_from_iter(vec![text(key)]))
        .await?;
    Ok(rows.next().await?.is_some())
}

async fn write_paper(conn: &Connection, paper: &Paper, now: &str) -> Result<UpsertOutcome> {
    let existed = paper_exists(conn, &paper.arxiv_id).await?;
    let params = vec![
        text(&paper.arxiv_id),
        text(&paper.title),
        text(&paper.abstract_text),
        opt_text(paper.submitter.as_deref()),
        opt_text(paper.journal_ref.as_deref()),
        opt_text(paper.doi.as_deref()),
        opt_text(paper.license.as_deref()),
        paper.update_date.as_ref().map(|d| Value::Text(format_ts(d))).unwrap_or(Value::Null),
        text(now),
    ];
    conn.execute(
        r#"
        INSERT INTO papers (arxiv_id, title, abstract, submitter, journal_ref, doi, license, update_date, last_modified)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (arxiv_id) DO UPDATE
          SET title = excluded.title,
              abstract = excluded.abstract,
              submitter = excluded.submitter,
              journal_ref = excluded.journal_ref,
              doi = excluded.doi,
              license = excluded.license,
              update_date = excluded.update_date,
              last_modified = excluded.last_modified
        "#,
        libsql::params_from_iter(params),
    )
    .await?;
    Ok(if existed { UpsertOutcome::Updated } else { UpsertOutcome::Created })
}

async fn ensure_node(conn: &Connection, kind: NodeKind, key: &str) -> Result<()> {
    let sql = match kind {
        NodeKind::Author => "INSERT OR IGNORE INTO authors (name) VALUES (?)",
        NodeKind::Category => "INSERT OR IGNORE INTO categories (id) VALUES (?)",
        NodeKind::Paper | NodeKind::Organization => {
            return Err(DbError::UnsupportedEdge(format!("{kind:?} nodes are not created implicitly")))
        }
    };
    conn.execute(sql, libsql::params_from_iter(vec![text(key)])).await?;
    Ok(())
}

async fn write_edge_set(conn: &Connection, paper_key: &str, kind: EdgeKind, others: &[String]) -> Result<()> {
    let side = kind
        .paper_side()
        .ok_or_else(|| DbError::UnsupportedEdge(format!("{kind} is not replaced per paper")))?;
    let (src_kind, dst_kind) = endpoints(kind);
    let other_kind = match side {
        PaperSide::Source => dst_kind,
        PaperSide::Target => src_kind,
    };

    let clear = match side {
        PaperSide::Source => "DELETE FROM edges WHERE kind = ? AND src = ?",
        PaperSide::Target => "DELETE FROM edges WHERE kind = ? AND dst = ?",
    };
    conn.execute(clear, libsql::params_from_iter(vec![text(kind.as_str()), text(paper_key)]))
        .await?;

    for other in unique_preserving_order(others) {
        ensure_node(conn, other_kind, &other).await?;
        let (src, dst) = match side {
            PaperSide::Source => (paper_key.to_string(), other),
            PaperSide::Target => (other, paper_key.to_string()),
        };
        conn.execute(
            "INSERT OR IGNORE INTO edges (kind, src, dst) VALUES (?, ?, ?)",
            libsql::params_from_iter(vec![text(kind.as_str()), Value::Text(src), Value::Text(dst)]),
        )
        .await?;
    }
    Ok(())
}

/// Remove a paper and every edge incident to it. Returns whether it existed.
async fn detach_delete_paper(conn: &Connection, key: &str) -> Result<bool> {
    conn.execute(
        r#"
        DELETE FROM edges
        WHERE (kind IN ('CLASSIFIED_AS', 'CITES') AND src = ?1)
           OR (kind IN ('AUTHORED', 'CITES') AND dst = ?1)
        "#,
        libsql::params_from_iter(vec![text(key)]),
    )
    .await?;
    let removed = conn
        .execute("DELETE FROM papers WHERE arxiv_id = ?", libsql::params_from_iter(vec![text(key)]))
        .await?;
    Ok(removed > 0)
}

async fn commit_batch_in(conn: &Connection, batch: &SyncBatch, now: &str) -> Result<RunStats> {
    let mut stats = RunStats::default();
    for snapshot in &batch.upserts {
        match write_paper(conn, &snapshot.paper, now).await? {
            UpsertOutcome::Created => stats.created += 1,
            UpsertOutcome::Updated => stats.updated += 1,
        }
        write_edge_set(conn, &snapshot.paper.arxiv_id, EdgeKind::Authored, &snapshot.authors).await?;
        write_edge_set(conn, &snapshot.paper.arxiv_id, EdgeKind::ClassifiedAs, &snapshot.categories).await?;
    }
    for key in &batch.deletions {
        if detach_delete_paper(conn, key).await? {
            stats.deleted += 1;
        }
    }
    Ok(stats)
}

async fn enrich_in(conn: &Connection, batch: &EnrichmentBatch, now: &str) -> Result<EnrichmentOutcome> {
    let mut outcome = EnrichmentOutcome::default();

    for org in &batch.organizations {
        let params = vec![
            text(&org.openalex_id),
            text(&org.name),
            opt_text(org.country_code.as_deref()),
            opt_text(org.org_type.as_deref()),
            opt_text(org.ror.as_deref()),
            Value::Text(serde_json::to_string(&org.lineage_ids)?),
        ];
        conn.execute(
            r#"
            INSERT INTO organizations (openalex_id, name, country_code, org_type, ror, lineage)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (openalex_id) DO UPDATE
              SET name = excluded.name,
                  country_code = excluded.country_code,
                  org_type = excluded.org_type,
                  ror = excluded.ror,
                  lineage = excluded.lineage
            "#,
            libsql::params_from_iter(params),
        )
        .await?;
        outcome.organizations_upserted += 1;
    }

    for work in &batch.works {
        let e = &work.enrichment;
        let enriched = conn
            .execute(
                r#"
                UPDATE papers
                SET openalex_id = ?, cited_by_count = ?, topics = ?, referenced_works = ?, last_modified = ?
                WHERE doi = ?
                "#,
                libsql::params_from_iter(vec![
                    text(&e.openalex_id),
                    Value::Integer(e.cited_by_count),
                    Value::Text(serde_json::to_string(&e.topics)?),
                    Value::Text(serde_json::to_string(&e.referenced_works)?),
                    text(now),
                    text(&work.doi),
                ]),
            )
            .await?;
        if enriched == 0 {
            continue;
        }
        outcome.papers_enriched += enriched;

        for author in &work.authors {
            let touched = conn
                .execute(
                    r#"
                    UPDATE authors
                    SET openalex_id = COALESCE(?, openalex_id), orcid = COALESCE(?, orcid)
                    WHERE name = ?
                    "#,
                    libsql::params_from_iter(vec![
                        opt_text(author.openalex_id.as_deref()),
                        opt_text(author.orcid.as_deref()),
                        text(&author.name),
                    ]),
                )
                .await?;
            if touched == 0 {
                continue;
            }
            outcome.authors_enriched += 1;
            for institution in &author.institution_ids {
                outcome.affiliations_created += conn
                    .execute(
                        r#"
                        INSERT OR IGNORE INTO edges (kind, src, dst)
                        SELECT 'AFFILIATED_WITH', ?1, ?2
                        WHERE EXISTS (SELECT 1 FROM organizations WHERE openalex_id = ?2)
                        "#,
                        libsql::params_from_iter(vec![text(&author.name), text(institution)]),
                    )
                    .await?;
            }
        }
    }
    Ok(outcome)
}

async fn create_edges_in(conn: &Connection, kind: EdgeKind, pairs: &[(String, String)]) -> Result<u64> {
    let (src_kind, dst_kind) = endpoints(kind);
    let (src_table, src_col) = node_table(src_kind);
    let (dst_table, dst_col) = node_table(dst_kind);
    let sql = format!(
        "INSERT OR IGNORE INTO edges (kind, src, dst) \
         SELECT ?1, ?2, ?3 \
         WHERE EXISTS (SELECT 1 FROM {src_table} WHERE {src_col} = ?2) \
           AND EXISTS (SELECT 1 FROM {dst_table} WHERE {dst_col} = ?3)"
    );
    let mut created = 0;
    for (src, dst) in pairs {
        if src == dst {
            continue;
        }
        created += conn
            .execute(&sql, libsql::params_from_iter(vec![text(kind.as_str()), text(src), text(dst)]))
            .await?;
    }
    Ok(created)
}

fn checkpoint_from_row(row: &libsql::Row) -> Result<CheckpointRecord> {
    const T: &str = schema::TABLE_CHECKPOINTS;
    Ok(CheckpointRecord {
        namespace: col_text(row, 0, T)?,
        timestamp: parse_ts(&col_text(row, 1, T)?, T)?,
        stats: RunStats {
            created: col_count(row, 2, T)?,
            updated: col_count(row, 3, T)?,
            deleted: col_count(row, 4, T)?,
            errors: col_count(row, 5, T)?,
        },
        success: col_int(row, 6, T)? != 0,
        marker: col_opt_text(row, 7, T)?,
        recorded_at: parse_ts(&col_text(row, 8, T)?, T)?,
    })
}

fn paper_from_row(row: &libsql::Row) -> Result<StoredPaper> {
    const T: &str = schema::TABLE_PAPERS;
    let update_date = col_opt_text(row, 7, T)?.map(|s| parse_ts(&s, T)).transpose()?;
    let enrichment = match col_opt_text(row, 9, T)? {
        Some(openalex_id) => Some(Enrichment {
            openalex_id,
            cited_by_count: col_int(row, 10, T)?,
            topics: col_json_list(row, 11, T)?,
            referenced_works: col_json_list(row, 12, T)?,
        }),
        None => None,
    };
    Ok(StoredPaper {
        paper: Paper {
            arxiv_id: col_text(row, 0, T)?,
            title: col_text(row, 1, T)?,
            abstract_text: col_text(row, 2, T)?,
            submitter: col_opt_text(row, 3, T)?,
            journal_ref: col_opt_text(row, 4, T)?,
            doi: col_opt_text(row, 5, T)?,
            license: col_opt_text(row, 6, T)?,
            update_date,
        },
        enrichment,
        last_modified: parse_ts(&col_text(row, 8, T)?, T)?,
    })
}

async fn count(conn: &Connection, sql: &str) -> Result<u64> {
    let mut rows = conn.query(sql, ()).await?;
    match rows.next().await? {
        Some(row) => col_count(&row, 0, "stats"),
        None => Ok(0),
    }
}

#[async_trait]
impl GraphStore for LibsqlGraphStore {
    #[instrument(skip_all, fields(upserts = batch.upserts.len(), deletions = batch.deletions.len()))]
    async fn commit_sync_batch(&self, batch: &SyncBatch) -> Result<RunStats> {
        let now = format_ts(&self.clock.now());
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await?;
        match commit_batch_in(&tx, batch, &now).await {
            Ok(stats) => {
                tx.commit().await?;
                debug!(created = stats.created, updated = stats.updated, deleted = stats.deleted, "Sync batch committed");
                Ok(stats)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn upsert_paper(&self, paper: &Paper) -> Result<UpsertOutcome> {
        let now = format_ts(&self.clock.now());
        let conn = self.conn.lock().await;
        write_paper(&conn, paper, &now).await
    }

    #[instrument(skip(self, others), fields(n = others.len()))]
    async fn replace_edges(&self, paper_key: &str, kind: EdgeKind, others: &[String]) -> Result<()> {
        let conn = self.conn.lock().await;
        if !paper_exists(&conn, paper_key).await? {
            return Err(DbError::InvalidQuery(format!("unknown paper {paper_key}")));
        }
        let tx = conn.transaction().await?;
        match write_edge_set(&tx, paper_key, kind, others).await {
            Ok(()) => Ok(tx.commit().await?),
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn existing_dois(&self, dois: &[String]) -> Result<HashSet<String>> {
        let wanted = unique_preserving_order(dois);
        let conn = self.conn.lock().await;
        let mut found = HashSet::new();
        for chunk in wanted.chunks(IN_CHUNK) {
            let sql = format!("SELECT DISTINCT doi FROM papers WHERE doi IN ({})", placeholders(chunk.len()));
            let params: Vec<Value> = chunk.iter().map(|d| text(d)).collect();
            let mut rows = conn.query(&sql, libsql::params_from_iter(params)).await?;
            while let Some(row) = rows.next().await? {
                found.insert(col_text(&row, 0, schema::TABLE_PAPERS)?);
            }
        }
        Ok(found)
    }

    #[instrument(skip_all, fields(works = batch.works.len(), organizations = batch.organizations.len()))]
    async fn apply_enrichments(&self, batch: &EnrichmentBatch) -> Result<EnrichmentOutcome> {
        let now = format_ts(&self.clock.now());
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await?;
        match enrich_in(&tx, batch, &now).await {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn matched_papers_after(&self, cursor: Option<&str>, limit: usize) -> Result<Vec<MatchedPaperRefs>> {
        const T: &str = schema::TABLE_PAPERS;
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                r#"
                SELECT arxiv_id, openalex_id, referenced_works FROM papers
                WHERE openalex_id IS NOT NULL AND arxiv_id > ?
                ORDER BY arxiv_id
                LIMIT ?
                "#,
                libsql::params_from_iter(vec![text(cursor.unwrap_or("")), int(limit as u64)]),
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(MatchedPaperRefs {
                arxiv_id: col_text(&row, 0, T)?,
                openalex_id: col_text(&row, 1, T)?,
                referenced_works: col_json_list(&row, 2, T)?,
            });
        }
        Ok(out)
    }

    async fn resolve_external_ids(&self, ids: &[String]) -> Result<HashMap<String, String>> {
        let wanted = unique_preserving_order(ids);
        let conn = self.conn.lock().await;
        let mut resolved = HashMap::new();
        for chunk in wanted.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT openalex_id, arxiv_id FROM papers WHERE openalex_id IN ({}) ORDER BY arxiv_id",
                placeholders(chunk.len())
            );
            let params: Vec<Value> = chunk.iter().map(|d| text(d)).collect();
            let mut rows = conn.query(&sql, libsql::params_from_iter(params)).await?;
            while let Some(row) = rows.next().await? {
                let external = col_text(&row, 0, schema::TABLE_PAPERS)?;
                let key = col_text(&row, 1, schema::TABLE_PAPERS)?;
                resolved.entry(external).or_insert(key);
            }
        }
        Ok(resolved)
    }

    #[instrument(skip(self, pairs), fields(pairs = pairs.len()))]
    async fn bulk_create_edges(&self, kind: EdgeKind, pairs: &[(String, String)]) -> Result<u64> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await?;
        match create_edges_in(&tx, kind, pairs).await {
            Ok(created) => {
                tx.commit().await?;
                Ok(created)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    #[instrument(skip_all, fields(namespace = %record.namespace, success = record.success))]
    async fn append_checkpoint(&self, record: &CheckpointRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO checkpoints (namespace, timestamp, created, updated, deleted, errors, success, marker, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            libsql::params_from_iter(vec![
                text(&record.namespace),
                Value::Text(format_ts(&record.timestamp)),
                int(record.stats.created),
                int(record.stats.updated),
                int(record.stats.deleted),
                int(record.stats.errors),
                Value::Integer(i64::from(record.success)),
                opt_text(record.marker.as_deref()),
                Value::Text(format_ts(&record.recorded_at)),
            ]),
        )
        .await?;
        Ok(())
    }

    async fn latest_checkpoint(&self, namespace: &str) -> Result<Option<CheckpointRecord>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                r#"
                SELECT namespace, timestamp, created, updated, deleted, errors, success, marker, recorded_at
                FROM checkpoints
                WHERE namespace = ? AND success = 1
                ORDER BY id DESC
                LIMIT 1
                "#,
                libsql::params_from_iter(vec![text(namespace)]),
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(checkpoint_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn completed_markers(&self, namespace: &str) -> Result<HashSet<String>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT DISTINCT marker FROM checkpoints WHERE namespace = ? AND success = 1 AND marker IS NOT NULL",
                libsql::params_from_iter(vec![text(namespace)]),
            )
            .await?;
        let mut markers = HashSet::new();
        while let Some(row) = rows.next().await? {
            markers.insert(col_text(&row, 0, schema::TABLE_CHECKPOINTS)?);
        }
        Ok(markers)
    }

    async fn max_paper_update_date(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().await;
        let mut rows = conn.query("SELECT MAX(update_date) FROM papers", ()).await?;
        match rows.next().await? {
            Some(row) => col_opt_text(&row, 0, schema::TABLE_PAPERS)?
                .map(|s| parse_ts(&s, schema::TABLE_PAPERS))
                .transpose(),
            None => Ok(None),
        }
    }

    async fn get_paper(&self, key: &str) -> Result<Option<StoredPaper>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                r#"
                SELECT arxiv_id, title, abstract, submitter, journal_ref, doi, license, update_date,
                       last_modified, openalex_id, cited_by_count, topics, referenced_works
                FROM papers WHERE arxiv_id = ?
                "#,
                libsql::params_from_iter(vec![text(key)]),
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(paper_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn edge_targets(&self, kind: EdgeKind, src: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT dst FROM edges WHERE kind = ? AND src = ? ORDER BY dst",
                libsql::params_from_iter(vec![text(kind.as_str()), text(src)]),
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(col_text(&row, 0, schema::TABLE_EDGES)?);
        }
        Ok(out)
    }

    async fn edge_sources(&self, kind: EdgeKind, dst: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT src FROM edges WHERE kind = ? AND dst = ? ORDER BY src",
                libsql::params_from_iter(vec![text(kind.as_str()), text(dst)]),
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(col_text(&row, 0, schema::TABLE_EDGES)?);
        }
        Ok(out)
    }

    async fn stats(&self) -> Result<GraphStats> {
        let conn = self.conn.lock().await;
        let mut stats = GraphStats {
            papers: count(&conn, "SELECT COUNT(*) FROM papers").await?,
            matched_papers: count(&conn, "SELECT COUNT(*) FROM papers WHERE openalex_id IS NOT NULL").await?,
            authors: count(&conn, "SELECT COUNT(*) FROM authors").await?,
            categories: count(&conn, "SELECT COUNT(*) FROM categories").await?,
            organizations: count(&conn, "SELECT COUNT(*) FROM organizations").await?,
            checkpoints: count(&conn, "SELECT COUNT(*) FROM checkpoints").await?,
            ..Default::default()
        };
        let mut rows = conn.query("SELECT kind, COUNT(*) FROM edges GROUP BY kind", ()).await?;
        while let Some(row) = rows.next().await? {
            let raw = col_text(&row, 0, schema::TABLE_EDGES)?;
            let kind: EdgeKind = raw
                .parse()
                .map_err(|e: String| DbError::corrupt(schema::TABLE_EDGES, e))?;
            stats.edges.insert(kind, col_count(&row, 1, schema::TABLE_EDGES)?);
        }
        Ok(stats)
    }
}
