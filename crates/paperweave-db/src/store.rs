//! The storage interface every pipeline writes through.
//!
//! Both pipelines only ever talk to a [`GraphStore`]; nothing upstream knows
//! which backend is behind it. Every operation is idempotent so that a
//! reprocessed window (after a crash or a failed run) converges to the same
//! stored state.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paperweave_common::{EdgeKind, Enrichment, Organization, Paper, RunStats, StoredPaper};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Result of a single-entity upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// One paper as of its latest harvested snapshot, with the edge sets that
/// must replace whatever is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperSnapshot {
    pub paper: Paper,
    /// Author names in byline order, already deduplicated.
    pub authors: Vec<String>,
    pub categories: Vec<String>,
}

/// Unit of work committed atomically by the incremental sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncBatch {
    pub upserts: Vec<PaperSnapshot>,
    /// Paper keys carrying a deletion marker.
    pub deletions: Vec<String>,
}

impl SyncBatch {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletions.len()
    }
}

/// External-graph facts about one authorship of a matched work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorEnrichment {
    pub name: String,
    pub openalex_id: Option<String>,
    pub orcid: Option<String>,
    pub institution_ids: Vec<String>,
}

/// A bulk-corpus record whose DOI matched a stored paper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedWork {
    pub doi: String,
    pub enrichment: Enrichment,
    pub authors: Vec<AuthorEnrichment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentBatch {
    pub works: Vec<MatchedWork>,
    pub organizations: Vec<Organization>,
}

impl EnrichmentBatch {
    pub fn is_empty(&self) -> bool {
        self.works.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentOutcome {
    pub papers_enriched: u64,
    pub authors_enriched: u64,
    pub organizations_upserted: u64,
    pub affiliations_created: u64,
}

impl std::ops::AddAssign for EnrichmentOutcome {
    fn add_assign(&mut self, rhs: Self) {
        self.papers_enriched += rhs.papers_enriched;
        self.authors_enriched += rhs.authors_enriched;
        self.organizations_upserted += rhs.organizations_upserted;
        self.affiliations_created += rhs.affiliations_created;
    }
}

/// A paper carrying an external-graph id, with the external ids it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPaperRefs {
    pub arxiv_id: String,
    pub openalex_id: String,
    pub referenced_works: Vec<String>,
}

/// Append-only audit record. The "current" checkpoint of a namespace is its
/// most recently appended record with `success` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub namespace: String,
    pub timestamp: DateTime<Utc>,
    pub stats: RunStats,
    pub success: bool,
    /// File id (bulk namespaces) or last paper key (citations).
    pub marker: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub papers: u64,
    pub matched_papers: u64,
    pub authors: u64,
    pub categories: u64,
    pub organizations: u64,
    pub edges: BTreeMap<EdgeKind, u64>,
    pub checkpoints: u64,
}

/// Node kinds at the two ends of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Paper,
    Author,
    Category,
    Organization,
}

/// `(source, target)` node kinds for an edge kind.
pub fn endpoints(kind: EdgeKind) -> (NodeKind, NodeKind) {
    match kind {
        EdgeKind::Authored => (NodeKind::Author, NodeKind::Paper),
        EdgeKind::ClassifiedAs => (NodeKind::Paper, NodeKind::Category),
        EdgeKind::Cites => (NodeKind::Paper, NodeKind::Paper),
        EdgeKind::AffiliatedWith => (NodeKind::Author, NodeKind::Organization),
    }
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upsert papers, authors and categories, replace each touched paper's
    /// AUTHORED and CLASSIFIED_AS sets and apply deletions, all in one
    /// transaction. Counts reflect what actually changed in the store.
    async fn commit_sync_batch(&self, batch: &SyncBatch) -> Result<RunStats>;

    /// Set every sync-owned field of `paper` unconditionally.
    async fn upsert_paper(&self, paper: &Paper) -> Result<UpsertOutcome>;

    /// Set the `kind` edges hanging off `paper_key` to exactly `others`.
    /// Only valid for kinds with a paper side (AUTHORED, CLASSIFIED_AS).
    async fn replace_edges(&self, paper_key: &str, kind: EdgeKind, others: &[String]) -> Result<()>;

    /// Subset of `dois` present on stored papers.
    async fn existing_dois(&self, dois: &[String]) -> Result<HashSet<String>>;

    async fn apply_enrichments(&self, batch: &EnrichmentBatch) -> Result<EnrichmentOutcome>;

    /// Key-ordered chunk of papers with an external-graph id and a key strictly after `cursor`.
    async fn matched_papers_after(&self, cursor: Option<&str>, limit: usize) -> Result<Vec<MatchedPaperRefs>>;

    /// External-graph id to local paper key, for the ids that resolve.
    async fn resolve_external_ids(&self, ids: &[String]) -> Result<HashMap<String, String>>;

    /// Create edges that do not exist yet. Self-edges and edges whose
    /// endpoints are missing are skipped. Returns the number newly created.
    async fn bulk_create_edges(&self, kind: EdgeKind, pairs: &[(String, String)]) -> Result<u64>;

    async fn append_checkpoint(&self, record: &CheckpointRecord) -> Result<()>;

    async fn latest_checkpoint(&self, namespace: &str) -> Result<Option<CheckpointRecord>>;

    /// Markers of every successful record in `namespace`.
    async fn completed_markers(&self, namespace: &str) -> Result<HashSet<String>>;

    async fn max_paper_update_date(&self) -> Result<Option<DateTime<Utc>>>;

    async fn get_paper(&self, key: &str) -> Result<Option<StoredPaper>>;

    /// Sorted targets of `kind` edges leaving `src`.
    async fn edge_targets(&self, kind: EdgeKind, src: &str) -> Result<Vec<String>>;

    /// Sorted sources of `kind` edges entering `dst`.
    async fn edge_sources(&self, kind: EdgeKind, dst: &str) -> Result<Vec<String>>;

    async fn stats(&self) -> Result<GraphStats>;
}

/// Collapse a list to unique values, first occurrence wins.
pub(crate) fn unique_preserving_order(values: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().filter(|v| seen.insert(v.as_str())).cloned().collect()
}
