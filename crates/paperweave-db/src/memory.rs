//! In-process [`GraphStore`] used by tests and dry runs.
//!
//! A single `RwLock` guards the whole graph, so every operation is atomic
//! with respect to every other one, matching the transactional backend.

use crate::error::{DbError, Result};
use crate::store::{
    endpoints, unique_preserving_order, CheckpointRecord, EnrichmentBatch, EnrichmentOutcome,
    GraphStats, GraphStore, MatchedPaperRefs, NodeKind, SyncBatch, UpsertOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paperweave_common::clock::{Clock, SystemClock};
use paperweave_common::entities::PaperSide;
use paperweave_common::{Author, EdgeKind, Organization, Paper, RunStats, StoredPaper};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Graph {
    papers: BTreeMap<String, StoredPaper>,
    authors: BTreeMap<String, Author>,
    categories: BTreeSet<String>,
    organizations: BTreeMap<String, Organization>,
    edges: BTreeSet<(EdgeKind, String, String)>,
    checkpoints: Vec<CheckpointRecord>,
}

impl Graph {
    fn has_node(&self, kind: NodeKind, key: &str) -> bool {
        match kind {
            NodeKind::Paper => self.papers.contains_key(key),
            NodeKind::Author => self.authors.contains_key(key),
            NodeKind::Category => self.categories.contains(key),
            NodeKind::Organization => self.organizations.contains_key(key),
        }
    }

    fn ensure_node(&mut self, kind: NodeKind, key: &str) -> Result<()> {
        match kind {
            NodeKind::Author => {
                self.authors.entry(key.to_string()).or_insert_with(|| Author::named(key));
            }
            NodeKind::Category => {
                self.categories.insert(key.to_string());
            }
            NodeKind::Paper | NodeKind::Organization => {
                return Err(DbError::UnsupportedEdge(format!("{kind:?} nodes are not created implicitly")))
            }
        }
        Ok(())
    }

    fn write_paper(&mut self, paper: &Paper, now: DateTime<Utc>) -> UpsertOutcome {
        match self.papers.get_mut(&paper.arxiv_id) {
            Some(stored) => {
                stored.paper = paper.clone();
                stored.last_modified = now;
                UpsertOutcome::Updated
            }
            None => {
                self.papers.insert(
                    paper.arxiv_id.clone(),
                    StoredPaper { paper: paper.clone(), enrichment: None, last_modified: now },
                );
                UpsertOutcome::Created
            }
        }
    }

    fn write_edge_set(&mut self, paper_key: &str, kind: EdgeKind, others: &[String]) -> Result<()> {
        let side = kind
            .paper_side()
            .ok_or_else(|| DbError::UnsupportedEdge(format!("{kind} is not replaced per paper")))?;
        let (src_kind, dst_kind) = endpoints(kind);
        let other_kind = match side {
            PaperSide::Source => dst_kind,
            PaperSide::Target => src_kind,
        };

        self.edges.retain(|(k, src, dst)| {
            *k != kind
                || match side {
                    PaperSide::Source => src != paper_key,
                    PaperSide::Target => dst != paper_key,
                }
        });
        for other in unique_preserving_order(others) {
            self.ensure_node(other_kind, &other)?;
            let edge = match side {
                PaperSide::Source => (kind, paper_key.to_string(), other),
                PaperSide::Target => (kind, other, paper_key.to_string()),
            };
            self.edges.insert(edge);
        }
        Ok(())
    }

    fn detach_delete_paper(&mut self, key: &str) -> bool {
        self.edges.retain(|(kind, src, dst)| {
            let (src_kind, dst_kind) = endpoints(*kind);
            !((src_kind == NodeKind::Paper && src == key) || (dst_kind == NodeKind::Paper && dst == key))
        });
        self.papers.remove(key).is_some()
    }
}

pub struct MemoryGraphStore {
    graph: RwLock<Graph>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self { graph: RwLock::default(), clock: Arc::new(SystemClock) }
    }
}

impl fmt::Debug for MemoryGraphStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryGraphStore").finish_non_exhaustive()
    }
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp `last_modified` from `clock` instead of the system time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Every stored edge, sorted. Handy for whole-graph equality checks.
    pub async fn all_edges(&self) -> Vec<(EdgeKind, String, String)> {
        self.graph.read().await.edges.iter().cloned().collect()
    }

    pub async fn author(&self, name: &str) -> Option<Author> {
        self.graph.read().await.authors.get(name).cloned()
    }

    pub async fn organization(&self, id: &str) -> Option<Organization> {
        self.graph.read().await.organizations.get(id).cloned()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn commit_sync_batch(&self, batch: &SyncBatch) -> Result<RunStats> {
        let now = self.clock.now();
        let mut graph = self.graph.write().await;
        let mut stats = RunStats::default();
        for snapshot in &batch.upserts {
            match graph.write_paper(&snapshot.paper, now) {
                UpsertOutcome::Created => stats.created += 1,
                UpsertOutcome::Updated => stats.updated += 1,
            }
            graph.write_edge_set(&snapshot.paper.arxiv_id, EdgeKind::Authored, &snapshot.authors)?;
            graph.write_edge_set(&snapshot.paper.arxiv_id, EdgeKind::ClassifiedAs, &snapshot.categories)?;
        }
        for key in &batch.deletions {
            if graph.detach_delete_paper(key) {
                stats.deleted += 1;
            }
        }
        Ok(stats)
    }

    async fn upsert_paper(&self, paper: &Paper) -> Result<UpsertOutcome> {
        Ok(self.graph.write().await.write_paper(paper, self.clock.now()))
    }

    async fn replace_edges(&self, paper_key: &str, kind: EdgeKind, others: &[String]) -> Result<()> {
        let mut graph = self.graph.write().await;
        if !graph.papers.contains_key(paper_key) {
            return Err(DbError::InvalidQuery(format!("unknown paper {paper_key}")));
        }
        graph.write_edge_set(paper_key, kind, others)
    }

    async fn existing_dois(&self, dois: &[String]) -> Result<HashSet<String>> {
        let graph = self.graph.read().await;
        let wanted: HashSet<&str> = dois.iter().map(String::as_str).collect();
        Ok(graph
            .papers
            .values()
            .filter_map(|p| p.paper.doi.as_deref())
            .filter(|doi| wanted.contains(doi))
            .map(str::to_string)
            .collect())
    }

    async fn apply_enrichments(&self, batch: &EnrichmentBatch) -> Result<EnrichmentOutcome> {
        let now = self.clock.now();
        let mut graph = self.graph.write().await;
        let mut outcome = EnrichmentOutcome::default();

        for org in &batch.organizations {
            graph.organizations.insert(org.openalex_id.clone(), org.clone());
            outcome.organizations_upserted += 1;
        }

        for work in &batch.works {
            let mut enriched = 0;
            for stored in graph.papers.values_mut() {
                if stored.paper.doi.as_deref() == Some(work.doi.as_str()) {
                    stored.enrichment = Some(work.enrichment.clone());
                    stored.last_modified = now;
                    enriched += 1;
                }
            }
            if enriched == 0 {
                continue;
            }
            outcome.papers_enriched += enriched;

            for author in &work.authors {
                let Some(existing) = graph.authors.get_mut(&author.name) else {
                    continue;
                };
                if author.openalex_id.is_some() {
                    existing.openalex_id = author.openalex_id.clone();
                }
                if author.orcid.is_some() {
                    existing.orcid = author.orcid.clone();
                }
                outcome.authors_enriched += 1;
                for institution in &author.institution_ids {
                    if graph.organizations.contains_key(institution)
                        && graph.edges.insert((EdgeKind::AffiliatedWith, author.name.clone(), institution.clone()))
                    {
                        outcome.affiliations_created += 1;
                    }
                }
            }
        }
        Ok(outcome)
    }

    async fn matched_papers_after(&self, cursor: Option<&str>, limit: usize) -> Result<Vec<MatchedPaperRefs>> {
        let graph = self.graph.read().await;
        let lower = cursor.unwrap_or("");
        Ok(graph
            .papers
            .iter()
            .filter(|(key, _)| key.as_str() > lower)
            .filter_map(|(key, stored)| {
                stored.enrichment.as_ref().map(|e| MatchedPaperRefs {
                    arxiv_id: key.clone(),
                    openalex_id: e.openalex_id.clone(),
                    referenced_works: e.referenced_works.clone(),
                })
            })
            .take(limit)
            .collect())
    }

    async fn resolve_external_ids(&self, ids: &[String]) -> Result<HashMap<String, String>> {
        let graph = self.graph.read().await;
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut resolved = HashMap::new();
        for (key, stored) in &graph.papers {
            if let Some(e) = &stored.enrichment {
                if wanted.contains(e.openalex_id.as_str()) {
                    resolved.entry(e.openalex_id.clone()).or_insert_with(|| key.clone());
                }
            }
        }
        Ok(resolved)
    }

    async fn bulk_create_edges(&self, kind: EdgeKind, pairs: &[(String, String)]) -> Result<u64> {
        let (src_kind, dst_kind) = endpoints(kind);
        let mut graph = self.graph.write().await;
        let mut created = 0;
        for (src, dst) in pairs {
            if src == dst || !graph.has_node(src_kind, src) || !graph.has_node(dst_kind, dst) {
                continue;
            }
            if graph.edges.insert((kind, src.clone(), dst.clone())) {
                created += 1;
            }
        }
        Ok(created)
    }

    async fn append_checkpoint(&self, record: &CheckpointRecord) -> Result<()> {
        self.graph.write().await.checkpoints.push(record.clone());
        Ok(())
    }

    async fn latest_checkpoint(&self, namespace: &str) -> Result<Option<CheckpointRecord>> {
        let graph = self.graph.read().await;
        Ok(graph
            .checkpoints
            .iter()
            .rev()
            .find(|r| r.namespace == namespace && r.success)
            .cloned())
    }

    async fn completed_markers(&self, namespace: &str) -> Result<HashSet<String>> {
        let graph = self.graph.read().await;
        Ok(graph
            .checkpoints
            .iter()
            .filter(|r| r.namespace == namespace && r.success)
            .filter_map(|r| r.marker.clone())
            .collect())
    }

    async fn max_paper_update_date(&self) -> Result<Option<DateTime<Utc>>> {
        let graph = self.graph.read().await;
        Ok(graph.papers.values().filter_map(|p| p.paper.update_date).max())
    }

    async fn get_paper(&self, key: &str) -> Result<Option<StoredPaper>> {
        Ok(self.graph.read().await.papers.get(key).cloned())
    }

    async fn edge_targets(&self, kind: EdgeKind, src: &str) -> Result<Vec<String>> {
        let graph = self.graph.read().await;
        Ok(graph
            .edges
            .iter()
            .filter(|(k, s, _)| *k == kind && s == src)
            .map(|(_, _, d)| d.clone())
            .collect())
    }

    async fn edge_sources(&self, kind: EdgeKind, dst: &str) -> Result<Vec<String>> {
        let graph = self.graph.read().await;
        Ok(graph
            .edges
            .iter()
            .filter(|(k, _, d)| *k == kind && d == dst)
            .map(|(_, s, _)| s.clone())
            .collect())
    }

    async fn stats(&self) -> Result<GraphStats> {
        let graph = self.graph.read().await;
        let mut edges = BTreeMap::new();
        for (kind, _, _) in &graph.edges {
            *edges.entry(*kind).or_insert(0) += 1;
        }
        Ok(GraphStats {
            papers: graph.papers.len() as u64,
            matched_papers: graph.papers.values().filter(|p| p.enrichment.is_some()).count() as u64,
            authors: graph.authors.len() as u64,
            categories: graph.categories.len() as u64,
            organizations: graph.organizations.len() as u64,
            edges,
            checkpoints: graph.checkpoints.len() as u64,
        })
    }
}
