//! CITES edges from the reference lists of matched papers.
//!
//! Matched papers are walked in key order, `chunk_size` at a time. After each
//! chunk's edges are written the last key is recorded as the cursor in the
//! `citations` namespace, so an interrupted run resumes after it. A run that
//! reaches the end records an empty cursor and the next run starts a fresh pass.

use paperweave_common::{EdgeKind, RunStats};
use paperweave_db::{CheckpointStore, GraphStore, CITATIONS};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::error::MatchError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CitationReport {
    pub resumed_from: Option<String>,
    pub chunks: u64,
    pub papers_scanned: u64,
    pub references_seen: u64,
    pub references_resolved: u64,
    pub edges_created: u64,
}

pub struct CitationGraphBuilder {
    store: Arc<dyn GraphStore>,
    checkpoints: CheckpointStore,
    chunk_size: usize,
}

impl CitationGraphBuilder {
    pub fn new(store: Arc<dyn GraphStore>, checkpoints: CheckpointStore, chunk_size: usize) -> Self {
        Self { store, checkpoints, chunk_size: chunk_size.max(1) }
    }

    /// Walk every matched paper after the stored cursor, or from the first
    /// one when `from_start` is set.
    #[instrument(skip(self))]
    pub async fn run(&self, from_start: bool) -> Result<CitationReport, MatchError> {
        let mut report = CitationReport::default();
        let mut cursor = if from_start { None } else { self.checkpoints.cursor(CITATIONS).await? };
        report.resumed_from = cursor.clone();
        info!(cursor = cursor.as_deref().unwrap_or("<start>"), "🔗 Building citation graph");

        loop {
            let chunk = match self.store.matched_papers_after(cursor.as_deref(), self.chunk_size).await {
                Ok(chunk) => chunk,
                Err(e) => return Err(self.fail(&report, e.into()).await),
            };
            let Some(last) = chunk.last().map(|p| p.arxiv_id.clone()) else {
                break;
            };

            let mut refs: Vec<String> = Vec::new();
            let mut seen = HashSet::new();
            for paper in &chunk {
                report.references_seen += paper.referenced_works.len() as u64;
                refs.extend(paper.referenced_works.iter().filter(|r| seen.insert(r.as_str())).cloned());
            }

            let created = match self.write_chunk(&chunk, &refs, &mut report).await {
                Ok(created) => created,
                Err(e) => return Err(self.fail(&report, e).await),
            };

            report.chunks += 1;
            report.papers_scanned += chunk.len() as u64;
            report.edges_created += created;
            debug!(chunk = report.chunks, papers = chunk.len(), created, cursor = %last, "Citation chunk written");

            let stats = RunStats { created, ..RunStats::default() };
            let now = self.checkpoints.clock().now();
            self.checkpoints.record_checkpoint(CITATIONS, now, stats, true, Some(last.clone())).await?;
            cursor = Some(last);
        }

        let total = RunStats { created: report.edges_created, ..RunStats::default() };
        let now = self.checkpoints.clock().now();
        self.checkpoints.record_checkpoint(CITATIONS, now, total, true, None).await?;

        info!(
            chunks = report.chunks,
            papers = report.papers_scanned,
            references = report.references_seen,
            resolved = report.references_resolved,
            created = report.edges_created,
            "✅ Citation graph complete"
        );
        Ok(report)
    }

    async fn write_chunk(
        &self,
        chunk: &[paperweave_db::MatchedPaperRefs],
        refs: &[String],
        report: &mut CitationReport,
    ) -> Result<u64, MatchError> {
        if refs.is_empty() {
            return Ok(0);
        }
        let resolved = self.store.resolve_external_ids(refs).await?;

        let mut pairs = Vec::new();
        for paper in chunk {
            for reference in &paper.referenced_works {
                let Some(target) = resolved.get(reference) else { continue };
                report.references_resolved += 1;
                if *target != paper.arxiv_id {
                    pairs.push((paper.arxiv_id.clone(), target.clone()));
                }
            }
        }
        if pairs.is_empty() {
            return Ok(0);
        }
        Ok(self.store.bulk_create_edges(EdgeKind::Cites, &pairs).await?)
    }

    async fn fail(&self, report: &CitationReport, e: MatchError) -> MatchError {
        error!(error = %e, chunks = report.chunks, "Citation build aborted");
        let stats = RunStats { created: report.edges_created, errors: 1, ..RunStats::default() };
        let now = self.checkpoints.clock().now();
        if let Err(audit) = self.checkpoints.record_checkpoint(CITATIONS, now, stats, false, None).await {
            warn!(error = %audit, "Could not record failed citation run");
        }
        e
    }
}
