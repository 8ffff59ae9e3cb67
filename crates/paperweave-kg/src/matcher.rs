//! Bulk matcher: correlate the works snapshot with stored papers by DOI.
//!
//! Files are streamed one at a time per worker. For every chunk the candidate
//! DOIs go to storage as an existence query, so neither the local key set nor
//! the corpus is ever held in memory. Matches are flushed as one enrichment
//! batch per chunk. In full scope a file is marked complete only after all of
//! its batches are flushed; a restarted run skips marked files.

use futures::stream::{self, StreamExt};
use paperweave_common::{Organization, RunStats};
use paperweave_db::{bulk_namespace, CheckpointStore, EnrichmentBatch, EnrichmentOutcome, GraphStore};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::corpus::{discover, stream_works, CorpusFile, WorkChunk};
use crate::error::MatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchScope {
    /// Test scale: the first `files` files, `records` records each. Writes no file markers.
    Sample { files: usize, records: u64 },
    /// Every file, checkpointed per file.
    Full,
}

#[derive(Debug, Clone)]
pub struct MatcherOptions {
    pub data_dir: PathBuf,
    pub corpus_label: String,
    pub workers: usize,
    pub flush_threshold: usize,
    pub concept_min_score: f64,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/works"),
            corpus_label: "openalex".to_string(),
            workers: 4,
            flush_threshold: 20_000,
            concept_min_score: 0.3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileStats {
    pub records: u64,
    pub with_doi: u64,
    pub matched: u64,
    pub malformed: u64,
    pub enrichment: EnrichmentOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    pub scope: MatchScope,
    pub files_total: usize,
    pub files_skipped: usize,
    pub files_processed: usize,
    pub files_failed: Vec<String>,
    pub records: u64,
    pub with_doi: u64,
    pub matched: u64,
    pub malformed: u64,
    pub enrichment: EnrichmentOutcome,
    /// False when any file could not be read; those files stay unmarked.
    pub success: bool,
}

impl MatchReport {
    fn new(scope: MatchScope) -> Self {
        Self {
            scope,
            files_total: 0,
            files_skipped: 0,
            files_processed: 0,
            files_failed: Vec::new(),
            records: 0,
            with_doi: 0,
            matched: 0,
            malformed: 0,
            enrichment: EnrichmentOutcome::default(),
            success: true,
        }
    }

    fn absorb(&mut self, stats: &FileStats) {
        self.files_processed += 1;
        self.records += stats.records;
        self.with_doi += stats.with_doi;
        self.matched += stats.matched;
        self.malformed += stats.malformed;
        self.enrichment += stats.enrichment;
    }
}

pub struct BulkMatcher {
    store: Arc<dyn GraphStore>,
    checkpoints: CheckpointStore,
    options: MatcherOptions,
}

impl BulkMatcher {
    pub fn new(store: Arc<dyn GraphStore>, checkpoints: CheckpointStore, options: MatcherOptions) -> Self {
        Self { store, checkpoints, options }
    }

    fn namespace(&self) -> String {
        bulk_namespace(&self.options.corpus_label)
    }

    #[instrument(skip(self), fields(corpus = %self.options.corpus_label))]
    pub async fn run(&self, scope: MatchScope) -> Result<MatchReport, MatchError> {
        let files = discover(&self.options.data_dir)?;
        let mut report = MatchReport::new(scope);
        report.files_total = files.len();

        let (pending, record_limit, checkpointed) = match scope {
            MatchScope::Sample { files: n, records } => {
                (files.into_iter().take(n).collect::<Vec<_>>(), Some(records), false)
            }
            MatchScope::Full => {
                let done = self.checkpoints.completed_files(&self.namespace()).await?;
                let (skipped, pending): (Vec<_>, Vec<_>) = files.into_iter().partition(|f| done.contains(&f.id));
                report.files_skipped = skipped.len();
                (pending, None, true)
            }
        };

        info!(
            total = report.files_total,
            skipped = report.files_skipped,
            pending = pending.len(),
            workers = self.options.workers,
            "📚 Starting bulk match"
        );

        let mut results = stream::iter(pending)
            .map(|file| async move {
                let id = file.id.clone();
                (id, self.process_file(file, record_limit, checkpointed).await)
            })
            .buffer_unordered(self.options.workers.max(1));

        while let Some((file, result)) = results.next().await {
            match result {
                Ok(stats) => {
                    info!(file = %file, records = stats.records, matched = stats.matched, "File complete");
                    report.absorb(&stats);
                }
                Err(e) if e.is_file_local() => {
                    warn!(file = %file, error = %e, "File failed; it will be retried on the next run");
                    report.files_failed.push(file);
                    report.success = false;
                }
                Err(e) => {
                    error!(file = %file, error = %e, "Bulk match aborted");
                    return Err(e);
                }
            }
        }

        report.files_failed.sort();
        info!(
            processed = report.files_processed,
            failed = report.files_failed.len(),
            records = report.records,
            matched = report.matched,
            papers_enriched = report.enrichment.papers_enriched,
            organizations = report.enrichment.organizations_upserted,
            success = report.success,
            "✅ Bulk match finished"
        );
        Ok(report)
    }

    async fn process_file(
        &self,
        file: CorpusFile,
        record_limit: Option<u64>,
        checkpointed: bool,
    ) -> Result<FileStats, MatchError> {
        let id = file.id.clone();
        debug!(file = %id, bytes = file.size_bytes, "Reading corpus file");
        let mut chunks = stream_works(file, self.options.flush_threshold, record_limit);
        let mut stats = FileStats::default();

        while let Some(chunk) = chunks.recv().await {
            self.flush_chunk(chunk?, &mut stats).await?;
        }

        if checkpointed {
            let marker_stats = RunStats {
                updated: stats.enrichment.papers_enriched,
                errors: stats.malformed,
                ..RunStats::default()
            };
            self.checkpoints.mark_file_complete(&self.namespace(), &id, marker_stats).await?;
        }
        Ok(stats)
    }

    async fn flush_chunk(&self, chunk: WorkChunk, stats: &mut FileStats) -> Result<(), MatchError> {
        stats.records += chunk.works.len() as u64 + chunk.malformed;
        stats.malformed += chunk.malformed;

        let candidates: Vec<(String, usize)> = chunk
            .works
            .iter()
            .enumerate()
            .filter_map(|(i, w)| w.matching_doi().map(|doi| (doi, i)))
            .collect();
        stats.with_doi += candidates.len() as u64;
        if candidates.is_empty() {
            return Ok(());
        }

        let dois: Vec<String> = candidates.iter().map(|(doi, _)| doi.clone()).collect();
        let present: HashSet<String> = self.store.existing_dois(&dois).await?;
        if present.is_empty() {
            return Ok(());
        }

        let mut batch = EnrichmentBatch::default();
        let mut organizations: HashMap<String, Organization> = HashMap::new();
        for (doi, i) in candidates {
            if !present.contains(&doi) {
                continue;
            }
            let Some((work, orgs)) = chunk.works[i].to_match(doi, self.options.concept_min_score) else {
                continue;
            };
            for org in orgs {
                organizations.entry(org.openalex_id.clone()).or_insert(org);
            }
            batch.works.push(work);
        }
        stats.matched += batch.works.len() as u64;
        batch.organizations = organizations.into_values().collect();
        batch.organizations.sort_by(|a, b| a.openalex_id.cmp(&b.openalex_id));

        let outcome = self.store.apply_enrichments(&batch).await?;
        debug!(
            matched = batch.works.len(),
            papers = outcome.papers_enriched,
            authors = outcome.authors_enriched,
            affiliations = outcome.affiliations_created,
            "Enrichment batch flushed"
        );
        stats.enrichment += outcome;
        Ok(())
    }
}
