//! Incremental sync orchestration.
//!
//! One run:
//!   1. Resolve the start of the window from the checkpoint store
//!   2. Harvest pages from the OAI-PMH endpoint
//!   3. Transform records, counting and skipping the bad ones
//!   4. Commit transactional batches (upserts, edge replacement, deletions)
//!   5. Record the checkpoint, only once every batch is committed
//!
//! A storage failure or an exhausted retry budget aborts the run. The
//! checkpoint stays where it was, so the next run re-covers the same window.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use paperweave_common::RunStats;
use paperweave_db::{CheckpointSource, CheckpointStore, GraphStore, INCREMENTAL};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::error::SyncError;
use crate::harvester::ProtocolHarvester;
use crate::transform::{collapse_latest, into_batch, transform_record, Transformed};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Transformed records committed per storage transaction.
    pub batch_size: usize,
    /// Treat any record-level error as a failed run.
    pub strict_records: bool,
    /// Upper bound of the harvest window. `None` harvests up to now.
    pub until: Option<DateTime<Utc>>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { batch_size: 500, strict_records: false, until: None }
    }
}

/// Structured summary of one run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub window_start: DateTime<Utc>,
    pub window_source: CheckpointSource,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages: usize,
    pub records_seen: u64,
    pub stats: RunStats,
    /// OAI identifiers of records that failed to transform.
    pub failed_records: Vec<String>,
    pub success: bool,
    /// Recorded checkpoint; `None` when the run did not advance it.
    pub checkpoint: Option<DateTime<Utc>>,
}

pub struct SyncOrchestrator {
    harvester: ProtocolHarvester,
    store: Arc<dyn GraphStore>,
    checkpoints: CheckpointStore,
    options: SyncOptions,
}

impl SyncOrchestrator {
    pub fn new(
        harvester: ProtocolHarvester,
        store: Arc<dyn GraphStore>,
        checkpoints: CheckpointStore,
        options: SyncOptions,
    ) -> Self {
        Self { harvester, store, checkpoints, options }
    }

    /// Run one incremental sync end to end.
    #[instrument(skip(self), name = "sync_run")]
    pub async fn run_once(&self) -> Result<SyncReport, SyncError> {
        let clock = self.checkpoints.clock().clone();
        let started_at = clock.now();
        let window = self.checkpoints.get_checkpoint(INCREMENTAL).await?;
        info!(from = %window.timestamp, source = %window.source, "🔄 Starting incremental sync");

        let mut report = SyncReport {
            window_start: window.timestamp,
            window_source: window.source,
            started_at,
            finished_at: started_at,
            pages: 0,
            records_seen: 0,
            stats: RunStats::default(),
            failed_records: Vec::new(),
            success: false,
            checkpoint: None,
        };

        match self.harvest_and_commit(window.timestamp, &mut report).await {
            Ok(()) => {}
            Err(e) => {
                report.finished_at = clock.now();
                error!(error = %e, created = report.stats.created, updated = report.stats.updated, "Sync run aborted");
                self.record_failure(&report).await;
                return Err(e);
            }
        }

        report.finished_at = clock.now();
        report.success = !(self.options.strict_records && report.stats.errors > 0);

        if report.success {
            let end = self.options.until.unwrap_or(report.finished_at);
            let record = self
                .checkpoints
                .record_checkpoint(INCREMENTAL, end, report.stats, true, None)
                .await?;
            report.checkpoint = Some(record.timestamp);
        } else {
            warn!(errors = report.stats.errors, "Record-level errors in strict mode; checkpoint not advanced");
            self.record_failure(&report).await;
        }

        info!(
            pages = report.pages,
            created = report.stats.created,
            updated = report.stats.updated,
            deleted = report.stats.deleted,
            errors = report.stats.errors,
            success = report.success,
            "✅ Sync run finished"
        );
        Ok(report)
    }

    async fn harvest_and_commit(&self, from: DateTime<Utc>, report: &mut SyncReport) -> Result<(), SyncError> {
        let batch_size = self.options.batch_size.max(1);
        let mut pages = Box::pin(self.harvester.harvest(from, self.options.until).into_stream());
        let mut pending: Vec<Transformed> = Vec::with_capacity(batch_size);

        while let Some(page) = pages.next().await {
            let page = page?;
            report.pages += 1;
            report.records_seen += page.records.len() as u64 + page.dropped;
            report.stats.errors += page.dropped;

            for raw in &page.records {
                match transform_record(raw) {
                    Ok(t) => pending.push(t),
                    Err(e) => {
                        warn!(error = %e, "Skipping record");
                        report.stats.errors += 1;
                        report.failed_records.push(raw.identifier.clone());
                    }
                }
            }

            while pending.len() >= batch_size {
                let rest = pending.split_off(batch_size);
                let chunk = std::mem::replace(&mut pending, rest);
                self.commit(chunk, report).await?;
            }
        }

        if !pending.is_empty() {
            self.commit(pending, report).await?;
        }
        Ok(())
    }

    async fn commit(&self, chunk: Vec<Transformed>, report: &mut SyncReport) -> Result<(), SyncError> {
        let batch = into_batch(collapse_latest(chunk));
        let stats = self.store.commit_sync_batch(&batch).await?;
        debug!(
            upserts = batch.upserts.len(),
            deletions = batch.deletions.len(),
            created = stats.created,
            updated = stats.updated,
            deleted = stats.deleted,
            "Batch committed"
        );
        report.stats += stats;
        Ok(())
    }

    /// Append a `success = false` audit record. Never fails the caller.
    async fn record_failure(&self, report: &SyncReport) {
        if let Err(e) = self
            .checkpoints
            .record_checkpoint(INCREMENTAL, report.finished_at, report.stats, false, None)
            .await
        {
            warn!(error = %e, "Could not record failed run");
        }
    }
}
