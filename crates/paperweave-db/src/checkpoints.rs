//! Checkpoint resolution and recording.
//!
//! A namespace's current checkpoint is its most recent successful record.
//! Cold starts fall back to the newest paper update date (incremental
//! namespace only) and then to a fixed lookback before now.

use crate::error::Result;
use crate::store::{CheckpointRecord, GraphStore};
use chrono::{DateTime, Duration, Utc};
use paperweave_common::clock::Clock;
use paperweave_common::RunStats;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const INCREMENTAL: &str = "incremental";
pub const CITATIONS: &str = "citations";

/// Namespace holding per-file completion markers for one bulk corpus.
pub fn bulk_namespace(corpus_label: &str) -> String {
    format!("bulk_match:{corpus_label}")
}

/// Which tier produced a resolved checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointSource {
    Recorded,
    PaperUpdateDate,
    DefaultLookback,
}

impl fmt::Display for CheckpointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckpointSource::Recorded => "recorded checkpoint",
            CheckpointSource::PaperUpdateDate => "latest paper update date",
            CheckpointSource::DefaultLookback => "default lookback",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCheckpoint {
    pub timestamp: DateTime<Utc>,
    pub source: CheckpointSource,
}

#[derive(Clone)]
pub struct CheckpointStore {
    store: Arc<dyn GraphStore>,
    clock: Arc<dyn Clock>,
    default_lookback: Duration,
}

impl CheckpointStore {
    pub fn new(store: Arc<dyn GraphStore>, clock: Arc<dyn Clock>, default_lookback: Duration) -> Self {
        Self { store, clock, default_lookback }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Resolve the point a run in `namespace` should start from.
    pub async fn get_checkpoint(&self, namespace: &str) -> Result<ResolvedCheckpoint> {
        if let Some(record) = self.store.latest_checkpoint(namespace).await? {
            debug!(namespace, timestamp = %record.timestamp, "Using recorded checkpoint");
            return Ok(ResolvedCheckpoint { timestamp: record.timestamp, source: CheckpointSource::Recorded });
        }

        if namespace == INCREMENTAL {
            if let Some(latest) = self.store.max_paper_update_date().await? {
                info!(namespace, timestamp = %latest, "No checkpoint recorded, resuming from newest paper");
                return Ok(ResolvedCheckpoint { timestamp: latest, source: CheckpointSource::PaperUpdateDate });
            }
        }

        let fallback = self.clock.now() - self.default_lookback;
        info!(namespace, timestamp = %fallback, "No checkpoint recorded, using default lookback");
        Ok(ResolvedCheckpoint { timestamp: fallback, source: CheckpointSource::DefaultLookback })
    }

    /// Append a record. Successful timestamps are clamped so they never move
    /// behind the previous success in the same namespace.
    pub async fn record_checkpoint(
        &self,
        namespace: &str,
        timestamp: DateTime<Utc>,
        stats: RunStats,
        success: bool,
        marker: Option<String>,
    ) -> Result<CheckpointRecord> {
        let mut timestamp = timestamp;
        if success {
            if let Some(previous) = self.store.latest_checkpoint(namespace).await? {
                if previous.timestamp > timestamp {
                    warn!(
                        namespace,
                        requested = %timestamp,
                        previous = %previous.timestamp,
                        "Checkpoint would move backwards; keeping previous value"
                    );
                    timestamp = previous.timestamp;
                }
            }
        }

        let record = CheckpointRecord {
            namespace: namespace.to_string(),
            timestamp,
            stats,
            success,
            marker,
            recorded_at: self.clock.now(),
        };
        self.store.append_checkpoint(&record).await?;
        info!(
            namespace,
            timestamp = %record.timestamp,
            created = stats.created,
            updated = stats.updated,
            deleted = stats.deleted,
            errors = stats.errors,
            success,
            "Checkpoint recorded"
        );
        Ok(record)
    }

    /// Mark one bulk-corpus file as durably processed.
    pub async fn mark_file_complete(&self, namespace: &str, file_id: &str, stats: RunStats) -> Result<()> {
        let now = self.clock.now();
        self.record_checkpoint(namespace, now, stats, true, Some(file_id.to_string())).await?;
        Ok(())
    }

    pub async fn completed_files(&self, namespace: &str) -> Result<HashSet<String>> {
        self.store.completed_markers(namespace).await
    }

    /// Marker of the latest successful record, used as a resume cursor.
    pub async fn cursor(&self, namespace: &str) -> Result<Option<String>> {
        Ok(self.store.latest_checkpoint(namespace).await?.and_then(|r| r.marker))
    }
}
