//! Error types for harvesting, transforming and syncing.

use paperweave_common::PaperweaveError;
use paperweave_db::DbError;
use std::time::Duration;
use thiserror::Error;

/// A failed protocol request, classified by how the harvester should react.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Server asked us to slow down (HTTP 429/503). Retried without
    /// touching the attempt budget.
    #[error("rate limited by server (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Timeouts, dropped connections, 5xx, truncated bodies.
    #[error("transient failure: {0}")]
    Transient(String),

    /// An OAI-PMH `<error>` other than `noRecordsMatch`.
    #[error("OAI-PMH error {code}: {message}")]
    Protocol { code: String, message: String },

    #[error("fatal harvest failure: {0}")]
    Fatal(String),

    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl HarvestError {
    pub fn is_transient(&self) -> bool {
        matches!(self, HarvestError::Transient(_))
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            if status.is_client_error() {
                return HarvestError::Fatal(err.to_string());
            }
            return HarvestError::Transient(err.to_string());
        }
        if err.is_builder() || err.is_redirect() {
            HarvestError::Fatal(err.to_string())
        } else {
            // timeouts, connect failures, body/decode errors
            HarvestError::Transient(err.to_string())
        }
    }
}

impl From<PaperweaveError> for HarvestError {
    fn from(err: PaperweaveError) -> Self {
        match err {
            PaperweaveError::Http(e) => e.into(),
            other => HarvestError::Fatal(other.to_string()),
        }
    }
}

/// A record that cannot be turned into canonical entities. Counted and skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("record {identifier}: cannot derive a paper key")]
    InvalidIdentifier { identifier: String },

    #[error("record {identifier}: missing title")]
    MissingTitle { identifier: String },

    #[error("record {identifier}: unparsable datestamp {value:?}")]
    BadDatestamp { identifier: String, value: String },
}

/// A run-level failure. The checkpoint is never advanced when one occurs.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("harvest aborted: {0}")]
    Harvest(#[from] HarvestError),

    #[error("storage failure: {0}")]
    Storage(#[from] DbError),
}
