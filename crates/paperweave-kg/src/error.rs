use paperweave_db::DbError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("corpus directory not found: {0}")]
    CorpusNotFound(PathBuf),

    #[error("failed to read corpus file {file}: {source}")]
    Read {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corpus reader task failed: {0}")]
    Task(String),

    #[error("storage failure: {0}")]
    Storage(#[from] DbError),
}

impl MatchError {
    /// Errors confined to one corpus file. The file is left unmarked and the
    /// run carries on; anything else aborts the run.
    pub fn is_file_local(&self) -> bool {
        matches!(self, MatchError::Read { .. } | MatchError::Task(_))
    }
}
