//! Database error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("libSQL error: {0}")]
    Libsql(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row in {table}: {detail}")]
    CorruptRow { table: &'static str, detail: String },

    #[error("Unsupported edge operation: {0}")]
    UnsupportedEdge(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl From<libsql::Error> for DbError {
    fn from(err: libsql::Error) -> Self {
        DbError::Libsql(err.to_string())
    }
}

impl DbError {
    pub(crate) fn corrupt(table: &'static str, detail: impl Into<String>) -> Self {
        DbError::CorruptRow { table, detail: detail.into() }
    }
}
