use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaperweaveError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Network capabilities capped: domain not in allowlist for URL {0}")]
    DomainNotAllowed(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PaperweaveError>;
