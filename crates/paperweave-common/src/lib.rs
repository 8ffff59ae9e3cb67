//! paperweave-common: shared entities, errors and helpers used across all PaperWeave crates.

pub mod error;
pub mod entities;
pub mod identifiers;
pub mod clock;
pub mod http;

// Re-export commonly used types
pub use entities::{Author, Category, EdgeKind, Enrichment, Organization, Paper, RunStats, StoredPaper};
pub use error::{PaperweaveError, Result};
