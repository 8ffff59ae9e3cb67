//! PaperWeave storage layer
//!
//! Pipelines write through the [`GraphStore`] trait. Two backends ship with
//! the crate: [`LibsqlGraphStore`] (durable, local file or remote libSQL)
//! and [`MemoryGraphStore`] (tests and dry runs). Checkpoint resolution
//! lives on top of either in [`CheckpointStore`].
//!
//! # Example
//!
//! ```rust,no_run
//! use paperweave_db::{GraphStore, LibsqlGraphStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = LibsqlGraphStore::open_local("./data/paperweave.db").await?;
//!     let stats = store.stats().await?;
//!     println!("{} papers", stats.papers);
//!     Ok(())
//! }
//! ```

pub mod checkpoints;
pub mod error;
pub mod libsql_store;
pub mod memory;
pub mod schema;
pub mod store;

pub use checkpoints::{bulk_namespace, CheckpointSource, CheckpointStore, ResolvedCheckpoint, CITATIONS, INCREMENTAL};
pub use error::{DbError, Result};
pub use libsql_store::LibsqlGraphStore;
pub use memory::MemoryGraphStore;
pub use store::{
    AuthorEnrichment, CheckpointRecord, EnrichmentBatch, EnrichmentOutcome, GraphStats, GraphStore,
    MatchedPaperRefs, MatchedWork, PaperSnapshot, SyncBatch, UpsertOutcome,
};
