//! paperweave-kg: bulk enrichment of the paper graph.
//!
//! Phase 1 ([`BulkMatcher`]) streams an OpenAlex works snapshot file by file,
//! lets storage filter candidates by DOI, and enriches the matched papers.
//! Phase 2 ([`CitationGraphBuilder`]) turns the matched papers' reference
//! lists into CITES edges. Both phases resume from their own checkpoints.

pub mod citations;
pub mod corpus;
pub mod error;
pub mod matcher;
pub mod openalex;

pub use citations::{CitationGraphBuilder, CitationReport};
pub use corpus::{discover, overview, CorpusFile, CorpusOverview};
pub use error::MatchError;
pub use matcher::{BulkMatcher, MatchReport, MatchScope, MatcherOptions};
pub use openalex::Work;
