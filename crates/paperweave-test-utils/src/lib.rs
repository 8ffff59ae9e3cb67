//! Fixture builders shared by the PaperWeave test suites.

pub mod corpus;
pub mod oai;

pub use corpus::{openalex_work, write_gz_jsonl, write_jsonl, WorkFixture};
pub use oai::{identify_response, oai_error, oai_page, OaiRecordFixture};
