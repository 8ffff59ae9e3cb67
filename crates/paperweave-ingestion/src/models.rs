//! Raw shapes produced by the OAI-PMH parser, before any transform.

use serde::{Deserialize, Serialize};

/// One `<record>` exactly as harvested, Dublin Core fields untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub identifier: String,
    pub datestamp: String,
    pub deleted: bool,
    pub set_specs: Vec<String>,
    pub title: Option<String>,
    pub creators: Vec<String>,
    pub descriptions: Vec<String>,
    pub identifiers: Vec<String>,
    pub rights: Option<String>,
}

/// One ListRecords response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OaiPage {
    pub records: Vec<RawRecord>,
    /// Present and non-empty when another page follows.
    pub resumption_token: Option<String>,
    pub complete_list_size: Option<u64>,
    /// Records dropped for missing header fields.
    pub dropped: u64,
}

impl OaiPage {
    pub fn is_last(&self) -> bool {
        self.resumption_token.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryInfo {
    pub repository_name: String,
    pub base_url: String,
    pub protocol_version: String,
    pub earliest_datestamp: String,
    pub granularity: String,
}
