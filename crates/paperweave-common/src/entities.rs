//! Core entity types mirroring the knowledge graph schema.
//! These are the canonical shapes every pipeline writes and every store reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Paper
// ---------------------------------------------------------------------------

/// Fields owned by the incremental sync. Overwritten wholesale on every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    pub arxiv_id: String,
    pub title: String,
    pub abstract_text: String,
    pub submitter: Option<String>,
    pub journal_ref: Option<String>,
    pub doi: Option<String>,  // normalised, lowercase, no resolver prefix
    pub license: Option<String>,
    pub update_date: Option<DateTime<Utc>>,
}

/// Fields owned by the bulk matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub openalex_id: String,
    pub cited_by_count: i64,
    pub topics: Vec<String>,
    pub referenced_works: Vec<String>,
}

/// A paper as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPaper {
    pub paper: Paper,
    pub enrichment: Option<Enrichment>,
    pub last_modified: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Author / Category / Organization
// ---------------------------------------------------------------------------

/// Authors are keyed by exact name. Created on first sight, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub openalex_id: Option<String>,
    pub orcid: Option<String>,
}

impl Author {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), openalex_id: None, orcid: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    pub id: String,  // e.g. hep-th, cs
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub openalex_id: String,
    pub name: String,
    pub country_code: Option<String>,
    pub org_type: Option<String>,
    pub ror: Option<String>,
    pub lineage_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Author -> Paper
    Authored,
    /// Paper -> Category
    ClassifiedAs,
    /// Paper -> Paper
    Cites,
    /// Author -> Organization
    AffiliatedWith,
}

/// Which end of an edge is the paper when edges are reconciled per paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperSide {
    Source,
    Target,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Authored       => "AUTHORED",
            EdgeKind::ClassifiedAs   => "CLASSIFIED_AS",
            EdgeKind::Cites          => "CITES",
            EdgeKind::AffiliatedWith => "AFFILIATED_WITH",
        }
    }

    /// Position of the paper for the kinds that are replaced per paper.
    /// `None` for kinds that never hang off a single paper's snapshot.
    pub fn paper_side(&self) -> Option<PaperSide> {
        match self {
            EdgeKind::Authored     => Some(PaperSide::Target),
            EdgeKind::ClassifiedAs => Some(PaperSide::Source),
            EdgeKind::Cites | EdgeKind::AffiliatedWith => None,
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AUTHORED"        => Ok(EdgeKind::Authored),
            "CLASSIFIED_AS"   => Ok(EdgeKind::ClassifiedAs),
            "CITES"           => Ok(EdgeKind::Cites),
            "AFFILIATED_WITH" => Ok(EdgeKind::AffiliatedWith),
            other => Err(format!("unknown edge kind: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Run statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub errors: u64,
}

impl RunStats {
    pub fn total(&self) -> u64 {
        self.created + self.updated + self.deleted
    }
}

impl std::ops::AddAssign for RunStats {
    fn add_assign(&mut self, rhs: Self) {
        self.created += rhs.created;
        self.updated += rhs.updated;
        self.deleted += rhs.deleted;
        self.errors  += rhs.errors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_kind_round_trips_through_str() {
        for kind in [EdgeKind::Authored, EdgeKind::ClassifiedAs, EdgeKind::Cites, EdgeKind::AffiliatedWith] {
            assert_eq!(kind.as_str().parse::<EdgeKind>().unwrap(), kind);
        }
        assert!("WROTE".parse::<EdgeKind>().is_err());
    }

    #[test]
    fn test_replaced_kinds_have_a_paper_side() {
        assert_eq!(EdgeKind::Authored.paper_side(), Some(PaperSide::Target));
        assert_eq!(EdgeKind::ClassifiedAs.paper_side(), Some(PaperSide::Source));
        assert_eq!(EdgeKind::Cites.paper_side(), None);
    }

    #[test]
    fn test_run_stats_accumulate() {
        let mut total = RunStats::default();
        total += RunStats { created: 2, updated: 1, deleted: 0, errors: 1 };
        total += RunStats { created: 0, updated: 3, deleted: 1, errors: 0 };
        assert_eq!(total, RunStats { created: 2, updated: 4, deleted: 1, errors: 1 });
        assert_eq!(total.total(), 7);
    }

    #[test]
    fn test_edge_kind_serializes_as_relationship_name() {
        let json = serde_json::to_string(&EdgeKind::ClassifiedAs).unwrap();
        assert_eq!(json, "\"CLASSIFIED_AS\"");
    }
}
