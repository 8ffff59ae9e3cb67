//! Dublin Core record -> canonical entities.
//!
//! Defaulting rules:
//! - key: last `:` segment of the OAI identifier
//! - title: whitespace-collapsed, required
//! - abstract: first description, default empty
//! - creators: "Last, First" -> "First Last", deduplicated in byline order
//! - submitter: first creator
//! - DOI: a `doi:` or doi.org identifier, lowercased
//! - journal reference: first identifier that is neither an arXiv URL nor a DOI
//! - categories: setSpec after the `:` (`physics:hep-th` -> `hep-th`)

use chrono::{DateTime, NaiveDate, Utc};
use paperweave_common::identifiers::{collapse_whitespace, normalize_doi, paper_key_from_oai};
use paperweave_common::Paper;
use paperweave_db::{PaperSnapshot, SyncBatch};
use std::collections::{HashMap, HashSet};

use crate::error::TransformError;
use crate::models::RawRecord;

/// Outcome of transforming one harvested record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transformed {
    Upsert { snapshot: PaperSnapshot, datestamp: DateTime<Utc> },
    Delete { key: String, datestamp: DateTime<Utc> },
}

impl Transformed {
    pub fn key(&self) -> &str {
        match self {
            Transformed::Upsert { snapshot, .. } => &snapshot.paper.arxiv_id,
            Transformed::Delete { key, .. } => key,
        }
    }

    pub fn datestamp(&self) -> DateTime<Utc> {
        match self {
            Transformed::Upsert { datestamp, .. } | Transformed::Delete { datestamp, .. } => *datestamp,
        }
    }
}

/// `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_datestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

/// "Last, First" -> "First Last". Empty names yield `None`.
pub fn normalize_creator(raw: &str) -> Option<String> {
    let name = match raw.split_once(',') {
        Some((last, first)) if !first.trim().is_empty() => format!("{} {}", first.trim(), last.trim()),
        Some((last, _)) => last.to_string(),
        None => raw.to_string(),
    };
    let name = collapse_whitespace(&name);
    (!name.is_empty()).then_some(name)
}

fn category_from_set(spec: &str) -> Option<String> {
    let id = spec.rsplit(':').next().unwrap_or(spec).trim();
    (!id.is_empty()).then(|| id.to_string())
}

fn is_arxiv_link(identifier: &str) -> bool {
    identifier.to_ascii_lowercase().contains("arxiv.org/")
}

pub fn transform_record(raw: &RawRecord) -> Result<Transformed, TransformError> {
    let key = paper_key_from_oai(&raw.identifier)
        .map_err(|_| TransformError::InvalidIdentifier { identifier: raw.identifier.clone() })?;
    let datestamp = parse_datestamp(&raw.datestamp).ok_or_else(|| TransformError::BadDatestamp {
        identifier: raw.identifier.clone(),
        value: raw.datestamp.clone(),
    })?;

    if raw.deleted {
        return Ok(Transformed::Delete { key, datestamp });
    }

    let title = raw.title.as_deref().map(collapse_whitespace).unwrap_or_default();
    if title.is_empty() {
        return Err(TransformError::MissingTitle { identifier: raw.identifier.clone() });
    }

    let mut seen = HashSet::new();
    let authors: Vec<String> = raw
        .creators
        .iter()
        .filter_map(|c| normalize_creator(c))
        .filter(|name| seen.insert(name.clone()))
        .collect();

    let mut seen = HashSet::new();
    let categories: Vec<String> = raw
        .set_specs
        .iter()
        .filter_map(|s| category_from_set(s))
        .filter(|c| seen.insert(c.clone()))
        .collect();

    let doi = raw.identifiers.iter().find_map(|id| {
        let lower = id.trim().to_ascii_lowercase();
        if lower.starts_with("doi:") || lower.contains("doi.org/") {
            normalize_doi(id)
        } else {
            None
        }
    });
    let journal_ref = raw
        .identifiers
        .iter()
        .map(|id| collapse_whitespace(id))
        .find(|id| !id.is_empty() && !is_arxiv_link(id) && normalize_doi(id).is_none());

    let paper = Paper {
        arxiv_id: key,
        title,
        abstract_text: raw.descriptions.first().map(|d| collapse_whitespace(d)).unwrap_or_default(),
        submitter: authors.first().cloned(),
        journal_ref,
        doi,
        license: raw.rights.as_deref().map(collapse_whitespace).filter(|r| !r.is_empty()),
        update_date: Some(datestamp),
    };

    Ok(Transformed::Upsert { snapshot: PaperSnapshot { paper, authors, categories }, datestamp })
}

/// Keep one entry per key: the latest datestamp, the later one on ties.
/// Output keeps first-appearance order of keys.
pub fn collapse_latest(records: Vec<Transformed>) -> Vec<Transformed> {
    let mut slot_of: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Transformed> = Vec::with_capacity(records.len());
    for record in records {
        match slot_of.get(record.key()) {
            Some(&i) => {
                if record.datestamp() >= out[i].datestamp() {
                    out[i] = record;
                }
            }
            None => {
                slot_of.insert(record.key().to_string(), out.len());
                out.push(record);
            }
        }
    }
    out
}

pub fn into_batch(records: Vec<Transformed>) -> SyncBatch {
    let mut batch = SyncBatch::default();
    for record in records {
        match record {
            Transformed::Upsert { snapshot, .. } => batch.upserts.push(snapshot),
            Transformed::Delete { key, .. } => batch.deletions.push(key),
        }
    }
    batch
}
