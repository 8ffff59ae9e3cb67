//! OpenAlex work records as they appear in the snapshot, and their mapping
//! onto enrichment batches.
//!
//! Only the fields the matcher uses are modelled; everything else in the
//! snapshot is ignored. Snapshot ids are full URLs
//! (`https://openalex.org/W2741809807`) and are stored in short form (`W2741809807`).

use paperweave_common::identifiers::{collapse_whitespace, normalize_doi};
use paperweave_common::{Enrichment, Organization};
use paperweave_db::{AuthorEnrichment, MatchedWork};
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;

/// Treat an explicit JSON `null` like a missing field.
fn nullable<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Work {
    pub id: String,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub cited_by_count: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub referenced_works: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub topics: Vec<Topic>,
    #[serde(default, deserialize_with = "nullable")]
    pub concepts: Vec<Concept>,
    #[serde(default, deserialize_with = "nullable")]
    pub authorships: Vec<Authorship>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Topic {
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Concept {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Authorship {
    #[serde(default)]
    pub author: Option<AuthorRef>,
    #[serde(default, deserialize_with = "nullable")]
    pub institutions: Vec<Institution>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub orcid: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Institution {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub ror: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub lineage: Vec<String>,
}

/// `https://openalex.org/W123` -> `W123`. Short ids pass through.
pub fn short_id(id: &str) -> Option<String> {
    let tail = id.trim().trim_end_matches('/').rsplit('/').next().unwrap_or("");
    (!tail.is_empty()).then(|| tail.to_string())
}

/// `https://orcid.org/0000-0002-1825-0097` -> `0000-0002-1825-0097`.
fn bare_orcid(orcid: &str) -> Option<String> {
    let bare = orcid.trim().rsplit('/').next().unwrap_or("").trim();
    (!bare.is_empty()).then(|| bare.to_string())
}

impl Work {
    /// The DOI used as matching key, normalised like stored paper DOIs.
    pub fn matching_doi(&self) -> Option<String> {
        self.doi.as_deref().and_then(normalize_doi)
    }

    /// Topic names plus concepts scoring at least `concept_min_score`, deduplicated.
    pub fn tags(&self, concept_min_score: f64) -> Vec<String> {
        let topics = self.topics.iter().filter_map(|t| t.display_name.as_deref());
        let concepts = self
            .concepts
            .iter()
            .filter(|c| c.score.unwrap_or(0.0) >= concept_min_score)
            .filter_map(|c| c.display_name.as_deref());

        let mut seen = HashSet::new();
        topics
            .chain(concepts)
            .map(collapse_whitespace)
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect()
    }

    /// Map a work whose DOI matched into the enrichment applied to storage,
    /// plus every institution it mentions.
    pub fn to_match(&self, doi: String, concept_min_score: f64) -> Option<(MatchedWork, Vec<Organization>)> {
        let openalex_id = short_id(&self.id)?;

        let mut organizations = Vec::new();
        let mut authors = Vec::new();
        for authorship in &self.authorships {
            let mut institution_ids = Vec::new();
            for institution in &authorship.institutions {
                let Some(id) = institution.id.as_deref().and_then(short_id) else {
                    continue;
                };
                institution_ids.push(id.clone());
                organizations.push(Organization {
                    openalex_id: id,
                    name: institution.display_name.as_deref().map(collapse_whitespace).unwrap_or_default(),
                    country_code: institution.country_code.clone(),
                    org_type: institution.kind.clone(),
                    ror: institution.ror.clone(),
                    lineage_ids: institution.lineage.iter().filter_map(|l| short_id(l)).collect(),
                });
            }

            let Some(author) = &authorship.author else { continue };
            let name = author.display_name.as_deref().map(collapse_whitespace).unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            authors.push(AuthorEnrichment {
                name,
                openalex_id: author.id.as_deref().and_then(short_id),
                orcid: author.orcid.as_deref().and_then(bare_orcid),
                institution_ids,
            });
        }

        let work = MatchedWork {
            doi,
            enrichment: Enrichment {
                openalex_id,
                cited_by_count: self.cited_by_count.unwrap_or(0),
                topics: self.tags(concept_min_score),
                referenced_works: self.referenced_works.iter().filter_map(|r| short_id(r)).collect(),
            },
            authors,
        };
        Some((work, organizations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperweave_test_utils::{openalex_work, WorkFixture};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_short_ids() {
        assert_eq!(short_id("https://openalex.org/W2741809807").as_deref(), Some("W2741809807"));
        assert_eq!(short_id("W42").as_deref(), Some("W42"));
        assert_eq!(short_id("https://openalex.org/"), None);
    }

    #[test]
    fn test_snapshot_work_maps_to_enrichment() {
        let fixture = WorkFixture::new("W1", "10.1000/ABC")
            .citing(&["W2", "W3"])
            .by("Ada Lovelace", "A1", Some("I7"))
            .by("Anonymous Coward", "A2", None);
        let work: Work = serde_json::from_value(openalex_work(&fixture)).unwrap();

        let doi = work.matching_doi().unwrap();
        assert_eq!(doi, "10.1000/abc");

        let (matched, orgs) = work.to_match(doi, 0.3).unwrap();
        assert_eq!(matched.enrichment.openalex_id, "W1");
        assert_eq!(matched.enrichment.referenced_works, vec!["W2", "W3"]);
        assert_eq!(matched.enrichment.topics, vec!["Machine learning", "Physics"]);
        assert_eq!(matched.authors.len(), 2);
        assert_eq!(matched.authors[0].openalex_id.as_deref(), Some("A1"));
        assert_eq!(matched.authors[0].institution_ids, vec!["I7"]);
        assert!(matched.authors[1].institution_ids.is_empty());

        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].openalex_id, "I7");
        assert_eq!(orgs[0].org_type.as_deref(), Some("education"));
        assert_eq!(orgs[0].lineage_ids, vec!["I7"]);
    }

    #[test]
    fn test_nulls_and_missing_fields_default() {
        let work: Work = serde_json::from_str(
            r#"{"id":"https://openalex.org/W9","doi":null,"referenced_works":null,"authorships":[{"author":null,"institutions":null}]}"#,
        )
        .unwrap();
        assert_eq!(work.matching_doi(), None);
        assert!(work.referenced_works.is_empty());
        let (matched, orgs) = work.to_match("10.1/x".into(), 0.3).unwrap();
        assert!(matched.authors.is_empty());
        assert!(orgs.is_empty());
        assert_eq!(matched.enrichment.cited_by_count, 0);
    }

    #[test]
    fn test_orcid_is_stored_bare() {
        assert_eq!(bare_orcid("https://orcid.org/0000-0002-1825-0097").as_deref(), Some("0000-0002-1825-0097"));
    }
}
