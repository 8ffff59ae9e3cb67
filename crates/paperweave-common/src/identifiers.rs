//! Identifier normalisation shared by the incremental and bulk pipelines.
//!
//! Both sides of a DOI match must go through [`normalize_doi`], otherwise
//! exact-key matching silently misses.

use crate::error::{PaperweaveError, Result};

const DOI_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

/// Strip resolver prefixes and lowercase. Returns `None` for anything that
/// is not a `10.` DOI.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let mut doi = raw.trim();
    for prefix in DOI_PREFIXES {
        if doi.len() >= prefix.len() && doi[..prefix.len()].eq_ignore_ascii_case(prefix) {
            doi = doi[prefix.len()..].trim_start();
            break;
        }
    }
    if doi.starts_with("10.") && doi.contains('/') {
        Some(doi.to_ascii_lowercase())
    } else {
        None
    }
}

/// Paper key from an OAI identifier: the last `:`-separated segment.
///
/// `oai:arXiv.org:2101.00001` -> `2101.00001`,
/// `oai:arXiv.org:hep-th/9901001` -> `hep-th/9901001`.
pub fn paper_key_from_oai(identifier: &str) -> Result<String> {
    let key = identifier.rsplit(':').next().unwrap_or("").trim();
    if key.is_empty() {
        return Err(PaperweaveError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(key.to_string())
}

/// Collapse runs of whitespace (including the newlines OAI titles carry) to single spaces.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_doi_strips_prefixes() {
        assert_eq!(normalize_doi("https://doi.org/10.1103/PhysRevD.76.013009").as_deref(),
                   Some("10.1103/physrevd.76.013009"));
        assert_eq!(normalize_doi("doi:10.1000/XYZ").as_deref(), Some("10.1000/xyz"));
        assert_eq!(normalize_doi("  DOI: 10.1000/abc ").as_deref(), Some("10.1000/abc"));
        assert_eq!(normalize_doi("10.1000/abc").as_deref(), Some("10.1000/abc"));
    }

    #[test]
    fn test_normalize_doi_rejects_non_dois() {
        assert_eq!(normalize_doi("http://arxiv.org/abs/2101.00001"), None);
        assert_eq!(normalize_doi(""), None);
        assert_eq!(normalize_doi("10.1000"), None);
    }

    #[test]
    fn test_paper_key_from_oai() {
        assert_eq!(paper_key_from_oai("oai:arXiv.org:2101.00001").unwrap(), "2101.00001");
        assert_eq!(paper_key_from_oai("oai:arXiv.org:hep-th/9901001").unwrap(), "hep-th/9901001");
        assert!(paper_key_from_oai("oai:arXiv.org:").is_err());
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Deep\n   learning  for\tphysics "), "Deep learning for physics");
    }
}
