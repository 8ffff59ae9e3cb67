//! Bulk-corpus files in the OpenAlex snapshot layout.

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Minimal description of an OpenAlex work.
#[derive(Debug, Clone, Default)]
pub struct WorkFixture {
    pub id: String,
    pub doi: Option<String>,
    pub cited_by_count: i64,
    pub referenced_works: Vec<String>,
    /// `(author display name, author id, institution id)`
    pub authorships: Vec<(String, String, Option<String>)>,
}

impl WorkFixture {
    pub fn new(id: &str, doi: &str) -> Self {
        Self { id: id.to_string(), doi: Some(doi.to_string()), cited_by_count: 1, ..Default::default() }
    }

    pub fn citing(mut self, refs: &[&str]) -> Self {
        self.referenced_works = refs.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn by(mut self, name: &str, author_id: &str, institution: Option<&str>) -> Self {
        self.authorships.push((name.to_string(), author_id.to_string(), institution.map(str::to_string)));
        self
    }
}

/// Render a work the way the snapshot does: full URLs for ids and DOIs.
pub fn openalex_work(work: &WorkFixture) -> Value {
    let authorships: Vec<Value> = work
        .authorships
        .iter()
        .map(|(name, author_id, institution)| {
            let institutions: Vec<Value> = institution
                .iter()
                .map(|inst| {
                    json!({
                        "id": format!("https://openalex.org/{inst}"),
                        "display_name": format!("Institution {inst}"),
                        "ror": format!("https://ror.org/{}", inst.to_lowercase()),
                        "country_code": "US",
                        "type": "education",
                        "lineage": [format!("https://openalex.org/{inst}")],
                    })
                })
                .collect();
            json!({
                "author": {
                    "id": format!("https://openalex.org/{author_id}"),
                    "display_name": name,
                    "orcid": null,
                },
                "institutions": institutions,
            })
        })
        .collect();

    json!({
        "id": format!("https://openalex.org/{}", work.id),
        "doi": work.doi.as_ref().map(|d| format!("https://doi.org/{d}")),
        "title": format!("Work {}", work.id),
        "cited_by_count": work.cited_by_count,
        "referenced_works": work.referenced_works.iter().map(|r| format!("https://openalex.org/{r}")).collect::<Vec<_>>(),
        "topics": [{"id": "https://openalex.org/T1", "display_name": "Machine learning", "score": 0.9}],
        "concepts": [
            {"id": "https://openalex.org/C1", "display_name": "Physics", "score": 0.6},
            {"id": "https://openalex.org/C2", "display_name": "Philosophy", "score": 0.1},
        ],
        "authorships": authorships,
    })
}

/// Write one gzip-compressed JSON-lines file, creating parent directories.
pub fn write_gz_jsonl(path: &Path, records: &[Value]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut encoder = GzEncoder::new(fs::File::create(path)?, Compression::fast());
    for record in records {
        writeln!(encoder, "{}", serde_json::to_string(record)?)?;
    }
    encoder.finish()?;
    Ok(())
}

pub fn write_jsonl(path: &Path, records: &[Value]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    for record in records {
        writeln!(file, "{}", serde_json::to_string(record)?)?;
    }
    Ok(())
}
