//! Bulk corpus discovery and streaming.
//!
//! Layout: `<data_dir>/<partition>/part_*.gz` (gzip JSON lines) or `*.jsonl`.
//! A file's id is its path relative to `data_dir`, with `/` separators, which
//! is what per-file completion markers are keyed on.

use flate2::read::MultiGzDecoder;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::MatchError;
use crate::openalex::Work;

/// Rough density of the works snapshot, used for size-based estimates.
pub const RECORDS_PER_MB: f64 = 461.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusFile {
    pub id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl CorpusFile {
    fn is_gzip(&self) -> bool {
        self.path.extension().is_some_and(|e| e == "gz")
    }
}

fn is_corpus_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    (name.starts_with("part_") && name.ends_with(".gz")) || name.ends_with(".jsonl")
}

fn relative_id(data_dir: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(data_dir).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn collect_files(data_dir: &Path, dir: &Path, out: &mut Vec<CorpusFile>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        if meta.is_file() && is_corpus_file(&path) {
            out.push(CorpusFile { id: relative_id(data_dir, &path), path, size_bytes: meta.len() });
        }
    }
    Ok(())
}

/// Every corpus file under `data_dir`, sorted by id. Looks one partition level deep.
pub fn discover(data_dir: &Path) -> Result<Vec<CorpusFile>, MatchError> {
    if !data_dir.is_dir() {
        return Err(MatchError::CorpusNotFound(data_dir.to_path_buf()));
    }
    let read_err = |source| MatchError::Read { file: data_dir.display().to_string(), source };

    let mut files = Vec::new();
    collect_files(data_dir, data_dir, &mut files).map_err(read_err)?;
    for entry in fs::read_dir(data_dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_dir() {
            collect_files(data_dir, &path, &mut files).map_err(read_err)?;
        }
    }
    files.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(files)
}

/// One chunk of parsed works plus the lines in it that failed to parse.
#[derive(Debug, Default)]
pub struct WorkChunk {
    pub works: Vec<Work>,
    pub malformed: u64,
}

fn open(file: &CorpusFile) -> std::io::Result<Box<dyn BufRead + Send>> {
    let raw = File::open(&file.path)?;
    let reader: Box<dyn Read + Send> =
        if file.is_gzip() { Box::new(MultiGzDecoder::new(raw)) } else { Box::new(raw) };
    Ok(Box::new(BufReader::with_capacity(1 << 20, reader)))
}

fn read_file(
    file: &CorpusFile,
    chunk_size: usize,
    limit: Option<u64>,
    tx: &mpsc::Sender<Result<WorkChunk, MatchError>>,
) -> Result<(), MatchError> {
    let read_err = |source| MatchError::Read { file: file.id.clone(), source };
    let reader = open(file).map_err(read_err)?;

    let mut chunk = WorkChunk::default();
    let mut read = 0u64;
    for line in reader.lines() {
        if limit.is_some_and(|l| read >= l) {
            break;
        }
        let line = line.map_err(read_err)?;
        if line.trim().is_empty() {
            continue;
        }
        read += 1;
        match serde_json::from_str::<Work>(&line) {
            Ok(work) => chunk.works.push(work),
            Err(e) => {
                debug!(file = %file.id, error = %e, "Skipping malformed work line");
                chunk.malformed += 1;
            }
        }
        if chunk.works.len() >= chunk_size {
            if tx.blocking_send(Ok(std::mem::take(&mut chunk))).is_err() {
                return Ok(());
            }
        }
    }
    if !chunk.works.is_empty() || chunk.malformed > 0 {
        let _ = tx.blocking_send(Ok(chunk));
    }
    Ok(())
}

/// Stream a file's works in chunks of at most `chunk_size`, reading on a
/// blocking thread. At most two chunks are buffered ahead of the consumer.
/// A read error arrives as the last item.
pub fn stream_works(
    file: CorpusFile,
    chunk_size: usize,
    limit: Option<u64>,
) -> mpsc::Receiver<Result<WorkChunk, MatchError>> {
    let (tx, rx) = mpsc::channel(2);
    let chunk_size = chunk_size.max(1);
    tokio::task::spawn_blocking(move || {
        if let Err(e) = read_file(&file, chunk_size, limit, &tx) {
            warn!(file = %file.id, error = %e, "Corpus file unreadable");
            let _ = tx.blocking_send(Err(e));
        }
    });
    rx
}

/// Size-based summary of the corpus, for planning a full run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorpusOverview {
    pub partitions: usize,
    pub files: usize,
    pub total_bytes: u64,
    pub estimated_records: u64,
    pub completed_files: usize,
}

impl CorpusOverview {
    pub fn total_gb(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    pub fn remaining_files(&self) -> usize {
        self.files.saturating_sub(self.completed_files)
    }
}

pub fn overview(files: &[CorpusFile], completed: &HashSet<String>) -> CorpusOverview {
    let partitions: HashSet<&str> = files
        .iter()
        .filter_map(|f| f.id.rsplit_once('/').map(|(dir, _)| dir))
        .collect();
    let total_bytes: u64 = files.iter().map(|f| f.size_bytes).sum();
    CorpusOverview {
        partitions: partitions.len(),
        files: files.len(),
        total_bytes,
        estimated_records: (total_bytes as f64 / (1024.0 * 1024.0) * RECORDS_PER_MB).round() as u64,
        completed_files: files.iter().filter(|f| completed.contains(&f.id)).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperweave_test_utils::{openalex_work, write_gz_jsonl, write_jsonl, WorkFixture};
    use pretty_assertions::assert_eq;

    fn works(n: usize) -> Vec<serde_json::Value> {
        (0..n).map(|i| openalex_work(&WorkFixture::new(&format!("W{i}"), &format!("10.1000/{i}")))).collect()
    }

    #[test]
    fn test_discover_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        write_gz_jsonl(&dir.path().join("updated_date=2024-02-01/part_000.gz"), &works(1)).unwrap();
        write_gz_jsonl(&dir.path().join("updated_date=2024-01-01/part_001.gz"), &works(1)).unwrap();
        write_gz_jsonl(&dir.path().join("updated_date=2024-01-01/part_000.gz"), &works(1)).unwrap();
        write_jsonl(&dir.path().join("extra.jsonl"), &works(1)).unwrap();
        fs::write(dir.path().join("updated_date=2024-01-01/manifest"), "{}").unwrap();

        let ids: Vec<String> = discover(dir.path()).unwrap().into_iter().map(|f| f.id).collect();
        assert_eq!(
            ids,
            vec![
                "extra.jsonl",
                "updated_date=2024-01-01/part_000.gz",
                "updated_date=2024-01-01/part_001.gz",
                "updated_date=2024-02-01/part_000.gz",
            ]
        );
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(discover(&dir.path().join("nope")), Err(MatchError::CorpusNotFound(_))));
    }

    #[tokio::test]
    async fn test_stream_chunks_and_counts_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p/part_000.gz");
        let mut records = works(5);
        records.insert(2, serde_json::json!({"no_id": true}));
        write_gz_jsonl(&path, &records).unwrap();
        let file = discover(dir.path()).unwrap().remove(0);

        let mut rx = stream_works(file, 2, None);
        let mut sizes = Vec::new();
        let mut malformed = 0;
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.unwrap();
            sizes.push(chunk.works.len());
            malformed += chunk.malformed;
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(malformed, 1);
    }

    #[tokio::test]
    async fn test_stream_honours_record_limit() {
        let dir = tempfile::tempdir().unwrap();
        write_jsonl(&dir.path().join("p/works.jsonl"), &works(10)).unwrap();
        let file = discover(dir.path()).unwrap().remove(0);

        let mut rx = stream_works(file, 100, Some(3));
        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.works.len(), 3);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_gzip_surfaces_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p/part_000.gz");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"definitely not gzip").unwrap();
        let file = discover(dir.path()).unwrap().remove(0);

        let mut rx = stream_works(file, 10, None);
        let err = rx.recv().await.unwrap().unwrap_err();
        assert!(err.is_file_local());
    }

    #[test]
    fn test_overview_estimates_from_size() {
        let files = vec![
            CorpusFile { id: "a/part_000.gz".into(), path: "a/part_000.gz".into(), size_bytes: 2 * 1024 * 1024 },
            CorpusFile { id: "b/part_000.gz".into(), path: "b/part_000.gz".into(), size_bytes: 1024 * 1024 },
        ];
        let done: HashSet<String> = ["a/part_000.gz".to_string()].into();
        let o = overview(&files, &done);
        assert_eq!(o.partitions, 2);
        assert_eq!(o.files, 2);
        assert_eq!(o.estimated_records, 1383);
        assert_eq!(o.completed_files, 1);
        assert_eq!(o.remaining_files(), 1);
    }
}
