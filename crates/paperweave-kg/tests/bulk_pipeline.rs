//! Bulk matcher and citation builder over a small on-disk works snapshot.

use chrono::{Duration, TimeZone, Utc};
use paperweave_common::clock::ManualClock;
use paperweave_common::{EdgeKind, Paper};
use paperweave_db::{
    bulk_namespace, CheckpointStore, GraphStore, LibsqlGraphStore, MemoryGraphStore, PaperSnapshot, SyncBatch,
    CITATIONS,
};
use paperweave_kg::{BulkMatcher, CitationGraphBuilder, MatchScope, MatcherOptions};
use paperweave_test_utils::{openalex_work, write_gz_jsonl, WorkFixture};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;

const KEYS: [&str; 4] = ["2501.00001", "2501.00002", "2501.00003", "2501.00004"];

fn snapshot(key: &str, doi: Option<&str>, authors: &[&str]) -> PaperSnapshot {
    PaperSnapshot {
        paper: Paper {
            arxiv_id: key.to_string(),
            title: format!("Paper {key}"),
            abstract_text: String::new(),
            submitter: authors.first().map(|a| a.to_string()),
            journal_ref: None,
            doi: doi.map(str::to_string),
            license: None,
            update_date: Some(Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap()),
        },
        authors: authors.iter().map(|a| a.to_string()).collect(),
        categories: vec!["cs".to_string()],
    }
}

async fn seed(store: &dyn GraphStore) {
    let batch = SyncBatch {
        upserts: vec![
            snapshot(KEYS[0], Some("10.1000/a1"), &["Ada Lovelace"]),
            snapshot(KEYS[1], Some("10.1000/a2"), &["Alan Turing"]),
            snapshot(KEYS[2], Some("10.1000/a3"), &[]),
            snapshot(KEYS[3], None, &["Ada Lovelace"]),
        ],
        deletions: vec![],
    };
    store.commit_sync_batch(&batch).await.unwrap();
}

fn file_a() -> Vec<serde_json::Value> {
    vec![
        openalex_work(&WorkFixture::new("W1", "10.1000/A1").citing(&["W2", "W3", "W1", "W999"]).by(
            "Ada Lovelace",
            "A1",
            Some("I1"),
        )),
        openalex_work(&WorkFixture::new("W100", "10.9999/elsewhere").by("Unknown Person", "A9", Some("I9"))),
    ]
}

fn file_b() -> Vec<serde_json::Value> {
    vec![openalex_work(&WorkFixture::new("W2", "10.1000/a2").citing(&["W1"]).by("Alan Turing", "A2", Some("I2")))]
}

fn file_c() -> Vec<serde_json::Value> {
    vec![openalex_work(&WorkFixture::new("W3", "10.1000/a3").citing(&["W2"]))]
}

fn write_files(dir: &Path, a: bool, b: bool, c: bool) {
    if a {
        write_gz_jsonl(&dir.join("updated_date=2024-01-01/part_000.gz"), &file_a()).unwrap();
    }
    if b {
        write_gz_jsonl(&dir.join("updated_date=2024-01-01/part_001.gz"), &file_b()).unwrap();
    }
    if c {
        write_gz_jsonl(&dir.join("updated_date=2024-02-01/part_000.gz"), &file_c()).unwrap();
    }
}

fn checkpoints(store: Arc<dyn GraphStore>) -> CheckpointStore {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()));
    CheckpointStore::new(store, clock, Duration::days(7))
}

fn matcher(store: Arc<dyn GraphStore>, dir: &Path, workers: usize) -> BulkMatcher {
    let options = MatcherOptions {
        data_dir: dir.to_path_buf(),
        workers,
        flush_threshold: 1,
        ..MatcherOptions::default()
    };
    BulkMatcher::new(store.clone(), checkpoints(store), options)
}

#[tokio::test]
async fn test_full_match_enriches_papers_authors_and_organizations() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), true, true, true);
    let store = Arc::new(MemoryGraphStore::new());
    seed(store.as_ref()).await;

    let report = matcher(store.clone(), dir.path(), 2).run(MatchScope::Full).await.unwrap();

    assert!(report.success);
    assert_eq!(report.files_total, 3);
    assert_eq!(report.files_processed, 3);
    assert_eq!(report.records, 4);
    assert_eq!(report.matched, 3);
    assert_eq!(report.enrichment.papers_enriched, 3);

    let p1 = store.get_paper(KEYS[0]).await.unwrap().unwrap();
    let e = p1.enrichment.unwrap();
    assert_eq!(e.openalex_id, "W1");
    assert_eq!(e.referenced_works, vec!["W2", "W3", "W1", "W999"]);
    assert_eq!(e.topics, vec!["Machine learning", "Physics"]);
    assert!(store.get_paper(KEYS[3]).await.unwrap().unwrap().enrichment.is_none());

    let ada = store.author("Ada Lovelace").await.unwrap();
    assert_eq!(ada.openalex_id.as_deref(), Some("A1"));
    assert!(store.author("Unknown Person").await.is_none());
    assert!(store.organization("I1").await.is_some());
    assert_eq!(store.edge_targets(EdgeKind::AffiliatedWith, "Ada Lovelace").await.unwrap(), vec!["I1"]);
    assert_eq!(store.edge_targets(EdgeKind::AffiliatedWith, "Alan Turing").await.unwrap(), vec!["I2"]);

    let done = checkpoints(store.clone()).completed_files(&bulk_namespace("openalex")).await.unwrap();
    assert_eq!(done.len(), 3);
}

#[tokio::test]
async fn test_interrupted_run_resumes_to_the_same_matched_set() {
    let whole = tempfile::tempdir().unwrap();
    write_files(whole.path(), true, true, true);
    let uninterrupted = Arc::new(MemoryGraphStore::new());
    seed(uninterrupted.as_ref()).await;
    matcher(uninterrupted.clone(), whole.path(), 3).run(MatchScope::Full).await.unwrap();

    // First attempt only got through the first two files.
    let partial = tempfile::tempdir().unwrap();
    write_files(partial.path(), true, true, false);
    let resumed = Arc::new(MemoryGraphStore::new());
    seed(resumed.as_ref()).await;
    matcher(resumed.clone(), partial.path(), 1).run(MatchScope::Full).await.unwrap();

    write_files(partial.path(), false, false, true);
    let report = matcher(resumed.clone(), partial.path(), 1).run(MatchScope::Full).await.unwrap();
    assert_eq!(report.files_skipped, 2);
    assert_eq!(report.files_processed, 1);

    for key in KEYS {
        let a = uninterrupted.get_paper(key).await.unwrap().unwrap().enrichment;
        let b = resumed.get_paper(key).await.unwrap().unwrap().enrichment;
        assert_eq!(a, b, "enrichment differs for {key}");
    }
    assert_eq!(uninterrupted.all_edges().await, resumed.all_edges().await);
    assert_eq!(
        uninterrupted.stats().await.unwrap().organizations,
        resumed.stats().await.unwrap().organizations
    );
}

#[tokio::test]
async fn test_corrupt_file_fails_run_and_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), true, true, false);
    let broken = dir.path().join("updated_date=2024-02-01/part_000.gz");
    std::fs::create_dir_all(broken.parent().unwrap()).unwrap();
    std::fs::write(&broken, b"\x1f\x8b truncated").unwrap();

    let store = Arc::new(MemoryGraphStore::new());
    seed(store.as_ref()).await;

    let report = matcher(store.clone(), dir.path(), 2).run(MatchScope::Full).await.unwrap();
    assert!(!report.success);
    assert_eq!(report.files_failed, vec!["updated_date=2024-02-01/part_000.gz"]);
    assert_eq!(report.files_processed, 2);
    let done = checkpoints(store.clone()).completed_files(&bulk_namespace("openalex")).await.unwrap();
    assert!(!done.contains("updated_date=2024-02-01/part_000.gz"));

    write_files(dir.path(), false, false, true);
    let retry = matcher(store.clone(), dir.path(), 2).run(MatchScope::Full).await.unwrap();
    assert!(retry.success);
    assert_eq!(retry.files_skipped, 2);
    assert_eq!(retry.files_processed, 1);
    assert!(store.get_paper(KEYS[2]).await.unwrap().unwrap().enrichment.is_some());
}

#[tokio::test]
async fn test_sample_scope_is_bounded_and_leaves_no_markers() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), true, true, true);
    let store = Arc::new(MemoryGraphStore::new());
    seed(store.as_ref()).await;

    let report = matcher(store.clone(), dir.path(), 2)
        .run(MatchScope::Sample { files: 1, records: 1 })
        .await
        .unwrap();

    assert_eq!(report.files_processed, 1);
    assert_eq!(report.records, 1);
    assert_eq!(report.matched, 1);
    let done = checkpoints(store.clone()).completed_files(&bulk_namespace("openalex")).await.unwrap();
    assert!(done.is_empty());
}

async fn matched_store() -> Arc<MemoryGraphStore> {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), true, true, true);
    let store = Arc::new(MemoryGraphStore::new());
    seed(store.as_ref()).await;
    matcher(store.clone(), dir.path(), 2).run(MatchScope::Full).await.unwrap();
    store
}

fn cites(edges: Vec<(EdgeKind, String, String)>) -> Vec<(String, String)> {
    edges.into_iter().filter(|(k, _, _)| *k == EdgeKind::Cites).map(|(_, s, d)| (s, d)).collect()
}

#[tokio::test]
async fn test_citation_build_is_idempotent_without_self_edges() {
    let store = matched_store().await;
    let builder = CitationGraphBuilder::new(store.clone(), checkpoints(store.clone()), 2);

    let first = builder.run(false).await.unwrap();
    assert_eq!(first.papers_scanned, 3);
    assert_eq!(first.references_seen, 6);
    assert_eq!(first.references_resolved, 5);
    assert_eq!(first.edges_created, 4);
    let edges = cites(store.all_edges().await);
    assert_eq!(
        edges,
        vec![
            (KEYS[0].to_string(), KEYS[1].to_string()),
            (KEYS[0].to_string(), KEYS[2].to_string()),
            (KEYS[1].to_string(), KEYS[0].to_string()),
            (KEYS[2].to_string(), KEYS[1].to_string()),
        ]
    );

    // A completed pass resets the cursor, so this is a full second pass.
    let second = builder.run(false).await.unwrap();
    assert_eq!(second.resumed_from, None);
    assert_eq!(second.papers_scanned, 3);
    assert_eq!(second.edges_created, 0);
    assert_eq!(cites(store.all_edges().await), edges);
}

#[tokio::test]
async fn test_citation_build_resumes_after_cursor() {
    let store = matched_store().await;
    let cp = checkpoints(store.clone());
    cp.record_checkpoint(CITATIONS, cp.clock().now(), Default::default(), true, Some(KEYS[0].to_string()))
        .await
        .unwrap();
    let builder = CitationGraphBuilder::new(store.clone(), cp.clone(), 1);

    let report = builder.run(false).await.unwrap();
    assert_eq!(report.resumed_from.as_deref(), Some(KEYS[0]));
    assert_eq!(report.chunks, 2);
    assert_eq!(report.papers_scanned, 2);
    assert_eq!(report.edges_created, 2);
    assert!(store.edge_targets(EdgeKind::Cites, KEYS[0]).await.unwrap().is_empty());
    assert_eq!(cp.cursor(CITATIONS).await.unwrap(), None);

    let from_start = builder.run(true).await.unwrap();
    assert_eq!(from_start.papers_scanned, 3);
    assert_eq!(from_start.edges_created, 2);
}

#[tokio::test]
async fn test_bulk_phases_against_libsql() {
    let db_dir = tempfile::tempdir().unwrap();
    let corpus = tempfile::tempdir().unwrap();
    write_files(corpus.path(), true, true, true);
    let store: Arc<dyn GraphStore> =
        Arc::new(LibsqlGraphStore::open_local(db_dir.path().join("graph.db")).await.unwrap());
    seed(store.as_ref()).await;

    let report = matcher(store.clone(), corpus.path(), 2).run(MatchScope::Full).await.unwrap();
    assert_eq!(report.enrichment.papers_enriched, 3);
    let again = matcher(store.clone(), corpus.path(), 2).run(MatchScope::Full).await.unwrap();
    assert_eq!(again.files_skipped, 3);

    let builder = CitationGraphBuilder::new(store.clone(), checkpoints(store.clone()), 2);
    assert_eq!(builder.run(false).await.unwrap().edges_created, 4);
    assert_eq!(builder.run(true).await.unwrap().edges_created, 0);
    assert_eq!(
        store.edge_targets(EdgeKind::Cites, KEYS[0]).await.unwrap(),
        vec![KEYS[1].to_string(), KEYS[2].to_string()]
    );
    assert_eq!(store.stats().await.unwrap().edges.get(&EdgeKind::Cites), Some(&4));
}
