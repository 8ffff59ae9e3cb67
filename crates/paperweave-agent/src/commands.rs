//! Command handlers behind the `paperweave` subcommands.

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use paperweave_common::clock::{Clock, SystemClock};
use paperweave_common::http::PoliteClient;
use paperweave_db::{bulk_namespace, CheckpointStore, GraphStore, LibsqlGraphStore, INCREMENTAL};
use paperweave_ingestion::sources::oai_pmh::HttpOaiEndpoint;
use paperweave_ingestion::{ProtocolHarvester, Scheduler, SyncOrchestrator};
use paperweave_kg::{discover, overview, BulkMatcher, CitationGraphBuilder, MatchScope};
use secrecy::ExposeSecret;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;

/// Shared handles every command works through.
pub struct App {
    config: Config,
    store: Arc<dyn GraphStore>,
    clock: Arc<dyn Clock>,
}

impl App {
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let db = &config.database;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store: Arc<dyn GraphStore> = if db.is_remote() {
            let token = db
                .auth_token
                .as_ref()
                .context("remote database configured without PAPERWEAVE_DB_AUTH_TOKEN")?;
            Arc::new(
                LibsqlGraphStore::open_remote(&db.url, token.expose_secret())
                    .await
                    .with_context(|| format!("connecting to {}", db.url))?
                    .with_clock(clock.clone()),
            )
        } else {
            Arc::new(
                LibsqlGraphStore::open_local(&db.url)
                    .await
                    .with_context(|| format!("opening {}", db.url))?
                    .with_clock(clock.clone()),
            )
        };
        info!("✅ Graph store connected.");
        Ok(Self { config, store, clock })
    }

    fn checkpoints(&self) -> CheckpointStore {
        CheckpointStore::new(self.store.clone(), self.clock.clone(), self.config.default_lookback())
    }

    fn harvester(&self) -> anyhow::Result<ProtocolHarvester> {
        let h = &self.config.harvester;
        let mut client = PoliteClient::new(&h.contact, self.config.request_timeout())?;
        let host = url::Url::parse(&h.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .with_context(|| format!("no host in {}", h.base_url))?;
        client.allow_domain(&host);

        let endpoint = Arc::new(HttpOaiEndpoint::new(client, h.base_url.clone()));
        Ok(ProtocolHarvester::new(endpoint, self.config.rate_limiter(), self.config.retry_policy())
            .with_metadata_prefix(h.metadata_prefix.clone())
            .with_set(h.set.clone()))
    }

    fn orchestrator(&self, until: Option<DateTime<Utc>>) -> anyhow::Result<SyncOrchestrator> {
        let mut options = self.config.sync_options();
        options.until = until;
        Ok(SyncOrchestrator::new(self.harvester()?, self.store.clone(), self.checkpoints(), options))
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    pub async fn sync(&self, until: Option<DateTime<Utc>>) -> anyhow::Result<()> {
        let report = self.orchestrator(until)?.run_once().await.context("incremental sync failed")?;
        print_json(&report)?;
        if !report.success {
            bail!("incremental sync finished with {} record errors", report.stats.errors);
        }
        Ok(())
    }

    pub async fn daemon(&self) -> anyhow::Result<()> {
        let schedule = self.config.daily_schedule()?;
        let job = Arc::new(self.orchestrator(None)?);
        let scheduler = Scheduler::new(schedule, job, self.clock.clone());
        info!(
            time = %self.config.schedule.time,
            timezone = %self.config.schedule.timezone,
            "⏰ Scheduler started; Ctrl-C to stop"
        );
        scheduler
            .run_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Could not listen for Ctrl-C; stopping");
                }
            })
            .await;
        Ok(())
    }

    pub async fn bulk_match(&self, full: bool) -> anyhow::Result<()> {
        let scope = if full {
            MatchScope::Full
        } else {
            MatchScope::Sample { files: self.config.bulk.sample_files, records: self.config.bulk.sample_records }
        };
        let matcher = BulkMatcher::new(self.store.clone(), self.checkpoints(), self.config.matcher_options());
        let report = matcher.run(scope).await.context("bulk match failed")?;
        print_json(&report)?;
        if !report.success {
            bail!("{} corpus files could not be read: {}", report.files_failed.len(), report.files_failed.join(", "));
        }
        Ok(())
    }

    pub async fn cite(&self, from_start: bool) -> anyhow::Result<()> {
        let builder = CitationGraphBuilder::new(self.store.clone(), self.checkpoints(), self.config.citations.chunk_size);
        let report = builder.run(from_start).await.context("citation build failed")?;
        print_json(&report)
    }

    pub async fn analyze(&self) -> anyhow::Result<()> {
        let files = discover(&self.config.bulk.data_dir)?;
        let completed = self
            .checkpoints()
            .completed_files(&bulk_namespace(&self.config.bulk.corpus_label))
            .await?;
        let summary = overview(&files, &completed);
        info!(
            files = summary.files,
            gb = summary.total_gb(),
            estimated_records = summary.estimated_records,
            remaining = summary.remaining_files(),
            "📚 Corpus overview"
        );
        print_json(&summary)
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        let stats = self.store.stats().await.context("storage unreachable")?;
        info!(papers = stats.papers, matched = stats.matched_papers, "✅ Storage reachable");
        let repository = self.harvester()?.identify().await.context("OAI-PMH Identify failed")?;
        info!(repository = %repository.repository_name, "✅ OAI-PMH endpoint reachable");
        print_json(&Ping { stats, repository })
    }

    pub async fn checkpoint(&self, namespace: Option<String>) -> anyhow::Result<()> {
        let namespace = namespace.unwrap_or_else(|| INCREMENTAL.to_string());
        let resolved = self.checkpoints().get_checkpoint(&namespace).await?;
        print_json(&NamedCheckpoint { namespace, checkpoint: resolved })
    }
}

#[derive(Serialize)]
struct Ping {
    stats: paperweave_db::GraphStats,
    repository: paperweave_ingestion::RepositoryInfo,
}

#[derive(Serialize)]
struct NamedCheckpoint {
    namespace: String,
    #[serde(flatten)]
    checkpoint: paperweave_db::ResolvedCheckpoint,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
