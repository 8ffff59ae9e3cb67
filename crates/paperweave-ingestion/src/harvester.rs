//! Paginated, rate-limited, retrying OAI-PMH harvest.

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::HarvestError;
use crate::models::{OaiPage, RepositoryInfo};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::sources::oai_pmh::{parse_identify, parse_list_records};
use crate::sources::OaiEndpoint;

/// OAI-PMH `from`/`until` at day granularity.
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone)]
pub struct ProtocolHarvester {
    endpoint: Arc<dyn OaiEndpoint>,
    limiter: Arc<Mutex<RateLimiter>>,
    retry: RetryPolicy,
    metadata_prefix: String,
    set: Option<String>,
}

impl ProtocolHarvester {
    pub fn new(endpoint: Arc<dyn OaiEndpoint>, limiter: RateLimiter, retry: RetryPolicy) -> Self {
        Self {
            endpoint,
            limiter: Arc::new(Mutex::new(limiter)),
            retry,
            metadata_prefix: "oai_dc".to_string(),
            set: None,
        }
    }

    pub fn with_metadata_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metadata_prefix = prefix.into();
        self
    }

    pub fn with_set(mut self, set: Option<String>) -> Self {
        self.set = set;
        self
    }

    /// Start a harvest of everything modified in `[from, until]`.
    ///
    /// The session is finite and single-use; restarting after a failure is
    /// done by starting a new session from the last checkpoint.
    pub fn harvest(&self, from: DateTime<Utc>, until: Option<DateTime<Utc>>) -> HarvestSession {
        HarvestSession {
            harvester: self.clone(),
            from,
            until,
            token: None,
            finished: false,
            pages: 0,
        }
    }

    #[instrument(skip(self))]
    pub async fn identify(&self) -> Result<RepositoryInfo, HarvestError> {
        let params = vec![("verb", "Identify".to_string())];
        self.request(&params, parse_identify).await
    }

    /// One logical request: rate limited, retried per policy, parsed.
    async fn request<T>(
        &self,
        params: &[(&'static str, String)],
        parse: fn(&str) -> Result<T, HarvestError>,
    ) -> Result<T, HarvestError> {
        let mut failures: u32 = 0;
        let mut throttled: u32 = 0;

        loop {
            self.limiter.lock().await.acquire().await;

            let outcome = match self.endpoint.fetch(params).await {
                Ok(body) => parse(&body),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(HarvestError::RateLimited { retry_after }) => {
                    throttled += 1;
                    if throttled > self.retry.max_rate_limit_retries {
                        return Err(HarvestError::RetriesExhausted {
                            attempts: throttled,
                            last: "server kept rate limiting".to_string(),
                        });
                    }
                    let wait = self.retry.rate_limit_wait(retry_after);
                    warn!(throttled, wait_ms = wait.as_millis() as u64, "Rate limited by server, retrying same request");
                    tokio::time::sleep(wait).await;
                }
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if failures >= self.retry.max_attempts {
                        return Err(HarvestError::RetriesExhausted { attempts: failures, last: e.to_string() });
                    }
                    warn!(attempt = failures, max = self.retry.max_attempts, error = %e, "Transient harvest failure, backing off");
                    tokio::time::sleep(self.retry.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Pull-based iteration over the pages of one harvest.
pub struct HarvestSession {
    harvester: ProtocolHarvester,
    from: DateTime<Utc>,
    until: Option<DateTime<Utc>>,
    token: Option<String>,
    finished: bool,
    pages: usize,
}

impl HarvestSession {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("verb", "ListRecords".to_string())];
        match &self.token {
            Some(token) => params.push(("resumptionToken", token.clone())),
            None => {
                params.push(("metadataPrefix", self.harvester.metadata_prefix.clone()));
                params.push(("from", self.from.format(DATE_FORMAT).to_string()));
                if let Some(until) = self.until {
                    params.push(("until", until.format(DATE_FORMAT).to_string()));
                }
                if let Some(set) = &self.harvester.set {
                    params.push(("set", set.clone()));
                }
            }
        }
        params
    }

    /// Fetch the next page, or `None` once a page without a continuation token was returned.
    pub async fn next_page(&mut self) -> Result<Option<OaiPage>, HarvestError> {
        if self.finished {
            return Ok(None);
        }

        let params = self.params();
        let page = match self.harvester.request(&params, parse_list_records).await {
            Ok(page) => page,
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        };
        self.pages += 1;
        self.token = page.resumption_token.clone();
        if self.token.is_none() {
            self.finished = true;
        }

        debug!(
            page = self.pages,
            records = page.records.len(),
            dropped = page.dropped,
            more = self.token.is_some(),
            "Harvested page"
        );
        if self.finished {
            info!(pages = self.pages, "Harvest complete");
        }
        Ok(Some(page))
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    /// The remaining pages as a stream. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<OaiPage, HarvestError>> + Send {
        stream::unfold(self, |mut session| async move {
            match session.next_page().await {
                Ok(Some(page)) => Some((Ok(page), session)),
                Ok(None) => None,
                Err(e) => Some((Err(e), session)),
            }
        })
    }
}
