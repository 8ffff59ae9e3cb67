//! Scripted OAI-PMH endpoint shared by the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use paperweave_ingestion::sources::OaiEndpoint;
use paperweave_ingestion::HarvestError;
use paperweave_test_utils::oai_error;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

/// Replays canned responses in order and records every request.
/// Once the script runs out it answers `noRecordsMatch`.
#[derive(Default)]
pub struct ScriptedEndpoint {
    script: Mutex<VecDeque<Result<String, HarvestError>>>,
    requests: Mutex<Vec<(Instant, Vec<(String, String)>)>>,
}

impl ScriptedEndpoint {
    pub fn new(script: Vec<Result<String, HarvestError>>) -> Self {
        Self { script: Mutex::new(script.into()), requests: Mutex::new(Vec::new()) }
    }

    pub fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn request_params(&self) -> Vec<Vec<(String, String)>> {
        self.requests.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl OaiEndpoint for ScriptedEndpoint {
    async fn fetch(&self, params: &[(&'static str, String)]) -> Result<String, HarvestError> {
        self.requests.lock().unwrap().push((
            Instant::now(),
            params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        ));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(oai_error("noRecordsMatch", "script exhausted")))
    }
}

pub fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}
