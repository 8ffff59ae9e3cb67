//! Remote metadata endpoints.

pub mod oai_pmh;

use async_trait::async_trait;
use crate::error::HarvestError;

/// A single OAI-PMH request/response exchange.
///
/// Implementations perform exactly one request and classify failures; rate
/// limiting, retries and pagination live in the harvester.
#[async_trait]
pub trait OaiEndpoint: Send + Sync {
    /// Issue one request with the given query parameters and return the body.
    async fn fetch(&self, params: &[(&'static str, String)]) -> Result<String, HarvestError>;
}
