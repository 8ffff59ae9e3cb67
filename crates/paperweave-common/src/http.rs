use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;
use crate::error::PaperweaveError;

/// An identified, allowlisted HTTP client for talking to public scholarly APIs.
///
/// Every request carries a `User-Agent` naming the project and a contact, as
/// the arXiv and OpenAlex usage policies ask. Requests to hosts outside the
/// allowlist are refused before they leave the process.
#[derive(Debug, Clone)]
pub struct PoliteClient {
    client: Client,
    allowlist: HashSet<String>,
    user_agent: String,
}

impl PoliteClient {
    /// Creates a client with the default allowlist of harvesting endpoints.
    pub fn new(contact: &str, timeout: Duration) -> Result<Self, PaperweaveError> {
        let domains = [
            "oaipmh.arxiv.org",  // arXiv OAI-PMH
            "export.arxiv.org",  // legacy arXiv OAI-PMH
            "arxiv.org",
            "api.openalex.org",  // OpenAlex
            "localhost",
            "127.0.0.1",
        ];
        let allowlist = domains.iter().map(|d| d.to_string()).collect();

        let user_agent = user_agent_for(contact);
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(user_agent.clone())
            .build()
            .map_err(|e| PaperweaveError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist, user_agent })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Validates if a URL is permitted under the current policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                // Exact match or subdomain of an allowed domain
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{}", allowed)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// GET request builder for an allowlisted URL.
    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, PaperweaveError> {
        if !self.is_allowed(url) {
            return Err(PaperweaveError::DomainNotAllowed(url.to_string()));
        }
        Ok(self.client.get(url))
    }
}

/// `PaperWeave/<version> (...; mailto:<contact>)`. A contact without `@` is passed through as-is.
pub fn user_agent_for(contact: &str) -> String {
    let contact = contact.trim();
    let contact_info = if contact.contains('@') {
        format!("mailto:{contact}")
    } else {
        contact.to_string()
    };
    format!(
        "PaperWeave/{} (https://github.com/paperweave/paperweave; {})",
        env!("CARGO_PKG_VERSION"),
        contact_info
    )
}
