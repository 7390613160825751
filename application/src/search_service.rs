use domain::error::ClientError;
use domain::models::{normalize_search_response, SearchResult};
use infrastructure::backend_client::BackendClient;
use infrastructure::identity::{IdentityProvider, OidcClient};
use shared::utils::is_blank;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Blank query; nothing was sent.
    Ignored,
    Completed,
}

/// Drives the search view. Failures never reach the user: they are logged
/// and leave an empty result list behind.
pub struct SearchService<P = OidcClient> {
    backend: BackendClient<P>,
    top_k: usize,
    results: Vec<SearchResult>,
    last_query: Option<String>,
}

impl<P: IdentityProvider> SearchService<P> {
    pub fn new(backend: BackendClient<P>, top_k: usize) -> Self {
        Self {
            backend,
            top_k,
            results: Vec::new(),
            last_query: None,
        }
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    pub fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn set_top_k(&mut self, top_k: usize) {
        self.top_k = top_k;
    }

    pub async fn search(&mut self, query: &str) -> SearchOutcome {
        if is_blank(query) {
            return SearchOutcome::Ignored;
        }
        self.last_query = Some(query.to_string());

        let outcome = self
            .backend
            .search_similar(query, self.top_k)
            .await
            .and_then(normalize_search_response);

        self.results = match outcome {
            Ok(normalized) => {
                if normalized.skipped > 0 {
                    warn!("Skipped {} malformed search results", normalized.skipped);
                }
                normalized.results
            }
            Err(ClientError::MalformedResponseShape(reason)) => {
                warn!("Unexpected response format: {reason}");
                Vec::new()
            }
            Err(e) => {
                error!("Search failed: {e}");
                Vec::new()
            }
        };
        SearchOutcome::Completed
    }
}
