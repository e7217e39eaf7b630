//! Client Reconciliation Layer: the caller-side half of the engine.

pub mod api;
pub mod optimistic;
pub mod reconcile;
pub mod session;

use std::time::Duration;

pub use api::{ApiClient, CommentsApi};
pub use optimistic::{OptimisticLedger, Ticket};
pub use reconcile::{Mutation, MutationResult, Reconciler};
pub use session::{SessionContext, StaticSession};

use crate::models::CommentOrdering;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_REFRESH_SECS: u64 = 30;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Service root including the `/api` prefix.
    pub base_url: String,
    /// Comments fetched per thread load.
    pub page_size: u32,
    pub ordering: CommentOrdering,
    pub refresh_interval: Duration,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            ordering: CommentOrdering::default(),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_SECS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = ClientConfig::new("http://comments.local/api")
            .with_page_size(10)
            .with_refresh_interval(Duration::from_secs(5));

        assert_eq!(config.base_url, "http://comments.local/api");
        assert_eq!(config.page_size, 10);
        assert_eq!(config.refresh_interval, Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }
}
