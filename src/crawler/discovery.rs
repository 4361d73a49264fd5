//! Link-discovery fallback
//!
//! When API search is unavailable, a `LinkSource` (for example a browser
//! that browses search results) produces item URLs or ids for a keyword.
//! `Coordinator::run_discovered` feeds them into detail collection.

use async_trait::async_trait;
use std::collections::HashMap;

/// Produces ordered item references for a keyword
#[async_trait]
pub trait LinkSource: Send + Sync {
    /// At most `limit` item URLs or identifiers, in discovery order
    async fn discover(&self, keyword: &str, limit: usize) -> crate::Result<Vec<String>>;
}

/// A fixed keyword → links table
#[derive(Debug, Clone, Default)]
pub struct StaticLinkSource {
    links: HashMap<String, Vec<String>>,
}

impl StaticLinkSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, keyword: impl Into<String>, links: Vec<String>) -> Self {
        self.links.insert(keyword.into(), links);
        self
    }
}

#[async_trait]
impl LinkSource for StaticLinkSource {
    async fn discover(&self, keyword: &str, limit: usize) -> crate::Result<Vec<String>> {
        Ok(self
            .links
            .get(keyword)
            .map(|links| links.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
