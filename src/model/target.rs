//! Collection target: what one run collects and how much of it

use serde::{Deserialize, Serialize};

/// The three collection modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlMode {
    /// Keyword search
    Search,
    /// Explicit item identifiers or URLs
    Detail,
    /// Creator timelines
    Creator,
}

impl CrawlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Detail => "detail",
            Self::Creator => "creator",
        }
    }
}

impl std::fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering requested from search endpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    General,
    MostLiked,
    Latest,
}

/// Immutable description of one collection run
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionTarget {
    pub mode: CrawlMode,
    /// Keywords, item references or creator references depending on `mode`
    pub seeds: Vec<String>,
    pub max_items: usize,
    pub max_comments_per_item: usize,
    pub enable_comments: bool,
    pub enable_sub_comments: bool,
}

impl CollectionTarget {
    /// Checks the target can start a run at all
    pub fn validate(&self) -> Result<(), String> {
        if self.seeds.iter().all(|s| s.trim().is_empty()) {
            return Err(format!("no seeds given for {} mode", self.mode));
        }
        if self.max_items == 0 {
            return Err("max_items must be at least 1".to_string());
        }
        Ok(())
    }

    /// Seeds with surrounding whitespace removed and blanks dropped
    pub fn cleaned_seeds(&self) -> Vec<String> {
        self.seeds
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
