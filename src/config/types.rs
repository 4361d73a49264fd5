use crate::filter::FilterMode;
use crate::model::{CollectionTarget, CrawlMode, Platform, SortOrder};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub seeds: SeedConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

impl Config {
    /// Seeds that apply to the configured mode
    pub fn seeds_for_mode(&self) -> &[String] {
        match self.crawler.mode {
            CrawlMode::Search => &self.seeds.keywords,
            CrawlMode::Detail => &self.seeds.items,
            CrawlMode::Creator => &self.seeds.creators,
        }
    }

    /// Builds the immutable collection target for one run
    pub fn collection_target(&self) -> CollectionTarget {
        CollectionTarget {
            mode: self.crawler.mode,
            seeds: self.seeds_for_mode().to_vec(),
            max_items: self.crawler.max_items,
            max_comments_per_item: self.crawler.max_comments_per_item,
            enable_comments: self.crawler.enable_comments,
            enable_sub_comments: self.crawler.enable_sub_comments,
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    pub platform: Platform,

    pub mode: CrawlMode,

    /// Maximum items per keyword (search) or per creator (creator)
    #[serde(rename = "max-items", default = "default_max_items")]
    pub max_items: usize,

    #[serde(rename = "max-comments-per-item", default = "default_max_comments")]
    pub max_comments_per_item: usize,

    #[serde(rename = "enable-comments", default = "default_true")]
    pub enable_comments: bool,

    #[serde(rename = "enable-sub-comments", default)]
    pub enable_sub_comments: bool,

    /// Download item images and videos alongside the records
    #[serde(rename = "enable-media", default)]
    pub enable_media: bool,

    /// Courtesy delay between page requests (seconds)
    #[serde(rename = "crawl-interval-secs", default = "default_interval")]
    pub crawl_interval_secs: f64,

    /// Simultaneous item-detail or comment pipelines
    #[serde(rename = "max-concurrency", default = "default_concurrency")]
    pub max_concurrency: usize,

    /// First search page to request
    #[serde(rename = "start-page", default = "default_start_page")]
    pub start_page: u32,

    #[serde(default)]
    pub sort: SortOrder,
}

impl CrawlerConfig {
    pub fn crawl_interval(&self) -> Duration {
        Duration::from_secs_f64(self.crawl_interval_secs.max(0.0))
    }
}

/// Seed lists, one per mode
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedConfig {
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Item identifiers, URLs or short links
    #[serde(default)]
    pub items: Vec<String>,

    /// Creator identifiers or profile URLs
    #[serde(default)]
    pub creators: Vec<String>,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
    /// Delimited text, one file per content type
    #[default]
    Csv,
    /// Structured document, one JSON array per content type
    Json,
    /// Embedded database file
    Sqlite,
    /// Relational database server
    Mysql,
}

impl SaveFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
        }
    }

    /// Whether records go to flat files rather than a database
    pub fn is_file_based(&self) -> bool {
        matches!(self, Self::Csv | Self::Json)
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: SaveFormat,

    /// Directory for file exports and downloaded media
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,

    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: PathBuf,

    /// Connection URL for the relational backend
    #[serde(rename = "database-url", default)]
    pub database_url: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: SaveFormat::default(),
            directory: default_output_dir(),
            database_path: default_database_path(),
            database_url: None,
        }
    }
}

/// Signing client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Per-request HTTP timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout")]
    pub timeout_secs: u64,

    /// Attempts at invoking the page signing function
    #[serde(rename = "sign-retries", default = "default_retries")]
    pub sign_retries: u32,

    #[serde(rename = "sign-retry-delay-ms", default = "default_retry_delay")]
    pub sign_retry_delay_ms: u64,

    /// Attempts for transport-level failures
    #[serde(rename = "transport-retries", default = "default_retries")]
    pub transport_retries: u32,

    #[serde(rename = "transport-retry-delay-ms", default = "default_retry_delay")]
    pub transport_retry_delay_ms: u64,

    /// Overrides the user agent read from the browser page
    #[serde(rename = "user-agent", default)]
    pub user_agent: Option<String>,
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sign_retry_delay(&self) -> Duration {
        Duration::from_millis(self.sign_retry_delay_ms)
    }

    pub fn transport_retry_delay(&self) -> Duration {
        Duration::from_millis(self.transport_retry_delay_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            sign_retries: default_retries(),
            sign_retry_delay_ms: default_retry_delay(),
            transport_retries: default_retries(),
            transport_retry_delay_ms: default_retry_delay(),
            user_agent: None,
        }
    }
}

/// Browser controller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub headless: bool,

    /// Persistent profile directory so the login survives restarts
    #[serde(rename = "user-data-dir", default = "default_user_data_dir")]
    pub user_data_dir: PathBuf,

    /// Explicit Chrome/Chromium executable
    #[serde(default)]
    pub executable: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            user_data_dir: default_user_data_dir(),
            executable: None,
        }
    }
}

/// Post-collection comment filter
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Filter the run's comment file once collection finishes
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub mode: FilterMode,

    /// Added to the built-in reply keywords
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Added to the built-in spam markers
    #[serde(rename = "exclude-keywords", default)]
    pub exclude_keywords: Vec<String>,

    /// A comment needs more likes than this to count as popular
    #[serde(rename = "min-likes", default = "default_min_likes")]
    pub min_likes: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: FilterMode::default(),
            keywords: Vec::new(),
            exclude_keywords: Vec::new(),
            min_likes: default_min_likes(),
        }
    }
}

fn default_min_likes() -> u64 {
    10
}

fn default_max_items() -> usize {
    20
}

fn default_max_comments() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_interval() -> f64 {
    2.0
}

fn default_concurrency() -> usize {
    1
}

fn default_start_page() -> u32 {
    1
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/harvest.db")
}

fn default_timeout() -> u64 {
    60
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_user_data_dir() -> PathBuf {
    PathBuf::from("browser_data")
}
