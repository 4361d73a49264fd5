//! Platform adapters
//!
//! Each supported platform implements `PlatformApi` on top of a
//! `SigningClient`. The crawl engine only ever talks to this trait, so the
//! pagination, comment and storage logic is shared across platforms.

pub mod douyin;
pub mod xhs;

use crate::client::ApiResult;
use crate::model::{Comment, Creator, Item, Platform, SortOrder};
use async_trait::async_trait;
use serde_json::Value;

pub use douyin::DouyinApi;
pub use xhs::XhsApi;

/// One page of a cursor-paginated listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub entries: Vec<T>,
    /// Continuation token for the next request; empty when none was given
    pub cursor: String,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(entries: Vec<T>, cursor: impl Into<String>, has_more: bool) -> Self {
        Self {
            entries,
            cursor: cursor.into(),
            has_more,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), "", false)
    }
}

/// Everything needed to address one item in follow-up calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ItemRef {
    pub item_id: String,
    /// Access token handed out with listings
    pub access_token: String,
    /// Where the token came from, e.g. `pc_search`
    pub access_source: String,
}

impl ItemRef {
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            ..Default::default()
        }
    }

    pub fn of(item: &Item) -> Self {
        Self {
            item_id: item.item_id.clone(),
            access_token: item.access_token.clone(),
            access_source: item.access_source.clone(),
        }
    }
}

/// A creator reference parsed from a seed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatorRef {
    /// Platform user id (Douyin: `sec_uid`)
    pub user_id: String,
    pub access_token: String,
}

/// Result of parsing an item seed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemSeed {
    Ref(ItemRef),
    /// Needs one redirect hop before it can be parsed
    ShortLink(String),
}

/// Remote operations the crawl engine needs from a platform
#[async_trait]
pub trait PlatformApi: Send + Sync {
    fn platform(&self) -> Platform;

    /// Cheap known-good call; `true` when the session is authenticated
    async fn probe(&self) -> bool;

    /// One page of keyword search results
    ///
    /// `cursor` is the token returned by the previous page, empty for the first.
    async fn search_page(
        &self,
        keyword: &str,
        page: u32,
        cursor: &str,
        sort: SortOrder,
    ) -> ApiResult<Page<Item>>;

    /// Full detail for one item; `None` when the item is gone or hidden
    async fn item_detail(&self, item: &ItemRef) -> ApiResult<Option<Item>>;

    /// One page of first-level comments
    async fn comment_page(&self, item: &ItemRef, cursor: &str) -> ApiResult<Page<Comment>>;

    /// One page of replies under `parent`
    async fn reply_page(
        &self,
        item: &ItemRef,
        parent: &Comment,
        cursor: &str,
    ) -> ApiResult<Page<Comment>>;

    async fn creator_profile(&self, creator: &CreatorRef) -> ApiResult<Option<Creator>>;

    /// One page of a creator's timeline
    async fn creator_items_page(&self, creator: &CreatorRef, cursor: &str) -> ApiResult<Page<Item>>;

    /// Follows one redirect hop of a short link
    async fn resolve_short_link(&self, url: &str) -> ApiResult<Option<String>>;

    /// Downloads an image or video
    async fn fetch_media(&self, url: &str) -> ApiResult<Vec<u8>>;

    fn parse_item_seed(&self, seed: &str) -> ApiResult<ItemSeed>;

    fn parse_creator_seed(&self, seed: &str) -> ApiResult<CreatorRef>;
}

/// Reads a counter that may be a number, a numeric string or a "1.2万" style string
pub(crate) fn parse_count(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => parse_count_str(s),
        _ => 0,
    }
}

fn parse_count_str(raw: &str) -> u64 {
    let s = raw.trim().trim_end_matches('+');
    let (digits, multiplier) = if let Some(rest) = s.strip_suffix('万').or_else(|| s.strip_suffix('w')) {
        (rest, 10_000.0)
    } else if let Some(rest) = s.strip_suffix('亿') {
        (rest, 100_000_000.0)
    } else {
        (s, 1.0)
    };
    digits
        .trim()
        .parse::<f64>()
        .map(|n| (n * multiplier).round().max(0.0) as u64)
        .unwrap_or(0)
}

/// String field, accepting numbers too
pub(crate) fn str_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// First entry of a `url_list` array under `key`
pub(crate) fn first_url(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.get("url_list"))
        .and_then(|list| list.get(0))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn bool_field(value: &Value, key: &str) -> bool {
    match value.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
}
