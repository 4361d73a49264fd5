//! Collected content types
//!
//! This module defines the records the crawler produces:
//! - `Item`: one post, video or note
//! - `Comment`: a first-level comment or a nested reply
//! - `Creator`: a resolved creator profile
//! - `CollectionTarget`: the immutable description of one run
//!
//! Each record type can be projected into a flat `Record` (an ordered JSON
//! object) which is what the file-based sinks write out.

mod target;

pub use target::{CollectionTarget, CrawlMode, SortOrder};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A flat, ordered field map as written by the file sinks
pub type Record = Map<String, Value>;

/// Supported source platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Xiaohongshu notes
    Xhs,
    /// Douyin videos and image posts
    Douyin,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xhs => "xhs",
            Self::Douyin => "douyin",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial projection of a user embedded in items and comments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Author {
    pub user_id: String,
    /// Secondary identifier some platforms require for profile calls
    pub sec_uid: String,
    pub nickname: String,
    pub avatar: String,
}

/// One collected post, video or note
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item {
    pub item_id: String,
    /// Platform-specific kind, e.g. "video" or "normal"
    pub item_type: String,
    pub title: String,
    pub desc: String,
    /// Publish time in milliseconds since the epoch
    pub create_time: i64,
    pub author: Author,
    pub liked_count: u64,
    pub comment_count: u64,
    pub share_count: u64,
    pub collected_count: u64,
    pub ip_location: String,
    pub item_url: String,
    pub cover_url: String,
    pub image_urls: Vec<String>,
    /// At most one video or audio stream
    pub media_url: Option<String>,
    pub tags: Vec<String>,
    /// Search term that produced the item; empty outside search mode
    pub source_keyword: String,
    /// Access token the platform hands out with listings, needed for follow-up calls
    pub access_token: String,
    /// Listing the token was issued by, e.g. `pc_search` or `pc_feed`
    pub access_source: String,
    /// Listing entries may only carry a summary and need a detail fetch
    pub partial: bool,
}

impl Item {
    /// Projects the item into a flat record
    pub fn to_record(&self) -> Record {
        let value = json!({
            "item_id": self.item_id,
            "item_type": self.item_type,
            "title": self.title,
            "desc": self.desc,
            "create_time": self.create_time,
            "user_id": self.author.user_id,
            "sec_uid": self.author.sec_uid,
            "nickname": self.author.nickname,
            "avatar": self.author.avatar,
            "liked_count": self.liked_count,
            "collected_count": self.collected_count,
            "comment_count": self.comment_count,
            "share_count": self.share_count,
            "ip_location": self.ip_location,
            "item_url": self.item_url,
            "cover_url": self.cover_url,
            "media_url": self.media_url.clone().unwrap_or_default(),
            "image_urls": self.image_urls.join(","),
            "tags": self.tags.join(","),
            "source_keyword": self.source_keyword,
            "last_modify_ts": Utc::now().timestamp_millis(),
        });
        into_record(value)
    }

    /// Summary of the item attached to its comment records
    pub fn context(&self) -> ItemContext {
        ItemContext {
            title: self.title.clone(),
            url: self.item_url.clone(),
            author: self.author.nickname.clone(),
            liked_count: self.liked_count,
            comment_count: self.comment_count,
        }
    }
}

/// Owning-item details copied onto each comment record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemContext {
    pub title: String,
    pub url: String,
    pub author: String,
    pub liked_count: u64,
    pub comment_count: u64,
}

/// A first-level comment or a reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comment {
    pub comment_id: String,
    /// Identifier of the item the comment belongs to
    pub item_id: String,
    /// Empty for first-level comments
    pub parent_comment_id: String,
    pub author: Author,
    pub content: String,
    /// Milliseconds since the epoch
    pub create_time: i64,
    pub ip_location: String,
    pub like_count: u64,
    pub sub_comment_count: u64,
    pub pictures: Vec<String>,

    // Pagination state for replies; never persisted
    pub has_more_replies: bool,
    pub reply_cursor: String,
    pub inline_replies: Vec<Comment>,
}

impl Comment {
    pub fn is_first_level(&self) -> bool {
        self.parent_comment_id.is_empty() || self.parent_comment_id == "0"
    }

    /// Projects the comment into a flat record, enriched with item context
    pub fn to_record(&self, context: Option<&ItemContext>) -> Record {
        let context = context.cloned().unwrap_or_default();
        let parent = if self.is_first_level() {
            "0".to_string()
        } else {
            self.parent_comment_id.clone()
        };
        let value = json!({
            "comment_id": self.comment_id,
            "item_id": self.item_id,
            "parent_comment_id": parent,
            "content": self.content,
            "create_time": self.create_time,
            "ip_location": self.ip_location,
            "like_count": self.like_count,
            "sub_comment_count": self.sub_comment_count,
            "user_id": self.author.user_id,
            "sec_uid": self.author.sec_uid,
            "nickname": self.author.nickname,
            "avatar": self.author.avatar,
            "pictures": self.pictures.join(","),
            "item_title": context.title,
            "item_url": context.url,
            "item_author": context.author,
            "item_liked_count": context.liked_count,
            "item_comment_count": context.comment_count,
            "last_modify_ts": Utc::now().timestamp_millis(),
        });
        into_record(value)
    }
}

/// A resolved creator profile
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Creator {
    pub user_id: String,
    pub nickname: String,
    pub gender: String,
    pub avatar: String,
    pub desc: String,
    pub ip_location: String,
    pub follows: u64,
    pub fans: u64,
    pub interaction: u64,
    pub item_count: u64,
    pub tags: Vec<String>,
}

impl Creator {
    pub fn to_record(&self) -> Record {
        let value = json!({
            "user_id": self.user_id,
            "nickname": self.nickname,
            "gender": self.gender,
            "avatar": self.avatar,
            "desc": self.desc,
            "ip_location": self.ip_location,
            "follows": self.follows,
            "fans": self.fans,
            "interaction": self.interaction,
            "item_count": self.item_count,
            "tags": self.tags.join(","),
            "last_modify_ts": Utc::now().timestamp_millis(),
        });
        into_record(value)
    }
}

fn into_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
