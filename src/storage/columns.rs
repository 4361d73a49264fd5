//! Preferred column order per content kind
//!
//! File exports write these columns first, followed by any extra fields the
//! record carries. The database backends use the same lists as their table
//! columns.

use crate::model::Record;
use crate::storage::traits::ContentKind;

pub const CONTENT_COLUMNS: &[&str] = &[
    "item_id",
    "title",
    "desc",
    "create_time",
    "user_id",
    "sec_uid",
    "nickname",
    "avatar",
    "liked_count",
    "comment_count",
    "share_count",
    "collected_count",
    "item_type",
    "item_url",
    "cover_url",
    "media_url",
    "image_urls",
    "tags",
    "source_keyword",
    "ip_location",
    "last_modify_ts",
];

pub const COMMENT_COLUMNS: &[&str] = &[
    "item_title",
    "item_url",
    "content",
    "comment_id",
    "create_time",
    "ip_location",
    "like_count",
    "sub_comment_count",
    "parent_comment_id",
    "nickname",
    "user_id",
    "sec_uid",
    "avatar",
    "item_id",
    "item_author",
    "item_liked_count",
    "item_comment_count",
    "pictures",
    "last_modify_ts",
];

pub const CREATOR_COLUMNS: &[&str] = &[
    "user_id",
    "nickname",
    "gender",
    "avatar",
    "desc",
    "ip_location",
    "follows",
    "fans",
    "interaction",
    "item_count",
    "tags",
    "last_modify_ts",
];

/// Preferred columns for a kind
pub fn preferred_columns(kind: ContentKind) -> &'static [&'static str] {
    match kind {
        ContentKind::Contents => CONTENT_COLUMNS,
        ContentKind::Comments => COMMENT_COLUMNS,
        ContentKind::Creators => CREATOR_COLUMNS,
    }
}

/// Primary key column for a kind
pub fn key_column(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Contents => "item_id",
        ContentKind::Comments => "comment_id",
        ContentKind::Creators => "user_id",
    }
}

/// Field names of `record` in output order
///
/// Preferred columns present on the record come first in their fixed order,
/// then the remaining fields in the order the record holds them.
pub fn ordered_fields(record: &Record, kind: ContentKind) -> Vec<String> {
    let preferred = preferred_columns(kind);
    let mut fields: Vec<String> = preferred
        .iter()
        .filter(|c| record.contains_key(**c))
        .map(|c| c.to_string())
        .collect();
    fields.extend(
        record
            .keys()
            .filter(|k| !preferred.contains(&k.as_str()))
            .cloned(),
    );
    fields
}
