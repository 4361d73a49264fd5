//! Douyin adapter
//!
//! All calls are signed GETs against `www.douyin.com`. The signature is the
//! `a_bogus` query parameter, computed on the page from the full query string
//! and the browser's user agent. Responses carry `status_code`/`status_msg`
//! at the top level; an empty body is how the API answers a flagged session.

use crate::client::{
    query_pairs, ApiDialect, ApiError, ApiRequest, ApiResult, SessionState, SignatureSet,
    SignerProfile, SigningClient,
};
use crate::model::{Author, Comment, Creator, Item, Platform, SortOrder};
use crate::platform::{
    bool_field, first_url, parse_count, str_field, CreatorRef, ItemRef, ItemSeed, Page,
    PlatformApi,
};
use async_trait::async_trait;
use regex::Regex;
use reqwest::RequestBuilder;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use url::Url;

pub const API_HOST: &str = "https://www.douyin.com";

const SEARCH_PAGE_SIZE: u32 = 10;
const COMMENT_PAGE_SIZE: u32 = 20;
const CREATOR_PAGE_SIZE: u32 = 18;

/// The signing function the browser page exposes
pub const SIGNER_PROFILE: SignerProfile = SignerProfile {
    function: "window.__douyin_sign",
    storage_key: Some("xmst"),
};

/// Query-parameter signature and `status_code` envelope
pub struct DouyinDialect;

impl ApiDialect for DouyinDialect {
    fn cookie_domain(&self) -> &str {
        "douyin.com"
    }

    fn default_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Origin", API_HOST.to_string()),
            ("Referer", format!("{}/", API_HOST)),
        ]
    }

    fn common_query(&self, session: &SessionState) -> Vec<(String, String)> {
        let mut query = query_pairs(&[
            ("device_platform", "webapp"),
            ("aid", "6383"),
            ("channel", "channel_pc_web"),
            ("version_code", "190600"),
            ("version_name", "19.6.0"),
            ("update_version_code", "170400"),
            ("pc_client_type", "1"),
            ("cookie_enabled", "true"),
            ("browser_language", "zh-CN"),
            ("browser_platform", "MacIntel"),
            ("browser_name", "Chrome"),
            ("browser_version", "125.0.0.0"),
            ("browser_online", "true"),
            ("engine_name", "Blink"),
            ("os_name", "Mac OS"),
            ("os_version", "10.15.7"),
            ("platform", "PC"),
            ("screen_width", "1920"),
            ("screen_height", "1080"),
        ]);
        if let Some(webid) = session.cookie("webid") {
            query.push(("webid".to_string(), webid.to_string()));
        }
        if let Some(token) = session.cookie("msToken") {
            query.push(("msToken".to_string(), token.to_string()));
        }
        query
    }

    fn session_fragment(&self, session: &SessionState) -> String {
        session.user_agent().to_string()
    }

    fn attach_signature(&self, request: RequestBuilder, signature: &SignatureSet) -> RequestBuilder {
        request.query(&[("a_bogus", signature.signature.as_str())])
    }

    fn unwrap_envelope(&self, body: &str) -> ApiResult<Value> {
        if body.trim().is_empty() {
            return Err(ApiError::blocked("empty response body"));
        }

        let payload: Value = serde_json::from_str(body)
            .map_err(|e| ApiError::malformed(format!("response is not JSON: {}", e)))?;

        match payload.get("status_code").and_then(Value::as_i64) {
            None | Some(0) => Ok(payload),
            Some(code) => {
                let message = str_field(&payload, "status_msg");
                Err(ApiError::data_fetch(format!("status {}: {}", code, message)))
            }
        }
    }
}

/// Douyin implementation of `PlatformApi`
pub struct DouyinApi {
    client: Arc<SigningClient>,
}

impl DouyinApi {
    pub fn new(client: Arc<SigningClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<SigningClient> {
        &self.client
    }
}

#[async_trait]
impl PlatformApi for DouyinApi {
    fn platform(&self) -> Platform {
        Platform::Douyin
    }

    async fn probe(&self) -> bool {
        let session = self.client.session().await;
        if session.cookie("LOGIN_STATUS") == Some("1") {
            return true;
        }
        tracing::info!("Probing douyin session");
        match self.search_page("抖音", 1, "", SortOrder::General).await {
            Ok(page) => !page.entries.is_empty(),
            Err(e) => {
                tracing::error!("douyin session check failed: {}", e);
                false
            }
        }
    }

    async fn search_page(
        &self,
        keyword: &str,
        page: u32,
        cursor: &str,
        sort: SortOrder,
    ) -> ApiResult<Page<Item>> {
        let offset = page.saturating_sub(1) * SEARCH_PAGE_SIZE;
        let sort_type = match sort {
            SortOrder::General => "0",
            SortOrder::MostLiked => "1",
            SortOrder::Latest => "2",
        };
        let filtered = if sort == SortOrder::General { "0" } else { "1" };
        let offset = offset.to_string();
        let count = SEARCH_PAGE_SIZE.to_string();

        let query = query_pairs(&[
            ("search_channel", "aweme_general"),
            ("enable_history", "1"),
            ("keyword", keyword),
            ("search_source", "normal_search"),
            ("query_correct_type", "1"),
            ("is_filter_search", filtered),
            ("sort_type", sort_type),
            ("publish_time", "0"),
            ("offset", offset.as_str()),
            ("count", count.as_str()),
            ("search_id", cursor),
        ]);
        let data = self
            .client
            .execute(ApiRequest::get("/aweme/v1/web/general/search/single/", query))
            .await?;

        parse_search_page(&data)
    }

    async fn item_detail(&self, item: &ItemRef) -> ApiResult<Option<Item>> {
        let query = query_pairs(&[("aweme_id", item.item_id.as_str())]);
        let data = self
            .client
            .execute(ApiRequest::get("/aweme/v1/web/aweme/detail/", query))
            .await?;

        Ok(data
            .get("aweme_detail")
            .filter(|v| v.is_object())
            .map(parse_aweme))
    }

    async fn comment_page(&self, item: &ItemRef, cursor: &str) -> ApiResult<Page<Comment>> {
        let count = COMMENT_PAGE_SIZE.to_string();
        let query = query_pairs(&[
            ("aweme_id", item.item_id.as_str()),
            ("cursor", non_empty_cursor(cursor)),
            ("count", count.as_str()),
            ("item_type", "0"),
        ]);
        let data = self
            .client
            .execute(ApiRequest::get("/aweme/v1/web/comment/list/", query))
            .await?;

        parse_comment_page(&data)
    }

    async fn reply_page(
        &self,
        item: &ItemRef,
        parent: &Comment,
        cursor: &str,
    ) -> ApiResult<Page<Comment>> {
        let count = COMMENT_PAGE_SIZE.to_string();
        let query = query_pairs(&[
            ("item_id", item.item_id.as_str()),
            ("comment_id", parent.comment_id.as_str()),
            ("cursor", non_empty_cursor(cursor)),
            ("count", count.as_str()),
            ("item_type", "0"),
        ]);
        let data = self
            .client
            .execute(ApiRequest::get("/aweme/v1/web/comment/list/reply/", query))
            .await?;

        parse_comment_page(&data)
    }

    async fn creator_profile(&self, creator: &CreatorRef) -> ApiResult<Option<Creator>> {
        let query = query_pairs(&[
            ("sec_user_id", creator.user_id.as_str()),
            ("publish_video_strategy_type", "2"),
            ("personal_center_strategy", "1"),
        ]);
        let data = self
            .client
            .execute(ApiRequest::get("/aweme/v1/web/user/profile/other/", query))
            .await?;

        Ok(data
            .get("user")
            .filter(|v| v.is_object())
            .map(|user| parse_creator(user, &creator.user_id)))
    }

    async fn creator_items_page(&self, creator: &CreatorRef, cursor: &str) -> ApiResult<Page<Item>> {
        let count = CREATOR_PAGE_SIZE.to_string();
        let query = query_pairs(&[
            ("sec_user_id", creator.user_id.as_str()),
            ("count", count.as_str()),
            ("max_cursor", non_empty_cursor(cursor)),
            ("locate_query", "false"),
            ("publish_video_strategy_type", "2"),
        ]);
        let data = self
            .client
            .execute(ApiRequest::get("/aweme/v1/web/aweme/post/", query))
            .await?;

        parse_creator_posts(&data)
    }

    async fn resolve_short_link(&self, url: &str) -> ApiResult<Option<String>> {
        self.client.resolve_redirect(url).await
    }

    async fn fetch_media(&self, url: &str) -> ApiResult<Vec<u8>> {
        self.client.fetch_bytes(url).await
    }

    fn parse_item_seed(&self, seed: &str) -> ApiResult<ItemSeed> {
        parse_item_seed(seed)
    }

    fn parse_creator_seed(&self, seed: &str) -> ApiResult<CreatorRef> {
        parse_creator_seed(seed)
    }
}

fn non_empty_cursor(cursor: &str) -> &str {
    if cursor.is_empty() {
        "0"
    } else {
        cursor
    }
}

fn aweme_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{15,21}$").ok()).as_ref()
}

fn is_aweme_id(s: &str) -> bool {
    aweme_id_pattern().is_some_and(|re| re.is_match(s))
}

fn parse_item_seed(seed: &str) -> ApiResult<ItemSeed> {
    let seed = seed.trim();
    if is_aweme_id(seed) {
        return Ok(ItemSeed::Ref(ItemRef::new(seed)));
    }

    let url = Url::parse(seed).map_err(|_| ApiError::Parse(format!("not a video id or URL: {}", seed)))?;
    let host = url.host_str().unwrap_or_default();
    if host == "v.douyin.com" {
        return Ok(ItemSeed::ShortLink(seed.to_string()));
    }
    if !host.ends_with("douyin.com") && !host.ends_with("iesdouyin.com") {
        return Err(ApiError::Parse(format!("not a douyin URL: {}", seed)));
    }

    if let Some((_, modal)) = url.query_pairs().find(|(k, _)| k == "modal_id") {
        if is_aweme_id(&modal) {
            return Ok(ItemSeed::Ref(ItemRef::new(modal.into_owned())));
        }
    }

    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    let id = segments
        .windows(2)
        .find(|pair| matches!(pair[0], "video" | "note") && is_aweme_id(pair[1]))
        .map(|pair| pair[1]);

    match id {
        Some(id) => Ok(ItemSeed::Ref(ItemRef::new(id))),
        None => Err(ApiError::Parse(format!("no video id in {}", seed))),
    }
}

fn parse_creator_seed(seed: &str) -> ApiResult<CreatorRef> {
    let seed = seed.trim();
    if seed.starts_with("MS4w") && !seed.contains('/') {
        return Ok(CreatorRef {
            user_id: seed.to_string(),
            access_token: String::new(),
        });
    }

    let url = Url::parse(seed).map_err(|_| ApiError::Parse(format!("not a creator id or URL: {}", seed)))?;
    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    match segments.as_slice() {
        ["user", id, ..] if !id.is_empty() => Ok(CreatorRef {
            user_id: id.to_string(),
            access_token: String::new(),
        }),
        _ => Err(ApiError::Parse(format!("no sec_uid in {}", seed))),
    }
}

fn parse_author(user: Option<&Value>) -> Author {
    let Some(user) = user else {
        return Author::default();
    };
    Author {
        user_id: str_field(user, "uid"),
        sec_uid: str_field(user, "sec_uid"),
        nickname: str_field(user, "nickname"),
        avatar: first_url(user, "avatar_thumb"),
    }
}

/// Parses a full aweme object
pub(crate) fn parse_aweme(aweme: &Value) -> Item {
    let aweme_id = str_field(aweme, "aweme_id");
    let stats = aweme.get("statistics").cloned().unwrap_or(Value::Null);
    let desc = str_field(aweme, "desc");

    let image_urls: Vec<String> = aweme
        .get("images")
        .and_then(Value::as_array)
        .map(|images| {
            images
                .iter()
                .filter_map(|img| img.get("url_list").and_then(|l| l.get(0)).and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let video = aweme.get("video").cloned().unwrap_or(Value::Null);
    let media_url = if image_urls.is_empty() {
        Some(first_url(&video, "play_addr")).filter(|u| !u.is_empty())
    } else {
        None
    };
    let item_type = if image_urls.is_empty() { "video" } else { "note" };

    Item {
        item_url: format!("https://www.douyin.com/video/{}", aweme_id),
        item_id: aweme_id,
        item_type: item_type.to_string(),
        title: desc.chars().take(1024).collect(),
        desc,
        create_time: aweme.get("create_time").and_then(Value::as_i64).unwrap_or(0) * 1000,
        author: parse_author(aweme.get("author")),
        liked_count: parse_count(stats.get("digg_count")),
        comment_count: parse_count(stats.get("comment_count")),
        share_count: parse_count(stats.get("share_count")),
        collected_count: parse_count(stats.get("collect_count")),
        ip_location: str_field(aweme, "ip_label"),
        cover_url: first_url(&video, "cover"),
        image_urls,
        media_url,
        tags: aweme
            .get("text_extra")
            .and_then(Value::as_array)
            .map(|extras| {
                extras
                    .iter()
                    .map(|e| str_field(e, "hashtag_name"))
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
        source_keyword: String::new(),
        access_token: String::new(),
        access_source: String::new(),
        partial: false,
    }
}

pub(crate) fn parse_search_page(data: &Value) -> ApiResult<Page<Item>> {
    let entries = data
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::malformed("search response has no data"))?;

    let items = entries
        .iter()
        .filter_map(|entry| {
            entry
                .get("aweme_info")
                .filter(|v| v.is_object())
                .or_else(|| entry.pointer("/aweme_mix_info/mix_items/0"))
        })
        .map(parse_aweme)
        .filter(|item| !item.item_id.is_empty())
        .collect();

    let cursor = data
        .pointer("/extra/logid")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(Page::new(items, cursor, bool_field(data, "has_more")))
}

pub(crate) fn parse_comment(value: &Value) -> Comment {
    let reply_id = str_field(value, "reply_id");
    let replies = parse_count(value.get("reply_comment_total"));

    Comment {
        comment_id: str_field(value, "cid"),
        item_id: str_field(value, "aweme_id"),
        parent_comment_id: if reply_id == "0" { String::new() } else { reply_id },
        author: parse_author(value.get("user")),
        content: str_field(value, "text"),
        create_time: value.get("create_time").and_then(Value::as_i64).unwrap_or(0) * 1000,
        ip_location: str_field(value, "ip_label"),
        like_count: parse_count(value.get("digg_count")),
        sub_comment_count: replies,
        pictures: value
            .get("image_list")
            .and_then(Value::as_array)
            .map(|images| {
                images
                    .iter()
                    .map(|img| first_url(img, "origin_url"))
                    .filter(|u| !u.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
        has_more_replies: replies > 0,
        reply_cursor: String::new(),
        inline_replies: Vec::new(),
    }
}

pub(crate) fn parse_comment_page(data: &Value) -> ApiResult<Page<Comment>> {
    // A null list is how the API reports the last page
    let comments = match data.get("comments") {
        Some(Value::Array(list)) => list.iter().map(parse_comment).collect(),
        Some(Value::Null) => Vec::new(),
        _ => return Err(ApiError::malformed("comment response has no comments")),
    };

    Ok(Page::new(comments, str_field(data, "cursor"), bool_field(data, "has_more")))
}

pub(crate) fn parse_creator_posts(data: &Value) -> ApiResult<Page<Item>> {
    let list = data
        .get("aweme_list")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::malformed("creator response has no aweme_list"))?;

    // Timeline entries are refreshed through the detail endpoint
    let items = list
        .iter()
        .map(|aweme| Item {
            partial: true,
            ..parse_aweme(aweme)
        })
        .filter(|item| !item.item_id.is_empty())
        .collect();

    Ok(Page::new(items, str_field(data, "max_cursor"), bool_field(data, "has_more")))
}

pub(crate) fn parse_creator(user: &Value, sec_uid: &str) -> Creator {
    Creator {
        user_id: sec_uid.to_string(),
        nickname: str_field(user, "nickname"),
        gender: match user.get("gender").and_then(Value::as_i64) {
            Some(1) => "male".to_string(),
            Some(2) => "female".to_string(),
            _ => String::new(),
        },
        avatar: first_url(user, "avatar_300x300"),
        desc: str_field(user, "signature"),
        ip_location: str_field(user, "ip_location"),
        follows: parse_count(user.get("following_count")),
        fans: parse_count(user.get("follower_count")),
        interaction: parse_count(user.get("total_favorited")),
        item_count: parse_count(user.get("aweme_count")),
        tags: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_body_is_block() {
        assert!(DouyinDialect.unwrap_envelope("   ").unwrap_err().is_block());
    }

    #[test]
    fn test_status_code_failure() {
        let err = DouyinDialect
            .unwrap_envelope(r#"{"status_code":8,"status_msg":"bad"}"#)
            .unwrap_err();
        assert!(matches!(err, ApiError::DataFetch { .. }));
    }

    #[test]
    fn test_status_code_success_returns_body() {
        let payload = DouyinDialect
            .unwrap_envelope(r#"{"status_code":0,"aweme_detail":{"aweme_id":"1"}}"#)
            .unwrap();
        assert_eq!(payload["aweme_detail"]["aweme_id"], "1");
    }

    #[test]
    fn test_search_page_reads_mix_items() {
        let data = json!({
            "has_more": 1,
            "extra": {"logid": "LOG1"},
            "data": [
                {"aweme_info": {"aweme_id": "7100000000000000001", "desc": "cat",
                                "statistics": {"digg_count": 5},
                                "video": {"play_addr": {"url_list": ["https://v/1.mp4"]}}}},
                {"aweme_mix_info": {"mix_items": [{"aweme_id": "7100000000000000002", "desc": "mix"}]}},
                {"card_unique_name": "ad"}
            ]
        });

        let page = parse_search_page(&data).unwrap();
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.cursor, "LOG1");
        assert!(page.has_more);
        assert_eq!(page.entries[0].liked_count, 5);
        assert_eq!(page.entries[0].media_url.as_deref(), Some("https://v/1.mp4"));
        assert_eq!(page.entries[1].item_id, "7100000000000000002");
    }

    #[test]
    fn test_comment_parsing() {
        let data = json!({
            "cursor": 20,
            "has_more": 0,
            "comments": [{
                "cid": "c1", "aweme_id": "a1", "text": "nice", "reply_id": "0",
                "create_time": 1700000000, "digg_count": 2, "reply_comment_total": 3,
                "user": {"uid": "u1", "sec_uid": "MS4wA", "nickname": "amy",
                         "avatar_thumb": {"url_list": ["https://a/1.jpg"]}}
            }]
        });

        let page = parse_comment_page(&data).unwrap();
        assert_eq!(page.cursor, "20");
        assert!(!page.has_more);
        let comment = &page.entries[0];
        assert!(comment.is_first_level());
        assert!(comment.has_more_replies);
        assert_eq!(comment.create_time, 1_700_000_000_000);
        assert_eq!(comment.author.sec_uid, "MS4wA");
    }

    #[test]
    fn test_null_comment_list_is_last_page() {
        let page = parse_comment_page(&json!({"comments": null, "has_more": 0})).unwrap();
        assert!(page.entries.is_empty());
    }

    #[test]
    fn test_item_seed_forms() {
        assert_eq!(
            parse_item_seed("7300000000000000001").unwrap(),
            ItemSeed::Ref(ItemRef::new("7300000000000000001"))
        );
        assert_eq!(
            parse_item_seed("https://www.douyin.com/video/7300000000000000001").unwrap(),
            ItemSeed::Ref(ItemRef::new("7300000000000000001"))
        );
        assert_eq!(
            parse_item_seed("https://www.douyin.com/discover?modal_id=7300000000000000002").unwrap(),
            ItemSeed::Ref(ItemRef::new("7300000000000000002"))
        );
        assert!(matches!(
            parse_item_seed("https://v.douyin.com/iRNBho6u/").unwrap(),
            ItemSeed::ShortLink(_)
        ));
        assert!(parse_item_seed("https://www.douyin.com/user/abc").is_err());
    }

    #[test]
    fn test_creator_seed_forms() {
        assert_eq!(
            parse_creator_seed("https://www.douyin.com/user/MS4wLjABAAAA?from=share")
                .unwrap()
                .user_id,
            "MS4wLjABAAAA"
        );
        assert_eq!(parse_creator_seed("MS4wLjABAAAB").unwrap().user_id, "MS4wLjABAAAB");
        assert!(parse_creator_seed("nobody").is_err());
    }

    #[test]
    fn test_creator_posts_are_partial() {
        let data = json!({"has_more": true, "max_cursor": 1700, "aweme_list": [{"aweme_id": "7300000000000000001"}]});
        let page = parse_creator_posts(&data).unwrap();
        assert!(page.entries[0].partial);
        assert_eq!(page.cursor, "1700");
    }
}
