//! Xiaohongshu (xhs) adapter
//!
//! Notes are listed by signed POST/GET calls against the `edith` API host.
//! Listings (search results, creator timelines) only carry a note summary,
//! so every listed note is marked partial and completed with a detail call.
//! Creator profiles are read from the `window.__INITIAL_STATE__` blob embedded
//! in the profile page.

use crate::client::{
    query_pairs, ApiDialect, ApiError, ApiRequest, ApiResult, SessionState, SignatureSet,
    SignerProfile, SigningClient,
};
use crate::model::{Author, Comment, Creator, Item, Platform, SortOrder};
use crate::platform::{
    bool_field, parse_count, str_field, CreatorRef, ItemRef, ItemSeed, Page, PlatformApi,
};
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use reqwest::RequestBuilder;
use scraper::{Html, Selector};
use serde_json::{json, Map, Value};
use std::sync::{Arc, OnceLock};
use url::Url;

pub const API_HOST: &str = "https://edith.xiaohongshu.com";
pub const WEB_HOST: &str = "https://www.xiaohongshu.com";

/// Envelope code meaning the address or device has been blocked
const BLOCK_CODE: i64 = 300012;

const SEARCH_PAGE_SIZE: u32 = 20;
const CREATOR_PAGE_SIZE: u32 = 30;
const REPLY_PAGE_SIZE: u32 = 10;
const IMAGE_FORMATS: &str = "jpg,webp,avif";

/// The signing function the browser page exposes
pub const SIGNER_PROFILE: SignerProfile = SignerProfile {
    function: "window._webmsxyw",
    storage_key: Some("b1"),
};

/// Header signature and `{success, code, msg, data}` envelope
pub struct XhsDialect;

impl ApiDialect for XhsDialect {
    fn cookie_domain(&self) -> &str {
        "xiaohongshu.com"
    }

    fn default_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Origin", WEB_HOST.to_string()),
            ("Referer", format!("{}/", WEB_HOST)),
            ("Accept", "application/json, text/plain, */*".to_string()),
        ]
    }

    fn session_fragment(&self, session: &SessionState) -> String {
        session.cookie("a1").unwrap_or_default().to_string()
    }

    fn attach_signature(&self, request: RequestBuilder, signature: &SignatureSet) -> RequestBuilder {
        let mut request = request
            .header("X-S", &signature.signature)
            .header("X-T", &signature.timestamp)
            .header("X-B3-Traceid", &signature.trace_id);
        if !signature.common.is_empty() {
            request = request.header("x-S-Common", &signature.common);
        }
        request
    }

    fn unwrap_envelope(&self, body: &str) -> ApiResult<Value> {
        let envelope: Value = serde_json::from_str(body)
            .map_err(|e| ApiError::malformed(format!("envelope is not JSON: {}", e)))?;

        if bool_field(&envelope, "success") {
            return Ok(envelope
                .get("data")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())));
        }

        let message = str_field(&envelope, "msg");
        match envelope.get("code").and_then(Value::as_i64) {
            Some(BLOCK_CODE) => Err(ApiError::blocked(if message.is_empty() {
                "network connection flagged (300012)".to_string()
            } else {
                message
            })),
            _ => Err(ApiError::data_fetch(message)),
        }
    }
}

/// Xiaohongshu implementation of `PlatformApi`
pub struct XhsApi {
    client: Arc<SigningClient>,
}

impl XhsApi {
    pub fn new(client: Arc<SigningClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<SigningClient> {
        &self.client
    }

    /// Fallback detail source: the note page's embedded state
    async fn detail_from_html(&self, item: &ItemRef, source: &str) -> ApiResult<Option<Item>> {
        let url = format!(
            "{}/explore/{}?xsec_token={}&xsec_source={}",
            WEB_HOST, item.item_id, item.access_token, source
        );
        let html = self.client.fetch_text(&url).await?;
        let state = initial_state(&html)?;
        let note = state
            .pointer(&format!("/note/noteDetailMap/{}/note", item.item_id))
            .filter(|v| v.is_object())
            .map(snake_case_keys);

        Ok(note.map(|note| parse_note_card(&note, &item.access_token, source)))
    }
}

#[async_trait]
impl PlatformApi for XhsApi {
    fn platform(&self) -> Platform {
        Platform::Xhs
    }

    async fn probe(&self) -> bool {
        tracing::info!("Probing xhs session");
        match self.search_page("小红书", 1, "", SortOrder::General).await {
            Ok(page) => !page.entries.is_empty(),
            Err(e) => {
                tracing::error!("xhs session check failed: {}", e);
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
        // The search id stays fixed across all pages of one keyword
        let search_id = if cursor.is_empty() {
            new_search_id()
        } else {
            cursor.to_string()
        };

        let body = json!({
            "keyword": keyword,
            "page": page,
            "page_size": SEARCH_PAGE_SIZE,
            "search_id": search_id,
            "sort": sort_value(sort),
            "note_type": 0,
        });
        let data = self
            .client
            .execute(ApiRequest::post("/api/sns/web/v1/search/notes", body))
            .await?;

        parse_search_page(&data, &search_id)
    }

    async fn item_detail(&self, item: &ItemRef) -> ApiResult<Option<Item>> {
        let source = if item.access_source.is_empty() {
            "pc_search"
        } else {
            item.access_source.as_str()
        };

        let body = json!({
            "source_note_id": item.item_id,
            "image_formats": ["jpg", "webp", "avif"],
            "extra": {"need_body_topic": 1},
            "xsec_source": source,
            "xsec_token": item.access_token,
        });
        let data = self
            .client
            .execute(ApiRequest::post("/api/sns/web/v1/feed", body))
            .await?;

        match data.pointer("/items/0/note_card") {
            Some(card) => Ok(Some(parse_note_card(card, &item.access_token, source))),
            None => {
                tracing::warn!(
                    "Empty feed for note {}, falling back to the note page",
                    item.item_id
                );
                self.detail_from_html(item, source).await
            }
        }
    }

    async fn comment_page(&self, item: &ItemRef, cursor: &str) -> ApiResult<Page<Comment>> {
        let query = query_pairs(&[
            ("note_id", item.item_id.as_str()),
            ("cursor", cursor),
            ("top_comment_id", ""),
            ("image_formats", IMAGE_FORMATS),
            ("xsec_token", item.access_token.as_str()),
        ]);
        let data = self
            .client
            .execute(ApiRequest::get("/api/sns/web/v2/comment/page", query))
            .await?;

        parse_comment_page(&data, "")
    }

    async fn reply_page(
        &self,
        item: &ItemRef,
        parent: &Comment,
        cursor: &str,
    ) -> ApiResult<Page<Comment>> {
        let num = REPLY_PAGE_SIZE.to_string();
        let query = query_pairs(&[
            ("note_id", item.item_id.as_str()),
            ("root_comment_id", parent.comment_id.as_str()),
            ("num", num.as_str()),
            ("cursor", cursor),
            ("image_formats", IMAGE_FORMATS),
            ("top_comment_id", ""),
            ("xsec_token", item.access_token.as_str()),
        ]);
        let data = self
            .client
            .execute(ApiRequest::get("/api/sns/web/v2/comment/sub/page", query))
            .await?;

        parse_comment_page(&data, &parent.comment_id)
    }

    async fn creator_profile(&self, creator: &CreatorRef) -> ApiResult<Option<Creator>> {
        let mut url = format!("{}/user/profile/{}", WEB_HOST, creator.user_id);
        if !creator.access_token.is_empty() {
            url = format!("{}?xsec_token={}&xsec_source=pc_feed", url, creator.access_token);
        }
        let html = self.client.fetch_text(&url).await?;
        let state = initial_state(&html)?;
        Ok(parse_creator(&state, &creator.user_id))
    }

    async fn creator_items_page(&self, creator: &CreatorRef, cursor: &str) -> ApiResult<Page<Item>> {
        let num = CREATOR_PAGE_SIZE.to_string();
        let query = query_pairs(&[
            ("user_id", creator.user_id.as_str()),
            ("cursor", cursor),
            ("num", num.as_str()),
            ("image_formats", IMAGE_FORMATS),
        ]);
        let data = self
            .client
            .execute(ApiRequest::get("/api/sns/web/v1/user_posted", query))
            .await?;

        parse_creator_notes(&data)
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

fn sort_value(sort: SortOrder) -> &'static str {
    match sort {
        SortOrder::General => "general",
        SortOrder::MostLiked => "popularity_descending",
        SortOrder::Latest => "time_descending",
    }
}

/// Base36 of `(millis << 64) + entropy`
fn new_search_id() -> String {
    let now = Utc::now();
    let millis = now.timestamp_millis().max(0) as u128;
    let entropy = (now.timestamp_subsec_nanos() as u128 * 2_654_435_761) % 2_147_483_646;
    to_base36((millis << 64) + entropy)
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Note and user ids are 24 hex characters
fn is_bare_id(seed: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[0-9a-fA-F]{24}$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(seed))
}

fn parse_item_seed(seed: &str) -> ApiResult<ItemSeed> {
    let seed = seed.trim();
    if is_bare_id(seed) {
        return Ok(ItemSeed::Ref(ItemRef::new(seed)));
    }

    let url = Url::parse(seed).map_err(|_| ApiError::Parse(format!("not a note id or URL: {}", seed)))?;
    let host = url.host_str().unwrap_or_default();
    if host.ends_with("xhslink.com") {
        return Ok(ItemSeed::ShortLink(seed.to_string()));
    }
    if !host.ends_with("xiaohongshu.com") {
        return Err(ApiError::Parse(format!("not a xiaohongshu URL: {}", seed)));
    }

    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    let item_id = match segments.as_slice() {
        ["explore", id, ..] => *id,
        ["discovery", "item", id, ..] => *id,
        _ => return Err(ApiError::Parse(format!("no note id in {}", seed))),
    };
    if item_id.is_empty() {
        return Err(ApiError::Parse(format!("no note id in {}", seed)));
    }

    let query = |key: &str| {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default()
    };

    Ok(ItemSeed::Ref(ItemRef {
        item_id: item_id.to_string(),
        access_token: query("xsec_token"),
        access_source: query("xsec_source"),
    }))
}

fn parse_creator_seed(seed: &str) -> ApiResult<CreatorRef> {
    let seed = seed.trim();
    if is_bare_id(seed) {
        return Ok(CreatorRef {
            user_id: seed.to_string(),
            access_token: String::new(),
        });
    }

    let url = Url::parse(seed).map_err(|_| ApiError::Parse(format!("not a creator id or URL: {}", seed)))?;
    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    match segments.as_slice() {
        ["user", "profile", id, ..] if !id.is_empty() => Ok(CreatorRef {
            user_id: id.to_string(),
            access_token: url
                .query_pairs()
                .find(|(k, _)| k == "xsec_token")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default(),
        }),
        _ => Err(ApiError::Parse(format!("no creator id in {}", seed))),
    }
}

/// Extracts `window.__INITIAL_STATE__` from a page
fn initial_state(html: &str) -> ApiResult<Value> {
    const PREFIX: &str = "window.__INITIAL_STATE__=";

    let document = Html::parse_document(html);
    let selector = Selector::parse("script")
        .map_err(|e| ApiError::malformed(format!("script selector: {:?}", e)))?;

    let raw = document
        .select(&selector)
        .map(|script| script.text().collect::<String>())
        .find_map(|text| text.trim().strip_prefix(PREFIX).map(str::to_string))
        .ok_or_else(|| ApiError::malformed("page has no initial state"))?;

    // The blob is a JS literal; `undefined` is its only non-JSON token
    let json_text = raw.trim().trim_end_matches(';').replace("undefined", "\"\"");
    serde_json::from_str(&json_text)
        .map_err(|e| ApiError::malformed(format!("initial state is not JSON: {}", e)))
}

/// Recursively renames camelCase keys to snake_case
fn snake_case_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (to_snake_case(k), snake_case_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(snake_case_keys).collect()),
        other => other.clone(),
    }
}

fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn note_url(note_id: &str, token: &str, source: &str) -> String {
    format!(
        "{}/explore/{}?xsec_token={}&xsec_source={}",
        WEB_HOST, note_id, token, source
    )
}

fn parse_author(user: Option<&Value>, avatar_key: &str) -> Author {
    let Some(user) = user else {
        return Author::default();
    };
    Author {
        user_id: str_field(user, "user_id"),
        sec_uid: String::new(),
        nickname: {
            let nickname = str_field(user, "nickname");
            if nickname.is_empty() {
                str_field(user, "nick_name")
            } else {
                nickname
            }
        },
        avatar: str_field(user, avatar_key),
    }
}

fn image_url(image: &Value) -> String {
    let url = str_field(image, "url_default");
    if url.is_empty() {
        str_field(image, "url")
    } else {
        url
    }
}

fn video_url(card: &Value) -> Option<String> {
    let video = card.get("video")?;
    let origin_key = video
        .pointer("/consumer/origin_video_key")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !origin_key.is_empty() {
        return Some(format!("http://sns-video-bd.xhscdn.com/{}", origin_key));
    }
    video
        .pointer("/media/stream/h264")
        .and_then(Value::as_array)
        .and_then(|streams| streams.iter().map(|s| str_field(s, "master_url")).find(|u| !u.is_empty()))
}

/// Parses a full `note_card` from the feed endpoint
pub(crate) fn parse_note_card(card: &Value, token: &str, source: &str) -> Item {
    let note_id = {
        let id = str_field(card, "note_id");
        if id.is_empty() {
            str_field(card, "id")
        } else {
            id
        }
    };
    let desc = str_field(card, "desc");
    let title = {
        let title = str_field(card, "title");
        if title.is_empty() {
            desc.chars().take(255).collect()
        } else {
            title
        }
    };
    let interact = card.get("interact_info").cloned().unwrap_or(Value::Null);

    let image_urls: Vec<String> = card
        .get("image_list")
        .and_then(Value::as_array)
        .map(|images| images.iter().map(image_url).filter(|u| !u.is_empty()).collect())
        .unwrap_or_default();
    let tags = card
        .get("tag_list")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().map(|t| str_field(t, "name")).filter(|n| !n.is_empty()).collect())
        .unwrap_or_default();

    let item_type = str_field(card, "type");
    let media_url = if item_type == "video" { video_url(card) } else { None };
    let token = {
        let own = str_field(card, "xsec_token");
        if own.is_empty() {
            token.to_string()
        } else {
            own
        }
    };

    Item {
        item_url: note_url(&note_id, &token, source),
        item_id: note_id,
        item_type,
        title,
        desc,
        create_time: card.get("time").and_then(Value::as_i64).unwrap_or(0),
        author: parse_author(card.get("user"), "avatar"),
        liked_count: parse_count(interact.get("liked_count")),
        comment_count: parse_count(interact.get("comment_count")),
        share_count: parse_count(interact.get("share_count")),
        collected_count: parse_count(interact.get("collected_count")),
        ip_location: str_field(card, "ip_location"),
        cover_url: image_urls.first().cloned().unwrap_or_default(),
        image_urls,
        media_url,
        tags,
        source_keyword: String::new(),
        access_token: token,
        access_source: source.to_string(),
        partial: false,
    }
}

/// Parses a listing summary into a partial item
fn parse_summary(note_id: &str, card: &Value, token: &str, source: &str) -> Item {
    let interact = card.get("interact_info").cloned().unwrap_or(Value::Null);
    let cover_url = card.get("cover").map(image_url).unwrap_or_default();
    Item {
        item_id: note_id.to_string(),
        item_type: str_field(card, "type"),
        title: str_field(card, "display_title"),
        author: parse_author(card.get("user"), "avatar"),
        liked_count: parse_count(interact.get("liked_count")),
        item_url: note_url(note_id, token, source),
        cover_url,
        access_token: token.to_string(),
        access_source: source.to_string(),
        partial: true,
        ..Default::default()
    }
}

pub(crate) fn parse_search_page(data: &Value, search_id: &str) -> ApiResult<Page<Item>> {
    let items = data
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::malformed("search response has no items"))?;

    let entries = items
        .iter()
        .filter(|entry| {
            let model_type = str_field(entry, "model_type");
            model_type.is_empty() || model_type == "note"
        })
        .filter_map(|entry| {
            let id = str_field(entry, "id");
            let card = entry.get("note_card")?;
            if id.is_empty() {
                return None;
            }
            Some(parse_summary(&id, card, &str_field(entry, "xsec_token"), "pc_search"))
        })
        .collect();

    Ok(Page::new(entries, search_id, bool_field(data, "has_more")))
}

pub(crate) fn parse_comment(value: &Value, root_id: &str) -> Comment {
    let target = str_field(value.get("target_comment").unwrap_or(&Value::Null), "id");
    let parent_comment_id = if !target.is_empty() {
        target
    } else {
        root_id.to_string()
    };
    let comment_id = str_field(value, "id");

    let inline_replies = value
        .get("sub_comments")
        .and_then(Value::as_array)
        .map(|subs| subs.iter().map(|s| parse_comment(s, &comment_id)).collect())
        .unwrap_or_default();

    Comment {
        item_id: str_field(value, "note_id"),
        parent_comment_id,
        author: parse_author(value.get("user_info"), "image"),
        content: str_field(value, "content"),
        create_time: value.get("create_time").and_then(Value::as_i64).unwrap_or(0),
        ip_location: str_field(value, "ip_location"),
        like_count: parse_count(value.get("like_count")),
        sub_comment_count: parse_count(value.get("sub_comment_count")),
        pictures: value
            .get("pictures")
            .and_then(Value::as_array)
            .map(|pics| pics.iter().map(image_url).filter(|u| !u.is_empty()).collect())
            .unwrap_or_default(),
        has_more_replies: bool_field(value, "sub_comment_has_more"),
        reply_cursor: str_field(value, "sub_comment_cursor"),
        inline_replies,
        comment_id,
    }
}

pub(crate) fn parse_comment_page(data: &Value, root_id: &str) -> ApiResult<Page<Comment>> {
    let comments = data
        .get("comments")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::malformed("comment response has no comments"))?;

    Ok(Page::new(
        comments.iter().map(|c| parse_comment(c, root_id)).collect(),
        str_field(data, "cursor"),
        bool_field(data, "has_more"),
    ))
}

pub(crate) fn parse_creator_notes(data: &Value) -> ApiResult<Page<Item>> {
    let notes = data
        .get("notes")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::malformed("creator response has no notes"))?;

    let entries = notes
        .iter()
        .filter_map(|note| {
            let id = str_field(note, "note_id");
            if id.is_empty() {
                return None;
            }
            Some(parse_summary(&id, note, &str_field(note, "xsec_token"), "pc_feed"))
        })
        .collect();

    Ok(Page::new(entries, str_field(data, "cursor"), bool_field(data, "has_more")))
}

pub(crate) fn parse_creator(state: &Value, user_id: &str) -> Option<Creator> {
    let page = state.pointer("/user/userPageData")?;
    let basic = page.get("basicInfo")?;

    let mut creator = Creator {
        user_id: user_id.to_string(),
        nickname: str_field(basic, "nickname"),
        gender: match basic.get("gender").and_then(Value::as_i64) {
            Some(1) => "female".to_string(),
            Some(0) => "male".to_string(),
            _ => String::new(),
        },
        avatar: str_field(basic, "images"),
        desc: str_field(basic, "desc"),
        ip_location: str_field(basic, "ipLocation"),
        ..Default::default()
    };

    for interaction in page.get("interactions").and_then(Value::as_array).into_iter().flatten() {
        let count = parse_count(interaction.get("count"));
        match str_field(interaction, "type").as_str() {
            "follows" => creator.follows = count,
            "fans" => creator.fans = count,
            "interaction" => creator.interaction = count,
            _ => {}
        }
    }
    creator.tags = page
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().map(|t| str_field(t, "name")).filter(|n| !n.is_empty()).collect())
        .unwrap_or_default();

    Some(creator)
}
