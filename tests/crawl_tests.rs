//! Integration tests for the crawl engine
//!
//! These tests drive the coordinator against a scripted `PlatformApi` and a
//! JSON sink in a temporary directory.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sumi_harvest::client::{ApiError, ApiResult};
use sumi_harvest::config::{OutputConfig, SaveFormat};
use sumi_harvest::crawler::{
    Coordinator, CrawlEvent, CrawlSettings, EventSink, StaticLinkSource, StopSignal,
};
use sumi_harvest::model::{CollectionTarget, Comment, CrawlMode, Creator, Item, Platform, SortOrder};
use sumi_harvest::platform::{CreatorRef, ItemRef, ItemSeed, Page, PlatformApi};
use sumi_harvest::storage::SinkSession;
use sumi_harvest::HarvestError;
use tempfile::TempDir;

fn item(id: &str, partial: bool) -> Item {
    Item {
        item_id: id.to_string(),
        title: format!("Item {}", id),
        partial,
        ..Default::default()
    }
}

fn items(prefix: &str, n: usize) -> Vec<Item> {
    (0..n).map(|i| item(&format!("{}{}", prefix, i), true)).collect()
}

fn comment(id: &str, item_id: &str) -> Comment {
    Comment {
        comment_id: id.to_string(),
        item_id: item_id.to_string(),
        content: format!("comment {}", id),
        ..Default::default()
    }
}

fn comments(prefix: &str, item_id: &str, n: usize) -> Vec<Comment> {
    (0..n)
        .map(|i| comment(&format!("{}{}", prefix, i), item_id))
        .collect()
}

/// Scripted platform that records every call
struct FakeApi {
    authenticated: bool,
    session_checks: Mutex<VecDeque<bool>>,
    session_check_calls: Mutex<usize>,
    search: Mutex<HashMap<String, VecDeque<ApiResult<Page<Item>>>>>,
    search_calls: Mutex<Vec<(String, u32, String)>>,
    detail_calls: Mutex<Vec<String>>,
    comments: HashMap<String, HashMap<String, Page<Comment>>>,
    comment_errors: HashMap<String, ApiError>,
    comment_delays: HashMap<String, Duration>,
    comment_calls: Mutex<Vec<(String, String)>>,
    replies: HashMap<String, HashMap<String, Page<Comment>>>,
    short_links: HashMap<String, String>,
    profiles: HashMap<String, Creator>,
    timelines: HashMap<String, HashMap<String, Page<Item>>>,
}

impl FakeApi {
    fn new() -> Self {
        Self {
            authenticated: true,
            session_checks: Mutex::new(VecDeque::new()),
            session_check_calls: Mutex::new(0),
            search: Mutex::new(HashMap::new()),
            search_calls: Mutex::new(Vec::new()),
            detail_calls: Mutex::new(Vec::new()),
            comments: HashMap::new(),
            comment_errors: HashMap::new(),
            comment_delays: HashMap::new(),
            comment_calls: Mutex::new(Vec::new()),
            replies: HashMap::new(),
            short_links: HashMap::new(),
            profiles: HashMap::new(),
            timelines: HashMap::new(),
        }
    }

    fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    /// Answers for successive session checks; `authenticated` after that
    fn session_checks(self, answers: &[bool]) -> Self {
        self.session_checks.lock().unwrap().extend(answers);
        self
    }

    fn session_check_calls(&self) -> usize {
        *self.session_check_calls.lock().unwrap()
    }

    fn search_pages(self, keyword: &str, pages: Vec<ApiResult<Page<Item>>>) -> Self {
        self.search
            .lock()
            .unwrap()
            .insert(keyword.to_string(), pages.into_iter().collect());
        self
    }

    fn with_comments(mut self, item_id: &str, cursor: &str, page: Page<Comment>) -> Self {
        self.comments
            .entry(item_id.to_string())
            .or_default()
            .insert(cursor.to_string(), page);
        self
    }

    fn failing_comments(mut self, item_id: &str, error: ApiError) -> Self {
        self.comment_errors.insert(item_id.to_string(), error);
        self
    }

    fn slow_comments(mut self, item_id: &str, delay: Duration) -> Self {
        self.comment_delays.insert(item_id.to_string(), delay);
        self
    }

    fn comment_cursors_for(&self, item_id: &str) -> Vec<String> {
        self.comment_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == item_id)
            .map(|(_, cursor)| cursor.clone())
            .collect()
    }

    fn with_replies(mut self, parent_id: &str, cursor: &str, page: Page<Comment>) -> Self {
        self.replies
            .entry(parent_id.to_string())
            .or_default()
            .insert(cursor.to_string(), page);
        self
    }

    fn short_link(mut self, from: &str, to: &str) -> Self {
        self.short_links.insert(from.to_string(), to.to_string());
        self
    }

    fn creator(mut self, user_id: &str, pages: Vec<(&str, Page<Item>)>) -> Self {
        self.profiles.insert(
            user_id.to_string(),
            Creator {
                user_id: user_id.to_string(),
                nickname: format!("creator {}", user_id),
                ..Default::default()
            },
        );
        self.timelines.insert(
            user_id.to_string(),
            pages
                .into_iter()
                .map(|(cursor, page)| (cursor.to_string(), page))
                .collect(),
        );
        self
    }

    fn search_calls_for(&self, keyword: &str) -> usize {
        self.search_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _, _)| k == keyword)
            .count()
    }

    fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformApi for FakeApi {
    fn platform(&self) -> Platform {
        Platform::Xhs
    }

    async fn probe(&self) -> bool {
        *self.session_check_calls.lock().unwrap() += 1;
        self.session_checks
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.authenticated)
    }

    async fn search_page(
        &self,
        keyword: &str,
        page: u32,
        cursor: &str,
        _sort: SortOrder,
    ) -> ApiResult<Page<Item>> {
        self.search_calls
            .lock()
            .unwrap()
            .push((keyword.to_string(), page, cursor.to_string()));
        self.search
            .lock()
            .unwrap()
            .get_mut(keyword)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Page::empty()))
    }

    async fn item_detail(&self, item_ref: &ItemRef) -> ApiResult<Option<Item>> {
        self.detail_calls
            .lock()
            .unwrap()
            .push(item_ref.item_id.clone());
        if item_ref.item_id.starts_with("gone") {
            return Ok(None);
        }
        let mut full = item(&item_ref.item_id, false);
        if item_ref.item_id.starts_with("pic") {
            full.image_urls = vec!["https://img/1".to_string(), "https://img/2".to_string()];
            full.media_url = Some("https://video/1".to_string());
        }
        Ok(Some(full))
    }

    async fn comment_page(&self, item_ref: &ItemRef, cursor: &str) -> ApiResult<Page<Comment>> {
        self.comment_calls
            .lock()
            .unwrap()
            .push((item_ref.item_id.clone(), cursor.to_string()));
        if let Some(delay) = self.comment_delays.get(&item_ref.item_id) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(error) = self.comment_errors.get(&item_ref.item_id) {
            return Err(error.clone());
        }
        Ok(self
            .comments
            .get(&item_ref.item_id)
            .and_then(|pages| pages.get(cursor))
            .cloned()
            .unwrap_or_else(Page::empty))
    }

    async fn reply_page(
        &self,
        _item_ref: &ItemRef,
        parent: &Comment,
        cursor: &str,
    ) -> ApiResult<Page<Comment>> {
        Ok(self
            .replies
            .get(&parent.comment_id)
            .and_then(|pages| pages.get(cursor))
            .cloned()
            .unwrap_or_else(Page::empty))
    }

    async fn creator_profile(&self, creator: &CreatorRef) -> ApiResult<Option<Creator>> {
        Ok(self.profiles.get(&creator.user_id).cloned())
    }

    async fn creator_items_page(&self, creator: &CreatorRef, cursor: &str) -> ApiResult<Page<Item>> {
        Ok(self
            .timelines
            .get(&creator.user_id)
            .and_then(|pages| pages.get(cursor))
            .cloned()
            .unwrap_or_else(Page::empty))
    }

    async fn resolve_short_link(&self, url: &str) -> ApiResult<Option<String>> {
        Ok(self.short_links.get(url).cloned())
    }

    async fn fetch_media(&self, _url: &str) -> ApiResult<Vec<u8>> {
        Ok(b"media".to_vec())
    }

    fn parse_item_seed(&self, seed: &str) -> ApiResult<ItemSeed> {
        if seed.starts_with("https://short/") {
            return Ok(ItemSeed::ShortLink(seed.to_string()));
        }
        if seed.contains(' ') || seed.starts_with("bad") {
            return Err(ApiError::Parse(seed.to_string()));
        }
        Ok(ItemSeed::Ref(ItemRef::new(seed)))
    }

    fn parse_creator_seed(&self, seed: &str) -> ApiResult<CreatorRef> {
        if seed.starts_with("bad") {
            return Err(ApiError::Parse(seed.to_string()));
        }
        Ok(CreatorRef {
            user_id: seed.to_string(),
            access_token: String::new(),
        })
    }
}

fn target(mode: CrawlMode, seeds: &[&str], max_items: usize) -> CollectionTarget {
    CollectionTarget {
        mode,
        seeds: seeds.iter().map(|s| s.to_string()).collect(),
        max_items,
        max_comments_per_item: 10,
        enable_comments: true,
        enable_sub_comments: false,
    }
}

fn settings() -> CrawlSettings {
    CrawlSettings {
        interval: Duration::ZERO,
        max_concurrency: 2,
        ..Default::default()
    }
}

fn coordinator(api: Arc<FakeApi>, dir: &TempDir) -> Coordinator {
    coordinator_with(api, dir, settings())
}

fn coordinator_with(api: Arc<FakeApi>, dir: &TempDir, settings: CrawlSettings) -> Coordinator {
    let output = OutputConfig {
        format: SaveFormat::Json,
        directory: dir.path().to_path_buf(),
        database_path: dir.path().join("harvest.db"),
        database_url: None,
    };
    let sink = Arc::new(SinkSession::new(&output, Platform::Xhs));
    Coordinator::new(api, sink, settings)
}

fn read_rows(files: &[PathBuf], kind: &str) -> Vec<Value> {
    files
        .iter()
        .find(|p| p.to_string_lossy().contains(&format!("_{}_", kind)))
        .map(|p| serde_json::from_slice(&std::fs::read(p).unwrap()).unwrap())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_search_truncates_first_page() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(
        FakeApi::new().search_pages("cats", vec![Ok(Page::new(items("n", 10), "sid", true))]),
    );
    let mut t = target(CrawlMode::Search, &["cats"], 5);
    t.enable_comments = false;

    let summary = coordinator(api.clone(), &dir).run(&t).await.unwrap();

    assert_eq!(summary.items_stored, 5);
    assert_eq!(api.search_calls_for("cats"), 1);
    assert_eq!(api.detail_calls().len(), 5);

    let rows = read_rows(&summary.files, "contents");
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r["source_keyword"] == "cats"));
}

#[tokio::test]
async fn test_search_passes_cursor_between_pages() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(FakeApi::new().search_pages(
        "cats",
        vec![
            Ok(Page::new(items("a", 3), "sid-1", true)),
            Ok(Page::new(items("b", 3), "sid-1", false)),
        ],
    ));
    let mut t = target(CrawlMode::Search, &["cats"], 20);
    t.enable_comments = false;

    let summary = coordinator(api.clone(), &dir).run(&t).await.unwrap();

    assert_eq!(summary.items_stored, 6);
    let calls = api.search_calls.lock().unwrap().clone();
    assert_eq!(calls[0], ("cats".to_string(), 1, String::new()));
    assert_eq!(calls[1], ("cats".to_string(), 2, "sid-1".to_string()));
    assert_eq!(calls.len(), 2);
}

#[tokio::test]
async fn test_blocked_page_ends_keyword_only() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(
        FakeApi::new()
            .search_pages(
                "cats",
                vec![
                    Ok(Page::new(items("c", 2), "sid", true)),
                    Err(ApiError::blocked("300012")),
                    Ok(Page::new(items("late", 2), "sid", false)),
                ],
            )
            .search_pages("dogs", vec![Ok(Page::new(items("d", 1), "sid", false))]),
    );
    let mut t = target(CrawlMode::Search, &["cats", "dogs"], 10);
    t.enable_comments = false;

    let summary = coordinator(api.clone(), &dir).run(&t).await.unwrap();

    assert_eq!(summary.items_stored, 3);
    assert_eq!(summary.blocked, 1);
    assert_eq!(api.search_calls_for("cats"), 2);
    assert_eq!(api.search_calls_for("dogs"), 1);
}

#[tokio::test]
async fn test_lost_session_after_block_aborts_run() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(
        FakeApi::new()
            .session_checks(&[true, false])
            .search_pages(
                "cats",
                vec![
                    Ok(Page::new(items("c", 2), "sid", true)),
                    Err(ApiError::blocked("300012")),
                ],
            )
            .search_pages("dogs", vec![Ok(Page::new(items("d", 1), "sid", false))]),
    );
    let mut t = target(CrawlMode::Search, &["cats", "dogs"], 10);
    t.enable_comments = false;

    let err = coordinator(api.clone(), &dir).run(&t).await.unwrap_err();

    assert!(matches!(err, HarvestError::NotAuthenticated));
    assert_eq!(api.session_check_calls(), 2);
    assert_eq!(api.search_calls_for("cats"), 2);
    assert_eq!(api.search_calls_for("dogs"), 0);
}

#[tokio::test]
async fn test_session_checked_only_after_trouble() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(
        FakeApi::new()
            .search_pages("cats", vec![Ok(Page::new(items("c", 1), "sid", false))])
            .search_pages("dogs", vec![Ok(Page::new(items("d", 1), "sid", false))]),
    );
    let mut t = target(CrawlMode::Search, &["cats", "dogs"], 10);
    t.enable_comments = false;

    let summary = coordinator(api.clone(), &dir).run(&t).await.unwrap();

    assert_eq!(summary.items_stored, 2);
    assert_eq!(api.session_check_calls(), 1);
}

#[tokio::test]
async fn test_duplicate_items_stored_once() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(
        FakeApi::new()
            .search_pages("cats", vec![Ok(Page::new(items("n", 3), "sid", false))])
            .search_pages("kittens", vec![Ok(Page::new(items("n", 3), "sid", false))]),
    );
    let mut t = target(CrawlMode::Search, &["cats", "kittens"], 5);
    t.enable_comments = false;

    let summary = coordinator(api, &dir).run(&t).await.unwrap();
    assert_eq!(summary.items_stored, 3);
}

#[tokio::test]
async fn test_detail_short_link_resolves_once() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(
        FakeApi::new()
            .short_link("https://short/abc", "X")
            .with_comments("X", "", Page::new(comments("c", "X", 3), "", false)),
    );
    let t = target(CrawlMode::Detail, &["https://short/abc"], 10);

    let summary = coordinator(api.clone(), &dir).run(&t).await.unwrap();

    assert_eq!(api.detail_calls(), vec!["X".to_string()]);
    assert_eq!(summary.items_stored, 1);
    assert_eq!(summary.comments_stored, 3);

    let rows = read_rows(&summary.files, "comments");
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r["item_title"] == "Item X"));
}

#[tokio::test]
async fn test_short_link_chain_is_skipped() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(
        FakeApi::new()
            .short_link("https://short/a", "https://short/b")
            .short_link("https://short/b", "X"),
    );
    let t = target(CrawlMode::Detail, &["https://short/a", "n1"], 10);

    let summary = coordinator(api.clone(), &dir).run(&t).await.unwrap();

    assert_eq!(summary.seeds_skipped, 1);
    assert_eq!(api.detail_calls(), vec!["n1".to_string()]);
}

#[tokio::test]
async fn test_malformed_seed_skipped_and_missing_item_ignored() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(FakeApi::new());
    let t = target(CrawlMode::Detail, &["bad seed", "gone1", "n1"], 10);

    let summary = coordinator(api, &dir).run(&t).await.unwrap();

    assert_eq!(summary.seeds_skipped, 1);
    assert_eq!(summary.items_stored, 1);
}

#[tokio::test]
async fn test_mismatched_comment_is_dropped() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(FakeApi::new().with_comments(
        "n1",
        "",
        Page::new(
            vec![comment("c1", "n1"), comment("c2", "other"), comment("c3", "n1")],
            "",
            false,
        ),
    ));
    let t = target(CrawlMode::Detail, &["n1"], 10);

    let summary = coordinator(api, &dir).run(&t).await.unwrap();

    assert_eq!(summary.comments_stored, 2);
    let ids: Vec<String> = read_rows(&summary.files, "comments")
        .iter()
        .map(|r| r["comment_id"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(ids, vec!["c1", "c3"]);
}

#[tokio::test]
async fn test_comment_cap_truncates_mid_page() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(
        FakeApi::new()
            .with_comments("n1", "", Page::new(comments("a", "n1", 4), "p2", true))
            .with_comments("n1", "p2", Page::new(comments("b", "n1", 4), "p3", true))
            .with_comments("n1", "p3", Page::new(comments("c", "n1", 4), "", false)),
    );
    let mut t = target(CrawlMode::Detail, &["n1"], 10);
    t.max_comments_per_item = 6;

    let summary = coordinator(api, &dir).run(&t).await.unwrap();

    assert_eq!(summary.comments_stored, 6);
}

#[tokio::test]
async fn test_no_wait_after_last_comment_page() {
    let dir = TempDir::new().unwrap();
    let mut parent = comment("c1", "n1");
    parent.has_more_replies = true;
    parent.reply_cursor = "r1".to_string();
    let reply = Comment {
        parent_comment_id: "c1".to_string(),
        ..comment("r1", "n1")
    };
    let api = Arc::new(
        FakeApi::new()
            .with_comments("n1", "", Page::new(vec![parent], "", false))
            .with_replies("c1", "r1", Page::new(vec![reply], "", false)),
    );
    let mut t = target(CrawlMode::Detail, &["n1"], 10);
    t.enable_sub_comments = true;
    let slow = CrawlSettings {
        interval: Duration::from_secs(2),
        ..settings()
    };

    let started = std::time::Instant::now();
    let summary = coordinator_with(api, &dir, slow).run(&t).await.unwrap();

    assert_eq!(summary.comments_stored, 2);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_replies_follow_their_own_pagination() {
    let dir = TempDir::new().unwrap();
    let mut parent = comment("c1", "n1");
    parent.sub_comment_count = 5;
    parent.has_more_replies = true;
    parent.reply_cursor = "r1".to_string();
    parent.inline_replies = vec![Comment {
        parent_comment_id: "c1".to_string(),
        ..comment("r0", "n1")
    }];

    let api = Arc::new(
        FakeApi::new()
            .with_comments("n1", "", Page::new(vec![parent], "", false))
            .with_replies("c1", "r1", Page::new(comments("r1-", "n1", 2), "r2", true))
            .with_replies("c1", "r2", Page::new(comments("r2-", "n1", 2), "", false)),
    );
    let mut t = target(CrawlMode::Detail, &["n1"], 10);
    t.max_comments_per_item = 1;
    t.enable_sub_comments = true;

    let summary = coordinator(api, &dir).run(&t).await.unwrap();

    // one first-level comment, one inline reply, four paged replies
    assert_eq!(summary.comments_stored, 6);
}

#[tokio::test]
async fn test_comments_disabled_is_noop() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(FakeApi::new().with_comments(
        "n1",
        "",
        Page::new(comments("c", "n1", 3), "", false),
    ));
    let mut t = target(CrawlMode::Detail, &["n1"], 10);
    t.enable_comments = false;

    let summary = coordinator(api, &dir).run(&t).await.unwrap();

    assert_eq!(summary.items_stored, 1);
    assert_eq!(summary.comments_stored, 0);
}

#[tokio::test]
async fn test_creator_timeline_bounded_by_max_items() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(FakeApi::new().creator(
        "u1",
        vec![
            ("", Page::new(items("t", 3), "cur2", true)),
            ("cur2", Page::new(items("s", 3), "cur3", true)),
        ],
    ));
    let mut t = target(CrawlMode::Creator, &["u1", "bad-creator"], 4);
    t.enable_comments = false;

    let summary = coordinator(api.clone(), &dir).run(&t).await.unwrap();

    assert_eq!(summary.creators_stored, 1);
    assert_eq!(summary.items_stored, 4);
    assert_eq!(summary.seeds_skipped, 1);
    assert_eq!(read_rows(&summary.files, "creators").len(), 1);
    assert_eq!(api.detail_calls().len(), 4);
}

#[tokio::test]
async fn test_unauthenticated_session_aborts() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(FakeApi::new().unauthenticated());
    let t = target(CrawlMode::Search, &["cats"], 5);

    let err = coordinator(api, &dir).run(&t).await.unwrap_err();
    assert!(matches!(err, HarvestError::NotAuthenticated));
}

#[tokio::test]
async fn test_empty_seeds_is_invalid_target() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(FakeApi::new());
    let t = target(CrawlMode::Detail, &[" "], 5);

    let err = coordinator(api, &dir).run(&t).await.unwrap_err();
    assert!(matches!(err, HarvestError::InvalidTarget(_)));
}

#[tokio::test]
async fn test_stop_signal_prevents_new_work() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(
        FakeApi::new().search_pages("cats", vec![Ok(Page::new(items("n", 3), "sid", false))]),
    );
    let stop = StopSignal::new();
    stop.stop();

    let summary = coordinator(api.clone(), &dir)
        .with_stop(stop)
        .run(&target(CrawlMode::Search, &["cats"], 5))
        .await
        .unwrap();

    assert!(summary.stopped);
    assert_eq!(summary.items_stored, 0);
    assert_eq!(api.search_calls_for("cats"), 0);
}

#[tokio::test]
async fn test_events_report_progress_and_finish() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(
        FakeApi::new()
            .with_comments("n1", "", Page::new(comments("a", "n1", 2), "", false))
            .with_comments("n2", "", Page::new(comments("b", "n2", 1), "", false)),
    );
    let (events, mut rx) = EventSink::channel();

    let summary = coordinator(api, &dir)
        .with_events(events)
        .run(&target(CrawlMode::Detail, &["n1", "n2"], 10))
        .await
        .unwrap();

    let mut progress = Vec::new();
    let mut comment_progress = Vec::new();
    let mut finished = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            CrawlEvent::Progress { current, total, .. } => progress.push((current, total)),
            CrawlEvent::CommentProgress {
                item_index,
                total_items,
                comments_so_far,
                ..
            } => comment_progress.push((item_index, total_items, comments_so_far)),
            CrawlEvent::Finished(s) => finished = Some(s),
            _ => {}
        }
    }

    progress.sort();
    assert_eq!(progress, vec![(1, 2), (2, 2)]);
    comment_progress.sort();
    assert_eq!(comment_progress, vec![(1, 2, 2), (2, 2, 1)]);
    assert_eq!(finished, Some(summary));
}

#[tokio::test]
async fn test_new_run_binds_new_files() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(FakeApi::new());
    let coordinator = coordinator(api, &dir);
    let mut t = target(CrawlMode::Detail, &["n1"], 10);
    t.enable_comments = false;

    let first = coordinator.run(&t).await.unwrap();
    let second = coordinator.run(&t).await.unwrap();

    assert_eq!(first.files.len(), 1);
    assert_eq!(second.files.len(), 1);
    assert_ne!(first.files, second.files);
}

#[tokio::test]
async fn test_discovered_links_feed_detail_collection() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(FakeApi::new());
    let source = StaticLinkSource::new().with(
        "cats",
        vec!["n1".to_string(), "n2".to_string(), "n3".to_string()],
    );
    let mut t = target(CrawlMode::Search, &["cats"], 2);
    t.enable_comments = false;

    let summary = coordinator(api.clone(), &dir)
        .run_discovered("cats", &source, &t)
        .await
        .unwrap();

    assert_eq!(summary.items_stored, 2);
    let rows = read_rows(&summary.files, "contents");
    assert!(rows.iter().all(|r| r["source_keyword"] == "cats"));
    assert!(rows[0].as_object().unwrap().contains_key("item_id"));
}

#[tokio::test]
async fn test_media_saved_per_item() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(FakeApi::new());
    let output = OutputConfig {
        format: SaveFormat::Json,
        directory: dir.path().to_path_buf(),
        database_path: dir.path().join("harvest.db"),
        database_url: None,
    };
    let sink = Arc::new(SinkSession::new(&output, Platform::Xhs));
    let media_settings = CrawlSettings {
        enable_media: true,
        media_root: dir.path().to_path_buf(),
        ..settings()
    };
    let mut t = target(CrawlMode::Detail, &["pic1", "n1"], 10);
    t.enable_comments = false;

    let summary = Coordinator::new(api, sink, media_settings).run(&t).await.unwrap();

    assert_eq!(summary.items_stored, 2);
    let media = dir.path().join("xhs").join("media");
    assert_eq!(std::fs::read(media.join("pic1").join("000.jpeg")).unwrap(), b"media");
    assert!(media.join("pic1").join("001.jpeg").exists());
    assert!(media.join("pic1").join("video.mp4").exists());
    assert!(!media.join("n1").exists());
}

#[tokio::test]
async fn test_stored_replies_use_up_comment_budget() {
    let dir = TempDir::new().unwrap();
    let mut parent = comment("c1", "n1");
    parent.has_more_replies = true;
    parent.reply_cursor = "r1".to_string();
    let replies: Vec<Comment> = comments("r", "n1", 10)
        .into_iter()
        .map(|r| Comment {
            parent_comment_id: "c1".to_string(),
            ..r
        })
        .collect();

    let api = Arc::new(
        FakeApi::new()
            .with_comments("n1", "", Page::new(vec![parent, comment("c2", "n1")], "p2", true))
            .with_comments("n1", "p2", Page::new(comments("d", "n1", 5), "", false))
            .with_replies("c1", "r1", Page::new(replies, "", false)),
    );
    let mut t = target(CrawlMode::Detail, &["n1"], 10);
    t.max_comments_per_item = 5;
    t.enable_sub_comments = true;

    let summary = coordinator(api.clone(), &dir).run(&t).await.unwrap();

    // two first-level comments and ten replies; the second page is never requested
    assert_eq!(summary.comments_stored, 12);
    assert_eq!(api.comment_cursors_for("n1"), vec![String::new()]);
}

#[tokio::test]
async fn test_comment_failure_ends_only_that_item() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(
        FakeApi::new()
            .with_comments("n1", "", Page::new(comments("a", "n1", 2), "", false))
            .failing_comments(
                "n2",
                ApiError::DataFetch {
                    message: "bad envelope".to_string(),
                },
            )
            .failing_comments(
                "n3",
                ApiError::Blocked {
                    message: "too many requests".to_string(),
                },
            )
            .with_comments("n4", "", Page::new(comments("d", "n4", 1), "", false)),
    );

    let summary = coordinator(api.clone(), &dir)
        .run(&target(CrawlMode::Detail, &["n1", "n2", "n3", "n4"], 10))
        .await
        .unwrap();

    assert_eq!(summary.items_stored, 4);
    assert_eq!(summary.comments_stored, 3);
    assert_eq!(summary.blocked, 1);
    assert_eq!(api.comment_cursors_for("n2"), vec![String::new()]);
    assert_eq!(api.comment_cursors_for("n3"), vec![String::new()]);

    let rows = read_rows(&summary.files, "comments");
    let mut owners: Vec<&str> = rows.iter().filter_map(|r| r["item_id"].as_str()).collect();
    owners.sort();
    assert_eq!(owners, vec!["n1", "n1", "n4"]);
}

#[tokio::test]
async fn test_comment_progress_indices_stable_under_concurrency() {
    let dir = TempDir::new().unwrap();
    let api = Arc::new(
        FakeApi::new()
            .with_comments("n1", "", Page::new(comments("a", "n1", 3), "", false))
            .with_comments("n2", "", Page::new(comments("b", "n2", 1), "", false))
            .with_comments("n3", "", Page::new(comments("c", "n3", 2), "", false))
            .slow_comments("n1", Duration::from_millis(50)),
    );
    let (events, mut rx) = EventSink::channel();

    coordinator(api, &dir)
        .with_events(events)
        .run(&target(CrawlMode::Detail, &["n1", "n2", "n3"], 10))
        .await
        .unwrap();

    let mut order = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let CrawlEvent::CommentProgress {
            item_index,
            total_items,
            comments_so_far,
            ..
        } = event
        {
            order.push((item_index, total_items, comments_so_far));
        }
    }

    // the slow first item finishes last but keeps its index
    assert_eq!(order.last(), Some(&(1, 3, 3)));
    let mut sorted = order.clone();
    sorted.sort();
    assert_eq!(sorted, vec![(1, 3, 3), (2, 3, 1), (3, 3, 2)]);
}
