//! Crawl coordinator - three-mode collection orchestration
//!
//! This module runs one collection target to completion:
//! - search: page each keyword to `max_items`, then collect its comments
//! - detail: resolve item seeds, fetch details concurrently, then comments
//! - creator: store each profile, page its timeline, then comments
//!
//! Per-page and per-item failures are logged and reported as events; only an
//! invalid target, an unauthenticated session or an unusable sink abort a run.
//! After a seed ends in a block or a signing failure the session is checked
//! again, so a lost login stops the run instead of burning through seeds.

use crate::client::ApiError;
use crate::config::Config;
use crate::crawler::comments::CommentEngine;
use crate::crawler::discovery::LinkSource;
use crate::crawler::events::{CrawlEvent, EventSink, RunStats, RunSummary, StopSignal};
use crate::crawler::media::MediaDownloader;
use crate::crawler::pagination::PageOutcome;
use crate::model::{CollectionTarget, CrawlMode, Item, SortOrder};
use crate::platform::{CreatorRef, ItemRef, ItemSeed, PlatformApi};
use crate::storage::SinkSession;
use crate::HarvestError;
use futures::future::join_all;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Run-independent knobs of the coordinator
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Courtesy delay between page requests
    pub interval: Duration,
    /// Simultaneous item-detail or comment pipelines
    pub max_concurrency: usize,
    /// First search page requested for every keyword
    pub start_page: u32,
    pub sort: SortOrder,
    pub enable_media: bool,
    /// Root directory for downloaded media
    pub media_root: PathBuf,
}

impl CrawlSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.crawler.crawl_interval(),
            max_concurrency: config.crawler.max_concurrency,
            start_page: config.crawler.start_page,
            sort: config.crawler.sort,
            enable_media: config.crawler.enable_media,
            media_root: config.output.directory.clone(),
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_concurrency: 1,
            start_page: 1,
            sort: SortOrder::General,
            enable_media: false,
            media_root: PathBuf::from("data"),
        }
    }
}

/// Main crawl coordinator
pub struct Coordinator {
    api: Arc<dyn PlatformApi>,
    sink: Arc<SinkSession>,
    settings: CrawlSettings,
    events: EventSink,
    stop: StopSignal,
    limiter: Arc<Semaphore>,
}

/// State of the run in progress
struct Run<'a> {
    target: &'a CollectionTarget,
    stats: Arc<RunStats>,
    comments: CommentEngine,
    /// Item ids already stored in this run
    seen: std::sync::Mutex<HashSet<String>>,
    /// Denominator for progress events
    total: usize,
    /// Set by signing failures; the session is checked before the next seed
    session_suspect: AtomicBool,
    /// Blocks already followed by a session check
    blocks_checked: AtomicUsize,
}

impl Run<'_> {
    /// Claims `item_id` for this run; false when it was stored already
    fn claim(&self, item_id: &str) -> bool {
        match self.seen.lock() {
            Ok(mut seen) => seen.insert(item_id.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(item_id.to_string()),
        }
    }

    fn suspect_session(&self) {
        self.session_suspect.store(true, Ordering::SeqCst);
    }

    /// Whether a block or signing failure happened since the last call
    fn take_trouble(&self) -> bool {
        let blocked = self.stats.blocked.load(Ordering::SeqCst);
        let new_blocks = self.blocks_checked.swap(blocked, Ordering::SeqCst) < blocked;
        self.session_suspect.swap(false, Ordering::SeqCst) || new_blocks
    }
}

impl Coordinator {
    /// Creates a new coordinator
    ///
    /// # Arguments
    ///
    /// * `api` - Platform adapter all remote calls go through
    /// * `sink` - Storage session; bound at the start of every run, reset at its end
    /// * `settings` - Interval, concurrency and search options
    pub fn new(api: Arc<dyn PlatformApi>, sink: Arc<SinkSession>, settings: CrawlSettings) -> Self {
        let limiter = Arc::new(Semaphore::new(settings.max_concurrency.max(1)));
        Self {
            api,
            sink,
            settings,
            events: EventSink::disabled(),
            stop: StopSignal::new(),
            limiter,
        }
    }

    /// Sends progress to `events`
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Polls `stop` between pages and items
    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Runs one collection target to completion
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run finished, was stopped, or ran out of seeds
    /// * `Err(HarvestError)` - Invalid target, unauthenticated session or sink failure
    pub async fn run(&self, target: &CollectionTarget) -> crate::Result<RunSummary> {
        target.validate().map_err(HarvestError::InvalidTarget)?;
        self.begin(target.mode).await?;

        let seeds = target.cleaned_seeds();
        tracing::info!(
            "Starting {} run on {} with {} seed(s)",
            target.mode,
            self.api.platform(),
            seeds.len()
        );

        let total = match target.mode {
            CrawlMode::Detail => seeds.len(),
            _ => seeds.len() * target.max_items,
        };
        let run = self.new_run(target, total);

        match target.mode {
            CrawlMode::Search => {
                for keyword in &seeds {
                    if self.stop.is_stopped() {
                        break;
                    }
                    self.search_keyword(&run, keyword).await;
                    self.confirm_session(&run).await?;
                }
            }
            CrawlMode::Detail => self.collect_details(&run, &seeds, "").await,
            CrawlMode::Creator => {
                for seed in &seeds {
                    if self.stop.is_stopped() {
                        break;
                    }
                    self.collect_creator(&run, seed).await;
                    self.confirm_session(&run).await?;
                }
            }
        }

        Ok(self.finish(&run).await)
    }

    /// Detail collection over links produced by `source` for `keyword`
    ///
    /// Stands in for search mode when the platform blocks API search. Stored
    /// items carry `keyword` as their source keyword.
    pub async fn run_discovered(
        &self,
        keyword: &str,
        source: &dyn LinkSource,
        target: &CollectionTarget,
    ) -> crate::Result<RunSummary> {
        if target.max_items == 0 {
            return Err(HarvestError::InvalidTarget(
                "max_items must be at least 1".to_string(),
            ));
        }
        let mut links = source.discover(keyword, target.max_items).await?;
        links.truncate(target.max_items);
        tracing::info!("Discovered {} link(s) for '{}'", links.len(), keyword);
        if links.is_empty() {
            return Err(HarvestError::InvalidTarget(format!(
                "no links discovered for '{}'",
                keyword
            )));
        }

        let detail = CollectionTarget {
            mode: CrawlMode::Detail,
            seeds: links,
            ..target.clone()
        };
        self.begin(CrawlMode::Detail).await?;
        let run = self.new_run(&detail, detail.seeds.len());
        self.collect_details(&run, &detail.seeds, keyword).await;
        Ok(self.finish(&run).await)
    }

    async fn begin(&self, mode: CrawlMode) -> crate::Result<()> {
        if !self.api.probe().await {
            return Err(HarvestError::NotAuthenticated);
        }
        self.sink.bind(mode).await?;
        Ok(())
    }

    /// Checks the session again after a block or a signing failure
    ///
    /// A lost session ends the run with `NotAuthenticated`; whatever was
    /// stored so far is kept.
    async fn confirm_session(&self, run: &Run<'_>) -> crate::Result<()> {
        if !run.take_trouble() {
            return Ok(());
        }
        if self.api.probe().await {
            tracing::debug!("Session still valid after a block; continuing");
            return Ok(());
        }
        tracing::error!("Session lost during the run; stopping");
        self.finish(run).await;
        Err(HarvestError::NotAuthenticated)
    }

    fn new_run<'a>(&self, target: &'a CollectionTarget, total: usize) -> Run<'a> {
        let stats = Arc::new(RunStats::default());
        let comments = CommentEngine::new(
            self.api.clone(),
            self.sink.clone(),
            self.events.clone(),
            self.stop.clone(),
            self.limiter.clone(),
            self.settings.interval,
            stats.clone(),
        );
        Run {
            target,
            stats,
            comments,
            seen: std::sync::Mutex::new(HashSet::new()),
            total,
            session_suspect: AtomicBool::new(false),
            blocks_checked: AtomicUsize::new(0),
        }
    }

    async fn finish(&self, run: &Run<'_>) -> RunSummary {
        let summary = run
            .stats
            .summary(self.sink.paths().await, self.stop.is_stopped());
        self.sink.reset().await;
        tracing::info!(
            "Run finished: {} item(s), {} comment(s), {} creator(s), {} skipped seed(s)",
            summary.items_stored,
            summary.comments_stored,
            summary.creators_stored,
            summary.seeds_skipped
        );
        self.events.emit(CrawlEvent::Finished(summary.clone()));
        summary
    }

    /// Pages one keyword up to `max_items`, then collects comments
    async fn search_keyword(&self, run: &Run<'_>, keyword: &str) {
        let max = run.target.max_items;
        let mut collected: Vec<ItemRef> = Vec::new();
        let mut page_no = self.settings.start_page;
        let mut cursor = String::new();

        while collected.len() < max && !self.stop.is_stopped() {
            tracing::info!("Searching '{}' page {}", keyword, page_no);
            let result = self
                .api
                .search_page(keyword, page_no, &cursor, self.settings.sort)
                .await;
            let page = match PageOutcome::from_fetch(result) {
                PageOutcome::Items(page) => page,
                PageOutcome::Exhausted => {
                    tracing::info!("No more results for '{}'", keyword);
                    break;
                }
                PageOutcome::Blocked(message) => {
                    self.report_blocked(run, keyword, message);
                    break;
                }
                PageOutcome::Failed(e) => {
                    self.report_failure(run, keyword, &e);
                    break;
                }
            };

            let mut fresh = Vec::new();
            for mut item in page.entries {
                if collected.len() + fresh.len() >= max {
                    break;
                }
                if !run.claim(&item.item_id) {
                    continue;
                }
                item.source_keyword = keyword.to_string();
                fresh.push(item);
            }
            let stored = self.ingest(run, fresh).await;
            collected.extend(stored.iter().map(ItemRef::of));

            if !page.has_more || collected.len() >= max {
                break;
            }
            if !page.cursor.is_empty() {
                cursor = page.cursor;
            }
            page_no += 1;
            tokio::time::sleep(self.settings.interval).await;
        }

        tracing::info!("Keyword '{}': {} item(s) collected", keyword, collected.len());
        run.comments.collect(&collected, run.target).await;
    }

    /// Fetches detail for partial items and stores every item
    ///
    /// Items are processed concurrently under the run's limiter. A failed
    /// detail fetch falls back to the listing entry.
    async fn ingest(&self, run: &Run<'_>, items: Vec<Item>) -> Vec<Item> {
        let tasks = items.into_iter().map(|item| async move {
            let _permit = self.limiter.acquire().await.ok()?;
            if self.stop.is_stopped() {
                return None;
            }
            let item = if item.partial {
                self.complete(item).await
            } else {
                item
            };
            self.persist(run, &item).await.then_some(item)
        });
        join_all(tasks).await.into_iter().flatten().collect()
    }

    async fn complete(&self, item: Item) -> Item {
        match self.api.item_detail(&ItemRef::of(&item)).await {
            Ok(Some(mut full)) => {
                full.source_keyword = item.source_keyword.clone();
                if full.access_token.is_empty() {
                    full.access_token = item.access_token.clone();
                }
                if full.access_source.is_empty() {
                    full.access_source = item.access_source.clone();
                }
                full
            }
            Ok(None) => {
                tracing::debug!("No detail for {}; keeping listing entry", item.item_id);
                item
            }
            Err(e) => {
                tracing::warn!("Detail for {} failed, keeping listing entry: {}", item.item_id, e);
                item
            }
        }
    }

    /// Stores one item and reports progress; false when the sink refused it
    async fn persist(&self, run: &Run<'_>, item: &Item) -> bool {
        if let Err(e) = self.sink.store_content(item).await {
            tracing::error!("Failed to store item {}: {}", item.item_id, e);
            return false;
        }
        let current = RunStats::add(&run.stats.items, 1);
        self.events.emit(CrawlEvent::ItemStored {
            item_id: item.item_id.clone(),
        });
        self.events.emit(CrawlEvent::Progress {
            current,
            total: run.total,
            message: format!("Stored {}", display_title(item)),
        });

        if self.settings.enable_media {
            MediaDownloader::new(self.api.clone(), self.settings.media_root.clone())
                .download(item)
                .await;
        }
        true
    }

    /// Resolves every seed, fetches details concurrently, then collects comments
    async fn collect_details(&self, run: &Run<'_>, seeds: &[String], keyword: &str) {
        let mut refs: Vec<ItemRef> = Vec::new();
        for seed in seeds {
            match self.resolve_item_seed(seed).await {
                Ok(item) => {
                    if run.claim(&item.item_id) {
                        refs.push(item);
                    } else {
                        tracing::debug!("Duplicate seed {} ignored", seed);
                    }
                }
                Err(e) => self.skip_seed(run, seed, &e),
            }
        }

        let tasks = refs.into_iter().map(|item_ref| async move {
            let _permit = self.limiter.acquire().await.ok()?;
            if self.stop.is_stopped() {
                return None;
            }
            match self.api.item_detail(&item_ref).await {
                Ok(Some(mut item)) => {
                    item.source_keyword = keyword.to_string();
                    if item.access_token.is_empty() {
                        item.access_token = item_ref.access_token.clone();
                    }
                    self.persist(run, &item).await.then(|| ItemRef {
                        access_token: item.access_token.clone(),
                        ..item_ref
                    })
                }
                Ok(None) => {
                    tracing::warn!("Item {} not found", item_ref.item_id);
                    None
                }
                Err(e) => {
                    if e.is_block() {
                        RunStats::add(&run.stats.blocked, 1);
                    }
                    self.report_failure(run, &item_ref.item_id, &e);
                    None
                }
            }
        });
        let stored: Vec<ItemRef> = join_all(tasks).await.into_iter().flatten().collect();

        run.comments.collect(&stored, run.target).await;
    }

    /// One redirect hop for short links; a second short link is rejected
    async fn resolve_item_seed(&self, seed: &str) -> Result<ItemRef, ApiError> {
        match self.api.parse_item_seed(seed)? {
            ItemSeed::Ref(item) => Ok(item),
            ItemSeed::ShortLink(url) => {
                let resolved = self
                    .api
                    .resolve_short_link(&url)
                    .await?
                    .ok_or_else(|| ApiError::Parse(format!("short link {} did not redirect", url)))?;
                tracing::debug!("Short link {} -> {}", url, resolved);
                match self.api.parse_item_seed(&resolved)? {
                    ItemSeed::Ref(item) => Ok(item),
                    ItemSeed::ShortLink(next) => Err(ApiError::Parse(format!(
                        "short link {} redirects to another short link {}",
                        url, next
                    ))),
                }
            }
        }
    }

    /// Profile, timeline and comments of one creator
    async fn collect_creator(&self, run: &Run<'_>, seed: &str) {
        let creator = match self.api.parse_creator_seed(seed) {
            Ok(creator) => creator,
            Err(e) => {
                self.skip_seed(run, seed, &e);
                return;
            }
        };

        match self.api.creator_profile(&creator).await {
            Ok(Some(profile)) => match self.sink.store_creator(&profile).await {
                Ok(()) => {
                    RunStats::add(&run.stats.creators, 1);
                    self.events.emit(CrawlEvent::CreatorStored {
                        user_id: profile.user_id.clone(),
                    });
                }
                Err(e) => tracing::error!("Failed to store creator {}: {}", creator.user_id, e),
            },
            Ok(None) => tracing::warn!("No profile for creator {}", creator.user_id),
            Err(e) if e.is_block() => {
                self.report_blocked(run, seed, e.to_string());
                return;
            }
            Err(e) => self.report_failure(run, &creator.user_id, &e),
        }

        let items = self.creator_timeline(run, &creator).await;
        run.comments.collect(&items, run.target).await;
    }

    /// Pages a creator's timeline up to `max_items`, storing each page as it arrives
    async fn creator_timeline(&self, run: &Run<'_>, creator: &CreatorRef) -> Vec<ItemRef> {
        let max = run.target.max_items;
        let mut collected: Vec<ItemRef> = Vec::new();
        let mut cursor = String::new();

        while collected.len() < max && !self.stop.is_stopped() {
            let result = self.api.creator_items_page(creator, &cursor).await;
            let page = match PageOutcome::from_fetch(result) {
                PageOutcome::Items(page) => page,
                PageOutcome::Exhausted => break,
                PageOutcome::Blocked(message) => {
                    self.report_blocked(run, &creator.user_id, message);
                    break;
                }
                PageOutcome::Failed(e) => {
                    self.report_failure(run, &creator.user_id, &e);
                    break;
                }
            };

            let mut fresh = Vec::new();
            for item in page.entries {
                if collected.len() + fresh.len() >= max {
                    break;
                }
                if run.claim(&item.item_id) {
                    fresh.push(item);
                }
            }
            let stored = self.ingest(run, fresh).await;
            collected.extend(stored.iter().map(ItemRef::of));

            if !page.has_more || page.cursor.is_empty() || page.cursor == cursor {
                break;
            }
            cursor = page.cursor;
            tokio::time::sleep(self.settings.interval).await;
        }

        tracing::info!("Creator {}: {} item(s) collected", creator.user_id, collected.len());
        collected
    }

    fn skip_seed(&self, run: &Run<'_>, seed: &str, error: &ApiError) {
        tracing::warn!("Skipping seed '{}': {}", seed, error);
        RunStats::add(&run.stats.skipped, 1);
        self.events.emit(CrawlEvent::SeedSkipped {
            seed: seed.to_string(),
            reason: error.to_string(),
        });
    }

    fn report_blocked(&self, run: &Run<'_>, seed: &str, message: String) {
        tracing::warn!("Blocked while collecting '{}': {}", seed, message);
        RunStats::add(&run.stats.blocked, 1);
        self.events.emit(CrawlEvent::Blocked {
            seed: seed.to_string(),
            message,
        });
    }

    fn report_failure(&self, run: &Run<'_>, what: &str, error: &ApiError) {
        tracing::warn!("Collection of '{}' ended early: {}", what, error);
        if let ApiError::SigningUnavailable { .. } = error {
            run.suspect_session();
            self.events.emit(CrawlEvent::SigningUnavailable {
                message: error.to_string(),
            });
        }
    }
}

fn display_title(item: &Item) -> &str {
    if !item.title.is_empty() {
        &item.title
    } else if !item.desc.is_empty() {
        &item.desc
    } else {
        &item.item_id
    }
}
