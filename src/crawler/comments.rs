//! Comment and reply collection
//!
//! For a batch of items, runs one pipeline per item under the run's
//! concurrency limiter. Each pipeline pages first-level comments up to the
//! per-item cap and (optionally) follows every open reply thread to its end.
//! Stored replies use up the budget for further first-level pages. Pages are
//! stored as soon as they arrive.

use crate::client::ApiError;
use crate::crawler::events::{CrawlEvent, EventSink, RunStats, StopSignal};
use crate::crawler::pagination::PageOutcome;
use crate::model::{CollectionTarget, Comment};
use crate::platform::{ItemRef, PlatformApi};
use crate::storage::SinkSession;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Per-item comment pipelines sharing one limiter
pub struct CommentEngine {
    api: Arc<dyn PlatformApi>,
    sink: Arc<SinkSession>,
    events: EventSink,
    stop: StopSignal,
    limiter: Arc<Semaphore>,
    interval: Duration,
    stats: Arc<RunStats>,
}

impl CommentEngine {
    pub(crate) fn new(
        api: Arc<dyn PlatformApi>,
        sink: Arc<SinkSession>,
        events: EventSink,
        stop: StopSignal,
        limiter: Arc<Semaphore>,
        interval: Duration,
        stats: Arc<RunStats>,
    ) -> Self {
        Self {
            api,
            sink,
            events,
            stop,
            limiter,
            interval,
            stats,
        }
    }

    /// Collects comments for every item in `items`
    ///
    /// Returns the number of comments and replies stored. A no-op when
    /// comments are disabled on `target`.
    pub async fn collect(&self, items: &[ItemRef], target: &CollectionTarget) -> usize {
        if !target.enable_comments || items.is_empty() {
            return 0;
        }
        tracing::info!("Collecting comments for {} item(s)", items.len());

        let total = items.len();
        let pipelines = items
            .iter()
            .enumerate()
            .map(|(index, item)| self.collect_item(index + 1, total, item, target));
        join_all(pipelines).await.into_iter().sum()
    }

    async fn collect_item(
        &self,
        index: usize,
        total: usize,
        item: &ItemRef,
        target: &CollectionTarget,
    ) -> usize {
        let Ok(_permit) = self.limiter.acquire().await else {
            return 0;
        };
        let max = target.max_comments_per_item;
        let mut cursor = String::new();
        let mut first_level = 0;
        let mut stored = 0;

        // Replies count toward the budget that decides whether another
        // first-level page is requested; truncation uses first-level only.
        while stored < max && !self.stop.is_stopped() {
            let outcome = PageOutcome::from_fetch(self.api.comment_page(item, &cursor).await);
            let page = match outcome {
                PageOutcome::Items(page) => page,
                PageOutcome::Exhausted => break,
                PageOutcome::Blocked(message) => {
                    tracing::warn!("Comments for {} blocked: {}", item.item_id, message);
                    RunStats::add(&self.stats.blocked, 1);
                    self.events.emit(CrawlEvent::Blocked {
                        seed: item.item_id.clone(),
                        message,
                    });
                    break;
                }
                PageOutcome::Failed(e) => {
                    self.report_failure(&item.item_id, &e);
                    break;
                }
            };

            let mut comments = self.matching(item, page.entries);
            comments.truncate(max.saturating_sub(first_level));
            first_level += comments.len();
            stored += self.store(item, &comments).await;

            self.events.emit(CrawlEvent::CommentProgress {
                item_index: index,
                total_items: total,
                comments_so_far: first_level,
                max_comments: max,
            });

            if target.enable_sub_comments {
                for comment in &comments {
                    if self.stop.is_stopped() {
                        break;
                    }
                    stored += self.collect_replies(item, comment).await;
                }
            }

            if !page.has_more || page.cursor.is_empty() || page.cursor == cursor || stored >= max {
                break;
            }
            tokio::time::sleep(self.interval).await;
            cursor = page.cursor;
        }

        tracing::debug!("Item {}: {} comment(s) stored", item.item_id, stored);
        stored
    }

    /// Stores the inline replies of `parent`, then pages its remaining replies
    ///
    /// A reply thread is always followed to its end; the per-item budget is
    /// only checked between first-level pages.
    async fn collect_replies(&self, item: &ItemRef, parent: &Comment) -> usize {
        let inline = self.matching(item, parent.inline_replies.clone());
        let mut stored = self.store(item, &inline).await;

        if !parent.has_more_replies {
            return stored;
        }

        let mut cursor = parent.reply_cursor.clone();
        while !self.stop.is_stopped() {
            let outcome =
                PageOutcome::from_fetch(self.api.reply_page(item, parent, &cursor).await);
            let page = match outcome {
                PageOutcome::Items(page) => page,
                PageOutcome::Exhausted => break,
                PageOutcome::Blocked(message) => {
                    tracing::warn!(
                        "Replies to {} on {} blocked: {}",
                        parent.comment_id,
                        item.item_id,
                        message
                    );
                    RunStats::add(&self.stats.blocked, 1);
                    break;
                }
                PageOutcome::Failed(e) => {
                    self.report_failure(&item.item_id, &e);
                    break;
                }
            };

            let replies = self.matching(item, page.entries);
            stored += self.store(item, &replies).await;

            if !page.has_more || page.cursor.is_empty() || page.cursor == cursor {
                break;
            }
            tokio::time::sleep(self.interval).await;
            cursor = page.cursor;
        }
        stored
    }

    /// Drops comments that belong to a different item
    fn matching(&self, item: &ItemRef, comments: Vec<Comment>) -> Vec<Comment> {
        comments
            .into_iter()
            .filter(|c| {
                let ok = c.item_id == item.item_id;
                if !ok {
                    tracing::warn!(
                        "Dropping comment {}: belongs to {} not {}",
                        c.comment_id,
                        c.item_id,
                        item.item_id
                    );
                }
                ok
            })
            .collect()
    }

    async fn store(&self, item: &ItemRef, comments: &[Comment]) -> usize {
        if comments.is_empty() {
            return 0;
        }
        let mut stored = 0;
        for comment in comments {
            match self.sink.store_comment(comment).await {
                Ok(()) => stored += 1,
                Err(e) => tracing::error!("Failed to store comment {}: {}", comment.comment_id, e),
            }
        }
        RunStats::add(&self.stats.comments, stored);
        self.events.emit(CrawlEvent::CommentsStored {
            item_id: item.item_id.clone(),
            count: stored,
        });
        stored
    }

    fn report_failure(&self, item_id: &str, error: &ApiError) {
        tracing::warn!("Comment collection for {} ended early: {}", item_id, error);
        if let ApiError::SigningUnavailable { .. } = error {
            self.events.emit(CrawlEvent::SigningUnavailable {
                message: error.to_string(),
            });
        }
    }
}
