//! Crawl events and cooperative cancellation
//!
//! The engine reports progress by sending `CrawlEvent`s over an unbounded
//! channel. A driver that stops listening never affects collection.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Something the driver may want to show
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    /// An item was fully persisted
    Progress {
        current: usize,
        total: usize,
        message: String,
    },
    /// Per-item comment progress; `item_index` is fixed at submission
    CommentProgress {
        item_index: usize,
        total_items: usize,
        comments_so_far: usize,
        max_comments: usize,
    },
    ItemStored {
        item_id: String,
    },
    CommentsStored {
        item_id: String,
        count: usize,
    },
    CreatorStored {
        user_id: String,
    },
    SeedSkipped {
        seed: String,
        reason: String,
    },
    Blocked {
        seed: String,
        message: String,
    },
    /// The signing page could not produce a signature; a session refresh may help
    SigningUnavailable {
        message: String,
    },
    Finished(RunSummary),
}

/// Totals for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub items_stored: usize,
    pub comments_stored: usize,
    pub creators_stored: usize,
    pub seeds_skipped: usize,
    pub blocked: usize,
    /// Output files written (file formats only)
    pub files: Vec<PathBuf>,
    /// Whether the stop signal cut the run short
    pub stopped: bool,
}

/// Counters shared by the concurrent pipelines of one run
#[derive(Debug, Default)]
pub(crate) struct RunStats {
    pub items: AtomicUsize,
    pub comments: AtomicUsize,
    pub creators: AtomicUsize,
    pub skipped: AtomicUsize,
    pub blocked: AtomicUsize,
}

impl RunStats {
    pub fn add(counter: &AtomicUsize, n: usize) -> usize {
        counter.fetch_add(n, Ordering::SeqCst) + n
    }

    pub fn summary(&self, files: Vec<PathBuf>, stopped: bool) -> RunSummary {
        RunSummary {
            items_stored: self.items.load(Ordering::SeqCst),
            comments_stored: self.comments.load(Ordering::SeqCst),
            creators_stored: self.creators.load(Ordering::SeqCst),
            seeds_skipped: self.skipped.load(Ordering::SeqCst),
            blocked: self.blocked.load(Ordering::SeqCst),
            files,
            stopped,
        }
    }
}

/// Sending half of the event channel
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<UnboundedSender<CrawlEvent>>,
    closed: Arc<AtomicBool>,
}

impl EventSink {
    /// Creates a sink and the receiver the driver reads from
    pub fn channel() -> (Self, UnboundedReceiver<CrawlEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                closed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// A sink that drops every event
    pub fn disabled() -> Self {
        Self {
            tx: None,
            closed: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn emit(&self, event: CrawlEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(event).is_err() && !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Event receiver closed; further events are dropped");
        }
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Cooperative stop flag, polled between pages and items
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
