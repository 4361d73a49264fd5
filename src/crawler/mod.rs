//! Crawler module for paginated collection
//!
//! This module contains the core collection logic, including:
//! - Page outcome classification shared by every pagination loop
//! - Three-mode orchestration (search, detail, creator)
//! - Comment and reply collection under a shared concurrency limiter
//! - Progress events and cooperative cancellation
//! - Media download and the link-discovery fallback contract

mod comments;
mod coordinator;
mod discovery;
mod events;
mod media;
mod pagination;

pub use comments::CommentEngine;
pub use coordinator::{Coordinator, CrawlSettings};
pub use discovery::{LinkSource, StaticLinkSource};
pub use events::{CrawlEvent, EventSink, RunSummary, StopSignal};
pub use media::MediaDownloader;
pub use pagination::PageOutcome;
