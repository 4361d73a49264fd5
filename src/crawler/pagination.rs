//! Page fetch outcomes
//!
//! Every paginated loop (search, creator timeline, comments, replies) turns
//! the result of one page request into a `PageOutcome` and matches on it, so
//! "stop this loop" signals never travel as errors.

use crate::client::ApiError;
use crate::platform::Page;

/// What one page request produced
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome<T> {
    /// A non-empty page
    Items(Page<T>),
    /// No entries, or the envelope was missing the expected field
    Exhausted,
    /// The remote flagged the session; the current loop ends
    Blocked(String),
    /// Any other failure; the current loop ends
    Failed(ApiError),
}

impl<T> PageOutcome<T> {
    /// Classifies the result of a page request
    pub fn from_fetch(result: Result<Page<T>, ApiError>) -> Self {
        match result {
            Ok(page) if page.entries.is_empty() => Self::Exhausted,
            Ok(page) => Self::Items(page),
            Err(ApiError::Malformed { message }) => {
                tracing::debug!("Treating malformed page as exhausted: {}", message);
                Self::Exhausted
            }
            Err(e) if e.is_block() => Self::Blocked(e.to_string()),
            Err(e) => Self::Failed(e),
        }
    }
}
