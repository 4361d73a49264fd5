//! Signing client
//!
//! This module covers everything between a logical remote call and its
//! classified result:
//! - `Signer` / `PageSigner`: serialized signature computation on the shared page
//! - `SigningClient`: signed execution, transport retries, envelope classification
//! - `SessionState`: the browser cookie jar mirrored into requests
//! - `browser` (feature `browser`): the Chromium-backed page and cookie jar

#[cfg(feature = "browser")]
pub mod browser;
mod error;
mod http;
mod session;
mod signer;

pub use error::{ApiError, ApiResult};
pub use http::{query_pairs, ApiDialect, ApiRequest, SigningClient, DEFAULT_USER_AGENT};
pub use session::{BrowserCookie, SessionState};
pub use signer::{
    new_trace_id, FixtureSigner, PageSigner, SignRequest, SignatureSet, Signer, SignerProfile,
    SigningPage,
};
