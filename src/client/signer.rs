//! Request signing through a shared browser page
//!
//! Signatures come from a function injected into a controlled browser page.
//! The algorithm is never reimplemented here; the page is a black box that
//! takes the request path, body and session fragments and returns a
//! signature tuple.
//!
//! A page evaluates one script at a time, so every signature computation is a
//! critical section. `PageSigner` holds a single async mutex across the whole
//! ready-check / storage-read / invoke sequence; concurrent HTTP calls queue
//! on it while their transport work proceeds in parallel.

use crate::client::error::{ApiError, ApiResult};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Input to one signature computation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignRequest {
    /// Request path including the encoded query string
    pub uri: String,
    /// Serialized JSON body for POST requests
    pub body: Option<String>,
    /// Session fragment the signature is bound to (a cookie value or user agent)
    pub session_fragment: String,
}

/// Ephemeral per-request signature values, never persisted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureSet {
    pub signature: String,
    pub timestamp: String,
    pub trace_id: String,
    /// Empty when the page function does not produce one
    pub common: String,
}

/// Produces signatures for outgoing requests
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, request: &SignRequest) -> ApiResult<SignatureSet>;
}

/// A browser page that can evaluate JavaScript expressions
#[async_trait]
pub trait SigningPage: Send + Sync {
    /// Evaluates an expression and returns its JSON value
    async fn evaluate(&self, expression: &str) -> ApiResult<Value>;
}

/// Where the injected signing function lives on a platform's page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignerProfile {
    /// Global function name, e.g. `window._webmsxyw`
    pub function: &'static str,
    /// Local-storage key whose value is passed to the function
    pub storage_key: Option<&'static str>,
}

impl SignerProfile {
    fn ready_check(&self) -> String {
        format!("typeof {} === 'function'", self.function)
    }
}

/// Production signer bridging to the shared browser page
pub struct PageSigner {
    page: Arc<dyn SigningPage>,
    profile: SignerProfile,
    gate: Mutex<()>,
    retries: u32,
    retry_delay: Duration,
}

impl PageSigner {
    /// Creates a signer over the given page
    ///
    /// # Arguments
    ///
    /// * `page` - The shared page the signing function was injected into
    /// * `profile` - Function and storage names for the platform
    /// * `retries` - Attempts at finding the function before giving up
    /// * `retry_delay` - Pause between attempts while the page finishes loading
    pub fn new(
        page: Arc<dyn SigningPage>,
        profile: SignerProfile,
        retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            page,
            profile,
            gate: Mutex::new(()),
            retries: retries.max(1),
            retry_delay,
        }
    }

    async fn wait_ready(&self) -> ApiResult<()> {
        let check = self.profile.ready_check();
        let mut reason = String::new();

        for attempt in 1..=self.retries {
            match self.page.evaluate(&check).await {
                Ok(Value::Bool(true)) => return Ok(()),
                Ok(_) => reason = format!("{} is not defined", self.profile.function),
                Err(e) => reason = e.to_string(),
            }

            if attempt < self.retries {
                tracing::warn!(
                    "Signing function not ready, retry {}/{}: {}",
                    attempt,
                    self.retries,
                    reason
                );
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(ApiError::SigningUnavailable {
            attempts: self.retries,
            reason,
        })
    }

    async fn read_storage(&self) -> String {
        let Some(key) = self.profile.storage_key else {
            return String::new();
        };
        let expression = format!("window.localStorage.getItem({})", js_string(key));
        match self.page.evaluate(&expression).await {
            Ok(Value::String(value)) => value,
            Ok(_) => String::new(),
            Err(e) => {
                tracing::debug!("Could not read local storage key {}: {}", key, e);
                String::new()
            }
        }
    }
}

#[async_trait]
impl Signer for PageSigner {
    async fn sign(&self, request: &SignRequest) -> ApiResult<SignatureSet> {
        let _guard = self.gate.lock().await;

        self.wait_ready().await?;
        let storage = self.read_storage().await;

        let body = request
            .body
            .as_deref()
            .map(js_string)
            .unwrap_or_else(|| "null".to_string());
        let expression = format!(
            "{}({}, {}, {}, {})",
            self.profile.function,
            js_string(&request.uri),
            body,
            js_string(&request.session_fragment),
            js_string(&storage)
        );

        let output = self
            .page
            .evaluate(&expression)
            .await
            .map_err(|e| ApiError::SigningUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;

        signature_from_output(&output)
    }
}

/// Maps the page function's return value onto a signature set
fn signature_from_output(output: &Value) -> ApiResult<SignatureSet> {
    let signature = pick(output, &["X-s", "x-s", "X-S", "signature", "a_bogus"]).ok_or_else(|| {
        ApiError::SigningUnavailable {
            attempts: 1,
            reason: "signing function returned no signature".to_string(),
        }
    })?;
    let timestamp = pick(output, &["X-t", "x-t", "X-T", "timestamp"])
        .unwrap_or_else(|| Utc::now().timestamp_millis().to_string());
    let common = pick(output, &["x-S-Common", "x-s-common", "X-S-Common", "common"]).unwrap_or_default();

    Ok(SignatureSet {
        signature,
        timestamp,
        trace_id: new_trace_id(),
        common,
    })
}

fn pick(output: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match output.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

static TRACE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 16 hex characters, unique per process
pub fn new_trace_id() -> String {
    let mut hasher = Sha256::new();
    hasher.update(Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(TRACE_COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// Deterministic signer for tests and offline runs
///
/// The signature is a SHA-256 digest of the request, so identical requests
/// always sign identically.
#[derive(Debug, Default)]
pub struct FixtureSigner {
    calls: AtomicUsize,
}

impl FixtureSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of signatures produced so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signer for FixtureSigner {
    async fn sign(&self, request: &SignRequest) -> ApiResult<SignatureSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut hasher = Sha256::new();
        hasher.update(request.uri.as_bytes());
        hasher.update(request.body.as_deref().unwrap_or_default().as_bytes());
        hasher.update(request.session_fragment.as_bytes());
        let digest = hex::encode(hasher.finalize());

        Ok(SignatureSet {
            signature: format!("XYW_{}", &digest[..32]),
            timestamp: "1700000000000".to_string(),
            trace_id: digest[32..48].to_string(),
            common: format!("fixture-{}", &digest[48..56]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    /// Page double scripted with readiness answers and a fixed output
    struct ScriptedPage {
        ready_answers: StdMutex<Vec<bool>>,
        output: Value,
        seen: StdMutex<Vec<String>>,
    }

    impl ScriptedPage {
        fn new(ready_answers: Vec<bool>, output: Value) -> Self {
            Self {
                ready_answers: StdMutex::new(ready_answers),
                output,
                seen: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SigningPage for ScriptedPage {
        async fn evaluate(&self, expression: &str) -> ApiResult<Value> {
            self.seen.lock().unwrap().push(expression.to_string());
            if expression.starts_with("typeof") {
                let mut answers = self.ready_answers.lock().unwrap();
                let ready = if answers.is_empty() { true } else { answers.remove(0) };
                return Ok(Value::Bool(ready));
            }
            if expression.starts_with("window.localStorage") {
                return Ok(json!("b1-value"));
            }
            Ok(self.output.clone())
        }
    }

    const PROFILE: SignerProfile = SignerProfile {
        function: "window._webmsxyw",
        storage_key: Some("b1"),
    };

    fn request() -> SignRequest {
        SignRequest {
            uri: "/api/sns/web/v1/feed".to_string(),
            body: Some(r#"{"source_note_id":"abc"}"#.to_string()),
            session_fragment: "a1-cookie".to_string(),
        }
    }

    #[tokio::test]
    async fn test_page_signer_maps_output() {
        let page = Arc::new(ScriptedPage::new(
            vec![true],
            json!({"X-s": "XYW_sig", "X-t": 1700000000123u64}),
        ));
        let signer = PageSigner::new(page.clone(), PROFILE, 3, Duration::from_millis(1));

        let signature = signer.sign(&request()).await.unwrap();
        assert_eq!(signature.signature, "XYW_sig");
        assert_eq!(signature.timestamp, "1700000000123");
        assert_eq!(signature.trace_id.len(), 16);
        assert_eq!(signature.common, "");

        let seen = page.seen.lock().unwrap();
        let invoke = seen.last().unwrap();
        assert!(invoke.starts_with("window._webmsxyw(\"/api/sns/web/v1/feed\""));
        assert!(invoke.contains("\"b1-value\""));
    }

    #[tokio::test]
    async fn test_page_signer_waits_for_function() {
        let page = Arc::new(ScriptedPage::new(vec![false, false, true], json!({"X-s": "ok"})));
        let signer = PageSigner::new(page, PROFILE, 3, Duration::from_millis(1));

        assert_eq!(signer.sign(&request()).await.unwrap().signature, "ok");
    }

    #[tokio::test]
    async fn test_page_signer_gives_up_after_retries() {
        let page = Arc::new(ScriptedPage::new(vec![false, false, false], json!({"X-s": "ok"})));
        let signer = PageSigner::new(page, PROFILE, 3, Duration::from_millis(1));

        let err = signer.sign(&request()).await.unwrap_err();
        assert!(matches!(err, ApiError::SigningUnavailable { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_missing_signature_is_unavailable() {
        let page = Arc::new(ScriptedPage::new(vec![], json!({"unexpected": true})));
        let signer = PageSigner::new(page, PROFILE, 1, Duration::from_millis(1));

        assert!(matches!(
            signer.sign(&request()).await,
            Err(ApiError::SigningUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_fixture_signer_is_deterministic() {
        let signer = FixtureSigner::new();
        let first = signer.sign(&request()).await.unwrap();
        let second = signer.sign(&request()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(signer.calls(), 2);
        assert!(first.signature.starts_with("XYW_"));
    }

    #[test]
    fn test_trace_ids_differ() {
        assert_ne!(new_trace_id(), new_trace_id());
    }
}
