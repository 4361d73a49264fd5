//! Signed HTTP execution
//!
//! This module turns a logical remote call into a signed HTTP request:
//! - Building the reqwest client with timeouts and manual redirect handling
//! - Signing through the shared `Signer`
//! - Bounded retries for transport failures (timeouts, resets, 5xx)
//! - Classifying captcha statuses and unwrapping the platform envelope
//! - Mirroring the browser cookie jar into outgoing requests

use crate::client::error::{ApiError, ApiResult};
use crate::client::session::{BrowserCookie, SessionState};
use crate::client::signer::{SignRequest, SignatureSet, Signer};
use crate::config::ClientConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, LOCATION, USER_AGENT};
use reqwest::{redirect::Policy, Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

/// Default desktop user agent until the browser reports its own
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Captcha statuses carrying `Verifytype` / `Verifyuuid` headers
const VERIFICATION_STATUSES: [u16; 2] = [461, 471];

/// Platform conventions the signing client needs to know about
pub trait ApiDialect: Send + Sync {
    /// Registrable domain whose cookies belong to the session
    fn cookie_domain(&self) -> &str;

    /// Headers sent with every API call (origin, referer)
    fn default_headers(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Query parameters merged into every GET before signing
    fn common_query(&self, _session: &SessionState) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Session value the signature is bound to
    fn session_fragment(&self, session: &SessionState) -> String;

    /// Places the signature on the outgoing request
    fn attach_signature(&self, request: RequestBuilder, signature: &SignatureSet) -> RequestBuilder;

    /// Classifies a response body into the payload or an error
    fn unwrap_envelope(&self, body: &str) -> ApiResult<Value>;
}

/// A logical remote call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>, query: Vec<(String, String)>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query,
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }
}

/// Builds a query parameter list from string pairs
pub fn query_pairs<K: ToString, V: ToString>(pairs: &[(K, V)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// HTTP client that signs every API call through the shared page
pub struct SigningClient {
    http: Client,
    base_url: String,
    signer: Arc<dyn Signer>,
    dialect: Arc<dyn ApiDialect>,
    session: RwLock<SessionState>,
    transport_retries: u32,
    transport_retry_delay: Duration,
}

impl SigningClient {
    /// Creates a signing client
    ///
    /// # Arguments
    ///
    /// * `base_url` - API host, e.g. `https://edith.xiaohongshu.com`
    /// * `config` - Timeout and retry settings
    /// * `signer` - The shared signer
    /// * `dialect` - Platform envelope and signature conventions
    ///
    /// # Returns
    ///
    /// * `Ok(SigningClient)` - Ready to execute calls once a session is loaded
    /// * `Err(reqwest::Error)` - Failed to build the HTTP client
    pub fn new(
        base_url: impl Into<String>,
        config: &ClientConfig,
        signer: Arc<dyn Signer>,
        dialect: Arc<dyn ApiDialect>,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10))
            .redirect(Policy::none()) // Short links are resolved one hop at a time
            .gzip(true)
            .brotli(true)
            .build()?;

        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signer,
            dialect,
            session: RwLock::new(SessionState::default().with_user_agent(user_agent)),
            transport_retries: config.transport_retries.max(1),
            transport_retry_delay: config.transport_retry_delay(),
        })
    }

    /// Re-derives the cookie header from the browser jar
    ///
    /// Must be called after any navigation or login change on the page.
    pub async fn refresh_session(&self, cookies: &[BrowserCookie]) {
        let mut session = self.session.write().await;
        let user_agent = session.user_agent().to_string();
        *session = SessionState::from_cookies(cookies, self.dialect.cookie_domain())
            .with_user_agent(user_agent);
        tracing::debug!("Session refreshed with {} cookie(s)", cookies.len());
    }

    /// Replaces the user agent, normally with the browser's own
    pub async fn set_user_agent(&self, user_agent: impl Into<String>) {
        let mut session = self.session.write().await;
        *session = session.clone().with_user_agent(user_agent);
    }

    pub async fn session(&self) -> SessionState {
        self.session.read().await.clone()
    }

    /// Signs and executes a call, returning the envelope payload
    ///
    /// # Returns
    ///
    /// * `Ok(Value)` - The payload substructure of a successful envelope
    /// * `Err(ApiError::Blocked | Verification)` - The remote flagged the session
    /// * `Err(ApiError::DataFetch)` - Unsuccessful envelope or transport failure
    ///   after the retry budget
    /// * `Err(ApiError::SigningUnavailable)` - The signing function never appeared
    pub async fn execute(&self, request: ApiRequest) -> ApiResult<Value> {
        let session = self.session().await;

        let mut query = request.query.clone();
        if request.method == Method::GET {
            query.extend(self.dialect.common_query(&session));
        }
        let uri = signed_uri(&request.path, &query);
        let body = request.body.as_ref().map(Value::to_string);

        let signature = self
            .signer
            .sign(&SignRequest {
                uri: uri.clone(),
                body: body.clone(),
                session_fragment: self.dialect.session_fragment(&session),
            })
            .await?;

        let url = format!("{}{}", self.base_url, uri);
        let response = self
            .send_with_retry(|| {
                let mut builder = self
                    .http
                    .request(request.method.clone(), &url)
                    .headers(self.base_headers(&session));
                if let Some(body) = &body {
                    builder = builder
                        .header(CONTENT_TYPE, "application/json;charset=UTF-8")
                        .body(body.clone());
                }
                self.dialect.attach_signature(builder, &signature)
            })
            .await?;

        let status = response.status();
        if VERIFICATION_STATUSES.contains(&status.as_u16()) {
            let kind = header_str(response.headers(), "Verifytype");
            let uuid = header_str(response.headers(), "Verifyuuid");
            tracing::error!(
                "Verification challenge on {} (type {}, uuid {})",
                request.path,
                kind,
                uuid
            );
            return Err(ApiError::Verification { kind, uuid });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::blocked(format!("{} rate limited", request.path)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::data_fetch(format!("reading body of {}: {}", request.path, e)))?;

        self.dialect.unwrap_envelope(&text)
    }

    /// Fetches a page as text with the session cookies but no signature
    pub async fn fetch_text(&self, url: &str) -> ApiResult<String> {
        let session = self.session().await;
        let response = self
            .send_with_retry(|| self.http.get(url).headers(self.base_headers(&session)))
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::data_fetch(format!("GET {} returned {}", url, status)));
        }

        response
            .text()
            .await
            .map_err(|e| ApiError::data_fetch(format!("reading {}: {}", url, e)))
    }

    /// Downloads a media resource
    pub async fn fetch_bytes(&self, url: &str) -> ApiResult<Vec<u8>> {
        let session = self.session().await;
        let response = self
            .send_with_retry(|| {
                self.http
                    .get(url)
                    .header(USER_AGENT, session.user_agent().to_string())
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::data_fetch(format!("GET {} returned {}", url, status)));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ApiError::data_fetch(format!("reading {}: {}", url, e)))
    }

    /// Follows exactly one redirect hop
    ///
    /// # Returns
    ///
    /// * `Ok(Some(url))` - The absolute redirect target
    /// * `Ok(None)` - The URL did not redirect
    pub async fn resolve_redirect(&self, url: &str) -> ApiResult<Option<String>> {
        let session = self.session().await;
        let response = self
            .send_with_retry(|| {
                self.http
                    .get(url)
                    .header(USER_AGENT, session.user_agent().to_string())
            })
            .await?;

        if !response.status().is_redirection() {
            return Ok(None);
        }

        let location = header_str(response.headers(), LOCATION.as_str());
        if location.is_empty() {
            return Err(ApiError::Parse(format!("redirect from {} has no Location", url)));
        }

        let base = Url::parse(url).map_err(|e| ApiError::Parse(format!("{}: {}", url, e)))?;
        let target = base
            .join(&location)
            .map_err(|e| ApiError::Parse(format!("{}: {}", location, e)))?;
        Ok(Some(target.to_string()))
    }

    fn base_headers(&self, session: &SessionState) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(session.user_agent()) {
            headers.insert(USER_AGENT, value);
        }
        if !session.cookie_header().is_empty() {
            if let Ok(value) = HeaderValue::from_str(session.cookie_header()) {
                headers.insert(COOKIE, value);
            }
        }
        for (name, value) in self.dialect.default_headers() {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                headers.insert(name, value);
            }
        }
        headers
    }

    /// Sends a request, retrying transport failures with a fixed delay
    async fn send_with_retry<F>(&self, build: F) -> ApiResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_error = String::new();

        for attempt in 1..=self.transport_retries {
            match build().send().await {
                Ok(response) if response.status().is_server_error() => {
                    last_error = format!("server error {}", response.status());
                }
                Ok(response) => return Ok(response),
                Err(e) => {
                    last_error = describe_transport_error(&e);
                }
            }

            if attempt < self.transport_retries {
                tracing::warn!(
                    "Transport failure (attempt {}/{}): {}",
                    attempt,
                    self.transport_retries,
                    last_error
                );
                tokio::time::sleep(self.transport_retry_delay).await;
            }
        }

        Err(ApiError::data_fetch(format!(
            "giving up after {} attempt(s): {}",
            self.transport_retries, last_error
        )))
    }
}

/// Path plus encoded query string, as handed to the signer
fn signed_uri(path: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query.iter())
        .finish();
    format!("{}?{}", path, encoded)
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("timeout: {}", error)
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    }
}
