//! Chromium-backed browser session
//!
//! Launches Chrome with a persistent profile so a manual login survives
//! restarts, exposes the page as a `SigningPage` and reads the cookie jar
//! for `SigningClient::refresh_session`.

use crate::client::error::{ApiError, ApiResult};
use crate::client::session::BrowserCookie;
use crate::client::signer::SigningPage;
use crate::config::BrowserConfig;
use crate::HarvestError;
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig as ChromeConfig, Page};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A running browser with one page shared by all signers
pub struct BrowserSession {
    _browser: Browser,
    handler: JoinHandle<()>,
    page: Arc<ChromiumPage>,
}

impl BrowserSession {
    /// Launches the browser and opens `start_url`
    ///
    /// # Arguments
    ///
    /// * `config` - Headless flag, profile directory and executable
    /// * `start_url` - Platform home page; the signing function is injected there
    pub async fn launch(config: &BrowserConfig, start_url: &str) -> Result<Self, HarvestError> {
        std::fs::create_dir_all(&config.user_data_dir)?;

        let mut builder = ChromeConfig::builder()
            .user_data_dir(config.user_data_dir.clone())
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &config.executable {
            builder = builder.chrome_executable(executable.clone());
        }

        let chrome_config = builder
            .build()
            .map_err(|e| HarvestError::Browser(format!("invalid browser config: {}", e)))?;

        tracing::info!("Launching browser (headless={})", config.headless);
        let (browser, mut handler) = Browser::launch(chrome_config)
            .await
            .map_err(|e| HarvestError::Browser(format!("launch failed: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page(start_url)
            .await
            .map_err(|e| HarvestError::Browser(format!("cannot open {}: {}", start_url, e)))?;

        Ok(Self {
            _browser: browser,
            handler,
            page: Arc::new(ChromiumPage { page }),
        })
    }

    /// The page signatures are computed on
    pub fn signing_page(&self) -> Arc<dyn SigningPage> {
        self.page.clone()
    }

    /// Current cookies of the page's browser context
    pub async fn cookies(&self) -> Result<Vec<BrowserCookie>, HarvestError> {
        let cookies = self
            .page
            .page
            .get_cookies()
            .await
            .map_err(|e| HarvestError::Browser(format!("cannot read cookies: {}", e)))?;

        Ok(cookies
            .into_iter()
            .map(|c| BrowserCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                secure: c.secure,
                http_only: c.http_only,
            })
            .collect())
    }

    /// The browser's own user agent string
    pub async fn user_agent(&self) -> Option<String> {
        match self.page.evaluate("navigator.userAgent").await {
            Ok(Value::String(ua)) => Some(ua),
            _ => None,
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// A Chromium page evaluating expressions over CDP
pub struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl SigningPage for ChromiumPage {
    async fn evaluate(&self, expression: &str) -> ApiResult<Value> {
        let result = self
            .page
            .evaluate(expression.to_string())
            .await
            .map_err(|e| ApiError::SigningUnavailable {
                attempts: 1,
                reason: e.to_string(),
            })?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }
}
