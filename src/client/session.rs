//! Browser session state mirrored into outgoing requests

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A cookie as read from the browser context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
}

impl BrowserCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: "/".to_string(),
            ..Default::default()
        }
    }
}

/// Cookie header and cookie map derived from the browser jar
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    cookie_header: String,
    cookies: HashMap<String, String>,
    user_agent: String,
}

impl SessionState {
    /// Derives the session from a cookie jar
    ///
    /// # Arguments
    ///
    /// * `cookies` - Cookies currently held by the browser context
    /// * `domain` - Registrable domain to keep, e.g. `xiaohongshu.com`; cookies
    ///   scoped to other sites are ignored
    pub fn from_cookies(cookies: &[BrowserCookie], domain: &str) -> Self {
        let mut map = HashMap::new();
        let mut pairs = Vec::new();

        for cookie in cookies {
            if !domain.is_empty() && !cookie.domain.trim_start_matches('.').ends_with(domain) {
                continue;
            }
            if cookie.name.is_empty() {
                continue;
            }
            // Later cookies with the same name win, matching browser precedence
            if map.insert(cookie.name.clone(), cookie.value.clone()).is_none() {
                pairs.push(cookie.name.clone());
            }
        }

        let cookie_header = pairs
            .iter()
            .filter_map(|name| map.get(name).map(|value| format!("{}={}", name, value)))
            .collect::<Vec<_>>()
            .join("; ");

        Self {
            cookie_header,
            cookies: map,
            user_agent: String::new(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn cookie_header(&self) -> &str {
        &self.cookie_header
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}
