//! Out-of-band CSS cache refresh.
//!
//! After a stylesheet import the forum still serves the previously compiled
//! CSS until its cache is rebuilt. The refresher POSTs to the forum's cache
//! endpoint and reports success as a plain boolean: a stale cache is
//! acceptable and self-healing on the next change, so no failure here is
//! ever fatal.

use crate::log;
use serde::Deserialize;
use std::time::Duration;

/// Upper bound on one refresh round-trip
const REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Response body of the cache endpoint.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    success: bool,
    #[serde(default)]
    message: String,
}

/// Client for the forum's `cachecss.php` endpoint.
#[derive(Clone)]
pub struct CacheRefresher {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl CacheRefresher {
    /// Build a refresher against a forum base URL.
    pub fn new(forum_url: &str, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REFRESH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: format!("{}/cachecss.php", forum_url.trim_end_matches('/')),
            token,
        }
    }

    /// Ask the forum to recompile a stylesheet's cached CSS.
    ///
    /// Returns `true` only on HTTP 2xx with `success = true` in the body.
    /// Every failure mode (timeout, transport error, non-2xx, declined,
    /// malformed JSON) logs a warning and returns `false`.
    pub async fn refresh(&self, theme_name: &str, stylesheet: &str) -> bool {
        let mut form = vec![("theme_name", theme_name), ("stylesheet", stylesheet)];
        if let Some(token) = self.token.as_deref() {
            form.push(("token", token));
        }

        let response = match self.client.post(&self.endpoint).form(&form).send().await {
            Ok(response) => response,
            Err(err) => {
                log!("cache"; "refresh request for {theme_name}/{stylesheet} failed: {err}");
                return false;
            }
        };

        if !response.status().is_success() {
            log!("cache"; "refresh for {theme_name}/{stylesheet} returned HTTP {}", response.status());
            return false;
        }

        match response.json::<RefreshResponse>().await {
            Ok(body) if body.success => true,
            Ok(body) => {
                log!("cache"; "refresh declined for {theme_name}/{stylesheet}: {}", body.message);
                false
            }
            Err(err) => {
                log!("cache"; "refresh for {theme_name}/{stylesheet} returned malformed JSON: {err}");
                false
            }
        }
    }
}
