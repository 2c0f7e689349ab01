//! Authenticated platform session acquisition
//!
//! The upstream platform has no documented API: it is reachable only through
//! a cookie-authenticated browser session. `SessionAcquirer` is the narrow
//! seam the rest of the pipeline sees; how the session is obtained stays
//! behind it. The production implementation drives the login form over a
//! cookie-jarred HTTP client and polls until the authentication artifacts
//! (four session cookies plus a page-embedded access key) are all present
//! and confirmed by the authorization-check endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, ClientBuilder};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::infrastructure::config::{PlatformConfig, SyncConfig};

/// Platform response code meaning "authorized / success".
pub const PLATFORM_OK: i64 = 1000;

/// Selector for the access key embedded in page metadata.
const ACCESS_KEY_SELECTOR: &str = r#"meta[name="access-key"], meta[name="accessKey"]"#;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Authentication timed out after {elapsed_secs}s (cookies present: {cookies_seen})")]
    AuthTimeout {
        elapsed_secs: u64,
        cookies_seen: usize,
    },

    #[error("Platform base URL is invalid: {0}")]
    InvalidBaseUrl(String),

    #[error("Platform credentials are not configured")]
    MissingCredentials,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// A validated session: the cookie set plus the page-embedded access key.
///
/// Owned exclusively by the acquirer/extractor for the duration of one cycle.
#[derive(Clone)]
pub struct PlatformSession {
    cookies: Vec<(String, String)>,
    access_key: String,
    pub captured_at: DateTime<Utc>,
}

impl PlatformSession {
    pub fn new(cookies: Vec<(String, String)>, access_key: String) -> Self {
        Self {
            cookies,
            access_key,
            captured_at: Utc::now(),
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Render the cookie set as a `Cookie:` header value. Also the
    /// "session string" exposed for diagnostic reuse.
    pub fn session_string(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl std::fmt::Debug for PlatformSession {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("PlatformSession")
            .field(
                "cookies",
                &self.cookies.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            )
            .field("access_key", &"[REDACTED]")
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// Capability seam: produce a validated session or fail.
#[async_trait]
pub trait SessionAcquirer: Send + Sync {
    async fn acquire(&self) -> Result<PlatformSession, SessionError>;
}

/// Production acquirer: login form submit + bounded cookie-quorum poll over
/// a cookie-jarred HTTP client. Every `acquire` call starts from a fresh
/// jar, so one cycle's session state can never leak into the next; dropping
/// the returned client at the end of `acquire` is the session teardown.
pub struct FormLoginAcquirer {
    platform: PlatformConfig,
    base_url: Url,
    request_timeout: Duration,
    auth_timeout: Duration,
    poll_interval: Duration,
    diagnostics_dir: std::path::PathBuf,
}

impl FormLoginAcquirer {
    pub fn new(platform: PlatformConfig, sync: &SyncConfig) -> Result<Self, SessionError> {
        let base_url = Url::parse(&platform.base_url)
            .map_err(|e| SessionError::InvalidBaseUrl(format!("{}: {e}", platform.base_url)))?;

        Ok(Self {
            platform,
            base_url,
            request_timeout: Duration::from_secs(sync.request_timeout_seconds),
            auth_timeout: Duration::from_secs(sync.auth_timeout_seconds),
            poll_interval: Duration::from_millis(sync.auth_poll_interval_ms),
            diagnostics_dir: sync.diagnostics_dir.clone(),
        })
    }

    fn fresh_client(&self) -> Result<(Client, Arc<Jar>), SessionError> {
        let jar = Arc::new(Jar::default());
        let client = ClientBuilder::new()
            .timeout(self.request_timeout)
            .user_agent("tenant-sync/0.2 (occupancy dashboard backend)")
            .cookie_provider(jar.clone())
            .gzip(true)
            .build()?;
        Ok((client, jar))
    }

    /// Submit the login form. The platform sets part of the cookie quorum on
    /// this response; the rest arrives from post-login scripts, which is why
    /// a poll loop follows instead of a single check.
    async fn submit_login(&self, client: &Client) -> Result<(), SessionError> {
        if self.platform.username.is_empty() || self.platform.password.is_empty() {
            return Err(SessionError::MissingCredentials);
        }

        // Bootstrap: load the login page first so pre-auth cookies land in the jar.
        let login_page = self.platform.endpoint(&self.platform.login_path);
        let _ = client.get(&login_page).send().await?;
        info!("Opened login page: {}", login_page);

        let submit_url = self.platform.endpoint(&self.platform.login_submit_path);
        let response = client
            .post(&submit_url)
            .json(&json!({
                "username": self.platform.username,
                "password": self.platform.password,
            }))
            .send()
            .await?;
        info!("Submitted credentials, status {}", response.status());
        Ok(())
    }

    /// Read the current cookie jar for the platform origin.
    fn capture_cookies(&self, jar: &Jar) -> Vec<(String, String)> {
        jar.cookies(&self.base_url)
            .and_then(|header| header.to_str().map(str::to_string).ok())
            .map(|header| parse_cookie_header(&header))
            .unwrap_or_default()
    }

    /// Synchronous authorization check with the candidate artifacts.
    async fn check_authorization(
        &self,
        client: &Client,
        access_key: &str,
    ) -> Result<bool, SessionError> {
        let url = self.platform.endpoint(&self.platform.auth_check_path);
        let response = client
            .post(&url)
            .header("_access_key", access_key)
            .json(&json!({ "accessKey": access_key }))
            .send()
            .await?;

        if !response.status().is_success() {
            debug!("Authorization check HTTP status: {}", response.status());
            return Ok(false);
        }

        #[derive(Deserialize)]
        struct AuthCheckResponse {
            code: i64,
        }

        let payload = response.json::<AuthCheckResponse>().await?;
        Ok(payload.code == PLATFORM_OK)
    }

    /// Save the last portal page body for post-mortem when the poll loop
    /// times out (the no-browser counterpart of a failure screenshot).
    async fn dump_failure_page(&self, body: &str) {
        let path = self.diagnostics_dir.join("auth-failure.html");
        if let Err(e) = tokio::fs::create_dir_all(&self.diagnostics_dir).await {
            warn!("Could not create diagnostics directory: {}", e);
            return;
        }
        match tokio::fs::write(&path, body).await {
            Ok(()) => info!("Saved authentication failure page to {:?}", path),
            Err(e) => warn!("Could not save authentication failure page: {}", e),
        }
    }
}

#[async_trait]
impl SessionAcquirer for FormLoginAcquirer {
    async fn acquire(&self) -> Result<PlatformSession, SessionError> {
        let (client, jar) = self.fresh_client()?;
        self.submit_login(&client).await?;

        let deadline = Instant::now() + self.auth_timeout;
        let started = Instant::now();
        let mut last_body = String::new();
        let mut cookies_seen = 0usize;

        // Errors inside the poll loop are transient by assumption; only the
        // deadline ends the attempt.
        loop {
            match client.get(self.base_url.as_str()).send().await {
                Ok(response) => {
                    last_body = response.text().await.unwrap_or_default();

                    let access_key = extract_access_key(&last_body);
                    let cookies = self.capture_cookies(&jar);
                    cookies_seen = cookies.len();

                    if let Some(access_key) = access_key {
                        if has_required_cookies(&cookies, &self.platform.required_cookies) {
                            debug!(
                                "Cookie quorum reached ({} cookies), checking authorization",
                                cookies.len()
                            );
                            match self.check_authorization(&client, &access_key).await {
                                Ok(true) => {
                                    info!(
                                        "✅ Session confirmed after {:.1}s",
                                        started.elapsed().as_secs_f32()
                                    );
                                    return Ok(PlatformSession::new(cookies, access_key));
                                }
                                Ok(false) => {
                                    warn!("Authorization check rejected candidate session, retrying");
                                }
                                Err(e) => warn!("Authorization check failed, retrying: {}", e),
                            }
                        }
                    }
                }
                Err(e) => warn!("Portal poll request failed, retrying: {}", e),
            }

            if Instant::now() >= deadline {
                break;
            }
            sleep(self.poll_interval).await;
        }

        self.dump_failure_page(&last_body).await;
        Err(SessionError::AuthTimeout {
            elapsed_secs: started.elapsed().as_secs(),
            cookies_seen,
        })
    }
}

/// Parse a `Cookie:` header value into name/value pairs.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// True when every required cookie name is present.
pub fn has_required_cookies(cookies: &[(String, String)], required: &[String]) -> bool {
    required
        .iter()
        .all(|name| cookies.iter().any(|(k, v)| k == name && !v.is_empty()))
}

/// Read the access key out of the page metadata, if present.
pub fn extract_access_key(page_html: &str) -> Option<String> {
    let document = Html::parse_document(page_html);
    let selector = Selector::parse(ACCESS_KEY_SELECTOR).ok()?;
    document
        .select(&selector)
        .filter_map(|element| element.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_header_parses_into_pairs() {
        let cookies = parse_cookie_header("_ams_token=abc; _common_token=def; _user_id=42");
        assert_eq!(
            cookies,
            vec![
                ("_ams_token".to_string(), "abc".to_string()),
                ("_common_token".to_string(), "def".to_string()),
                ("_user_id".to_string(), "42".to_string()),
            ]
        );
    }

    #[test]
    fn quorum_requires_every_cookie_non_empty() {
        let required = vec!["_ams_token".to_string(), "_common_token".to_string()];
        let full = parse_cookie_header("_ams_token=a; _common_token=b; extra=c");
        let partial = parse_cookie_header("_ams_token=a");
        let empty_value = parse_cookie_header("_ams_token=a; _common_token=");

        assert!(has_required_cookies(&full, &required));
        assert!(!has_required_cookies(&partial, &required));
        assert!(!has_required_cookies(&empty_value, &required));
    }

    #[test]
    fn access_key_is_read_from_page_metadata() {
        let html = r#"<html><head>
            <meta name="viewport" content="width=device-width">
            <meta name="access-key" content="ak-123456">
        </head><body></body></html>"#;
        assert_eq!(extract_access_key(html), Some("ak-123456".to_string()));
        assert_eq!(extract_access_key("<html><head></head></html>"), None);
    }

    #[test]
    fn session_debug_redacts_secrets() {
        let session = PlatformSession::new(
            vec![("_ams_token".to_string(), "secret-token".to_string())],
            "secret-key".to_string(),
        );
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(rendered.contains("_ams_token"));
    }

    /// Answer the first `respond_to_first` requests with an empty 200, then
    /// drop every later connection without a byte.
    async fn serve_then_drop(listener: tokio::net::TcpListener, respond_to_first: u32) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut served = 0u32;
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { return };
            served += 1;
            if served > respond_to_first {
                continue;
            }

            let mut raw = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let Ok(n) = stream.read(&mut chunk).await else { break };
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&chunk[..n]);
                if request_complete(&raw) {
                    break;
                }
            }
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
        }
    }

    fn request_complete(raw: &[u8]) -> bool {
        let Some(header_end) = raw.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let headers = String::from_utf8_lossy(&raw[..header_end]);
        let content_length = headers
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        raw.len() >= header_end + 4 + content_length
    }

    #[tokio::test]
    async fn poll_loop_outlasts_transport_errors_until_the_deadline() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Login page + credential submit succeed; every poll request after
        // that fails at the transport level.
        tokio::spawn(serve_then_drop(listener, 2));

        let platform = PlatformConfig {
            base_url: format!("http://{addr}"),
            username: "user".to_string(),
            password: "pass".to_string(),
            ..PlatformConfig::default()
        };
        let sync = SyncConfig {
            auth_timeout_seconds: 1,
            auth_poll_interval_ms: 50,
            request_timeout_seconds: 2,
            diagnostics_dir: std::env::temp_dir()
                .join(format!("tenant-sync-test-{}", uuid::Uuid::new_v4())),
            ..SyncConfig::default()
        };
        let acquirer = FormLoginAcquirer::new(platform, &sync).unwrap();

        let result = acquirer.acquire().await;
        assert!(
            matches!(result, Err(SessionError::AuthTimeout { .. })),
            "expected the deadline to end acquisition, got {result:?}"
        );
    }

    #[test]
    fn session_string_renders_a_cookie_header() {
        let session = PlatformSession::new(
            vec![
                ("_ams_token".to_string(), "a".to_string()),
                ("_common_token".to_string(), "b".to_string()),
            ],
            "key".to_string(),
        );
        assert_eq!(session.session_string(), "_ams_token=a; _common_token=b");
    }
}
