//! HTTP page session
//!
//! A `PageSession` backed by `reqwest` with its own cookie jar and request
//! quota. Pages are fetched once per navigation; `wait_for_element` resolves
//! the locator against the loaded document and against tables that the site
//! ships inside HTML comments.

use std::num::NonZeroU32;
use std::ops::Deref;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use scraper::{Html, Selector};
use tracing::{debug, info};

use crate::domain::{ElementHandle, PageSession, SessionError, SessionFactory};
use crate::infrastructure::config::HttpConfig;

struct LoadedPage {
    url: String,
    html: String,
}

pub struct HttpPageSession {
    session_id: usize,
    client: Client,
    rate_limiter: DefaultDirectRateLimiter,
    page: Option<LoadedPage>,
    closed: bool,
}

impl HttpPageSession {
    pub fn new(session_id: usize, config: &HttpConfig) -> Result<Self, SessionError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).map_err(|e| driver(format!("invalid user agent: {e}")))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| driver(format!("failed to create HTTP client: {e}")))?;

        let per_second = NonZeroU32::new(config.max_requests_per_second)
            .ok_or_else(|| driver("rate limit must be greater than 0"))?;
        let rate_limiter = RateLimiter::direct(Quota::per_second(per_second));

        Ok(Self {
            session_id,
            client,
            rate_limiter,
            page: None,
            closed: false,
        })
    }

    /// URL of the page currently loaded
    #[must_use]
    pub fn current_url(&self) -> Option<&str> {
        self.page.as_ref().map(|p| p.url.as_str())
    }

    async fn fetch(&self, url: &str) -> Result<String, SessionError> {
        self.rate_limiter.until_ready().await;

        let response = self.client.get(url).send().await.map_err(|e| request_error(url, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(driver(format!("HTTP {status} for {url}")));
        }
        response.text().await.map_err(|e| request_error(url, &e))
    }
}

#[async_trait]
impl PageSession for HttpPageSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        self.page = None;
        debug!("🌐 Session {} fetching {}", self.session_id, url);

        let html = tokio::time::timeout(timeout, self.fetch(url))
            .await
            .map_err(|_| SessionError::NavigateTimeout { url: url.to_string() })??;

        debug!("📄 Session {} loaded {} ({} bytes)", self.session_id, url, html.len());
        self.page = Some(LoadedPage {
            url: url.to_string(),
            html,
        });
        Ok(())
    }

    async fn wait_for_element(&mut self, locator: &str, _timeout: Duration) -> Result<ElementHandle, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let page = self.page.as_ref().ok_or_else(|| driver("no page loaded"))?;

        // A fetched document never changes, so a missing element is final.
        find_element(&page.html, locator)?
            .map(|markup| ElementHandle::new(locator.to_string(), markup))
            .ok_or_else(|| SessionError::ElementTimeout {
                locator: locator.to_string(),
            })
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        self.closed = true;
        self.page = None;
        debug!("Session {} closed", self.session_id);
        Ok(())
    }
}

/// Outer HTML of the first element matching `locator`, looking inside HTML
/// comments when the live document has no match.
fn find_element(html: &str, locator: &str) -> Result<Option<String>, SessionError> {
    let selector = Selector::parse(locator).map_err(|e| driver(format!("invalid locator '{locator}': {e}")))?;
    let document = Html::parse_document(html);

    if let Some(element) = document.select(&selector).next() {
        return Ok(Some(element.html()));
    }

    for node in document.tree.root().descendants() {
        let Some(comment) = node.value().as_comment() else {
            continue;
        };
        let text: &str = comment.deref();
        if !text.contains('<') {
            continue;
        }
        let fragment = Html::parse_fragment(text);
        if let Some(element) = fragment.select(&selector).next() {
            return Ok(Some(element.html()));
        }
    }
    Ok(None)
}

fn request_error(url: &str, error: &reqwest::Error) -> SessionError {
    if error.is_timeout() {
        SessionError::NavigateTimeout { url: url.to_string() }
    } else {
        driver(error.to_string())
    }
}

fn driver(message: impl Into<String>) -> SessionError {
    SessionError::Driver(message.into())
}

/// Creates one `HttpPageSession` per pool slot
pub struct HttpSessionFactory {
    config: HttpConfig,
}

impl HttpSessionFactory {
    #[must_use]
    pub const fn new(config: HttpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn create(&self, session_id: usize) -> Result<Box<dyn PageSession>, SessionError> {
        let session = HttpPageSession::new(session_id, &self.config)?;
        info!("🧭 HTTP session {} ready", session_id);
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures;

    #[test]
    fn test_finds_element_in_live_document() {
        let markup = find_element(fixtures::COMMENTED_PAGE, "#team_batting").unwrap().unwrap();
        assert!(markup.starts_with("<table id=\"team_batting\">"));
        assert!(markup.contains("Aaron Judge"));
    }

    #[test]
    fn test_finds_element_inside_comment() {
        let markup = find_element(fixtures::COMMENTED_PAGE, "#players_baserunning_batting")
            .unwrap()
            .unwrap();
        assert!(markup.contains("<th>SB</th>"));
    }

    #[test]
    fn test_missing_element_is_none() {
        assert_eq!(find_element(fixtures::COMMENTED_PAGE, "#team_pitching").unwrap(), None);
    }

    #[test]
    fn test_invalid_locator_is_driver_error() {
        let err = find_element(fixtures::COMMENTED_PAGE, "##").unwrap_err();
        assert!(matches!(err, SessionError::Driver(_)));
    }

    #[test]
    fn test_zero_rate_limit_is_rejected() {
        let config = HttpConfig {
            max_requests_per_second: 0,
            ..HttpConfig::default()
        };
        assert!(HttpPageSession::new(0, &config).is_err());
    }

    #[tokio::test]
    async fn test_wait_without_page_and_after_close() {
        let mut session = HttpPageSession::new(3, &HttpConfig::default()).unwrap();
        let err = session
            .wait_for_element("#team_batting", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Driver(_)));

        session.close().await.unwrap();
        assert_eq!(session.close().await.unwrap_err(), SessionError::Closed);
        let err = session
            .navigate("https://www.baseball-reference.com/", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::Closed);
    }
}
