use async_trait::async_trait;
use chrono::{Datelike, Local};
use futures::future::join_all;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;
use wf_core::{Article, ArticleProvider, Error, Result};

use crate::parse::{is_interesting, parse_on_this_day, parse_summary, OnThisDayFeed, PageSummary};

pub const DEFAULT_CONCURRENCY: usize = 10;
/// Random summaries requested per article asked for; the rest get filtered out
pub const DEFAULT_OVER_FETCH: usize = 3;
/// Upper bound on summary requests issued by one `random_articles` call
pub const MAX_REQUESTS_PER_CALL: usize = 150;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("wikifeed/", env!("CARGO_PKG_VERSION"));

lazy_static! {
    static ref LANG_CODE: Regex = Regex::new(r"^[a-z]{2,3}(-[a-z]+)?$").unwrap();
}

/// Wikipedia REST API client.
pub struct WikipediaProvider {
    client: Client,
    semaphore: Arc<Semaphore>,
    over_fetch: usize,
}

impl WikipediaProvider {
    pub fn new() -> Result<Self> {
        Self::with_concurrency(DEFAULT_CONCURRENCY)
    }

    pub fn with_concurrency(max_in_flight: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(max_in_flight.max(1))),
            over_fetch: DEFAULT_OVER_FETCH,
        })
    }

    pub fn with_over_fetch(mut self, factor: usize) -> Self {
        self.over_fetch = factor.max(1);
        self
    }

    fn request_count(&self, count: usize) -> usize {
        count.saturating_mul(self.over_fetch).min(MAX_REQUESTS_PER_CALL)
    }

    /// `https://{lang}.wikipedia.org/api/rest_v1/{path}`
    pub fn api_url(lang: &str, path: &str) -> Result<Url> {
        if !LANG_CODE.is_match(lang) {
            return Err(Error::InvalidConfig(format!("Unsupported language code: {}", lang)));
        }
        let base = Url::parse(&format!("https://{}.wikipedia.org/api/rest_v1/", lang))
            .map_err(|e| Error::InvalidConfig(format!("Bad endpoint for {}: {}", lang, e)))?;
        base.join(path)
            .map_err(|e| Error::InvalidConfig(format!("Bad API path {}: {}", path, e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| Error::External(e.into()))?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    /// One random page, or `None` if it does not make a usable article
    pub async fn random_summary(&self, lang: &str) -> Result<Option<Article>> {
        let url = Self::api_url(lang, "page/random/summary")?;
        let summary: PageSummary = self.get_json(url).await?;
        Ok(parse_summary(&summary, lang))
    }
}

#[async_trait]
impl ArticleProvider for WikipediaProvider {
    fn name(&self) -> &str {
        "Wikipedia"
    }

    async fn random_articles(&self, count: usize, lang: &str) -> Result<Vec<Article>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        Self::api_url(lang, "page/random/summary")?;

        let requested = self.request_count(count);
        info!("🌐 Fetching {} random {} summaries", requested, lang);
        let results = join_all((0..requested).map(|_| self.random_summary(lang))).await;

        let mut articles = Vec::new();
        let mut ids = HashSet::new();
        let mut failures = 0;
        let mut last_error = None;
        for result in results {
            match result {
                Ok(Some(article)) => {
                    if is_interesting(&article.hook, lang) && ids.insert(article.id.clone()) {
                        articles.push(article);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    debug!("Random summary request failed: {}", e);
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if failures == requested {
            let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
            return Err(Error::Provider(format!(
                "all {} requests to {}.wikipedia.org failed: {}",
                requested, lang, reason
            )));
        }
        if failures > 0 {
            warn!("⚠️ {}/{} random summary requests failed", failures, requested);
        }

        debug!("Kept {}/{} summaries", articles.len(), requested);
        articles.truncate(count);
        Ok(articles)
    }

    async fn on_this_day(&self, lang: &str) -> Result<Vec<Article>> {
        let today = Local::now();
        let path = format!("feed/onthisday/events/{:02}/{:02}", today.month(), today.day());
        let url = Self::api_url(lang, &path)?;
        let feed: OnThisDayFeed = self.get_json(url).await?;
        let articles = parse_on_this_day(&feed, lang);
        info!("📅 {} on-this-day events for {}", articles.len(), lang);
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url() {
        let url = WikipediaProvider::api_url("tr", "page/random/summary").unwrap();
        assert_eq!(url.as_str(), "https://tr.wikipedia.org/api/rest_v1/page/random/summary");

        let url = WikipediaProvider::api_url("en", "feed/onthisday/events/03/07").unwrap();
        assert_eq!(url.as_str(), "https://en.wikipedia.org/api/rest_v1/feed/onthisday/events/03/07");
    }

    #[test]
    fn test_api_url_rejects_bad_language() {
        for lang in ["", "EN", "en/../x", "evil.com#"] {
            assert!(matches!(
                WikipediaProvider::api_url(lang, "page/random/summary"),
                Err(Error::InvalidConfig(_))
            ));
        }
        assert!(WikipediaProvider::api_url("zh-yue", "x").is_ok());
    }

    #[test]
    fn test_request_count_is_bounded() {
        let provider = WikipediaProvider::new().unwrap();
        assert_eq!(provider.request_count(5), 15);
        assert_eq!(provider.request_count(usize::MAX), MAX_REQUESTS_PER_CALL);

        let provider = provider.with_over_fetch(usize::MAX);
        assert_eq!(provider.request_count(2), MAX_REQUESTS_PER_CALL);
    }

    #[tokio::test]
    async fn test_zero_count_makes_no_requests() {
        let provider = WikipediaProvider::new().unwrap();
        assert!(provider.random_articles(0, "en").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_language_fails_before_requests() {
        let provider = WikipediaProvider::new().unwrap();
        assert!(provider.random_articles(5, "??").await.is_err());
        assert!(provider.on_this_day("??").await.is_err());
    }
}
