use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wf_core::config::{FeedConfig, FetchConfig};
use wf_core::{Article, ArticleProvider, Clock, Preferences, Result, SavedItem};
use wf_storage::{PersistentStore, StorageKey};

use crate::cache::ArticleCache;
use crate::ledger::InteractionLedger;
use crate::ranking::RankingEngine;
use crate::session::{self, SessionWindow};

/// Snapshot of the feed's persisted state, for display.
#[derive(Debug, Clone, Default)]
pub struct FeedStats {
    /// Decayed weights, highest first
    pub weights: Vec<(String, f64)>,
    pub likes: usize,
    pub seen: usize,
    pub saved: usize,
    pub cache_sizes: BTreeMap<String, usize>,
    pub session_views: usize,
}

/// Upper bound on articles requested by one background top-up.
pub const MAX_TOP_UP_FETCH: usize = 100;

/// Removes the language from the in-flight set when the top-up finishes.
struct TopUpGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    lang: String,
}

impl Drop for TopUpGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.lang);
    }
}

/// Decides between cache and provider, orders through the ranking engine
/// and feeds interactions back into the ledger.
pub struct FeedManager {
    provider: Arc<dyn ArticleProvider>,
    store: PersistentStore,
    ledger: InteractionLedger,
    cache: ArticleCache,
    engine: RankingEngine,
    fetch: FetchConfig,
    language: String,
    feed: Vec<Article>,
    top_ups: Arc<Mutex<HashSet<String>>>,
}

impl FeedManager {
    pub fn new(
        store: PersistentStore,
        provider: Arc<dyn ArticleProvider>,
        clock: Arc<dyn Clock>,
        config: FeedConfig,
    ) -> Result<Self> {
        config.validate()?;

        let session = SessionWindow::shared(&config.session, clock.now_millis());
        let ledger = InteractionLedger::new(store.clone(), clock.clone(), &config)
            .with_session(session.clone());
        let cache = ArticleCache::new(store.clone(), clock.clone(), config.cache.clone());
        let engine = RankingEngine::new(ledger.clone(), session, clock, config.ranking.clone());

        let preferences: Preferences = store.get_or_default(StorageKey::Preferences);

        match cache.remove_duplicate_ids() {
            Ok(0) => {}
            Ok(removed) => info!("🧹 Cleaned {} duplicate articles from cache", removed),
            Err(e) => warn!("⚠️ Cache duplicate cleanup failed: {}", e),
        }

        Ok(Self {
            provider,
            store,
            ledger,
            cache,
            engine,
            fetch: config.fetch,
            language: preferences.language,
            feed: Vec::new(),
            top_ups: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Reproducible exploration noise, for tests and demos
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.engine = self.engine.with_seed(seed);
        self
    }

    /// Use `lang` for this session without touching the stored preference
    pub fn with_language(mut self, lang: &str) -> Self {
        self.language = lang.to_string();
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn feed(&self) -> &[Article] {
        &self.feed
    }

    pub fn ledger(&self) -> &InteractionLedger {
        &self.ledger
    }

    pub fn cache(&self) -> &ArticleCache {
        &self.cache
    }

    pub fn engine_mut(&mut self) -> &mut RankingEngine {
        &mut self.engine
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Append up to `count` ordered articles to the feed and return them.
    ///
    /// On the first load the unexpired cache is tried before the provider.
    /// Never fails: provider trouble yields fewer or staler articles.
    pub async fn load_articles(&mut self, count: usize, force_refresh: bool) -> Vec<Article> {
        let lang = self.language.clone();
        let mut loaded = Vec::new();
        info!("📰 Loading {} articles ({}, refresh: {})", count, lang, force_refresh);

        if self.feed.is_empty() && !force_refresh {
            match self.cache.get_unexpired(&lang) {
                Ok(Some(cached)) if !cached.is_empty() => {
                    let seen = self.ledger.seen_ids();
                    let total = cached.len();
                    let unseen: Vec<Article> = cached
                        .into_iter()
                        .filter(|a| !seen.contains(&a.id))
                        .map(Article::from)
                        .collect();
                    debug!("Unseen cached articles: {}/{}", unseen.len(), total);

                    if unseen.len() >= count {
                        let sorted = self.engine.recommend(unseen.into_iter().take(count).collect());
                        info!("✅ Loaded {} articles from cache", sorted.len());
                        self.feed.extend(sorted.iter().cloned());
                        self.spawn_top_up(count);
                        return sorted;
                    } else if !unseen.is_empty() {
                        let sorted = self.engine.recommend(unseen);
                        info!("✅ Loaded {} unseen articles from cache, fetching more", sorted.len());
                        self.feed.extend(sorted.iter().cloned());
                        loaded.extend(sorted);
                    }
                }
                Ok(_) => debug!("Cache miss for {}", lang),
                Err(e) => warn!("⚠️ Failed to read cache for {}: {}", lang, e),
            }
        }

        let wanted = count.saturating_sub(loaded.len());
        if wanted == 0 {
            return loaded;
        }

        let (fetched, provider_failed) = self.fetch_unique(wanted, &lang).await;
        let fresh = if fetched.is_empty() && provider_failed {
            self.stale_fallback(wanted, &lang)
        } else {
            if !fetched.is_empty() {
                if let Err(e) = self.cache.merge(&lang, &fetched) {
                    warn!("⚠️ Failed to cache fetched articles: {}", e);
                }
            }
            fetched
        };

        let sorted = self.engine.recommend(fresh);
        info!("✅ Loaded {} articles. Feed size: {}", sorted.len(), self.feed.len() + sorted.len());
        self.feed.extend(sorted.iter().cloned());
        loaded.extend(sorted);
        loaded
    }

    /// Up to `max_rounds` provider rounds, stopping at the first round that
    /// yields anything new. Returns the articles and whether any round failed.
    async fn fetch_unique(&self, wanted: usize, lang: &str) -> (Vec<Article>, bool) {
        let seen = self.ledger.seen_ids();
        let current: HashSet<&str> = self.feed.iter().map(|a| a.id.as_str()).collect();
        let mut collected: Vec<Article> = Vec::new();
        let mut collected_ids: HashSet<String> = HashSet::new();
        let mut provider_failed = false;

        for round in 0..self.fetch.max_rounds {
            if collected.len() >= wanted {
                break;
            }
            let include_on_this_day = self.feed.is_empty() && round == 0;
            let provider = self.provider.clone();
            let (random, on_this_day) = tokio::join!(
                provider.random_articles(wanted, lang),
                async {
                    if include_on_this_day {
                        provider.on_this_day(lang).await
                    } else {
                        Ok(Vec::new())
                    }
                }
            );

            let random = random.unwrap_or_else(|e| {
                warn!("⚠️ {} random fetch failed: {}", provider.name(), e);
                provider_failed = true;
                Vec::new()
            });
            let on_this_day = on_this_day.unwrap_or_else(|e| {
                warn!("⚠️ {} on-this-day fetch failed: {}", provider.name(), e);
                Vec::new()
            });

            let mut fresh = 0;
            for article in random
                .into_iter()
                .chain(on_this_day.into_iter().take(self.fetch.on_this_day_limit))
            {
                if seen.contains(&article.id)
                    || current.contains(article.id.as_str())
                    || !collected_ids.insert(article.id.clone())
                {
                    continue;
                }
                collected.push(article);
                fresh += 1;
            }
            debug!(
                "Round {}: {} unique, total {}/{}",
                round + 1,
                fresh,
                collected.len(),
                wanted
            );
            if fresh > 0 {
                break;
            }
        }

        collected.truncate(wanted);
        (collected, provider_failed)
    }

    /// Whatever the cache holds for `lang`, expired or not, minus seen and
    /// already-shown articles.
    fn stale_fallback(&self, wanted: usize, lang: &str) -> Vec<Article> {
        let seen = self.ledger.seen_ids();
        let current: HashSet<&str> = self.feed.iter().map(|a| a.id.as_str()).collect();
        match self.cache.get_any(lang) {
            Ok(cached) => {
                let articles: Vec<Article> = cached
                    .into_iter()
                    .filter(|a| !seen.contains(&a.id) && !current.contains(a.id.as_str()))
                    .take(wanted)
                    .map(Article::from)
                    .collect();
                info!("✅ Falling back to {} cached articles", articles.len());
                articles
            }
            Err(e) => {
                warn!("⚠️ Cache fallback failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Start a background fetch of fresh articles into the cache.
    ///
    /// Returns `None` if one is already running for the current language
    /// or there is no runtime to spawn on.
    pub fn spawn_top_up(&self, count: usize) -> Option<JoinHandle<usize>> {
        let lang = self.language.clone();
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("⚠️ No async runtime, skipping background top-up");
                return None;
            }
        };

        {
            let mut in_flight = self.top_ups.lock().unwrap_or_else(|e| e.into_inner());
            if !in_flight.insert(lang.clone()) {
                debug!("Top-up for {} already running", lang);
                return None;
            }
        }
        let guard = TopUpGuard {
            in_flight: self.top_ups.clone(),
            lang: lang.clone(),
        };

        let provider = self.provider.clone();
        let cache = self.cache.clone();
        let fetch_count = count
            .saturating_mul(self.fetch.top_up_multiplier)
            .min(MAX_TOP_UP_FETCH);

        Some(runtime.spawn(async move {
            let _guard = guard;
            let articles = match provider.random_articles(fetch_count, &lang).await {
                Ok(articles) => articles,
                Err(e) => {
                    warn!("⚠️ Background fetch failed: {}", e);
                    return 0;
                }
            };

            let existing: HashSet<String> = cache
                .get_any(&lang)
                .unwrap_or_default()
                .into_iter()
                .map(|a| a.id)
                .collect();
            let unique: Vec<Article> = articles
                .into_iter()
                .filter(|a| !existing.contains(&a.id))
                .collect();
            if unique.is_empty() {
                return 0;
            }

            match cache.merge(&lang, &unique) {
                Ok(report) => {
                    info!("💾 Cached {} new articles for {} in background", report.added, lang);
                    report.added
                }
                Err(e) => {
                    warn!("⚠️ Background cache write failed: {}", e);
                    0
                }
            }
        }))
    }

    pub fn top_up_in_flight(&self, lang: &str) -> bool {
        self.top_ups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(lang)
    }

    // =========================================================================
    // Interactions
    // =========================================================================

    pub fn like(&self, article: &Article) {
        if let Err(e) = self.ledger.record_like(article) {
            warn!("⚠️ Failed to record like for {}: {}", article.id, e);
        }
    }

    pub fn unlike(&self, article: &Article) {
        if let Err(e) = self.ledger.record_unlike(article) {
            warn!("⚠️ Failed to record unlike for {}: {}", article.id, e);
        }
    }

    pub fn save(&self, article: &Article) {
        if let Err(e) = self.ledger.record_save(article) {
            warn!("⚠️ Failed to save {}: {}", article.id, e);
        }
    }

    pub fn unsave(&self, article: &Article) {
        if let Err(e) = self.ledger.record_unsave(article) {
            warn!("⚠️ Failed to unsave {}: {}", article.id, e);
        }
    }

    pub fn not_interested(&self, article: &Article) {
        if let Err(e) = self.ledger.record_not_interested(article) {
            warn!("⚠️ Failed to record not-interested for {}: {}", article.id, e);
        }
    }

    pub fn view(&self, article: &Article, duration_ms: u64) {
        if let Err(e) = self.ledger.record_view(article, duration_ms) {
            warn!("⚠️ Failed to record view of {}: {}", article.id, e);
        }
    }

    pub fn open_source(&self, article: &Article) {
        if let Err(e) = self.ledger.record_open_source(article) {
            warn!("⚠️ Failed to record source open for {}: {}", article.id, e);
        }
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Look an article up in the current feed, then in every cached language
    pub fn find_article(&self, id: &str) -> Option<Article> {
        if let Some(article) = self.feed.iter().find(|a| a.id == id) {
            return Some(article.clone());
        }
        self.cache
            .all()
            .ok()?
            .into_values()
            .flatten()
            .find(|a| a.id == id)
            .map(Article::from)
    }

    pub fn preferences(&self) -> Preferences {
        self.store.get_or_default(StorageKey::Preferences)
    }

    /// Switch language. The in-memory feed is dropped; results of fetches
    /// still in flight for the old language only land in that language's cache.
    pub fn set_language(&mut self, lang: &str) -> Result<()> {
        let mut preferences = self.preferences();
        preferences.language = lang.to_string();
        self.store.set(StorageKey::Preferences, &preferences)?;
        self.language = lang.to_string();
        self.feed.clear();
        Ok(())
    }

    pub fn set_theme(&self, theme: &str) -> Result<()> {
        let mut preferences = self.preferences();
        preferences.theme = theme.to_string();
        self.store.set(StorageKey::Preferences, &preferences)
    }

    pub fn saved_items(&self) -> Vec<SavedItem> {
        self.ledger.saved_items()
    }

    pub fn dedupe_cache(&self) -> Result<usize> {
        self.cache.remove_duplicate_ids()
    }

    pub fn clear_all(&mut self) -> Result<()> {
        self.feed.clear();
        self.store.clear_all()
    }

    pub fn stats(&self) -> FeedStats {
        let mut weights: Vec<(String, f64)> = self.ledger.weights().into_iter().collect();
        weights.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        FeedStats {
            weights,
            likes: self.ledger.likes().len(),
            seen: self.ledger.seen().len(),
            saved: self.ledger.saved_items().len(),
            cache_sizes: self.cache.sizes().unwrap_or_default(),
            session_views: session::lock(self.engine.session()).len(),
        }
    }
}
