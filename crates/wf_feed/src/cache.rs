//! Per-language article cache.
//!
//! Lists are kept newest first: merges prepend, and both the per-language
//! cap and the byte-budget eviction cut from the tail.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use wf_core::config::CacheConfig;
use wf_core::{Article, CachedArticle, Clock, Result};
use wf_storage::{PersistentStore, StorageKey};

pub type CacheMap = BTreeMap<String, Vec<CachedArticle>>;
type Timestamps = HashMap<String, i64>;

/// What a [`ArticleCache::merge`] call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub added: usize,
    pub trimmed: usize,
    pub evicted: usize,
}

#[derive(Clone)]
pub struct ArticleCache {
    store: PersistentStore,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    write_lock: Arc<Mutex<()>>,
}

impl ArticleCache {
    pub fn new(store: PersistentStore, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            store,
            clock,
            config,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Cached list for `lang` if it was refreshed within the TTL.
    ///
    /// A list without a refresh timestamp (older data) is treated as fresh
    /// and stamped now.
    pub fn get_unexpired(&self, lang: &str) -> Result<Option<Vec<CachedArticle>>> {
        let mut cache: CacheMap = self.store.get(StorageKey::ArticleCache)?.unwrap_or_default();
        let Some(list) = cache.remove(lang) else {
            return Ok(None);
        };

        let now = self.clock.now_millis();
        let timestamps: Timestamps = self.store.get_or_default(StorageKey::CacheTimestamps);
        match timestamps.get(lang) {
            Some(&refreshed) if now - refreshed <= self.config.ttl_ms => Ok(Some(list)),
            Some(&refreshed) => {
                debug!("Cache for {} expired ({}ms old)", lang, now - refreshed);
                Ok(None)
            }
            None => {
                self.stamp_if_missing(lang, now);
                Ok(Some(list))
            }
        }
    }

    /// Re-reads the timestamps under the write lock so a concurrent merge
    /// for another language keeps its stamp.
    fn stamp_if_missing(&self, lang: &str, now: i64) {
        let _guard = self.lock();
        let mut timestamps: Timestamps = self.store.get_or_default(StorageKey::CacheTimestamps);
        if timestamps.contains_key(lang) {
            return;
        }
        timestamps.insert(lang.to_string(), now);
        if let Err(e) = self.store.set(StorageKey::CacheTimestamps, &timestamps) {
            warn!("Failed to stamp cache timestamp for {}: {}", lang, e);
        }
    }

    /// Cached list for `lang` regardless of age
    pub fn get_any(&self, lang: &str) -> Result<Vec<CachedArticle>> {
        let mut cache: CacheMap = self.store.get(StorageKey::ArticleCache)?.unwrap_or_default();
        Ok(cache.remove(lang).unwrap_or_default())
    }

    pub fn all(&self) -> Result<CacheMap> {
        Ok(self.store.get(StorageKey::ArticleCache)?.unwrap_or_default())
    }

    /// Entry count per language
    pub fn sizes(&self) -> Result<BTreeMap<String, usize>> {
        Ok(self
            .all()?
            .into_iter()
            .map(|(lang, list)| (lang, list.len()))
            .collect())
    }

    /// Add articles whose id is not cached yet for `lang`.
    ///
    /// Existing entries are never overwritten, so merges commute.
    pub fn merge(&self, lang: &str, articles: &[Article]) -> Result<MergeReport> {
        let _guard = self.lock();
        let mut report = MergeReport::default();
        let mut cache: CacheMap = self.store.get(StorageKey::ArticleCache)?.unwrap_or_default();

        let list = cache.entry(lang.to_string()).or_default();
        let mut known: HashSet<String> = list.iter().map(|a| a.id.clone()).collect();
        let mut merged: Vec<CachedArticle> = articles
            .iter()
            .filter(|a| known.insert(a.id.clone()))
            .map(CachedArticle::from)
            .collect();
        report.added = merged.len();

        merged.append(list);
        *list = merged;
        if list.len() > self.config.per_language_capacity {
            report.trimmed = list.len() - self.config.per_language_capacity;
            list.truncate(self.config.per_language_capacity);
        }

        report.evicted = enforce_byte_budget(
            &mut cache,
            self.config.byte_budget,
            self.config.evict_target,
            self.config.min_entries_per_language,
        )?;
        self.store.set(StorageKey::ArticleCache, &cache)?;

        let mut timestamps: Timestamps = self.store.get_or_default(StorageKey::CacheTimestamps);
        timestamps.insert(lang.to_string(), self.clock.now_millis());
        self.store.set(StorageKey::CacheTimestamps, &timestamps)?;

        debug!(
            "Merged into {} cache: +{} trimmed {} evicted {}",
            lang, report.added, report.trimmed, report.evicted
        );
        Ok(report)
    }

    /// Drop every repeated id, keeping the first occurrence per language.
    pub fn remove_duplicate_ids(&self) -> Result<usize> {
        let _guard = self.lock();
        let mut cache: CacheMap = self.store.get(StorageKey::ArticleCache)?.unwrap_or_default();

        let mut removed = 0;
        for list in cache.values_mut() {
            let mut known = HashSet::new();
            let before = list.len();
            list.retain(|a| known.insert(a.id.clone()));
            removed += before - list.len();
        }

        if removed > 0 {
            self.store.set(StorageKey::ArticleCache, &cache)?;
            info!("Removed {} duplicate cached articles", removed);
        }
        Ok(removed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Evict from language tails, one entry per language per round, until the
/// serialized cache fits in `target * budget`. Only runs once `budget` is
/// exceeded. Languages with `min_entries` or fewer entries are left alone.
pub fn enforce_byte_budget(
    cache: &mut CacheMap,
    budget: usize,
    target: f64,
    min_entries: usize,
) -> Result<usize> {
    let mut size = serde_json::to_string(&*cache)?.len();
    if size <= budget {
        return Ok(0);
    }

    let goal = (budget as f64 * target) as usize;
    let mut evicted = 0;
    while size > goal {
        let mut progressed = false;
        for list in cache.values_mut() {
            if list.len() <= min_entries {
                continue;
            }
            if let Some(entry) = list.pop() {
                // entry plus its separating comma
                size = size.saturating_sub(serde_json::to_string(&entry)?.len() + 1);
                evicted += 1;
                progressed = true;
            }
            if size <= goal {
                break;
            }
        }
        if !progressed {
            warn!("Cache still {} bytes over its eviction goal, nothing left to evict", size - goal);
            break;
        }
    }
    info!("Evicted {} cached articles to fit {} byte budget", evicted, budget);
    Ok(evicted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_core::config::HOUR_MS;
    use wf_core::{ArticleSource, Category, KeyValueStore, ManualClock};
    use wf_storage::InMemoryStore;

    const T0: i64 = 1_700_000_000_000;

    fn article(id: &str, lang: &str) -> Article {
        Article {
            id: id.to_string(),
            hook: format!("A perfectly ordinary hook for article {}.", id),
            category: Category::Culture,
            tags: vec!["tag".to_string()],
            wiki_categories: vec![],
            thumbnail: None,
            source: ArticleSource {
                title: id.to_string(),
                url: format!("https://{}.wikipedia.org/wiki/{}", lang, id),
                lang: lang.to_string(),
            },
            is_related: false,
        }
    }

    fn articles(prefix: &str, n: usize, lang: &str) -> Vec<Article> {
        (0..n).map(|i| article(&format!("{}{}", prefix, i), lang)).collect()
    }

    fn cache_with(config: CacheConfig) -> (ArticleCache, Arc<ManualClock>, Arc<InMemoryStore>) {
        let clock = Arc::new(ManualClock::new(T0));
        let backend = Arc::new(InMemoryStore::new());
        let cache = ArticleCache::new(PersistentStore::new(backend.clone()), clock.clone(), config);
        (cache, clock, backend)
    }

    fn ids(list: &[CachedArticle]) -> Vec<&str> {
        list.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn test_merge_deduplicates_by_id() {
        let (cache, _clock, _backend) = cache_with(CacheConfig::default());
        cache.merge("en", &[article("x", "en")]).unwrap();
        let report = cache
            .merge("en", &[article("x", "en"), article("y", "en")])
            .unwrap();

        assert_eq!(report.added, 1);
        let list = cache.get_unexpired("en").unwrap().unwrap();
        assert_eq!(ids(&list), vec!["y", "x"]);
    }

    #[test]
    fn test_first_write_wins() {
        let (cache, _clock, _backend) = cache_with(CacheConfig::default());
        cache.merge("en", &[article("x", "en")]).unwrap();

        let mut changed = article("x", "en");
        changed.hook = "a different hook".to_string();
        cache.merge("en", &[changed]).unwrap();

        let list = cache.get_any("en").unwrap();
        assert_eq!(list.len(), 1);
        assert_ne!(list[0].hook, "a different hook");
    }

    #[test]
    fn test_merge_dedups_within_batch() {
        let (cache, _clock, _backend) = cache_with(CacheConfig::default());
        cache
            .merge("en", &[article("x", "en"), article("x", "en")])
            .unwrap();
        assert_eq!(cache.get_any("en").unwrap().len(), 1);
    }

    #[test]
    fn test_languages_are_independent() {
        let (cache, _clock, _backend) = cache_with(CacheConfig::default());
        cache.merge("en", &[article("x", "en")]).unwrap();
        cache.merge("tr", &[article("x", "tr")]).unwrap();

        assert_eq!(cache.sizes().unwrap(), BTreeMap::from([("en".to_string(), 1), ("tr".to_string(), 1)]));
    }

    #[test]
    fn test_ttl_expiry() {
        let (cache, clock, _backend) = cache_with(CacheConfig::default());
        assert!(cache.get_unexpired("en").unwrap().is_none());

        cache.merge("en", &[article("x", "en")]).unwrap();
        clock.advance(HOUR_MS);
        assert!(cache.get_unexpired("en").unwrap().is_some());

        clock.advance(1);
        assert!(cache.get_unexpired("en").unwrap().is_none());
        // the data itself is still there for fallback use
        assert_eq!(cache.get_any("en").unwrap().len(), 1);
    }

    #[test]
    fn test_missing_timestamp_is_stamped_now() {
        let (cache, clock, backend) = cache_with(CacheConfig::default());
        let list = vec![CachedArticle::from(&article("x", "en"))];
        backend
            .set("wikifeed_cache", &serde_json::to_string(&BTreeMap::from([("en", list)])).unwrap())
            .unwrap();

        assert!(cache.get_unexpired("en").unwrap().is_some());
        clock.advance(HOUR_MS);
        assert!(cache.get_unexpired("en").unwrap().is_some());
        clock.advance(1);
        assert!(cache.get_unexpired("en").unwrap().is_none());
    }

    #[test]
    fn test_stamping_keeps_concurrent_merge_timestamps() {
        let (cache, _clock, backend) = cache_with(CacheConfig::default());
        let legacy: BTreeMap<String, Vec<CachedArticle>> = (0..10)
            .map(|i| {
                let lang = format!("l{}", i);
                let list = vec![CachedArticle::from(&article(&format!("x{}", i), &lang))];
                (lang, list)
            })
            .collect();
        backend
            .set("wikifeed_cache", &serde_json::to_string(&legacy).unwrap())
            .unwrap();

        let reader = cache.clone();
        let stamping = std::thread::spawn(move || {
            for i in 0..10 {
                reader.get_unexpired(&format!("l{}", i)).unwrap();
            }
        });
        for i in 0..10 {
            let lang = format!("m{}", i);
            cache.merge(&lang, &[article(&format!("y{}", i), &lang)]).unwrap();
        }
        stamping.join().unwrap();

        let timestamps: Timestamps =
            serde_json::from_str(&backend.get("wikifeed_cache_ts").unwrap().unwrap()).unwrap();
        for i in 0..10 {
            assert_eq!(timestamps.get(&format!("m{}", i)), Some(&T0));
        }
    }

    #[test]
    fn test_merge_evicts_over_byte_budget_and_persists() {
        let mut full_map = CacheMap::new();
        for lang in ["en", "tr"] {
            full_map.insert(
                lang.to_string(),
                articles(lang, 40, lang).iter().map(CachedArticle::from).collect(),
            );
        }
        let budget = serde_json::to_string(&full_map).unwrap().len() * 3 / 4;
        let config = CacheConfig {
            byte_budget: budget,
            ..CacheConfig::default()
        };
        let (cache, clock, backend) = cache_with(config.clone());

        let report = cache.merge("en", &articles("en", 40, "en")).unwrap();
        assert_eq!(report.evicted, 0);

        clock.advance(1000);
        let report = cache.merge("tr", &articles("tr", 40, "tr")).unwrap();
        assert_eq!(report.added, 40);
        assert!(report.evicted > 0);

        // a fresh handle over the same backend sees the evicted map
        let reopened = ArticleCache::new(PersistentStore::new(backend.clone()), clock.clone(), config);
        let sizes = reopened.sizes().unwrap();
        assert_eq!(sizes["en"] + sizes["tr"], 80 - report.evicted);
        assert!(sizes["en"] < 40 && sizes["tr"] < 40);
        assert!(sizes["en"].abs_diff(sizes["tr"]) <= 1);
        let stored = serde_json::to_string(&reopened.all().unwrap()).unwrap().len();
        assert!(stored <= (budget as f64 * 0.8) as usize);

        let timestamps: Timestamps =
            serde_json::from_str(&backend.get("wikifeed_cache_ts").unwrap().unwrap()).unwrap();
        assert_eq!(timestamps["en"], T0);
        assert_eq!(timestamps["tr"], T0 + 1000);
        let tr = reopened.get_unexpired("tr").unwrap().unwrap();
        assert_eq!(tr[0].id, "tr0");
    }

    #[test]
    fn test_per_language_cap_trims_oldest() {
        let config = CacheConfig {
            per_language_capacity: 5,
            ..CacheConfig::default()
        };
        let (cache, _clock, _backend) = cache_with(config);
        cache.merge("en", &articles("old", 4, "en")).unwrap();
        let report = cache.merge("en", &articles("new", 3, "en")).unwrap();

        assert_eq!(report.trimmed, 2);
        let list = cache.get_any("en").unwrap();
        assert_eq!(ids(&list), vec!["new0", "new1", "new2", "old0", "old1"]);
    }

    #[test]
    fn test_byte_budget_evicts_round_robin() {
        let mut map = CacheMap::new();
        for lang in ["en", "tr"] {
            map.insert(
                lang.to_string(),
                articles(lang, 40, lang).iter().map(CachedArticle::from).collect(),
            );
        }
        let full = serde_json::to_string(&map).unwrap().len();
        let budget = full * 3 / 4;

        let evicted = enforce_byte_budget(&mut map, budget, 0.8, 10).unwrap();
        assert!(evicted > 0);
        assert!(serde_json::to_string(&map).unwrap().len() <= (budget as f64 * 0.8) as usize);
        // round-robin keeps the languages within one entry of each other
        assert!(map["en"].len().abs_diff(map["tr"].len()) <= 1);
        // heads survive
        assert_eq!(map["en"][0].id, "en0");
    }

    #[test]
    fn test_byte_budget_spares_small_languages() {
        let mut map = CacheMap::new();
        map.insert("en".to_string(), articles("en", 10, "en").iter().map(CachedArticle::from).collect());

        let evicted = enforce_byte_budget(&mut map, 100, 0.8, 10).unwrap();
        assert_eq!(evicted, 0);
        assert_eq!(map["en"].len(), 10);
    }

    #[test]
    fn test_remove_duplicate_ids_is_idempotent() {
        let (cache, _clock, backend) = cache_with(CacheConfig::default());
        let a = CachedArticle::from(&article("a", "en"));
        let b = CachedArticle::from(&article("b", "en"));
        let map = BTreeMap::from([
            ("en", vec![a.clone(), b.clone(), a.clone(), a.clone()]),
            ("tr", vec![b.clone()]),
        ]);
        backend
            .set("wikifeed_cache", &serde_json::to_string(&map).unwrap())
            .unwrap();

        assert_eq!(cache.remove_duplicate_ids().unwrap(), 2);
        let after_first = cache.all().unwrap();
        assert_eq!(ids(&after_first["en"]), vec!["a", "b"]);

        assert_eq!(cache.remove_duplicate_ids().unwrap(), 0);
        assert_eq!(cache.all().unwrap(), after_first);
    }

    #[test]
    fn test_remove_duplicate_ids_on_empty_cache() {
        let (cache, _clock, _backend) = cache_with(CacheConfig::default());
        assert_eq!(cache.remove_duplicate_ids().unwrap(), 0);
    }
}
