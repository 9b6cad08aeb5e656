//! Tunable constants for the feed.
//!
//! Every value here is a product-tuning default. Only the signs and the
//! relative magnitudes matter (e.g. the seen penalty must exceed the
//! exploration range).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::{Error, Result};

pub const MINUTE_MS: i64 = 60 * 1000;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;

/// Score deltas applied by interaction events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionDeltas {
    pub like: f64,
    pub unlike: f64,
    pub save: f64,
    pub unsave: f64,
    pub not_interested: f64,
    pub skip: f64,
    pub short_read: f64,
    pub long_read: f64,
    /// Multiplier for tags on like/unlike
    pub tag_scale: f64,
    /// Multiplier for wiki categories on like/unlike
    pub wiki_scale: f64,
}

impl Default for InteractionDeltas {
    fn default() -> Self {
        Self {
            like: 10.0,
            unlike: -6.0,
            save: 8.0,
            unsave: -4.0,
            not_interested: -15.0,
            skip: -2.0,
            short_read: -0.5,
            long_read: 3.0,
            tag_scale: 0.5,
            wiki_scale: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Upper bound of the uniform exploration noise
    pub exploration: f64,
    pub category_weight: f64,
    pub tag_weight: f64,
    pub wiki_weight: f64,
    pub related_boost: f64,
    /// Penalty per occurrence of the category among the recent session views
    pub repeat_penalty: f64,
    /// How many recent session views the repeat penalty looks at
    pub repeat_lookback: usize,
    pub seen_penalty: f64,
    pub max_consecutive: usize,
    pub half_life_ms: i64,
    /// Fixed scale applied to scores persisted without a timestamp
    pub legacy_scale: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            exploration: 4.0,
            category_weight: 2.0,
            tag_weight: 1.0,
            wiki_weight: 0.5,
            related_boost: 5.0,
            repeat_penalty: 3.0,
            repeat_lookback: 3,
            seen_penalty: 20.0,
            max_consecutive: 2,
            half_life_ms: 7 * DAY_MS,
            legacy_scale: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_ms: i64,
    pub per_language_capacity: usize,
    pub byte_budget: usize,
    /// Fraction of the byte budget eviction drains down to
    pub evict_target: f64,
    /// Languages at or below this many entries are never evicted from
    pub min_entries_per_language: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: HOUR_MS,
            per_language_capacity: 150,
            byte_budget: 2 * 1024 * 1024,
            evict_target: 0.8,
            min_entries_per_language: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub window: usize,
    pub inactivity_ms: i64,
    pub seen_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window: 20,
            inactivity_ms: 30 * MINUTE_MS,
            seen_capacity: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub max_rounds: usize,
    pub on_this_day_limit: usize,
    pub top_up_multiplier: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            on_this_day_limit: 2,
            top_up_multiplier: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub deltas: InteractionDeltas,
    pub ranking: RankingConfig,
    pub cache: CacheConfig,
    pub session: SessionConfig,
    pub fetch: FetchConfig,
}

impl FeedConfig {
    /// Load a JSON config file. Missing fields fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: FeedConfig = serde_json::from_str(&content)?;
        config.validate()?;
        debug!("Loaded feed config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ranking.half_life_ms <= 0 {
            return Err(Error::InvalidConfig("ranking.half_life_ms must be positive".into()));
        }
        if self.ranking.seen_penalty <= self.ranking.exploration {
            return Err(Error::InvalidConfig(
                "ranking.seen_penalty must exceed ranking.exploration".into(),
            ));
        }
        if self.ranking.exploration < 0.0 {
            return Err(Error::InvalidConfig("ranking.exploration must not be negative".into()));
        }
        if self.cache.per_language_capacity == 0 || self.cache.byte_budget == 0 {
            return Err(Error::InvalidConfig("cache capacity and byte budget must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.cache.evict_target) {
            return Err(Error::InvalidConfig("cache.evict_target must be within 0..=1".into()));
        }
        if self.session.window == 0 || self.session.seen_capacity == 0 {
            return Err(Error::InvalidConfig("session window and seen capacity must be positive".into()));
        }
        if self.fetch.max_rounds == 0 {
            return Err(Error::InvalidConfig("fetch.max_rounds must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(FeedConfig::default().validate().is_ok());
    }

    #[test]
    fn test_seen_penalty_must_dominate_exploration() {
        let mut config = FeedConfig::default();
        config.ranking.seen_penalty = 1.0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"deltas": {{"like": 12.0}}, "cache": {{"ttl_ms": 1000}}}}"#).unwrap();

        let config = FeedConfig::from_file(file.path()).unwrap();
        assert_eq!(config.deltas.like, 12.0);
        assert_eq!(config.deltas.unlike, InteractionDeltas::default().unlike);
        assert_eq!(config.cache.ttl_ms, 1000);
        assert_eq!(config.session.window, 20);
    }
}
