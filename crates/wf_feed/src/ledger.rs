//! Interaction history: likes, seen ids, saved items and per-key
//! preference scores.
//!
//! Scores are keyed by category name, tag or wiki category and only ever
//! change by additive deltas. Reads apply a half-life decay that is never
//! written back.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use wf_core::config::{FeedConfig, InteractionDeltas};
use wf_core::{Article, Clock, Error, Result, SavedItem};
use wf_storage::{PersistentStore, StorageKey};

use crate::saved::SavedItems;
use crate::session::{self, SharedSession};

/// A preference score as persisted. Older data stored a bare number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredScore {
    Timestamped { score: f64, timestamp: i64 },
    Legacy(f64),
}

/// Duration band a view falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewBand {
    Skip,
    ShortRead,
    Neutral,
    LongRead,
}

impl ViewBand {
    pub fn from_duration(duration_ms: u64) -> Self {
        match duration_ms {
            0..=799 => ViewBand::Skip,
            800..=1499 => ViewBand::ShortRead,
            1500..=3000 => ViewBand::Neutral,
            _ => ViewBand::LongRead,
        }
    }

    fn delta(&self, deltas: &InteractionDeltas) -> Option<f64> {
        match self {
            ViewBand::Skip => Some(deltas.skip),
            ViewBand::ShortRead => Some(deltas.short_read),
            ViewBand::Neutral => None,
            ViewBand::LongRead => Some(deltas.long_read),
        }
    }
}

type ScoreMap = HashMap<String, StoredScore>;

#[derive(Clone)]
pub struct InteractionLedger {
    store: PersistentStore,
    clock: Arc<dyn Clock>,
    deltas: InteractionDeltas,
    half_life_ms: i64,
    legacy_scale: f64,
    seen_capacity: usize,
    saved: SavedItems,
    session: Option<SharedSession>,
    write_lock: Arc<Mutex<()>>,
}

/// Keeps the first failure of a multi-step write while letting the
/// remaining steps run.
#[derive(Default)]
struct Outcome(Option<Error>);

impl Outcome {
    fn track(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.0.get_or_insert(e);
        }
    }

    fn finish(self) -> Result<()> {
        match self.0 {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl InteractionLedger {
    pub fn new(store: PersistentStore, clock: Arc<dyn Clock>, config: &FeedConfig) -> Self {
        Self {
            saved: SavedItems::new(store.clone()),
            store,
            clock,
            deltas: config.deltas.clone(),
            half_life_ms: config.ranking.half_life_ms,
            legacy_scale: config.ranking.legacy_scale,
            seen_capacity: config.session.seen_capacity,
            session: None,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Views recorded through this ledger are pushed into `session`
    pub fn with_session(mut self, session: SharedSession) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<&SharedSession> {
        self.session.as_ref()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // =========================================================================
    // Interaction events
    // =========================================================================

    pub fn record_like(&self, article: &Article) -> Result<()> {
        let _guard = self.lock();
        let mut outcome = Outcome::default();

        let mut likes = self.likes();
        if !likes.contains(&article.id) {
            likes.push(article.id.clone());
            outcome.track(self.store.set(StorageKey::Likes, &likes));
        }
        outcome.track(self.apply_deltas(&self.spread(article, self.deltas.like)));
        outcome.finish()
    }

    pub fn record_unlike(&self, article: &Article) -> Result<()> {
        let _guard = self.lock();
        let mut outcome = Outcome::default();

        let mut likes = self.likes();
        let before = likes.len();
        likes.retain(|id| id != &article.id);
        if likes.len() != before {
            outcome.track(self.store.set(StorageKey::Likes, &likes));
        }
        outcome.track(self.apply_deltas(&self.spread(article, self.deltas.unlike)));
        outcome.finish()
    }

    pub fn record_save(&self, article: &Article) -> Result<()> {
        let _guard = self.lock();
        let mut outcome = Outcome::default();

        let now = self.clock.now_millis();
        outcome.track(self.saved.add(article, now).map(|_| ()));
        outcome.track(self.apply_deltas(&[(article.category.as_str().to_string(), self.deltas.save)]));
        outcome.finish()
    }

    pub fn record_unsave(&self, article: &Article) -> Result<()> {
        let _guard = self.lock();
        let mut outcome = Outcome::default();

        outcome.track(self.saved.remove(&article.id).map(|_| ()));
        outcome.track(self.apply_deltas(&[(article.category.as_str().to_string(), self.deltas.unsave)]));
        outcome.finish()
    }

    pub fn record_not_interested(&self, article: &Article) -> Result<()> {
        let _guard = self.lock();
        let mut outcome = Outcome::default();

        let delta = self.deltas.not_interested;
        let mut changes = vec![(article.category.as_str().to_string(), delta)];
        changes.extend(article.tags.iter().map(|tag| (tag.clone(), delta * 0.5)));
        outcome.track(self.apply_deltas(&changes));
        outcome.track(self.mark_seen_locked(&article.id));
        outcome.finish()
    }

    /// Record that `article` was on screen for `duration_ms`.
    pub fn record_view(&self, article: &Article, duration_ms: u64) -> Result<ViewBand> {
        let _guard = self.lock();
        let mut outcome = Outcome::default();
        let now = self.clock.now_millis();

        outcome.track(self.mark_seen_locked(&article.id));
        if let Some(session) = &self.session {
            session::lock(session).record(article.category, now);
        }

        let band = ViewBand::from_duration(duration_ms);
        if let Some(delta) = band.delta(&self.deltas) {
            outcome.track(self.apply_deltas(&[(article.category.as_str().to_string(), delta)]));
        }
        debug!("View of {} for {}ms -> {:?}", article.id, duration_ms, band);
        outcome.finish().map(|_| band)
    }

    /// Opening the source page is a strong explicit interest signal.
    pub fn record_open_source(&self, article: &Article) -> Result<()> {
        let _guard = self.lock();

        let mut changes = vec![(article.category.as_str().to_string(), self.deltas.save)];
        changes.extend(article.tags.iter().map(|tag| (tag.clone(), self.deltas.long_read)));
        self.apply_deltas(&changes)
    }

    pub fn mark_seen(&self, id: &str) -> Result<()> {
        let _guard = self.lock();
        self.mark_seen_locked(id)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Decayed score for every key with a recorded preference.
    pub fn weights(&self) -> HashMap<String, f64> {
        let now = self.clock.now_millis();
        self.scores()
            .into_iter()
            .map(|(key, stored)| {
                let weight = self.decayed(stored, now);
                (key, weight)
            })
            .collect()
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.seen().contains(&id.to_string())
    }

    pub fn is_liked(&self, id: &str) -> bool {
        self.likes().iter().any(|liked| liked == id)
    }

    pub fn is_saved(&self, id: &str) -> bool {
        self.saved.contains(id)
    }

    pub fn likes(&self) -> Vec<String> {
        self.store.get_or_default(StorageKey::Likes)
    }

    /// Seen ids, oldest first
    pub fn seen(&self) -> VecDeque<String> {
        self.store.get_or_default(StorageKey::Seen)
    }

    pub fn seen_ids(&self) -> HashSet<String> {
        self.seen().into_iter().collect()
    }

    pub fn saved_items(&self) -> Vec<SavedItem> {
        self.saved.list()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn scores(&self) -> ScoreMap {
        self.store.get_or_default(StorageKey::CategoryScores)
    }

    fn decayed(&self, stored: StoredScore, now: i64) -> f64 {
        match stored {
            StoredScore::Timestamped { score, timestamp } => {
                let age = (now - timestamp).max(0) as f64;
                score * 0.5f64.powf(age / self.half_life_ms as f64)
            }
            StoredScore::Legacy(score) => score * self.legacy_scale,
        }
    }

    /// Category gets `delta`, tags and wiki categories get scaled shares.
    fn spread(&self, article: &Article, delta: f64) -> Vec<(String, f64)> {
        let mut changes = vec![(article.category.as_str().to_string(), delta)];
        changes.extend(
            article
                .tags
                .iter()
                .map(|tag| (tag.clone(), delta * self.deltas.tag_scale)),
        );
        changes.extend(
            article
                .wiki_categories
                .iter()
                .map(|label| (label.clone(), delta * self.deltas.wiki_scale)),
        );
        changes
    }

    fn apply_deltas(&self, changes: &[(String, f64)]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let now = self.clock.now_millis();
        let mut scores = self.scores();

        // Legacy entries are rewritten in the timestamped shape, carrying
        // the value they already read as.
        for stored in scores.values_mut() {
            if let StoredScore::Legacy(score) = *stored {
                *stored = StoredScore::Timestamped {
                    score: score * self.legacy_scale,
                    timestamp: now,
                };
            }
        }

        // Decay up to `now` before adding, so re-stamping never revives
        // an old score.
        for (key, delta) in changes {
            let current = scores
                .get(key)
                .map(|stored| self.decayed(*stored, now))
                .unwrap_or(0.0);
            scores.insert(
                key.clone(),
                StoredScore::Timestamped { score: current + delta, timestamp: now },
            );
        }
        self.store.set(StorageKey::CategoryScores, &scores)
    }

    fn mark_seen_locked(&self, id: &str) -> Result<()> {
        let mut seen = self.seen();
        if seen.iter().any(|s| s == id) {
            return Ok(());
        }
        seen.push_back(id.to_string());
        while seen.len() > self.seen_capacity {
            seen.pop_front();
        }
        self.store.set(StorageKey::Seen, &seen).map_err(|e| {
            warn!("Failed to persist seen id {}: {}", id, e);
            e
        })
    }
}
