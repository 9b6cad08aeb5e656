use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use wf_core::config::SessionConfig;
use wf_core::Category;

/// Handle shared between the ledger (which records views) and the ranking
/// engine (which reads them).
pub type SharedSession = Arc<Mutex<SessionWindow>>;

/// Categories viewed during the current session. Never persisted.
#[derive(Debug, Clone)]
pub struct SessionWindow {
    categories: VecDeque<Category>,
    capacity: usize,
    inactivity_ms: i64,
    started_at: i64,
    last_activity: i64,
}

impl SessionWindow {
    pub fn new(config: &SessionConfig, now: i64) -> Self {
        Self {
            categories: VecDeque::with_capacity(config.window),
            capacity: config.window,
            inactivity_ms: config.inactivity_ms,
            started_at: now,
            last_activity: now,
        }
    }

    pub fn shared(config: &SessionConfig, now: i64) -> SharedSession {
        Arc::new(Mutex::new(Self::new(config, now)))
    }

    /// Start a new session if the last activity is older than the
    /// inactivity limit. Returns whether a reset happened.
    fn expire_if_idle(&mut self, now: i64) -> bool {
        if now - self.last_activity > self.inactivity_ms {
            self.categories.clear();
            self.started_at = now;
            self.last_activity = now;
            return true;
        }
        false
    }

    pub fn record(&mut self, category: Category, now: i64) {
        self.expire_if_idle(now);
        self.categories.push_back(category);
        while self.categories.len() > self.capacity {
            self.categories.pop_front();
        }
        self.last_activity = now;
    }

    /// The last `n` categories, oldest first
    pub fn recent(&mut self, n: usize, now: i64) -> Vec<Category> {
        self.expire_if_idle(now);
        let skip = self.categories.len().saturating_sub(n);
        self.categories.iter().skip(skip).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn started_at(&self) -> i64 {
        self.started_at
    }
}

/// Lock a shared session, recovering from poisoning.
pub fn lock(session: &SharedSession) -> MutexGuard<'_, SessionWindow> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}
