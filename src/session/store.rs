use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::SessionData;

const DEFAULT_IDLE_TIMEOUT_SECS: i64 = 1440;
const SWEEP_INTERVAL_SECS: i64 = 60;

/// Persistence for session data, keyed by session ID.
pub trait SessionStore: Send + Sync {
    fn load(&self, id: &str) -> Option<SessionData>;
    fn save(&self, id: &str, data: SessionData);
    fn destroy(&self, id: &str);
}

/// In-process store. Data is lost on restart.
///
/// A session not saved for longer than the idle timeout (24 minutes unless
/// configured) is gone: loading it yields nothing, and a sweep run from
/// [`save`](SessionStore::save) at most once a minute drops it from memory.
#[derive(Debug)]
pub struct MemoryStore {
    idle_timeout: Duration,
    entries: Mutex<Entries>,
}

#[derive(Debug, Default)]
struct Entries {
    sessions: HashMap<String, Entry>,
    last_sweep: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Entry {
    data: SessionData,
    last_seen: DateTime<Utc>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::seconds(DEFAULT_IDLE_TIMEOUT_SECS),
            entries: Mutex::default(),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every session idle at `now`; returns how many went.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.sessions.len();
        let timeout = self.idle_timeout;
        entries.sessions.retain(|_, entry| now - entry.last_seen <= timeout);
        entries.last_sweep = Some(now);
        before - entries.sessions.len()
    }

    fn load_at(&self, id: &str, now: DateTime<Utc>) -> Option<SessionData> {
        let mut entries = self.lock();
        let idle = now - entries.sessions.get(id)?.last_seen > self.idle_timeout;
        if idle {
            entries.sessions.remove(id);
            return None;
        }
        entries.sessions.get(id).map(|entry| entry.data.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, id: &str) -> Option<SessionData> {
        self.load_at(id, Utc::now())
    }

    fn save(&self, id: &str, data: SessionData) {
        let now = Utc::now();
        let sweep_due = {
            let mut entries = self.lock();
            entries.sessions.insert(id.to_owned(), Entry { data, last_seen: now });
            entries
                .last_sweep
                .is_none_or(|last| now - last > Duration::seconds(SWEEP_INTERVAL_SECS))
        };
        if sweep_due {
            let evicted = self.evict_idle(now);
            if evicted > 0 {
                debug!(evicted, "idle sessions dropped");
            }
        }
    }

    fn destroy(&self, id: &str) {
        self.lock().sessions.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_sessions_are_swept() {
        let store = MemoryStore::new().idle_timeout(Duration::seconds(60));
        store.save("a", SessionData::new());
        store.save("b", SessionData::new());
        assert_eq!(store.evict_idle(Utc::now()), 0);
        assert_eq!(store.evict_idle(Utc::now() + Duration::seconds(120)), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn idle_session_is_not_loaded() {
        let store = MemoryStore::new().idle_timeout(Duration::seconds(60));
        store.save("a", SessionData::from([("user".to_owned(), "ada".into())]));
        assert!(store.load_at("a", Utc::now()).is_some());
        assert!(store.load_at("a", Utc::now() + Duration::seconds(61)).is_none());
        assert!(store.is_empty());
    }
}
