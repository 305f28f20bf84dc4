//! Sessions and their security add-ons.
//!
//! A [`Session`] is a cheap, cloneable handle to one client's key/value data
//! for the duration of a request. [`SessionManager`] loads it from a
//! [`SessionStore`] before dispatch, runs the fingerprint and expiration
//! guards, and persists it (plus cookies) after dispatch.
//!
//! Security state lives inside the session data under reserved keys:
//!
//! | Key | Meaning |
//! |---|---|
//! | `__initiated` | set once the session was issued by this server |
//! | `__fingerprint` | hash of client IP and/or User-Agent |
//! | `__expire_requests` | requests left before the ID is refreshed |
//! | `__expire_seconds` | active seconds left before the ID is refreshed |
//! | `__last_activity` | unix timestamp of the previous start |

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

mod decoy;
mod expiration;
mod fingerprint;
mod manager;
mod store;

pub use decoy::Decoy;
pub use expiration::Expiration;
pub use fingerprint::Fingerprint;
pub use manager::SessionManager;
pub use store::{MemoryStore, SessionStore};

pub(crate) const INITIATED: &str = "__initiated";
pub(crate) const FINGERPRINT: &str = "__fingerprint";
pub(crate) const EXPIRE_REQUESTS: &str = "__expire_requests";
pub(crate) const EXPIRE_SECONDS: &str = "__expire_seconds";
pub(crate) const LAST_ACTIVITY: &str = "__last_activity";

const BOOKKEEPING: [&str; 5] = [INITIATED, FINGERPRINT, EXPIRE_REQUESTS, EXPIRE_SECONDS, LAST_ACTIVITY];

/// Session data - flexible key-value store.
pub type SessionData = HashMap<String, Value>;

/// SameSite cookie policy.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

#[derive(Debug)]
struct State {
    id: String,
    data: SessionData,
    previous_id: Option<String>,
    is_new: bool,
}

/// Handle to the current client's session.
#[derive(Clone, Debug)]
pub struct Session {
    inner: Arc<Mutex<State>>,
}

impl Session {
    pub(crate) fn new(id: String, data: SessionData, is_new: bool) -> Self {
        Self { inner: Arc::new(Mutex::new(State { id, data, previous_id: None, is_new })) }
    }

    /// A session that lives only as long as the request. Used when no
    /// [`SessionManager`] is configured, and in tests.
    pub fn detached() -> Self {
        Self::new(String::new(), SessionData::new(), true)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> String {
        self.lock().id.clone()
    }

    /// True when the session was created during this request.
    pub fn is_new(&self) -> bool {
        self.lock().is_new
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.lock().data.get(key).cloned()?;
        serde_json::from_value(value).ok()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.lock().data.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.lock().data.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().data.contains_key(key)
    }

    /// Drops every key, including the security state.
    pub fn clear(&self) {
        self.lock().data.clear();
    }

    /// Runs `f` with exclusive access to the data.
    pub fn with_data<R>(&self, f: impl FnOnce(&mut SessionData) -> R) -> R {
        f(&mut self.lock().data)
    }

    /// Moves the data under a new ID. The first ID of this request is kept
    /// so the store entry can be destroyed when the session is persisted.
    pub(crate) fn regenerate(&self, new_id: String) {
        let mut state = self.lock();
        if state.previous_id.is_none() && !state.is_new {
            state.previous_id = Some(state.id.clone());
        }
        state.id = new_id;
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            id: state.id.clone(),
            data: state.data.clone(),
            previous_id: state.previous_id.clone(),
            is_new: state.is_new,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::detached()
    }
}

pub(crate) struct Snapshot {
    pub id: String,
    pub data: SessionData,
    pub previous_id: Option<String>,
    pub is_new: bool,
}

impl Snapshot {
    /// Nothing but the security bookkeeping, which the next request can
    /// recompute.
    pub fn is_blank(&self) -> bool {
        self.data.keys().all(|k| BOOKKEEPING.contains(&k.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_get_and_set() {
        let session = Session::detached();
        session.set("user_id", 42);
        session.set("name", "ada");
        assert_eq!(session.get::<u32>("user_id"), Some(42));
        assert_eq!(session.get::<String>("name").as_deref(), Some("ada"));
        assert_eq!(session.get::<u32>("name"), None);
        assert!(session.remove("name").is_some());
        assert!(!session.contains("name"));
    }

    #[test]
    fn clones_share_state() {
        let a = Session::detached();
        let b = a.clone();
        b.set("k", true);
        assert_eq!(a.get::<bool>("k"), Some(true));
    }

    #[test]
    fn regenerate_remembers_first_id() {
        let session = Session::new("first".into(), SessionData::new(), false);
        session.regenerate("second".into());
        session.regenerate("third".into());
        let snap = session.snapshot();
        assert_eq!(snap.id, "third");
        assert_eq!(snap.previous_id.as_deref(), Some("first"));
    }
}
