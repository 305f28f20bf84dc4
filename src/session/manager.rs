//! Session lifecycle around dispatch.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use super::{Decoy, Expiration, Fingerprint, INITIATED, SameSite, Session, SessionData, SessionStore};
use crate::config::SessionConfig;
use crate::crypto::{Crypto, DefaultCrypto};
use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

const ID_LENGTH: usize = 40;

/// Cookie attributes of the session cookie.
#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub name: String,
    pub domain: Option<String>,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
    pub max_age: Option<i64>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for CookieConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            name: config.cookie_name.clone(),
            domain: config.cookie_domain.clone(),
            path: config.cookie_path.clone(),
            secure: config.secure,
            http_only: config.http_only,
            same_site: config.same_site,
            max_age: config.max_age,
        }
    }
}

/// Loads, guards and persists the session of each request.
///
/// [`SessionManager::start`] runs before routing: it resolves the session
/// from its cookie (or opens a new one), refuses fixated IDs, checks the
/// fingerprint and advances the expiration counters. [`SessionManager::finish`]
/// saves the data and sets the cookie whenever the ID changed.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cookie: CookieConfig,
    fingerprint: Option<Fingerprint>,
    expiration: Option<Expiration>,
    decoy: Option<Decoy>,
    crypto: Arc<dyn Crypto>,
}

impl SessionManager {
    /// A manager with default cookie settings and no add-ons.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            cookie: CookieConfig::default(),
            fingerprint: None,
            expiration: None,
            decoy: None,
            crypto: Arc::new(DefaultCrypto),
        }
    }

    pub fn from_config(config: &SessionConfig, store: Arc<dyn SessionStore>) -> Self {
        let crypto: Arc<dyn Crypto> = Arc::new(DefaultCrypto);
        let fp = &config.fingerprint;
        let exp = &config.expiration;
        Self {
            store,
            cookie: CookieConfig::from(config),
            fingerprint: fp
                .enabled
                .then(|| Fingerprint::new(fp.ip, fp.user_agent, Arc::clone(&crypto))),
            expiration: (exp.requests.is_some() || exp.seconds.is_some())
                .then(|| Expiration::new(exp.requests, exp.seconds)),
            decoy: config
                .decoy
                .enabled
                .then(|| Decoy::new(config.decoy.names.clone(), Arc::clone(&crypto))),
            crypto,
        }
    }

    pub fn cookie(mut self, cookie: CookieConfig) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn expiration(mut self, expiration: Expiration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn decoy(mut self, decoy: Decoy) -> Self {
        self.decoy = Some(decoy);
        self
    }

    pub fn crypto(mut self, crypto: Arc<dyn Crypto>) -> Self {
        self.crypto = crypto;
        self
    }

    fn new_id(&self) -> String {
        self.crypto.random_string(ID_LENGTH)
    }

    /// Resolves the session for `req` and attaches it.
    ///
    /// Fails with [`Error::SessionFingerprint`](crate::Error::SessionFingerprint)
    /// when the client no longer matches the one that opened the session.
    pub fn start(&self, req: &mut Request) -> Result<()> {
        let loaded = req
            .cookie(&self.cookie.name)
            .filter(|id| is_well_formed(id))
            .and_then(|id| Some((id.to_owned(), self.store.load(id)?)));

        let session = match loaded {
            Some((id, data)) => Session::new(id, data, false),
            None => Session::new(self.new_id(), SessionData::new(), true),
        };

        if !session.contains(INITIATED) {
            if !session.is_new() {
                debug!("session was not issued here, regenerating id");
                session.regenerate(self.new_id());
            }
            session.set(INITIATED, true);
        }

        if let Some(fingerprint) = &self.fingerprint {
            fingerprint.check(&session, req)?;
        }

        if let Some(expiration) = &self.expiration {
            if expiration.check(&session, Utc::now().timestamp()) {
                debug!("session budget exhausted, regenerating id");
                session.regenerate(self.new_id());
            }
        }

        req.set_session(session);
        Ok(())
    }

    /// Persists the session and sets the cookie when the ID is new.
    ///
    /// A new session that holds nothing but its own security bookkeeping is
    /// neither stored nor announced, so cookieless traffic leaves no trace
    /// in the store.
    pub fn finish(&self, session: &Session, res: &mut Response) {
        let snapshot = session.snapshot();
        if snapshot.is_new && snapshot.is_blank() {
            return;
        }
        if let Some(previous) = &snapshot.previous_id {
            self.store.destroy(previous);
        }
        self.store.save(&snapshot.id, snapshot.data);

        if snapshot.is_new || snapshot.previous_id.is_some() {
            res.add_header("set-cookie", self.build_set_cookie(&snapshot.id));
            if let Some(decoy) = &self.decoy {
                for cookie in decoy.cookies(&self.cookie.path) {
                    res.add_header("set-cookie", cookie);
                }
            }
        }
    }

    /// Builds a `Set-Cookie` header value for `session_id`.
    pub fn build_set_cookie(&self, session_id: &str) -> String {
        let cookie = &self.cookie;
        let mut parts = vec![format!("{}={}", cookie.name, session_id)];

        if let Some(domain) = &cookie.domain {
            parts.push(format!("Domain={domain}"));
        }
        parts.push(format!("Path={}", cookie.path));
        if let Some(max_age) = cookie.max_age {
            parts.push(format!("Max-Age={max_age}"));
        }
        if cookie.secure {
            parts.push("Secure".to_owned());
        }
        if cookie.http_only {
            parts.push("HttpOnly".to_owned());
        }
        parts.push(format!("SameSite={}", cookie.same_site.as_str()));

        parts.join("; ")
    }

    /// Builds a `Set-Cookie` header value that removes the session cookie.
    pub fn build_delete_cookie(&self) -> String {
        format!("{}=; Path={}; Max-Age=0", self.cookie.name, self.cookie.path)
    }
}

fn is_well_formed(id: &str) -> bool {
    (16..=128).contains(&id.len()) && id.bytes().all(|b| b.is_ascii_alphanumeric())
}
