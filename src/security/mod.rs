//! Security guards.
//!
//! Each guard is a [`Middleware`]; [`Security`] bundles the configured ones
//! so [`Router::secured`](crate::Router::secured) installs them in a fixed
//! order: authorization, intrusion detection and CSRF run in the
//! before-phase; CSRF form injection, secure headers and CSP run in the
//! after-phase.

use std::sync::Arc;

use crate::cache::Cache;
use crate::config::SecurityConfig;
use crate::error::Result;
use crate::middleware::Middleware;
use crate::request::Request;

pub mod authorization;
pub mod csp;
pub mod csrf;
pub mod headers;
pub mod ids;

pub use authorization::{AuthorizationGuard, AuthorizationPolicy};
pub use csp::{ContentSecurityPolicy, Nonce};
pub use csrf::{CsrfGuard, HiddenFields};
pub use headers::SecureHeaders;
pub use ids::{IdsReport, IdsRule, IntrusionDetection};

/// The set of guards a router runs.
///
/// Every guard is optional. A router refuses routes that carry an
/// authorization policy while no authorization guard is installed.
#[derive(Default)]
pub struct Security {
    authorization: Option<AuthorizationGuard>,
    ids: Option<IntrusionDetection>,
    csrf: Option<Arc<CsrfGuard>>,
    headers: Option<SecureHeaders>,
    csp: Option<ContentSecurityPolicy>,
}

impl Security {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every guard enabled in `config`. The IDS rule file, if any, is
    /// read through `cache`.
    pub fn from_config(config: &SecurityConfig, cache: &dyn Cache) -> Result<Self> {
        let ids = if config.ids.enabled {
            Some(IntrusionDetection::load(&config.ids, cache)?)
        } else {
            None
        };
        let csrf = if config.csrf.enabled {
            Some(Arc::new(CsrfGuard::from_config(&config.csrf)?))
        } else {
            None
        };
        let authorization = if config.authorization.is_empty() {
            None
        } else {
            Some(AuthorizationGuard::from_config(&config.authorization)?)
        };
        Ok(Self {
            authorization,
            ids,
            csrf,
            headers: config.headers.enabled.then(|| SecureHeaders::from_config(&config.headers)),
            csp: config.csp.enabled.then(|| ContentSecurityPolicy::from_config(&config.csp)),
        })
    }

    pub fn authorization(mut self, guard: AuthorizationGuard) -> Self {
        self.authorization = Some(match self.authorization.take() {
            Some(installed) => installed.merge(guard),
            None => guard,
        });
        self
    }

    /// Registers an authorization rule alongside the configured ones.
    pub fn rule<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.authorization = Some(self.authorization.take().unwrap_or_default().rule(name, f));
        self
    }

    pub fn ids(mut self, ids: IntrusionDetection) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn csrf(mut self, guard: CsrfGuard) -> Self {
        self.csrf = Some(Arc::new(guard));
        self
    }

    pub fn headers(mut self, headers: SecureHeaders) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn csp(mut self, csp: ContentSecurityPolicy) -> Self {
        self.csp = Some(csp);
        self
    }

    /// The CSRF guard, for handlers rendering their own token fields.
    pub fn csrf_guard(&self) -> Option<Arc<CsrfGuard>> {
        self.csrf.clone()
    }

    /// The full chain in run order, authorization first.
    pub fn into_middleware(self) -> Vec<Arc<dyn Middleware>> {
        let (authorization, guards) = self.into_parts();
        let mut chain: Vec<Arc<dyn Middleware>> = Vec::with_capacity(guards.len() + 1);
        if let Some(guard) = authorization {
            chain.push(Arc::new(guard));
        }
        chain.extend(guards);
        chain
    }

    /// Splits off the authorization guard so a router can keep a single one
    /// however many times guards are registered.
    pub(crate) fn into_parts(self) -> (Option<AuthorizationGuard>, Vec<Arc<dyn Middleware>>) {
        let mut chain: Vec<Arc<dyn Middleware>> = Vec::new();
        if let Some(ids) = self.ids {
            chain.push(Arc::new(ids));
        }
        if let Some(csrf) = self.csrf {
            chain.push(csrf);
        }
        if let Some(headers) = self.headers {
            chain.push(Arc::new(headers));
        }
        if let Some(csp) = self.csp {
            chain.push(Arc::new(csp));
        }
        (self.authorization, chain)
    }
}
