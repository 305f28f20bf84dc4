//! Route-level authorization with named rules.
//!
//! A route carries an [`AuthorizationPolicy`]: a list of rule names and a
//! strictness flag. The [`AuthorizationGuard`] holds the rule predicates.
//! In strict mode every rule must pass; otherwise one passing rule is
//! enough.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use crate::config::AuthorizationRuleConfig;
use crate::error::{Error, Result};
use crate::middleware::Middleware;
use crate::request::Request;

type Rule = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Rules a route requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    pub rules: Vec<String>,
    pub strict: bool,
}

#[derive(Clone, Default)]
pub struct AuthorizationGuard {
    rules: HashMap<String, Rule>,
}

impl AuthorizationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named predicate.
    pub fn rule<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.rules.insert(name.into(), Arc::new(f));
        self
    }

    /// Adds every rule of `other`. A name both guards define takes `other`'s
    /// predicate.
    pub fn merge(mut self, other: AuthorizationGuard) -> Self {
        self.rules.extend(other.rules);
        self
    }

    /// Passes when `key` is set in the session.
    pub fn session_key(self, name: impl Into<String>, key: impl Into<String>) -> Self {
        let key = key.into();
        self.rule(name, move |req| req.session().contains(&key))
    }

    /// Passes when the client address is one of `ips`.
    pub fn client_ip(self, name: impl Into<String>, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        let ips: Vec<IpAddr> = ips.into_iter().collect();
        self.rule(name, move |req| req.client_ip().is_some_and(|ip| ips.contains(&ip)))
    }

    /// Adds the rules declared in configuration. A declared rule passes when
    /// all of its conditions hold.
    pub fn from_config(rules: &[AuthorizationRuleConfig]) -> Result<Self> {
        rules.iter().try_fold(Self::new(), |guard, rule| {
            let ips = rule
                .client_ip
                .iter()
                .map(|ip| {
                    ip.parse::<IpAddr>().map_err(|e| {
                        Error::Config(format!("authorization rule `{}`: `{ip}`: {e}", rule.name))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            if rule.session_key.is_none() && ips.is_empty() {
                return Err(Error::Config(format!(
                    "authorization rule `{}` has no condition",
                    rule.name
                )));
            }
            let session_key = rule.session_key.clone();
            Ok(guard.rule(rule.name.clone(), move |req| {
                session_key.as_deref().is_none_or(|key| req.session().contains(key))
                    && (ips.is_empty() || req.client_ip().is_some_and(|ip| ips.contains(&ip)))
            }))
        })
    }

    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Pass/fail of each rule in `policy`, in policy order. Unknown names fail.
    pub fn evaluate(&self, req: &Request, policy: &AuthorizationPolicy) -> Vec<(String, bool)> {
        policy
            .rules
            .iter()
            .map(|name| {
                let passed = self.rules.get(name).is_some_and(|rule| rule(req));
                (name.clone(), passed)
            })
            .collect()
    }

    pub fn authorize(&self, req: &Request, policy: &AuthorizationPolicy) -> Result<()> {
        if policy.rules.is_empty() {
            return Ok(());
        }
        let results = self.evaluate(req, policy);
        let failed: Vec<String> =
            results.iter().filter(|(_, passed)| !passed).map(|(name, _)| name.clone()).collect();

        let blocked = if policy.strict {
            !failed.is_empty()
        } else {
            failed.len() == results.len()
        };
        if blocked { Err(Error::UnauthorizedAccess(failed)) } else { Ok(()) }
    }
}

impl Middleware for AuthorizationGuard {
    fn before(&self, req: &mut Request) -> Result<()> {
        match req.route().and_then(|r| r.authorization()) {
            Some(policy) => self.authorize(req, policy),
            None => Ok(()),
        }
    }
}
