//! Route definitions and the per-method route table.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::Result;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::route::Route;
use crate::security::authorization::AuthorizationPolicy;

/// A route bound to a method, a handler, and its negotiation/access rules.
///
/// Created at registration time and never mutated afterwards.
pub struct RouteDefinition {
    route: Route,
    method: Method,
    handler: BoxedHandler,
    accepts: Option<Vec<String>>,
    authorization: Option<AuthorizationPolicy>,
}

impl RouteDefinition {
    /// Compiles `uri` and binds `handler`. Fails on a malformed pattern.
    pub fn new<M>(method: Method, uri: &str, handler: impl Handler<M>) -> Result<Self> {
        Ok(Self {
            route: Route::new(uri)?,
            method,
            handler: handler.into_boxed_handler(),
            accepts: None,
            authorization: None,
        })
    }

    /// Restricts the route to clients whose `Accept` header mentions at least
    /// one of `formats`.
    pub fn accepts<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepts = Some(formats.into_iter().map(Into::into).collect());
        self
    }

    /// Guards the route with named authorization rules.
    ///
    /// With `strict`, every rule must pass; otherwise one passing rule is
    /// enough.
    pub fn authorize<I, S>(mut self, rules: I, strict: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorization = Some(AuthorizationPolicy {
            rules: rules.into_iter().map(Into::into).collect(),
            strict,
        });
        self
    }

    pub fn route(&self) -> &Route { &self.route }
    pub fn method(&self) -> Method { self.method }
    pub fn accepted(&self) -> Option<&[String]> { self.accepts.as_deref() }
    pub fn authorization(&self) -> Option<&AuthorizationPolicy> { self.authorization.as_ref() }

    pub(crate) fn handler(&self) -> &BoxedHandler {
        &self.handler
    }

    /// Content negotiation: substring match of any accepted format against
    /// the raw `Accept` header. Routes without a list accept everything.
    pub fn is_accepted_by(&self, accept: &str) -> bool {
        match &self.accepts {
            None => true,
            Some(formats) => formats.iter().any(|f| accept.contains(f.as_str())),
        }
    }
}

impl fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("method", &self.method)
            .field("pattern", &self.route.pattern())
            .field("accepts", &self.accepts)
            .field("authorization", &self.authorization)
            .finish_non_exhaustive()
    }
}

/// How candidates matching the same path are ordered before the first one
/// is picked.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Stable sort by the literal pattern string.
    #[default]
    Lexical,
    /// Registration order.
    Registration,
}

/// The route table: one ordered list of definitions per method.
#[derive(Default)]
pub struct RouteRepository {
    routes: HashMap<Method, Vec<Arc<RouteDefinition>>>,
    tie_break: TieBreak,
}

impl RouteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tie_break(&mut self, tie_break: TieBreak) {
        self.tie_break = tie_break;
    }

    /// Appends `definition` to its method's list. Registration order is kept.
    pub fn add(&mut self, definition: RouteDefinition) {
        self.routes
            .entry(definition.method)
            .or_default()
            .push(Arc::new(definition));
    }

    pub fn has_method(&self, method: Method) -> bool {
        self.routes.get(&method).is_some_and(|r| !r.is_empty())
    }

    /// Every definition of `method` whose pattern matches `uri`, ordered by
    /// the configured tie-break.
    pub fn find(&self, method: Method, uri: &str) -> Vec<Arc<RouteDefinition>> {
        let Some(routes) = self.routes.get(&method) else {
            return Vec::new();
        };
        let mut found: Vec<Arc<RouteDefinition>> = routes
            .iter()
            .filter(|d| d.route.matches(uri))
            .cloned()
            .collect();
        if found.len() > 1 && self.tie_break == TieBreak::Lexical {
            found.sort_by(|a, b| a.route.pattern().cmp(b.route.pattern()));
        }
        found
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteDefinition> {
        self.routes.values().flatten().map(Arc::as_ref)
    }
}
