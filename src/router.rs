//! Request router and dispatch engine.
//!
//! One ordered route list per method. Resolution is method first, then
//! pattern, then content negotiation; the first candidate after the
//! tie-break wins. The resolved handler runs between the before and after
//! phases of the registered middleware.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::method::Method;
use crate::middleware::Middleware;
use crate::repository::{RouteDefinition, RouteRepository, TieBreak};
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::route;
use crate::security::{AuthorizationGuard, Security};
use crate::session::SessionManager;

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Registration methods return `Result<Self>` because a malformed pattern
/// must stop startup, and chain naturally with `?`.
#[derive(Default)]
pub struct Router {
    repository: RouteRepository,
    middleware: Vec<Arc<dyn Middleware>>,
    // position of the single authorization guard in `middleware`
    authorization: Option<(usize, AuthorizationGuard)>,
    sessions: Option<SessionManager>,
    csrf: bool,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax. `req.param("name")` retrieves
    /// them, or declare a typed tuple as the handler's second argument:
    ///
    /// ```rust,no_run
    /// # use bulwark::{Method, Request, Response, Router};
    /// # async fn list(_: Request) -> Response { Response::text("") }
    /// async fn show(_req: Request, (id,): (u64,)) -> Response {
    ///     Response::text(format!("book {id}"))
    /// }
    ///
    /// # fn main() -> bulwark::Result<()> {
    /// Router::new()
    ///     .on(Method::Get, "/books",      list)?
    ///     .on(Method::Get, "/books/{id}", show)?;
    /// # Ok(()) }
    /// ```
    pub fn on<M>(self, method: Method, path: &str, handler: impl Handler<M>) -> Result<Self> {
        Ok(self.route(RouteDefinition::new(method, path, handler)?))
    }

    pub fn get<M>(self, path: &str, handler: impl Handler<M>) -> Result<Self> {
        self.on(Method::Get, path, handler)
    }

    pub fn post<M>(self, path: &str, handler: impl Handler<M>) -> Result<Self> {
        self.on(Method::Post, path, handler)
    }

    pub fn put<M>(self, path: &str, handler: impl Handler<M>) -> Result<Self> {
        self.on(Method::Put, path, handler)
    }

    pub fn patch<M>(self, path: &str, handler: impl Handler<M>) -> Result<Self> {
        self.on(Method::Patch, path, handler)
    }

    pub fn delete<M>(self, path: &str, handler: impl Handler<M>) -> Result<Self> {
        self.on(Method::Delete, path, handler)
    }

    /// Register a fully configured definition (accepted formats,
    /// authorization rules).
    pub fn route(mut self, definition: RouteDefinition) -> Self {
        self.repository.add(definition);
        self
    }

    /// Append a middleware. Hooks run in registration order.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Register the configured security guards. See [`Security`] for the
    /// order they run in.
    pub fn secured(mut self, security: Security) -> Self {
        self.csrf |= security.csrf_guard().is_some();
        let (authorization, guards) = security.into_parts();
        if let Some(guard) = authorization {
            self = self.authorization(guard);
        }
        self.middleware.extend(guards);
        self
    }

    /// Install the authorization guard that enforces route policies.
    ///
    /// A router keeps one guard: a later call, or a [`Security`] with rules
    /// passed to [`secured`](Router::secured), merges its rules into the
    /// guard already installed, which keeps its place in the chain.
    pub fn authorization(mut self, guard: AuthorizationGuard) -> Self {
        let (slot, guard) = match self.authorization.take() {
            Some((slot, installed)) => (slot, installed.merge(guard)),
            None => {
                self.middleware.push(Arc::new(AuthorizationGuard::new()));
                (self.middleware.len() - 1, guard)
            }
        };
        self.middleware[slot] = Arc::new(guard.clone());
        self.authorization = Some((slot, guard));
        self
    }

    pub fn sessions(mut self, manager: SessionManager) -> Self {
        self.sessions = Some(manager);
        self
    }

    pub fn tie_break(mut self, tie_break: TieBreak) -> Self {
        self.repository.set_tie_break(tie_break);
        self
    }

    pub fn repository(&self) -> &RouteRepository {
        &self.repository
    }

    /// Setup mistakes that leave a guard unable to work. The server logs
    /// them at startup.
    pub fn misconfigurations(&self) -> Vec<&'static str> {
        let mut found = Vec::new();
        if self.csrf && self.sessions.is_none() {
            found.push("csrf guard without a session manager: tokens are not kept and every secured request fails");
        }
        found
    }

    /// Resolves and dispatches one request.
    ///
    /// Every failure is returned as a typed [`Error`]; nothing here decides
    /// on a status code.
    pub async fn run(&self, mut req: Request) -> Result<Response> {
        let method = Method::try_from(req.method())?;
        let path = route::normalize(req.path()).to_owned();

        let not_found = || Error::RouteNotFound { method: method.to_string(), path: path.clone() };
        if !self.repository.has_method(method) {
            return Err(not_found());
        }
        let definition = self
            .repository
            .find(method, &path)
            .into_iter()
            .next()
            .ok_or_else(not_found)?;

        let accept = req.header("accept").unwrap_or("");
        if !definition.is_accepted_by(accept) {
            return Err(Error::RouteNotAccepted {
                route: definition.route().pattern().to_owned(),
                accept: accept.to_owned(),
            });
        }

        if self.authorization.is_none() {
            if let Some(policy) = definition.authorization().filter(|p| !p.rules.is_empty()) {
                warn!(route = definition.route().pattern(), "route has a policy but no authorization guard is installed");
                return Err(Error::UnauthorizedAccess(policy.rules.clone()));
            }
        }

        let args = definition.route().arguments(&path);
        req.attach_route(Arc::clone(&definition), args);

        for m in &self.middleware {
            m.before(&mut req)?;
        }

        let ctx = req.context();
        let mut res = definition.handler().call(req).await?;

        for m in &self.middleware {
            res = m.after(&ctx, res)?;
        }
        Ok(res)
    }

    /// The outer boundary: session lifecycle around [`Router::run`], with
    /// every error mapped to an HTTP response.
    pub async fn handle(&self, mut req: Request) -> Response {
        let method = req.method().clone();
        let path = req.path().to_owned();

        if let Some(manager) = &self.sessions {
            if let Err(e) = manager.start(&mut req) {
                return self.reject(&method, &path, e);
            }
        }
        let session = req.session().clone();

        let mut res = match self.run(req).await {
            Ok(res) => res,
            Err(e) => self.reject(&method, &path, e),
        };

        if let Some(manager) = &self.sessions {
            manager.finish(&session, &mut res);
        }
        res
    }

    /// Logs a failed request and renders its error response, which the
    /// middleware may still decorate.
    fn reject(&self, method: &http::Method, path: &str, e: Error) -> Response {
        match &e {
            Error::IntrusionDetection(report) => {
                warn!(%method, path, impact = report.impact, findings = ?report.findings, "intrusion detected");
            }
            e if e.is_security() => warn!(%method, path, "request rejected: {e}"),
            e if e.status().is_server_error() => error!(%method, path, "request failed: {e}"),
            e => debug!(%method, path, "request refused: {e}"),
        }
        let res = e.into_response();
        self.middleware.iter().fold(res, |res, m| m.rejected(res))
    }
}
