//! Middleware layer.
//!
//! Middleware wraps every dispatched handler with two hooks: [`before`]
//! runs after the route is resolved and may reject the request, [`after`]
//! receives the materialized response and returns a (possibly) rewritten one.
//! Hooks run in registration order in both phases. When dispatch fails
//! instead, the error response goes through [`rejected`].
//!
//! The security guards (authorization, intrusion detection, CSRF, secure
//! headers, CSP) are middleware; so is [`Trace`], the per-request log line.
//!
//! [`before`]: Middleware::before
//! [`after`]: Middleware::after
//! [`rejected`]: Middleware::rejected

use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::repository::RouteDefinition;
use crate::request::Request;
use crate::response::Response;
use crate::security::csp::Nonce;
use crate::session::Session;

mod trace;

pub use trace::Trace;

/// Before/after extension point of the dispatch lifecycle.
///
/// Both hooks default to no-ops, so an implementation overrides only the
/// phase it cares about.
pub trait Middleware: Send + Sync + 'static {
    /// Runs before the handler. An `Err` aborts dispatch.
    fn before(&self, _req: &mut Request) -> Result<()> {
        Ok(())
    }

    /// Runs after the handler with the response it produced.
    fn after(&self, _ctx: &RequestContext, res: Response) -> Result<Response> {
        Ok(res)
    }

    /// Runs on the error response built when dispatch failed: an unknown
    /// route, a rejecting guard or a handler error.
    fn rejected(&self, res: Response) -> Response {
        res
    }
}

/// What the after-phase can still see of a request once the request itself
/// was moved into the handler.
#[derive(Clone)]
pub struct RequestContext {
    pub(crate) method: http::Method,
    pub(crate) path: String,
    pub(crate) route: Option<Arc<RouteDefinition>>,
    pub(crate) session: Session,
    pub(crate) nonce: Nonce,
    pub(crate) started: Instant,
}

impl RequestContext {
    pub fn method(&self) -> &http::Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn route(&self) -> Option<&RouteDefinition> { self.route.as_deref() }
    pub fn session(&self) -> &Session { &self.session }
    pub fn started(&self) -> Instant { self.started }

    /// The CSP nonce, if a handler asked for one.
    pub fn nonce(&self) -> Option<&str> {
        self.nonce.get()
    }
}
