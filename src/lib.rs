//! # bulwark
//!
//! A web-application core for Rust services: routing and dispatch, with the
//! security guards an application needs on every request already in the
//! request path.
//!
//! ## The contract
//!
//! The router resolves every request the same way: method, then URL
//! pattern, then content negotiation. The matched handler runs between the
//! before and after phases of the registered middleware, and the security
//! guards are just middleware with a fixed order:
//!
//! - **Authorization**: named rules per route, strict or non-strict
//! - **Intrusion detection**: impact-scored input screening
//! - **CSRF**: single-use per-form tokens, injected into HTML forms
//! - **Secure headers** and **Content-Security-Policy** (with nonces)
//!
//! Sessions wrap the whole dispatch: fixation guard, client fingerprint,
//! ID refresh budget and decoy cookies.
//!
//! Every failure is a typed [`Error`]; [`Router::handle`] is the one place
//! that turns errors into HTTP responses.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use bulwark::session::{MemoryStore, SessionManager};
//! use bulwark::security::Security;
//! use bulwark::{Config, MemoryCache, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> bulwark::Result<()> {
//!     let config = Config::load("bulwark.toml")?;
//!     let security = Security::from_config(&config.security, &MemoryCache::new())?
//!         .rule("logged_in", |req| req.session().contains("user_id"));
//!
//!     let app = Router::new()
//!         .get("/books/{id}", show_book)?
//!         .secured(security)
//!         .sessions(SessionManager::from_config(&config.session, Arc::new(MemoryStore::new())));
//!
//!     Server::bind(&config.server.bind)?.serve(app).await
//! }
//!
//! async fn show_book(_req: Request, (id,): (u64,)) -> Response {
//!     Response::text(format!("book {id}"))
//! }
//! ```

mod error;
mod handler;
mod method;
mod repository;
mod request;
mod response;
mod route;
mod router;
mod server;

pub mod cache;
pub mod config;
pub mod crypto;
pub mod middleware;
pub mod security;
pub mod session;
pub mod validation;

pub use cache::{Cache, MemoryCache};
pub use config::Config;
pub use crypto::{Crypto, DefaultCrypto};
pub use error::{Error, Result};
pub use handler::{Controller, FromArgs, Handler, action};
pub use method::Method;
pub use middleware::{Middleware, RequestContext, Trace};
pub use repository::{RouteDefinition, RouteRepository, TieBreak};
pub use request::{Request, RequestBuilder, RequestFactory};
pub use response::{Body, ContentType, IntoResponse, Response, ResponseBuilder};
pub use route::{Arguments, Route};
pub use router::Router;
pub use security::Security;
pub use server::Server;
pub use session::{Session, SessionManager};
pub use validation::{Rule, ValidationErrors, Validator};
