//! Minimal bulwark example: a bookshelf with sessions, CSRF-protected forms,
//! an authorized admin page and a CSP nonce.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/books/42
//!   curl -i -c jar -b jar http://localhost:3000/books/new    # form with injected token
//!   curl -i -c jar -b jar -X POST http://localhost:3000/books -d title=Dune   # 403, no token
//!   curl -i http://localhost:3000/admin                      # 403 until logged in
//!   curl -i "http://localhost:3000/search?q=%3Cscript%3E"    # 403 from the IDS

use std::sync::Arc;

use bulwark::security::{ContentSecurityPolicy, IntrusionDetection, Security};
use bulwark::session::{MemoryStore, SessionManager};
use bulwark::{
    Config, Controller, MemoryCache, Method, Request, Response, RouteDefinition, Router, Rule,
    Server, Trace, Validator, action,
};
use tracing_subscriber::EnvFilter;

struct Books;

impl Controller for Books {}

impl Books {
    async fn form(self: Arc<Self>, req: Request) -> Response {
        let nonce = req.csp_nonce();
        Response::html(format!(
            r#"<form method="post" action="/books"><input name="title"><button>Add</button></form>
<script nonce="{nonce}">document.forms[0].title.focus()</script>"#
        ))
    }

    async fn create(self: Arc<Self>, req: Request) -> bulwark::Result<Response> {
        Validator::new()
            .field("title", [Rule::Required, Rule::MaxLength(200)])
            .validate(&req)?;
        let title = req.param("title").unwrap_or_default();
        Ok(Response::builder()
            .status(http::StatusCode::CREATED)
            .header("location", "/books/99")
            .text(format!("added {title}")))
    }
}

async fn show(_req: Request, (id,): (u64,)) -> Response {
    Response::json(format!(r#"{{"id":{id},"title":"Dune"}}"#).into_bytes())
}

async fn search(req: Request) -> String {
    format!("results for {}", req.param("q").unwrap_or_default())
}

async fn login(req: Request) -> &'static str {
    req.session().set("user_id", 1);
    "logged in"
}

async fn admin(_req: Request) -> &'static str {
    "admin area"
}

#[tokio::main]
async fn main() -> bulwark::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let security = Security::from_config(&config.security, &MemoryCache::new())?
        .ids(IntrusionDetection::builtin()?)
        .csp(ContentSecurityPolicy::new().default_src(["'self'"]))
        .rule("logged_in", |req| req.session().contains("user_id"));

    let mut session = config.session.clone();
    session.secure = false; // plain http on localhost

    let books = Arc::new(Books);
    let app = Router::new()
        .get("/books/{id}", show)?
        .get("/books/new", action(&books, Books::form))?
        .post("/books", action(&books, Books::create))?
        .get("/search", search)?
        .get("/login", login)?
        .route(RouteDefinition::new(Method::Get, "/admin", admin)?.authorize(["logged_in"], true))
        .tie_break(config.routing.tie_break)
        .with(Trace)
        .secured(security)
        .sessions(SessionManager::from_config(&session, Arc::new(MemoryStore::new())));

    Server::bind(&config.server.bind)?.serve(app).await
}
