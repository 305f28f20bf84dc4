//! End-to-end tests for the guards and session add-ons, driven through
//! `Router::handle` so sessions, middleware and error mapping all take part.

use std::sync::Arc;

use bulwark::security::csrf::{FIELD_NAME, FIELD_TOKEN, HEADER_NAME, HEADER_TOKEN, KEEP_ALIVE_HEADER};
use bulwark::security::{
    AuthorizationGuard, ContentSecurityPolicy, CsrfGuard, IntrusionDetection, SecureHeaders, Security,
};
use bulwark::session::{Expiration, Fingerprint, MemoryStore, SessionManager};
use bulwark::{DefaultCrypto, Method, Request, Response, RouteDefinition, Router};
use http::StatusCode;

const FORM_PAGE: &str = r#"<html><body>
<form method="post" action="/books"><input name="title"></form>
<form method="get" action="/search" class="nocsrf"><input name="q"></form>
</body></html>"#;

fn sessions() -> SessionManager {
    SessionManager::new(Arc::new(MemoryStore::new()))
}

fn csrf_app() -> Router {
    Router::new()
        .get("/books/new", |_req: Request| async { Response::html(FORM_PAGE) })
        .unwrap()
        .post("/books", |_req: Request| async { "created" })
        .unwrap()
        .secured(Security::new().csrf(CsrfGuard::new()))
        .sessions(sessions())
}

/// `SESSID=…` from the response, ready to send back as a `Cookie` header.
fn session_cookie(res: &Response) -> String {
    res.header_all("set-cookie")
        .find(|c| c.starts_with("SESSID="))
        .and_then(|c| c.split(';').next())
        .unwrap()
        .to_owned()
}

fn hidden_value<'a>(html: &'a str, field: &str) -> &'a str {
    let marker = format!(r#"name="{field}" value=""#);
    let start = html.find(&marker).unwrap() + marker.len();
    let len = html[start..].find('"').unwrap();
    &html[start..start + len]
}

fn post_form(cookie: &str, fields: &[(&str, &str)]) -> Request {
    Request::builder(http::Method::POST, "/books")
        .header("cookie", cookie)
        .form(fields)
        .build()
        .unwrap()
}

#[tokio::test]
async fn forms_get_tokens_except_nocsrf() {
    let app = csrf_app();
    let res = app.handle(Request::builder(http::Method::GET, "/books/new").build().unwrap()).await;
    let html = res.body_text().unwrap();

    assert_eq!(html.matches(r#"type="hidden""#).count(), 2);
    assert!(html.contains(
        r#"<form method="get" action="/search" class="nocsrf"><input name="q"></form>"#
    ));
    assert!(hidden_value(html, FIELD_NAME).starts_with("CSRFGuard_"));
}

#[tokio::test]
async fn csrf_token_is_single_use() {
    let app = csrf_app();
    let page = app.handle(Request::builder(http::Method::GET, "/books/new").build().unwrap()).await;
    let cookie = session_cookie(&page);
    let html = page.body_text().unwrap();
    let fields = [
        (FIELD_NAME, hidden_value(html, FIELD_NAME)),
        (FIELD_TOKEN, hidden_value(html, FIELD_TOKEN)),
        ("title", "Dune"),
    ];

    let res = app.handle(post_form(&cookie, &fields)).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body_text(), Some("created"));

    let replay = app.handle(post_form(&cookie, &fields)).await;
    assert_eq!(replay.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn csrf_keep_alive_header_allows_reuse() {
    let app = csrf_app();
    let page = app.handle(Request::builder(http::Method::GET, "/books/new").build().unwrap()).await;
    let cookie = session_cookie(&page);
    let html = page.body_text().unwrap();
    let (name, token) = (hidden_value(html, FIELD_NAME), hidden_value(html, FIELD_TOKEN));

    for _ in 0..3 {
        let req = Request::builder(http::Method::POST, "/books")
            .header("cookie", &cookie)
            .header(HEADER_NAME, name)
            .header(HEADER_TOKEN, token)
            .header(KEEP_ALIVE_HEADER, "1")
            .build()
            .unwrap();
        assert_eq!(app.handle(req).await.status_code(), StatusCode::OK);
    }
}

#[tokio::test]
async fn missing_token_is_forbidden_without_details() {
    let app = csrf_app();
    let res = app.handle(post_form("", &[("title", "Dune")])).await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(res.body_text(), Some("Forbidden"));
}

fn admin_app(strict: bool) -> Router {
    let def = RouteDefinition::new(Method::Get, "/admin", |_req: Request| async { "admin" })
        .unwrap()
        .authorize(["office", "weekday"], strict);
    let security = Security::new()
        .rule("office", |req| req.header("x-office").is_some())
        .rule("weekday", |_req| true);
    Router::new().route(def).secured(security)
}

fn admin_request(in_office: bool) -> Request {
    let mut builder = Request::builder(http::Method::GET, "/admin");
    if in_office {
        builder = builder.header("x-office", "hq");
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn non_strict_policy_needs_one_rule() {
    let app = admin_app(false);
    assert_eq!(app.handle(admin_request(false)).await.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn strict_policy_needs_every_rule() {
    let app = admin_app(true);
    assert_eq!(app.handle(admin_request(true)).await.status_code(), StatusCode::OK);

    let err = app.run(admin_request(false)).await.unwrap_err();
    assert!(matches!(err, bulwark::Error::UnauthorizedAccess(ref failed) if failed == &["office"]));
}

#[tokio::test]
async fn standalone_guard_reports_failed_rules() {
    let def = RouteDefinition::new(Method::Get, "/admin", |_req: Request| async { "admin" })
        .unwrap()
        .authorize(["office", "unregistered"], false);
    let guard = AuthorizationGuard::new().rule("office", |req| req.header("x-office").is_some());
    let app = Router::new().route(def).authorization(guard);

    assert_eq!(app.handle(admin_request(true)).await.status_code(), StatusCode::OK);
    let err = app.run(admin_request(false)).await.unwrap_err();
    assert!(matches!(err, bulwark::Error::UnauthorizedAccess(ref failed)
        if failed == &["office", "unregistered"]));
}

#[tokio::test]
async fn standalone_guard_combines_with_other_guards() {
    let def = RouteDefinition::new(Method::Get, "/admin", |_req: Request| async { "admin" })
        .unwrap()
        .authorize(["office"], true);
    let app = Router::new()
        .route(def)
        .authorization(AuthorizationGuard::new().rule("office", |_req| true))
        .secured(Security::new().headers(SecureHeaders::new()));

    let res = app.handle(admin_request(false)).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.header("x-content-type-options"), Some("nosniff"));
}

#[tokio::test]
async fn policy_without_a_guard_is_refused() {
    let def = RouteDefinition::new(Method::Get, "/admin", |_req: Request| async { "admin" })
        .unwrap()
        .authorize(["office"], false);
    let app = Router::new().route(def).secured(Security::new().headers(SecureHeaders::new()));

    let err = app.run(admin_request(true)).await.unwrap_err();
    assert!(matches!(err, bulwark::Error::UnauthorizedAccess(ref failed) if failed == &["office"]));
}

#[tokio::test]
async fn nested_json_payload_is_rejected() {
    let app = Router::new()
        .post("/api", |_req: Request| async { "stored" })
        .unwrap()
        .secured(Security::new().ids(IntrusionDetection::builtin().unwrap()));

    let post = |body: serde_json::Value| {
        Request::builder(http::Method::POST, "/api").json(&body).build().unwrap()
    };
    let flat = app.handle(post(serde_json::json!({"q": "<script>alert(1)</script>"}))).await;
    assert_eq!(flat.status_code(), StatusCode::FORBIDDEN);
    let nested = app.handle(post(serde_json::json!({"q": ["<script>alert(1)</script>"]}))).await;
    assert_eq!(nested.status_code(), StatusCode::FORBIDDEN);
    let benign = app.handle(post(serde_json::json!({"q": ["rust", {"tag": "books"}]}))).await;
    assert_eq!(benign.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn intrusion_is_rejected_before_the_handler() {
    let app = Router::new()
        .get("/search", |_req: Request| async { "results" })
        .unwrap()
        .secured(Security::new().ids(IntrusionDetection::builtin().unwrap()));

    let ok = Request::builder(http::Method::GET, "/search?q=rust+books").build().unwrap();
    assert_eq!(app.handle(ok).await.status_code(), StatusCode::OK);

    let attack = Request::builder(http::Method::GET, "/search?q=%3Cscript%3Ealert(1)%3C%2Fscript%3E")
        .build()
        .unwrap();
    let err = app.run(attack).await.unwrap_err();
    let bulwark::Error::IntrusionDetection(report) = err else { panic!("expected ids rejection") };
    assert!(report.impact > 5);
    assert_eq!(report.findings[0].parameter, "q");
}

#[tokio::test]
async fn csp_carries_the_handler_nonce() {
    let app = Router::new()
        .get("/", |req: Request| async move {
            let nonce = req.csp_nonce().to_owned();
            Response::html(format!(r#"<script nonce="{nonce}"></script>"#))
        })
        .unwrap()
        .secured(Security::new().csp(ContentSecurityPolicy::new().default_src(["'self'"])));

    let res = app.handle(Request::builder(http::Method::GET, "/").build().unwrap()).await;
    let html = res.body_text().unwrap();
    let nonce = html.split('"').nth(1).unwrap();
    let policy = res.header("content-security-policy").unwrap();
    assert_eq!(policy, format!("default-src 'self'; script-src 'nonce-{nonce}';"));
}

#[tokio::test]
async fn rejections_and_unknown_routes_are_hardened() {
    let app = Router::new()
        .post("/books", |_req: Request| async { "created" })
        .unwrap()
        .secured(
            Security::new()
                .csrf(CsrfGuard::new())
                .headers(SecureHeaders::new())
                .csp(ContentSecurityPolicy::new().default_src(["'self'"])),
        )
        .sessions(sessions());

    let forbidden = app.handle(post_form("", &[("title", "Dune")])).await;
    assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(forbidden.header("x-content-type-options"), Some("nosniff"));
    assert_eq!(forbidden.header("content-security-policy"), Some("default-src 'self';"));

    let missing = app.handle(Request::builder(http::Method::GET, "/nope").build().unwrap()).await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(missing.header("x-frame-options"), Some("SAMEORIGIN"));
}

#[tokio::test]
async fn secure_headers_keep_handler_values() {
    let app = Router::new()
        .get("/embed", |_req: Request| async {
            Response::builder().header("X-Frame-Options", "ALLOWALL").text("embeddable")
        })
        .unwrap()
        .secured(Security::new().headers(SecureHeaders::new()));

    let res = app.handle(Request::builder(http::Method::GET, "/embed").build().unwrap()).await;
    assert_eq!(res.header_all("x-frame-options").collect::<Vec<_>>(), ["ALLOWALL"]);
    assert_eq!(res.header("x-content-type-options"), Some("nosniff"));
}

fn browser(ua: &str, cookie: Option<&str>) -> Request {
    let mut builder = Request::builder(http::Method::GET, "/")
        .header("user-agent", ua)
        .remote_addr("192.0.2.10:50000".parse().unwrap());
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn hijacked_session_is_refused() {
    let manager = sessions().fingerprint(Fingerprint::new(true, true, Arc::new(DefaultCrypto)));
    let app = Router::new()
        .get("/", |req: Request| async move {
            req.session().set("user", "ada");
            "hi"
        })
        .unwrap()
        .sessions(manager);

    let first = app.handle(browser("firefox", None)).await;
    let cookie = session_cookie(&first);

    let same = app.handle(browser("firefox", Some(&cookie))).await;
    assert_eq!(same.status_code(), StatusCode::OK);

    let stolen = app.handle(browser("curl/8.0", Some(&cookie))).await;
    assert_eq!(stolen.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn session_id_refreshes_after_request_budget() {
    let manager = sessions().expiration(Expiration::new(Some(2), None));
    let app = Router::new()
        .get("/", |req: Request| async move {
            let visits = req.session().get::<u32>("visits").unwrap_or(0) + 1;
            req.session().set("visits", visits);
            visits.to_string()
        })
        .unwrap()
        .sessions(manager);

    let first = app.handle(browser("firefox", None)).await;
    let cookie = session_cookie(&first);

    let second = app.handle(browser("firefox", Some(&cookie))).await;
    assert!(!second.has_header("set-cookie"));
    assert_eq!(second.body_text(), Some("2"));

    let third = app.handle(browser("firefox", Some(&cookie))).await;
    let refreshed = session_cookie(&third);
    assert_ne!(refreshed, cookie);
    // data moves to the new id, the old id is gone
    assert_eq!(third.body_text(), Some("3"));
    let stale = app.handle(browser("firefox", Some(&cookie))).await;
    assert_eq!(stale.body_text(), Some("1"));
}

#[tokio::test]
async fn cookieless_traffic_leaves_the_store_empty() {
    let store = Arc::new(MemoryStore::new());
    let manager = SessionManager::new(store.clone())
        .fingerprint(Fingerprint::new(true, true, Arc::new(DefaultCrypto)));
    let app = Router::new().get("/", |_req: Request| async { "hi" }).unwrap().sessions(manager);

    for path in ["/", "/missing"] {
        for _ in 0..500 {
            let req = Request::builder(http::Method::GET, path)
                .header("user-agent", "curl/8.0")
                .remote_addr("192.0.2.10:50000".parse().unwrap())
                .build()
                .unwrap();
            let res = app.handle(req).await;
            assert!(!res.has_header("set-cookie"));
        }
    }
    assert!(store.is_empty());
}
