//! Integration tests for resolution and dispatch.
//!
//! Requests are built by hand and driven through `Router::run` (typed
//! errors) or `Router::handle` (HTTP responses).

use std::sync::{Arc, Mutex};

use bulwark::{
    Controller, Error, Method, Middleware, Request, RequestContext, Response, RouteDefinition,
    Router, TieBreak, action,
};
use http::StatusCode;

fn get(uri: &str) -> Request {
    Request::builder(http::Method::GET, uri).build().unwrap()
}

async fn body(router: &Router, req: Request) -> String {
    let res = router.run(req).await.unwrap();
    res.body_text().unwrap().to_owned()
}

#[tokio::test]
async fn parameter_is_extracted() {
    let router = Router::new()
        .get("/books/{id}", |req: Request| async move {
            format!("book {}", req.args().get("id").unwrap_or("?"))
        })
        .unwrap();
    assert_eq!(body(&router, get("/books/42")).await, "book 42");
    assert_eq!(body(&router, get("/books/42/")).await, "book 42");
}

#[tokio::test]
async fn root_matches_only_root() {
    let router = Router::new().get("/", |_req: Request| async { "home" }).unwrap();
    assert_eq!(body(&router, get("/")).await, "home");
    let err = router.run(get("/x")).await.unwrap_err();
    assert!(matches!(err, Error::RouteNotFound { .. }));
}

#[tokio::test]
async fn literal_and_parameterized_siblings() {
    let router = Router::new()
        .get("/a/{x}", |req: Request| async move { format!("param {}", req.param("x").unwrap_or("")) })
        .unwrap()
        .get("/a", |_req: Request| async { "literal" })
        .unwrap();
    assert_eq!(body(&router, get("/a")).await, "literal");
    assert_eq!(body(&router, get("/a/5")).await, "param 5");
}

#[tokio::test]
async fn ties_break_by_pattern_string_by_default() {
    let router = Router::new()
        .get("/files/{name}", |_req: Request| async { "param" })
        .unwrap()
        .get("/files/about", |_req: Request| async { "literal" })
        .unwrap();
    // "/files/about" sorts before "/files/{name}"
    assert_eq!(body(&router, get("/files/about")).await, "literal");

    let router = Router::new()
        .get("/files/{name}", |_req: Request| async { "param" })
        .unwrap()
        .get("/files/about", |_req: Request| async { "literal" })
        .unwrap()
        .tie_break(TieBreak::Registration);
    assert_eq!(body(&router, get("/files/about")).await, "param");
}

#[tokio::test]
async fn unsupported_method_is_rejected_before_lookup() {
    let router = Router::new().get("/", |_req: Request| async { "home" }).unwrap();
    let req = Request::builder(http::Method::TRACE, "/").build().unwrap();
    let err = router.run(req).await.unwrap_err();
    assert!(matches!(err, Error::RouteMethodUnsupported(ref m) if m == "TRACE"));

    let req = Request::builder(http::Method::TRACE, "/").build().unwrap();
    assert_eq!(router.handle(req).await.status_code(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn method_without_routes_is_not_found() {
    let router = Router::new().get("/", |_req: Request| async { "home" }).unwrap();
    let req = Request::builder(http::Method::DELETE, "/").build().unwrap();
    assert!(matches!(router.run(req).await, Err(Error::RouteNotFound { .. })));
}

#[tokio::test]
async fn typed_arguments_bind_by_position() {
    async fn chapter(_req: Request, (book, n): (u64, u32)) -> String {
        format!("{book}:{n}")
    }
    let router = Router::new().get("/books/{book}/chapters/{n}", chapter).unwrap();
    assert_eq!(body(&router, get("/books/9/chapters/3")).await, "9:3");

    let err = router.run(get("/books/nine/chapters/3")).await.unwrap_err();
    assert!(matches!(err, Error::RouteArgument { ref name, .. } if name == "book"));
    let res = router.handle(get("/books/nine/chapters/3")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn content_negotiation() {
    let def = RouteDefinition::new(Method::Get, "/report", |_req: Request| async { "{}" })
        .unwrap()
        .accepts(["application/json"]);
    let router = Router::new().route(def);

    let req = Request::builder(http::Method::GET, "/report")
        .header("accept", "text/html, application/json;q=0.9")
        .build()
        .unwrap();
    assert!(router.run(req).await.is_ok());

    let req = Request::builder(http::Method::GET, "/report")
        .header("accept", "text/html")
        .build()
        .unwrap();
    let err = router.run(req).await.unwrap_err();
    assert!(matches!(err, Error::RouteNotAccepted { .. }));
    assert_eq!(err.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn duplicate_parameters_fail_registration() {
    let err = Router::new().get("/x/{id}/{id}", |_req: Request| async { "" }).err().unwrap();
    assert!(matches!(err, Error::RouteDefinition { .. }));
}

struct Books {
    open: bool,
}

impl Controller for Books {
    fn before(&self, _req: &Request) -> Option<Response> {
        (!self.open).then(|| Response::builder().status(StatusCode::SERVICE_UNAVAILABLE).text("closed"))
    }
}

impl Books {
    async fn index(self: Arc<Self>, _req: Request) -> Response {
        Response::text("all books")
    }
}

#[tokio::test]
async fn controller_before_can_short_circuit() {
    let open = Arc::new(Books { open: true });
    let router = Router::new().get("/books", action(&open, Books::index)).unwrap();
    assert_eq!(body(&router, get("/books")).await, "all books");

    let closed = Arc::new(Books { open: false });
    let router = Router::new().get("/books", action(&closed, Books::index)).unwrap();
    let res = router.run(get("/books")).await.unwrap();
    assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    reject: bool,
}

impl Middleware for Recorder {
    fn before(&self, _req: &mut Request) -> bulwark::Result<()> {
        self.log.lock().unwrap().push(format!("before {}", self.name));
        if self.reject { Err(Error::InvalidCsrf) } else { Ok(()) }
    }

    fn after(&self, _ctx: &RequestContext, mut res: Response) -> bulwark::Result<Response> {
        self.log.lock().unwrap().push(format!("after {}", self.name));
        res.add_header("x-seen-by", self.name);
        Ok(res)
    }
}

#[tokio::test]
async fn middleware_runs_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .get("/", |_req: Request| async { "ok" })
        .unwrap()
        .with(Recorder { name: "one", log: Arc::clone(&log), reject: false })
        .with(Recorder { name: "two", log: Arc::clone(&log), reject: false });

    let res = router.run(get("/")).await.unwrap();
    assert_eq!(*log.lock().unwrap(), ["before one", "before two", "after one", "after two"]);
    assert_eq!(res.header_all("x-seen-by").collect::<Vec<_>>(), ["one", "two"]);
}

#[tokio::test]
async fn before_rejection_skips_handler_and_after() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .get("/", |_req: Request| async { "ok" })
        .unwrap()
        .with(Recorder { name: "guard", log: Arc::clone(&log), reject: true })
        .with(Recorder { name: "later", log: Arc::clone(&log), reject: false });

    let res = router.handle(get("/")).await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(*log.lock().unwrap(), ["before guard"]);
}

#[tokio::test]
async fn handler_errors_render_with_their_status() {
    let router = Router::new()
        .get("/fail", |_req: Request| async {
            Err::<Response, _>(Error::Body("bad input".into()))
        })
        .unwrap();
    let res = router.handle(get("/fail")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(res.body_text(), Some("malformed request body: bad input"));
}
