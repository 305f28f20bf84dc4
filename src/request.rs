//! Incoming HTTP request type and its factory.
//!
//! A [`Request`] is initialized in two phases. [`RequestFactory`] captures the
//! network facts (method, URI, headers, cookies, body) once per connection
//! request; the router later attaches the matched route and its arguments.
//! Nothing else mutates a request after construction.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Uri};
use http_body_util::BodyExt;

use crate::error::{Error, Result};
use crate::middleware::RequestContext;
use crate::repository::RouteDefinition;
use crate::route::Arguments;
use crate::security::csp::Nonce;
use crate::session::Session;

/// An incoming HTTP request.
#[derive(Debug)]
pub struct Request {
    method: http::Method,
    uri: Uri,
    headers: HeaderMap,
    cookies: Vec<(String, String)>,
    body: Bytes,
    params: Vec<(String, String)>,
    json: Option<serde_json::Value>,
    remote_addr: Option<SocketAddr>,
    route: Option<Arc<RouteDefinition>>,
    args: Arguments,
    session: Session,
    nonce: Nonce,
    received: Instant,
}

impl Request {
    /// Starts building a request by hand. Mostly useful in tests.
    pub fn builder(method: http::Method, uri: &str) -> RequestBuilder {
        RequestBuilder {
            method,
            uri: uri.to_owned(),
            headers: Vec::new(),
            body: Bytes::new(),
            remote_addr: None,
        }
    }

    pub fn method(&self) -> &http::Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query_string(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Case-insensitive header lookup. Non-UTF-8 values are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn cookies(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Looks a parameter up across path arguments, query string and body, in
    /// that order. Path arguments win when names collide.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The parsed body when it was sent as `application/json`.
    pub fn json(&self) -> Option<&serde_json::Value> {
        self.json.as_ref()
    }

    /// Path arguments of the matched route, in declaration order.
    pub fn args(&self) -> &Arguments {
        &self.args
    }

    /// The route this request was dispatched to. `None` before resolution.
    pub fn route(&self) -> Option<&RouteDefinition> {
        self.route.as_deref()
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.remote_addr.map(|a| a.ip())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get(USER_AGENT).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn is_xhr(&self) -> bool {
        self.header("x-requested-with")
            .is_some_and(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The per-request CSP nonce, generated on first call.
    pub fn csp_nonce(&self) -> &str {
        self.nonce.get_or_generate()
    }

    /// The pieces of this request the after-phase needs once the request
    /// itself has been handed to the handler.
    pub fn context(&self) -> RequestContext {
        RequestContext {
            method: self.method.clone(),
            path: self.path().to_owned(),
            route: self.route.clone(),
            session: self.session.clone(),
            nonce: self.nonce.clone(),
            started: self.received,
        }
    }

    pub(crate) fn attach_route(&mut self, route: Arc<RouteDefinition>, args: Arguments) {
        let mut params: Vec<(String, String)> =
            args.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
        params.append(&mut self.params);
        self.params = params;
        self.args = args;
        self.route = Some(route);
    }

    pub(crate) fn set_session(&mut self, session: Session) {
        self.session = session;
    }
}

// ── RequestBuilder ────────────────────────────────────────────────────────────

/// Hand-built request. Terminated by [`RequestBuilder::build`].
pub struct RequestBuilder {
    method: http::Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
}

impl RequestBuilder {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// URL-encodes `fields` as the body and sets the form content type.
    pub fn form(self, fields: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.header(CONTENT_TYPE.as_str(), "application/x-www-form-urlencoded")
            .body(encoded)
    }

    pub fn json(self, value: &serde_json::Value) -> Self {
        self.header(CONTENT_TYPE.as_str(), "application/json")
            .body(value.to_string())
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn build(self) -> Result<Request> {
        let uri: Uri = self
            .uri
            .parse()
            .map_err(|e: http::uri::InvalidUri| Error::Body(format!("uri `{}`: {e}", self.uri)))?;
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Body(format!("header `{name}`: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Body(format!("header `{name}`: {e}")))?;
            headers.append(name, value);
        }
        RequestFactory::create(self.method, uri, headers, self.body, self.remote_addr)
    }
}

// ── RequestFactory ────────────────────────────────────────────────────────────

/// Builds [`Request`] values from the network layer.
pub struct RequestFactory;

impl RequestFactory {
    /// Collects a hyper request body and captures the request.
    pub async fn from_hyper<B>(req: hyper::Request<B>, remote_addr: SocketAddr) -> Result<Request>
    where
        B: hyper::body::Body,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = req.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| Error::Body(e.to_string()))?
            .to_bytes();
        Self::create(parts.method, parts.uri, parts.headers, body, Some(remote_addr))
    }

    /// Captures the network-level facts of a request and parses its
    /// parameters: query string first, then the body per `Content-Type`.
    pub fn create(
        method: http::Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        remote_addr: Option<SocketAddr>,
    ) -> Result<Request> {
        let cookies = parse_cookies(&headers);

        let mut params: Vec<(String, String)> = uri
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        let mut json = None;
        if !body.is_empty() {
            if content_type.starts_with("application/x-www-form-urlencoded") {
                params.extend(url::form_urlencoded::parse(&body).into_owned());
            } else if content_type.contains("json") {
                let value: serde_json::Value = serde_json::from_slice(&body)?;
                params.extend(json_scalars(&value));
                json = Some(value);
            }
        }

        Ok(Request {
            method,
            uri,
            headers,
            cookies,
            body,
            params,
            json,
            remote_addr,
            route: None,
            args: Arguments::default(),
            session: Session::detached(),
            nonce: Nonce::default(),
            received: Instant::now(),
        })
    }
}

fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            Some((k.trim().to_owned(), v.trim().to_owned()))
        })
        .collect()
}

/// Top-level scalar members of a JSON object, as strings.
fn json_scalars(value: &serde_json::Value) -> Vec<(String, String)> {
    let Some(object) = value.as_object() else {
        return Vec::new();
    };
    object
        .iter()
        .filter_map(|(k, v)| {
            let text = match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((k.clone(), text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn parses_query_and_form_body() {
        let req = Request::builder(Method::POST, "/books?page=2&q=rust")
            .form(&[("title", "Dune"), ("q", "body")])
            .build()
            .unwrap();
        assert_eq!(req.param("page"), Some("2"));
        assert_eq!(req.param("title"), Some("Dune"));
        // query string precedes body
        assert_eq!(req.param("q"), Some("rust"));
    }

    #[test]
    fn parses_json_scalars() {
        let req = Request::builder(Method::POST, "/api")
            .json(&serde_json::json!({"name": "ada", "age": 36, "tags": ["x"]}))
            .build()
            .unwrap();
        assert_eq!(req.param("name"), Some("ada"));
        assert_eq!(req.param("age"), Some("36"));
        assert_eq!(req.param("tags"), None);
        assert!(req.json().is_some());
    }

    #[test]
    fn malformed_json_is_a_body_error() {
        let err = Request::builder(Method::POST, "/api")
            .header("content-type", "application/json")
            .body("{not json")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Body(_)));
    }

    #[test]
    fn parses_cookies_and_headers() {
        let req = Request::builder(Method::GET, "/")
            .header("Cookie", "SESSID=abc; theme=dark")
            .header("X-Requested-With", "XMLHttpRequest")
            .build()
            .unwrap();
        assert_eq!(req.cookie("SESSID"), Some("abc"));
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.header("x-requested-with"), Some("XMLHttpRequest"));
        assert!(req.is_xhr());
    }

    #[test]
    fn path_arguments_take_precedence() {
        let mut req = Request::builder(Method::GET, "/books/1?id=99").build().unwrap();
        let def = RouteDefinition::new(
            crate::Method::Get,
            "/books/{id}",
            |_req: Request| async { "ok" },
        )
        .unwrap();
        let args = def.route().arguments("/books/1");
        req.attach_route(Arc::new(def), args);
        assert_eq!(req.param("id"), Some("1"));
        assert_eq!(req.args().get("id"), Some("1"));
        assert_eq!(req.route().map(|r| r.route().pattern()), Some("/books/{id}"));
    }
}
