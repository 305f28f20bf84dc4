//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! A [`Response`] is a plain value until [`Response::send`] consumes it. The
//! after-phase middleware receives the fully materialized response and
//! returns a (possibly) rewritten one; there is no hidden output buffer.

use std::fmt;

use bytes::Bytes;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use http_body_util::Full;

use crate::error::Error;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    FormData,     // application/x-www-form-urlencoded
    Html,         // text/html
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Pdf,          // application/pdf
    Text,         // text/plain
    Xml,          // application/xml
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::FormData    => "application/x-www-form-urlencoded",
            Self::Html        => "text/html",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Pdf         => "application/pdf",
            Self::Text        => "text/plain",
            Self::Xml         => "application/xml",
        }
    }

    fn is_textual(&self) -> bool {
        matches!(self, Self::Csv | Self::EventStream | Self::Html | Self::Text | Self::Xml)
    }
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// Response payload: literal bytes, or a producer run once at send time
/// (file downloads, generated exports).
pub enum Body {
    Full(Vec<u8>),
    Deferred(Box<dyn FnOnce() -> Vec<u8> + Send>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(b) => f.debug_tuple("Full").field(&b.len()).finish(),
            Self::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK, no custom headers needed)
///
/// ```rust
/// use bulwark::Response;
/// use http::StatusCode;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::html("<p>hi</p>");
/// Response::status(StatusCode::NO_CONTENT);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use bulwark::{ContentType, Response};
/// use http::StatusCode;
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/books/42")
///     .json(br#"{"id":42}"#.to_vec());
///
/// Response::builder().bytes(ContentType::Xml, b"<ok/>".to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    content_type: Option<&'static str>,
    charset: Option<&'static str>,
    headers: Vec<(String, String)>,
    body: Body,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// `200 OK`, `text/html; charset=utf-8`.
    pub fn html(body: impl Into<String>) -> Self {
        Self::builder().html(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self::builder().status(code).no_body()
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK, charset: Some("utf-8") }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn content_type(&self) -> Option<&str> { self.content_type }
    pub fn charset(&self) -> Option<&str> { self.charset }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// First value of a header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a header, case-insensitive (e.g. every `set-cookie`).
    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers.iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Appends a header. Existing values with the same name are kept.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn is_html(&self) -> bool {
        self.content_type == Some(ContentType::Html.as_str())
    }

    /// Body as UTF-8 text. `None` for deferred or non-UTF-8 bodies.
    pub fn body_text(&self) -> Option<&str> {
        match &self.body {
            Body::Full(bytes) => std::str::from_utf8(bytes).ok(),
            Body::Deferred(_) => None,
        }
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Replaces a full body, keeping status and headers.
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = Body::Full(body.into());
    }

    /// Consumes the response and produces the wire representation:
    /// status, content type (with charset), headers, then the body.
    pub fn send(self) -> http::Response<Full<Bytes>> {
        let bytes = match self.body {
            Body::Full(b) => b,
            Body::Deferred(produce) => produce(),
        };
        let mut builder = http::Response::builder().status(self.status);
        if let Some(ct) = self.content_type {
            let value = match self.charset {
                Some(cs) => format!("{ct}; charset={cs}"),
                None => ct.to_owned(),
            };
            builder = builder.header(CONTENT_TYPE, value);
        }
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        match builder.body(Full::new(Bytes::from(bytes))) {
            Ok(res) => res,
            Err(e) => {
                tracing::error!("invalid response header: {e}");
                let mut fallback = http::Response::new(Full::new(Bytes::new()));
                *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            }
        }
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`, `utf-8` charset
/// for textual bodies. Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
    charset: Option<&'static str>,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn charset(mut self, charset: &'static str) -> Self {
        self.charset = Some(charset);
        self
    }

    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish(ContentType::Json, Body::Full(body))
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Text, Body::Full(body.into().into_bytes()))
    }

    pub fn html(self, body: impl Into<String>) -> Response {
        self.finish(ContentType::Html, Body::Full(body.into().into_bytes()))
    }

    /// Terminate with a typed body. Use this for XML, CSV, binary, etc.
    pub fn bytes(self, content_type: ContentType, body: Vec<u8>) -> Response {
        self.finish(content_type, Body::Full(body))
    }

    /// Terminate with a body produced when the response is sent.
    pub fn deferred(
        self,
        content_type: ContentType,
        produce: impl FnOnce() -> Vec<u8> + Send + 'static,
    ) -> Response {
        self.finish(content_type, Body::Deferred(Box::new(produce)))
    }

    /// Terminate with no body (e.g. `204 No Content`, redirects).
    pub fn no_body(self) -> Response {
        Response {
            status: self.status,
            content_type: None,
            charset: None,
            headers: self.headers,
            body: Body::Full(Vec::new()),
        }
    }

    fn finish(self, content_type: ContentType, body: Body) -> Response {
        let charset = if content_type.is_textual() { self.charset } else { None };
        Response {
            status: self.status,
            content_type: Some(content_type.as_str()),
            charset,
            headers: self.headers,
            body,
        }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

/// Errors render as their mapped status with the reason as plain text.
/// Security rejections never echo details back to the client.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = if self.is_security() || status.is_server_error() {
            status.canonical_reason().unwrap_or("error").to_owned()
        } else {
            self.to_string()
        };
        Response::builder().status(status).text(body)
    }
}

impl<T: IntoResponse> IntoResponse for Result<T, Error> {
    fn into_response(self) -> Response {
        match self {
            Ok(v) => v.into_response(),
            Err(e) => e.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_writes_content_type_with_charset() {
        let res = Response::builder()
            .status(StatusCode::CREATED)
            .header("location", "/books/1")
            .html("<p>ok</p>")
            .send();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()["content-type"], "text/html; charset=utf-8");
        assert_eq!(res.headers()["location"], "/books/1");
    }

    #[test]
    fn binary_bodies_have_no_charset() {
        let res = Response::builder().bytes(ContentType::Pdf, vec![1, 2, 3]);
        assert_eq!(res.charset(), None);
        assert_eq!(res.send().headers()["content-type"], "application/pdf");
    }

    #[test]
    fn deferred_body_is_produced_at_send() {
        let res = Response::builder().deferred(ContentType::Csv, || b"a,b\n1,2\n".to_vec());
        assert!(res.body_text().is_none());
        let sent = res.send();
        assert_eq!(sent.headers()["content-type"], "text/csv; charset=utf-8");
    }

    #[test]
    fn security_errors_do_not_leak_details() {
        let res = Error::UnauthorizedAccess(vec!["admin".into()]).into_response();
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(res.body_text(), Some("Forbidden"));

        let res = Error::RouteNotFound { method: "GET".into(), path: "/x".into() }.into_response();
        assert_eq!(res.body_text(), Some("no route for GET /x"));
    }

    #[test]
    fn duplicate_headers_are_kept() {
        let mut res = Response::text("x");
        res.add_header("set-cookie", "a=1");
        res.add_header("Set-Cookie", "b=2");
        assert_eq!(res.header_all("set-cookie").count(), 2);
    }
}
