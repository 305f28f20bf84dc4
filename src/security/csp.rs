//! Content-Security-Policy header construction.

use std::sync::{Arc, OnceLock};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::config::CspConfig;
use crate::crypto::{Crypto, DefaultCrypto};
use crate::error::Result;
use crate::middleware::{Middleware, RequestContext};
use crate::response::Response;

const NONCE_BYTES: usize = 16;

/// Per-request script nonce.
///
/// Generated the first time a handler asks for it; clones share the value,
/// so the after-phase sees exactly the nonce the page was rendered with.
#[derive(Clone, Debug, Default)]
pub struct Nonce(Arc<OnceLock<String>>);

impl Nonce {
    pub fn get_or_generate(&self) -> &str {
        self.0.get_or_init(|| STANDARD.encode(DefaultCrypto.random_bytes(NONCE_BYTES)))
    }

    /// The nonce, if one was generated.
    pub fn get(&self) -> Option<&str> {
        self.0.get().map(String::as_str)
    }
}

/// Builder for the policy header.
///
/// ```
/// # use bulwark::security::csp::ContentSecurityPolicy;
/// let csp = ContentSecurityPolicy::new()
///     .default_src(["'self'"])
///     .img_src(["'self'", "data:"]);
/// assert_eq!(csp.header_value(None), "default-src 'self'; img-src 'self' data:;");
/// ```
#[derive(Clone, Debug, Default)]
pub struct ContentSecurityPolicy {
    directives: Vec<(String, Vec<String>)>,
    report_only: bool,
    legacy: bool,
}

macro_rules! directives {
    ($($fn:ident => $name:literal),* $(,)?) => {
        $(
            pub fn $fn<I, S>(self, sources: I) -> Self
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                self.directive($name, sources)
            }
        )*
    };
}

impl ContentSecurityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CspConfig) -> Self {
        let mut csp = config
            .directives
            .iter()
            .fold(Self::new(), |csp, (name, sources)| csp.directive(name, sources.iter().cloned()))
            .report_only(config.report_only)
            .legacy_header(config.legacy_header);
        if let Some(uri) = &config.report_uri {
            csp = csp.report_uri(uri.clone());
        }
        csp
    }

    /// Appends sources to a directive, creating it if needed.
    pub fn directive<I, S>(mut self, name: &str, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources = sources.into_iter().map(Into::into);
        match self.directives.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => existing.extend(sources),
            None => self.directives.push((name.to_owned(), sources.collect())),
        }
        self
    }

    directives! {
        default_src => "default-src",
        script_src => "script-src",
        style_src => "style-src",
        img_src => "img-src",
        connect_src => "connect-src",
        font_src => "font-src",
        object_src => "object-src",
        media_src => "media-src",
        frame_src => "frame-src",
        frame_ancestors => "frame-ancestors",
        form_action => "form-action",
        base_uri => "base-uri",
    }

    pub fn report_uri(self, uri: impl Into<String>) -> Self {
        self.directive("report-uri", [uri.into()])
    }

    pub fn report_only(mut self, enabled: bool) -> Self {
        self.report_only = enabled;
        self
    }

    /// Also emit the `X-Content-Security-Policy` header of older browsers.
    pub fn legacy_header(mut self, enabled: bool) -> Self {
        self.legacy = enabled;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.directives.iter().all(|(_, sources)| sources.is_empty())
    }

    /// Header value: every non-empty directive as `name v1 v2;`, separated by
    /// spaces. A nonce is added to `script-src`.
    pub fn header_value(&self, nonce: Option<&str>) -> String {
        let nonce = nonce.map(|n| format!("'nonce-{n}'"));
        let mut parts = Vec::with_capacity(self.directives.len() + 1);
        let mut has_script_src = false;

        for (name, sources) in &self.directives {
            let mut sources: Vec<&str> = sources.iter().map(String::as_str).collect();
            if name == "script-src" {
                has_script_src = true;
                sources.extend(nonce.as_deref());
            }
            if !sources.is_empty() {
                parts.push(format!("{name} {};", sources.join(" ")));
            }
        }
        if let (false, Some(nonce)) = (has_script_src, &nonce) {
            parts.push(format!("script-src {nonce};"));
        }
        parts.join(" ")
    }

    /// The headers to send.
    pub fn headers(&self, nonce: Option<&str>) -> Vec<(&'static str, String)> {
        let value = self.header_value(nonce);
        let (name, legacy) = if self.report_only {
            ("Content-Security-Policy-Report-Only", "X-Content-Security-Policy-Report-Only")
        } else {
            ("Content-Security-Policy", "X-Content-Security-Policy")
        };
        let mut headers = vec![(name, value.clone())];
        if self.legacy {
            headers.push((legacy, value));
        }
        headers
    }

    fn apply(&self, res: &mut Response, nonce: Option<&str>) {
        for (name, value) in self.headers(nonce) {
            if !res.has_header(name) {
                res.add_header(name, value);
            }
        }
    }
}

impl Middleware for ContentSecurityPolicy {
    fn after(&self, ctx: &RequestContext, mut res: Response) -> Result<Response> {
        if self.is_empty() && ctx.nonce().is_none() {
            return Ok(res);
        }
        self.apply(&mut res, ctx.nonce());
        Ok(res)
    }

    fn rejected(&self, mut res: Response) -> Response {
        if !self.is_empty() {
            self.apply(&mut res, None);
        }
        res
    }
}
