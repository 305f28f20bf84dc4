use crate::config::SecureHeadersConfig;
use crate::error::Result;
use crate::middleware::{Middleware, RequestContext};
use crate::response::Response;

/// Hardening headers added to every response, error pages included. A
/// header the handler already set is left as is.
#[derive(Clone, Debug)]
pub struct SecureHeaders {
    headers: Vec<(&'static str, String)>,
}

impl Default for SecureHeaders {
    fn default() -> Self {
        Self::from_config(&SecureHeadersConfig::default())
    }
}

impl SecureHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SecureHeadersConfig) -> Self {
        let headers = Self {
            headers: vec![
                ("X-Frame-Options", config.frame_options.clone()),
                ("X-Content-Type-Options", "nosniff".to_owned()),
                ("X-XSS-Protection", "1; mode=block".to_owned()),
                ("Referrer-Policy", config.referrer_policy.clone()),
                ("X-Permitted-Cross-Domain-Policies", "none".to_owned()),
            ],
        };
        if config.hsts { headers.hsts(config.hsts_max_age) } else { headers }
    }

    /// Adds `Strict-Transport-Security`. Only meaningful behind TLS.
    pub fn hsts(mut self, max_age: u64) -> Self {
        self.set("Strict-Transport-Security", format!("max-age={max_age}; includeSubDomains"));
        self
    }

    pub fn frame_options(mut self, value: impl Into<String>) -> Self {
        self.set("X-Frame-Options", value.into());
        self
    }

    pub fn headers(&self) -> &[(&'static str, String)] {
        &self.headers
    }

    /// Adds every header `res` does not carry yet.
    pub fn apply(&self, res: &mut Response) {
        for (name, value) in &self.headers {
            if !res.has_header(name) {
                res.add_header(*name, value.clone());
            }
        }
    }

    fn set(&mut self, name: &'static str, value: String) {
        match self.headers.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.headers.push((name, value)),
        }
    }
}

impl Middleware for SecureHeaders {
    fn after(&self, _ctx: &RequestContext, mut res: Response) -> Result<Response> {
        self.apply(&mut res);
        Ok(res)
    }

    fn rejected(&self, mut res: Response) -> Response {
        self.apply(&mut res);
        res
    }
}
