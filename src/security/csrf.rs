//! Cross-site request forgery protection.
//!
//! Every form gets its own single-use token. Tokens live in the session
//! under `__csrf_tokens` as a `{form name: token}` map; a checked token is
//! blanked (unless the client asks to keep it alive) and blank entries are
//! purged the next time a token is generated.

use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use crate::config::CsrfConfig;
use crate::crypto::{Crypto, DefaultCrypto, constant_time_eq};
use crate::error::{Error, Result};
use crate::method::Method;
use crate::middleware::{Middleware, RequestContext};
use crate::request::Request;
use crate::response::Response;
use crate::session::Session;

pub const FIELD_NAME: &str = "CSRFName";
pub const FIELD_TOKEN: &str = "CSRFToken";
pub const HEADER_NAME: &str = "X-CSRF-NAME";
pub const HEADER_TOKEN: &str = "X-CSRF-TOKEN";
pub const KEEP_ALIVE_PARAM: &str = "CSRF_KEEP_ALIVE";
pub const KEEP_ALIVE_HEADER: &str = "X-CSRF-KEEP-ALIVE";

const SESSION_KEY: &str = "__csrf_tokens";
const FORM_PREFIX: &str = "CSRFGuard_";

static FORM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(<form[^>]*>)(.*?)(</form>)").expect("form pattern is valid")
});

/// A generated form name / token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenFields {
    pub name: String,
    pub token: String,
}

impl HiddenFields {
    /// Two hidden inputs carrying the pair.
    pub fn to_html(&self) -> String {
        format!(
            r#"<input type="hidden" name="{FIELD_NAME}" value="{}" /><input type="hidden" name="{FIELD_TOKEN}" value="{}" />"#,
            self.name, self.token
        )
    }
}

/// Single-use form tokens.
///
/// Tokens are kept in the session, so the router must also have a
/// [`SessionManager`](crate::SessionManager). Without one every token lands
/// in a throwaway session and each secured request fails as
/// [`Error::InvalidCsrf`].
pub struct CsrfGuard {
    secured: Vec<Method>,
    inject: bool,
    crypto: Arc<dyn Crypto>,
}

impl Default for CsrfGuard {
    fn default() -> Self {
        Self {
            secured: vec![Method::Post, Method::Put, Method::Patch, Method::Delete],
            inject: true,
            crypto: Arc::new(DefaultCrypto),
        }
    }
}

impl CsrfGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CsrfConfig) -> Result<Self> {
        let secured = config
            .secured_methods
            .iter()
            .map(|m| {
                m.parse::<Method>()
                    .map_err(|_| Error::Config(format!("csrf: unsupported method `{m}`")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { secured, inject: config.inject_forms, ..Self::default() })
    }

    /// Replaces the set of methods whose requests must carry a token.
    pub fn secured_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.secured = methods.into_iter().collect();
        self
    }

    pub fn inject_forms_enabled(mut self, inject: bool) -> Self {
        self.inject = inject;
        self
    }

    pub fn crypto(mut self, crypto: Arc<dyn Crypto>) -> Self {
        self.crypto = crypto;
        self
    }

    pub fn is_secured(&self, method: &http::Method) -> bool {
        Method::try_from(method).is_ok_and(|m| self.secured.contains(&m))
    }

    /// Creates a fresh form name and token and records them in `session`.
    pub fn generate_hidden_fields(&self, session: &Session) -> HiddenFields {
        let fields = HiddenFields {
            name: format!("{FORM_PREFIX}{}", self.crypto.random_string(16)),
            token: self.crypto.random_string(32),
        };
        session.with_data(|data| {
            let entry = data
                .entry(SESSION_KEY.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(tokens) = entry {
                tokens.retain(|_, token| token.as_str().is_some_and(|t| !t.is_empty()));
                tokens.insert(fields.name.clone(), Value::from(fields.token.as_str()));
            }
        });
        fields
    }

    /// Checks the token sent with `req` against the session.
    pub fn guard(&self, req: &Request) -> Result<()> {
        let lookup = |param: &str, header: &str| {
            req.param(param)
                .or_else(|| req.header(header))
                .filter(|v| !v.is_empty())
        };
        let (Some(name), Some(token)) =
            (lookup(FIELD_NAME, HEADER_NAME), lookup(FIELD_TOKEN, HEADER_TOKEN))
        else {
            return Err(Error::MissingCsrf);
        };
        let keep_alive =
            req.param(KEEP_ALIVE_PARAM).is_some() || req.header(KEEP_ALIVE_HEADER).is_some();

        req.session().with_data(|data| {
            let Some(stored) = data
                .get_mut(SESSION_KEY)
                .and_then(Value::as_object_mut)
                .and_then(|tokens| tokens.get_mut(name))
            else {
                return Err(Error::InvalidCsrf);
            };
            let expected = stored.as_str().unwrap_or_default().to_owned();
            if !keep_alive {
                *stored = Value::from("");
            }
            if !expected.is_empty() && constant_time_eq(&expected, token) {
                Ok(())
            } else {
                Err(Error::InvalidCsrf)
            }
        })
    }

    /// Adds hidden token fields right after the opening tag of every form
    /// in `html` whose opening tag does not contain `nocsrf`.
    pub fn inject_forms(&self, html: &str, session: &Session) -> String {
        FORM.replace_all(html, |caps: &Captures| {
            if caps[1].contains("nocsrf") {
                caps[0].to_owned()
            } else {
                let fields = self.generate_hidden_fields(session);
                format!("{}{}{}{}", &caps[1], fields.to_html(), &caps[2], &caps[3])
            }
        })
        .into_owned()
    }
}

impl Middleware for CsrfGuard {
    fn before(&self, req: &mut Request) -> Result<()> {
        if self.is_secured(req.method()) {
            self.guard(req)?;
        }
        Ok(())
    }

    fn after(&self, ctx: &RequestContext, mut res: Response) -> Result<Response> {
        if !self.inject || !res.is_html() {
            return Ok(res);
        }
        let injected = match res.body_text() {
            Some(html) if FORM.is_match(html) => self.inject_forms(html, ctx.session()),
            _ => return Ok(res),
        };
        res.set_body(injected);
        Ok(res)
    }
}
