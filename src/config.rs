//! Configuration schema and loading.
//!
//! Every section derives `Deserialize` with `#[serde(default)]`, so a config
//! file only needs the keys it changes. The raw TOML table is kept alongside
//! the typed view for collaborators that read ad-hoc keys through
//! [`Config::get`].
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [security.csrf]
//! secured_methods = ["POST", "PUT", "PATCH", "DELETE", "GET"]
//!
//! [security.ids]
//! enabled = true
//! threshold = 5
//!
//! [[security.authorization]]
//! name = "office"
//! client_ip = ["10.0.0.7"]
//!
//! [session.expiration]
//! requests = 50
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::repository::TieBreak;
use crate::session::SameSite;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub routing: RoutingConfig,
    pub security: SecurityConfig,
    pub session: SessionConfig,

    #[serde(skip)]
    raw: toml::Table,
}

impl Config {
    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: toml::Table = toml::from_str(text)?;
        let mut config: Config = toml::Value::Table(raw.clone()).try_into()?;
        config.raw = raw;
        Ok(config)
    }

    /// Raw value lookup. `section` may be dotted (`"security.csrf"`).
    pub fn get(&self, section: &str, key: &str) -> Option<&toml::Value> {
        let mut table = &self.raw;
        for part in section.split('.').filter(|p| !p.is_empty()) {
            table = table.get(part)?.as_table()?;
        }
        table.get(key)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g. `"0.0.0.0:3000"`).
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3000".to_owned() }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub tie_break: TieBreak,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub csrf: CsrfConfig,
    pub ids: IdsConfig,
    pub headers: SecureHeadersConfig,
    pub csp: CspConfig,
    pub authorization: Vec<AuthorizationRuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    pub enabled: bool,
    /// Methods whose requests must carry a valid token. GET is opt-in.
    pub secured_methods: Vec<String>,
    /// Add hidden token fields to every HTML form on the way out.
    pub inject_forms: bool,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            secured_methods: ["POST", "PUT", "PATCH", "DELETE"].map(String::from).to_vec(),
            inject_forms: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdsConfig {
    pub enabled: bool,
    /// Requests whose total impact is strictly above this are rejected.
    pub threshold: u32,
    pub scan_cookies: bool,
    /// JSON rule file replacing the built-in rule set.
    pub rules_path: Option<PathBuf>,
    /// Parameter names never screened (e.g. password fields).
    pub exclude: Vec<String>,
}

impl Default for IdsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 5,
            scan_cookies: false,
            rules_path: None,
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecureHeadersConfig {
    pub enabled: bool,
    pub frame_options: String,
    pub referrer_policy: String,
    pub hsts: bool,
    pub hsts_max_age: u64,
}

impl Default for SecureHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frame_options: "SAMEORIGIN".to_owned(),
            referrer_policy: "strict-origin-when-cross-origin".to_owned(),
            hsts: false,
            hsts_max_age: 31_536_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CspConfig {
    pub enabled: bool,
    pub report_only: bool,
    /// Also send the `X-Content-Security-Policy` header for older browsers.
    pub legacy_header: bool,
    pub report_uri: Option<String>,
    /// Directive name → source list, e.g. `script-src = ["'self'"]`.
    pub directives: BTreeMap<String, Vec<String>>,
}

/// A named authorization rule declared in configuration. Every condition
/// given must hold for the rule to pass.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthorizationRuleConfig {
    pub name: String,
    /// Passes when this session key is set.
    pub session_key: Option<String>,
    /// Passes when the client IP is one of these.
    pub client_ip: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub cookie_path: String,
    pub cookie_domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
    pub max_age: Option<i64>,
    pub fingerprint: FingerprintConfig,
    pub expiration: ExpirationConfig,
    pub decoy: DecoyConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "SESSID".to_owned(),
            cookie_path: "/".to_owned(),
            cookie_domain: None,
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
            max_age: None,
            fingerprint: FingerprintConfig::default(),
            expiration: ExpirationConfig::default(),
            decoy: DecoyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    pub enabled: bool,
    pub ip: bool,
    pub user_agent: bool,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self { enabled: true, ip: true, user_agent: true }
    }
}

/// Session-ID refresh budget. Either limit may be unset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExpirationConfig {
    pub requests: Option<u32>,
    pub seconds: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecoyConfig {
    pub enabled: bool,
    pub names: Vec<String>,
}

impl Default for DecoyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            names: ["PHPSESSID", "JSESSIONID", "ASP.NET_SessionId"].map(String::from).to_vec(),
        }
    }
}
