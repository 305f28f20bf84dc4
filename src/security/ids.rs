//! Intrusion detection: heuristic screening of request input.
//!
//! Each [`IdsRule`] is a regular expression with an impact score. Every
//! request parameter (and optionally every cookie) is matched against the
//! whole rule set at once through a [`RegexSet`]; the impacts of all matches
//! add up, and a request whose total exceeds the threshold is rejected.
//!
//! The built-in rule set covers SQL injection, XSS, path traversal, command
//! injection and template injection. A JSON rule file can replace it; the
//! parsed file is kept in a [`Cache`] and only re-read when the file is
//! newer than the cache entry.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::config::IdsConfig;
use crate::error::{Error, Result};
use crate::middleware::Middleware;
use crate::request::Request;

const CACHE_PREFIX: &str = "bulwark.ids.rules:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdsRule {
    pub id: u32,
    pub pattern: String,
    pub description: String,
    pub impact: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One rule matched by one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub parameter: String,
    pub rule: u32,
    pub description: String,
    pub impact: u32,
}

/// Result of screening one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdsReport {
    pub impact: u32,
    pub findings: Vec<Finding>,
}

impl IdsReport {
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    /// Names of the inputs that matched at least one rule.
    pub fn parameters(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.findings.iter().map(|f| f.parameter.as_str()).collect();
        names.dedup();
        names
    }
}

#[derive(Serialize, Deserialize)]
struct CachedRules {
    updated: DateTime<Utc>,
    rules: Vec<IdsRule>,
}

pub struct IntrusionDetection {
    rules: Vec<IdsRule>,
    set: RegexSet,
    threshold: u32,
    scan_cookies: bool,
    exclude: Vec<String>,
}

impl IntrusionDetection {
    /// Compiles `rules`. Fails on the first invalid pattern.
    pub fn new(rules: Vec<IdsRule>) -> Result<Self> {
        let set = RegexSet::new(rules.iter().map(|r| r.pattern.as_str()))
            .map_err(|e| Error::Config(format!("ids rules: {e}")))?;
        Ok(Self { rules, set, threshold: 5, scan_cookies: false, exclude: Vec::new() })
    }

    pub fn builtin() -> Result<Self> {
        Self::new(builtin_rules())
    }

    /// Builds the detector from configuration, reading the rule file through
    /// `cache` when one is configured.
    pub fn load(config: &IdsConfig, cache: &dyn Cache) -> Result<Self> {
        let rules = match &config.rules_path {
            Some(path) => load_rules(path, cache)?,
            None => builtin_rules(),
        };
        Ok(Self::new(rules)?
            .threshold(config.threshold)
            .scan_cookies(config.scan_cookies)
            .exclude(config.exclude.iter().cloned()))
    }

    pub fn threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn scan_cookies(mut self, enabled: bool) -> Self {
        self.scan_cookies = enabled;
        self
    }

    /// Input names never screened, e.g. password fields.
    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn rules(&self) -> &[IdsRule] {
        &self.rules
    }

    /// Matches every screened input against every rule.
    ///
    /// Inputs are the request parameters, the string leaves nested inside a
    /// JSON body (named by path, e.g. `user.name` or `q[0]`) and, when
    /// enabled, the cookies.
    pub fn scan(&self, req: &Request) -> IdsReport {
        let mut inputs: Vec<(String, &str)> = req.params().map(|(n, v)| (n.to_owned(), v)).collect();
        if let Some(body) = req.json() {
            nested_json_strings(body, &mut inputs);
        }
        if self.scan_cookies {
            inputs.extend(req.cookies().map(|(n, v)| (n.to_owned(), v)));
        }

        let mut report = IdsReport::default();
        for (name, value) in inputs {
            if self.is_excluded(&name) {
                continue;
            }
            for index in self.set.matches(value).iter() {
                let rule = &self.rules[index];
                report.impact = report.impact.saturating_add(rule.impact);
                report.findings.push(Finding {
                    parameter: name.clone(),
                    rule: rule.id,
                    description: rule.description.clone(),
                    impact: rule.impact,
                });
            }
        }
        report
    }

    /// An excluded name also covers everything nested below it.
    fn is_excluded(&self, name: &str) -> bool {
        self.exclude.iter().any(|e| {
            name.strip_prefix(e.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('.') || rest.starts_with('['))
        })
    }

    /// Rejects the request when its total impact is above the threshold.
    pub fn run(&self, req: &Request) -> Result<()> {
        let report = self.scan(req);
        if report.impact > self.threshold {
            return Err(Error::IntrusionDetection(report));
        }
        if !report.is_empty() {
            debug!(impact = report.impact, parameters = ?report.parameters(), "ids findings below threshold");
        }
        Ok(())
    }
}

impl Middleware for IntrusionDetection {
    fn before(&self, req: &mut Request) -> Result<()> {
        self.run(req)
    }
}

/// String leaves of a JSON body that are not already request parameters.
/// Top-level scalars of an object body are parameters; everything below
/// them is collected here.
fn nested_json_strings<'a>(body: &'a Value, out: &mut Vec<(String, &'a str)>) {
    match body {
        Value::Object(members) => {
            for (key, value) in members {
                if value.is_object() || value.is_array() {
                    json_strings(value, key.clone(), out);
                }
            }
        }
        other => json_strings(other, "json".to_owned(), out),
    }
}

fn json_strings<'a>(value: &'a Value, path: String, out: &mut Vec<(String, &'a str)>) {
    match value {
        Value::String(s) => out.push((path, s)),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                json_strings(item, format!("{path}[{i}]"), out);
            }
        }
        Value::Object(members) => {
            for (key, item) in members {
                json_strings(item, format!("{path}.{key}"), out);
            }
        }
        _ => {}
    }
}

fn load_rules(path: &Path, cache: &dyn Cache) -> Result<Vec<IdsRule>> {
    let key = format!("{CACHE_PREFIX}{}", path.display());
    let modified: DateTime<Utc> = fs::metadata(path)?.modified()?.into();

    let cached = cache
        .read(&key)
        .and_then(|raw| serde_json::from_str::<CachedRules>(&raw).ok());
    if let Some(entry) = cached {
        if entry.updated >= modified {
            debug!(path = %path.display(), "ids rules served from cache");
            return Ok(entry.rules);
        }
    }

    let text = fs::read_to_string(path)?;
    let rules: Vec<IdsRule> = serde_json::from_str(&text)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    info!(path = %path.display(), count = rules.len(), "ids rules loaded");

    let entry = CachedRules { updated: Utc::now(), rules };
    match serde_json::to_string(&entry) {
        Ok(raw) => cache.store(&key, raw),
        Err(e) => warn!("ids rules not cached: {e}"),
    }
    Ok(entry.rules)
}

const BUILTIN: &[(u32, &str, &str, u32, &str)] = &[
    (1, r"(?i)<\s*script[^>]*>", "script tag", 6, "xss"),
    (2, r"(?i)\bon(?:error|load|click|mouse\w+|focus|blur|submit|change|input|key\w+)\s*=", "event handler attribute", 4, "xss"),
    (3, r"(?i)javascript\s*:", "javascript: URI", 5, "xss"),
    (4, r"(?i)document\s*\.\s*(?:cookie|domain|write|location)", "DOM access", 5, "xss"),
    (10, r"(?i)union\s+(?:all\s+)?select", "UNION SELECT", 6, "sqli"),
    (11, r"(?i)(?:'|\d)\s*or\s+['\d]+\s*=\s*['\d]+", "OR tautology", 5, "sqli"),
    (12, r"(?:--\s*$|/\*.*?\*/)", "SQL comment", 3, "sqli"),
    (13, r"(?i);\s*(?:drop|delete|insert|update|alter)\s+", "stacked query", 6, "sqli"),
    (14, r"(?i)\b(?:sleep|benchmark|pg_sleep)\s*\(\s*\d+", "time-based probe", 5, "sqli"),
    (20, r"(?i)(?:\.\./|\.\.\\|%2e%2e%2f){2,}", "multi-level path traversal", 5, "lfi"),
    (21, r"(?i)/(?:etc/(?:passwd|shadow|hosts)|proc/self)", "sensitive file access", 5, "lfi"),
    (30, r"(?:;|\||&&|\$\(|`)\s*(?:cat|ls|id|whoami|uname|wget|curl|nc|bash|sh)\b", "shell command chaining", 6, "rce"),
    (31, r"(?i)\b(?:system|exec|passthru|shell_exec|popen|proc_open)\s*\(", "process execution call", 5, "rce"),
    (40, r"\{\{.*?(?:__class__|__mro__|__subclasses__|__import__|config|self).*?\}\}", "template expression", 5, "ssti"),
    (41, r"\$\{.*?(?:Runtime|ProcessBuilder|getClass|forName).*?\}", "expression language", 6, "ssti"),
];

pub fn builtin_rules() -> Vec<IdsRule> {
    BUILTIN
        .iter()
        .map(|&(id, pattern, description, impact, tag)| IdsRule {
            id,
            pattern: pattern.to_owned(),
            description: description.to_owned(),
            impact,
            tags: vec![tag.to_owned()],
        })
        .collect()
}
