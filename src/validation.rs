//! Form validation helpers.
//!
//! A [`Validator`] lists fields with their rules and checks them against the
//! request parameters. Every failing rule adds a message under its field;
//! any failure turns into [`Error::Validation`], answered with 422.
//!
//! ```
//! # use bulwark::validation::{Rule, Validator};
//! # fn main() -> bulwark::Result<()> {
//! let signup = Validator::new()
//!     .field("email", [Rule::Required, Rule::Email])
//!     .field("password", [Rule::Required, Rule::MinLength(12)])
//!     .field("confirm", [Rule::SameAs("password".into())])
//!     .field("zip", [Rule::pattern(r"^\d{5}$")?]);
//! # Ok(()) }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::request::Request;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").expect("email pattern is valid")
});
static NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+(?:\.\d+)?$").expect("numeric pattern is valid"));

#[derive(Debug, Clone)]
pub enum Rule {
    Required,
    MinLength(usize),
    MaxLength(usize),
    Email,
    Numeric,
    Pattern(Regex),
    /// Equal to the value of another field.
    SameAs(String),
}

impl Rule {
    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|e| Error::Config(format!("validation pattern `{pattern}`: {e}")))
    }

    /// `None` when `value` satisfies the rule, otherwise the message.
    fn check<'a>(&self, value: &str, lookup: &impl Fn(&str) -> Option<&'a str>) -> Option<String> {
        let ok = match self {
            Self::Required => !value.trim().is_empty(),
            Self::MinLength(min) => value.chars().count() >= *min,
            Self::MaxLength(max) => value.chars().count() <= *max,
            Self::Email => EMAIL.is_match(value),
            Self::Numeric => NUMERIC.is_match(value),
            Self::Pattern(re) => re.is_match(value),
            Self::SameAs(other) => lookup(other.as_str()) == Some(value),
        };
        if ok {
            return None;
        }
        Some(match self {
            Self::Required => "is required".to_owned(),
            Self::MinLength(min) => format!("must be at least {min} characters"),
            Self::MaxLength(max) => format!("must be at most {max} characters"),
            Self::Email => "must be an email address".to_owned(),
            Self::Numeric => "must be a number".to_owned(),
            Self::Pattern(_) => "has an invalid format".to_owned(),
            Self::SameAs(other) => format!("must match {other}"),
        })
    }
}

/// Failed rules, field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field} {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    fields: Vec<(String, Vec<Rule>)>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.fields.push((name.into(), rules.into_iter().collect()));
        self
    }

    /// Checks every field against `lookup`. A missing or empty value only
    /// fails `Required`; the other rules apply to present values.
    pub fn check<'a>(&self, lookup: impl Fn(&str) -> Option<&'a str>) -> ValidationErrors {
        let mut errors = ValidationErrors::default();
        for (name, rules) in &self.fields {
            let value = lookup(name.as_str()).unwrap_or_default();
            for rule in rules {
                if value.is_empty() && !matches!(rule, Rule::Required) {
                    continue;
                }
                if let Some(message) = rule.check(value, &lookup) {
                    errors.add(name.as_str(), message);
                }
            }
        }
        errors
    }

    pub fn validate(&self, req: &Request) -> Result<()> {
        let errors = self.check(|name| req.param(name));
        if errors.is_empty() { Ok(()) } else { Err(Error::Validation(errors)) }
    }
}
