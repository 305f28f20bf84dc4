//! Route pattern compilation.
//!
//! A pattern such as `/books/{id}/pages/{page}` compiles to an anchored regex
//! with one capture group per `{name}` placeholder. Placeholders match one or
//! more non-slash characters and cannot nest, so each parameter owns exactly
//! one capture group and arguments can be zipped by position.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^/]+?)\}").expect("placeholder pattern is valid"));

/// A compiled URL pattern with optional named parameters.
#[derive(Clone, Debug)]
pub struct Route {
    pattern: String,
    regex: Regex,
    params: Vec<String>,
}

impl Route {
    /// Compiles `pattern`.
    ///
    /// One trailing slash is stripped, except on the root pattern `/`.
    /// Fails with [`Error::RouteDefinition`] when a parameter name repeats.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = normalize(pattern).to_owned();

        let mut params: Vec<String> = Vec::new();
        let mut source = String::with_capacity(pattern.len() + 16);
        source.push('^');

        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(&pattern) {
            let (whole, name) = match (caps.get(0), caps.get(1)) {
                (Some(w), Some(n)) => (w, n.as_str()),
                _ => continue,
            };
            if params.iter().any(|p| p == name) {
                return Err(Error::route_definition(
                    &pattern,
                    format!("parameter `{name}` is declared more than once"),
                ));
            }
            source.push_str(&regex::escape(&pattern[last..whole.start()]));
            source.push_str("([^/]+)");
            params.push(name.to_owned());
            last = whole.end();
        }
        source.push_str(&regex::escape(&pattern[last..]));
        source.push('$');

        let regex = Regex::new(&source)
            .map_err(|e| Error::route_definition(&pattern, e.to_string()))?;

        Ok(Self { pattern, regex, params })
    }

    /// The normalized pattern string this route was compiled from.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Parameter names in declaration order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn matches(&self, uri: &str) -> bool {
        uri == self.pattern || self.regex.is_match(uri)
    }

    /// Extracts the path arguments of `uri`, in parameter declaration order.
    ///
    /// Returns empty arguments when `uri` does not match.
    pub fn arguments(&self, uri: &str) -> Arguments {
        let Some(caps) = self.regex.captures(uri) else {
            return Arguments::default();
        };
        let values = caps.iter().skip(1).map(|m| m.map_or("", |m| m.as_str()));
        Arguments(
            self.params
                .iter()
                .zip(values)
                .map(|(name, value)| (name.clone(), value.to_owned()))
                .collect(),
        )
    }
}

/// Strips one trailing slash, leaving the root path untouched.
pub(crate) fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// Ordered `name → value` pairs extracted from a request path.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Arguments(Vec<(String, String)>);

impl Arguments {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Positional access, in route declaration order.
    pub fn get_index(&self, index: usize) -> Option<(&str, &str)> {
        self.0.get(index).map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<(String, String)>> for Arguments {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_parameter() {
        let route = Route::new("/books/{id}").unwrap();
        assert!(route.matches("/books/42"));
        let args = route.arguments("/books/42");
        assert_eq!(args.get("id"), Some("42"));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn parameters_keep_declaration_order() {
        let route = Route::new("/users/{user}/posts/{post}").unwrap();
        let args = route.arguments("/users/ada/posts/7");
        assert_eq!(args.get_index(0), Some(("user", "ada")));
        assert_eq!(args.get_index(1), Some(("post", "7")));
        assert_eq!(route.params(), ["user".to_owned(), "post".to_owned()]);
    }

    #[test]
    fn duplicate_parameter_is_rejected() {
        let err = Route::new("/{a}/{b}/{a}").unwrap_err();
        assert!(matches!(err, Error::RouteDefinition { ref pattern, .. } if pattern == "/{a}/{b}/{a}"));
    }

    #[test]
    fn root_is_literal() {
        let root = Route::new("/").unwrap();
        assert_eq!(root.pattern(), "/");
        assert!(root.matches("/"));
        assert!(!root.matches(""));
        assert!(!root.matches("/a"));
    }

    #[test]
    fn trailing_slash_is_stripped_from_pattern() {
        let route = Route::new("/books/").unwrap();
        assert_eq!(route.pattern(), "/books");
        assert!(route.matches("/books"));
    }

    #[test]
    fn placeholders_do_not_cross_segments() {
        let route = Route::new("/files/{name}").unwrap();
        assert!(!route.matches("/files/a/b"));
        assert!(!route.matches("/files/"));
        assert!(route.arguments("/files/a/b").is_empty());
    }

    #[test]
    fn literal_segments_are_escaped() {
        let route = Route::new("/v1.0/{id}").unwrap();
        assert!(route.matches("/v1.0/3"));
        assert!(!route.matches("/v1x0/3"));
    }

    #[test]
    fn placeholders_inside_a_segment() {
        let route = Route::new("/archive/{year}-{month}").unwrap();
        let args = route.arguments("/archive/2024-05");
        assert_eq!(args.get("month"), Some("05"));
        assert!(args.get("year").is_some());
    }
}
