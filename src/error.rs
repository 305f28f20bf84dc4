//! Unified error type.
//!
//! Every failure the dispatch core can produce is a variant here: routing
//! faults, guard rejections, malformed input, and infrastructure errors.
//! Nothing below [`Router::handle`](crate::Router::handle) turns an `Error`
//! into a response; that boundary is the only place status codes are chosen.

use http::StatusCode;

use crate::security::ids::IdsReport;
use crate::validation::ValidationErrors;

/// Result alias used throughout bulwark.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by bulwark's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed route pattern at registration time (e.g. a repeated
    /// parameter name). Fatal to startup.
    #[error("invalid route `{pattern}`: {reason}")]
    RouteDefinition { pattern: String, reason: String },

    /// HTTP verb outside GET, POST, PUT, PATCH, DELETE.
    #[error("method `{0}` is not supported")]
    RouteMethodUnsupported(String),

    /// No route table for the method, or no pattern matched the path.
    #[error("no route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// A route matched but none of its accepted formats is in `Accept`.
    #[error("route `{route}` does not accept `{accept}`")]
    RouteNotAccepted { route: String, accept: String },

    /// A path argument could not be bound to the handler's parameter type.
    #[error("route argument `{name}`: {reason}")]
    RouteArgument { name: String, reason: String },

    #[error("csrf form name or token missing")]
    MissingCsrf,

    #[error("csrf token invalid")]
    InvalidCsrf,

    /// Input screening exceeded the configured impact threshold.
    #[error("intrusion detected (impact {})", .0.impact)]
    IntrusionDetection(IdsReport),

    /// Authorization failed; carries the names of the rules that failed.
    #[error("unauthorized access, failed rules: {}", .0.join(", "))]
    UnauthorizedAccess(Vec<String>),

    #[error("session fingerprint mismatch")]
    SessionFingerprint,

    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("malformed request body: {0}")]
    Body(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn route_definition(pattern: &str, reason: impl Into<String>) -> Self {
        Self::RouteDefinition { pattern: pattern.to_owned(), reason: reason.into() }
    }

    /// The HTTP status the outer boundary answers with for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RouteMethodUnsupported(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::RouteNotAccepted { .. } => StatusCode::NOT_ACCEPTABLE,
            Self::RouteArgument { .. } | Self::Body(_) => StatusCode::BAD_REQUEST,
            Self::MissingCsrf
            | Self::InvalidCsrf
            | Self::IntrusionDetection(_)
            | Self::UnauthorizedAccess(_)
            | Self::SessionFingerprint => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RouteDefinition { .. } | Self::Config(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// True for rejections raised by a security guard.
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            Self::MissingCsrf
                | Self::InvalidCsrf
                | Self::IntrusionDetection(_)
                | Self::UnauthorizedAccess(_)
                | Self::SessionFingerprint
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Body(e.to_string())
    }
}
