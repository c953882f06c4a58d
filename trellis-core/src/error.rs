// Error types for the Trellis framework

use crate::HttpStatus;
use thiserror::Error;

/// Wiring defects detected while a module is being assembled.
///
/// These never surface at request time: assembly fails fast and the
/// application is not created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Invalid provider for {token}: {reason}")]
    InvalidProvider { token: String, reason: String },

    #[error("Duplicate module name: {0}")]
    DuplicateModule(String),

    #[error("Duplicate controller name `{controller}` in module {module}")]
    DuplicateController { module: String, controller: String },

    #[error("Duplicate {kind} binding on {class}: {detail}")]
    DuplicateBinding {
        kind: String,
        class: String,
        detail: String,
    },

    #[error("Invalid parameter binding on {class}::{method}: {reason}")]
    InvalidParamBinding {
        class: String,
        method: String,
        reason: String,
    },

    #[error("Invalid route pattern `{pattern}`: {reason}")]
    InvalidRoutePattern { pattern: String, reason: String },

    #[error("Invalid field injection on {class}: {reason}")]
    InvalidField { class: String, reason: String },

    #[error("Module {module} exports {token}, which it does not provide")]
    UnknownExport { module: String, token: String },

    #[error("Route `{route}` does not name a registered controller: {reason}")]
    UnknownRoute { route: String, reason: String },
}

/// Framework error.
///
/// [`Error::Configuration`] is the fail-fast assembly category; every other
/// variant is raised while resolving or serving a request.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("No provider for {token} in injector #{injector}{}", requested_by_suffix(.requested_by))]
    NoProvider {
        token: String,
        injector: u64,
        requested_by: Option<String>,
    },

    #[error("Token {token} is already defined in injector #{injector}")]
    TokenAlreadyDefined { token: String, injector: u64 },

    #[error("Value registered for {token} is not a {expected}")]
    Downcast { token: String, expected: &'static str },

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Route not found: {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("Action `{action}` is not defined on controller {controller}")]
    ActionNotFound { action: String, controller: String },

    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn requested_by_suffix(requested_by: &Option<String>) -> String {
    match requested_by {
        Some(provider) => format!(" (requested by {})", provider),
        None => String::new(),
    }
}

impl Error {
    /// Application error with an arbitrary status code.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Error::Http {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::http(HttpStatus::BadRequest.code(), message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::http(HttpStatus::Forbidden.code(), message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::http(HttpStatus::NotFound.code(), message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::http(HttpStatus::InternalServerError.code(), message)
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RouteNotFound { .. } => HttpStatus::NotFound.code(),
            Error::ActionNotFound { .. } => HttpStatus::BadRequest.code(),
            Error::InvalidMethod(_) => HttpStatus::BadRequest.code(),
            Error::Http { status, .. } => *status,
            _ => HttpStatus::InternalServerError.code(),
        }
    }

    /// Check if this error is a wiring defect rather than a request failure
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status_code())
    }
}
