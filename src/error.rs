//! Error types for the schema synchronization toolkit.
//!
//! This module provides the error hierarchy for every stage of a deployment:
//! configuration and schema validation, remote API transport, planning,
//! and execution.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the synchronization toolkit.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Data modeling API errors.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Deployment execution errors.
    #[error("Deployment error: {0}")]
    Deploy(#[from] DeployError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and local schema errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// A file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// The same resource is defined twice in the local schema.
    #[error("Duplicate {kind} identifier: {id}")]
    DuplicateIdentifier {
        /// Resource kind (space, container, ...).
        kind: String,
        /// The duplicated identifier.
        id: String,
    },

    /// An unknown value was given for an enumerated option.
    #[error("Invalid value '{value}' for {option}")]
    InvalidOption {
        /// Name of the option.
        option: String,
        /// The rejected value.
        value: String,
    },
}

/// Errors reported by the data modeling API transport.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authentication failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed.
    #[error("API request failed: {status} - {message}")]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from API.
        message: String,
    },

    /// Network error.
    #[error("Network error communicating with the API: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from the API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Planning errors. All of these are raised before any mutating call.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The `fail` policy found resources that already exist remotely.
    #[error("{count} {kind} resource(s) already exist: {ids}")]
    ExistingResources {
        /// Resource kind.
        kind: String,
        /// Number of existing resources.
        count: usize,
        /// Comma separated identifiers.
        ids: String,
    },

    /// A local resource references something that exists neither locally nor remotely.
    #[error("{kind} {id} references missing {target}")]
    MissingReference {
        /// Kind of the referencing resource.
        kind: String,
        /// Identifier of the referencing resource.
        id: String,
        /// The unresolved reference.
        target: String,
    },

    /// A dependency cycle among resources in the same batch.
    #[error("Dependency cycle among {kind} resources: {cycle}")]
    DependencyCycle {
        /// Resource kind.
        kind: String,
        /// Identifiers involved in the cycle.
        cycle: String,
    },

    /// A raw resource payload could not be interpreted as an identifier.
    #[error("Cannot extract {kind} identifier: {message}")]
    InvalidIdentifier {
        /// Resource kind.
        kind: String,
        /// Description of the problem.
        message: String,
    },
}

/// Deployment execution errors.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Restoring failed updates is not supported.
    #[error("Cannot restore {count} failed {kind} update(s): restoring updates is not supported")]
    UpdateRestoreUnsupported {
        /// Resource kind.
        kind: String,
        /// Number of failed updates.
        count: usize,
    },
}

/// Result type alias for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Api(api) => api.is_retryable(),
            _ => false,
        }
    }
}

impl ApiError {
    /// Creates an API request error.
    #[must_use]
    pub fn request_failed(status: u16, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Returns the HTTP-like status code for this error.
    ///
    /// Transport errors without a response report `0`.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::AuthenticationFailed { .. } => 401,
            Self::RequestFailed { status, .. } => *status,
            Self::NetworkError { .. } | Self::InvalidResponse { .. } => 0,
        }
    }

    /// Returns true for rate limiting, server-side and network failures.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed { status, .. } => *status == 429 || *status >= 500,
            Self::NetworkError { .. } => true,
            _ => false,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}
