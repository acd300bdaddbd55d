//! DRN-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DrnError>;

/// Top-level error type for the deployment-risk negotiation engine.
#[derive(Debug, Error)]
pub enum DrnError {
    #[error("[DRN-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DRN-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DRN-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DRN-2001] validation failure: {details}")]
    Validation { details: String },

    #[error("[DRN-2002] engine not ready: {what}")]
    NotReady { what: &'static str },

    #[error("[DRN-2003] deadline exceeded after {elapsed_ms}ms (budget {budget_ms}ms)")]
    Timeout { elapsed_ms: u64, budget_ms: u64 },

    #[error("[DRN-3001] storage failure in {context}: {details}")]
    Storage {
        context: &'static str,
        details: String,
    },

    #[error("[DRN-3002] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[DRN-3003] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DRN-3004] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DRN-3005] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[DRN-9001] internal error: {details}")]
    Internal { details: String },
}

impl DrnError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DRN-1001",
            Self::MissingConfig { .. } => "DRN-1002",
            Self::ConfigParse { .. } => "DRN-1003",
            Self::Validation { .. } => "DRN-2001",
            Self::NotReady { .. } => "DRN-2002",
            Self::Timeout { .. } => "DRN-2003",
            Self::Storage { .. } => "DRN-3001",
            Self::Sql { .. } => "DRN-3002",
            Self::Io { .. } => "DRN-3003",
            Self::Serialization { .. } => "DRN-3004",
            Self::ChannelClosed { .. } => "DRN-3005",
            Self::Internal { .. } => "DRN-9001",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::ChannelClosed { .. } | Self::Sql { .. } | Self::Storage { .. }
        )
    }

    /// Coarse status class a transport adapter maps onto its own status codes.
    ///
    /// The engine itself does not speak HTTP; this lets a transport
    /// adapter, or the CLI's own exit-code mapping, apply a consistent
    /// error-propagation policy without re-deriving it.
    #[must_use]
    pub const fn status_class(&self) -> StatusClass {
        match self {
            Self::InvalidConfig { .. }
            | Self::ConfigParse { .. }
            | Self::Validation { .. }
            | Self::Serialization { .. } => StatusClass::BadRequest,
            Self::MissingConfig { .. } | Self::NotReady { .. } | Self::Storage { .. } => {
                StatusClass::NotReady
            }
            Self::Timeout { .. } => StatusClass::Timeout,
            Self::Sql { .. }
            | Self::Io { .. }
            | Self::ChannelClosed { .. }
            | Self::Internal { .. } => StatusClass::Internal,
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Coarse status class a transport adapter maps onto its own status codes.
///
/// `BadRequest` -> 400, `NotReady` -> 503, `Timeout` -> 504, `Internal` -> an
/// opaque failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    BadRequest,
    NotReady,
    Timeout,
    Internal,
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DrnError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for DrnError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DrnError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
