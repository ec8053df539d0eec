//! Error types for the Orchestrator Dashboard
//!
//! Provides structured error types for the REST layer, the orchestrator
//! backends, the OSD ownership mapper and the task tracker.

use axum::http::StatusCode;
use thiserror::Error;

/// Component tag used when an error does not belong to a specific area
pub const DEFAULT_COMPONENT: &str = "orchestrator";

/// Unified error type for the dashboard gateway
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Orchestrator Errors
    // =========================================================================
    #[error("Orchestrator is not available")]
    OrchestratorUnavailable,

    #[error("Orchestrator call failed [{component}]: {reason}")]
    OrchestratorRemote { component: String, reason: String },

    #[error("Validation failed [{component}]: {reason}")]
    Validation { component: String, reason: String },

    // =========================================================================
    // OSD Metadata Errors
    // =========================================================================
    #[error("Invalid OSD identifier: {osd_id:?}")]
    OsdIdParse { osd_id: String },

    // =========================================================================
    // Access Control Errors
    // =========================================================================
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Permission denied: {permission} on scope {scope}")]
    PermissionDenied { scope: String, permission: String },

    // =========================================================================
    // Task Errors
    // =========================================================================
    #[error("Task {name} was cancelled")]
    TaskCancelled { name: String },

    // =========================================================================
    // Transport / Parse Errors
    // =========================================================================
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a remote orchestrator failure tagged with the default component
    pub fn remote(reason: impl Into<String>) -> Self {
        Error::OrchestratorRemote {
            component: DEFAULT_COMPONENT.to_string(),
            reason: reason.into(),
        }
    }

    /// Build a validation failure for the given component
    pub fn validation(component: &str, reason: impl Into<String>) -> Self {
        Error::Validation {
            component: component.to_string(),
            reason: reason.into(),
        }
    }

    /// Re-tag orchestrator and validation failures with a component.
    ///
    /// Other variants pass through untouched.
    pub fn in_component(self, component: &str) -> Self {
        match self {
            Error::OrchestratorRemote { reason, .. } => Error::OrchestratorRemote {
                component: component.to_string(),
                reason,
            },
            Error::Validation { reason, .. } => Error::Validation {
                component: component.to_string(),
                reason,
            },
            other => other,
        }
    }

    /// Component tag carried by the error, if any
    pub fn component(&self) -> Option<&str> {
        match self {
            Error::OrchestratorRemote { component, .. } | Error::Validation { component, .. } => {
                Some(component)
            }
            _ => None,
        }
    }

    /// HTTP status the error is surfaced as
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::OrchestratorUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Error::OrchestratorRemote { .. } | Error::Validation { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::Internal(_)
            | Error::Configuration(_)
            | Error::OsdIdParse { .. }
            | Error::TaskCancelled { .. }
            | Error::JsonParse(_)
            | Error::YamlParse(_)
            | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Error::Internal(_) => "internal_error",
            Error::Configuration(_) => "configuration_error",
            Error::OrchestratorUnavailable => "orchestrator_unavailable",
            Error::OrchestratorRemote { .. } => "orchestrator_error",
            Error::Validation { .. } => "validation_error",
            Error::OsdIdParse { .. } => "invalid_osd_id",
            Error::Unauthenticated => "unauthenticated",
            Error::PermissionDenied { .. } => "permission_denied",
            Error::TaskCancelled { .. } => "task_cancelled",
            Error::Http(_) => "upstream_error",
            Error::JsonParse(_) => "json_parse_error",
            Error::YamlParse(_) => "yaml_parse_error",
            Error::Io(_) => "io_error",
        }
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::OrchestratorUnavailable | Error::OrchestratorRemote { .. } | Error::Http(_)
        )
    }
}

/// Result type alias for the dashboard gateway
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            Error::OrchestratorUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(Error::remote("boom").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::validation("osd", "bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::Unauthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::PermissionDenied {
                scope: "osd".into(),
                permission: "create".into()
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::OsdIdParse { osd_id: "x".into() }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_in_component_retags_remote_errors() {
        let err = Error::remote("device not found").in_component("osd");
        assert_eq!(err.component(), Some("osd"));
        assert!(err.to_string().contains("[osd]"));

        let err = Error::OrchestratorUnavailable.in_component("osd");
        assert_eq!(err.component(), None);
    }

    #[test]
    fn test_transient() {
        assert!(Error::OrchestratorUnavailable.is_transient());
        assert!(Error::remote("timeout").is_transient());
        assert!(!Error::validation("osd", "bad").is_transient());
        assert!(!Error::Configuration("invalid".into()).is_transient());
    }
}
