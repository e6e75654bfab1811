use thiserror::Error;

use crate::flow::FlowState;

/// Failures reported by external collaborators. Every variant is recoverable:
/// the assessment flow logs it and substitutes a local fallback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{service} is not configured: {detail}")]
    ConfigurationMissing { service: &'static str, detail: String },
    #[error("{service} request failed: {detail}")]
    TransientNetworkFailure { service: &'static str, detail: String },
    #[error("{service} rejected credentials (status {status})")]
    AuthFailure { service: &'static str, status: u16 },
    #[error("{service} returned an unexpected response: {detail}")]
    MalformedResponse { service: &'static str, detail: String },
}

impl CollaboratorError {
    pub fn missing(service: &'static str, detail: impl Into<String>) -> Self {
        Self::ConfigurationMissing {
            service,
            detail: detail.into(),
        }
    }

    pub fn transient(service: &'static str, detail: impl ToString) -> Self {
        Self::TransientNetworkFailure {
            service,
            detail: detail.to_string(),
        }
    }

    pub fn malformed(service: &'static str, detail: impl ToString) -> Self {
        Self::MalformedResponse {
            service,
            detail: detail.to_string(),
        }
    }

    /// Maps a non-2xx HTTP status onto the taxonomy.
    pub fn from_status(service: &'static str, status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::AuthFailure { service, status },
            _ => Self::TransientNetworkFailure {
                service,
                detail: format!("http {status}: {}", truncate(body, 200)),
            },
        }
    }
}

fn truncate(body: &str, limit: usize) -> &str {
    match body.char_indices().nth(limit) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: FlowState,
    },
    #[error("unable to start recording: {0}")]
    RecordingUnavailable(String),
}
