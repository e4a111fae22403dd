//! The reasoner contract

use async_trait::async_trait;
use std::time::Duration;

use super::types::{PlanRequest, PlanResponse};

/// Decides the next actions of a run. Each call is independent; the whole
/// context travels in the request.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn plan(&self, request: PlanRequest) -> Result<PlanResponse, ReasonerError>;
}

/// Errors that can occur during a reasoner call
#[derive(Debug, thiserror::Error)]
pub enum ReasonerError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },

    #[error("{0}")]
    Failed(String),
}

impl ReasonerError {
    /// Whether a caller outside the run loop could reasonably retry
    pub fn is_retryable(&self) -> bool {
        match self {
            ReasonerError::RateLimited { .. } | ReasonerError::Network(_) => true,
            ReasonerError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
