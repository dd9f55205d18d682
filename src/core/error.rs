// Centralized error handling for swarm-guard

use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while talking to a remote HTTP API
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{endpoint} returned error status: {status}")]
    Status { endpoint: String, status: StatusCode },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, ClientError::Authentication(_))
    }
}

/// Errors that abort a whole pass before any action is taken
#[derive(Error, Debug)]
pub enum PassError {
    #[error("Failed to fetch transfer snapshot: {0}")]
    Snapshot(#[source] ClientError),
}

/// Errors raised by the best-effort re-search trigger
#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("No job-queue service handles category '{0}'")]
    UnknownCategory(String),

    #[error("No queued job matches the transfer name")]
    NoMatch,

    #[error("Queued job '{0}' has no job id")]
    MissingJobId(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Errors raised while validating a raw snapshot record
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid info hash: {0}")]
    InvalidHash(String),

    #[error("Invalid length: expected 40 or 64 hex characters, got {actual}")]
    InvalidLength { actual: usize },

    #[error("Parameter out of range: {0}")]
    OutOfRange(String),
}
