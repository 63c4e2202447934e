use thiserror::Error;

/// Errors surfaced by the client, the orchestrator and the import pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("session unavailable: {0}")]
    Session(String),

    /// A local check failed before anything was sent or written.
    #[error("{0}")]
    Precondition(String),

    #[error(transparent)]
    Midi(#[from] notespan::Error),

    #[error("task not found: {0}")]
    TaskNotFound(String),
}

impl Error {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
