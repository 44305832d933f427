use thiserror::Error;

/// A full scan of the event or user store failed. Aborts the dispatch run.
#[derive(Debug, Error)]
#[error("failed to scan {store} store: {source}")]
pub struct StoreFetchError {
    pub store: &'static str,
    #[source]
    pub source: sqlx::Error,
}

#[derive(Debug, Error)]
pub enum PushSendError {
    #[error("push token rejected as invalid: {0}")]
    InvalidToken(String),

    #[error("push gateway rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("push transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("push gateway access token unavailable: {0}")]
    Auth(#[from] AuthError),
}

/// Obtaining an OAuth access token for the push gateway failed.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("service account credentials unusable: {0}")]
    Credentials(String),

    #[error("failed to sign token request: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),

    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint answered {status}: {message}")]
    Exchange { status: u16, message: String },
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned status {0}")]
    Status(u16),

    #[error("feed payload could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("failed to insert fresh events: {0}")]
    Insert(#[source] sqlx::Error),
}
