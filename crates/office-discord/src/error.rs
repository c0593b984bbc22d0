//! Error types for the Discord boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("discord http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("discord returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The channel or message no longer exists (deleted externally).
    #[error("discord resource not found: {0}")]
    NotFound(String),

    #[error("discord payload error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("gateway protocol error: {0}")]
    Gateway(String),

    #[error("gateway websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl DiscordError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
