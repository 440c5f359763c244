//! Engine error classification.
//!
//! Command handlers and collaborators return [`EngineError`] rather than
//! `anyhow::Error` so the dispatcher's retry policy can match on kind
//! instead of sniffing error strings. Only the CLI bootstrap converts to
//! `anyhow` at the very top.

use crate::model::DropReason;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("message dropped: {0:?}")]
    Validation(DropReason),

    /// Network/transport failure talking to the clone's Postgres
    /// connection or an external API. Retriable per the dispatcher's
    /// retry policy.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("database lab error: {0}")]
    LabService(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("rate limit: {0}")]
    RateLimit(String),

    #[error("messenger error: {0}")]
    Messenger(String),

    #[error("history error: {0}")]
    History(String),
}

impl EngineError {
    /// Whether the dispatcher's retry loop should treat this as a
    /// transient session failure worth one reboot-and-retry cycle.
    pub fn is_retriable(&self) -> bool {
        matches!(self, EngineError::Transport(_))
    }
}
