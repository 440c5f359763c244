//! The reply-stream abstraction: every outbound chat concern
//! — publish, edit, react, upload, download, fail — goes through this one
//! trait so the engine stays free of workspace-specific transport types.

use async_trait::async_trait;

use crate::error::EngineError;
use crate::model::{Message, Status};

/// Capability set a chat workspace transport must implement. The engine
/// depends only on this trait (DESIGN NOTES "workspace polymorphism");
/// concrete webhook- or socket-style transports live outside this crate.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// First send. Sets `message.message_id` on success; the message type
    /// (default/thread/ephemeral) selects the underlying API call.
    async fn publish(&self, message: &mut Message) -> Result<(), EngineError>;

    /// Edits the already-published message with its current accumulated
    /// text. Errors if `message` was never published.
    async fn update_text(&self, message: &Message) -> Result<(), EngineError>;

    /// Translates `status` to a reaction (running -> hourglass, ok ->
    /// checkmark, error -> X), adding the new reaction before removing
    /// the previous one to avoid a flicker where neither is present.
    /// No-ops if `message` is already in the requested status.
    async fn update_status(&self, message: &mut Message, status: Status) -> Result<(), EngineError>;

    /// Uploads `content` as a text file attached to the message's thread,
    /// returning a permalink the handler embeds in the reply text.
    async fn add_artifact(
        &self,
        title: &str,
        content: &str,
        channel: &str,
        thread: Option<&str>,
    ) -> Result<String, EngineError>;

    /// Downloads a user-attached snippet using workspace credentials.
    /// Rejects non-text content types and non-200 statuses.
    async fn download_artifact(&self, url: &str) -> Result<Vec<u8>, EngineError>;

    /// Appends `"ERROR: {text}"`, ensures the message is published (or
    /// edited if already published), flips status to error, and — if a
    /// long-running notification was scheduled and has elapsed — posts an
    /// `@user` mention in the thread.
    async fn fail(&self, message: &mut Message, text: &str) -> Result<(), EngineError> {
        message.append(&format!("ERROR: {text}"));
        ensure_published(self, message).await?;
        self.update_status(message, Status::Error).await?;
        self.maybe_notify_late(message).await
    }

    /// Flips status to ok with the same late-mention behavior as `fail`.
    async fn ok(&self, message: &mut Message) -> Result<(), EngineError> {
        ensure_published(self, message).await?;
        self.update_status(message, Status::Ok).await?;
        self.maybe_notify_late(message).await
    }

    /// Posts an `@user` mention in the thread if `notify_at` was set and
    /// has already elapsed by the time the command finishes. Default
    /// no-op; concrete messengers that support mentions override it.
    async fn maybe_notify_late(&self, _message: &Message) -> Result<(), EngineError> {
        Ok(())
    }
}

async fn ensure_published(
    messenger: &(impl Messenger + ?Sized),
    message: &mut Message,
) -> Result<(), EngineError> {
    if message.is_published() {
        messenger.update_text(message).await
    } else {
        messenger.publish(message).await
    }
}

/// Translates a [`Status`] to its reaction symbol name.
pub fn reaction_for(status: Status) -> Option<&'static str> {
    match status {
        Status::None => None,
        Status::Running => Some("hourglass_flowing_sand"),
        Status::Ok => Some("white_check_mark"),
        Status::Error => Some("x"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_mapping_matches_spec() {
        assert_eq!(reaction_for(Status::Running), Some("hourglass_flowing_sand"));
        assert_eq!(reaction_for(Status::Ok), Some("white_check_mark"));
        assert_eq!(reaction_for(Status::Error), Some("x"));
        assert_eq!(reaction_for(Status::None), None);
    }
}
