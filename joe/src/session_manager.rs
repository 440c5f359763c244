//! Session lifecycle: creates, destroys, and resets the
//! `(clone, connection, platform-session-id)` trio a session owns as one
//! unit (invariant 2). Grounded step-by-step on
//! `original_source/pkg/services/msgproc/dblab.go`'s `runSession`.

use std::sync::Arc;
use std::time::Instant;

use joe_core::Redacted;

use crate::db::DbConnector;
use crate::dblab::{self, CreateCloneDb, CreateCloneRequest, DatabaseLabClient};
use crate::error::EngineError;
use crate::messenger::Messenger;
use crate::model::{CloneHandle, IncomingMessage, Message, Session, Status, User};
use crate::platform::PlatformClient;

#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    pub dblab_project: String,
    pub dbname: String,
    pub sslmode: String,
    pub platform_project: String,
    pub history_enabled: bool,
}

pub struct SessionManager {
    lab: Arc<dyn DatabaseLabClient>,
    platform: Arc<dyn PlatformClient>,
    connector: Arc<dyn DbConnector>,
    config: SessionManagerConfig,
}

impl SessionManager {
    pub fn new(
        lab: Arc<dyn DatabaseLabClient>,
        platform: Arc<dyn PlatformClient>,
        connector: Arc<dyn DbConnector>,
        config: SessionManagerConfig,
    ) -> Self {
        Self { lab, platform, connector, config }
    }

    /// Ensures `user` has a live clone, creating one if necessary. Any
    /// failure after the clone is created destroys it before surfacing
    /// unwinding in reverse order.
    pub async fn ensure(
        &self,
        user: &mut User,
        incoming: &IncomingMessage,
        messenger: &dyn Messenger,
    ) -> Result<(), EngineError> {
        if user.session.is_active() {
            return Ok(());
        }

        self.stop(&mut user.session);

        let mut message = Message::new(incoming);
        message.append("Starting new session...");
        messenger.publish(&mut message).await.map_err(|e| EngineError::Messenger(e.to_string()))?;
        messenger
            .update_status(&mut message, Status::Running)
            .await
            .map_err(|e| EngineError::Messenger(e.to_string()))?;

        let session_id = user
            .session
            .platform_session_id
            .clone()
            .or_else(|| incoming.session_id.clone())
            .unwrap_or_else(|| format!("joe-{}", uuid::Uuid::new_v4()));

        let password = crate::password::generate();
        let username = format!("joe_{}", user.user_info.name);

        let request = CreateCloneRequest {
            id: session_id,
            project: self.config.dblab_project.clone(),
            protected: false,
            db: CreateCloneDb {
                username,
                password: password.clone(),
            },
        };

        let mut clone = self.lab.create_clone(request).await?;
        clone.db.password = Redacted::new(password);
        clone.db.dbname = self.config.dbname.clone();
        clone.db.sslmode = self.config.sslmode.clone();

        let connection = match self.connector.connect(&clone.db).await {
            Ok(conn) => conn,
            Err(e) => {
                let _ = self.lab.destroy_clone(&clone.id).await;
                return Err(e);
            }
        };

        let clone_id = clone.id.clone();
        user.session.clone_handle = Some(CloneHandle {
            clone,
            connection: Box::new(connection),
        });
        user.session.channel_id = Some(message.channel_id.clone());

        if self.config.history_enabled && user.session.platform_session_id.is_none() {
            match self
                .platform
                .create_session(
                    &self.config.platform_project,
                    &user.user_info.id,
                    &user.user_info.name,
                    &message.channel_id,
                )
                .await
            {
                Ok(platform_session_id) => user.session.platform_session_id = Some(platform_session_id),
                Err(e) => {
                    let _ = self.lab.destroy_clone(&clone_id).await;
                    self.stop(&mut user.session);
                    return Err(e);
                }
            }
        }

        let handle = user.session.clone_handle.as_ref().expect("just stored");
        message.append(&foreword(&handle.clone));
        message.append(&format!("Session started: `{}`", handle.clone.id));
        messenger.update_text(&message).await.map_err(|e| EngineError::Messenger(e.to_string()))?;
        messenger
            .update_status(&mut message, Status::Ok)
            .await
            .map_err(|e| EngineError::Messenger(e.to_string()))?;

        user.session.last_action_ts = Instant::now();
        Ok(())
    }

    /// Closes the DB connection (if any) and nulls out clone, connection
    /// params, and platform session id. Never calls Database Lab — used
    /// after the lab-side destroy already happened, or when the lab
    /// reports the clone gone.
    pub fn stop(&self, session: &mut Session) {
        session.clone_handle = None;
        session.platform_session_id = None;
    }

    /// `DestroyClone` then `stop`.
    pub async fn destroy(&self, session: &mut Session) -> Result<(), EngineError> {
        if let Some(handle) = &session.clone_handle {
            self.lab.destroy_clone(&handle.clone.id).await?;
        }
        self.stop(session);
        Ok(())
    }

    /// `ResetClone` on Database Lab. Transport errors bubble up for the
    /// dispatcher's reset-reboot path to handle.
    pub async fn reset(&self, session: &Session) -> Result<(), EngineError> {
        let handle = session
            .clone_handle
            .as_ref()
            .ok_or_else(|| EngineError::LabService("no active session to reset".to_string()))?;
        self.lab.reset_clone(&handle.clone.id).await
    }

    pub async fn is_active(&self, clone_id: &str) -> bool {
        dblab::is_active(self.lab.as_ref(), clone_id).await
    }
}

/// Idle timeout + assistant version + snapshot data-state-at, appended
/// to the reply once a session starts.
fn foreword(clone: &crate::model::DbClone) -> String {
    format!(
        "Idle timeout: {}\nAssistant version: {}\nData state at: {}",
        format_minutes(clone.max_idle_minutes),
        env!("CARGO_PKG_VERSION"),
        clone.data_state_at
    )
}

fn format_minutes(minutes: u32) -> String {
    if minutes == 0 {
        return "0 minutes".to_string();
    }
    if minutes % 60 == 0 {
        let hours = minutes / 60;
        let plural = if hours == 1 { "" } else { "s" };
        return format!("{hours} hour{plural}");
    }
    format!("{minutes} minutes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_whole_hours() {
        assert_eq!(format_minutes(60), "1 hour");
        assert_eq!(format_minutes(120), "2 hours");
    }

    #[test]
    fn formats_plain_minutes() {
        assert_eq!(format_minutes(90), "90 minutes");
        assert_eq!(format_minutes(0), "0 minutes");
    }
}
