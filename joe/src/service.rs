//! The Message Processing Engine: ties the validator,
//! user registry, quota gate, session manager, command dispatcher, and
//! history recorder into the two entry points a chat transport calls.

use std::sync::Arc;
use std::time::Instant;

use joe_core::cut_text;

use crate::audit;
use crate::dispatcher::{self, CommandBuilder, HandlerCtx};
use crate::error::EngineError;
use crate::explain::ExplainParser;
use crate::hints;
use crate::messenger::Messenger;
use crate::model::{CommandKind, CommandRecord, IncomingMessage, Message, MessageType, Status, User};
use crate::platform::PlatformClient;
use crate::session_manager::SessionManager;
use crate::user_registry::{UserInformer, UserRegistry};
use crate::validator;

const MAX_RETRIES: u32 = 1;

pub struct ProcessingServiceConfig {
    pub history_enabled: bool,
    pub audit_enabled: bool,
    pub min_notify_duration: std::time::Duration,
}

/// One Channel Processor's worth of state: a user registry, a
/// session manager bound to one Database Lab instance, and the
/// collaborators every command needs.
pub struct ProcessingService {
    registry: Arc<UserRegistry>,
    session_mgr: Arc<SessionManager>,
    platform: Arc<dyn PlatformClient>,
    messenger: Arc<dyn Messenger>,
    explain_parser: Arc<dyn ExplainParser>,
    command_builder: Arc<dyn CommandBuilder>,
    informer: Arc<dyn UserInformer>,
    config: ProcessingServiceConfig,
}

impl ProcessingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<UserRegistry>,
        session_mgr: Arc<SessionManager>,
        platform: Arc<dyn PlatformClient>,
        messenger: Arc<dyn Messenger>,
        explain_parser: Arc<dyn ExplainParser>,
        command_builder: Arc<dyn CommandBuilder>,
        informer: Arc<dyn UserInformer>,
        config: ProcessingServiceConfig,
    ) -> Self {
        Self {
            registry,
            session_mgr,
            platform,
            messenger,
            explain_parser,
            command_builder,
            informer,
            config,
        }
    }

    /// The chat transport's entry point for an ordinary channel message.
    pub async fn process_message_event(&self, incoming: IncomingMessage) -> Result<Option<Message>, EngineError> {
        self.process(incoming).await
    }

    /// The chat transport's entry point for an `@mention` event. Routed
    /// through the same pipeline — mentions and plain messages are
    /// indistinguishable once validated and normalized.
    pub async fn process_mention_event(&self, incoming: IncomingMessage) -> Result<Option<Message>, EngineError> {
        self.process(incoming).await
    }

    async fn process(&self, incoming: IncomingMessage) -> Result<Option<Message>, EngineError> {
        let incoming = match validator::validate(incoming) {
            Ok(incoming) => incoming,
            Err(reason) => {
                tracing::debug!("message filtered: {reason:?}");
                return Ok(None);
            }
        };

        // Hints (§4.7) are checked against the raw normalized text and
        // published independently of whether the message even parses to a
        // recognized command — a bare `create table ...` is never a valid
        // `CommandKind` and would otherwise be dropped before the hint had
        // a chance to fire.
        if let Some(hint) = hints::hint_for(&incoming.text) {
            let mut hint_message = Message::new(&incoming);
            hint_message.message_type = MessageType::Ephemeral;
            if self.messenger.publish(&mut hint_message).await.is_ok() {
                hint_message.append(hint);
                let _ = self.messenger.update_text(&hint_message).await;
            }
        }

        let mut words = incoming.text.splitn(2, ' ');
        let cmd_word = words.next().unwrap_or("").to_lowercase();
        let query = words.next().unwrap_or("").trim().to_string();

        let Some(kind) = CommandKind::parse(&cmd_word) else {
            tracing::debug!("unrecognized command word, dropping: {cmd_word}");
            return Ok(None);
        };

        let user_lock = self
            .registry
            .get_or_create(&incoming.user_id, self.informer.as_ref())
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        let mut user = user_lock.lock().await;

        if kind == CommandKind::Help {
            let mut message = Message::new(&incoming);
            message.append(&dispatcher::help_text(self.command_builder.as_ref()));
            self.messenger.publish(&mut message).await?;
            self.messenger.ok(&mut message).await?;
            return Ok(Some(message));
        }

        if let Err(e) = user.session.quota.request(Instant::now()) {
            let mut message = Message::new(&incoming);
            let _ = self.messenger.fail(&mut message, &e.to_string()).await;
            return Err(e);
        }

        let mut command = CommandRecord::new(&user.user_info, kind, &query);

        if self.config.audit_enabled {
            audit::record(&user.user_info, &command);
        }

        self.session_mgr.ensure(&mut user, &incoming, self.messenger.as_ref()).await?;

        let mut message = Message::new(&incoming);
        let (query_preview, _) = cut_text(&query, joe_core::QUERY_PREVIEW_SIZE);
        let session_id = user
            .session
            .platform_session_id
            .clone()
            .or_else(|| user.session.clone_handle.as_ref().map(|h| h.clone.id.clone()))
            .unwrap_or_default();
        message.append(&format!("```{kind} {query_preview}```\nSession: `{session_id}`"));
        self.messenger.publish(&mut message).await?;
        self.messenger.update_status(&mut message, Status::Running).await?;
        message.notify_at = Some(message.created_at + self.config.min_notify_duration);

        let result = if kind == CommandKind::Reset {
            self.run_reset(&mut user, &incoming, &mut message).await
        } else {
            self.run_with_retry(kind, &mut user, &incoming, &mut command, &mut message).await
        };

        user.session.last_action_ts = Instant::now();

        match result {
            Ok(()) => {
                self.messenger.ok(&mut message).await?;
                self.post_history(&user.user_info, &mut command, &mut message, kind).await;
            }
            Err(ref e) => {
                command.error = Some(e.to_string());
                let _ = self.messenger.fail(&mut message, &e.to_string()).await;
                self.post_history(&user.user_info, &mut command, &mut message, kind).await;
            }
        }

        result.map(|()| Some(message))
    }

    /// The generic retry loop: on a retriable (transport)
    /// error, check whether the clone is still active; if so retry the
    /// same handler; if not, narrate the loss, reboot the session, and
    /// retry once. Any other error (or a second retriable failure) is
    /// terminal.
    async fn run_with_retry(
        &self,
        kind: CommandKind,
        user: &mut User,
        incoming: &IncomingMessage,
        command: &mut CommandRecord,
        message: &mut Message,
    ) -> Result<(), EngineError> {
        let mut attempt = 0;

        loop {
            let outcome = {
                let Some(handle) = &user.session.clone_handle else {
                    return Err(EngineError::LabService("session has no active clone".to_string()));
                };
                let ctx = HandlerCtx {
                    conn: handle.connection.as_ref(),
                    clone_db: &handle.clone.db,
                    messenger: self.messenger.as_ref(),
                    explain_parser: self.explain_parser.as_ref(),
                    command_builder: self.command_builder.as_ref(),
                };
                dispatcher::dispatch_command(kind, command, message, &ctx).await
            };

            match outcome {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retriable() && attempt < MAX_RETRIES => {
                    attempt += 1;

                    let clone_id = user
                        .session
                        .clone_handle
                        .as_ref()
                        .map(|h| h.clone.id.clone())
                        .unwrap_or_default();

                    if self.session_mgr.is_active(&clone_id).await {
                        continue;
                    }

                    message.append("Session was closed by Database Lab.");
                    self.session_mgr.stop(&mut user.session);
                    self.session_mgr.ensure(user, incoming, self.messenger.as_ref()).await?;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reset reboot: a failed reset is never retried through
    /// `run_with_retry` — it always goes through stop + ensure once.
    async fn run_reset(&self, user: &mut User, incoming: &IncomingMessage, message: &mut Message) -> Result<(), EngineError> {
        message.append("Resetting...");

        match self.session_mgr.reset(&user.session).await {
            Ok(()) => {
                message.append("The state of the database has been reset.");
                Ok(())
            }
            Err(e) => {
                self.session_mgr.stop(&mut user.session);
                self.session_mgr.ensure(user, incoming, self.messenger.as_ref()).await?;
                Err(e)
            }
        }
    }

    /// Posts the finished command to Platform history, if enabled.
    /// `command_link` is appended to the reply only for `explain`
    /// only for `explain`.
    async fn post_history(
        &self,
        user_info: &crate::model::UserInfo,
        command: &mut CommandRecord,
        message: &mut Message,
        kind: CommandKind,
    ) {
        if !self.config.history_enabled {
            return;
        }

        command.response = Some(message.text.clone());

        match self.platform.post_command(command).await {
            Ok(posted) => {
                command.command_link = posted.command_link.clone();
                if kind == CommandKind::Explain {
                    if let Some(link) = posted.command_link {
                        message.append(&format!("History: {link}"));
                        let _ = self.messenger.update_text(message).await;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(user = %user_info.id, "failed to post command history: {e}");
            }
        }
    }
}
