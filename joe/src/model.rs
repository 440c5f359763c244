//! Core data model shared by every stage of the message pipeline.

use std::time::{Duration, Instant};

use joe_core::redact::Redacted;
use serde::{Deserialize, Serialize};

/// A message as it arrives from the chat transport, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub channel_id: String,
    pub channel_type: String,
    pub user_id: String,
    pub text: String,
    pub is_bot: bool,
    pub subtype: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub thread_id: Option<String>,
    pub session_id: Option<String>,
    pub snippet_url: Option<String>,
}

/// Why a message was dropped before reaching the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    BotOrSystem,
    ThreadReply,
    Unsupported,
    ChannelMissing,
}

/// Lifecycle status of an in-flight reply. Transitions are monotone:
/// `None -> Running -> {Ok, Error}`. Once `Ok` or `Error` is reached the
/// message is done; it never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    None,
    Running,
    Ok,
    Error,
}

impl Status {
    pub fn can_transition_to(self, next: Status) -> bool {
        use Status::*;
        matches!(
            (self, next),
            (None, Running) | (None, Ok) | (None, Error) | (Running, Ok) | (Running, Error)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Default,
    Thread,
    Ephemeral,
}

/// A reply in progress. `text` only ever grows, via [`Message::append`].
#[derive(Debug, Clone)]
pub struct Message {
    pub message_id: Option<String>,
    pub command_id: uuid::Uuid,
    pub user_id: String,
    pub channel_id: String,
    pub thread_id: Option<String>,
    pub message_type: MessageType,
    pub text: String,
    pub status: Status,
    pub created_at: Instant,
    pub notify_at: Option<Instant>,
}

impl Message {
    pub fn new(incoming: &IncomingMessage) -> Self {
        let message_type = if incoming.thread_id.is_some() {
            MessageType::Thread
        } else {
            MessageType::Default
        };

        Self {
            message_id: None,
            command_id: uuid::Uuid::new_v4(),
            user_id: incoming.user_id.clone(),
            channel_id: incoming.channel_id.clone(),
            thread_id: incoming.thread_id.clone(),
            message_type,
            text: String::new(),
            status: Status::None,
            created_at: Instant::now(),
            notify_at: None,
        }
    }

    /// `is_published ⇔ message_id ≠ ∅ ∧ channel_id ≠ ∅` (invariant 3).
    pub fn is_published(&self) -> bool {
        self.message_id.is_some() && !self.channel_id.is_empty()
    }

    /// A standalone reply with no originating command, used by the idle
    /// sweeper's per-channel summary message.
    pub fn for_channel(channel_id: &str) -> Self {
        Self {
            message_id: None,
            command_id: uuid::Uuid::new_v4(),
            user_id: String::new(),
            channel_id: channel_id.to_string(),
            thread_id: None,
            message_type: MessageType::Default,
            text: String::new(),
            status: Status::None,
            created_at: Instant::now(),
            notify_at: None,
        }
    }

    /// Grows `text` by joining with a blank line, per the message-text
    /// append law: appending never truncates or rewrites prior content.
    pub fn append(&mut self, addition: &str) {
        if self.text.is_empty() {
            self.text = addition.to_string();
        } else {
            self.text.push_str("\n\n");
            self.text.push_str(addition);
        }
    }

    /// Replace the text outright (used only for the explain command's
    /// "Plan:" -> "Plan with execution:" rewrite).
    pub fn replace(&mut self, text: String) {
        self.text = text;
    }

    pub fn set_status(&mut self, next: Status) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal status transition {:?} -> {:?}",
            self.status,
            next
        );
        self.status = next;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub real_name: String,
}

/// A request-rate window. `request` enforces the limit and rolls the
/// window forward; see [`crate::quota`].
#[derive(Debug, Clone)]
pub struct Quota {
    pub window_start: Instant,
    pub count: u32,
    pub limit: u32,
    pub interval: Duration,
}

impl Quota {
    pub fn new(limit: u32, interval: Duration) -> Self {
        Self {
            window_start: Instant::now(),
            count: 0,
            limit,
            interval,
        }
    }
}

/// Connection parameters for a clone, as handed back by Database Lab.
#[derive(Debug, Clone)]
pub struct CloneDb {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Redacted<String>,
    pub dbname: String,
    pub sslmode: String,
}

impl CloneDb {
    pub fn connection_string(&self) -> Redacted<String> {
        Redacted::new(format!(
            "host={} port={} user={} password={} dbname={} sslmode={}",
            self.host,
            self.port,
            self.username,
            self.password.expose(),
            self.dbname,
            self.sslmode
        ))
    }
}

/// A Database Lab clone, as returned by the Database Lab client.
#[derive(Debug, Clone)]
pub struct DbClone {
    pub id: String,
    pub status: String,
    pub db: CloneDb,
    pub max_idle_minutes: u32,
    pub data_state_at: String,
}

/// The clone + live connection + connection params, kept as a single
/// optional unit: a session either has all three or none of them.
pub struct CloneHandle {
    pub clone: DbClone,
    pub connection: Box<dyn crate::db::DbConnection>,
}

impl std::fmt::Debug for CloneHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloneHandle")
            .field("clone", &self.clone)
            .finish_non_exhaustive()
    }
}

/// A user's session: rate limiting state plus, once started, a clone.
#[derive(Debug)]
pub struct Session {
    pub platform_session_id: Option<String>,
    pub quota: Quota,
    pub last_action_ts: Instant,
    pub channel_id: Option<String>,
    pub clone_handle: Option<CloneHandle>,
}

impl Session {
    pub fn new(limit: u32, interval: Duration) -> Self {
        Self {
            platform_session_id: None,
            quota: Quota::new(limit, interval),
            last_action_ts: Instant::now(),
            channel_id: None,
            clone_handle: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.clone_handle.is_some()
    }
}

#[derive(Debug)]
pub struct User {
    pub user_info: UserInfo,
    pub session: Session,
}

/// The twelve psql meta-commands joe accepts, plus the `\d`/`\d+` and
/// `\l`/`\l+` core pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsqlMeta {
    D,
    DPlus,
    Dt,
    DtPlus,
    Di,
    DiPlus,
    L,
    LPlus,
    Dv,
    DvPlus,
    Dm,
    DmPlus,
}

impl PsqlMeta {
    pub fn as_str(self) -> &'static str {
        match self {
            PsqlMeta::D => "\\d",
            PsqlMeta::DPlus => "\\d+",
            PsqlMeta::Dt => "\\dt",
            PsqlMeta::DtPlus => "\\dt+",
            PsqlMeta::Di => "\\di",
            PsqlMeta::DiPlus => "\\di+",
            PsqlMeta::L => "\\l",
            PsqlMeta::LPlus => "\\l+",
            PsqlMeta::Dv => "\\dv",
            PsqlMeta::DvPlus => "\\dv+",
            PsqlMeta::Dm => "\\dm",
            PsqlMeta::DmPlus => "\\dm+",
        }
    }

    pub fn parse(word: &str) -> Option<Self> {
        Some(match word {
            "\\d" => PsqlMeta::D,
            "\\d+" => PsqlMeta::DPlus,
            "\\dt" => PsqlMeta::Dt,
            "\\dt+" => PsqlMeta::DtPlus,
            "\\di" => PsqlMeta::Di,
            "\\di+" => PsqlMeta::DiPlus,
            "\\l" => PsqlMeta::L,
            "\\l+" => PsqlMeta::LPlus,
            "\\dv" => PsqlMeta::Dv,
            "\\dv+" => PsqlMeta::DvPlus,
            "\\dm" => PsqlMeta::Dm,
            "\\dm+" => PsqlMeta::DmPlus,
            _ => return None,
        })
    }
}

/// The command word a message dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Explain,
    Plan,
    Exec,
    Reset,
    Help,
    Hypo,
    Activity,
    Terminate,
    Psql(PsqlMeta),
}

impl CommandKind {
    pub fn parse(word: &str) -> Option<Self> {
        if let Some(meta) = PsqlMeta::parse(word) {
            return Some(CommandKind::Psql(meta));
        }

        Some(match word {
            "explain" => CommandKind::Explain,
            "plan" => CommandKind::Plan,
            "exec" => CommandKind::Exec,
            "reset" => CommandKind::Reset,
            "help" => CommandKind::Help,
            "hypo" => CommandKind::Hypo,
            "activity" => CommandKind::Activity,
            "terminate" => CommandKind::Terminate,
            _ => return None,
        })
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandKind::Explain => write!(f, "explain"),
            CommandKind::Plan => write!(f, "plan"),
            CommandKind::Exec => write!(f, "exec"),
            CommandKind::Reset => write!(f, "reset"),
            CommandKind::Help => write!(f, "help"),
            CommandKind::Hypo => write!(f, "hypo"),
            CommandKind::Activity => write!(f, "activity"),
            CommandKind::Terminate => write!(f, "terminate"),
            CommandKind::Psql(meta) => write!(f, "{}", meta.as_str()),
        }
    }
}

/// An audit/history row for one dispatched command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: uuid::Uuid,
    pub user_id: String,
    pub user_name: String,
    pub real_name: String,
    pub command: String,
    pub query: String,
    pub response: Option<String>,
    pub plan_text: Option<String>,
    pub plan_exec_text: Option<String>,
    pub plan_exec_json: Option<String>,
    pub recommendations: Option<String>,
    pub stats: Option<String>,
    pub error: Option<String>,
    pub command_link: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl CommandRecord {
    pub fn new(user: &UserInfo, command: CommandKind, query: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            real_name: user.real_name.clone(),
            command: command.to_string(),
            query: query.to_string(),
            response: None,
            plan_text: None,
            plan_exec_text: None,
            plan_exec_json: None,
            recommendations: None,
            stats: None,
            error: None,
            command_link: None,
            created_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_monotone() {
        assert!(Status::None.can_transition_to(Status::Running));
        assert!(Status::Running.can_transition_to(Status::Ok));
        assert!(Status::Running.can_transition_to(Status::Error));
        assert!(!Status::Ok.can_transition_to(Status::Running));
        assert!(!Status::Error.can_transition_to(Status::Ok));
    }

    #[test]
    fn message_append_only_grows() {
        let incoming = IncomingMessage {
            channel_id: "C1".into(),
            channel_type: "channel".into(),
            user_id: "U1".into(),
            text: "explain select 1".into(),
            is_bot: false,
            subtype: String::new(),
            timestamp: chrono::Utc::now(),
            thread_id: None,
            session_id: None,
            snippet_url: None,
        };
        let mut msg = Message::new(&incoming);
        msg.append("first");
        msg.append("second");
        assert_eq!(msg.text, "first\n\nsecond");
    }

    #[test]
    fn redacted_password_never_appears_in_debug_output() {
        let db = CloneDb {
            host: "localhost".into(),
            port: 6000,
            username: "joe_ann".into(),
            password: Redacted::new("hunter2".into()),
            dbname: "postgres".into(),
            sslmode: "disable".into(),
        };
        let printed = format!("{db:?}");
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn psql_meta_round_trips() {
        for word in ["\\d", "\\d+", "\\dt", "\\l", "\\dm+"] {
            let meta = PsqlMeta::parse(word).expect("should parse");
            assert_eq!(meta.as_str(), word);
        }
    }
}
