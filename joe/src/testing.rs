//! In-memory test doubles for every external collaborator trait, so the
//! processing pipeline can be exercised without a live Database Lab,
//! Platform, chat workspace, or Postgres clone.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::db::{DbConnection, DbConnector};
use crate::dblab::{CreateCloneRequest, DatabaseLabClient};
use crate::error::EngineError;
use crate::messenger::Messenger;
use crate::model::{CloneDb, DbClone, Message, Status, UserInfo};
use crate::platform::PostCommandResponse;
use crate::platform::PlatformClient;
use crate::user_registry::UserInformer;

/// Resolves every user id to a fixed profile, or to `{id}`-derived
/// values if none was registered for it.
#[derive(Default)]
pub struct FakeUserInformer {
    fixed: Mutex<std::collections::HashMap<String, UserInfo>>,
}

impl FakeUserInformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, info: UserInfo) -> Self {
        self.fixed.lock().unwrap().insert(info.id.clone(), info);
        self
    }
}

#[async_trait]
impl UserInformer for FakeUserInformer {
    async fn fetch(&self, user_id: &str) -> anyhow::Result<UserInfo> {
        if let Some(info) = self.fixed.lock().unwrap().get(user_id) {
            return Ok(info.clone());
        }
        Ok(UserInfo {
            id: user_id.to_string(),
            name: format!("user-{user_id}"),
            real_name: format!("Test User {user_id}"),
        })
    }
}

/// A `DbConnection` with canned responses, keyed by exact SQL text, plus
/// a default fallback for anything not explicitly stubbed.
#[derive(Default)]
pub struct FakeDbConnection {
    text_responses: Mutex<std::collections::HashMap<String, String>>,
    row_responses: Mutex<std::collections::HashMap<String, Vec<Vec<String>>>>,
    errors: Mutex<std::collections::HashMap<String, EngineError>>,
    /// Errors that fire exactly once, then fall through to the normal
    /// stubbed/default response — simulates a single dropped connection
    /// a retry recovers from, per scenario S4.
    transient_errors: Mutex<std::collections::HashMap<String, EngineError>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeDbConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stub_text(&self, sql: &str, text: impl Into<String>) {
        self.text_responses.lock().unwrap().insert(sql.to_string(), text.into());
    }

    pub fn stub_rows(&self, sql: &str, rows: Vec<Vec<String>>) {
        self.row_responses.lock().unwrap().insert(sql.to_string(), rows);
    }

    pub fn stub_error(&self, sql: &str, err: EngineError) {
        self.errors.lock().unwrap().insert(sql.to_string(), err);
    }

    pub fn stub_error_once(&self, sql: &str, err: EngineError) {
        self.transient_errors.lock().unwrap().insert(sql.to_string(), err);
    }

    fn take_error(&self, sql: &str) -> Option<EngineError> {
        if let Some(err) = self.transient_errors.lock().unwrap().remove(sql) {
            return Some(err);
        }
        clone_error(&self.errors, sql)
    }
}

#[async_trait]
impl DbConnection for FakeDbConnection {
    async fn ping(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn query_text(&self, sql: &str) -> Result<String, EngineError> {
        self.calls.lock().unwrap().push(sql.to_string());
        if let Some(err) = self.take_error(sql) {
            return Err(err);
        }
        Ok(self
            .text_responses
            .lock()
            .unwrap()
            .get(sql)
            .cloned()
            .unwrap_or_else(|| "Result  (cost=0.01..0.01 rows=1 width=0)\n".to_string()))
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<Vec<String>>, EngineError> {
        self.calls.lock().unwrap().push(sql.to_string());
        if let Some(err) = self.take_error(sql) {
            return Err(err);
        }
        Ok(self.row_responses.lock().unwrap().get(sql).cloned().unwrap_or_default())
    }

    async fn execute(&self, sql: &str) -> Result<Duration, EngineError> {
        self.calls.lock().unwrap().push(sql.to_string());
        if let Some(err) = self.take_error(sql) {
            return Err(err);
        }
        Ok(Duration::from_millis(1))
    }

    async fn query_rows_params(&self, sql: &str, params: &[String]) -> Result<Vec<Vec<String>>, EngineError> {
        self.calls.lock().unwrap().push(format!("{sql} -- params={params:?}"));
        if let Some(err) = self.take_error(sql) {
            return Err(err);
        }
        Ok(self.row_responses.lock().unwrap().get(sql).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl DbConnection for std::sync::Arc<FakeDbConnection> {
    async fn ping(&self) -> Result<(), EngineError> {
        (**self).ping().await
    }

    async fn query_text(&self, sql: &str) -> Result<String, EngineError> {
        (**self).query_text(sql).await
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<Vec<String>>, EngineError> {
        (**self).query_rows(sql).await
    }

    async fn execute(&self, sql: &str) -> Result<Duration, EngineError> {
        (**self).execute(sql).await
    }

    async fn query_rows_params(&self, sql: &str, params: &[String]) -> Result<Vec<Vec<String>>, EngineError> {
        (**self).query_rows_params(sql, params).await
    }
}

/// A `DbConnector` that always hands back the same shared
/// [`FakeDbConnection`], so a test can stub responses on it before
/// `SessionManager::ensure` ever calls `connect`.
pub struct FakeDbConnector {
    pub connection: std::sync::Arc<FakeDbConnection>,
}

impl FakeDbConnector {
    pub fn new(connection: std::sync::Arc<FakeDbConnection>) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl DbConnector for FakeDbConnector {
    async fn connect(&self, _db: &crate::model::CloneDb) -> Result<Box<dyn DbConnection>, EngineError> {
        Ok(Box::new(self.connection.clone()))
    }
}

fn clone_error(errors: &Mutex<std::collections::HashMap<String, EngineError>>, sql: &str) -> Option<EngineError> {
    errors.lock().unwrap().get(sql).map(|e| match e {
        EngineError::Transport(m) => EngineError::Transport(m.clone()),
        EngineError::LabService(m) => EngineError::LabService(m.clone()),
        EngineError::Query(m) => EngineError::Query(m.clone()),
        EngineError::RateLimit(m) => EngineError::RateLimit(m.clone()),
        EngineError::Messenger(m) => EngineError::Messenger(m.clone()),
        EngineError::History(m) => EngineError::History(m.clone()),
        EngineError::Validation(r) => EngineError::Validation(*r),
    })
}

/// A `DatabaseLabClient` that hands back an in-memory clone record
/// immediately (no polling) and tracks every lifecycle call, so tests
/// can assert create/destroy/reset pairing.
pub struct FakeDatabaseLabClient {
    pub active: Mutex<bool>,
    pub destroyed: Mutex<Vec<String>>,
    pub reset_count: Mutex<u32>,
    fail_create: Mutex<bool>,
    max_idle_minutes: Mutex<u32>,
}

impl Default for FakeDatabaseLabClient {
    fn default() -> Self {
        Self {
            active: Mutex::new(true),
            destroyed: Mutex::new(Vec::new()),
            reset_count: Mutex::new(0),
            fail_create: Mutex::new(false),
            max_idle_minutes: Mutex::new(60),
        }
    }
}

impl FakeDatabaseLabClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, active: bool) {
        *self.active.lock().unwrap() = active;
    }

    pub fn fail_next_create(&self) {
        *self.fail_create.lock().unwrap() = true;
    }

    /// Overrides the `max_idle_minutes` every subsequently-created or
    /// fetched clone reports, so idle-sweep tests don't need to wait out
    /// a real 60-minute window.
    pub fn set_max_idle_minutes(&self, minutes: u32) {
        *self.max_idle_minutes.lock().unwrap() = minutes;
    }
}

#[async_trait]
impl DatabaseLabClient for FakeDatabaseLabClient {
    async fn create_clone(&self, request: CreateCloneRequest) -> Result<DbClone, EngineError> {
        if std::mem::take(&mut *self.fail_create.lock().unwrap()) {
            return Err(EngineError::LabService("simulated create_clone failure".to_string()));
        }
        self.set_active(true);
        Ok(DbClone {
            id: request.id,
            status: "OK".to_string(),
            db: CloneDb {
                host: "localhost".to_string(),
                port: 6000,
                username: request.db.username,
                password: joe_core::Redacted::new(request.db.password),
                dbname: String::new(),
                sslmode: String::new(),
            },
            max_idle_minutes: *self.max_idle_minutes.lock().unwrap(),
            data_state_at: "2026-01-01 00:00:00".to_string(),
        })
    }

    async fn get_clone(&self, id: &str) -> Result<DbClone, EngineError> {
        let status = if *self.active.lock().unwrap() { "OK" } else { "GONE" };
        Ok(DbClone {
            id: id.to_string(),
            status: status.to_string(),
            db: CloneDb {
                host: "localhost".to_string(),
                port: 6000,
                username: "joe".to_string(),
                password: joe_core::Redacted::new(String::new()),
                dbname: String::new(),
                sslmode: String::new(),
            },
            max_idle_minutes: *self.max_idle_minutes.lock().unwrap(),
            data_state_at: "2026-01-01 00:00:00".to_string(),
        })
    }

    async fn reset_clone(&self, _id: &str) -> Result<(), EngineError> {
        *self.reset_count.lock().unwrap() += 1;
        Ok(())
    }

    async fn destroy_clone(&self, id: &str) -> Result<(), EngineError> {
        self.destroyed.lock().unwrap().push(id.to_string());
        self.set_active(false);
        Ok(())
    }
}

/// A `PlatformClient` that records every posted command instead of
/// sending it anywhere.
#[derive(Default)]
pub struct FakePlatformClient {
    pub posted: Mutex<Vec<crate::model::CommandRecord>>,
    pub command_link: Mutex<Option<String>>,
}

impl FakePlatformClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_command_link(&self, link: impl Into<String>) {
        *self.command_link.lock().unwrap() = Some(link.into());
    }
}

#[async_trait]
impl PlatformClient for FakePlatformClient {
    async fn create_session(&self, _project: &str, _user_id: &str, _username: &str, _channel: &str) -> Result<String, EngineError> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn post_command(&self, record: &crate::model::CommandRecord) -> Result<PostCommandResponse, EngineError> {
        self.posted.lock().unwrap().push(record.clone());
        Ok(PostCommandResponse {
            command_id: record.id.to_string(),
            command_link: self.command_link.lock().unwrap().clone(),
        })
    }

    async fn post_message(&self, _session_id: &str, _text: &str) -> Result<(), EngineError> {
        Ok(())
    }

    async fn add_artifact(&self, _message_id: &str, _title: &str, _content: &str) -> Result<String, EngineError> {
        Ok("https://platform.example.com/artifact/fake".to_string())
    }
}

/// A `Messenger` that keeps every published/updated message in memory
/// instead of talking to a chat workspace, assigning a fresh message id
/// on first publish.
#[derive(Default)]
pub struct FakeMessenger {
    pub published: Mutex<Vec<Message>>,
    next_id: Mutex<u64>,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published_texts(&self) -> Vec<String> {
        self.published.lock().unwrap().iter().map(|m| m.text.clone()).collect()
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn publish(&self, message: &mut Message) -> Result<(), EngineError> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        message.message_id = Some(format!("msg-{next_id}"));
        self.published.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn update_text(&self, message: &Message) -> Result<(), EngineError> {
        if !message.is_published() {
            return Err(EngineError::Messenger("cannot update an unpublished message".to_string()));
        }
        let mut published = self.published.lock().unwrap();
        if let Some(existing) = published.iter_mut().find(|m| m.message_id == message.message_id) {
            *existing = message.clone();
        }
        Ok(())
    }

    async fn update_status(&self, message: &mut Message, status: Status) -> Result<(), EngineError> {
        if message.status != status {
            message.set_status(status);
        }
        let mut published = self.published.lock().unwrap();
        if let Some(existing) = published.iter_mut().find(|m| m.message_id == message.message_id) {
            existing.status = status;
        }
        Ok(())
    }

    async fn add_artifact(&self, title: &str, _content: &str, _channel: &str, _thread: Option<&str>) -> Result<String, EngineError> {
        Ok(format!("https://chat.example.com/files/{title}"))
    }

    async fn download_artifact(&self, _url: &str) -> Result<Vec<u8>, EngineError> {
        Ok(b"id,name\n1,widget\n".to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IncomingMessage;

    fn incoming() -> IncomingMessage {
        IncomingMessage {
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
        }
    }

    #[tokio::test]
    async fn fake_messenger_assigns_message_ids_on_publish() {
        let messenger = FakeMessenger::new();
        let mut message = Message::new(&incoming());
        assert!(message.message_id.is_none());
        messenger.publish(&mut message).await.unwrap();
        assert!(message.message_id.is_some());
    }

    #[tokio::test]
    async fn fake_db_connection_returns_stubbed_rows() {
        let conn = FakeDbConnection::new();
        conn.stub_rows("select 1", vec![vec!["col".into()], vec!["1".into()]]);
        let rows = conn.query_rows("select 1").await.unwrap();
        assert_eq!(rows, vec![vec!["col".to_string()], vec!["1".to_string()]]);
    }

    #[tokio::test]
    async fn fake_database_lab_client_tracks_destroy_calls() {
        let lab = FakeDatabaseLabClient::new();
        lab.destroy_clone("clone-1").await.unwrap();
        assert_eq!(*lab.destroyed.lock().unwrap(), vec!["clone-1".to_string()]);
        assert!(!*lab.active.lock().unwrap());
    }
}
