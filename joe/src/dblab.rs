//! Database Lab client: create/inspect/reset/destroy ephemeral
//! clones. The wire-level HTTP implementation is intentionally thin — an
//! external collaborator — but real enough to exercise against a live
//! Database Lab instance.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::{CloneDb, DbClone};

#[derive(Debug, Clone, Serialize)]
pub struct CreateCloneRequest {
    pub id: String,
    pub project: String,
    pub protected: bool,
    pub db: CreateCloneDb,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateCloneDb {
    pub username: String,
    pub password: String,
}

/// External Database Lab clone-lifecycle API, consumed by the session
/// manager. `create_clone` blocks (internally polling) until the clone
/// reaches `status.code == "OK"` or the poll budget is exhausted.
#[async_trait]
pub trait DatabaseLabClient: Send + Sync {
    async fn create_clone(&self, request: CreateCloneRequest) -> Result<DbClone, EngineError>;
    async fn get_clone(&self, id: &str) -> Result<DbClone, EngineError>;
    async fn reset_clone(&self, id: &str) -> Result<(), EngineError>;
    async fn destroy_clone(&self, id: &str) -> Result<(), EngineError>;
}

/// `true` iff the Database Lab clone reports a live, usable state.
pub async fn is_active(lab: &dyn DatabaseLabClient, clone_id: &str) -> bool {
    matches!(lab.get_clone(clone_id).await, Ok(clone) if clone.status == "OK")
}

#[derive(Debug, Deserialize)]
struct CloneResponse {
    id: String,
    status: CloneStatus,
    db: CloneDbResponse,
    metadata: CloneMetadata,
}

#[derive(Debug, Deserialize)]
struct CloneStatus {
    code: String,
}

#[derive(Debug, Deserialize)]
struct CloneDbResponse {
    host: String,
    port: u16,
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct CloneMetadata {
    #[serde(rename = "maxIdleMinutes", default = "default_max_idle")]
    max_idle_minutes: u32,
    #[serde(rename = "cloningTime", default)]
    data_state_at: String,
}

fn default_max_idle() -> u32 {
    120
}

impl From<CloneResponse> for DbClone {
    fn from(resp: CloneResponse) -> Self {
        DbClone {
            id: resp.id,
            status: resp.status.code,
            db: CloneDb {
                host: resp.db.host,
                port: resp.db.port,
                username: resp.db.username,
                password: joe_core::Redacted::new(resp.db.password),
                dbname: String::new(),
                sslmode: String::new(),
            },
            max_idle_minutes: resp.metadata.max_idle_minutes,
            data_state_at: resp.metadata.data_state_at,
        }
    }
}

/// `reqwest`-backed Database Lab client.
pub struct HttpDatabaseLabClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    dbname: String,
    sslmode: String,
}

impl HttpDatabaseLabClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, dbname: impl Into<String>, sslmode: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(joe_core::HTTP_TIMEOUT_SECS))
                .build()
                .expect("reqwest client"),
            base_url: base_url.into(),
            token: token.into(),
            dbname: dbname.into(),
            sslmode: sslmode.into(),
        }
    }

    fn finish(&self, mut clone: DbClone) -> DbClone {
        clone.db.dbname = self.dbname.clone();
        clone.db.sslmode = self.sslmode.clone();
        clone
    }

    async fn poll_until_ready(&self, id: &str) -> Result<DbClone, EngineError> {
        for _ in 0..joe_core::CLONE_POLL_MAX_ATTEMPTS {
            let clone = self.get_clone(id).await?;
            if clone.status == "OK" {
                return Ok(clone);
            }
            tokio::time::sleep(Duration::from_secs(joe_core::CLONE_POLL_INTERVAL_SECS)).await;
        }
        Err(EngineError::LabService(format!(
            "clone {id} did not become ready within the poll budget"
        )))
    }
}

#[async_trait]
impl DatabaseLabClient for HttpDatabaseLabClient {
    async fn create_clone(&self, request: CreateCloneRequest) -> Result<DbClone, EngineError> {
        let url = format!("{}/clone", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Verification-Token", &self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EngineError::LabService(format!(
                "create_clone failed: {}",
                resp.status()
            )));
        }

        let created: CloneResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::LabService(e.to_string()))?;

        let ready = self.poll_until_ready(&created.id).await?;
        Ok(self.finish(ready))
    }

    async fn get_clone(&self, id: &str) -> Result<DbClone, EngineError> {
        let url = format!("{}/clone/{id}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header("Verification-Token", &self.token)
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EngineError::LabService(format!(
                "get_clone failed: {}",
                resp.status()
            )));
        }

        let clone: CloneResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::LabService(e.to_string()))?;
        Ok(self.finish(clone.into()))
    }

    async fn reset_clone(&self, id: &str) -> Result<(), EngineError> {
        let url = format!("{}/clone/{id}/reset", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Verification-Token", &self.token)
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EngineError::LabService(format!(
                "reset_clone failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn destroy_clone(&self, id: &str) -> Result<(), EngineError> {
        let url = format!("{}/clone/{id}", self.base_url);
        let resp = self
            .client
            .delete(&url)
            .header("Verification-Token", &self.token)
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        if !resp.status().is_success() && resp.status().as_u16() != 404 {
            return Err(EngineError::LabService(format!(
                "destroy_clone failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
