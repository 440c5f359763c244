//! Process bootstrap and a minimal stdin/stdout reference transport.
//!
//! The engine itself (`joe::service::ProcessingService`) is transport-
//! agnostic — chat-workspace wiring (event
//! decoding, signature verification, websocket vs. webhook) out of
//! scope. This binary exists to exercise the engine end to end: it reads
//! one chat message per line from stdin and prints the resulting reply
//! stream to stdout, using the real Database Lab and Platform clients
//! against whatever's configured. A host application embedding `joe` as
//! a library would replace [`StdoutMessenger`]/[`StaticUserInformer`]
//! with its workspace's real transport and user directory.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use joe::config::{Args, FileConfig};
use joe::db::PgConnector;
use joe::dblab::HttpDatabaseLabClient;
use joe::dispatcher::EnterpriseCommandBuilder;
use joe::error::EngineError;
use joe::explain::JsonExplainParser;
use joe::idle_sweeper;
use joe::messenger::Messenger;
use joe::model::{IncomingMessage, Message, Status, UserInfo};
use joe::platform::HttpPlatformClient;
use joe::service::{ProcessingService, ProcessingServiceConfig};
use joe::session_manager::{SessionManager, SessionManagerConfig};
use joe::user_registry::{UserInformer, UserRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    let env_path = dirs::config_dir().map(|d| d.join("joe").join(".env")).filter(|p| p.exists());
    if let Some(path) = env_path {
        let _ = dotenvy::from_path(&path);
    } else {
        let _ = dotenvy::dotenv();
    }

    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if args.debug { "debug" } else { "info" })
        }))
        .init();

    let file_config = if args.config.exists() {
        FileConfig::load(&args.config).with_context(|| format!("loading {}", args.config.display()))?
    } else {
        tracing::warn!("no config file at {}, starting with defaults only", args.config.display());
        FileConfig::default()
    };

    let (dblab_url, dblab_token, dbname, sslmode, dblab_project) = resolve_dblab_params(&file_config);

    let api_url = args.api_url.clone().unwrap_or_default();
    let api_token = args.api_token.clone().unwrap_or_default();
    let api_project = args.api_project.clone().unwrap_or_default();

    let lab = Arc::new(HttpDatabaseLabClient::new(dblab_url, dblab_token, dbname.clone(), sslmode.clone()));
    let platform = Arc::new(HttpPlatformClient::new(api_url, api_token));

    let session_mgr = Arc::new(SessionManager::new(
        lab,
        platform.clone(),
        Arc::new(PgConnector),
        SessionManagerConfig {
            dblab_project,
            dbname,
            sslmode,
            platform_project: api_project,
            history_enabled: args.history_enabled,
        },
    ));

    let registry = Arc::new(UserRegistry::new(args.quota_limit, Duration::from_secs(args.quota_interval)));
    let messenger: Arc<dyn Messenger> = Arc::new(StdoutMessenger);
    let informer: Arc<dyn UserInformer> = Arc::new(StaticUserInformer);

    let service = ProcessingService::new(
        registry.clone(),
        session_mgr.clone(),
        platform,
        messenger.clone(),
        Arc::new(JsonExplainParser),
        Arc::new(EnterpriseCommandBuilder),
        informer,
        ProcessingServiceConfig {
            history_enabled: args.history_enabled,
            audit_enabled: args.audit_enabled,
            min_notify_duration: Duration::from_secs(args.min_notify_duration * 60),
        },
    );

    let sweeper = idle_sweeper::spawn(registry, session_mgr, messenger);

    tracing::info!("joe is listening on stdin; one chat message per line, Ctrl-D to stop");
    run_repl(&service).await;

    sweeper.abort();
    Ok(())
}

async fn run_repl(service: &ProcessingService) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("reading stdin: {e}");
                break;
            }
        };

        let incoming = IncomingMessage {
            channel_id: "repl".to_string(),
            channel_type: "repl".to_string(),
            user_id: "repl-user".to_string(),
            text: line,
            is_bot: false,
            subtype: String::new(),
            timestamp: chrono::Utc::now(),
            thread_id: None,
            session_id: None,
            snippet_url: None,
        };

        match service.process_message_event(incoming).await {
            Ok(Some(_)) | Ok(None) => {}
            Err(e) => tracing::error!("processing failed: {e}"),
        }
    }
}

/// The first configured Database Lab server and channel, used to seed
/// the single session manager this demo binary runs. A host application
/// with multiple workspaces/channels would run one `ProcessingService`
/// (and `SessionManager`) per channel instead.
fn resolve_dblab_params(config: &FileConfig) -> (String, String, String, String, String) {
    for connections in config.connections.values() {
        for connection in connections {
            for channel in &connection.channels {
                if let Some(server) = config.dblab_servers.get(&channel.dblab_server) {
                    return (
                        server.url.clone(),
                        server.token.clone(),
                        channel.dblab_params.dbname.clone(),
                        channel.dblab_params.sslmode.clone(),
                        channel.channel_id.clone(),
                    );
                }
            }
        }
    }

    tracing::warn!("no dblabServers/channels configured; using empty Database Lab connection params");
    (String::new(), String::new(), String::new(), "disable".to_string(), "default".to_string())
}

/// Prints the accumulated reply text to stdout on every publish/update,
/// simulating one evolving chat message as a sequence of printed blocks.
struct StdoutMessenger;

#[async_trait]
impl Messenger for StdoutMessenger {
    async fn publish(&self, message: &mut Message) -> Result<(), EngineError> {
        message.message_id = Some(uuid::Uuid::new_v4().to_string());
        println!("--- {} ---\n{}\n", message.channel_id, message.text);
        Ok(())
    }

    async fn update_text(&self, message: &Message) -> Result<(), EngineError> {
        if !message.is_published() {
            return Err(EngineError::Messenger("cannot update an unpublished message".to_string()));
        }
        println!("--- {} (update) ---\n{}\n", message.channel_id, message.text);
        Ok(())
    }

    async fn update_status(&self, message: &mut Message, status: Status) -> Result<(), EngineError> {
        if message.status != status {
            message.set_status(status);
        }
        println!("[{:?}]", status);
        Ok(())
    }

    async fn add_artifact(&self, title: &str, content: &str, _channel: &str, _thread: Option<&str>) -> Result<String, EngineError> {
        let path = std::env::temp_dir().join(format!("joe-{}-{}", uuid::Uuid::new_v4(), title));
        std::fs::write(&path, content).map_err(|e| EngineError::Messenger(e.to_string()))?;
        Ok(format!("file://{}", path.display()))
    }

    async fn download_artifact(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        let path = Path::new(url.trim_start_matches("file://"));
        std::fs::read(path).map_err(|e| EngineError::Messenger(e.to_string()))
    }
}

/// Derives a user profile from the chat user id, since no real
/// workspace directory is wired up by this demo binary.
struct StaticUserInformer;

#[async_trait]
impl UserInformer for StaticUserInformer {
    async fn fetch(&self, user_id: &str) -> anyhow::Result<UserInfo> {
        Ok(UserInfo {
            id: user_id.to_string(),
            name: user_id.to_string(),
            real_name: user_id.to_string(),
        })
    }
}
