//! Configuration: CLI flags (`clap`, `env` mirrors) layered
//! over a YAML connections file. Precedence is CLI > env > file >
//! default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

/// CLI surface. Each flag mirrors an environment variable via
/// `env = "..."`.
#[derive(Debug, Parser)]
#[command(name = "joe")]
#[command(about = "Chat-resident query-optimization assistant")]
pub struct Args {
    /// Path to the YAML connections config file.
    #[arg(long, default_value = "config.yml")]
    pub config: PathBuf,

    #[arg(long, env = "SERVER_PORT", default_value_t = 8080)]
    pub http_port: u16,

    /// Minutes before a long-running command gets an `@user` mention.
    #[arg(long, env = "MIN_NOTIFY_DURATION", default_value_t = 1)]
    pub min_notify_duration: u64,

    #[arg(long, env = "API_URL")]
    pub api_url: Option<String>,

    #[arg(long, env = "API_TOKEN")]
    pub api_token: Option<String>,

    #[arg(long, env = "API_PROJECT")]
    pub api_project: Option<String>,

    #[arg(long, env = "HISTORY_ENABLED", default_value_t = false)]
    pub history_enabled: bool,

    #[arg(long, env = "DEBUG", default_value_t = false)]
    pub debug: bool,

    /// Enterprise: requests allowed per `--quota-interval` seconds.
    #[arg(long, default_value_t = 10)]
    pub quota_limit: u32,

    /// Enterprise: quota sliding-window width, in seconds.
    #[arg(long, default_value_t = 60)]
    pub quota_interval: u64,

    /// Enterprise: write one JSON audit line per accepted command.
    #[arg(long, default_value_t = false)]
    pub audit_enabled: bool,
}

/// `connections.<workspace-type>[]`.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceConnection {
    pub name: String,
    pub credentials: Credentials,
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "signingSecret")]
    pub signing_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    #[serde(rename = "channelID")]
    pub channel_id: String,
    #[serde(rename = "dblabServer")]
    pub dblab_server: String,
    #[serde(rename = "dblabParams")]
    pub dblab_params: DbLabParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbLabParams {
    pub dbname: String,
    pub sslmode: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbLabServer {
    pub url: String,
    pub token: String,
}

/// Top-level YAML config file shape.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub connections: HashMap<String, Vec<WorkspaceConnection>>,
    #[serde(rename = "dblabServers", default)]
    pub dblab_servers: HashMap<String, DbLabServer>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_documented_yaml_shape() {
        let yaml = r#"
connections:
  slack:
    - name: main
      credentials:
        accessToken: xoxb-token
        signingSecret: shh
      channels:
        - channelID: C1
          dblabServer: prod
          dblabParams:
            dbname: postgres
            sslmode: disable
dblabServers:
  prod:
    url: https://dblab.example.com
    token: dblab-token
"#;
        let config: FileConfig = serde_yaml::from_str(yaml).unwrap();
        let slack = &config.connections["slack"][0];
        assert_eq!(slack.name, "main");
        assert_eq!(slack.channels[0].channel_id, "C1");
        assert_eq!(config.dblab_servers["prod"].token, "dblab-token");
    }
}
