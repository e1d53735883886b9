//! On-disk host configuration plus process-level overrides, the way
//! `moltis-config` layers a TOML file under `clap`/`dotenvy` env vars.

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_namespace")]
    pub default_email_namespace: String,
    pub email_secret: Option<String>,
    #[serde(default)]
    pub max_persisted_messages: Option<usize>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8787".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_namespace() -> String {
    "inbox".to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            data_dir: default_data_dir(),
            default_email_namespace: default_namespace(),
            email_secret: None,
            max_persisted_messages: None,
        }
    }
}

impl HostConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(Error::Config)
    }

    pub fn instance_database_url(&self, key: &agent_common::AgentKey) -> String {
        let dir = self.data_dir.join(&key.namespace);
        format!("sqlite://{}/{}.sqlite3", dir.display(), key.name)
    }
}

/// Process-level overrides, matching the teacher's `clap` (`env` feature)
/// convention for letting deployment config come from the environment
/// without editing the TOML file.
#[derive(Debug, Parser)]
#[command(name = "agent-host", about = "Runs the agent instance host")]
pub struct Cli {
    #[arg(long, env = "AGENT_HOST_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "AGENT_HOST_LISTEN_ADDR")]
    pub listen_addr: Option<String>,

    #[arg(long, env = "EMAIL_SECRET")]
    pub email_secret: Option<String>,
}

impl Cli {
    pub fn apply(&self, mut config: HostConfig) -> HostConfig {
        if let Some(addr) = &self.listen_addr {
            config.listen_addr = addr.clone();
        }
        if let Some(secret) = &self.email_secret {
            config.email_secret = Some(secret.clone());
        }
        config
    }
}
