use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_HOSTNAME: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_USER_AGENT: &str = "prcraft";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TAG: &str = "prcraft";
pub const DEFAULT_BRANCH_PREFIX: &str = "prcraft";
pub const DEFAULT_PROBE_PREFIX: &str = "test-permissions";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(
        rename = "logLevel",
        alias = "log_level",
        skip_serializing_if = "Option::is_none"
    )]
    pub log_level: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<GitHubConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Extra allowed CORS origins on top of localhost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GitHubConfig {
    /// REST base, e.g. `https://github.example.com/api/v3` for Enterprise.
    #[serde(
        rename = "apiBase",
        alias = "api_base",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_base: Option<String>,
    #[serde(
        rename = "userAgent",
        alias = "user_agent",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_agent: Option<String>,
    #[serde(
        rename = "timeoutSecs",
        alias = "timeout_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PublishConfig {
    /// Prefix of generated PR titles and commit messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(
        rename = "branchPrefix",
        alias = "branch_prefix",
        skip_serializing_if = "Option::is_none"
    )]
    pub branch_prefix: Option<String>,
    #[serde(
        rename = "probePrefix",
        alias = "probe_prefix",
        skip_serializing_if = "Option::is_none"
    )]
    pub probe_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

trait DeepMerge {
    fn deep_merge(&mut self, other: Self);
}

fn merge_option_replace<T>(target: &mut Option<T>, source: Option<T>) {
    if let Some(value) = source {
        *target = Some(value);
    }
}

fn merge_option_deep<T: DeepMerge>(target: &mut Option<T>, source: Option<T>) {
    if let Some(source_value) = source {
        if let Some(target_value) = target {
            target_value.deep_merge(source_value);
        } else {
            *target = Some(source_value);
        }
    }
}

impl DeepMerge for ServerConfig {
    fn deep_merge(&mut self, other: Self) {
        merge_option_replace(&mut self.hostname, other.hostname);
        merge_option_replace(&mut self.port, other.port);
        merge_option_replace(&mut self.cors, other.cors);
    }
}

impl DeepMerge for GitHubConfig {
    fn deep_merge(&mut self, other: Self) {
        merge_option_replace(&mut self.api_base, other.api_base);
        merge_option_replace(&mut self.user_agent, other.user_agent);
        merge_option_replace(&mut self.timeout_secs, other.timeout_secs);
    }
}

impl DeepMerge for PublishConfig {
    fn deep_merge(&mut self, other: Self) {
        merge_option_replace(&mut self.tag, other.tag);
        merge_option_replace(&mut self.branch_prefix, other.branch_prefix);
        merge_option_replace(&mut self.probe_prefix, other.probe_prefix);
    }
}

impl DeepMerge for StorageConfig {
    fn deep_merge(&mut self, other: Self) {
        merge_option_replace(&mut self.database, other.database);
    }
}

impl Config {
    /// Later sources win field by field.
    pub fn merge(&mut self, other: Config) {
        merge_option_replace(&mut self.schema, other.schema);
        merge_option_replace(&mut self.log_level, other.log_level);
        merge_option_deep(&mut self.server, other.server);
        merge_option_deep(&mut self.github, other.github);
        merge_option_deep(&mut self.publish, other.publish);
        merge_option_deep(&mut self.storage, other.storage);
    }

    pub fn hostname(&self) -> &str {
        self.server
            .as_ref()
            .and_then(|s| s.hostname.as_deref())
            .unwrap_or(DEFAULT_HOSTNAME)
    }

    pub fn port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_PORT)
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.server
            .as_ref()
            .and_then(|s| s.cors.clone())
            .unwrap_or_default()
    }

    pub fn api_base(&self) -> &str {
        self.github
            .as_ref()
            .and_then(|g| g.api_base.as_deref())
            .unwrap_or(DEFAULT_API_BASE)
    }

    pub fn user_agent(&self) -> &str {
        self.github
            .as_ref()
            .and_then(|g| g.user_agent.as_deref())
            .unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.github
            .as_ref()
            .and_then(|g| g.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    pub fn tag(&self) -> &str {
        self.publish
            .as_ref()
            .and_then(|p| p.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    pub fn branch_prefix(&self) -> &str {
        self.publish
            .as_ref()
            .and_then(|p| p.branch_prefix.as_deref())
            .unwrap_or(DEFAULT_BRANCH_PREFIX)
    }

    pub fn probe_prefix(&self) -> &str {
        self.publish
            .as_ref()
            .and_then(|p| p.probe_prefix.as_deref())
            .unwrap_or(DEFAULT_PROBE_PREFIX)
    }

    /// Configured database path, or `<data dir>/prcraft/prcraft.db`.
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = self.storage.as_ref().and_then(|s| s.database.as_deref()) {
            return PathBuf::from(path);
        }
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("prcraft")
            .join("prcraft.db")
    }
}
