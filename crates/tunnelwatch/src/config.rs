use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fmt, fs};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::DEFAULT_TEST_URL;
use crate::validation::{validate_check_interval, validate_http_url, validate_timeout};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config directory available (neither XDG_CONFIG_HOME nor HOME is set)")]
    ConfigPathUnavailable,
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub checks: ChecksConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    pub interval_seconds: u64,
    pub tcp_timeout_seconds: u64,
    pub udp_timeout_seconds: u64,
    pub test_url: String,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            tcp_timeout_seconds: 5,
            udp_timeout_seconds: 3,
            test_url: DEFAULT_TEST_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("./data") }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Bearer token regional agents must present
    pub agent_token: Option<String>,
    /// Refuse to start without `agent_token`
    pub require_token: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 8080, agent_token: None, require_token: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub region: String,
    /// Base URL of the central server
    pub server: String,
    pub token: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { region: "iran".into(), server: "http://127.0.0.1:8080".into(), token: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Endpoint receiving `{user_id, text}` for every notification
    pub webhook_url: Option<String>,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &Path) -> PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/tunnelwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<PathBuf, ConfigError> {
    let path = if let Some(config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(config_home)
    } else if let Some(home_dir) = env::var_os("HOME") {
        PathBuf::from(home_dir).join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("tunnelwatch/config.toml"))
}

/// Parse an environment variable, ignoring (with a warning) values that do not parse
fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", name, raw);
            None
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn display_secret(value: &Option<String>) -> &'static str {
    if value.is_some() { "(set)" } else { "(none)" }
}

fn display_optional(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("(none)")
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Configuration:")?;
        write_title_1(f, "Checks")?;
        write_1(f, "Interval (s)", &self.checks.interval_seconds)?;
        write_1(f, "TCP Timeout (s)", &self.checks.tcp_timeout_seconds)?;
        write_1(f, "UDP Timeout (s)", &self.checks.udp_timeout_seconds)?;
        write_1(f, "Test URL", &self.checks.test_url)?;
        write_title_1(f, "Storage")?;
        write_1(f, "Directory", &self.storage.dir.display())?;
        write_title_1(f, "Server")?;
        write_1(f, "Bind Address", &self.server.bind)?;
        write_1(f, "Port", &self.server.port)?;
        write_1(f, "Agent Token", &display_secret(&self.server.agent_token))?;
        write_1(f, "Require Token", &self.server.require_token)?;
        write_title_1(f, "Agent")?;
        write_1(f, "Region", &self.agent.region)?;
        write_1(f, "Server", &self.agent.server)?;
        write_1(f, "Token", &display_secret(&self.agent.token))?;
        write_title_1(f, "Notify")?;
        write_1(f, "Webhook URL", &display_optional(&self.notify.webhook_url))?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/tunnelwatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,no_run
    /// use std::path::Path;
    /// use tunnelwatch::Config;
    ///
    /// let cfg = Config::from_config(None::<&Path>).unwrap();
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<Path>>) -> Result<Self, ConfigError> {
        let config_path: PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())
                .map_err(|source| ConfigError::ParseFailed { path: config_path, source })
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// File configuration, then `.env` and environment overrides, then validation
    pub fn load(optional_path: Option<impl AsRef<Path>>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Self::from_config(optional_path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides on top of the file values
    pub fn apply_env(&mut self) {
        if let Some(interval) = env_parse("CHECK_INTERVAL_SECONDS") {
            self.checks.interval_seconds = interval;
        }
        if let Some(url) = env_string("TEST_URL") {
            self.checks.test_url = url;
        }
        if let Some(dir) = env_string("STORAGE_DIR") {
            self.storage.dir = PathBuf::from(dir);
        }
        if let Some(token) = env_string("AGENT_TOKEN") {
            self.server.agent_token = Some(token.clone());
            self.agent.token = Some(token);
        }
        if let Some(region) = env_string("AGENT_REGION") {
            self.agent.region = region;
        }
        if let Some(server) = env_string("AGENT_SERVER") {
            self.agent.server = server;
        }
        if let Some(webhook) = env_string("NOTIFY_WEBHOOK_URL") {
            self.notify.webhook_url = Some(webhook);
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |e: anyhow::Error| ConfigError::Invalid(e.to_string());

        validate_check_interval(self.checks.interval_seconds).map_err(invalid)?;
        validate_timeout(self.checks.tcp_timeout_seconds).map_err(invalid)?;
        validate_timeout(self.checks.udp_timeout_seconds).map_err(invalid)?;
        validate_http_url(&self.checks.test_url).map_err(invalid)?;

        if self.server.require_token && self.server.agent_token.is_none() {
            return Err(ConfigError::Invalid(
                "server.require_token is set but no agent token is configured".into(),
            ));
        }

        if self.agent.region.trim().is_empty() {
            return Err(ConfigError::Invalid("agent.region must not be empty".into()));
        }

        Ok(())
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }
}
