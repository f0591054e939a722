//! Global configuration parsing, environment overrides, and validation.

use std::env;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::mode::FailureMode;
use crate::models::command::CommandSpec;
use crate::{AppError, Result};

/// Environment variable overriding `listen_ip`.
pub const ENV_LISTEN_IP: &str = "GIT_WEBHOOK_SERVICE_LISTEN_IP";
/// Environment variable overriding `listen_port`.
pub const ENV_LISTEN_PORT: &str = "GIT_WEBHOOK_SERVICE_LISTEN_PORT";
/// Environment variable overriding `repository_path`.
pub const ENV_REPOSITORY_PATH: &str = "GIT_WEBHOOK_REPOSITORY_PATH";

/// Environment file loaded by [`GlobalConfig::load`].
pub const DOTENV_FILE: &str = ".env";

/// External commands run by the rebuild workflow.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CommandsConfig {
    /// Source synchronization command.
    #[serde(default = "default_sync_command")]
    pub sync: CommandSpec,
    /// Static-site generation command.
    #[serde(default = "default_generate_command")]
    pub generate: CommandSpec,
    /// Long-running site server command.
    #[serde(default = "default_serve_command")]
    pub serve: CommandSpec,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            sync: default_sync_command(),
            generate: default_generate_command(),
            serve: default_serve_command(),
        }
    }
}

fn default_sync_command() -> CommandSpec {
    CommandSpec::new("git", ["pull"])
}

fn default_generate_command() -> CommandSpec {
    CommandSpec::new("hugo", Vec::<String>::new())
}

fn default_serve_command() -> CommandSpec {
    CommandSpec::new("hugo", ["server"])
}

/// Site server supervision settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Seconds to wait after SIGTERM before force-killing the server.
    #[serde(default = "default_stop_grace_seconds")]
    pub stop_grace_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            stop_grace_seconds: default_stop_grace_seconds(),
        }
    }
}

fn default_stop_grace_seconds() -> u64 {
    10
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_trigger_path() -> String {
    "/trigger".into()
}

fn default_max_logged_body_bytes() -> usize {
    4096
}

/// Raw file contents before environment overrides are applied.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct FileConfig {
    listen_ip: Option<String>,
    listen_port: Option<toml::Value>,
    repository_path: Option<PathBuf>,
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
    #[serde(default = "default_trigger_path")]
    trigger_path: String,
    #[serde(default)]
    on_failure: FailureMode,
    #[serde(default = "default_max_logged_body_bytes")]
    max_logged_body_bytes: usize,
    #[serde(default)]
    commands: CommandsConfig,
    #[serde(default)]
    server: ServerConfig,
}

/// Global configuration resolved from `config.toml` and the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Address the trigger endpoint binds to.
    pub listen_ip: IpAddr,
    /// Port the trigger endpoint binds to.
    pub listen_port: u16,
    /// Canonical path of the local repository clone.
    pub repository_path: PathBuf,
    /// Generated output directory, relative to the repository.
    pub output_dir: PathBuf,
    /// HTTP path of the webhook trigger.
    pub trigger_path: String,
    /// Host reaction to a failed rebuild.
    pub on_failure: FailureMode,
    /// Maximum number of webhook body bytes echoed into the log.
    pub max_logged_body_bytes: usize,
    /// External commands.
    pub commands: CommandsConfig,
    /// Server supervision settings.
    pub server: ServerConfig,
}

impl GlobalConfig {
    /// Load configuration from an optional TOML file plus process environment.
    ///
    /// A `.env` file in the working directory, if present, is loaded into the
    /// environment first without overriding variables that are already set.
    /// Environment variables take precedence over file values.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `.env` is malformed, the file cannot be
    /// read, contains invalid TOML, or the merged result fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        load_dotenv(Path::new(DOTENV_FILE))?;
        let raw = match path {
            Some(path) => fs::read_to_string(path)
                .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?,
            None => String::new(),
        };
        Self::from_toml_str_with_env(&raw, |key| env::var(key).ok())
    }

    /// Parse configuration from a TOML string without consulting the environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Self::from_toml_str_with_env(raw, |_| None)
    }

    /// Parse configuration from a TOML string, applying overrides from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing fails, a required value is
    /// missing from both sources, or validation fails.
    pub fn from_toml_str_with_env<F>(raw: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file: FileConfig = toml::from_str(raw)?;

        let listen_ip = lookup(ENV_LISTEN_IP)
            .or(file.listen_ip)
            .ok_or_else(|| missing("listen_ip", ENV_LISTEN_IP))?;
        let listen_ip = listen_ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|err| AppError::Config(format!("listen_ip '{listen_ip}' invalid: {err}")))?;

        let listen_port = match lookup(ENV_LISTEN_PORT) {
            Some(value) => value,
            None => match file.listen_port {
                Some(toml::Value::Integer(port)) => port.to_string(),
                Some(toml::Value::String(port)) => port,
                Some(other) => {
                    return Err(AppError::Config(format!(
                        "listen_port must be a number, got {}",
                        other.type_str()
                    )))
                }
                None => return Err(missing("listen_port", ENV_LISTEN_PORT)),
            },
        };
        let listen_port = listen_port.trim().parse::<u16>().map_err(|err| {
            AppError::Config(format!("listen_port '{listen_port}' invalid: {err}"))
        })?;

        let repository_path = lookup(ENV_REPOSITORY_PATH)
            .map(PathBuf::from)
            .or(file.repository_path)
            .ok_or_else(|| missing("repository_path", ENV_REPOSITORY_PATH))?;

        let mut config = Self {
            listen_ip,
            listen_port,
            repository_path,
            output_dir: file.output_dir,
            trigger_path: file.trigger_path,
            on_failure: file.on_failure,
            max_logged_body_bytes: file.max_logged_body_bytes,
            commands: file.commands,
            server: file.server,
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace the repository path and re-validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the path is not an existing directory.
    pub fn set_repository_path(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        self.repository_path = canonical_repository(&path.into())?;
        Ok(())
    }

    /// Socket address for the HTTP listener.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_ip, self.listen_port)
    }

    /// Absolute path of the generated output directory.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.repository_path.join(&self.output_dir)
    }

    /// Grace period granted to the server between SIGTERM and SIGKILL.
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.server.stop_grace_seconds)
    }

    fn validate(&mut self) -> Result<()> {
        self.repository_path = canonical_repository(&self.repository_path)?;
        self.output_dir = validate_output_dir(&self.output_dir)?;

        if !self.trigger_path.starts_with('/') || self.trigger_path == "/health" {
            return Err(AppError::Config(format!(
                "trigger_path '{}' must start with '/' and must not shadow /health",
                self.trigger_path
            )));
        }

        Ok(())
    }
}

/// Load `KEY=value` pairs from `path` into the process environment.
///
/// Variables that are already set keep their values. Returns `false` when the
/// file does not exist.
///
/// # Errors
///
/// Returns `AppError::Config` if the file exists but cannot be read or parsed.
pub fn load_dotenv(path: &Path) -> Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => {
            debug!(path = %path.display(), "loaded environment file");
            Ok(true)
        }
        Err(err) if err.not_found() => Ok(false),
        Err(err) => Err(AppError::Config(format!(
            "failed to load {}: {err}",
            path.display()
        ))),
    }
}

fn missing(key: &str, env_key: &str) -> AppError {
    AppError::Config(format!(
        "{key} not set in config file or {env_key} env var"
    ))
}

fn canonical_repository(path: &Path) -> Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .map_err(|err| AppError::Config(format!("repository_path invalid: {err}")))?;
    if !canonical.is_dir() {
        return Err(AppError::Config(format!(
            "repository_path {} is not a directory",
            canonical.display()
        )));
    }
    Ok(canonical)
}

/// Normalize `output_dir`, rejecting anything that would resolve outside
/// the repository or to the repository root itself.
fn validate_output_dir(output_dir: &Path) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in output_dir.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(AppError::Config(
                    "output_dir must not contain '..'".into(),
                ))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::Config(
                    "output_dir must be relative to repository_path".into(),
                ))
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(AppError::Config(
            "output_dir must name a subdirectory of repository_path".into(),
        ));
    }

    Ok(normalized)
}
