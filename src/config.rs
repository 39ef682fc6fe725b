//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keyring service name under which agent secrets are stored.
pub const KEYRING_SERVICE: &str = "mc-warden";

/// Keyring entry and env var holding the RCON password.
pub const RCON_PASSWORD_KEYS: (&str, &str) = ("rcon_password", "MC_WARDEN_RCON_PASSWORD");

/// Keyring entry and env var holding the token signing secret.
pub const TOKEN_SECRET_KEYS: (&str, &str) = ("token_secret", "MC_WARDEN_TOKEN_SECRET");

/// Worker launch settings used when no start script is present.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LaunchConfig {
    /// Java binary used to launch a server jar.
    #[serde(default = "default_java")]
    pub java: String,
    /// Initial heap size passed as `-Xms`.
    #[serde(default = "default_min_memory")]
    pub min_memory: String,
    /// Maximum heap size passed as `-Xmx`.
    #[serde(default = "default_max_memory")]
    pub max_memory: String,
    /// Extra JVM flags inserted before `-jar`.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            java: default_java(),
            min_memory: default_min_memory(),
            max_memory: default_max_memory(),
            extra_args: Vec::new(),
        }
    }
}

fn default_java() -> String {
    "java".into()
}

fn default_min_memory() -> String {
    "1G".into()
}

fn default_max_memory() -> String {
    "2G".into()
}

/// RCON connection settings.
///
/// The password is loaded at runtime via OS keychain or environment
/// variable, never from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RconConfig {
    /// RCON host.
    #[serde(default = "default_rcon_host")]
    pub host: String,
    /// RCON TCP port.
    #[serde(default = "default_rcon_port")]
    pub port: u16,
    /// RCON password (populated at runtime).
    #[serde(skip)]
    pub password: String,
    /// Handshake timeout.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Maximum wait for a command reply.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
    /// First reconnect delay.
    #[serde(default = "default_backoff_floor")]
    pub reconnect_floor_ms: u64,
    /// Reconnect delay ceiling.
    #[serde(default = "default_backoff_ceiling")]
    pub reconnect_ceiling_ms: u64,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: default_rcon_host(),
            port: default_rcon_port(),
            password: String::new(),
            connect_timeout_seconds: default_connect_timeout(),
            command_timeout_seconds: default_command_timeout(),
            reconnect_floor_ms: default_backoff_floor(),
            reconnect_ceiling_ms: default_backoff_ceiling(),
        }
    }
}

fn default_rcon_host() -> String {
    "127.0.0.1".into()
}

fn default_rcon_port() -> u16 {
    25575
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_command_timeout() -> u64 {
    10
}

fn default_backoff_floor() -> u64 {
    1000
}

fn default_backoff_ceiling() -> u64 {
    30_000
}

/// Graceful-stop timing for the process supervisor.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SupervisorConfig {
    /// Delay between `save-all` and `stop`.
    #[serde(default = "default_flush_delay")]
    pub flush_delay_ms: u64,
    /// Liveness poll interval while waiting for exit.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Bound on the liveness poll before escalating to SIGKILL.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_seconds: u64,
    /// Pause between stop and start during a restart.
    #[serde(default = "default_restart_delay")]
    pub restart_delay_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            flush_delay_ms: default_flush_delay(),
            poll_interval_ms: default_poll_interval(),
            stop_timeout_seconds: default_stop_timeout(),
            restart_delay_ms: default_restart_delay(),
        }
    }
}

fn default_flush_delay() -> u64 {
    3000
}

fn default_poll_interval() -> u64 {
    500
}

fn default_stop_timeout() -> u64 {
    30
}

fn default_restart_delay() -> u64 {
    2000
}

/// Log ring buffer and push channel settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LogConfig {
    /// Ring buffer capacity.
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
    /// Hard maximum for history queries.
    #[serde(default = "default_history_max")]
    pub history_max: usize,
    /// Idle heartbeat interval on the live-push channel.
    #[serde(default = "default_heartbeat")]
    pub heartbeat_seconds: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: default_log_capacity(),
            history_max: default_history_max(),
            heartbeat_seconds: default_heartbeat(),
        }
    }
}

fn default_log_capacity() -> usize {
    1000
}

fn default_history_max() -> usize {
    500
}

fn default_heartbeat() -> u64 {
    15
}

/// Backup storage settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackupConfig {
    /// Storage quota reported alongside usage.
    #[serde(default = "default_quota")]
    pub quota_bytes: u64,
    /// Root-relative directories archived by a data-only backup.
    #[serde(default = "default_data_dirs")]
    pub data_dirs: Vec<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            quota_bytes: default_quota(),
            data_dirs: default_data_dirs(),
        }
    }
}

fn default_quota() -> u64 {
    10 * 1024 * 1024 * 1024
}

fn default_data_dirs() -> Vec<String> {
    vec!["world".into(), "world_nether".into(), "world_the_end".into()]
}

/// Sandboxed file access settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct FilesConfig {
    /// Largest file `read_file` will load.
    #[serde(default = "default_max_read")]
    pub max_read_bytes: u64,
    /// File names denied in addition to the built-in list.
    #[serde(default)]
    pub extra_denied_files: Vec<String>,
    /// Directory names denied in addition to the built-in list.
    #[serde(default)]
    pub extra_denied_dirs: Vec<String>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_read_bytes: default_max_read(),
            extra_denied_files: Vec::new(),
            extra_denied_dirs: Vec::new(),
        }
    }
}

fn default_max_read() -> u64 {
    5 * 1024 * 1024
}

/// Token settings for the HTTP API.
///
/// The signing secret is loaded at runtime via OS keychain or environment
/// variable.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AuthConfig {
    /// Lifetime of tokens minted by `mc-warden-ctl token`.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,
    /// HMAC signing secret (populated at runtime).
    #[serde(skip)]
    pub token_secret: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_seconds: default_token_ttl(),
            token_secret: String::new(),
        }
    }
}

fn default_token_ttl() -> u64 {
    300
}

fn default_http_bind() -> String {
    "127.0.0.1".into()
}

fn default_http_port() -> u16 {
    8765
}

/// Global configuration parsed from `mc-warden.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory holding the supervised server (the sandbox root).
    pub server_root: PathBuf,
    /// Agent state directory: database and backup archives.
    pub state_dir: PathBuf,
    /// HTTP bind address.
    #[serde(default = "default_http_bind")]
    pub http_bind: String,
    /// HTTP port.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Launch settings.
    #[serde(default)]
    pub launch: LaunchConfig,
    /// RCON settings.
    #[serde(default)]
    pub rcon: RconConfig,
    /// Stop/restart timing.
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Log buffer settings.
    #[serde(default)]
    pub logs: LogConfig,
    /// Backup settings.
    #[serde(default)]
    pub backups: BackupConfig,
    /// File access settings.
    #[serde(default)]
    pub files: FilesConfig,
    /// Token settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the RCON password and token secret from OS keychain with
    /// env-var fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env vars provide
    /// a required secret.
    pub async fn load_credentials(&mut self) -> Result<()> {
        let (keyring_key, env_key) = RCON_PASSWORD_KEYS;
        self.rcon.password = load_credential(keyring_key, env_key).await?;
        let (keyring_key, env_key) = TOKEN_SECRET_KEYS;
        self.auth.token_secret = load_credential(keyring_key, env_key).await?;
        Ok(())
    }

    /// Path of the `SQLite` database file.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.state_dir.join("warden.db")
    }

    /// Directory holding backup archives.
    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.state_dir.join("backups")
    }

    /// Replace the server root, re-running path validation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the new root is invalid.
    pub fn override_server_root(&mut self, root: impl AsRef<Path>) -> Result<()> {
        self.server_root = root.as_ref().to_path_buf();
        self.validate()
    }

    fn validate(&mut self) -> Result<()> {
        if self.logs.capacity == 0 {
            return Err(AppError::Config("logs.capacity must be greater than zero".into()));
        }

        if self.logs.history_max == 0 {
            return Err(AppError::Config(
                "logs.history_max must be greater than zero".into(),
            ));
        }

        if self.rcon.reconnect_floor_ms == 0
            || self.rcon.reconnect_ceiling_ms < self.rcon.reconnect_floor_ms
        {
            return Err(AppError::Config(
                "rcon reconnect floor must be non-zero and not exceed the ceiling".into(),
            ));
        }

        let canonical_root = self
            .server_root
            .canonicalize()
            .map_err(|err| AppError::Config(format!("server_root invalid: {err}")))?;
        self.server_root = canonical_root;

        fs::create_dir_all(&self.state_dir)
            .map_err(|err| AppError::Config(format!("cannot create state_dir: {err}")))?;
        let canonical_state = self
            .state_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("state_dir invalid: {err}")))?;

        // Full backups archive the whole root, so archives must live outside it.
        if canonical_state.starts_with(&self.server_root) {
            return Err(AppError::Config(
                "state_dir must not be inside server_root".into(),
            ));
        }
        self.state_dir = canonical_state;

        Ok(())
    }
}

impl LaunchConfig {
    /// Default JVM flags for a jar launch.
    #[must_use]
    pub fn memory_flags(&self) -> Vec<String> {
        vec![
            format!("-Xms{}", self.min_memory),
            format!("-Xmx{}", self.max_memory),
        ]
    }
}

impl RconConfig {
    /// Handshake timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Command reply timeout as a [`Duration`].
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }
}

impl SupervisorConfig {
    /// Delay between the save and stop commands.
    #[must_use]
    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    /// Interval between liveness checks.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Bound on the graceful-stop wait.
    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_seconds)
    }

    /// Pause between stop and start.
    #[must_use]
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

/// Load a single credential from OS keychain with env-var fallback.
///
/// # Errors
///
/// Returns `AppError::Config` if neither source provides a value.
pub async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    env::var(env_key)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            AppError::Config(format!(
                "credential {keyring_key} not found in keychain service \
                 {KEYRING_SERVICE} or {env_key} env var"
            ))
        })
}
