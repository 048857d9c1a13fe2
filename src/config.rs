//! Configuration management.
//!
//! Handles loading, parsing, and validating the `forumsync.toml`
//! configuration file. Environment variables prefixed with `FORUMSYNC_`
//! override file-sourced values; the database password must be present from
//! one of the two sources or startup fails.

use crate::cli::{Cli, Commands};
use anyhow::{Context, Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use url::Url;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config file parsing error")]
    Toml(#[from] toml::de::Error),

    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Default values for serde deserialization
pub mod config_defaults {
    pub mod db {
        pub fn host() -> String {
            "127.0.0.1".into()
        }
        pub fn port() -> u16 {
            3306
        }
        pub fn user() -> String {
            "mybb".into()
        }
        pub fn database() -> String {
            "mybb".into()
        }
        pub fn prefix() -> String {
            "mybb_".into()
        }
        pub fn pool_size() -> u32 {
            5
        }
        pub fn connect_timeout_s() -> u64 {
            10
        }
    }

    pub mod sync {
        use std::path::PathBuf;

        pub fn root() -> PathBuf {
            "sync".into()
        }
        pub fn debounce_ms() -> u64 {
            500
        }
        pub fn max_file_bytes() -> u64 {
            2 * 1024 * 1024
        }
    }

    pub mod forum {
        use std::path::PathBuf;

        pub fn url() -> String {
            "http://127.0.0.1".into()
        }
        pub fn root() -> PathBuf {
            "forum".into()
        }
    }

    pub mod bridge {
        use std::path::PathBuf;

        pub fn php_binary() -> String {
            "php".into()
        }
        pub fn script() -> PathBuf {
            "bridge.php".into()
        }
        pub fn timeout_s() -> u64 {
            30
        }
    }
}

/// `[db]` section in forumsync.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct DbConfig {
    /// Database host
    #[serde(default = "config_defaults::db::host")]
    #[educe(Default = config_defaults::db::host())]
    pub host: String,

    /// Database port
    #[serde(default = "config_defaults::db::port")]
    #[educe(Default = config_defaults::db::port())]
    pub port: u16,

    /// Database user
    #[serde(default = "config_defaults::db::user")]
    #[educe(Default = config_defaults::db::user())]
    pub user: String,

    /// Database password.
    /// WARNING: prefer `FORUMSYNC_DB_PASSWORD` over committing this to disk.
    #[serde(default)]
    pub password: String,

    /// Database name
    #[serde(default = "config_defaults::db::database")]
    #[educe(Default = config_defaults::db::database())]
    pub database: String,

    /// Table name prefix, e.g.: "mybb_"
    #[serde(default = "config_defaults::db::prefix")]
    #[educe(Default = config_defaults::db::prefix())]
    pub prefix: String,

    /// Connection pool size
    #[serde(default = "config_defaults::db::pool_size")]
    #[educe(Default = config_defaults::db::pool_size())]
    pub pool_size: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "config_defaults::db::connect_timeout_s")]
    #[educe(Default = config_defaults::db::connect_timeout_s())]
    pub connect_timeout_s: u64,
}

/// `[sync]` section in forumsync.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Root of the on-disk mirror; watcher scope and router base
    #[serde(default = "config_defaults::sync::root")]
    #[educe(Default = config_defaults::sync::root())]
    pub root: PathBuf,

    /// Debounce window for the file watcher, in milliseconds
    #[serde(default = "config_defaults::sync::debounce_ms")]
    #[educe(Default = config_defaults::sync::debounce_ms())]
    pub debounce_ms: u64,

    /// Upper bound on a single file import; larger files are rejected
    #[serde(default = "config_defaults::sync::max_file_bytes")]
    #[educe(Default = config_defaults::sync::max_file_bytes())]
    pub max_file_bytes: u64,
}

impl SyncConfig {
    /// Debounce window as a `Duration`
    pub const fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// `[forum]` section in forumsync.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct ForumConfig {
    /// Base URL of the running forum, e.g.: "http://localhost:8080"
    #[serde(default = "config_defaults::forum::url")]
    #[educe(Default = config_defaults::forum::url())]
    pub url: String,

    /// Filesystem root of the forum installation (bridge working directory)
    #[serde(default = "config_defaults::forum::root")]
    #[educe(Default = config_defaults::forum::root())]
    pub root: PathBuf,

    /// Optional token forwarded to the cache refresh endpoint
    #[serde(default)]
    pub token: Option<String>,
}

/// `[bridge]` section in forumsync.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// PHP interpreter used to run the bridge script
    #[serde(default = "config_defaults::bridge::php_binary")]
    #[educe(Default = config_defaults::bridge::php_binary())]
    pub php_binary: String,

    /// Bridge script path (relative paths resolve against the forum root)
    #[serde(default = "config_defaults::bridge::script")]
    #[educe(Default = config_defaults::bridge::script())]
    pub script: PathBuf,

    /// Subprocess timeout in seconds
    #[serde(default = "config_defaults::bridge::timeout_s")]
    #[educe(Default = config_defaults::bridge::timeout_s())]
    pub timeout_s: u64,
}

impl BridgeConfig {
    /// Subprocess timeout as a `Duration`
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_s)
    }
}

/// Root configuration structure representing forumsync.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Database gateway settings
    pub db: DbConfig,

    /// Disk mirror and watcher settings
    pub sync: SyncConfig,

    /// Running forum instance settings
    pub forum: ForumConfig,

    /// Plugin lifecycle bridge settings
    pub bridge: BridgeConfig,
}

impl Config {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Load configuration for a CLI invocation.
    ///
    /// Reads the config file named by the CLI, applies environment
    /// overrides, absolutizes paths, and validates for the selected command.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = if cli.config.exists() {
            Self::from_path(&cli.config)?
        } else {
            Self::default()
        };

        config.apply_env();
        config.absolutize_paths();
        config.validate(&cli.command)?;
        Ok(config)
    }

    /// Apply `FORUMSYNC_*` environment overrides.
    ///
    /// Environment-sourced values win over file-sourced defaults.
    pub fn apply_env(&mut self) {
        Self::override_string(&mut self.db.host, "FORUMSYNC_DB_HOST");
        Self::override_parsed(&mut self.db.port, "FORUMSYNC_DB_PORT");
        Self::override_string(&mut self.db.user, "FORUMSYNC_DB_USER");
        Self::override_string(&mut self.db.password, "FORUMSYNC_DB_PASSWORD");
        Self::override_string(&mut self.db.database, "FORUMSYNC_DB_DATABASE");
        Self::override_string(&mut self.db.prefix, "FORUMSYNC_DB_PREFIX");

        Self::override_path(&mut self.sync.root, "FORUMSYNC_SYNC_ROOT");
        Self::override_parsed(&mut self.sync.debounce_ms, "FORUMSYNC_SYNC_DEBOUNCE_MS");

        Self::override_string(&mut self.forum.url, "FORUMSYNC_FORUM_URL");
        Self::override_path(&mut self.forum.root, "FORUMSYNC_FORUM_ROOT");
        if let Ok(token) = env::var("FORUMSYNC_FORUM_TOKEN") {
            self.forum.token = Some(token);
        }

        Self::override_string(&mut self.bridge.php_binary, "FORUMSYNC_BRIDGE_PHP");
        Self::override_path(&mut self.bridge.script, "FORUMSYNC_BRIDGE_SCRIPT");
    }

    fn override_string(target: &mut String, var: &str) {
        if let Ok(value) = env::var(var)
            && !value.is_empty()
        {
            *target = value;
        }
    }

    fn override_path(target: &mut PathBuf, var: &str) {
        if let Ok(value) = env::var(var)
            && !value.is_empty()
        {
            *target = PathBuf::from(value);
        }
    }

    fn override_parsed<T: std::str::FromStr>(target: &mut T, var: &str) {
        if let Ok(value) = env::var(var)
            && let Ok(parsed) = value.parse()
        {
            *target = parsed;
        }
    }

    /// Expand `~` and make configured paths absolute against the
    /// current working directory (forum root for the bridge script).
    fn absolutize_paths(&mut self) {
        self.sync.root = Self::expand(&self.sync.root);
        self.forum.root = Self::expand(&self.forum.root);

        let script = Self::tilde(&self.bridge.script);
        self.bridge.script = if script.is_relative() {
            self.forum.root.join(script)
        } else {
            script
        };
    }

    fn tilde(path: &Path) -> PathBuf {
        path.to_str()
            .map(|s| shellexpand::tilde(s).into_owned())
            .map_or_else(|| path.to_path_buf(), PathBuf::from)
    }

    fn expand(path: &Path) -> PathBuf {
        let expanded = Self::tilde(path);
        if expanded.is_relative() {
            env::current_dir().map(|cwd| cwd.join(&expanded)).unwrap_or(expanded)
        } else {
            expanded
        }
    }

    /// Validate configuration for the current command
    pub fn validate(&self, command: &Commands) -> Result<()> {
        if self.db.password.is_empty() {
            bail!(ConfigError::Validation(
                "[db.password] is required (set FORUMSYNC_DB_PASSWORD or [db].password)".into()
            ));
        }

        let url = Url::parse(&self.forum.url).map_err(|err| {
            ConfigError::Validation(format!("[forum.url] is not a valid URL: {err}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!(ConfigError::Validation(
                "[forum.url] must start with http:// or https://".into()
            ));
        }

        if self.sync.debounce_ms == 0 {
            bail!(ConfigError::Validation("[sync.debounce_ms] must be non-zero".into()));
        }
        if self.sync.max_file_bytes == 0 {
            bail!(ConfigError::Validation("[sync.max_file_bytes] must be non-zero".into()));
        }

        // The bridge is only exercised by plugin/theme commands; everything
        // else should start even on hosts without a PHP toolchain.
        if matches!(command, Commands::Plugin { .. } | Commands::Theme { .. }) {
            which::which(&self.bridge.php_binary).with_context(|| {
                format!("`{}` not found. Please install it first.", self.bridge.php_binary)
            })?;

            if !self.bridge.script.is_file() {
                bail!(ConfigError::Validation(format!(
                    "[bridge.script] not found: {}",
                    self.bridge.script.display()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_defaults() {
        let config = Config::from_str("").unwrap();

        assert_eq!(config.db.host, "127.0.0.1");
        assert_eq!(config.db.port, 3306);
        assert_eq!(config.db.user, "mybb");
        assert_eq!(config.db.prefix, "mybb_");
        assert!(config.db.password.is_empty());
    }

    #[test]
    fn test_sync_config_defaults() {
        let config = Config::from_str("").unwrap();

        assert_eq!(config.sync.root, PathBuf::from("sync"));
        assert_eq!(config.sync.debounce_ms, 500);
        assert_eq!(config.sync.max_file_bytes, 2 * 1024 * 1024);
        assert_eq!(config.sync.debounce_window(), Duration::from_millis(500));
    }

    #[test]
    fn test_bridge_config_defaults() {
        let config = Config::from_str("").unwrap();

        assert_eq!(config.bridge.php_binary, "php");
        assert_eq!(config.bridge.timeout_s, 30);
        assert_eq!(config.bridge.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_full_config_parsing() {
        let config = r#"
            [db]
            host = "db.internal"
            port = 3307
            user = "forum"
            password = "hunter2"
            database = "forum"
            prefix = "fs_"

            [sync]
            root = "/srv/forum-sync"
            debounce_ms = 250
            max_file_bytes = 1048576

            [forum]
            url = "https://forum.example.com"
            root = "/var/www/forum"
            token = "sekrit"

            [bridge]
            php_binary = "php8.3"
            script = "tools/bridge.php"
            timeout_s = 60
        "#;
        let config = Config::from_str(config).unwrap();

        assert_eq!(config.db.host, "db.internal");
        assert_eq!(config.db.port, 3307);
        assert_eq!(config.db.prefix, "fs_");
        assert_eq!(config.sync.root, PathBuf::from("/srv/forum-sync"));
        assert_eq!(config.sync.debounce_ms, 250);
        assert_eq!(config.forum.url, "https://forum.example.com");
        assert_eq!(config.forum.token.as_deref(), Some("sekrit"));
        assert_eq!(config.bridge.php_binary, "php8.3");
        assert_eq!(config.bridge.timeout_s, 60);
    }

    #[test]
    fn test_unknown_field_rejection_in_db() {
        let config = r#"
            [db]
            unknown_field = "should_fail"
        "#;
        let result: std::result::Result<Config, _> = toml::from_str(config);

        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_field_rejection_in_sync() {
        let config = r#"
            [sync]
            unknown_field = "should_fail"
        "#;
        let result: std::result::Result<Config, _> = toml::from_str(config);

        assert!(result.is_err());
    }

    #[test]
    fn test_missing_password_fails_validation() {
        let config = Config::from_str("").unwrap();
        let result = config.validate(&Commands::Status);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("password"));
    }

    #[test]
    fn test_invalid_forum_url_fails_validation() {
        let mut config = Config::from_str("").unwrap();
        config.db.password = "x".into();
        config.forum.url = "ftp://forum.example.com".into();

        let result = config.validate(&Commands::Status);
        assert!(result.is_err());
    }

    #[test]
    fn test_valid_config_passes_validation() {
        let mut config = Config::from_str("").unwrap();
        config.db.password = "x".into();
        config.forum.url = "http://localhost:8080".into();

        assert!(config.validate(&Commands::Status).is_ok());
    }

    #[test]
    fn test_env_override_wins() {
        // Serialized write: env vars are process-global
        let mut config = Config::from_str("[db]\npassword = \"from-file\"").unwrap();
        unsafe {
            env::set_var("FORUMSYNC_DB_PASSWORD", "from-env");
        }
        config.apply_env();
        unsafe {
            env::remove_var("FORUMSYNC_DB_PASSWORD");
        }

        assert_eq!(config.db.password, "from-env");
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let invalid_config = r#"
            [db
            host = "x"
        "#;
        let result = Config::from_str(invalid_config);

        assert!(result.is_err());
    }
}
