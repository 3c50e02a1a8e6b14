use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "parlor.toml",
    "config/parlor.toml",
    "crates/config/parlor.toml",
    "../parlor.toml",
    "../config/parlor.toml",
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub realtime: RealtimeConfig,
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://parlor.db".to_string(),
            max_connections: 10,
        }
    }
}

/// Bearer credential settings shared by the websocket handshake and the REST layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "AuthConfig::default_token_ttl")]
    pub token_ttl_seconds: u64,
}

impl AuthConfig {
    /// Development-only signing secret used when nothing overrides
    /// `auth.jwt_secret`.
    pub const DEFAULT_JWT_SECRET: &'static str = "secret123";

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == Self::DEFAULT_JWT_SECRET
    }

    const fn default_token_ttl() -> u64 {
        30 * 24 * 60 * 60
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: Self::DEFAULT_JWT_SECRET.to_string(),
            token_ttl_seconds: Self::default_token_ttl(),
        }
    }
}

/// Connection lifecycle tuning for the realtime gateway.
///
/// ```
/// use parlor_config::RealtimeConfig;
///
/// let realtime = RealtimeConfig::default();
/// assert_eq!(realtime.keepalive_interval().as_secs(), 30);
/// assert!(realtime.keepalive_timeout() > realtime.keepalive_interval());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub keepalive_interval_seconds: u64,
    pub keepalive_timeout_seconds: u64,
    pub outbound_buffer: usize,
}

impl RealtimeConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_seconds.max(1))
    }

    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_secs(self.keepalive_timeout_seconds.max(1))
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_seconds: 30,
            keepalive_timeout_seconds: 75,
            outbound_buffer: 128,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    pub root: String,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
        }
    }
}

/// Where message notifications are queued for the notification pipeline.
/// Without a `redis_url` publishing is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "NotificationsConfig::default_queue")]
    pub queue: String,
}

impl NotificationsConfig {
    fn default_queue() -> String {
        "message_queue".to_string()
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            queue: Self::default_queue(),
        }
    }
}

fn clamp_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use parlor_config::load;
///
/// std::env::remove_var("PARLOR_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default("auth.jwt_secret", defaults.auth.jwt_secret.clone())?
        .set_default(
            "auth.token_ttl_seconds",
            clamp_to_i64(defaults.auth.token_ttl_seconds),
        )?
        .set_default(
            "realtime.keepalive_interval_seconds",
            clamp_to_i64(defaults.realtime.keepalive_interval_seconds),
        )?
        .set_default(
            "realtime.keepalive_timeout_seconds",
            clamp_to_i64(defaults.realtime.keepalive_timeout_seconds),
        )?
        .set_default(
            "realtime.outbound_buffer",
            clamp_to_i64(defaults.realtime.outbound_buffer as u64),
        )?
        .set_default("uploads.root", defaults.uploads.root.clone())?
        .set_default("notifications.queue", defaults.notifications.queue.clone())?;

    let environment_overrides = config::Environment::with_prefix("PARLOR").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("PARLOR_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via PARLOR_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.realtime.keepalive_timeout_seconds <= config.realtime.keepalive_interval_seconds {
        anyhow::bail!(
            "realtime.keepalive_timeout_seconds ({}) must exceed realtime.keepalive_interval_seconds ({})",
            config.realtime.keepalive_timeout_seconds,
            config.realtime.keepalive_interval_seconds
        );
    }

    if config.realtime.outbound_buffer == 0 {
        anyhow::bail!("realtime.outbound_buffer must be greater than zero");
    }

    if config.auth.jwt_secret.trim().is_empty() {
        anyhow::bail!("auth.jwt_secret must not be empty");
    }

    debug!(http = ?config.http, database = ?config.database, realtime = ?config.realtime, "loaded backend configuration");
    Ok(config)
}
