use std::env;
use std::fmt;
use std::time::Duration;

const DEFAULT_FROM: &str = "drone@localhost";

/// Prefix of the primary variable names
pub const ENV_PREFIX: &str = "DRONE_";

/// Application configuration loaded from environment variables.
///
/// Every setting is read from its `DRONE_`-prefixed name first (for example
/// `DRONE_EMAIL_SMTP_HOST`), then from the short name (`SMTP_HOST`).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub server: ServerConfig,
    pub smtp: SmtpConfig,
    pub webhook: WebhookConfig,
}

/// HTTP server limits and timeouts
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_body_bytes: usize,
    /// Time allowed for a client to send the request head
    pub read_timeout: Duration,
    /// Keep-alive duration for idle connections
    pub idle_timeout: Duration,
    /// Grace period for open connections on shutdown
    pub shutdown_timeout: Duration,
}

/// SMTP connection and envelope settings shared by every notification
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
}

/// Shared secret used to verify webhook signatures
#[derive(Clone)]
pub struct WebhookConfig {
    pub secret: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: lookup(&["DRONE_SERVER_HOST", "HOST"])
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup(&["DRONE_SERVER_PORT", "PORT"])
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            server: ServerConfig::from_env(),
            smtp: SmtpConfig::from_env()?,
            webhook: WebhookConfig::from_env()?,
        })
    }
}

impl ServerConfig {
    /// Load server limits from environment variables
    pub fn from_env() -> Self {
        Self {
            max_body_bytes: lookup(&["DRONE_SERVER_MAX_BODY_BYTES", "SERVER_MAX_BODY_BYTES"])
                .and_then(|v| v.parse().ok())
                .unwrap_or(1024 * 1024),
            read_timeout: secs_from_env("SERVER_READ_TIMEOUT_SECS", 15),
            idle_timeout: secs_from_env("SERVER_IDLE_TIMEOUT_SECS", 120),
            shutdown_timeout: secs_from_env("SERVER_SHUTDOWN_TIMEOUT_SECS", 15),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
            read_timeout: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(120),
            shutdown_timeout: Duration::from_secs(15),
        }
    }
}

impl SmtpConfig {
    /// Load SMTP settings from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: lookup(&["DRONE_EMAIL_SMTP_HOST", "SMTP_HOST"])
                .unwrap_or_else(|| "localhost".to_string()),
            port: lookup(&["DRONE_EMAIL_SMTP_PORT", "SMTP_PORT"])
                .unwrap_or_else(|| "25".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidSmtpPort)?,
            username: lookup(&["DRONE_EMAIL_SMTP_USERNAME", "SMTP_USERNAME"]),
            password: lookup(&["DRONE_EMAIL_SMTP_PASSWORD", "SMTP_PASSWORD"]),
            from: lookup(&["DRONE_EMAIL_FROM", "EMAIL_FROM"])
                .unwrap_or_else(|| DEFAULT_FROM.to_string()),
            cc: lookup(&["DRONE_EMAIL_CC", "EMAIL_CC"])
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            bcc: lookup(&["DRONE_EMAIL_BCC", "EMAIL_BCC"])
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
        })
    }

    /// Username and password, only when both are non-empty.
    ///
    /// Anything else means the relay is used without authentication.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            username: None,
            password: None,
            from: DEFAULT_FROM.to_string(),
            cc: Vec::new(),
            bcc: Vec::new(),
        }
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from", &self.from)
            .field("cc", &self.cc)
            .field("bcc", &self.bcc)
            .finish()
    }
}

impl WebhookConfig {
    /// Load the webhook secret; it is required and must not be blank
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = lookup(&["DRONE_SECRET", "WEBHOOK_SECRET"])
            .ok_or(ConfigError::MissingWebhookSecret)?;
        if secret.trim().is_empty() {
            return Err(ConfigError::MissingWebhookSecret);
        }
        Ok(Self { secret })
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// First variable in `names` that is set
fn lookup(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| env::var(name).ok())
}

/// Reads `DRONE_<name>` or `<name>` as whole seconds
fn secs_from_env(name: &str, default: u64) -> Duration {
    let prefixed = format!("{}{}", ENV_PREFIX, name);
    Duration::from_secs(
        lookup(&[&prefixed, name])
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

/// Splits a comma-separated list, dropping blank entries
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidSmtpPort,
    MissingWebhookSecret,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "DRONE_SERVER_PORT must be a valid number"),
            ConfigError::InvalidSmtpPort => {
                write!(f, "DRONE_EMAIL_SMTP_PORT must be a valid number")
            }
            ConfigError::MissingWebhookSecret => {
                write!(f, "DRONE_SECRET environment variable is required")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
