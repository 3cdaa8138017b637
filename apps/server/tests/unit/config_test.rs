//! Unit tests for configuration parsing
//!
//! Tests environment variable parsing and default values.
//!
//! Note: These tests modify global environment variables and must run serially.

use std::time::Duration;

use buildmail::config::{parse_list, Config, ConfigError, ServerConfig, SmtpConfig, WebhookConfig};
use pretty_assertions::assert_eq;
use serial_test::serial;

const SMTP_VARS: &[&str] = &[
    "DRONE_EMAIL_SMTP_HOST",
    "DRONE_EMAIL_SMTP_PORT",
    "DRONE_EMAIL_SMTP_USERNAME",
    "DRONE_EMAIL_SMTP_PASSWORD",
    "DRONE_EMAIL_FROM",
    "DRONE_EMAIL_CC",
    "DRONE_EMAIL_BCC",
    "SMTP_HOST",
    "SMTP_PORT",
    "SMTP_USERNAME",
    "SMTP_PASSWORD",
    "EMAIL_FROM",
    "EMAIL_CC",
    "EMAIL_BCC",
];

const SERVER_VARS: &[&str] = &[
    "DRONE_SERVER_HOST",
    "DRONE_SERVER_PORT",
    "DRONE_SERVER_MAX_BODY_BYTES",
    "DRONE_SERVER_READ_TIMEOUT_SECS",
    "DRONE_SERVER_IDLE_TIMEOUT_SECS",
    "DRONE_SERVER_SHUTDOWN_TIMEOUT_SECS",
    "HOST",
    "PORT",
    "SERVER_MAX_BODY_BYTES",
    "SERVER_READ_TIMEOUT_SECS",
    "SERVER_IDLE_TIMEOUT_SECS",
    "SERVER_SHUTDOWN_TIMEOUT_SECS",
];

const SECRET_VARS: &[&str] = &["DRONE_SECRET", "WEBHOOK_SECRET"];

fn clear(vars: &[&str]) {
    for var in vars {
        std::env::remove_var(var);
    }
}

// =============================================================================
// SMTP Config Tests
// =============================================================================

#[test]
#[serial]
fn test_smtp_config_defaults() {
    clear(SMTP_VARS);

    let config = SmtpConfig::from_env().unwrap();

    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 25);
    assert_eq!(config.from, "drone@localhost");
    assert!(config.cc.is_empty());
    assert!(config.bcc.is_empty());
    assert!(config.credentials().is_none());
}

#[test]
#[serial]
fn test_smtp_config_drone_names() {
    clear(SMTP_VARS);
    std::env::set_var("DRONE_EMAIL_SMTP_HOST", "smtp.example.com");
    std::env::set_var("DRONE_EMAIL_SMTP_PORT", "587");
    std::env::set_var("DRONE_EMAIL_SMTP_USERNAME", "mailer");
    std::env::set_var("DRONE_EMAIL_SMTP_PASSWORD", "hunter2");
    std::env::set_var("DRONE_EMAIL_FROM", "CI <ci@example.com>");
    std::env::set_var("DRONE_EMAIL_CC", "a@example.com, b@example.com");
    std::env::set_var("DRONE_EMAIL_BCC", "audit@example.com");

    let config = SmtpConfig::from_env().unwrap();

    assert_eq!(config.host, "smtp.example.com");
    assert_eq!(config.port, 587);
    assert_eq!(config.credentials(), Some(("mailer", "hunter2")));
    assert_eq!(config.from, "CI <ci@example.com>");
    assert_eq!(config.cc, vec!["a@example.com", "b@example.com"]);
    assert_eq!(config.bcc, vec!["audit@example.com"]);

    clear(SMTP_VARS);
}

#[test]
#[serial]
fn test_smtp_config_short_names() {
    clear(SMTP_VARS);
    std::env::set_var("SMTP_HOST", "relay.internal");
    std::env::set_var("SMTP_PORT", "2525");
    std::env::set_var("EMAIL_CC", "lead@example.com");

    let config = SmtpConfig::from_env().unwrap();

    assert_eq!(config.host, "relay.internal");
    assert_eq!(config.port, 2525);
    assert_eq!(config.cc, vec!["lead@example.com"]);

    clear(SMTP_VARS);
}

#[test]
#[serial]
fn test_drone_names_take_precedence() {
    clear(SMTP_VARS);
    std::env::set_var("DRONE_EMAIL_SMTP_HOST", "smtp.example.com");
    std::env::set_var("SMTP_HOST", "relay.internal");
    std::env::set_var("DRONE_EMAIL_FROM", "drone@example.com");
    std::env::set_var("EMAIL_FROM", "other@example.com");

    let config = SmtpConfig::from_env().unwrap();

    assert_eq!(config.host, "smtp.example.com");
    assert_eq!(config.from, "drone@example.com");

    clear(SMTP_VARS);
}

#[test]
#[serial]
fn test_smtp_config_invalid_port() {
    clear(SMTP_VARS);
    std::env::set_var("DRONE_EMAIL_SMTP_PORT", "not-a-port");

    assert!(matches!(
        SmtpConfig::from_env(),
        Err(ConfigError::InvalidSmtpPort)
    ));

    clear(SMTP_VARS);
}

#[test]
fn test_credentials_require_both_values() {
    let config = SmtpConfig {
        username: Some("mailer".to_string()),
        password: Some(String::new()),
        ..SmtpConfig::default()
    };
    assert!(config.credentials().is_none());
}

#[test]
fn test_smtp_debug_redacts_password() {
    let config = SmtpConfig {
        password: Some("hunter2".to_string()),
        ..SmtpConfig::default()
    };
    let debug = format!("{:?}", config);
    assert!(!debug.contains("hunter2"));
    assert!(debug.contains("<redacted>"));
}

#[test]
fn test_parse_list_drops_blanks() {
    assert_eq!(parse_list(" a@x.com ,, b@x.com ,"), vec!["a@x.com", "b@x.com"]);
    assert!(parse_list("").is_empty());
}

// =============================================================================
// Webhook / Server Config Tests
// =============================================================================

#[test]
#[serial]
fn test_webhook_secret_required() {
    clear(SECRET_VARS);
    assert!(matches!(
        WebhookConfig::from_env(),
        Err(ConfigError::MissingWebhookSecret)
    ));

    std::env::set_var("DRONE_SECRET", "   ");
    assert!(matches!(
        WebhookConfig::from_env(),
        Err(ConfigError::MissingWebhookSecret)
    ));

    std::env::set_var("DRONE_SECRET", "s3cret");
    let config = WebhookConfig::from_env().unwrap();
    assert_eq!(config.secret, "s3cret");
    assert!(!format!("{:?}", config).contains("s3cret"));

    clear(SECRET_VARS);
}

#[test]
#[serial]
fn test_webhook_secret_short_name() {
    clear(SECRET_VARS);
    std::env::set_var("WEBHOOK_SECRET", "legacy");

    assert_eq!(WebhookConfig::from_env().unwrap().secret, "legacy");

    clear(SECRET_VARS);
}

#[test]
#[serial]
fn test_server_config_defaults() {
    clear(SERVER_VARS);

    let config = ServerConfig::from_env();

    assert_eq!(config.max_body_bytes, 1024 * 1024);
    assert_eq!(config.read_timeout, Duration::from_secs(15));
    assert_eq!(config.idle_timeout, Duration::from_secs(120));
    assert_eq!(config.shutdown_timeout, Duration::from_secs(15));
}

#[test]
#[serial]
fn test_server_timeouts_accept_both_names() {
    clear(SERVER_VARS);
    std::env::set_var("DRONE_SERVER_READ_TIMEOUT_SECS", "5");
    std::env::set_var("SERVER_IDLE_TIMEOUT_SECS", "30");
    std::env::set_var("DRONE_SERVER_MAX_BODY_BYTES", "2048");

    let config = ServerConfig::from_env();

    assert_eq!(config.read_timeout, Duration::from_secs(5));
    assert_eq!(config.idle_timeout, Duration::from_secs(30));
    assert_eq!(config.max_body_bytes, 2048);

    clear(SERVER_VARS);
}

#[test]
#[serial]
fn test_full_config_from_env() {
    clear(SERVER_VARS);
    clear(SMTP_VARS);
    clear(SECRET_VARS);
    std::env::set_var("DRONE_SECRET", "s3cret");
    std::env::set_var("DRONE_SERVER_HOST", "127.0.0.1");
    std::env::set_var("DRONE_SERVER_PORT", "8080");

    let config = Config::from_env().unwrap();

    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 8080);
    assert_eq!(config.smtp.port, 25);
    assert_eq!(config.webhook.secret, "s3cret");

    std::env::set_var("DRONE_SERVER_PORT", "eighty");
    assert!(matches!(Config::from_env(), Err(ConfigError::InvalidPort)));

    clear(SERVER_VARS);
    clear(SECRET_VARS);
}
