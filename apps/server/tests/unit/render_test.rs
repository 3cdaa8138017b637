//! Unit tests for email rendering

use buildmail::config::SmtpConfig;
use buildmail::services::notification::{Recipient, RenderError, Renderer};
use pretty_assertions::assert_eq;

use crate::common::{failed_build_event, smtp_config};

#[test]
fn test_subject_and_recipients() {
    let renderer = Renderer::new().unwrap();
    let message = renderer.render(&failed_build_event(), &smtp_config()).unwrap();

    assert_eq!(
        message.subject,
        "[org/repo] Failed build #7 for refs/heads/main (e92d9f39)"
    );
    assert_eq!(message.from, "Drone <drone@example.com>");
    assert_eq!(
        message.to,
        Recipient {
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
        }
    );
    assert_eq!(message.to.to_string(), "Test User <test@example.com>");
    assert_eq!(message.cc, vec!["lead@example.com".to_string()]);
    assert!(message.bcc.is_empty());
}

#[test]
fn test_text_body_contents() {
    let renderer = Renderer::new().unwrap();
    let message = renderer.render(&failed_build_event(), &smtp_config()).unwrap();

    assert!(message.text.contains("Build #7 has failed"));
    assert!(message.text.contains("org/repo"));
    assert!(message.text.contains("e92d9f39 Fix flaky integration test"));
    assert!(message.text.contains("https://ci.example.com/org/repo/7"));
    assert!(!message.text.contains("Retry the container start"));
}

#[test]
fn test_html_body_contents() {
    let renderer = Renderer::new().unwrap();
    let message = renderer.render(&failed_build_event(), &smtp_config()).unwrap();

    assert!(message.html.contains("Build #7 has failed"));
    assert!(message.html.contains("Test User"));
    assert!(message.html.contains("Fix flaky integration test"));
}

#[test]
fn test_author_falls_back_to_login() {
    let mut event = failed_build_event();
    event.build.as_mut().unwrap().author_name.clear();

    let message = Renderer::new()
        .unwrap()
        .render(&event, &SmtpConfig::default())
        .unwrap();
    assert_eq!(message.to.name, "octocat");
}

#[test]
fn test_author_name_with_punctuation_is_kept_verbatim() {
    let mut event = failed_build_event();
    event.build.as_mut().unwrap().author_name = r#"Doe, Jane "JD""#.to_string();

    let message = Renderer::new()
        .unwrap()
        .render(&event, &SmtpConfig::default())
        .unwrap();
    assert_eq!(message.to.name, r#"Doe, Jane "JD""#);
    assert_eq!(message.to.email, "test@example.com");
}

#[test]
fn test_missing_system_is_render_error() {
    let mut event = failed_build_event();
    event.system = None;

    let err = Renderer::new()
        .unwrap()
        .render(&event, &SmtpConfig::default())
        .unwrap_err();
    assert!(matches!(err, RenderError::MissingSection("system")));
}

#[test]
fn test_template_referencing_unknown_variable_fails() {
    let renderer = Renderer::from_sources("{{ no_such_value }}", "{{ header }}").unwrap();
    let err = renderer
        .render(&failed_build_event(), &SmtpConfig::default())
        .unwrap_err();
    assert!(matches!(err, RenderError::Template(_)));
}

#[test]
fn test_invalid_template_syntax_rejected_at_construction() {
    assert!(Renderer::from_sources("{% if %}", "{{ header }}").is_err());
}
