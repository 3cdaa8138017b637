//! Email body rendering.
//!
//! Both templates are compiled once when the renderer is built, so a broken
//! template stops the process at startup instead of failing per message.

use std::fmt;

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

use crate::config::SmtpConfig;
use crate::models::BuildEvent;

const HTML_TEMPLATE_NAME: &str = "email.html";
const TEXT_TEMPLATE_NAME: &str = "email.txt";

const HTML_TEMPLATE: &str = include_str!("../../../templates/email.html");
const TEXT_TEMPLATE: &str = include_str!("../../../templates/email.txt");

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("event has no {0} section")]
    MissingSection(&'static str),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

/// Commit author the notification goes to.
///
/// Kept as separate parts so the transport can quote the display name;
/// `Display` gives the `Name <email>` form used in logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub name: String,
    pub email: String,
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// A fully addressed email, ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub from: String,
    pub to: Recipient,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Values exposed to both templates
#[derive(Debug, Serialize)]
struct EmailContext<'a> {
    subject: &'a str,
    header: String,
    repository: &'a str,
    reference: &'a str,
    commit_hash: &'a str,
    commit_message: &'a str,
    author_name: &'a str,
    author_avatar: Option<&'a str>,
    build_link: &'a str,
    server_host: &'a str,
    server_link: &'a str,
}

/// Immutable set of parsed email templates
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    /// Builds the renderer from the templates bundled with the binary
    pub fn new() -> Result<Self, RenderError> {
        Self::from_sources(HTML_TEMPLATE, TEXT_TEMPLATE)
    }

    /// Builds a renderer from custom template sources.
    ///
    /// Variables the templates reference but the context lacks are errors.
    pub fn from_sources(html: &'static str, text: &'static str) -> Result<Self, RenderError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_template(HTML_TEMPLATE_NAME, html)?;
        env.add_template(TEXT_TEMPLATE_NAME, text)?;
        Ok(Self { env })
    }

    /// Renders the failure notification for `event`.
    pub fn render(
        &self,
        event: &BuildEvent,
        config: &SmtpConfig,
    ) -> Result<RenderedMessage, RenderError> {
        let build = event
            .build
            .as_ref()
            .ok_or(RenderError::MissingSection("build"))?;
        let repo = event
            .repo
            .as_ref()
            .ok_or(RenderError::MissingSection("repo"))?;
        let system = event
            .system
            .as_ref()
            .ok_or(RenderError::MissingSection("system"))?;

        let author_name = build.author_display_name();
        let short_hash = build.short_hash();
        let subject = format!(
            "[{}] Failed build #{} for {} ({})",
            repo.slug, build.number, build.reference, short_hash
        );
        let build_link = format!("{}/{}/{}", system.link, repo.slug, build.number);

        let context = EmailContext {
            subject: &subject,
            header: format!("Build #{} has failed", build.number),
            repository: &repo.slug,
            reference: &build.reference,
            commit_hash: short_hash,
            commit_message: build.commit_summary(),
            author_name,
            author_avatar: build.author_avatar.as_deref().filter(|url| !url.is_empty()),
            build_link: &build_link,
            server_host: &system.host,
            server_link: &system.link,
        };

        let html = self.env.get_template(HTML_TEMPLATE_NAME)?.render(&context)?;
        let text = self.env.get_template(TEXT_TEMPLATE_NAME)?.render(&context)?;

        Ok(RenderedMessage {
            from: config.from.clone(),
            to: Recipient {
                name: author_name.to_string(),
                email: build.author_email.clone(),
            },
            cc: config.cc.clone(),
            bcc: config.bcc.clone(),
            subject,
            html,
            text,
        })
    }
}
