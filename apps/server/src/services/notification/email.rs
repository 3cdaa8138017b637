//! SMTP mail transport.
//!
//! Sends rendered notifications using the lettre crate, as a
//! multipart/alternative message with plain text and HTML bodies.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::Address;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::render::{Recipient, RenderedMessage};
use super::MailTransport;
use crate::config::SmtpConfig;

/// Port for SMTP over implicit TLS (SMTPS)
const SMTPS_PORT: u16 = 465;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid {field} address '{address}': {source}")]
    InvalidAddress {
        field: &'static str,
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("failed to build email: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Delivers messages through a single configured SMTP relay
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Creates the transport from configuration.
    ///
    /// Port 465 uses implicit TLS; any other port starts in plain text and
    /// upgrades with STARTTLS when the server offers it.
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let tls_params = TlsParameters::new(config.host.clone())?;
        let tls = if config.port == SMTPS_PORT {
            Tls::Wrapper(tls_params)
        } else {
            Tls::Opportunistic(tls_params)
        };

        let builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .tls(tls);

        let transport = match config.credentials() {
            Some((username, password)) => builder
                .credentials(Credentials::new(username.to_string(), password.to_string()))
                .build(),
            None => builder.build(),
        };

        Ok(Self { transport })
    }
}

fn parse_mailbox(field: &'static str, address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|source| MailError::InvalidAddress {
        field,
        address: address.to_string(),
        source,
    })
}

/// Mailbox for the commit author. The display name is quoted as needed, so
/// names containing `,` or `"` stay deliverable.
fn recipient_mailbox(recipient: &Recipient) -> Result<Mailbox, MailError> {
    let email: Address = recipient
        .email
        .parse()
        .map_err(|source| MailError::InvalidAddress {
            field: "to",
            address: recipient.email.clone(),
            source,
        })?;
    let name = Some(recipient.name.clone()).filter(|name| !name.is_empty());
    Ok(Mailbox::new(name, email))
}

/// Converts a rendered notification into a lettre message.
///
/// Address problems (e.g. an author without an email) surface here rather
/// than at render time.
pub fn build_message(message: &RenderedMessage) -> Result<Message, MailError> {
    let mut builder = Message::builder()
        .from(parse_mailbox("from", &message.from)?)
        .to(recipient_mailbox(&message.to)?)
        .subject(&message.subject);

    for cc in &message.cc {
        builder = builder.cc(parse_mailbox("cc", cc)?);
    }
    for bcc in &message.bcc {
        builder = builder.bcc(parse_mailbox("bcc", bcc)?);
    }

    let email = builder.multipart(MultiPart::alternative_plain_html(
        message.text.clone(),
        message.html.clone(),
    ))?;

    Ok(email)
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, message: &RenderedMessage) -> Result<(), MailError> {
        let email = build_message(message)?;
        self.transport.send(email).await?;
        log::debug!("Email sent successfully to {}", message.to);
        Ok(())
    }
}
