//! Build failure notifications.
//!
//! Rendering and delivery are split behind small traits so the dispatcher
//! can run against the real SMTP relay in production and against in-memory
//! doubles in tests.

pub mod dispatcher;
pub mod email;
pub mod render;

use async_trait::async_trait;

pub use dispatcher::{
    AsyncNotifier, Delivery, Dispatcher, NotifyError, ShutdownOutcome, SHUTDOWN_TIMEOUT,
};
pub use email::{MailError, SmtpMailer};
pub use render::{Recipient, RenderError, RenderedMessage, Renderer};

// =============================================================================
// Mail Transport Trait
// =============================================================================

/// Delivers a rendered message.
///
/// Implementations do not retry; a returned error is terminal for that
/// message.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &RenderedMessage) -> Result<(), MailError>;
}
