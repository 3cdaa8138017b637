pub mod notification;

pub use notification::{AsyncNotifier, Dispatcher, Renderer, SmtpMailer};
