use std::any::Any;

use actix_web::{http::header::ContentType, http::StatusCode, HttpResponse, ResponseError};

use crate::auth::http_signature::SignatureError;

/// Webhook request rejections.
///
/// The display text is exactly what the client receives as the body.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Invalid or Missing Signature")]
    MissingSignature(#[source] SignatureError),

    #[error("Invalid Signature")]
    InvalidSignature,

    #[error("Invalid Input")]
    InvalidInput(#[source] serde_json::Error),
}

impl ResponseError for WebhookError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type(ContentType::plaintext())
            .body(self.to_string())
    }
}

/// Result type alias for handlers
pub type WebhookResult<T> = Result<T, WebhookError>;

/// Best-effort text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
