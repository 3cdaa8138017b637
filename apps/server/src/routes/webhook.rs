use actix_web::{web, HttpRequest, HttpResponse};
use bytes::Bytes;

use crate::auth::http_signature::{self, SignedRequest, Verification};
use crate::config::WebhookConfig;
use crate::error::{WebhookError, WebhookResult};
use crate::models::{should_notify, BuildEvent};
use crate::services::notification::AsyncNotifier;

/// POST /
/// Receives a signed build webhook and queues the failure notification.
///
/// Answers 204 as soon as the event is decoded; delivery happens in the
/// background and never affects the response.
pub async fn receive(
    req: HttpRequest,
    webhook: web::Data<WebhookConfig>,
    notifier: web::Data<dyn AsyncNotifier>,
    body: Bytes,
) -> WebhookResult<HttpResponse> {
    // 1. Verify the signature over the raw body
    let signed = signed_request(&req, &body);
    match http_signature::verify(&webhook.secret, &signed) {
        Verification::Valid => {}
        Verification::MissingOrMalformed(e) => {
            log::debug!("Rejecting webhook: {}", e);
            return Err(WebhookError::MissingSignature(e));
        }
        Verification::Invalid => {
            log::debug!("Rejecting webhook: signature mismatch");
            return Err(WebhookError::InvalidSignature);
        }
    }

    // 2. Decode the payload
    let event: BuildEvent = serde_json::from_slice(&body).map_err(|e| {
        log::debug!("Rejecting webhook: invalid payload: {}", e);
        WebhookError::InvalidInput(e)
    })?;

    // 3. Hand off; the dispatcher filters again before sending
    if should_notify(&event) {
        log::info!(
            "Build #{} failed, queueing notification",
            event.build_number().unwrap_or_default()
        );
    }
    notifier.submit(event);

    Ok(HttpResponse::NoContent().finish())
}

fn signed_request<'a>(req: &HttpRequest, body: &'a [u8]) -> SignedRequest<'a> {
    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| req.path());

    req.headers().iter().fold(
        SignedRequest::new(req.method().as_str(), target, body),
        |signed, (name, value)| {
            signed.header(name.as_str(), &String::from_utf8_lossy(value.as_bytes()))
        },
    )
}
