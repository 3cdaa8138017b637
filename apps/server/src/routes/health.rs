use actix_web::{http::header::ContentType, HttpResponse};

/// Liveness check - is the process running?
/// Returns 200 with a plain `OK` body.
pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body("OK")
}
