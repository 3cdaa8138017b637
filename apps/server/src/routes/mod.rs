pub mod health;
pub mod webhook;

use actix_web::web;

/// Registers every route served by the receiver
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::liveness))
        .route("/", web::post().to(webhook::receive));
}
