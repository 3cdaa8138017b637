use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};

use buildmail::config;
use buildmail::middleware::CatchPanic;
use buildmail::routes;
use buildmail::services::notification::{AsyncNotifier, ShutdownOutcome};
use buildmail::services::{Dispatcher, Renderer, SmtpMailer};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Load configuration
    let config = config::Config::from_env().map_err(|e| {
        log::error!("Configuration error: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    log::info!("Starting buildmail on {}:{}", config.host, config.port);
    log::info!(
        "Sending through SMTP relay {}:{}",
        config.smtp.host,
        config.smtp.port
    );

    // Templates are parsed once; a broken template aborts startup
    let renderer = Renderer::new().map_err(|e| {
        log::error!("Template error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    let mailer = SmtpMailer::new(&config.smtp).map_err(|e| {
        log::error!("SMTP transport error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    // Notification tasks run on this runtime so they survive worker shutdown
    let dispatcher = Dispatcher::new(renderer, Arc::new(mailer), Arc::new(config.smtp.clone()));

    let notifier: Arc<dyn AsyncNotifier> = Arc::new(dispatcher.clone());
    let notifier = web::Data::from(notifier);
    let webhook = web::Data::new(config.webhook.clone());
    let max_body_bytes = config.server.max_body_bytes;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(webhook.clone())
            .app_data(notifier.clone())
            .app_data(web::PayloadConfig::new(max_body_bytes))
            // Middleware
            .wrap(CatchPanic)
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .client_request_timeout(config.server.read_timeout)
    .keep_alive(config.server.idle_timeout)
    .shutdown_timeout(config.server.shutdown_timeout.as_secs())
    .run();

    // Spawn graceful shutdown handler
    let server_handle = server.handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        log::info!("Shutdown signal received, stopping server...");
        server_handle.stop(true).await;
    });

    server.await?;

    // No new requests can arrive now; let queued notifications finish
    match dispatcher.shutdown().await {
        ShutdownOutcome::Drained => log::info!("Shutdown complete"),
        ShutdownOutcome::TimedOut { in_flight } => log::warn!(
            "Shutdown complete with {} notification(s) abandoned",
            in_flight
        ),
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                log::error!("Failed to install Ctrl+C handler: {}", e);
                // Wait forever if signal handler fails
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
