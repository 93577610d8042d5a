//! anima-server binary.
//!
//! Exit codes: 0 on normal shutdown, 1 on fatal startup (invalid config
//! or unreachable database).

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use anima_core::config::AnimaConfig;
use anima_server::{routes, Engine};

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match AnimaConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(&config.log_level);

    let port = config.port;
    let engine = match Engine::start(config).await {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!(error = %e, "startup failed");
            std::process::exit(1);
        }
    };

    let app = routes::router(engine.clone());
    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, port, "could not bind service port");
            std::process::exit(1);
        }
    };
    info!(port, "anima listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
        std::process::exit(1);
    }

    engine.shutdown();
}
