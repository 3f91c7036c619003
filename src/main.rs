use std::sync::Arc;

use cookie_bot::channels::{Messenger, TelegramChannel};
use cookie_bot::config::BotConfig;
use cookie_bot::service;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env().unwrap_or_else(|e| {
        tracing::error!("{e}");
        eprintln!("Error: {e}");
        eprintln!("  export BOT_TOKEN=123456:ABC-DEF...");
        std::process::exit(1);
    });

    eprintln!("🥠 Cookie Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mode: {}", config.mode);
    eprintln!("   Fortunes: {}", config.corpus_path.display());
    eprintln!("   Liveness: http://0.0.0.0:{}/", config.port);
    if let Some(host) = &config.webhook_host {
        eprintln!("   Webhook host: {host}");
    }

    let messenger: Arc<dyn Messenger> = Arc::new(TelegramChannel::with_api_base(
        config.bot_token.clone(),
        config.api_base.clone(),
    ));

    service::run(config, messenger, shutdown_signal()).await?;
    Ok(())
}

/// Wait for Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl+C received, shutting down..."),
        _ = terminate => tracing::info!("SIGTERM received, shutting down..."),
    }
}
