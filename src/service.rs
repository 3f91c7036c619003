//! Service lifecycle: startup order, serving and shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use secrecy::ExposeSecret;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::channels::Messenger;
use crate::config::BotConfig;
use crate::conversation::ConversationEngine;
use crate::corpus::CorpusStore;
use crate::error::{ConfigError, Result};
use crate::ingress::poll::run_poll_loop;
use crate::ingress::webhook::{WebhookState, liveness_routes, push_router};
use crate::ingress::{IngressAdapter, IngressMode};
use crate::session::{SessionStore, spawn_pruning_task};

/// Bind `0.0.0.0:{port}` and run until `shutdown` resolves.
pub async fn run<F>(config: BotConfig, messenger: Arc<dyn Messenger>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    run_with_listener(config, messenger, listener, shutdown).await
}

/// Run the service on an already bound listener until `shutdown` resolves.
///
/// Startup: load the corpus, build the engine and session table, and start
/// serving HTTP (liveness, plus the webhook route in push mode) before any
/// call to the platform. Then register the webhook (push mode) or clear it
/// and run the poll loop (poll mode). The credential check runs in the
/// background and only logs.
///
/// On shutdown the poll loop stops, in-flight HTTP requests finish, and a
/// registered webhook is removed.
pub async fn run_with_listener<F>(
    config: BotConfig,
    messenger: Arc<dyn Messenger>,
    listener: TcpListener,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let webhook_url = match config.mode {
        IngressMode::Webhook => Some(config.webhook_url().ok_or_else(|| {
            ConfigError::MissingRequired {
                key: "WEBHOOK_HOST".into(),
                hint: "Webhook mode needs the public hostname the platform can reach.".into(),
            }
        })?),
        IngressMode::Poll => None,
    };

    let corpus = Arc::new(CorpusStore::new(&config.corpus_path));
    let entries = corpus.len();

    let sessions = SessionStore::new(config.session_capacity);
    let pruning_handle = spawn_pruning_task(
        Arc::clone(&sessions),
        config.session_idle_timeout,
        config.prune_interval,
    );

    let adapter = IngressAdapter::new(
        ConversationEngine::new(corpus),
        sessions,
        Arc::clone(&messenger),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown.await;
        let _ = stop_tx.send(true);
    });

    let router = match config.mode {
        IngressMode::Webhook => push_router(WebhookState::new(
            Arc::clone(&adapter),
            config.bot_token.clone(),
            config.webhook_secret.clone(),
        )),
        IngressMode::Poll => liveness_routes(),
    };

    let local_addr = listener.local_addr()?;
    let server_stop = stop_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(stopped(server_stop))
            .await
    });
    info!(
        mode = %config.mode,
        addr = %local_addr,
        fortunes = entries,
        "Cookie bot serving"
    );

    let health_handle = {
        let messenger = Arc::clone(&messenger);
        tokio::spawn(async move {
            if let Err(e) = messenger.health_check().await {
                warn!(error = %e, "Platform health check failed; continuing");
            }
        })
    };

    let mut registered = false;
    match webhook_url {
        Some(url) => {
            let secret = config.webhook_secret.as_ref().map(|s| s.expose_secret());
            let registration = tokio::select! {
                result = messenger.set_webhook(&url, secret) => Some(result),
                _ = stopped(stop_rx.clone()) => None,
            };
            if let Some(Err(e)) = registration {
                server.abort();
                health_handle.abort();
                pruning_handle.abort();
                return Err(e.into());
            }
            registered = registration.is_some();
        }
        None => {
            tokio::select! {
                result = messenger.delete_webhook() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Failed to clear webhook before polling");
                    }
                }
                _ = stopped(stop_rx.clone()) => {}
            }
            run_poll_loop(Arc::clone(&adapter), config.poll_timeout_secs, stop_rx).await;
        }
    }

    let served = match server.await {
        Ok(served) => served,
        Err(e) => Err(std::io::Error::other(e)),
    };

    if registered {
        if let Err(e) = messenger.delete_webhook().await {
            warn!(error = %e, "Failed to remove webhook on shutdown");
        }
    }

    health_handle.abort();
    pruning_handle.abort();
    info!("Cookie bot stopped");
    Ok(served?)
}

/// Resolve once the stop flag is set or its sender is gone.
async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
