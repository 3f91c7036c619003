//! HTTP surface: liveness route and webhook (push mode) route.
//!
//! The webhook path is the bot token itself, so only the platform (which
//! knows the token) can find it. That is obscurity, not authentication; set
//! a webhook secret to have every delivery carry a verifiable header too.
//!
//! An update is dispatched before the 200 is returned, so the response waits
//! for the reply send. That wait is bounded by the adapter's send timeout;
//! the platform sees a slow acknowledgement rather than a redelivery.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use super::IngressAdapter;
use crate::channels::Update;

/// Header Telegram sets to the `secret_token` given to `setWebhook`.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Shared state for the webhook route.
#[derive(Clone)]
pub struct WebhookState {
    pub adapter: Arc<IngressAdapter>,
    path_secret: Arc<SecretString>,
    header_secret: Option<Arc<SecretString>>,
}

impl WebhookState {
    pub fn new(
        adapter: Arc<IngressAdapter>,
        path_secret: SecretString,
        header_secret: Option<SecretString>,
    ) -> Self {
        Self {
            adapter,
            path_secret: Arc::new(path_secret),
            header_secret: header_secret.map(Arc::new),
        }
    }
}

// ── Liveness ────────────────────────────────────────────────────────────

/// GET /
///
/// Always 200. Touches nothing but the response, so it answers even while
/// the platform is unreachable or a poll is blocked.
async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Build the liveness route.
pub fn liveness_routes() -> Router {
    Router::new().route("/", get(liveness))
}

// ── Webhook ─────────────────────────────────────────────────────────────

/// POST /{token}
async fn receive_update(
    State(state): State<WebhookState>,
    Path(secret): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if secret != state.path_secret.expose_secret() {
        return StatusCode::NOT_FOUND;
    }

    if let Some(expected) = &state.header_secret {
        let provided = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.expose_secret()) {
            warn!("Webhook request with missing or wrong secret header");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update = match Update::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "Rejecting malformed webhook payload");
            return StatusCode::BAD_REQUEST;
        }
    };

    debug!(update_id = update.update_id, "Webhook update received");

    // Failures are logged by the adapter. Acknowledge anyway so the
    // platform does not redeliver an update we already gave up on.
    let _ = state.adapter.dispatch_update(&update).await;
    StatusCode::OK
}

/// Build the webhook route.
pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route("/{secret}", post(receive_update))
        .with_state(state)
}

/// Liveness and webhook routes together, as served in push mode.
pub fn push_router(state: WebhookState) -> Router {
    liveness_routes().merge(webhook_routes(state))
}
