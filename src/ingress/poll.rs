//! Poll mode: long-polls the platform for updates.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::IngressAdapter;
use crate::error::ChannelError;

/// Wait before retrying after a failed poll.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Poll for updates until `shutdown` flips to `true` (or its sender is dropped).
///
/// Updates in a batch are handled one by one in arrival order. The offset
/// moves past each handled update, which acknowledges it on the next poll.
/// A failed dispatch has already been logged by the adapter and does not
/// stop the loop. Shutdown interrupts a pending long-poll immediately; a
/// batch that is being handled runs to completion first.
pub async fn run_poll_loop(
    adapter: Arc<IngressAdapter>,
    timeout_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let messenger = Arc::clone(adapter.messenger());
    let mut offset: i64 = 0;

    info!(channel = messenger.name(), timeout_secs, "Poll loop listening for updates");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let result = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            result = messenger.get_updates(offset, timeout_secs) => result,
        };

        match result {
            Ok(updates) => {
                if !updates.is_empty() {
                    debug!(count = updates.len(), offset, "Fetched updates");
                }
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let _ = adapter.dispatch_update(&update).await;
                }
            }
            Err(e) => {
                let delay = match &e {
                    ChannelError::RateLimited {
                        retry_after: Some(retry_after),
                        ..
                    } => *retry_after,
                    _ => ERROR_BACKOFF,
                };
                warn!(error = %e, retry_in = ?delay, "Poll failed");
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    info!(channel = messenger.name(), "Poll loop stopped");
}
