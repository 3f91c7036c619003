//! Ingress: delivers platform updates to the conversation engine.
//!
//! Both delivery modes end in [`IngressAdapter::dispatch_update`]:
//! - [`poll`]: a long-polling loop over `getUpdates`
//! - [`webhook`]: an axum router receiving pushed updates, plus the
//!   liveness route

pub mod poll;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::channels::{Messenger, Update};
use crate::conversation::{ConversationEngine, InboundEvent, SessionState};
use crate::error::ChannelError;
use crate::session::SessionStore;

/// Which way updates reach the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressMode {
    /// The service long-polls the platform.
    Poll,
    /// The platform pushes updates to the service's webhook.
    Webhook,
}

impl std::fmt::Display for IngressMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Poll => write!(f, "poll"),
            Self::Webhook => write!(f, "webhook"),
        }
    }
}

impl std::str::FromStr for IngressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "poll" | "polling" => Ok(Self::Poll),
            "webhook" | "push" => Ok(Self::Webhook),
            other => Err(format!("unknown mode {other:?}, expected \"poll\" or \"webhook\"")),
        }
    }
}

/// Longest a reply send may hold the sender's slot.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Routes decoded events through the engine and relays replies.
pub struct IngressAdapter {
    engine: ConversationEngine,
    sessions: Arc<SessionStore>,
    messenger: Arc<dyn Messenger>,
    send_timeout: Duration,
}

impl IngressAdapter {
    pub fn new(
        engine: ConversationEngine,
        sessions: Arc<SessionStore>,
        messenger: Arc<dyn Messenger>,
    ) -> Arc<Self> {
        Self::with_send_timeout(engine, sessions, messenger, DEFAULT_SEND_TIMEOUT)
    }

    pub fn with_send_timeout(
        engine: ConversationEngine,
        sessions: Arc<SessionStore>,
        messenger: Arc<dyn Messenger>,
        send_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            sessions,
            messenger,
            send_timeout,
        })
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn messenger(&self) -> &Arc<dyn Messenger> {
        &self.messenger
    }

    /// Decode and handle one platform update.
    ///
    /// Updates that carry no text message are skipped. Returns the sender's
    /// committed state, or `None` for skipped updates.
    pub async fn dispatch_update(&self, update: &Update) -> Result<Option<SessionState>, ChannelError> {
        let Some(event) = update.to_event() else {
            debug!(update_id = update.update_id, "Skipping non-text update");
            return Ok(None);
        };

        if let Some(sent_at) = update.sent_at() {
            let lag_ms = (chrono::Utc::now() - sent_at).num_milliseconds();
            debug!(update_id = update.update_id, lag_ms, "Received update");
        }

        self.dispatch(event).await.map(Some)
    }

    /// Handle one event for its sender.
    ///
    /// The sender's slot stays locked from reading the state until the new
    /// state is committed, so events from one sender never interleave. The
    /// new state is committed only once the reply was sent; if the send
    /// fails or exceeds the send timeout the event is dropped and the
    /// previous state is kept.
    pub async fn dispatch(&self, event: InboundEvent) -> Result<SessionState, ChannelError> {
        let mut slot = self.sessions.lock(event.sender).await;

        let current = slot.state();
        let decision = self.engine.handle(current, &event);

        if let Some(reply) = &decision.reply {
            let sent = tokio::time::timeout(self.send_timeout, self.messenger.send_reply(reply))
                .await
                .unwrap_or_else(|_| {
                    Err(ChannelError::SendFailed {
                        name: self.messenger.name().to_string(),
                        reason: format!("timed out after {:?}", self.send_timeout),
                    })
                });
            if let Err(e) = sent {
                warn!(
                    sender = %event.sender,
                    channel = self.messenger.name(),
                    error = %e,
                    "Reply failed; dropping event"
                );
                slot.touch();
                return Err(e);
            }
        }

        if decision.next != current {
            info!(sender = %event.sender, from = %current, to = %decision.next, "Session transition");
        }
        slot.commit(decision.next);
        Ok(decision.next)
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::testing::{FakeMessenger, HangingMessenger};
    use super::*;
    use crate::conversation::{Affordance, SenderId};
    use crate::corpus::CorpusStore;

    fn adapter(messenger: Arc<FakeMessenger>, entries: &[&str]) -> Arc<IngressAdapter> {
        let corpus = Arc::new(CorpusStore::from_entries(entries));
        IngressAdapter::new(
            ConversationEngine::new(corpus),
            SessionStore::new(100),
            messenger,
        )
    }

    #[test]
    fn mode_parses() {
        assert_eq!("poll".parse::<IngressMode>(), Ok(IngressMode::Poll));
        assert_eq!("Webhook".parse::<IngressMode>(), Ok(IngressMode::Webhook));
        assert_eq!("push".parse::<IngressMode>(), Ok(IngressMode::Webhook));
        assert!("carrier-pigeon".parse::<IngressMode>().is_err());
    }

    #[tokio::test]
    async fn scenario_by_number_flow() {
        let fake = Arc::new(FakeMessenger::default());
        let adapter = adapter(Arc::clone(&fake), &["A", "B", "C"]);
        let chat = 5;

        let states = [
            adapter.dispatch_update(&Update::text(1, chat, "/start")).await,
            adapter.dispatch_update(&Update::text(2, chat, "by number")).await,
            adapter.dispatch_update(&Update::text(3, chat, "5")).await,
            adapter.dispatch_update(&Update::text(4, chat, "2")).await,
        ];
        let states: Vec<_> = states.into_iter().map(|s| s.unwrap().unwrap()).collect();
        assert_eq!(
            states,
            vec![
                SessionState::Idle,
                SessionState::AwaitingIndexInput,
                SessionState::AwaitingIndexInput,
                SessionState::Idle,
            ]
        );

        let bodies = fake.sent_bodies();
        assert!(bodies[0].contains("Welcome"));
        assert!(bodies[1].contains("1 and 3"));
        assert!(bodies[2].contains("must be between 1 and 3"));
        assert_eq!(bodies[3], "B");

        let sent = fake.sent.lock().unwrap();
        assert!(sent.iter().all(|r| r.recipient == SenderId(chat)));
        assert_eq!(sent[3].affordance, Some(Affordance::More));
    }

    #[tokio::test]
    async fn failed_send_keeps_previous_state() {
        let fake = Arc::new(FakeMessenger::failing());
        let adapter = adapter(Arc::clone(&fake), &["A", "B"]);

        let result = adapter.dispatch(InboundEvent::from_text(SenderId(9), "by number")).await;
        assert!(matches!(result, Err(ChannelError::SendFailed { .. })));
        assert_eq!(adapter.sessions().state(SenderId(9)).await, SessionState::Idle);

        // Recovers once the platform is reachable again.
        fake.fail_sends.store(false, Ordering::SeqCst);
        let state = adapter
            .dispatch(InboundEvent::from_text(SenderId(9), "by number"))
            .await
            .unwrap();
        assert_eq!(state, SessionState::AwaitingIndexInput);
    }

    #[tokio::test]
    async fn stalled_send_times_out_and_releases_sender() {
        let corpus = Arc::new(CorpusStore::from_entries(["A"]));
        let adapter = IngressAdapter::with_send_timeout(
            ConversationEngine::new(corpus),
            SessionStore::new(10),
            Arc::new(HangingMessenger),
            Duration::from_millis(50),
        );

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            adapter.dispatch(InboundEvent::from_text(SenderId(3), "by number")),
        )
        .await
        .expect("dispatch must not wait on a stalled send forever");
        assert!(matches!(result, Err(ChannelError::SendFailed { .. })));
        assert_eq!(adapter.sessions().state(SenderId(3)).await, SessionState::Idle);
    }

    #[tokio::test]
    async fn non_text_update_is_skipped() {
        let fake = Arc::new(FakeMessenger::default());
        let adapter = adapter(Arc::clone(&fake), &["A"]);

        let update = Update {
            update_id: 1,
            message: None,
        };
        assert_eq!(adapter.dispatch_update(&update).await.unwrap(), None);
        assert!(fake.sent_bodies().is_empty());
        assert!(adapter.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_senders_do_not_share_state() {
        let fake = Arc::new(FakeMessenger::default());
        let adapter = adapter(Arc::clone(&fake), &["A", "B", "C"]);

        let mut handles = Vec::new();
        for chat in 1..=20_i64 {
            let adapter = Arc::clone(&adapter);
            handles.push(tokio::spawn(async move {
                let text = if chat % 2 == 0 { "by number" } else { "/cookie" };
                adapter
                    .dispatch(InboundEvent::from_text(SenderId(chat), text))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for chat in 1..=20_i64 {
            let expected = if chat % 2 == 0 {
                SessionState::AwaitingIndexInput
            } else {
                SessionState::Idle
            };
            assert_eq!(adapter.sessions().state(SenderId(chat)).await, expected);
        }
    }

    #[tokio::test]
    async fn same_sender_events_are_serialized() {
        let fake = Arc::new(FakeMessenger::default());
        let adapter = adapter(Arc::clone(&fake), &["A", "B", "C"]);
        let sender = SenderId(77);

        adapter
            .dispatch(InboundEvent::from_text(sender, "by number"))
            .await
            .unwrap();

        // Two rapid answers: exactly one of them consumes the armed state.
        let a = {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move { adapter.dispatch(InboundEvent::from_text(sender, "1")).await })
        };
        let b = {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move { adapter.dispatch(InboundEvent::from_text(sender, "2")).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let bodies = fake.sent_bodies();
        let fortunes = bodies[1..].iter().filter(|b| b.len() == 1).count();
        let nudges = bodies[1..]
            .iter()
            .filter(|b| b.as_str() == crate::conversation::prompts::USE_MENU)
            .count();
        assert_eq!((fortunes, nudges), (1, 1));
        assert_eq!(adapter.sessions().state(sender).await, SessionState::Idle);
    }
}
