//! Conversation engine: maps (state, event) to (next state, reply).
//!
//! The engine performs no I/O. The only non-determinism is the random draw
//! for fortune requests, which comes from the RNG passed to [`ConversationEngine::decide`].

use std::num::IntErrorKind;
use std::sync::Arc;

use rand::Rng;

use super::event::{EventKind, InboundEvent, MenuButton};
use super::prompts;
use super::reply::{Affordance, OutboundReply};
use super::state::SessionState;
use crate::corpus::CorpusStore;
use crate::error::InputParseError;

/// Outcome of handling one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub next: SessionState,
    pub reply: Option<OutboundReply>,
}

impl Decision {
    fn new(next: SessionState, reply: OutboundReply) -> Self {
        Self {
            next,
            reply: Some(reply),
        }
    }
}

/// Stateless decision logic over a shared corpus.
pub struct ConversationEngine {
    corpus: Arc<CorpusStore>,
}

impl ConversationEngine {
    pub fn new(corpus: Arc<CorpusStore>) -> Self {
        Self { corpus }
    }

    /// Decide using the thread-local RNG.
    pub fn handle(&self, state: SessionState, event: &InboundEvent) -> Decision {
        self.decide(state, event, &mut rand::thread_rng())
    }

    /// Decide the next state and reply for `event` given the sender's `state`.
    pub fn decide<R: Rng + ?Sized>(
        &self,
        state: SessionState,
        event: &InboundEvent,
        rng: &mut R,
    ) -> Decision {
        let to = event.sender;
        let len = self.corpus.len();

        match &event.kind {
            EventKind::Start => Decision::new(
                SessionState::Idle,
                OutboundReply::text(to, prompts::WELCOME).with_affordance(Affordance::MainMenu),
            ),
            EventKind::Help => Decision::new(
                SessionState::Idle,
                OutboundReply::text(to, prompts::HELP).with_affordance(Affordance::MainMenu),
            ),
            EventKind::Fortune | EventKind::Menu(MenuButton::Random | MenuButton::More) => {
                let fortune = self.corpus.random_entry_with(rng);
                Decision::new(
                    SessionState::Idle,
                    OutboundReply::text(to, fortune).with_affordance(Affordance::More),
                )
            }
            EventKind::Menu(MenuButton::ByNumber) => Decision::new(
                SessionState::AwaitingIndexInput,
                OutboundReply::text(to, prompts::ask_for_index(len)),
            ),
            EventKind::PlainText(text) => match state {
                SessionState::AwaitingIndexInput => match parse_index(text, len) {
                    Ok(index) => match self.corpus.entry_at(index) {
                        Ok(fortune) => Decision::new(
                            SessionState::Idle,
                            OutboundReply::text(to, fortune).with_affordance(Affordance::More),
                        ),
                        // parse_index already bounds-checked against the same corpus
                        Err(_) => Decision::new(
                            SessionState::AwaitingIndexInput,
                            OutboundReply::text(to, prompts::index_out_of_range(len)),
                        ),
                    },
                    Err(InputParseError::OutOfRange { .. }) => Decision::new(
                        SessionState::AwaitingIndexInput,
                        OutboundReply::text(to, prompts::index_out_of_range(len)),
                    ),
                    Err(InputParseError::NotANumber(_)) => Decision::new(
                        SessionState::AwaitingIndexInput,
                        OutboundReply::text(to, prompts::NOT_A_NUMBER),
                    ),
                },
                SessionState::Idle => Decision::new(
                    SessionState::Idle,
                    OutboundReply::text(to, prompts::USE_MENU).with_affordance(Affordance::MainMenu),
                ),
            },
        }
    }
}

/// Parse a 1-based index in `1..=len`.
///
/// Integers too large for `i64` count as out of range, not as non-numbers.
pub fn parse_index(text: &str, len: usize) -> Result<i64, InputParseError> {
    let trimmed = text.trim();
    let value: i64 = trimmed.parse().map_err(|e: std::num::ParseIntError| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => InputParseError::OutOfRange {
            value: trimmed.to_string(),
            len,
        },
        _ => InputParseError::NotANumber(trimmed.to_string()),
    })?;

    let in_range = usize::try_from(value).is_ok_and(|v| (1..=len).contains(&v));
    if in_range {
        Ok(value)
    } else {
        Err(InputParseError::OutOfRange {
            value: trimmed.to_string(),
            len,
        })
    }
}
