//! The messaging platform as seen by the bot.

use async_trait::async_trait;

use super::update::Update;
use crate::conversation::OutboundReply;
use crate::error::ChannelError;

/// Inbound and outbound capabilities of a messaging platform.
///
/// The ingress layer only talks to the platform through this trait, so the
/// poll loop and webhook handler can be exercised with an in-memory fake.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Fetch the next batch of updates with id `>= offset`, waiting up to
    /// `timeout_secs` for at least one to arrive. Passing an offset also
    /// acknowledges every update below it.
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, ChannelError>;

    /// Deliver a reply, including its affordance hint.
    async fn send_reply(&self, reply: &OutboundReply) -> Result<(), ChannelError>;

    /// Register `url` as the push endpoint. `secret` is echoed back by the
    /// platform in a header on every delivery.
    async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), ChannelError>;

    /// Remove any registered push endpoint.
    async fn delete_webhook(&self) -> Result<(), ChannelError>;

    /// Verify the credential works.
    async fn health_check(&self) -> Result<(), ChannelError>;
}
