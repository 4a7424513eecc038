//! Broker connection contract
//!
//! `topicbus` does not own its transport. The caller hands a
//! `BrokerConnection` to `PubSub`, which uses it from many tasks at once:
//! every publish goes through it and every topic listener holds one
//! `BrokerSubscription` opened from it. Implementations must therefore be
//! `Send + Sync` and tolerate concurrent calls.
//!
//! Delivery is best-effort: `publish` succeeding means the broker accepted
//! the payload, not that anyone received it.

use async_trait::async_trait;
use bytes::Bytes;

use super::message::InboundMessage;
use crate::utils::error::BrokerError;

#[async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    /// Send `payload` to every current subscriber of `channel`.
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BrokerError>;

    /// Open a subscription that yields every payload published to `channel`
    /// from now on.
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn BrokerSubscription>, BrokerError>;
}

#[async_trait]
pub trait BrokerSubscription: Send + 'static {
    fn channel(&self) -> &str;

    /// Wait for the next inbound message. `None` once the subscription is
    /// closed or the broker ended it.
    async fn next(&mut self) -> Option<InboundMessage>;

    /// Stop receiving. Further `next` calls return `None`.
    async fn close(&mut self) -> Result<(), BrokerError>;
}
