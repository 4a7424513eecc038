//! The `broker` module holds the transport `topicbus` publishes to and
//! listens on: the `BrokerConnection` / `BrokerSubscription` contract and its
//! two backends, the in-process `MemoryBroker` and the `NatsBroker` adapter.

pub mod connection;
pub mod memory;
pub mod message;
pub mod nats;

use std::sync::Arc;

pub use connection::{BrokerConnection, BrokerSubscription};
pub use memory::MemoryBroker;
pub use message::InboundMessage;
pub use nats::NatsBroker;

use crate::config::{BrokerBackend, BrokerSettings};
use crate::utils::error::BrokerError;

/// Build the broker connection described by `settings`.
pub async fn connect(settings: &BrokerSettings) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
    match settings.backend {
        BrokerBackend::Memory => Ok(Arc::new(MemoryBroker::new(settings.channel_capacity))),
        BrokerBackend::Nats => Ok(Arc::new(NatsBroker::connect(&settings.url).await?)),
    }
}
