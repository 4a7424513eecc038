//! NATS backend
//!
//! Maps broker channels one to one onto NATS subjects. Core NATS gives the
//! same best-effort, no-persistence semantics `topicbus` promises, so the
//! adapter is a thin translation layer over `async_nats`.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::info;

use super::connection::{BrokerConnection, BrokerSubscription};
use super::message::InboundMessage;
use crate::utils::error::BrokerError;

#[derive(Debug, Clone)]
pub struct NatsBroker {
    client: async_nats::Client,
}

impl NatsBroker {
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BrokerError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        info!(url, "connected to NATS");
        Ok(Self { client })
    }

    /// Wrap a client the caller already connected and configured.
    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }
}

#[async_trait]
impl BrokerConnection for NatsBroker {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BrokerError> {
        self.client
            .publish(channel.to_string(), payload)
            .await
            .map_err(|e| BrokerError::Publish {
                channel: channel.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn BrokerSubscription>, BrokerError> {
        let subscriber = self
            .client
            .subscribe(channel.to_string())
            .await
            .map_err(|e| BrokerError::Subscribe {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(NatsSubscription {
            channel: channel.to_string(),
            inner: Some(subscriber),
        }))
    }
}

pub struct NatsSubscription {
    channel: String,
    inner: Option<async_nats::Subscriber>,
}

#[async_trait]
impl BrokerSubscription for NatsSubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn next(&mut self) -> Option<InboundMessage> {
        let msg = self.inner.as_mut()?.next().await?;
        Some(InboundMessage::new(msg.subject.to_string(), msg.payload))
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        let Some(mut subscriber) = self.inner.take() else {
            return Ok(());
        };
        subscriber
            .unsubscribe()
            .await
            .map_err(|e| BrokerError::Close {
                channel: self.channel.clone(),
                reason: e.to_string(),
            })
    }
}
