//! In-process broker
//!
//! `MemoryBroker` keeps one `tokio::sync::broadcast` channel per broker
//! channel name. It gives single-process deployments a broker without any
//! external server, and gives tests a broker whose state can be inspected
//! (`subscriber_count`, `publish_count`) and broken on purpose
//! (`disconnect`).
//!
//! Semantics match the networked backends where it matters:
//! - publishing to a channel nobody listens on succeeds and drops the payload
//! - a slow subscriber that falls more than `capacity` messages behind loses
//!   the oldest ones (logged, not fatal)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::connection::{BrokerConnection, BrokerSubscription};
use super::message::InboundMessage;
use crate::utils::error::BrokerError;

#[derive(Debug)]
pub struct MemoryBroker {
    channels: DashMap<Arc<str>, broadcast::Sender<InboundMessage>>,
    capacity: usize,
    connected: AtomicBool,
    publish_count: AtomicUsize,
}

impl MemoryBroker {
    /// Buffer size of each channel when none is configured.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Largest per-channel buffer; larger requests are clamped.
    pub const MAX_CAPACITY: usize = 1 << 20;

    pub fn new(capacity: usize) -> Self {
        if capacity > Self::MAX_CAPACITY {
            warn!(
                capacity,
                limit = Self::MAX_CAPACITY,
                "channel capacity too large, clamped"
            );
        }
        Self {
            channels: DashMap::new(),
            capacity: capacity.clamp(1, Self::MAX_CAPACITY),
            connected: AtomicBool::new(true),
            publish_count: AtomicUsize::new(0),
        }
    }

    /// Buffer size of each channel.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of open subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Number of payloads accepted by `publish` so far.
    pub fn publish_count(&self) -> usize {
        self.publish_count.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Simulate a lost connection: open subscriptions end and further
    /// publish/subscribe calls fail with `BrokerError::Disconnected`.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.channels.clear();
    }

    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BrokerError::Disconnected)
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl BrokerConnection for MemoryBroker {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BrokerError> {
        self.ensure_connected()?;
        self.publish_count.fetch_add(1, Ordering::Relaxed);

        if let Some(entry) = self.channels.get(channel) {
            let msg = InboundMessage::new(entry.key().clone(), payload);
            if entry.value().send(msg).is_err() {
                debug!(channel, "no live subscribers, payload dropped");
            }
        } else {
            debug!(channel, "channel never subscribed, payload dropped");
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn BrokerSubscription>, BrokerError> {
        self.ensure_connected()?;

        let key: Arc<str> = Arc::from(channel);
        let rx = self
            .channels
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        Ok(Box::new(MemorySubscription {
            channel: key,
            rx: Some(rx),
        }))
    }
}

/// Subscription handed out by [`MemoryBroker::subscribe`].
#[derive(Debug)]
pub struct MemorySubscription {
    channel: Arc<str>,
    rx: Option<broadcast::Receiver<InboundMessage>>,
}

#[async_trait]
impl BrokerSubscription for MemorySubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    async fn next(&mut self) -> Option<InboundMessage> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(msg) => return Some(msg),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "subscriber lagged, oldest payloads dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        // dropping the receiver detaches it from the channel
        self.rx = None;
        Ok(())
    }
}
