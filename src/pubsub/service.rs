use std::any::type_name;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::handler::Handler;
use super::subscription::{Registration, Subscription};
use super::topic::TopicRegistry;
use crate::broker::BrokerConnection;
use crate::codec::Message;
use crate::config::DispatchSettings;
use crate::context::Context;
use crate::utils::error::{PublishError, SubscribeError};

/// The publish/subscribe service.
///
/// `PubSub` wraps a caller-supplied broker connection with a registry of
/// named topics. It is a cheap handle: clones share the same registry,
/// broker and subscriptions, so it can be passed to every component that
/// publishes or subscribes.
///
/// The service lives until `close` is called; the broker connection itself
/// stays owned by the caller.
#[derive(Clone)]
pub struct PubSub {
    inner: Arc<Inner>,
}

struct Inner {
    broker: Arc<dyn BrokerConnection>,
    registry: TopicRegistry,
    settings: DispatchSettings,
    closed: AtomicBool,
    watchers: Mutex<Vec<(Context, JoinHandle<()>)>>,
}

impl PubSub {
    /// Creates a service with default dispatch settings.
    pub fn new(broker: Arc<dyn BrokerConnection>) -> Self {
        Self::with_settings(broker, DispatchSettings::default())
    }

    pub fn with_settings(broker: Arc<dyn BrokerConnection>, settings: DispatchSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                broker,
                registry: TopicRegistry::new(),
                settings,
                closed: AtomicBool::new(false),
                watchers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.inner.settings
    }

    pub fn topics(&self) -> &TopicRegistry {
        &self.inner.registry
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Publishes `message` to `topic`.
    ///
    /// The topic is created if it does not exist yet. Success means the broker
    /// accepted the payload; whether any handler runs depends on who is
    /// listening at that moment. Nothing is retried or buffered.
    ///
    /// `Cancelled` returned while the broker call was pending means the
    /// outcome is unknown: the broker may still have taken the payload.
    pub async fn publish<M: Message>(
        &self,
        ctx: &Context,
        topic: &str,
        message: &M,
    ) -> Result<(), PublishError> {
        if topic.is_empty() {
            return Err(PublishError::EmptyTopic);
        }
        if self.is_closed() {
            return Err(PublishError::ServiceClosed);
        }
        if ctx.is_cancelled() {
            return Err(PublishError::Cancelled {
                topic: topic.to_string(),
            });
        }

        self.inner.registry.get_or_create(topic).check_type::<M>()?;

        let codec = self.inner.settings.codec;
        let payload = codec
            .encode(message)
            .map_err(|source| PublishError::Encode {
                topic: topic.to_string(),
                source,
            })?;
        let bytes = payload.len();

        // a finished broker call wins over a cancellation seen in the same poll
        tokio::select! {
            biased;
            sent = self.inner.broker.publish(topic, payload) => {
                sent.map_err(|source| PublishError::Delivery {
                    topic: topic.to_string(),
                    source,
                })?;
                debug!(topic, bytes, codec = codec.name(), "message published");
                Ok(())
            }
            _ = ctx.cancelled() => Err(PublishError::Cancelled {
                topic: topic.to_string(),
            }),
        }
    }

    /// Attaches `handler` to `topic`.
    ///
    /// The first subscription binds the topic to `M`; later subscriptions and
    /// publishes must use the same type. The first subscription of a topic
    /// (or the first after all earlier ones were cancelled) opens the broker
    /// subscription; later ones join it.
    ///
    /// Every validation error is returned before the broker is contacted.
    /// The subscription ends when `ctx` or the returned handle is cancelled,
    /// or when the service is closed.
    pub async fn subscribe<M, H>(
        &self,
        ctx: &Context,
        topic: &str,
        handler: H,
    ) -> Result<Subscription, SubscribeError>
    where
        M: Message,
        H: Handler<M>,
    {
        if topic.is_empty() {
            return Err(SubscribeError::EmptyTopic);
        }
        if self.is_closed() {
            return Err(SubscribeError::ServiceClosed);
        }
        if ctx.is_cancelled() {
            return Err(SubscribeError::Cancelled {
                topic: topic.to_string(),
            });
        }

        let entry = self.inner.registry.get_or_create(topic);
        let dispatcher = entry.bind::<M>(self.inner.settings.max_in_flight)?;

        let registration = Arc::new(Registration::new(Arc::new(handler), ctx.child()));
        dispatcher
            .register(
                Arc::clone(&registration),
                &self.inner.broker,
                self.inner.settings.codec,
            )
            .await
            .map_err(|source| SubscribeError::Broker {
                topic: topic.to_string(),
                source,
            })?;

        let watcher = tokio::spawn(
            Arc::clone(&dispatcher).watch(Arc::clone(&registration), self.inner.settings.shutdown),
        );
        self.track(registration.ctx.clone(), watcher);

        info!(
            topic,
            subscription = %registration.id,
            message_type = type_name::<M>(),
            "subscribed"
        );
        Ok(registration.handle(Arc::from(topic)))
    }

    /// Cancels every subscription and waits until each one is closed.
    ///
    /// With `ShutdownMode::Graceful` this includes in-flight handler calls.
    /// Later `publish`/`subscribe` calls fail with `ServiceClosed`. Calling
    /// `close` again is a no-op.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let watchers = std::mem::take(
            &mut *self
                .inner
                .watchers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for (ctx, _) in &watchers {
            ctx.cancel();
        }
        let count = watchers.len();
        for (_, watcher) in watchers {
            if let Err(e) = watcher.await {
                error!(error = %e, "subscription watcher failed");
            }
        }

        info!(
            subscriptions = count,
            topics = self.inner.registry.len(),
            "pubsub service closed"
        );
    }

    fn track(&self, ctx: Context, watcher: JoinHandle<()>) {
        let mut watchers = self
            .inner
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        watchers.retain(|(_, w)| !w.is_finished());
        // lost a race with close(): end the subscription right away
        if self.is_closed() {
            ctx.cancel();
        }
        watchers.push((ctx, watcher));
    }
}

impl fmt::Debug for PubSub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PubSub")
            .field("topics", &self.inner.registry)
            .field("settings", &self.inner.settings)
            .field("closed", &self.is_closed())
            .finish()
    }
}
