//! Per-topic dispatcher
//!
//! A `Dispatcher<M>` owns everything a bound topic needs at runtime:
//! - the append-only list of registrations
//! - at most one listener: a broker subscription plus the consume loop
//!   draining it
//! - a semaphore bounding concurrent handler calls for the topic
//!
//! The consume loop decodes each inbound payload once and spawns one task
//! per listening registration. Acquiring a permit before each spawn is what
//! pushes back on a fast broker when handlers are slow.
//!
//! The listener lock is async and held across the broker `subscribe` call,
//! so concurrent first subscribers of a topic open exactly one broker
//! subscription between them.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span, error, info, warn};

use super::subscription::{Registration, SubscriptionState};
use super::topic::TopicDispatcher;
use crate::broker::{BrokerConnection, BrokerSubscription};
use crate::codec::{Codec, Message};
use crate::config::ShutdownMode;
use crate::context::Context;
use crate::utils::error::BrokerError;

struct Listener {
    stop: Context,
    task: JoinHandle<()>,
}

pub(crate) struct Dispatcher<M: Message> {
    topic: Arc<str>,
    registrations: RwLock<Vec<Arc<Registration<M>>>>,
    listener: Mutex<Option<Listener>>,
    listening: AtomicBool,
    permits: Arc<Semaphore>,
}

impl<M: Message> Dispatcher<M> {
    pub(crate) fn new(topic: Arc<str>, max_in_flight: usize) -> Self {
        let permits = if max_in_flight == 0 {
            Semaphore::MAX_PERMITS
        } else {
            if max_in_flight > Semaphore::MAX_PERMITS {
                warn!(
                    topic = %topic,
                    max_in_flight,
                    limit = Semaphore::MAX_PERMITS,
                    "max_in_flight too large, clamped"
                );
            }
            max_in_flight.min(Semaphore::MAX_PERMITS)
        };
        Self {
            topic,
            registrations: RwLock::new(Vec::new()),
            listener: Mutex::new(None),
            listening: AtomicBool::new(false),
            permits: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Attach `registration`, opening the topic's broker subscription first if
    /// no listener is running. Nothing is attached when the broker refuses.
    pub(crate) async fn register(
        self: &Arc<Self>,
        registration: Arc<Registration<M>>,
        broker: &Arc<dyn BrokerConnection>,
        codec: Codec,
    ) -> Result<(), BrokerError> {
        let mut listener = self.listener.lock().await;

        // `consume` clears `listening` before closing its broker subscription;
        // a loop still inside that close is already dead
        let running = self.listening.load(Ordering::SeqCst)
            && listener.as_ref().is_some_and(|l| !l.task.is_finished());
        if !running {
            if let Some(dead) = listener.take() {
                dead.stop.cancel();
            }
            let inbound = broker.subscribe(&self.topic).await?;
            let stop = Context::background();
            self.listening.store(true, Ordering::SeqCst);
            let task = tokio::spawn(Arc::clone(self).consume(inbound, codec, stop.clone()));
            *listener = Some(Listener { stop, task });
            info!(topic = %self.topic, codec = codec.name(), "broker subscription opened");
        }

        self.registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&registration));
        registration.set_state(SubscriptionState::Listening);
        Ok(())
    }

    /// Wait for `registration` to be cancelled, then take it through
    /// Draining to Closed. Stops the listener when it was the last listening
    /// registration of the topic.
    pub(crate) async fn watch(
        self: Arc<Self>,
        registration: Arc<Registration<M>>,
        mode: ShutdownMode,
    ) {
        registration.ctx.cancelled().await;
        registration.set_state(SubscriptionState::Draining);
        debug!(
            topic = %self.topic,
            subscription = %registration.id,
            in_flight = registration.in_flight(),
            "subscription draining"
        );

        self.release_listener_if_idle().await;

        if mode == ShutdownMode::Graceful {
            registration.wait_idle().await;
        }
        registration.set_state(SubscriptionState::Closed);
        info!(topic = %self.topic, subscription = %registration.id, "subscription closed");
    }

    async fn release_listener_if_idle(&self) {
        let mut listener = self.listener.lock().await;
        if self.active_handler_count() > 0 {
            return;
        }
        let Some(Listener { stop, task }) = listener.take() else {
            return;
        };

        stop.cancel();
        if let Err(e) = task.await {
            error!(topic = %self.topic, error = %e, "consume loop failed");
        }
        info!(topic = %self.topic, "no listening handlers left, broker subscription released");
    }

    async fn consume(
        self: Arc<Self>,
        mut inbound: Box<dyn BrokerSubscription>,
        codec: Codec,
        stop: Context,
    ) {
        loop {
            let next = tokio::select! {
                _ = stop.cancelled() => break,
                next = inbound.next() => next,
            };
            let Some(message) = next else {
                warn!(topic = %self.topic, "broker ended the subscription");
                break;
            };

            if *message.channel != *self.topic {
                debug!(topic = %self.topic, channel = %message.channel, "message for another channel ignored");
                continue;
            }

            let decoded = match codec.decode::<M>(&message.payload) {
                Ok(decoded) => Arc::new(decoded),
                Err(e) => {
                    error!(
                        topic = %self.topic,
                        codec = codec.name(),
                        bytes = message.payload.len(),
                        error = %e,
                        "unmarshal inbound payload failed, message dropped"
                    );
                    continue;
                }
            };

            self.fan_out(decoded, &stop).await;
        }

        self.listening.store(false, Ordering::SeqCst);
        if let Err(e) = inbound.close().await {
            error!(topic = %self.topic, error = %e, "close broker subscription failed");
        }
    }

    async fn fan_out(&self, message: Arc<M>, stop: &Context) {
        let targets: Vec<Arc<Registration<M>>> = self
            .registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.is_listening())
            .cloned()
            .collect();
        debug!(topic = %self.topic, handlers = targets.len(), "dispatching message");

        for registration in targets {
            let permit = tokio::select! {
                _ = stop.cancelled() => return,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };
            // may have been cancelled while waiting for a permit
            if !registration.is_listening() {
                continue;
            }

            let guard = registration.begin_call();
            let handler = Arc::clone(&registration.handler);
            let ctx = registration.ctx.clone();
            let message = Arc::clone(&message);
            let span = debug_span!(
                "handler",
                topic = %self.topic,
                subscription = %registration.id,
                request_id = ctx.request_id().unwrap_or("-"),
            );

            tokio::spawn(
                async move {
                    let _permit = permit;
                    let _guard = guard;
                    handler.handle(ctx, message).await;
                }
                .instrument(span),
            );
        }
    }
}

impl<M: Message> TopicDispatcher for Dispatcher<M> {
    fn handler_count(&self) -> usize {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn active_handler_count(&self) -> usize {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.is_listening())
            .count()
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
