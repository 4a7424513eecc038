//! Subscription lifecycle
//!
//! Every successful `subscribe` creates one registration on its topic and
//! hands the caller a `Subscription` to observe and end it. A registration
//! walks through:
//!
//! ```text
//! Idle --(attached, listener running)--> Listening
//!      --(context cancelled)-----------> Draining
//!      --(in-flight calls done*)-------> Closed
//! ```
//!
//! (*) only in `ShutdownMode::Graceful`; `Immediate` goes straight to Closed.
//!
//! Registrations are never removed from their topic; a registration that
//! left `Listening` is skipped by dispatch.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

use super::handler::Handler;
use crate::context::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Listening,
    Draining,
    Closed,
}

/// Caller-side handle of a subscription.
///
/// Dropping the handle does not end the subscription; cancel it (or the
/// context it was created with) for that.
#[derive(Clone)]
pub struct Subscription {
    id: Uuid,
    topic: Arc<str>,
    ctx: Context,
    state: watch::Receiver<SubscriptionState>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// The context handlers of this subscription receive.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Stop dispatching to this subscription. Other subscriptions on the same
    /// topic are unaffected.
    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    /// Wait until the subscription reaches `Closed`.
    pub async fn closed(&self) {
        let mut rx = self.state.clone();
        loop {
            if *rx.borrow_and_update() == SubscriptionState::Closed {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("state", &self.state())
            .finish()
    }
}

/// Topic-side record of one subscription.
pub(crate) struct Registration<M: Send + Sync + 'static> {
    pub(crate) id: Uuid,
    pub(crate) handler: Arc<dyn Handler<M>>,
    pub(crate) ctx: Context,
    state: watch::Sender<SubscriptionState>,
    in_flight: Arc<watch::Sender<usize>>,
}

impl<M: Send + Sync + 'static> Registration<M> {
    pub(crate) fn new(handler: Arc<dyn Handler<M>>, ctx: Context) -> Self {
        let (state, _) = watch::channel(SubscriptionState::Idle);
        let (in_flight, _) = watch::channel(0);
        Self {
            id: Uuid::new_v4(),
            handler,
            ctx,
            state,
            in_flight: Arc::new(in_flight),
        }
    }

    pub(crate) fn handle(&self, topic: Arc<str>) -> Subscription {
        Subscription {
            id: self.id,
            topic,
            ctx: self.ctx.clone(),
            state: self.state.subscribe(),
        }
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, state: SubscriptionState) {
        self.state.send_replace(state);
    }

    /// Still eligible for new dispatches.
    pub(crate) fn is_listening(&self) -> bool {
        self.state() == SubscriptionState::Listening && !self.ctx.is_cancelled()
    }

    pub(crate) fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Count one handler call until the returned guard drops (also on panic).
    pub(crate) fn begin_call(&self) -> InFlightGuard {
        self.in_flight.send_modify(|n| *n += 1);
        InFlightGuard {
            counter: Arc::clone(&self.in_flight),
        }
    }

    pub(crate) async fn wait_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        loop {
            if *rx.borrow_and_update() == 0 {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

pub(crate) struct InFlightGuard {
    counter: Arc<watch::Sender<usize>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.send_modify(|n| *n = n.saturating_sub(1));
    }
}
