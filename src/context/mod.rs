//! Cancellation context
//!
//! `Context` is the first argument of every publish, subscribe and handler
//! call. It carries:
//! - a cancellation signal, shared by clones and inherited by children
//! - an optional deadline, after which the context counts as cancelled
//! - an optional request id, attached to log lines of work done on its behalf
//!
//! Cancelling a context cancels every context derived from it with `child`,
//! `with_timeout` or `with_deadline`; cancelling a child leaves the parent
//! untouched.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Context {
    signal: Arc<watch::Sender<bool>>,
    parent: Option<Arc<Context>>,
    deadline: Option<Instant>,
    request_id: Option<Arc<str>>,
}

impl Context {
    /// A root context: never cancelled unless `cancel` is called.
    pub fn background() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal: Arc::new(signal),
            parent: None,
            deadline: None,
            request_id: None,
        }
    }

    /// A new context cancelled together with `self`, but cancellable on its own.
    pub fn child(&self) -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal: Arc::new(signal),
            parent: Some(Arc::new(self.clone())),
            deadline: self.deadline,
            request_id: self.request_id.clone(),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A child context that is cancelled at `deadline` at the latest.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut ctx = self.child();
        ctx.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        ctx
    }

    /// The same context (same cancellation) tagged with a request id.
    pub fn with_request_id(&self, request_id: impl Into<Arc<str>>) -> Self {
        let mut ctx = self.clone();
        ctx.request_id = Some(request_id.into());
        ctx
    }

    pub fn cancel(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        if *self.signal.borrow() {
            return true;
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return true;
        }
        self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Resolves once the context is cancelled, by `cancel`, by an ancestor or
    /// by its deadline.
    pub fn cancelled(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut rx = self.signal.subscribe();
            let own = async move {
                loop {
                    if *rx.borrow_and_update() {
                        return;
                    }
                    // the sender lives as long as `self`
                    if rx.changed().await.is_err() {
                        return;
                    }
                }
            };
            let parent = async {
                match &self.parent {
                    Some(parent) => parent.cancelled().await,
                    None => std::future::pending::<()>().await,
                }
            };
            let deadline = async {
                match self.deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = own => {}
                _ = parent => {}
                _ = deadline => {}
            }
        })
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::Context;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn background_is_not_cancelled() {
        let ctx = Context::background();
        assert!(!ctx.is_cancelled());
        assert!(ctx.deadline().is_none());
        assert!(ctx.request_id().is_none());
    }

    #[test]
    fn cancelling_parent_cancels_child() {
        let parent = Context::background();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn cancelling_child_leaves_parent_alone() {
        let parent = Context::background();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn clones_share_cancellation() {
        let ctx = Context::background();
        let tagged = ctx.with_request_id("req-1");
        tagged.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(tagged.request_id(), Some("req-1"));
    }

    #[test]
    fn request_id_is_inherited() {
        let ctx = Context::background().with_request_id("req-7");
        assert_eq!(ctx.child().request_id(), Some("req-7"));
    }

    #[tokio::test]
    async fn cancelled_resolves_after_cancel_from_another_task() {
        let ctx = Context::background();
        let child = ctx.child();
        let remote = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote.cancel();
        });
        timeout(Duration::from_secs(1), child.cancelled())
            .await
            .expect("child was not cancelled");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_context() {
        let ctx = Context::background().with_timeout(Duration::from_secs(5));
        assert!(!ctx.is_cancelled());
        timeout(Duration::from_secs(10), ctx.cancelled())
            .await
            .expect("deadline did not fire");
        assert!(ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn child_deadline_never_outlives_parent() {
        let parent = Context::background().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
