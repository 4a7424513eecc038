use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;

/// A message handler attached to a topic.
///
/// The handler's shape is fixed by the type system: it takes the
/// subscription's `Context` and a shared reference to the decoded message,
/// and the message type `M` decides how inbound payloads are decoded.
///
/// Any `Fn(Context, Arc<M>) -> impl Future<Output = ()>` closure is a
/// handler:
///
/// ```rust,ignore
/// pubsub
///     .subscribe::<Greeting, _>(&ctx, "greetings", |_ctx: Context, msg: Arc<Greeting>| async move {
///         tracing::info!(name = %msg.name, "hello");
///     })
///     .await?;
/// ```
///
/// Every invocation runs in its own task; one message may be handled by
/// several handlers at the same time.
#[async_trait]
pub trait Handler<M: Send + Sync + 'static>: Send + Sync + 'static {
    async fn handle(&self, ctx: Context, message: Arc<M>);
}

#[async_trait]
impl<M, F, Fut> Handler<M> for F
where
    M: Send + Sync + 'static,
    F: Fn(Context, Arc<M>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, ctx: Context, message: Arc<M>) {
        (self)(ctx, message).await
    }
}
