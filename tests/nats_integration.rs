//! Round trip over a real NATS server.
//!
//! Needs a running server; run with
//! `NATS_URL=nats://127.0.0.1:4222 cargo test -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::timeout;
use topicbus::broker::NatsBroker;
use topicbus::{Context, PubSub, SubscriptionState};

#[derive(Debug, Serialize, Deserialize)]
struct Greeting {
    name: String,
}

fn nats_url() -> String {
    std::env::var("NATS_URL").unwrap_or_else(|_| "nats://127.0.0.1:4222".to_string())
}

#[tokio::test]
#[ignore = "requires a NATS server"]
async fn test_nats_publish_reaches_subscribers() {
    let broker = NatsBroker::connect(&nats_url()).await.unwrap();
    let pubsub = PubSub::new(Arc::new(broker));
    let ctx = Context::background();
    let topic = format!("topicbus-it-{}", uuid::Uuid::new_v4());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let first_tx = tx.clone();
    pubsub
        .subscribe::<Greeting, _>(&ctx, &topic, move |_ctx: Context, msg: Arc<Greeting>| {
            let tx = first_tx.clone();
            async move {
                let _ = tx.send(format!("first:{}", msg.name));
            }
        })
        .await
        .unwrap();
    let sub = pubsub
        .subscribe::<Greeting, _>(&ctx, &topic, move |_ctx: Context, msg: Arc<Greeting>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(format!("second:{}", msg.name));
            }
        })
        .await
        .unwrap();

    pubsub
        .publish(
            &ctx,
            &topic,
            &Greeting {
                name: "test-one".to_string(),
            },
        )
        .await
        .unwrap();

    let mut seen = Vec::new();
    for _ in 0..2 {
        let got = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        seen.push(got);
    }
    seen.sort();
    assert_eq!(seen, vec!["first:test-one", "second:test-one"]);

    pubsub.close().await;
    assert_eq!(sub.state(), SubscriptionState::Closed);
}
