//! CLI for topicbus
//!
//! Subcommands:
//! - `listen`: log every greeting published on a topic until Ctrl-C
//! - `publish`: publish greetings to a topic
//! - `demo`: in-process round trip over the memory broker (useful for smoke tests)

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use topicbus::broker::{self, MemoryBroker};
use topicbus::config::{Settings, load_config};
use topicbus::utils::logging;
use topicbus::{Context, PubSub};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "topicbus")]
enum Command {
    /// Log greetings published on a topic until Ctrl-C
    Listen {
        #[arg(long, default_value = "greetings")]
        topic: String,
    },
    /// Publish greetings to a topic
    Publish {
        #[arg(long, default_value = "greetings")]
        topic: String,
        #[arg(long)]
        name: String,
        /// Number of greetings to send
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Subscribe, publish and receive once over the in-process broker
    Demo,
}

/// Message type used by every subcommand.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Greeting {
    name: String,
    /// Unix timestamp in milliseconds.
    sent_at: i64,
}

impl Greeting {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sent_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            return;
        }
    };
    logging::init(&settings.logging.level);

    let result = match Command::parse() {
        Command::Listen { topic } => run_listen(&settings, &topic).await,
        Command::Publish { topic, name, count } => {
            run_publish(&settings, &topic, &name, count).await
        }
        Command::Demo => run_demo(&settings).await,
    };

    if let Err(e) = result {
        error!("topicbus failed: {}", e);
    }
}

async fn run_listen(settings: &Settings, topic: &str) -> Result<(), Box<dyn std::error::Error>> {
    let connection = broker::connect(&settings.broker).await?;
    let pubsub = PubSub::with_settings(connection, settings.dispatch.clone());
    let ctx = Context::background();

    pubsub
        .subscribe::<Greeting, _>(&ctx, topic, |_ctx: Context, msg: Arc<Greeting>| async move {
            let latency = chrono::Utc::now().timestamp_millis() - msg.sent_at;
            info!(name = %msg.name, latency_ms = latency, "greeting received");
        })
        .await?;
    info!(topic, backend = ?settings.broker.backend, "listening, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully.");
    pubsub.close().await;
    Ok(())
}

async fn run_publish(
    settings: &Settings,
    topic: &str,
    name: &str,
    count: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let connection = broker::connect(&settings.broker).await?;
    let pubsub = PubSub::with_settings(connection, settings.dispatch.clone());
    let ctx = Context::background().with_timeout(Duration::from_secs(5));

    for _ in 0..count {
        pubsub.publish(&ctx, topic, &Greeting::new(name)).await?;
    }
    info!(topic, count, "greetings published");

    pubsub.close().await;
    Ok(())
}

async fn run_demo(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let connection = Arc::new(MemoryBroker::new(settings.broker.channel_capacity));
    let pubsub = PubSub::with_settings(connection, settings.dispatch.clone());
    let ctx = Context::background().with_request_id("demo");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let subscription = pubsub
        .subscribe::<Greeting, _>(&ctx, "demo", move |ctx: Context, msg: Arc<Greeting>| {
            let tx = tx.clone();
            async move {
                info!(request_id = ctx.request_id().unwrap_or("-"), name = %msg.name, "demo handler called");
                let _ = tx.send(msg.name.clone());
            }
        })
        .await?;

    pubsub.publish(&ctx, "demo", &Greeting::new("test-one")).await?;

    match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
        Ok(Some(name)) => info!(name = %name, "demo round trip complete"),
        _ => error!("demo greeting was not delivered"),
    }

    pubsub.close().await;
    info!(state = ?subscription.state(), "demo finished");
    Ok(())
}
