//! The `error` module defines the error types returned by `topicbus`.
//!
//! Publish and subscribe failures are synchronous return values. Failures
//! inside a running consume loop (undecodable payloads, broker close errors)
//! are never surfaced to callers; they are logged where they happen.

use thiserror::Error;

/// Failure to encode or decode a message value.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("bincode codec: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("json codec: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reported by a broker connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("broker connection is closed")]
    Disconnected,

    #[error("failed to connect to broker at {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("broker rejected publish on channel '{channel}': {reason}")]
    Publish { channel: String, reason: String },

    #[error("broker rejected subscription to channel '{channel}': {reason}")]
    Subscribe { channel: String, reason: String },

    #[error("failed to close subscription to channel '{channel}': {reason}")]
    Close { channel: String, reason: String },
}

/// A topic is bound to one message type and a caller asked for another.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("topic '{topic}' carries {bound}, not {requested}")]
pub struct TopicTypeMismatch {
    pub topic: String,
    pub bound: &'static str,
    pub requested: &'static str,
}

/// Errors returned by [`PubSub::publish`](crate::pubsub::PubSub::publish).
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("topic name must not be empty")]
    EmptyTopic,

    #[error("pubsub service is closed")]
    ServiceClosed,

    #[error("publish to '{topic}' cancelled")]
    Cancelled { topic: String },

    #[error(transparent)]
    TypeMismatch(#[from] TopicTypeMismatch),

    #[error("failed to encode message for '{topic}'")]
    Encode {
        topic: String,
        #[source]
        source: CodecError,
    },

    #[error("failed to deliver message to '{topic}'")]
    Delivery {
        topic: String,
        #[source]
        source: BrokerError,
    },
}

/// Errors returned by [`PubSub::subscribe`](crate::pubsub::PubSub::subscribe).
///
/// Every variant is produced before a broker subscription is opened, except
/// `Broker`, which reports that opening one failed.
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("topic name must not be empty")]
    EmptyTopic,

    #[error("pubsub service is closed")]
    ServiceClosed,

    #[error("subscription to '{topic}' cancelled before it started")]
    Cancelled { topic: String },

    #[error(transparent)]
    TypeMismatch(#[from] TopicTypeMismatch),

    #[error("failed to open broker subscription for '{topic}'")]
    Broker {
        topic: String,
        #[source]
        source: BrokerError,
    },
}
