//! # topicbus
//!
//! `topicbus` layers typed, named topics over a shared message broker. A
//! process publishes structured messages to a topic; every handler subscribed
//! to that topic receives the decoded value, each in its own task.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `pubsub`: The `PubSub` service, topic registry, and per-topic dispatch.
//! - `broker`: The broker connection contract plus in-memory and NATS backends.
//! - `codec`: Message encoding (bincode or JSON).
//! - `context`: Cancellation, deadlines and request ids passed through every call.
//! - `config`: Handles loading configuration from file and environment.
//! - `utils`: Contains shared utilities, such as error types and logging setup.

pub mod broker;
pub mod codec;
pub mod config;
pub mod context;
pub mod pubsub;
pub mod utils;

pub use codec::{Codec, Message};
pub use context::Context;
pub use pubsub::{Handler, PubSub, Subscription, SubscriptionState};
pub use utils::error::{PublishError, SubscribeError};
