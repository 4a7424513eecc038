//! The `pubsub` module is the heart of `topicbus`: typed topics layered over
//! a broker connection.
//!
//! - `service`: the `PubSub` handle with `publish`, `subscribe` and `close`
//! - `topic`: the topic registry and each topic's message-type binding
//! - `dispatch`: the per-topic consume loop that decodes and fans out
//! - `subscription`: subscription handles and their lifecycle states
//! - `handler`: the `Handler` trait user code implements

mod dispatch;
pub mod handler;
pub mod service;
pub mod subscription;
pub mod topic;

pub use handler::Handler;
pub use service::PubSub;
pub use subscription::{Subscription, SubscriptionState};
pub use topic::{Topic, TopicRegistry};
