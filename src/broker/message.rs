use std::sync::Arc;

use bytes::Bytes;

/// A payload received from a broker subscription.
///
/// `channel` is the broker channel the payload arrived on; for the exact-name
/// subscriptions opened by `topicbus` it equals the topic name. The payload is
/// still encoded; decoding is the dispatcher's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel: Arc<str>,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(channel: impl Into<Arc<str>>, payload: impl Into<Bytes>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}
