//! Topic management
//!
//! A `Topic` is created the first time a name is published to or subscribed
//! to and lives as long as its registry. Its first subscription binds it to
//! one message type; from then on every subscriber and publisher of the
//! topic must use that type.
//!
//! The registry is a concurrent map, so work on one topic never waits for
//! work on another. Each topic guards its own binding and handler list.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

use super::dispatch::Dispatcher;
use crate::codec::Message;
use crate::utils::error::TopicTypeMismatch;

/// Type-erased view of a topic's dispatcher.
pub(crate) trait TopicDispatcher: Send + Sync + 'static {
    fn handler_count(&self) -> usize;
    fn active_handler_count(&self) -> usize;
    fn is_listening(&self) -> bool;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

struct Binding {
    type_id: TypeId,
    type_name: &'static str,
    dispatcher: Arc<dyn TopicDispatcher>,
}

pub struct Topic {
    name: Arc<str>,
    binding: Mutex<Option<Binding>>,
}

impl Topic {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            binding: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type name of the message the topic is bound to, if any.
    pub fn message_type(&self) -> Option<&'static str> {
        self.with_binding(|b| b.map(|b| b.type_name))
    }

    /// Handlers ever attached, cancelled ones included.
    pub fn handler_count(&self) -> usize {
        self.with_binding(|b| b.map_or(0, |b| b.dispatcher.handler_count()))
    }

    /// Handlers that still receive messages.
    pub fn active_handler_count(&self) -> usize {
        self.with_binding(|b| b.map_or(0, |b| b.dispatcher.active_handler_count()))
    }

    /// Whether a broker subscription is currently feeding this topic.
    pub fn is_listening(&self) -> bool {
        self.with_binding(|b| b.is_some_and(|b| b.dispatcher.is_listening()))
    }

    /// Ok if the topic is unbound or bound to `M`.
    pub fn check_type<M: 'static>(&self) -> Result<(), TopicTypeMismatch> {
        self.with_binding(|b| match b {
            Some(b) if b.type_id != TypeId::of::<M>() => Err(self.mismatch::<M>(b.type_name)),
            _ => Ok(()),
        })
    }

    /// Bind the topic to `M` on first use and return its dispatcher.
    pub(crate) fn bind<M: Message>(
        &self,
        max_in_flight: usize,
    ) -> Result<Arc<Dispatcher<M>>, TopicTypeMismatch> {
        let mut binding = self.binding.lock().unwrap_or_else(PoisonError::into_inner);

        let binding = binding.get_or_insert_with(|| Binding {
            type_id: TypeId::of::<M>(),
            type_name: type_name::<M>(),
            dispatcher: Arc::new(Dispatcher::<M>::new(Arc::clone(&self.name), max_in_flight)),
        });

        if binding.type_id != TypeId::of::<M>() {
            return Err(self.mismatch::<M>(binding.type_name));
        }

        Arc::clone(&binding.dispatcher)
            .into_any()
            .downcast::<Dispatcher<M>>()
            .map_err(|_| self.mismatch::<M>(binding.type_name))
    }

    fn with_binding<R>(&self, f: impl FnOnce(Option<&Binding>) -> R) -> R {
        let binding = self.binding.lock().unwrap_or_else(PoisonError::into_inner);
        f(binding.as_ref())
    }

    fn mismatch<M: 'static>(&self, bound: &'static str) -> TopicTypeMismatch {
        TopicTypeMismatch {
            topic: self.name.to_string(),
            bound,
            requested: type_name::<M>(),
        }
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("message_type", &self.message_type())
            .field("handlers", &self.handler_count())
            .finish()
    }
}

/// Topic name -> `Topic`.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: DashMap<String, Arc<Topic>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the topic called `name`, creating it on first use. Repeated
    /// calls return the same `Arc`.
    pub fn get_or_create(&self, name: &str) -> Arc<Topic> {
        if let Some(topic) = self.topics.get(name) {
            return Arc::clone(topic.value());
        }
        let entry = self
            .topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Topic::new(name)));
        Arc::clone(entry.value())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics.get(name).map(|t| Arc::clone(t.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.topics.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Topic names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }
}
