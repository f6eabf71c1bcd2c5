// Rust guideline compliant 2026-02-16

//! Subscriber component -- drains a middleware subscription into the queue.
//!
//! [`Subscriber`] owns one [`domain::MessageSource`] (one topic) and forwards
//! accepted messages into a shared [`msgqueue::MessageQueue`], applying the
//! topic's rate limit and attributing overflow drops back to the topic's
//! [`topic_registry::Topic`] counters. Generic over `S: MessageSource` for
//! static dispatch -- no concrete transport is referenced here.

use domain::{MessageSource, TopicId};
use msgqueue::{MessageQueue, PushOutcome};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use topic_registry::TopicRegistry;

/// Cadence at which the subscriber re-polls its source's publisher count.
/// Deliberately much coarser than the per-message path, since a middleware
/// registry lookup is far more expensive than receiving a message.
pub const PUBLISHER_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Errors raised when constructing or running a [`Subscriber`].
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    /// The configured `topic_id` has no corresponding entry in the registry.
    #[error("unknown topic id: {id}")]
    UnknownTopic {
        /// The offending id.
        id: TopicId,
    },
}

/// Drains one [`MessageSource`] into the shared queue for a single topic.
#[derive(Debug)]
pub struct Subscriber<S: MessageSource> {
    topic_id: TopicId,
    source: S,
}

impl<S: MessageSource> Subscriber<S> {
    /// Create a subscriber for `topic_id`, reading from `source`.
    #[must_use]
    pub fn new(topic_id: TopicId, source: S) -> Self {
        Self { topic_id, source }
    }

    /// Run the drain loop until `source` is exhausted (returns `None`).
    ///
    /// For each message: checks the topic's rate limit (silent drop, not
    /// counted as overflow); otherwise notifies the topic and attempts
    /// `queue.push`, incrementing the topic's drop counter on overflow.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriberError::UnknownTopic`] if `topic_id` is not present
    /// in `registry`; this is checked once up front.
    pub fn run(
        mut self,
        registry: &Arc<TopicRegistry>,
        queue: &Arc<MessageQueue>,
    ) -> Result<(), SubscriberError> {
        let topic = registry
            .get(self.topic_id)
            .ok_or(SubscriberError::UnknownTopic { id: self.topic_id })?;

        let mut last_publisher_poll: Option<Instant> = None;

        while let Some(msg) = self.source.recv() {
            let now = Instant::now();

            if last_publisher_poll.is_none_or(|last| now.saturating_duration_since(last) >= PUBLISHER_POLL_INTERVAL) {
                topic.set_num_publishers(self.source.publisher_count());
                last_publisher_poll = Some(now);
            }

            if topic.is_rate_limited(now) {
                continue;
            }
            #[expect(clippy::cast_possible_truncation, reason = "message sizes stay far below u64::MAX")]
            topic.notify_message(msg.size() as u64);
            match queue.push(msg) {
                PushOutcome::Accepted => {}
                PushOutcome::Dropped => {
                    topic.notify_drop();
                    log::debug!(
                        "subscriber.overflow: topic_id={} drops={}",
                        self.topic_id,
                        topic.drop_count()
                    );
                }
            }
        }
        log::info!("subscriber.run.exhausted: topic_id={}", self.topic_id);
        Ok(())
    }
}

impl<S: MessageSource + Send + 'static> Subscriber<S> {
    /// Spawn the drain loop on its own OS thread, returning its join handle.
    ///
    /// The caller owns the returned handle and is responsible for joining it
    /// during shutdown (mirrors the writer/reaper thread ownership pattern).
    #[must_use]
    pub fn spawn(
        self,
        registry: Arc<TopicRegistry>,
        queue: Arc<MessageQueue>,
    ) -> JoinHandle<Result<(), SubscriberError>> {
        std::thread::spawn(move || self.run(&registry, &queue))
    }
}

#[cfg(test)]
mod tests {
    use super::Subscriber;
    use domain::{Message, MessageSource};
    use msgqueue::MessageQueue;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};
    use topic_registry::TopicRegistry;

    /// Yields a fixed set of messages then signals exhaustion.
    struct ScriptedSource {
        remaining: std::vec::IntoIter<Message>,
    }

    impl ScriptedSource {
        fn new(messages: Vec<Message>) -> Self {
            Self {
                remaining: messages.into_iter(),
            }
        }
    }

    impl MessageSource for ScriptedSource {
        fn recv(&mut self) -> Option<Message> {
            self.remaining.next()
        }
    }

    fn msg(topic_id: usize) -> Message {
        Message {
            topic_name: "/a".to_owned(),
            topic_id,
            payload: vec![1, 2, 3],
            receive_time: SystemTime::now(),
        }
    }

    #[test]
    fn all_messages_land_in_queue_when_unlimited() {
        let mut registry = TopicRegistry::new();
        let id = registry.add("/a", Duration::ZERO).unwrap();
        let registry = Arc::new(registry);
        let queue = Arc::new(MessageQueue::new(10_000));

        let source = ScriptedSource::new(vec![msg(id), msg(id), msg(id)]);
        let sub = Subscriber::new(id, source);
        sub.run(&registry, &queue).unwrap();

        assert_eq!(registry.get(id).unwrap().total_messages(), 3);
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_some());
        assert_eq!(queue.byte_occupancy(), 0);
    }

    #[test]
    fn overflow_is_attributed_to_topic_drop_counter() {
        let mut registry = TopicRegistry::new();
        let id = registry.add("/a", Duration::ZERO).unwrap();
        let registry = Arc::new(registry);
        let one_size = msg(id).size();
        let queue = Arc::new(MessageQueue::new(one_size));

        let source = ScriptedSource::new(vec![msg(id), msg(id), msg(id)]);
        let sub = Subscriber::new(id, source);
        sub.run(&registry, &queue).unwrap();

        let topic = registry.get(id).unwrap();
        assert_eq!(topic.total_messages(), 3, "notify_message happens before push");
        assert_eq!(topic.drop_count(), 2, "queue holds one message; two must be dropped");
    }

    #[test]
    fn unknown_topic_id_is_rejected() {
        let registry = Arc::new(TopicRegistry::new());
        let queue = Arc::new(MessageQueue::new(1024));
        let sub = Subscriber::new(0, ScriptedSource::new(vec![]));
        let err = sub.run(&registry, &queue).unwrap_err();
        assert!(matches!(err, super::SubscriberError::UnknownTopic { id: 0 }));
    }

    /// Reports a fixed publisher count alongside a scripted message sequence.
    struct CountingSource {
        remaining: std::vec::IntoIter<Message>,
        publishers: u32,
    }

    impl domain::MessageSource for CountingSource {
        fn recv(&mut self) -> Option<Message> {
            self.remaining.next()
        }

        fn publisher_count(&self) -> u32 {
            self.publishers
        }
    }

    #[test]
    fn publisher_count_is_polled_and_wired_into_the_topic() {
        let mut registry = TopicRegistry::new();
        let id = registry.add("/a", Duration::ZERO).unwrap();
        let registry = Arc::new(registry);
        let queue = Arc::new(MessageQueue::new(10_000));

        let source = CountingSource {
            remaining: vec![msg(id), msg(id)].into_iter(),
            publishers: 3,
        };
        Subscriber::new(id, source).run(&registry, &queue).unwrap();

        assert_eq!(registry.get(id).unwrap().num_publishers(), 3);
    }
}
