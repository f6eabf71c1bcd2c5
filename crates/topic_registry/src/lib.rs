// Rust guideline compliant 2026-02-16

//! Ordered collection of recorded topics with live status counters.
//!
//! [`TopicRegistry`] owns one [`Topic`] per subscribed topic, assigned a
//! dense [`domain::TopicId`] in registration order. Status counters are
//! plain atomics so subscriber threads can update them without contending
//! with the periodic stats timer; the design only requires monotonic
//! increase and eventual visibility, not exactness.

use domain::TopicId;
use ratetracker::RateTracker;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Errors raised by [`TopicRegistry`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A topic with this name is already registered.
    #[error("topic already registered: {name}")]
    DuplicateTopic {
        /// The offending topic name.
        name: String,
    },
}

/// A registered topic and its live status.
#[derive(Debug)]
pub struct Topic {
    /// Dense id assigned at registration.
    pub id: TopicId,
    /// Stable topic name.
    pub name: String,
    /// Minimum inter-message interval; `Duration::ZERO` means unlimited.
    pub rate_limit: Duration,

    total_messages: AtomicU64,
    total_bytes: AtomicU64,
    drop_counter: AtomicU64,
    num_publishers: AtomicU32,
    messages_in_stats_period: AtomicU64,
    bytes_in_stats_period: AtomicU64,

    message_rate: Mutex<f64>,
    bandwidth: Mutex<f64>,
    rate_tracker: Mutex<RateTracker>,
    last_message_time: Mutex<Option<Instant>>,
}

impl Topic {
    fn new(id: TopicId, name: String, rate_limit: Duration) -> Self {
        Self {
            id,
            name,
            rate_limit,
            total_messages: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            drop_counter: AtomicU64::new(0),
            num_publishers: AtomicU32::new(0),
            messages_in_stats_period: AtomicU64::new(0),
            bytes_in_stats_period: AtomicU64::new(0),
            message_rate: Mutex::new(0.0),
            bandwidth: Mutex::new(0.0),
            rate_tracker: Mutex::new(RateTracker::new()),
            last_message_time: Mutex::new(None),
        }
    }

    /// Record that a message of `bytes` was just accepted for this topic.
    ///
    /// Called from the subscriber thread that owns this topic's callback.
    pub fn notify_message(&self, bytes: u64) {
        self.total_messages.fetch_add(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.messages_in_stats_period.fetch_add(1, Ordering::Relaxed);
        self.bytes_in_stats_period.fetch_add(bytes, Ordering::Relaxed);

        let now = Instant::now();
        *self.last_message_time.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(now);
        self.rate_tracker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .notify_at(now);
    }

    /// Record that the queue dropped a message that would have gone to this topic.
    pub fn notify_drop(&self) {
        self.drop_counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether `now` falls within `rate_limit` of the last accepted message.
    ///
    /// Returns `false` (never rate-limited) when `rate_limit` is zero or no
    /// message has been observed yet.
    #[must_use]
    pub fn is_rate_limited(&self, now: Instant) -> bool {
        if self.rate_limit.is_zero() {
            return false;
        }
        let last = *self
            .last_message_time
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match last {
            Some(last) => now.saturating_duration_since(last) < self.rate_limit,
            None => false,
        }
    }

    /// The current smooth message-rate estimate at `now`, in messages/second.
    #[must_use]
    pub fn message_rate_at(&self, now: Instant) -> f64 {
        self.rate_tracker
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .rate_at(now)
    }

    /// Total messages ever accepted for this topic.
    #[must_use]
    pub fn total_messages(&self) -> u64 {
        self.total_messages.load(Ordering::Relaxed)
    }

    /// Total payload bytes ever accepted for this topic.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Number of messages dropped by the queue for this topic.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.drop_counter.load(Ordering::Relaxed)
    }

    /// Number of distinct publishers currently seen on this topic.
    #[must_use]
    pub fn num_publishers(&self) -> u32 {
        self.num_publishers.load(Ordering::Relaxed)
    }

    /// Update the publisher count, as polled periodically from the middleware.
    pub fn set_num_publishers(&self, n: u32) {
        self.num_publishers.store(n, Ordering::Relaxed);
    }

    /// The bandwidth (bytes/second) snapshotted by the last [`TopicRegistry::update_stats`] call.
    #[must_use]
    pub fn bandwidth(&self) -> f64 {
        *self.bandwidth.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// The message rate (messages/second) snapshotted by the last [`TopicRegistry::update_stats`] call.
    #[must_use]
    pub fn message_rate(&self) -> f64 {
        *self.message_rate.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn update_stats_window(&self, window: Duration) {
        let secs = window.as_secs_f64();
        if secs <= 0.0 {
            return;
        }
        let messages = self.messages_in_stats_period.swap(0, Ordering::Relaxed);
        let bytes = self.bytes_in_stats_period.swap(0, Ordering::Relaxed);
        #[expect(clippy::cast_precision_loss, reason = "message/byte counts stay far below f64's exact-integer range in practice")]
        {
            *self.message_rate.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = messages as f64 / secs;
            *self.bandwidth.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = bytes as f64 / secs;
        }
    }
}

/// Ordered collection of [`Topic`]s, append-only after registration.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: Vec<Topic>,
}

impl TopicRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { topics: Vec::new() }
    }

    /// Register a new topic, returning its dense id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTopic`] if `name` is already registered.
    pub fn add(&mut self, name: impl Into<String>, rate_limit: Duration) -> Result<TopicId, RegistryError> {
        let name = name.into();
        if self.topics.iter().any(|t| t.name == name) {
            return Err(RegistryError::DuplicateTopic { name });
        }
        let id = self.topics.len();
        log::info!("topic_registry.add: id={id} name={name}");
        self.topics.push(Topic::new(id, name, rate_limit));
        Ok(id)
    }

    /// Look up a topic by id.
    #[must_use]
    pub fn get(&self, id: TopicId) -> Option<&Topic> {
        self.topics.get(id)
    }

    /// Look up a topic by name.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.name == name)
    }

    /// Read-only, order-preserving view of all registered topics.
    #[must_use]
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// Number of registered topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Whether no topics are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Snapshot each topic's period accumulators into `message_rate`/`bandwidth`
    /// and reset the accumulators, as driven by a periodic stats timer.
    pub fn update_stats(&self, window: Duration) {
        for topic in &self.topics {
            topic.update_stats_window(window);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RegistryError, TopicRegistry};
    use std::time::{Duration, Instant};

    #[test]
    fn add_assigns_dense_ids() {
        let mut reg = TopicRegistry::new();
        let a = reg.add("/a", Duration::ZERO).unwrap();
        let b = reg.add("/b", Duration::ZERO).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut reg = TopicRegistry::new();
        reg.add("/a", Duration::ZERO).unwrap();
        let err = reg.add("/a", Duration::ZERO).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateTopic {
                name: "/a".to_owned()
            }
        );
    }

    #[test]
    fn notify_message_increments_totals() {
        let mut reg = TopicRegistry::new();
        reg.add("/a", Duration::ZERO).unwrap();
        let topic = reg.get(0).unwrap();
        topic.notify_message(100);
        topic.notify_message(50);
        assert_eq!(topic.total_messages(), 2);
        assert_eq!(topic.total_bytes(), 150);
    }

    #[test]
    fn drop_is_counted_independently_of_messages() {
        let mut reg = TopicRegistry::new();
        reg.add("/a", Duration::ZERO).unwrap();
        let topic = reg.get(0).unwrap();
        topic.notify_drop();
        topic.notify_drop();
        assert_eq!(topic.drop_count(), 2);
        assert_eq!(topic.total_messages(), 0);
    }

    #[test]
    fn zero_rate_limit_never_limits() {
        let mut reg = TopicRegistry::new();
        reg.add("/a", Duration::ZERO).unwrap();
        let topic = reg.get(0).unwrap();
        topic.notify_message(1);
        assert!(!topic.is_rate_limited(Instant::now()));
    }

    #[test]
    fn nonzero_rate_limit_blocks_immediate_repeat() {
        let mut reg = TopicRegistry::new();
        reg.add("/a", Duration::from_millis(100)).unwrap();
        let topic = reg.get(0).unwrap();
        let t0 = Instant::now();
        topic.notify_message(1);
        assert!(topic.is_rate_limited(t0 + Duration::from_millis(10)));
        assert!(!topic.is_rate_limited(t0 + Duration::from_millis(200)));
    }

    #[test]
    fn update_stats_resets_period_accumulators() {
        let mut reg = TopicRegistry::new();
        reg.add("/a", Duration::ZERO).unwrap();
        let topic = reg.get(0).unwrap();
        topic.notify_message(1000);
        reg.update_stats(Duration::from_secs(1));
        assert!((topic.bandwidth() - 1000.0).abs() < 1e-9);
        // A second window with no new messages must show zero bandwidth.
        reg.update_stats(Duration::from_secs(1));
        assert_eq!(topic.bandwidth(), 0.0);
    }
}
