// Rust guideline compliant 2026-02-16

//! Thread-safe, byte-bounded FIFO message queue with cooperative shutdown.
//!
//! [`MessageQueue`] sits between the subscriber threads (producers) and the
//! writer thread (the sole consumer). Capacity is enforced in bytes, not
//! message count, via `Message::size`. The producer side never blocks: a
//! push that would exceed capacity is tail-dropped and the caller is told so
//! it can attribute the drop to the right topic.

use domain::Message;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Result of a [`MessageQueue::push`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The message was appended to the queue.
    Accepted,
    /// The queue was full or shut down; the message was discarded.
    Dropped,
}

struct Inner {
    queue: VecDeque<Message>,
    occupancy: usize,
    shutdown: bool,
    drop_count: u64,
}

/// Bounded-by-bytes FIFO. Safe to share via `Arc` across subscriber threads
/// and the single writer thread.
#[derive(Debug)]
pub struct MessageQueue {
    capacity: usize,
    state: Mutex<Inner>,
    not_empty: Condvar,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("len", &self.queue.len())
            .field("occupancy", &self.occupancy)
            .field("shutdown", &self.shutdown)
            .field("drop_count", &self.drop_count)
            .finish()
    }
}

impl MessageQueue {
    /// Create a queue with the given total byte capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(Inner {
                queue: VecDeque::new(),
                occupancy: 0,
                shutdown: false,
                drop_count: 0,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Total byte capacity of the queue.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current total byte occupancy.
    #[must_use]
    pub fn byte_occupancy(&self) -> usize {
        self.lock().occupancy
    }

    /// Number of messages dropped for capacity or shutdown reasons so far.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.lock().drop_count
    }

    /// Append `msg` unless it would exceed capacity or the queue is shut
    /// down. Never blocks.
    pub fn push(&self, msg: Message) -> PushOutcome {
        let size = msg.size();
        let mut state = self.lock();
        if state.shutdown || state.occupancy + size > self.capacity {
            state.drop_count += 1;
            return PushOutcome::Dropped;
        }
        state.occupancy += size;
        state.queue.push_back(msg);
        drop(state);
        self.not_empty.notify_one();
        PushOutcome::Accepted
    }

    /// Block until a message is available or the queue shuts down.
    ///
    /// On shutdown, any messages still buffered are drained (returned one at
    /// a time by successive `pop` calls) before `pop` starts returning `None`.
    /// This is the resolved choice for the documented drain-vs-immediate-stop
    /// ambiguity: a clean shutdown never silently discards already-accepted
    /// data.
    pub fn pop(&self) -> Option<Message> {
        let mut state = self.lock();
        loop {
            if let Some(msg) = state.queue.pop_front() {
                state.occupancy -= msg.size();
                return Some(msg);
            }
            if state.shutdown {
                return None;
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Idempotently signal shutdown and wake any blocked `pop` callers.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        drop(state);
        log::info!("msgqueue.shutdown");
        self.not_empty.notify_all();
    }

    /// Whether shutdown has been signaled.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{MessageQueue, PushOutcome};
    use domain::Message;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    fn msg(payload_len: usize) -> Message {
        Message {
            topic_name: "/a".to_owned(),
            topic_id: 0,
            payload: vec![0u8; payload_len],
            receive_time: SystemTime::now(),
        }
    }

    #[test]
    fn push_accepted_until_capacity_reached() {
        let one_msg_size = msg(0).size();
        let queue = MessageQueue::new(one_msg_size);
        assert_eq!(queue.push(msg(0)), PushOutcome::Accepted);
        assert_eq!(queue.push(msg(0)), PushOutcome::Dropped);
        assert_eq!(queue.drop_count(), 1);
    }

    #[test]
    fn occupancy_never_exceeds_capacity() {
        let queue = MessageQueue::new(1024);
        for _ in 0..100 {
            queue.push(msg(100));
        }
        assert!(queue.byte_occupancy() <= 1024);
    }

    #[test]
    fn pop_returns_in_fifo_order() {
        let queue = MessageQueue::new(10_000);
        queue.push(Message {
            topic_name: "/a".to_owned(),
            ..msg(0)
        });
        queue.push(Message {
            topic_name: "/b".to_owned(),
            ..msg(0)
        });
        assert_eq!(queue.pop().unwrap().topic_name, "/a");
        assert_eq!(queue.pop().unwrap().topic_name, "/b");
    }

    #[test]
    fn shutdown_with_empty_queue_returns_none() {
        let queue = MessageQueue::new(1024);
        queue.shutdown();
        assert!(queue.pop().is_none());
    }

    #[test]
    fn shutdown_drains_remaining_before_none() {
        let queue = MessageQueue::new(10_000);
        queue.push(msg(10));
        queue.push(msg(10));
        queue.shutdown();
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn push_after_shutdown_is_dropped() {
        let queue = MessageQueue::new(10_000);
        queue.shutdown();
        assert_eq!(queue.push(msg(10)), PushOutcome::Dropped);
    }

    #[test]
    fn blocking_pop_wakes_on_push_from_another_thread() {
        let queue = Arc::new(MessageQueue::new(10_000));
        let producer = Arc::clone(&queue);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.push(msg(10));
        });
        let popped = queue.pop();
        assert!(popped.is_some());
        handle.join().unwrap();
    }

    #[test]
    fn blocking_pop_wakes_on_shutdown_from_another_thread() {
        let queue = Arc::new(MessageQueue::new(10_000));
        let shutter = Arc::clone(&queue);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            shutter.shutdown();
        });
        assert!(queue.pop().is_none());
        handle.join().unwrap();
    }
}
