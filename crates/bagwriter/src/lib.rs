// Rust guideline compliant 2026-02-16

//! BagWriter -- the central recording engine.
//!
//! A single writer thread drains the shared [`msgqueue::MessageQueue`] and
//! writes each accepted message into the currently-open bag segment via an
//! injected [`domain::BagWriterBackend`]. Handles file naming, collision
//! avoidance, size-triggered rotation, `/tf_static` replay into every new
//! segment, and runtime-switchable compression.

use domain::{
    BagError, BagWriterBackend, Compression, CurrentSegmentHandle, Message, Naming,
    tf::{self, StaticTransform},
};
use msgqueue::MessageQueue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Reserved topic name whose payload is the full static-transform cache.
pub const STATIC_TF_TOPIC: &str = "/tf_static";

/// Errors raised by [`BagWriter`] configuration.
#[derive(Debug, thiserror::Error)]
pub enum BagWriterError {
    /// `split_bag_size` and `delete_old_at` were both given and the latter
    /// is smaller than the former; recording would thrash between rotation
    /// and deletion. Not fatal -- callers should warn, not reject.
    #[error("split-bag-size ({split}) is larger than delete-old-at ({delete_old_at})")]
    SplitLargerThanRetention {
        /// Configured rotation threshold, in bytes.
        split: u64,
        /// Configured retention budget, in bytes.
        delete_old_at: u64,
    },
}

/// Produces a fresh [`BagWriterBackend`] for a newly chosen path.
///
/// Injected so the writer never depends on a concrete bag file format.
pub trait BagBackendFactory: Send + Sync {
    /// Open (create or truncate) a new segment at `path`.
    ///
    /// # Errors
    /// Returns [`BagError::Open`] if the backend cannot be created.
    fn open(&self, path: &Path) -> Result<Box<dyn BagWriterBackend>, BagError>;
}

impl<F> BagBackendFactory for F
where
    F: Fn(&Path) -> Result<Box<dyn BagWriterBackend>, BagError> + Send + Sync,
{
    fn open(&self, path: &Path) -> Result<Box<dyn BagWriterBackend>, BagError> {
        self(path)
    }
}

struct Segment {
    backend: Box<dyn BagWriterBackend>,
    path: PathBuf,
}

struct Inner {
    naming: Naming,
    compression: Compression,
    segment: Option<Segment>,
    is_running: bool,
    is_reopening: bool,
    message_counts: Vec<u64>,
    byte_counts: Vec<u64>,
    static_tf_cache: BTreeMap<String, StaticTransform>,
}

/// The central recording engine. Share via `Arc` between the caller thread
/// (start/stop/status) and the dedicated writer thread ([`BagWriter::spawn`]).
pub struct BagWriter {
    factory: Box<dyn BagBackendFactory>,
    split_size_bytes: u64,
    queue: Arc<MessageQueue>,
    current_segment: CurrentSegmentHandle,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for BagWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BagWriter")
            .field("split_size_bytes", &self.split_size_bytes)
            .finish_non_exhaustive()
    }
}

impl BagWriter {
    /// Create a writer. Recording does not start until [`start`](Self::start)
    /// is called.
    #[must_use]
    pub fn new(
        factory: Box<dyn BagBackendFactory>,
        naming: Naming,
        split_size_bytes: u64,
        queue: Arc<MessageQueue>,
        current_segment: CurrentSegmentHandle,
    ) -> Self {
        Self {
            factory,
            split_size_bytes,
            queue,
            current_segment,
            inner: Mutex::new(Inner {
                naming,
                compression: Compression::None,
                segment: None,
                is_running: false,
                is_reopening: false,
                message_counts: Vec::new(),
                byte_counts: Vec::new(),
                static_tf_cache: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Set the compression mode for the currently-open (and future) segments.
    pub fn set_compression(&self, compression: Compression) {
        let mut inner = self.lock();
        inner.compression = compression;
        if let Some(segment) = &mut inner.segment {
            segment.backend.set_compression(compression);
        }
    }

    /// Whether writes are currently being accepted.
    #[must_use]
    pub fn running(&self) -> bool {
        self.lock().is_running
    }

    /// Whether a file is currently open (independent of `running`, relevant
    /// to Verbatim naming's paused-but-open state).
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock().segment.is_some()
    }

    /// Transient: true only during the `stop(); start()` bridge of a rotation.
    #[must_use]
    pub fn is_reopening(&self) -> bool {
        self.lock().is_reopening
    }

    /// The path of the currently-open segment, if any.
    #[must_use]
    pub fn bagfile_name(&self) -> Option<PathBuf> {
        self.lock().segment.as_ref().map(|s| s.path.clone())
    }

    /// Bytes written to the currently-open segment, or 0 if none is open.
    #[must_use]
    pub fn size_in_bytes(&self) -> u64 {
        self.lock().segment.as_ref().map_or(0, |s| s.backend.size())
    }

    /// Snapshot of per-topic message counts written into the current segment,
    /// indexed by topic id. Resets on every rotation.
    #[must_use]
    pub fn message_counts(&self) -> Vec<u64> {
        self.lock().message_counts.clone()
    }

    /// Snapshot of per-topic byte counts written into the current segment.
    #[must_use]
    pub fn byte_counts(&self) -> Vec<u64> {
        self.lock().byte_counts.clone()
    }

    /// Open a new segment and start accepting writes.
    ///
    /// On a naming/collision/backend failure, logs the error and leaves the
    /// writer closed rather than propagating a fatal error -- a later
    /// `start()` call may retry.
    pub fn start(&self) {
        let mut inner = self.lock();
        if inner.segment.is_some() && inner.is_running {
            return;
        }

        let path = match &inner.naming {
            Naming::Verbatim { path } if inner.segment.is_some() => {
                // Resuming a Verbatim segment that `stop()` left open.
                let path = path.clone();
                inner.is_running = true;
                log::info!("bagwriter.start.resume: path={}", path.display());
                return;
            }
            Naming::Verbatim { path } => path.clone(),
            Naming::AppendTimestamp { prefix } => {
                let stamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
                PathBuf::from(format!("{prefix}_{stamp}.bag"))
            }
        };

        let resolved = match resolve_collision(&path) {
            Some(p) => p,
            None => {
                log::error!(
                    "bagwriter.start.collision_exhausted: path={}",
                    path.display()
                );
                return;
            }
        };

        // Hold the cleanup mutex across the open so the reaper never sees a
        // half-open segment.
        let mut current = self
            .current_segment
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut backend = match self.factory.open(&resolved) {
            Ok(b) => b,
            Err(e) => {
                log::error!("bagwriter.start.open_failed: path={} err={e}", resolved.display());
                return;
            }
        };
        backend.set_compression(inner.compression);

        inner.message_counts.clear();
        inner.byte_counts.clear();

        if !inner.static_tf_cache.is_empty() {
            let transforms: Vec<StaticTransform> = inner.static_tf_cache.values().cloned().collect();
            let payload = tf::encode(&transforms);
            if let Ok(conn_id) = backend.connection(STATIC_TF_TOPIC, "tf/tfMessage", true) {
                if let Err(e) = backend.write(conn_id, SystemTime::now(), &payload) {
                    log::error!("bagwriter.start.tf_replay_failed: {e}");
                }
            }
        }

        *current = Some(resolved.clone());
        drop(current);

        log::info!("bagwriter.start: path={}", resolved.display());
        inner.segment = Some(Segment {
            backend,
            path: resolved,
        });
        inner.is_running = true;
    }

    /// Stop accepting writes. AppendTimestamp naming closes the file;
    /// Verbatim naming leaves it open for a later `start()` to resume.
    pub fn stop(&self) {
        let mut inner = self.lock();
        inner.is_running = false;
        let close_file = matches!(inner.naming, Naming::AppendTimestamp { .. });
        if close_file {
            if let Some(segment) = inner.segment.take() {
                log::info!("bagwriter.stop.close: path={}", segment.path.display());
                if let Err(e) = segment.backend.close() {
                    log::error!("bagwriter.stop.close_failed: {e}");
                }
            }
        } else {
            log::info!("bagwriter.stop.pause");
        }
    }

    fn ensure_len(vec: &mut Vec<u64>, len: usize) {
        if vec.len() <= len {
            vec.resize(len + 1, 0);
        }
    }

    /// Handle exactly one dequeued message: write it (if running), fold
    /// `/tf_static` payloads into the cache, and rotate if the split
    /// threshold has been crossed.
    fn handle_message(&self, msg: Message) {
        let is_tf_static = msg.topic_name == STATIC_TF_TOPIC;
        let mut should_rotate = false;

        {
            let mut inner = self.lock();
            if inner.is_running {
                if let Some(segment) = &mut inner.segment {
                    let msg_type = if is_tf_static { "tf/tfMessage" } else { "raw/bytes" };
                    let mut wrote_ok = false;
                    match segment.backend.connection(&msg.topic_name, msg_type, is_tf_static) {
                        Ok(conn_id) => {
                            if let Err(e) = segment.backend.write(conn_id, msg.receive_time, &msg.payload) {
                                log::error!("bagwriter.write_failed: topic={} err={e}", msg.topic_name);
                            } else {
                                wrote_ok = true;
                            }
                        }
                        Err(e) => log::error!("bagwriter.connection_failed: {e}"),
                    }
                    let bytes_written = segment.backend.size();
                    should_rotate = self.split_size_bytes > 0 && bytes_written >= self.split_size_bytes;
                    if wrote_ok {
                        Self::ensure_len(&mut inner.message_counts, msg.topic_id);
                        Self::ensure_len(&mut inner.byte_counts, msg.topic_id);
                        inner.message_counts[msg.topic_id] += 1;
                        #[expect(clippy::cast_possible_truncation, reason = "payload lengths stay well under u64::MAX")]
                        {
                            inner.byte_counts[msg.topic_id] += msg.payload.len() as u64;
                        }
                    }
                }
            }

            if is_tf_static {
                if let Some(transforms) = tf::decode(&msg.payload) {
                    for t in transforms {
                        inner.static_tf_cache.insert(t.child_frame.clone(), t);
                    }
                }
            }
        }

        if should_rotate {
            let mut inner = self.lock();
            inner.is_reopening = true;
            drop(inner);
            self.stop_for_rotation();
            self.start();
            self.lock().is_reopening = false;
        }
    }

    /// Rotation always closes the physical file regardless of naming mode,
    /// since a new segment must be opened immediately after.
    fn stop_for_rotation(&self) {
        let mut inner = self.lock();
        if let Some(segment) = inner.segment.take() {
            log::info!("bagwriter.rotate.close: path={}", segment.path.display());
            if let Err(e) = segment.backend.close() {
                log::error!("bagwriter.rotate.close_failed: {e}");
            }
        }
    }

    /// Run the drain loop on the calling thread until the queue shuts down
    /// and drains empty. Call via [`std::thread::spawn`] for the writer
    /// thread described in the concurrency model.
    pub fn run(&self) {
        while let Some(msg) = self.queue.pop() {
            self.handle_message(msg);
        }
        log::info!("bagwriter.run.exit");
    }

    /// Spawn the writer loop on its own OS thread.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || self.run())
    }
}

/// If `path` exists, try `.2`..`.9` suffixes before the extension; return the
/// first name that does not exist, or `None` if all are taken.
fn resolve_collision(path: &Path) -> Option<PathBuf> {
    if !path.exists() {
        return Some(path.to_path_buf());
    }
    let stem = path.file_stem().unwrap_or_default().to_string_lossy().into_owned();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    for suffix in 2..=9 {
        let name = match &ext {
            Some(ext) => format!("{stem}.{suffix}.{ext}"),
            None => format!("{stem}.{suffix}"),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

/// Validate the split/retention relationship from CLI configuration.
///
/// # Errors
/// Returns [`BagWriterError::SplitLargerThanRetention`] when both are
/// non-zero and `delete_old_at < split_bag_size`; callers should log this as
/// a warning, not treat it as fatal (matches the upstream CLI's behavior).
pub fn check_retention_vs_split(split_bag_size: u64, delete_old_at: u64) -> Result<(), BagWriterError> {
    if split_bag_size != 0 && delete_old_at != 0 && delete_old_at < split_bag_size {
        return Err(BagWriterError::SplitLargerThanRetention {
            split: split_bag_size,
            delete_old_at,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{BagBackendFactory, BagWriter, STATIC_TF_TOPIC, check_retention_vs_split};
    use domain::{BagError, BagWriterBackend, Compression, ConnectionId, Message, Naming, new_current_segment_handle, tf};
    use msgqueue::MessageQueue;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::SystemTime;

    /// In-memory backend for exercising the writer without real files.
    #[derive(Default)]
    struct MemBackend {
        connections: HashMap<(String, String), ConnectionId>,
        next_id: ConnectionId,
        size: u64,
        writes: Vec<(ConnectionId, Vec<u8>)>,
    }

    impl BagWriterBackend for MemBackend {
        fn connection(&mut self, topic: &str, msg_type: &str, _latching: bool) -> Result<ConnectionId, BagError> {
            let key = (topic.to_owned(), msg_type.to_owned());
            if let Some(id) = self.connections.get(&key) {
                return Ok(*id);
            }
            let id = self.next_id;
            self.next_id += 1;
            self.connections.insert(key, id);
            Ok(id)
        }

        fn write(&mut self, connection_id: ConnectionId, _stamp: SystemTime, bytes: &[u8]) -> Result<(), BagError> {
            self.size += bytes.len() as u64;
            self.writes.push((connection_id, bytes.to_vec()));
            Ok(())
        }

        fn size(&self) -> u64 {
            self.size
        }

        fn set_compression(&mut self, _compression: Compression) {}

        fn close(self: Box<Self>) -> Result<(), BagError> {
            Ok(())
        }
    }

    struct MemFactory {
        opened_paths: Mutex<Vec<PathBuf>>,
    }

    impl BagBackendFactory for MemFactory {
        fn open(&self, path: &Path) -> Result<Box<dyn BagWriterBackend>, BagError> {
            self.opened_paths.lock().unwrap().push(path.to_path_buf());
            Ok(Box::new(MemBackend::default()))
        }
    }

    fn msg(topic: &str, topic_id: usize, payload: Vec<u8>) -> Message {
        Message {
            topic_name: topic.to_owned(),
            topic_id,
            payload,
            receive_time: SystemTime::now(),
        }
    }

    fn writer(split: u64) -> Arc<BagWriter> {
        let factory = Box::new(MemFactory {
            opened_paths: Mutex::new(Vec::new()),
        });
        let queue = Arc::new(MessageQueue::new(1_000_000));
        Arc::new(BagWriter::new(
            factory,
            Naming::Verbatim {
                path: PathBuf::from("/nonexistent/in-memory.bag"),
            },
            split,
            queue,
            new_current_segment_handle(),
        ))
    }

    #[test]
    fn closed_writer_accepts_no_writes() {
        let w = writer(0);
        assert!(!w.running());
        assert_eq!(w.size_in_bytes(), 0);
    }

    #[test]
    fn start_then_stop_verbatim_leaves_file_conceptually_resumable() {
        let w = writer(0);
        w.start();
        assert!(w.running());
        w.stop();
        assert!(!w.running());
        // Verbatim: resuming must not require re-resolving collisions.
        w.start();
        assert!(w.running());
    }

    #[test]
    fn retention_smaller_than_split_is_rejected() {
        let err = check_retention_vs_split(1000, 500).unwrap_err();
        assert!(matches!(err, super::BagWriterError::SplitLargerThanRetention { .. }));
    }

    #[test]
    fn retention_zero_means_unbounded_and_is_always_ok() {
        check_retention_vs_split(1000, 0).unwrap();
    }

    #[test]
    fn tf_static_replay_happens_on_every_new_segment() {
        let w = writer(0);
        w.start();

        let transforms = vec![tf::StaticTransform {
            child_frame: "base_link".to_owned(),
            parent_frame: "odom".to_owned(),
            data: vec![1, 2, 3],
        }];
        let payload = tf::encode(&transforms);
        w.handle_message(msg(STATIC_TF_TOPIC, 0, payload));

        // Rotate manually by stopping and starting again.
        w.stop_for_rotation();
        w.start();

        let counts = w.message_counts();
        // The synthesized tf_static replay is written as connection 0's
        // first message in the freshly opened segment.
        assert!(counts.is_empty() || counts[0] == 0, "replay goes through start(), not handle_message counting");
    }

    #[test]
    fn rotation_triggers_once_split_threshold_is_crossed() {
        let w = writer(1);
        w.start();
        w.handle_message(msg("/data", 0, vec![0u8; 10]));
        // After rotation the segment is fresh (size back near zero).
        assert!(w.size_in_bytes() < 10);
    }
}
