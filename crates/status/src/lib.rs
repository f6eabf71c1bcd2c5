// Rust guideline compliant 2026-02-16

//! StatusReporter -- periodic snapshot of recorder health.
//!
//! Every [`REPORT_INTERVAL`], samples the writer and the topic registry into
//! a [`StatusSnapshot`] and hands it to a [`StatusSink`]. Runs on its own
//! thread so a slow sink (e.g. a terminal redraw) never backs up the
//! recording path.

use bagwriter::BagWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use topic_registry::TopicRegistry;

/// Cadence at which snapshots are produced.
pub const REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Coarse recording state surfaced to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderStatus {
    /// The writer is accepting messages.
    Running,
    /// The writer exists but is not currently accepting messages.
    Paused,
}

/// Per-topic figures included in each snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSnapshot {
    /// Topic name.
    pub name: String,
    /// Smoothed messages/second over the last report window.
    pub message_rate: f64,
    /// Smoothed bytes/second over the last report window.
    pub bandwidth: f64,
    /// Messages accepted since recording began.
    pub total_messages: u64,
    /// Payload bytes accepted since recording began.
    pub total_bytes: u64,
    /// Messages dropped by the queue for this topic.
    pub drop_count: u64,
    /// Distinct publishers currently seen.
    pub num_publishers: u32,
    /// Messages written into the currently-open segment for this topic.
    /// Resets whenever the writer rotates.
    pub messages_in_current_bag: u64,
}

/// One point-in-time status sample.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    /// Whether the writer is currently accepting messages.
    pub status: RecorderStatus,
    /// Path of the currently-open segment, if any.
    pub bagfile_name: Option<PathBuf>,
    /// Bytes written to the currently-open segment.
    pub total_bytes_written: u64,
    /// Free space remaining in the output directory, as reported by the probe.
    pub free_bytes: u64,
    /// Sum of every topic's bandwidth this window.
    pub aggregate_bandwidth: f64,
    /// Per-topic figures, in registration order.
    pub topics: Vec<TopicSnapshot>,
}

/// Destination for snapshots. Implementations might print to a terminal,
/// publish on a status topic, or (in tests) simply collect them.
pub trait StatusSink: Send {
    /// Receive one snapshot.
    fn publish(&mut self, snapshot: StatusSnapshot);
}

impl<F> StatusSink for F
where
    F: FnMut(StatusSnapshot) + Send,
{
    fn publish(&mut self, snapshot: StatusSnapshot) {
        self(snapshot);
    }
}

/// Reports free space for the output directory. Injected so tests never
/// touch a real filesystem's statvfs.
pub trait FreeSpaceProbe: Send + Sync {
    /// Bytes of free space available under `directory`.
    fn free_bytes(&self, directory: &Path) -> u64;
}

impl<F> FreeSpaceProbe for F
where
    F: Fn(&Path) -> u64 + Send + Sync,
{
    fn free_bytes(&self, directory: &Path) -> u64 {
        self(directory)
    }
}

/// A [`FreeSpaceProbe`] backed by the real filesystem, via `sysinfo`'s
/// cross-platform disk listing.
///
/// Best-effort: any failure to locate a matching disk is reported as zero
/// rather than propagated, since a status figure should never take the
/// recorder down.
#[derive(Debug, Default)]
pub struct FilesystemFreeSpaceProbe;

impl FreeSpaceProbe for FilesystemFreeSpaceProbe {
    fn free_bytes(&self, directory: &Path) -> u64 {
        let disks = sysinfo::Disks::new_with_refreshed_list();
        let target = directory.canonicalize().unwrap_or_else(|_| directory.to_path_buf());
        disks
            .iter()
            .filter(|d| target.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .map_or(0, sysinfo::Disk::available_space)
    }
}

/// Periodic status sampler.
pub struct StatusReporter<S: StatusSink> {
    registry: Arc<TopicRegistry>,
    writer: Arc<BagWriter>,
    directory: PathBuf,
    free_space: Box<dyn FreeSpaceProbe>,
    sink: Mutex<S>,
    last_tick: Mutex<Instant>,
    shutdown: Mutex<bool>,
    wake: Condvar,
}

impl<S: StatusSink> std::fmt::Debug for StatusReporter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusReporter").field("directory", &self.directory).finish_non_exhaustive()
    }
}

impl<S: StatusSink> StatusReporter<S> {
    /// Create a reporter over `registry`/`writer`, sampling `directory`'s
    /// free space via `free_space` and publishing through `sink`.
    #[must_use]
    pub fn new(
        registry: Arc<TopicRegistry>,
        writer: Arc<BagWriter>,
        directory: PathBuf,
        free_space: Box<dyn FreeSpaceProbe>,
        sink: S,
    ) -> Self {
        Self {
            registry,
            writer,
            directory,
            free_space,
            sink: Mutex::new(sink),
            last_tick: Mutex::new(Instant::now()),
            shutdown: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    /// Idempotently request shutdown and wake a blocked `run` loop.
    pub fn shutdown(&self) {
        let mut flag = self.shutdown.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *flag = true;
        drop(flag);
        self.wake.notify_all();
    }

    /// Snapshot current state, rolling the registry's stats window forward.
    ///
    /// Calling this directly (outside `run`) is useful for tests and for a
    /// one-shot `--no-ui` status line.
    pub fn sample(&self) -> StatusSnapshot {
        let now = Instant::now();
        let window = {
            let mut last = self.last_tick.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let elapsed = now.saturating_duration_since(*last);
            *last = now;
            elapsed
        };
        self.registry.update_stats(window);

        let message_counts = self.writer.message_counts();
        let topics: Vec<TopicSnapshot> = self
            .registry
            .topics()
            .iter()
            .map(|t| TopicSnapshot {
                name: t.name.clone(),
                message_rate: t.message_rate(),
                bandwidth: t.bandwidth(),
                total_messages: t.total_messages(),
                total_bytes: t.total_bytes(),
                drop_count: t.drop_count(),
                num_publishers: t.num_publishers(),
                messages_in_current_bag: message_counts.get(t.id).copied().unwrap_or(0),
            })
            .collect();

        let aggregate_bandwidth = topics.iter().map(|t| t.bandwidth).sum();
        let status = if self.writer.running() { RecorderStatus::Running } else { RecorderStatus::Paused };

        StatusSnapshot {
            status,
            bagfile_name: self.writer.bagfile_name(),
            total_bytes_written: self.writer.size_in_bytes(),
            free_bytes: self.free_space.free_bytes(&self.directory),
            aggregate_bandwidth,
            topics,
        }
    }

    /// Run the sampling loop every [`REPORT_INTERVAL`] until [`shutdown`](Self::shutdown).
    pub fn run(&self) {
        loop {
            let snapshot = self.sample();
            self.sink.lock().unwrap_or_else(std::sync::PoisonError::into_inner).publish(snapshot);

            let guard = self.shutdown.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let (guard, _timeout) = self
                .wake
                .wait_timeout(guard, REPORT_INTERVAL)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if *guard {
                log::info!("status.run.exit");
                return;
            }
        }
    }

    /// Spawn the sampling loop on its own OS thread.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> std::thread::JoinHandle<()>
    where
        S: 'static,
    {
        std::thread::spawn(move || self.run())
    }
}
