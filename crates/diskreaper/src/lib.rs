// Rust guideline compliant 2026-02-16

//! DiskReaper -- enforces a directory byte budget by deleting oldest bags.
//!
//! Runs on its own thread iff a non-zero budget is configured. Takes the
//! shared [`domain::CurrentSegmentHandle`] for the duration of each
//! enumeration-and-delete pass so its view of "the currently open segment"
//! stays coherent with the writer, and never deletes that file even if it is
//! the oldest on disk.

use domain::CurrentSegmentHandle;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// How long the reaper sleeps between passes, absent an early shutdown wake.
pub const PASS_INTERVAL: Duration = Duration::from_secs(5);

/// Secondary thread that enforces `directory_size_bytes <= budget_bytes` by
/// deleting the oldest `*.bag` files.
pub struct DiskReaper {
    directory: PathBuf,
    budget_bytes: u64,
    current_segment: CurrentSegmentHandle,
    shutdown: Mutex<bool>,
    wake: Condvar,
}

impl std::fmt::Debug for DiskReaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskReaper")
            .field("directory", &self.directory)
            .field("budget_bytes", &self.budget_bytes)
            .finish_non_exhaustive()
    }
}

/// One entry in the directory's `*.bag` listing.
struct BagFile {
    path: PathBuf,
    size: u64,
    modified: std::time::SystemTime,
}

fn list_bag_files(directory: &Path) -> std::io::Result<Vec<BagFile>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("bag") {
            continue;
        }
        let meta = entry.metadata()?;
        out.push(BagFile {
            path,
            size: meta.len(),
            modified: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        });
    }
    Ok(out)
}

fn paths_equivalent(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

impl DiskReaper {
    /// Create a reaper for `directory`, enforcing `budget_bytes` (must be
    /// non-zero for `run`/`spawn` to do anything useful; a zero budget means
    /// "disabled" and callers should simply not spawn the reaper at all).
    #[must_use]
    pub fn new(directory: PathBuf, budget_bytes: u64, current_segment: CurrentSegmentHandle) -> Self {
        Self {
            directory,
            budget_bytes,
            current_segment,
            shutdown: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    /// Idempotently request shutdown and wake a blocked `run` loop.
    pub fn shutdown(&self) {
        let mut flag = self
            .shutdown
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *flag = true;
        drop(flag);
        self.wake.notify_all();
    }

    /// Run one enumeration pass, deleting oldest files until the directory
    /// is within budget or no more deletable files remain.
    ///
    /// Returns the directory's total byte size *after* this pass.
    pub fn run_pass(&self) -> u64 {
        let current = self
            .current_segment
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let Ok(mut files) = list_bag_files(&self.directory) else {
            return 0;
        };
        let mut total: u64 = files.iter().map(|f| f.size).sum();
        log::debug!("diskreaper.pass: total_bytes={total} budget={}", self.budget_bytes);

        if total <= self.budget_bytes {
            return total;
        }

        files.sort_by_key(|f| f.modified);

        for file in &files {
            if total <= self.budget_bytes {
                break;
            }
            if let Some(open_path) = current.as_deref()
                && paths_equivalent(&file.path, open_path)
            {
                continue;
            }
            match std::fs::remove_file(&file.path) {
                Ok(()) => {
                    log::info!("diskreaper.delete: path={}", file.path.display());
                    total = total.saturating_sub(file.size);
                }
                Err(e) => log::warn!("diskreaper.delete_failed: path={} err={e}", file.path.display()),
            }
        }

        if total > self.budget_bytes {
            log::warn!(
                "diskreaper.shortfall: directory_bytes={total} budget={} (open segment protected)",
                self.budget_bytes
            );
        }

        total
    }

    /// Run passes every [`PASS_INTERVAL`] (woken early by [`shutdown`](Self::shutdown)).
    pub fn run(&self) {
        loop {
            self.run_pass();
            let guard = self
                .shutdown
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let (guard, _timeout) = self
                .wake
                .wait_timeout(guard, PASS_INTERVAL)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if *guard {
                log::info!("diskreaper.run.exit");
                return;
            }
        }
    }

    /// Spawn the reaper loop on its own OS thread.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || self.run())
    }
}
