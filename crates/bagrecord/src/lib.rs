// Rust guideline compliant 2026-02-16

//! Library surface for the `record` binary.
//!
//! Exists so integration tests under `tests/` can assemble the real
//! pipeline against the concrete adapters without linking a second copy of
//! `main`. `main.rs` is a thin wrapper over [`run`].

pub mod adapters;
pub mod config;

use adapters::demo_source::{DemoSource, DemoSourceConfig};
use anyhow::Context as _;
use bagwriter::{BagWriter, check_retention_vs_split};
use config::{Cli, RecordConfig};
use diskreaper::DiskReaper;
use domain::new_current_segment_handle;
use msgqueue::MessageQueue;
use status::{FilesystemFreeSpaceProbe, StatusReporter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use subscriber::Subscriber;
use topic_registry::TopicRegistry;

/// Parse CLI arguments and run the recording pipeline to completion.
///
/// # Errors
/// Returns an error if a topic name collides during registration.
pub fn run() -> anyhow::Result<()> {
    let cli = <Cli as clap::Parser>::parse();
    let config = match RecordConfig::from_cli(cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("record: {e}");
            std::process::exit(1);
        }
    };
    run_with_config(config)
}

/// Run the pipeline against an already-validated [`RecordConfig`].
///
/// Split out from [`run`] so tests can assemble the pipeline directly,
/// without going through `clap::Parser::parse` (which reads `std::env::args`).
///
/// # Errors
/// Returns an error if a topic name collides during registration.
pub fn run_with_config(config: RecordConfig) -> anyhow::Result<()> {
    if let Err(e) = check_retention_vs_split(config.split_bag_size_bytes, config.delete_old_at_bytes) {
        log::warn!("record.config: {e}");
    }
    if config.udp {
        log::info!("record.config: udp transport hint requested (informational only)");
    }

    let mut registry = TopicRegistry::new();
    let mut topic_ids = Vec::with_capacity(config.topics.len());
    for topic in &config.topics {
        let id = registry.add(topic.name.clone(), topic.rate_limit).context("duplicate topic name")?;
        topic_ids.push(id);
    }
    let registry = Arc::new(registry);

    let queue = Arc::new(MessageQueue::new(usize_from_bytes(config.queue_size_bytes)));
    let current_segment = new_current_segment_handle();

    let output_directory = output_directory(&config.naming);

    let writer = Arc::new(BagWriter::new(
        Box::new(adapters::framed_bag::factory()),
        config.naming,
        config.split_bag_size_bytes,
        Arc::clone(&queue),
        Arc::clone(&current_segment),
    ));
    writer.set_compression(config.compression);
    if !config.paused {
        writer.start();
    }

    let mut subscriber_handles = Vec::with_capacity(config.topics.len());
    for (topic, id) in config.topics.iter().zip(topic_ids.iter().copied()) {
        let source = DemoSource::new(
            topic.name.clone(),
            id,
            DemoSourceConfig::builder(256).interval(Duration::from_millis(20)).iterations(50).build(),
        );
        let subscriber = Subscriber::new(id, source);
        subscriber_handles.push(subscriber.spawn(Arc::clone(&registry), Arc::clone(&queue)));
    }

    let writer_handle = Arc::clone(&writer).spawn();

    let reaper = (config.delete_old_at_bytes > 0).then(|| {
        Arc::new(DiskReaper::new(output_directory.clone(), config.delete_old_at_bytes, Arc::clone(&current_segment)))
    });
    let reaper_handle = reaper.clone().map(DiskReaper::spawn);

    let status_reporter = (!config.no_ui).then(|| {
        Arc::new(StatusReporter::new(
            Arc::clone(&registry),
            Arc::clone(&writer),
            output_directory,
            Box::new(FilesystemFreeSpaceProbe),
            |snapshot: status::StatusSnapshot| {
                log::info!(
                    "status: state={:?} bagfile={:?} bytes={} free={} bandwidth={:.1}B/s",
                    snapshot.status,
                    snapshot.bagfile_name,
                    snapshot.total_bytes_written,
                    snapshot.free_bytes,
                    snapshot.aggregate_bandwidth,
                );
            },
        ))
    });
    let status_handle = status_reporter.clone().map(status::StatusReporter::spawn);

    for handle in subscriber_handles {
        let _ = handle.join();
    }

    queue.shutdown();
    let _ = writer_handle.join();

    if let Some(reaper) = &reaper {
        reaper.shutdown();
    }
    if let Some(handle) = reaper_handle {
        let _ = handle.join();
    }
    if let Some(reporter) = &status_reporter {
        reporter.shutdown();
    }
    if let Some(handle) = status_handle {
        let _ = handle.join();
    }

    log::info!("record.run.complete: total_bytes_written={}", writer.size_in_bytes());
    Ok(())
}

fn output_directory(naming: &domain::Naming) -> PathBuf {
    let path = match naming {
        domain::Naming::Verbatim { path } => path.clone(),
        domain::Naming::AppendTimestamp { prefix } => PathBuf::from(prefix),
    };
    path.parent().filter(|p| !p.as_os_str().is_empty()).map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn usize_from_bytes(bytes: u64) -> usize {
    usize::try_from(bytes).unwrap_or(usize::MAX)
}
