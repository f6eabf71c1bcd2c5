// Rust guideline compliant 2026-02-16

//! Bag recording pipeline entry point.
//!
//! Wires [`topic_registry::TopicRegistry`] -> [`msgqueue::MessageQueue`] ->
//! one [`subscriber::Subscriber`] per topic -> [`bagwriter::BagWriter`] -> an
//! optional [`diskreaper::DiskReaper`] -> [`status::StatusReporter`], against
//! the framed-file [`bagrecord::adapters::framed_bag`] backend and a
//! synthetic [`bagrecord::adapters::demo_source`] in place of a real
//! middleware subscription. The actual wiring lives in the library crate
//! (`src/lib.rs`) so integration tests can assemble it directly.
//!
//! # Usage
//!
//! ```text
//! # Record two topics into timestamped segments under the current directory
//! RUST_LOG=info cargo run --bin record -- /imu /camera=30
//!
//! # Record into a fixed file, rotating every 10MB, capped at 100MB on disk
//! RUST_LOG=info cargo run --bin record -- -o out.bag --split-bag-size 10MB --delete-old-at 100MB /imu
//! ```

fn main() -> anyhow::Result<()> {
    env_logger::init();
    bagrecord::run()
}
