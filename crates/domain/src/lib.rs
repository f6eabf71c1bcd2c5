// Rust guideline compliant 2026-02-16

//! Shared domain types for the bag recording pipeline.
//!
//! Defines `Topic`, `Message`, `Connection`, `Compression`, the shared error
//! taxonomy, and the hexagonal port traits (`MessageSource`, `BagWriterBackend`,
//! `BagReaderBackend`) that separate the recording core from the middleware
//! transport and the on-disk container format. All pipeline components depend
//! on this crate; no other crate is imported here.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Dense, zero-based index assigned to a topic in registration order.
pub type TopicId = usize;

/// Dense, zero-based index assigned to a connection within a single bag file.
pub type ConnectionId = u32;

/// A single subscribed topic plus its static configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSpec {
    /// Stable topic name, e.g. `/camera/image_raw`.
    pub name: String,
    /// Minimum inter-message interval. `Duration::ZERO` means unlimited.
    pub rate_limit: Duration,
}

/// A received message, owned end-to-end from subscriber callback to writer.
///
/// Never cloned or shared across threads; ownership transits subscriber ->
/// queue -> writer as a single move.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Topic name the message arrived on.
    pub topic_name: String,
    /// Dense id of the owning topic.
    pub topic_id: TopicId,
    /// Opaque serialized payload bytes (the connection header is carried
    /// separately by the backend, per the message-event contract in the
    /// external-interfaces section of the specification).
    pub payload: Vec<u8>,
    /// Time the message was received by the subscriber.
    pub receive_time: SystemTime,
}

impl Message {
    /// Queue-accounting size: payload bytes plus a fixed per-message overhead.
    ///
    /// The overhead constant accounts for the slot's bookkeeping (topic id,
    /// timestamp, vector/allocation overhead) so that `byte_occupancy` tracks
    /// real memory pressure rather than payload size alone.
    pub const SLOT_OVERHEAD_BYTES: usize = 64;

    /// Total byte size this message contributes to queue occupancy.
    #[must_use]
    pub fn size(&self) -> usize {
        self.payload.len() + Self::SLOT_OVERHEAD_BYTES
    }
}

/// Compression applied to newly written bag segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression.
    #[default]
    None,
    /// BZ2 compression.
    Bz2,
    /// LZ4 compression.
    Lz4,
}

/// Naming policy for bag segment filenames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Naming {
    /// `{prefix}_{timestamp}.bag`; closed on `stop()`.
    AppendTimestamp {
        /// Filename prefix.
        prefix: String,
    },
    /// A fixed, given path; `stop()` leaves the file open for resumption.
    Verbatim {
        /// Exact output path.
        path: PathBuf,
    },
}

/// A (topic, type, definition) tuple identifying one logical publisher's
/// contribution within a bag; messages reference their connection by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    /// Dense connection id within the owning bag.
    pub id: ConnectionId,
    /// Topic name as recorded in the bag (may differ from the live topic
    /// name if the bag was produced by a remapped subscription).
    pub topic_in_bag: String,
    /// Message type string, e.g. `std_msgs/UInt8`.
    pub msg_type: String,
    /// Content digest of the message definition (opaque to this crate).
    pub md5sum: String,
    /// Full message definition text.
    pub message_definition: String,
    /// Caller id of the original publisher.
    pub caller_id: String,
    /// Whether late subscribers receive the last published value.
    pub latching: bool,
}

/// Errors shared across the recording pipeline's error taxonomy.
///
/// Individual crates wrap these where they need component-specific variants;
/// this enum covers the cases that cross crate boundaries unchanged.
#[derive(Debug, thiserror::Error)]
pub enum BagError {
    /// Failed to open a bag file: path conflicts exhausted, permission
    /// denied, or disk full at open time. Logged by the caller; the writer
    /// stays closed and a later `start()` may retry. Never fatal.
    #[error("could not open bag file {path}: {reason}")]
    Open {
        /// Path that failed to open.
        path: PathBuf,
        /// Human-readable cause.
        reason: String,
    },
    /// The backend reported a failure while writing one message.
    #[error("write failed for connection {connection_id}: {reason}")]
    Write {
        /// Connection the failing write targeted.
        connection_id: ConnectionId,
        /// Human-readable cause.
        reason: String,
    },
    /// Underlying I/O failure not covered by a more specific variant.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Hexagonal port: the transport-facing side of a topic subscription.
///
/// Implementations live outside the domain and subscriber crates (e.g. a
/// synthetic in-process source for tests, or a real middleware adapter in
/// the binary crate). `Subscriber` depends exclusively on this trait.
pub trait MessageSource {
    /// Block until the next message for this subscription arrives, or the
    /// source is closed (`None`).
    fn recv(&mut self) -> Option<Message>;

    /// Current count of distinct publishers on this subscription, as last
    /// reported by the middleware's registry.
    ///
    /// Polled by `Subscriber` at a lower cadence than `recv`, since querying
    /// a middleware's publisher registry is typically far more expensive
    /// than receiving a message. Sources that cannot report this (e.g. a
    /// synthetic generator) may keep the default of `0`.
    fn publisher_count(&self) -> u32 {
        0
    }
}

/// Hexagonal port: what the writer demands from the on-disk bag container.
///
/// One instance is opened per segment; `close` finalizes it.
pub trait BagWriterBackend: Send {
    /// Register (or look up) a connection for `topic_name`/`msg_type`,
    /// returning its dense id within this segment.
    ///
    /// # Errors
    /// Returns [`BagError`] if the backend cannot allocate the connection.
    fn connection(
        &mut self,
        topic_name: &str,
        msg_type: &str,
        latching: bool,
    ) -> Result<ConnectionId, BagError>;

    /// Write one message on `connection_id` with payload `bytes` at `stamp`.
    ///
    /// # Errors
    /// Returns [`BagError::Write`] if the backend rejects the write.
    fn write(
        &mut self,
        connection_id: ConnectionId,
        stamp: SystemTime,
        bytes: &[u8],
    ) -> Result<(), BagError>;

    /// Total bytes written to this segment so far.
    fn size(&self) -> u64;

    /// Set the compression mode applied to subsequent writes.
    fn set_compression(&mut self, compression: Compression);

    /// Finalize and close the segment.
    ///
    /// # Errors
    /// Returns [`BagError`] if flushing the backend fails.
    fn close(self: Box<Self>) -> Result<(), BagError>;
}

/// One message read back from a bag, borrowing its connection.
#[derive(Debug, Clone)]
pub struct ReadMessage {
    /// Connection this message was recorded on.
    pub connection_id: ConnectionId,
    /// Recorded timestamp.
    pub stamp: SystemTime,
    /// Raw payload bytes (already decompressed).
    pub bytes: Vec<u8>,
}

/// Hexagonal port: what `BagView` demands from a readable bag container.
///
/// A cursor-style interface: `seek`/`advance` move an internal position,
/// `current` peeks at it without consuming. This mirrors the collaborator
/// contract of `advance`/`findTime` rather than a `Iterator`-style `next`,
/// since `BagView` needs to compare cursors across many readers before
/// deciding which one to advance.
pub trait BagReaderBackend {
    /// All connections present in this bag, in declaration order.
    fn connections(&self) -> &[Connection];

    /// Timestamp of the earliest message in this bag, or `None` if empty.
    fn start_time(&self) -> Option<SystemTime>;

    /// Timestamp of the latest message in this bag, or `None` if empty.
    fn end_time(&self) -> Option<SystemTime>;

    /// Position the cursor at the first message whose connection passes
    /// `allowed`, returning `true` if such a message exists.
    fn seek_start(&mut self, allowed: &[bool]) -> bool;

    /// Position the cursor at the first message with `stamp >= t` whose
    /// connection passes `allowed`, returning `true` if one exists.
    fn seek_time(&mut self, t: SystemTime, allowed: &[bool]) -> bool;

    /// Advance the cursor to the next message whose connection passes
    /// `allowed`, returning `true` if one exists. Leaves the cursor
    /// exhausted (subsequent `current` returns `None`) otherwise.
    fn advance(&mut self, allowed: &[bool]) -> bool;

    /// The message currently under the cursor, if any.
    fn current(&self) -> Option<ReadMessage>;
}

/// Shared handle through which the writer publishes the path of its
/// currently-open segment and the reaper reads it.
///
/// This is the `cleanup_mutex` of the concurrency model: the writer holds it
/// while opening a new segment; the reaper holds it for the duration of one
/// enumeration-and-delete pass. Neither side touches the writer's own
/// internal state through this handle -- it carries only a path.
pub type CurrentSegmentHandle = std::sync::Arc<std::sync::Mutex<Option<PathBuf>>>;

/// Construct a fresh, empty [`CurrentSegmentHandle`].
#[must_use]
pub fn new_current_segment_handle() -> CurrentSegmentHandle {
    std::sync::Arc::new(std::sync::Mutex::new(None))
}

/// Wire encoding shared by whatever publishes `/tf_static` and the writer
/// that folds it into the per-segment static-transform cache.
///
/// The bag container treats message payloads as opaque bytes; this reserved
/// topic is the one exception where the recording core itself must
/// understand the payload well enough to replay it into new segments. The
/// encoding is a minimal internal convention, not a claim of compatibility
/// with any external transform-message format.
pub mod tf {
    /// One static coordinate-frame relationship.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct StaticTransform {
        /// Child frame id.
        pub child_frame: String,
        /// Parent frame id.
        pub parent_frame: String,
        /// Opaque transform payload (translation/rotation, format-agnostic here).
        pub data: Vec<u8>,
    }

    fn push_field(buf: &mut Vec<u8>, field: &[u8]) {
        #[expect(clippy::cast_possible_truncation, reason = "frame names and transform payloads stay well under u32::MAX")]
        buf.extend_from_slice(&(field.len() as u32).to_le_bytes());
        buf.extend_from_slice(field);
    }

    fn read_field<'a>(bytes: &'a [u8], pos: &mut usize) -> Option<&'a [u8]> {
        let len_bytes = bytes.get(*pos..*pos + 4)?;
        let len = u32::from_le_bytes(len_bytes.try_into().ok()?) as usize;
        *pos += 4;
        let field = bytes.get(*pos..*pos + len)?;
        *pos += len;
        Some(field)
    }

    /// Serialize a set of transforms into one payload.
    #[must_use]
    pub fn encode(transforms: &[StaticTransform]) -> Vec<u8> {
        let mut buf = Vec::new();
        #[expect(clippy::cast_possible_truncation, reason = "transform counts stay well under u32::MAX")]
        buf.extend_from_slice(&(transforms.len() as u32).to_le_bytes());
        for t in transforms {
            push_field(&mut buf, t.child_frame.as_bytes());
            push_field(&mut buf, t.parent_frame.as_bytes());
            push_field(&mut buf, &t.data);
        }
        buf
    }

    /// Deserialize a payload produced by [`encode`]. Returns `None` on any
    /// malformed input rather than panicking.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Vec<StaticTransform>> {
        let mut pos = 0usize;
        let count_bytes = bytes.get(0..4)?;
        let count = u32::from_le_bytes(count_bytes.try_into().ok()?) as usize;
        pos += 4;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let child_frame = String::from_utf8(read_field(bytes, &mut pos)?.to_vec()).ok()?;
            let parent_frame = String::from_utf8(read_field(bytes, &mut pos)?.to_vec()).ok()?;
            let data = read_field(bytes, &mut pos)?.to_vec();
            out.push(StaticTransform {
                child_frame,
                parent_frame,
                data,
            });
        }
        Some(out)
    }

}

#[cfg(test)]
mod tests {
    use super::{Compression, Connection, Message, TopicSpec};
    use std::time::{Duration, SystemTime};

    #[test]
    fn message_size_includes_overhead() {
        let msg = Message {
            topic_name: "/a".to_owned(),
            topic_id: 0,
            payload: vec![0u8; 100],
            receive_time: SystemTime::now(),
        };
        assert_eq!(msg.size(), 100 + Message::SLOT_OVERHEAD_BYTES);
    }

    #[test]
    fn compression_default_is_none() {
        assert_eq!(Compression::default(), Compression::None);
    }

    #[test]
    fn topic_spec_equality() {
        let a = TopicSpec {
            name: "/a".to_owned(),
            rate_limit: Duration::ZERO,
        };
        let b = a.clone();
        assert_eq!(a, b);
    }

    #[test]
    fn connection_fields() {
        let c = Connection {
            id: 3,
            topic_in_bag: "/b".to_owned(),
            msg_type: "std_msgs/UInt8".to_owned(),
            md5sum: "deadbeef".to_owned(),
            message_definition: "uint8 data".to_owned(),
            caller_id: "/recorder".to_owned(),
            latching: true,
        };
        assert_eq!(c.id, 3);
        assert!(c.latching);
    }
}
