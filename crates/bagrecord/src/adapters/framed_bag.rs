// Rust guideline compliant 2026-02-16

//! A length-prefixed framed bag file format.
//!
//! No concrete bag-container binary format ships with the recording core
//! (it is treated as an external collaborator); this adapter is one
//! intentionally simple implementation so the pipeline is runnable and
//! testable end to end. Layout:
//!
//! ```text
//! [u8 compression_tag]
//! [u32 connection_count] { connection }*
//! [u32 record_count]     { record }*
//!
//! connection := [u32 id][string topic][string msg_type][string md5sum]
//!               [string message_definition][string caller_id][u8 latching]
//! record     := [u64 stamp_nanos][u32 connection_id][u32 payload_len][payload]
//! string     := [u32 len][bytes]
//! ```
//!
//! Records are buffered in memory and the whole file is written once on
//! [`FramedBagWriter::close`] (via `domain::BagWriterBackend::close`), which
//! keeps this adapter's reader trivially seekable by a single sequential
//! scan. This is not a claim of compatibility with any particular bag
//! format in the wild -- it exists to give `BagWriterBackend`/
//! `BagReaderBackend` a concrete body to run against.

use domain::{BagError, BagReaderBackend, BagWriterBackend, Compression, Connection, ConnectionId, ReadMessage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const RECORD_HEADER_BYTES: u64 = 16;

fn compression_tag(c: Compression) -> u8 {
    match c {
        Compression::None => 0,
        Compression::Bz2 => 1,
        Compression::Lz4 => 2,
    }
}

fn compression_from_tag(tag: u8) -> Compression {
    match tag {
        1 => Compression::Bz2,
        2 => Compression::Lz4,
        _ => Compression::None,
    }
}

fn compress(mode: Compression, bytes: &[u8]) -> Vec<u8> {
    match mode {
        Compression::None => bytes.to_vec(),
        Compression::Bz2 => {
            use std::io::Write as _;
            let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder.write_all(bytes).expect("compression into an in-memory Vec cannot fail");
            encoder.finish().expect("compression into an in-memory Vec cannot fail")
        }
        Compression::Lz4 => lz4_flex::compress_prepend_size(bytes),
    }
}

fn decompress(mode: Compression, bytes: &[u8], path: &Path) -> Result<Vec<u8>, BagError> {
    match mode {
        Compression::None => Ok(bytes.to_vec()),
        Compression::Bz2 => {
            use std::io::Read as _;
            let mut out = Vec::new();
            bzip2::read::BzDecoder::new(bytes)
                .read_to_end(&mut out)
                .map_err(|e| BagError::Open {
                    path: path.to_path_buf(),
                    reason: format!("bz2 decode failed: {e}"),
                })?;
            Ok(out)
        }
        Compression::Lz4 => lz4_flex::decompress_size_prepended(bytes).map_err(|e| BagError::Open {
            path: path.to_path_buf(),
            reason: format!("lz4 decode failed: {e}"),
        }),
    }
}

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_string(buf: &mut Vec<u8>, s: &str) {
    #[expect(clippy::cast_possible_truncation, reason = "topic names and definitions stay well under u32::MAX")]
    push_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Option<u32> {
    let slice = bytes.get(*pos..*pos + 4)?;
    *pos += 4;
    Some(u32::from_le_bytes(slice.try_into().ok()?))
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> Option<u64> {
    let slice = bytes.get(*pos..*pos + 8)?;
    *pos += 8;
    Some(u64::from_le_bytes(slice.try_into().ok()?))
}

fn read_string(bytes: &[u8], pos: &mut usize) -> Option<String> {
    let len = read_u32(bytes, pos)? as usize;
    let slice = bytes.get(*pos..*pos + len)?;
    *pos += len;
    String::from_utf8(slice.to_vec()).ok()
}

fn read_bytes<'a>(bytes: &'a [u8], pos: &mut usize, len: usize) -> Option<&'a [u8]> {
    let slice = bytes.get(*pos..*pos + len)?;
    *pos += len;
    Some(slice)
}

fn nanos_since_epoch(t: SystemTime) -> u64 {
    #[expect(clippy::cast_possible_truncation, reason = "nanosecond offsets stay well under u64::MAX for any realistic recording")]
    {
        t.duration_since(SystemTime::UNIX_EPOCH).unwrap_or(Duration::ZERO).as_nanos() as u64
    }
}

struct Record {
    connection_id: ConnectionId,
    stamp: SystemTime,
    payload: Vec<u8>,
}

/// Writes one bag segment in the framed format described at module level.
pub struct FramedBagWriter {
    path: PathBuf,
    connections: Vec<Connection>,
    lookup: HashMap<(String, String), ConnectionId>,
    records: Vec<Record>,
    compression: Compression,
    bytes: u64,
}

impl FramedBagWriter {
    /// Open a new, empty segment at `path`. Nothing is written to disk until
    /// [`close`](Self::close).
    #[must_use]
    pub fn create(path: PathBuf) -> Self {
        Self {
            path,
            connections: Vec::new(),
            lookup: HashMap::new(),
            records: Vec::new(),
            compression: Compression::None,
            bytes: 0,
        }
    }
}

impl BagWriterBackend for FramedBagWriter {
    fn connection(&mut self, topic_name: &str, msg_type: &str, latching: bool) -> Result<ConnectionId, BagError> {
        let key = (topic_name.to_owned(), msg_type.to_owned());
        if let Some(&id) = self.lookup.get(&key) {
            return Ok(id);
        }
        #[expect(clippy::cast_possible_truncation, reason = "connection counts per segment stay well under u32::MAX")]
        let id = self.connections.len() as ConnectionId;
        self.connections.push(Connection {
            id,
            topic_in_bag: topic_name.to_owned(),
            msg_type: msg_type.to_owned(),
            md5sum: String::new(),
            message_definition: String::new(),
            caller_id: "/record".to_owned(),
            latching,
        });
        self.lookup.insert(key, id);
        Ok(id)
    }

    fn write(&mut self, connection_id: ConnectionId, stamp: SystemTime, bytes: &[u8]) -> Result<(), BagError> {
        self.bytes += RECORD_HEADER_BYTES + bytes.len() as u64;
        self.records.push(Record {
            connection_id,
            stamp,
            payload: bytes.to_vec(),
        });
        Ok(())
    }

    fn size(&self) -> u64 {
        self.bytes
    }

    fn set_compression(&mut self, compression: Compression) {
        self.compression = compression;
    }

    fn close(self: Box<Self>) -> Result<(), BagError> {
        let mut buf = Vec::new();
        buf.push(compression_tag(self.compression));

        #[expect(clippy::cast_possible_truncation, reason = "connection counts per segment stay well under u32::MAX")]
        push_u32(&mut buf, self.connections.len() as u32);
        for c in &self.connections {
            push_u32(&mut buf, c.id);
            push_string(&mut buf, &c.topic_in_bag);
            push_string(&mut buf, &c.msg_type);
            push_string(&mut buf, &c.md5sum);
            push_string(&mut buf, &c.message_definition);
            push_string(&mut buf, &c.caller_id);
            buf.push(u8::from(c.latching));
        }

        #[expect(clippy::cast_possible_truncation, reason = "record counts per segment stay well under u32::MAX")]
        push_u32(&mut buf, self.records.len() as u32);
        for r in &self.records {
            let payload = compress(self.compression, &r.payload);
            push_u64(&mut buf, nanos_since_epoch(r.stamp));
            push_u32(&mut buf, r.connection_id);
            #[expect(clippy::cast_possible_truncation, reason = "per-record compressed payloads stay well under u32::MAX")]
            push_u32(&mut buf, payload.len() as u32);
            buf.extend_from_slice(&payload);
        }

        std::fs::write(&self.path, buf).map_err(BagError::from)
    }
}

/// Reads a segment written by [`FramedBagWriter`].
pub struct FramedBagReader {
    connections: Vec<Connection>,
    messages: Vec<ReadMessage>,
    cursor: Option<usize>,
}

impl FramedBagReader {
    /// Read and parse `path` entirely into memory.
    ///
    /// # Errors
    /// Returns [`BagError::Open`] if the file cannot be read or is malformed.
    pub fn open(path: &Path) -> Result<Self, BagError> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes, path)
    }

    fn parse(bytes: &[u8], path: &Path) -> Result<Self, BagError> {
        let malformed = || BagError::Open {
            path: path.to_path_buf(),
            reason: "malformed framed bag file".to_owned(),
        };

        let mut pos = 0usize;
        let compression = compression_from_tag(*bytes.first().ok_or_else(malformed)?);
        pos += 1;

        let conn_count = read_u32(bytes, &mut pos).ok_or_else(malformed)?;
        let mut connections = Vec::with_capacity(conn_count as usize);
        for _ in 0..conn_count {
            let id = read_u32(bytes, &mut pos).ok_or_else(malformed)?;
            let topic_in_bag = read_string(bytes, &mut pos).ok_or_else(malformed)?;
            let msg_type = read_string(bytes, &mut pos).ok_or_else(malformed)?;
            let md5sum = read_string(bytes, &mut pos).ok_or_else(malformed)?;
            let message_definition = read_string(bytes, &mut pos).ok_or_else(malformed)?;
            let caller_id = read_string(bytes, &mut pos).ok_or_else(malformed)?;
            let latching = *bytes.get(pos).ok_or_else(malformed)? != 0;
            pos += 1;
            connections.push(Connection {
                id,
                topic_in_bag,
                msg_type,
                md5sum,
                message_definition,
                caller_id,
                latching,
            });
        }

        let record_count = read_u32(bytes, &mut pos).ok_or_else(malformed)?;
        let mut messages = Vec::with_capacity(record_count as usize);
        for _ in 0..record_count {
            let stamp_nanos = read_u64(bytes, &mut pos).ok_or_else(malformed)?;
            let connection_id = read_u32(bytes, &mut pos).ok_or_else(malformed)?;
            let payload_len = read_u32(bytes, &mut pos).ok_or_else(malformed)? as usize;
            let raw = read_bytes(bytes, &mut pos, payload_len).ok_or_else(malformed)?;
            let payload = decompress(compression, raw, path)?;
            messages.push(ReadMessage {
                connection_id,
                stamp: SystemTime::UNIX_EPOCH + Duration::from_nanos(stamp_nanos),
                bytes: payload,
            });
        }
        messages.sort_by_key(|m| m.stamp);

        Ok(Self {
            connections,
            messages,
            cursor: None,
        })
    }

    fn find_next(&self, from: usize, allowed: &[bool]) -> Option<usize> {
        (from..self.messages.len()).find(|&i| {
            let id = self.messages[i].connection_id as usize;
            allowed.get(id).copied().unwrap_or(false)
        })
    }
}

impl BagReaderBackend for FramedBagReader {
    fn connections(&self) -> &[Connection] {
        &self.connections
    }

    fn start_time(&self) -> Option<SystemTime> {
        self.messages.first().map(|m| m.stamp)
    }

    fn end_time(&self) -> Option<SystemTime> {
        self.messages.last().map(|m| m.stamp)
    }

    fn seek_start(&mut self, allowed: &[bool]) -> bool {
        self.cursor = self.find_next(0, allowed);
        self.cursor.is_some()
    }

    fn seek_time(&mut self, t: SystemTime, allowed: &[bool]) -> bool {
        let start = self.messages.partition_point(|m| m.stamp < t);
        self.cursor = self.find_next(start, allowed);
        self.cursor.is_some()
    }

    fn advance(&mut self, allowed: &[bool]) -> bool {
        let next_from = self.cursor.map_or(0, |p| p + 1);
        self.cursor = self.find_next(next_from, allowed);
        self.cursor.is_some()
    }

    fn current(&self) -> Option<ReadMessage> {
        self.cursor.and_then(|p| self.messages.get(p)).cloned()
    }
}

/// A [`bagwriter::BagBackendFactory`] that opens [`FramedBagWriter`]s.
#[must_use]
pub fn factory() -> impl Fn(&Path) -> Result<Box<dyn BagWriterBackend>, BagError> + Send + Sync {
    |path: &Path| Ok(Box::new(FramedBagWriter::create(path.to_path_buf())) as Box<dyn BagWriterBackend>)
}
