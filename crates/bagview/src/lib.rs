// Rust guideline compliant 2026-02-16

//! BagView -- chronological k-way merge over one or more bag readers.
//!
//! Each added reader gets a dense, per-connection boolean filter computed
//! once from an optional predicate. Iteration performs a **linear scan**
//! over all bag cursors on every step (not a binary-heap merge): this is a
//! deliberate choice, not an oversight -- see `DESIGN.md`. Strict
//! less-than comparison against the running minimum means the first cursor
//! found holding the minimal timestamp wins ties, which is exactly
//! "lower bag index first" since cursors are scanned in ascending order.

use domain::{BagReaderBackend, Connection, ReadMessage};
use std::time::SystemTime;

struct BagEntry {
    reader: Box<dyn BagReaderBackend>,
    allowed: Vec<bool>,
}

/// A message yielded by [`BagViewIter`], tagged with which input bag it
/// came from.
#[derive(Debug, Clone)]
pub struct MultiBagMessage {
    /// The message itself.
    pub message: ReadMessage,
    /// Index into the view's reader list this message was read from.
    pub bag_index: usize,
}

/// Composes readers for chronological iteration. Owns the readers.
#[derive(Default)]
pub struct BagView {
    bags: Vec<BagEntry>,
}

impl std::fmt::Debug for BagView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BagView").field("bag_count", &self.bags.len()).finish()
    }
}

impl BagView {
    /// Create an empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reader with no connection filtering: every connection passes.
    pub fn add(&mut self, reader: Box<dyn BagReaderBackend>) {
        self.add_filtered(reader, |_| true);
    }

    /// Add a reader, keeping only messages whose connection satisfies `predicate`.
    ///
    /// The predicate is evaluated once per connection at add-time and baked
    /// into a dense boolean array indexed by connection id, matching the
    /// asymptotically-optimal "dense bitmap over O(100) connections" design.
    pub fn add_filtered(&mut self, reader: Box<dyn BagReaderBackend>, predicate: impl Fn(&Connection) -> bool) {
        let allowed = connection_mask(reader.connections(), predicate);
        self.bags.push(BagEntry { reader, allowed });
    }

    /// Number of readers composed into this view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bags.len()
    }

    /// Whether no readers have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bags.is_empty()
    }

    /// Earliest start time across all readers, or `None` for an empty view.
    #[must_use]
    pub fn start_time(&self) -> Option<SystemTime> {
        self.bags.iter().filter_map(|b| b.reader.start_time()).min()
    }

    /// Latest end time across all readers, or `None` for an empty view.
    #[must_use]
    pub fn end_time(&self) -> Option<SystemTime> {
        self.bags.iter().filter_map(|b| b.reader.end_time()).max()
    }

    /// Iterate every passing message in chronological order from the start.
    pub fn iter(&mut self) -> BagViewIter<'_> {
        BagViewIter {
            bags: &mut self.bags,
            cursor: Cursor::NotStarted,
            seek_time: None,
        }
    }

    /// Iterate every passing message with `stamp >= t`, in chronological order.
    pub fn iter_from(&mut self, t: SystemTime) -> BagViewIter<'_> {
        BagViewIter {
            bags: &mut self.bags,
            cursor: Cursor::NotStarted,
            seek_time: Some(t),
        }
    }
}

fn connection_mask(connections: &[Connection], predicate: impl Fn(&Connection) -> bool) -> Vec<bool> {
    let max_id = connections.iter().map(|c| c.id).max().unwrap_or(0);
    let mut mask = vec![false; max_id as usize + 1];
    for c in connections {
        mask[c.id as usize] = predicate(c);
    }
    mask
}

#[derive(Debug, Clone, Copy)]
enum Cursor {
    NotStarted,
    At(usize),
    Exhausted,
}

/// Chronological iterator over a [`BagView`].
pub struct BagViewIter<'a> {
    bags: &'a mut [BagEntry],
    cursor: Cursor,
    seek_time: Option<SystemTime>,
}

impl Iterator for BagViewIter<'_> {
    type Item = MultiBagMessage;

    fn next(&mut self) -> Option<Self::Item> {
        match self.cursor {
            Cursor::Exhausted => return None,
            Cursor::NotStarted => {
                for entry in self.bags.iter_mut() {
                    match self.seek_time {
                        Some(t) => {
                            entry.reader.seek_time(t, &entry.allowed);
                        }
                        None => {
                            entry.reader.seek_start(&entry.allowed);
                        }
                    }
                }
            }
            Cursor::At(idx) => {
                let allowed = self.bags[idx].allowed.clone();
                self.bags[idx].reader.advance(&allowed);
            }
        }

        let mut best: Option<(usize, SystemTime)> = None;
        for (i, entry) in self.bags.iter().enumerate() {
            if let Some(msg) = entry.reader.current() {
                let is_better = match best {
                    None => true,
                    Some((_, best_stamp)) => msg.stamp < best_stamp,
                };
                if is_better {
                    best = Some((i, msg.stamp));
                }
            }
        }

        match best {
            None => {
                self.cursor = Cursor::Exhausted;
                None
            }
            Some((idx, _)) => {
                self.cursor = Cursor::At(idx);
                let message = self.bags[idx].reader.current()?;
                Some(MultiBagMessage {
                    message,
                    bag_index: idx,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BagView;
    use domain::{BagReaderBackend, Connection, ReadMessage};
    use std::time::{Duration, SystemTime};

    /// A reader over a fixed, already-sorted-by-nothing-in-particular slice
    /// of messages, mimicking the external bag-container collaborator.
    struct FixedReader {
        connections: Vec<Connection>,
        messages: Vec<ReadMessage>,
        pos: Option<usize>,
    }

    impl FixedReader {
        fn new(connections: Vec<Connection>, messages: Vec<ReadMessage>) -> Self {
            Self {
                connections,
                messages,
                pos: None,
            }
        }

        fn find_next(&self, from: usize, allowed: &[bool]) -> Option<usize> {
            (from..self.messages.len()).find(|&i| {
                let conn_id = self.messages[i].connection_id as usize;
                allowed.get(conn_id).copied().unwrap_or(false)
            })
        }
    }

    impl BagReaderBackend for FixedReader {
        fn connections(&self) -> &[Connection] {
            &self.connections
        }

        fn start_time(&self) -> Option<SystemTime> {
            self.messages.iter().map(|m| m.stamp).min()
        }

        fn end_time(&self) -> Option<SystemTime> {
            self.messages.iter().map(|m| m.stamp).max()
        }

        fn seek_start(&mut self, allowed: &[bool]) -> bool {
            self.pos = self.find_next(0, allowed);
            self.pos.is_some()
        }

        fn seek_time(&mut self, t: SystemTime, allowed: &[bool]) -> bool {
            let start = self.messages.iter().position(|m| m.stamp >= t).unwrap_or(self.messages.len());
            self.pos = self.find_next(start, allowed);
            self.pos.is_some()
        }

        fn advance(&mut self, allowed: &[bool]) -> bool {
            let next_from = self.pos.map_or(0, |p| p + 1);
            self.pos = self.find_next(next_from, allowed);
            self.pos.is_some()
        }

        fn current(&self) -> Option<ReadMessage> {
            self.pos.and_then(|p| self.messages.get(p)).cloned()
        }
    }

    fn conn(id: u32, topic: &str, msg_type: &str) -> Connection {
        Connection {
            id,
            topic_in_bag: topic.to_owned(),
            msg_type: msg_type.to_owned(),
            md5sum: String::new(),
            message_definition: String::new(),
            caller_id: "/recorder".to_owned(),
            latching: false,
        }
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    /// Scenario 1: simple record-and-read across three topics.
    fn three_topic_reader() -> FixedReader {
        let connections = vec![
            conn(0, "/a", "std_msgs/Header"),
            conn(1, "/b", "std_msgs/Header"),
            conn(2, "/c", "std_msgs/UInt8"),
        ];
        let messages = vec![
            ReadMessage {
                connection_id: 0,
                stamp: at(1000),
                bytes: b"a".to_vec(),
            },
            ReadMessage {
                connection_id: 1,
                stamp: at(1001),
                bytes: b"b".to_vec(),
            },
            ReadMessage {
                connection_id: 2,
                stamp: at(1002),
                bytes: vec![123],
            },
        ];
        FixedReader::new(connections, messages)
    }

    #[test]
    fn simple_record_and_read_yields_chronological_order() {
        let mut view = BagView::new();
        view.add(Box::new(three_topic_reader()));

        let topics: Vec<String> = view.iter().map(|m| format!("conn{}", m.message.connection_id)).collect();
        assert_eq!(topics, vec!["conn0", "conn1", "conn2"]);
    }

    #[test]
    fn filter_by_topic_yields_single_message() {
        let mut view = BagView::new();
        view.add_filtered(Box::new(three_topic_reader()), |c| c.topic_in_bag == "/b");

        let results: Vec<_> = view.iter().collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message.bytes, b"b");
    }

    #[test]
    fn filter_by_type_yields_single_message() {
        let mut view = BagView::new();
        view.add_filtered(Box::new(three_topic_reader()), |c| c.msg_type == "std_msgs/UInt8");

        let results: Vec<_> = view.iter().collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].message.bytes, vec![123]);
    }

    #[test]
    fn empty_view_has_no_messages_and_epoch_bounds() {
        let mut view = BagView::new();
        assert!(view.iter().next().is_none());
        assert_eq!(view.start_time(), None);
        assert_eq!(view.end_time(), None);
    }

    #[test]
    fn merges_two_bags_in_global_time_order() {
        let mut view = BagView::new();
        view.add(Box::new(FixedReader::new(
            vec![conn(0, "/x", "t")],
            vec![
                ReadMessage { connection_id: 0, stamp: at(10), bytes: vec![1] },
                ReadMessage { connection_id: 0, stamp: at(30), bytes: vec![3] },
            ],
        )));
        view.add(Box::new(FixedReader::new(
            vec![conn(0, "/y", "t")],
            vec![ReadMessage { connection_id: 0, stamp: at(20), bytes: vec![2] }],
        )));

        let stamps: Vec<u8> = view.iter().map(|m| m.message.bytes[0]).collect();
        assert_eq!(stamps, vec![1, 2, 3]);
    }

    #[test]
    fn tie_breaks_toward_lower_bag_index() {
        let mut view = BagView::new();
        view.add(Box::new(FixedReader::new(
            vec![conn(0, "/x", "t")],
            vec![ReadMessage { connection_id: 0, stamp: at(5), bytes: vec![0] }],
        )));
        view.add(Box::new(FixedReader::new(
            vec![conn(0, "/y", "t")],
            vec![ReadMessage { connection_id: 0, stamp: at(5), bytes: vec![1] }],
        )));

        let first = view.iter().next().unwrap();
        assert_eq!(first.bag_index, 0, "equal timestamps must favor the lower bag index");
    }

    #[test]
    fn seek_from_time_skips_earlier_messages() {
        let mut view = BagView::new();
        view.add(Box::new(three_topic_reader()));
        let results: Vec<_> = view.iter_from(at(1001)).collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].message.connection_id, 1);
    }
}
