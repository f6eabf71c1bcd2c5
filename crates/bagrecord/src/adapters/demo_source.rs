// Rust guideline compliant 2026-02-16

//! A synthetic [`MessageSource`] standing in for a real middleware subscription.
//!
//! No concrete pub/sub transport ships with the recording core (`--udp` is a
//! transport *hint*, not an integration); this generator produces random
//! fixed-size payloads at a configured cadence so the pipeline is runnable
//! end to end without a broker. Configuration via [`DemoSourceConfig::builder`],
//! mirroring this repository's existing config-builder convention.

use domain::{Message, MessageSource, TopicId};
use rand::{RngCore, SeedableRng, rngs::StdRng};
use std::time::{Duration, SystemTime};

/// Runtime configuration for a [`DemoSource`].
#[derive(Debug)]
pub struct DemoSourceConfig {
    /// Bytes of random payload per generated message.
    pub payload_len: usize,
    /// Delay between successive messages.
    pub interval: Duration,
    /// Number of messages to generate before `recv` returns `None`.
    /// `None` means unbounded.
    pub iterations: Option<u64>,
    /// Optional RNG seed for reproducible payloads. `None` seeds from the OS.
    pub seed: Option<u64>,
}

/// Builder for [`DemoSourceConfig`]. Obtain via [`DemoSourceConfig::builder`].
#[derive(Debug)]
pub struct DemoSourceConfigBuilder {
    payload_len: usize,
    interval: Duration,
    iterations: Option<u64>,
    seed: Option<u64>,
}

impl DemoSourceConfig {
    /// Create a builder. `payload_len` is the only required parameter.
    ///
    /// Defaults: `interval = 100 ms`, `iterations = None`, `seed = None`.
    #[must_use]
    pub fn builder(payload_len: usize) -> DemoSourceConfigBuilder {
        DemoSourceConfigBuilder {
            payload_len,
            interval: Duration::from_millis(100),
            iterations: None,
            seed: None,
        }
    }
}

impl DemoSourceConfigBuilder {
    /// Override the inter-message delay.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Bound the number of messages this source will ever produce.
    #[must_use]
    pub fn iterations(mut self, iterations: u64) -> Self {
        self.iterations = Some(iterations);
        self
    }

    /// Seed the RNG for reproducible payloads (tests only, in practice).
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Finalize the configuration.
    #[must_use]
    pub fn build(self) -> DemoSourceConfig {
        DemoSourceConfig {
            payload_len: self.payload_len,
            interval: self.interval,
            iterations: self.iterations,
            seed: self.seed,
        }
    }
}

/// Generates random-payload messages on one topic at a fixed cadence.
pub struct DemoSource {
    topic_name: String,
    topic_id: TopicId,
    config: DemoSourceConfig,
    rng: StdRng,
    produced: u64,
}

impl DemoSource {
    /// Create a source for `topic_name`/`topic_id`, configured by `config`.
    #[must_use]
    pub fn new(topic_name: impl Into<String>, topic_id: TopicId, config: DemoSourceConfig) -> Self {
        let rng = config.seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Self {
            topic_name: topic_name.into(),
            topic_id,
            config,
            rng,
            produced: 0,
        }
    }
}

impl MessageSource for DemoSource {
    fn publisher_count(&self) -> u32 {
        // A single synthetic generator stands in for exactly one publisher.
        1
    }

    fn recv(&mut self) -> Option<Message> {
        if let Some(max) = self.config.iterations
            && self.produced >= max
        {
            return None;
        }

        std::thread::sleep(self.config.interval);

        let mut payload = vec![0u8; self.config.payload_len];
        self.rng.fill_bytes(&mut payload);
        self.produced += 1;

        Some(Message {
            topic_name: self.topic_name.clone(),
            topic_id: self.topic_id,
            payload,
            receive_time: SystemTime::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{DemoSource, DemoSourceConfig};
    use domain::MessageSource;
    use std::time::Duration;

    #[test]
    fn stops_after_configured_iterations() {
        let config = DemoSourceConfig::builder(8).interval(Duration::from_millis(1)).iterations(3).seed(7).build();
        let mut source = DemoSource::new("/demo", 0, config);
        assert!(source.recv().is_some());
        assert!(source.recv().is_some());
        assert!(source.recv().is_some());
        assert!(source.recv().is_none());
    }

    #[test]
    fn messages_carry_configured_topic_and_payload_length() {
        let config = DemoSourceConfig::builder(16).interval(Duration::from_millis(1)).iterations(1).seed(1).build();
        let mut source = DemoSource::new("/demo", 2, config);
        let msg = source.recv().unwrap();
        assert_eq!(msg.topic_name, "/demo");
        assert_eq!(msg.topic_id, 2);
        assert_eq!(msg.payload.len(), 16);
    }

    #[test]
    fn seeded_sources_are_deterministic() {
        let a = DemoSourceConfig::builder(8).interval(Duration::from_millis(1)).iterations(1).seed(42).build();
        let b = DemoSourceConfig::builder(8).interval(Duration::from_millis(1)).iterations(1).seed(42).build();
        let mut sa = DemoSource::new("/x", 0, a);
        let mut sb = DemoSource::new("/x", 0, b);
        assert_eq!(sa.recv().unwrap().payload, sb.recv().unwrap().payload);
    }
}
