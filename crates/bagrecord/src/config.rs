// Rust guideline compliant 2026-02-16

//! Command-line surface for the `record` binary.
//!
//! Parses the flags described in the external-interfaces section into a
//! [`RecordConfig`] the rest of `main` can wire up directly.

use bytesize::ByteSize;
use clap::Parser;
use domain::{Compression, Naming};
use std::path::PathBuf;
use std::time::Duration;

/// Record subscribed topics into a bag file.
#[derive(Debug, Parser)]
#[command(name = "record", about = "Record subscribed topics into a bag file.")]
pub struct Cli {
    /// Topics to record, each as `name[=rate_hz]`.
    #[arg(required = true)]
    pub topics: Vec<String>,

    /// Filename prefix for timestamped segments (ignored when `-o` is given).
    #[arg(long, default_value = "bag")]
    pub prefix: String,

    /// Exact output path; overrides `--prefix` and disables rotation-by-timestamp naming.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Byte capacity of the in-memory message queue.
    #[arg(long, default_value = "500MB")]
    pub queue_size: String,

    /// Rotate to a new segment after this many bytes.
    #[arg(long)]
    pub split_bag_size: Option<String>,

    /// Directory byte budget enforced by deleting the oldest `*.bag` files.
    #[arg(long)]
    pub delete_old_at: Option<String>,

    /// Do not start recording automatically.
    #[arg(long)]
    pub paused: bool,

    /// Disable the terminal status display.
    #[arg(long = "no-ui")]
    pub no_ui: bool,

    /// Hint that the transport should prefer UDP (informational only).
    #[arg(long)]
    pub udp: bool,

    /// Compress segments with BZ2.
    #[arg(long, conflicts_with = "lz4")]
    pub bz2: bool,

    /// Compress segments with LZ4.
    #[arg(long, conflicts_with = "bz2")]
    pub lz4: bool,
}

/// Errors in the CLI surface itself, before any component is constructed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A positional topic argument did not parse as `name[=rate_hz]`.
    #[error("invalid topic spec '{spec}': {reason}")]
    InvalidTopic {
        /// The raw argument as given.
        spec: String,
        /// Why it was rejected.
        reason: String,
    },
    /// A `--queue-size`/`--split-bag-size`/`--delete-old-at` value did not parse.
    #[error("invalid size '{value}' for --{flag}: {reason}")]
    InvalidSize {
        /// Flag name the value was given for.
        flag: String,
        /// The raw value as given.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// One parsed topic argument.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicArg {
    /// Topic name.
    pub name: String,
    /// Minimum inter-message interval derived from an optional `=rate_hz` suffix.
    pub rate_limit: Duration,
}

/// Parse `name[=rate_hz]`, e.g. `/imu` or `/imu=50`.
///
/// # Errors
/// Returns [`ConfigError::InvalidTopic`] if the rate suffix is present but
/// does not parse as a positive `f64`.
pub fn parse_topic(spec: &str) -> Result<TopicArg, ConfigError> {
    match spec.split_once('=') {
        None => Ok(TopicArg {
            name: spec.to_owned(),
            rate_limit: Duration::ZERO,
        }),
        Some((name, rate_str)) => {
            let rate_hz: f64 = rate_str.parse().map_err(|_| ConfigError::InvalidTopic {
                spec: spec.to_owned(),
                reason: format!("'{rate_str}' is not a number"),
            })?;
            if rate_hz <= 0.0 {
                return Err(ConfigError::InvalidTopic {
                    spec: spec.to_owned(),
                    reason: "rate must be positive".to_owned(),
                });
            }
            Ok(TopicArg {
                name: name.to_owned(),
                rate_limit: Duration::from_secs_f64(1.0 / rate_hz),
            })
        }
    }
}

/// Parse a `bytesize`-flavored size string for `flag`.
///
/// # Errors
/// Returns [`ConfigError::InvalidSize`] if `value` does not parse.
pub fn parse_size(flag: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse::<ByteSize>()
        .map(|b| b.0)
        .map_err(|reason| ConfigError::InvalidSize {
            flag: flag.to_owned(),
            value: value.to_owned(),
            reason,
        })
}

/// Fully validated, ready-to-wire configuration derived from [`Cli`].
#[derive(Debug)]
pub struct RecordConfig {
    /// Topics sorted by name, each with its rate limit.
    pub topics: Vec<TopicArg>,
    /// Output naming policy.
    pub naming: Naming,
    /// Byte capacity of the message queue.
    pub queue_size_bytes: u64,
    /// Rotation threshold in bytes; `0` means never rotate.
    pub split_bag_size_bytes: u64,
    /// Reaper directory budget in bytes; `0` means disabled.
    pub delete_old_at_bytes: u64,
    /// Whether recording should start paused.
    pub paused: bool,
    /// Whether the terminal status display is disabled.
    pub no_ui: bool,
    /// Compression applied to written segments.
    pub compression: Compression,
    /// Whether `--udp` was given (transport hint only; not wired to a real transport).
    pub udp: bool,
}

impl RecordConfig {
    /// Validate and normalize a parsed [`Cli`].
    ///
    /// # Errors
    /// Returns [`ConfigError`] on a malformed topic spec or size string.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let mut topics = cli.topics.iter().map(|s| parse_topic(s)).collect::<Result<Vec<_>, _>>()?;
        topics.sort_by(|a, b| a.name.cmp(&b.name));

        let naming = match cli.output {
            Some(path) => Naming::Verbatim { path },
            None => Naming::AppendTimestamp { prefix: cli.prefix },
        };

        let queue_size_bytes = parse_size("queue-size", &cli.queue_size)?;
        let split_bag_size_bytes = cli
            .split_bag_size
            .as_deref()
            .map(|v| parse_size("split-bag-size", v))
            .transpose()?
            .unwrap_or(0);
        let delete_old_at_bytes = cli
            .delete_old_at
            .as_deref()
            .map(|v| parse_size("delete-old-at", v))
            .transpose()?
            .unwrap_or(0);

        let compression = if cli.bz2 {
            Compression::Bz2
        } else if cli.lz4 {
            Compression::Lz4
        } else {
            Compression::None
        };

        Ok(Self {
            topics,
            naming,
            queue_size_bytes,
            split_bag_size_bytes,
            delete_old_at_bytes,
            paused: cli.paused,
            no_ui: cli.no_ui,
            compression,
            udp: cli.udp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_size, parse_topic};
    use std::time::Duration;

    #[test]
    fn bare_topic_has_no_rate_limit() {
        let t = parse_topic("/imu").unwrap();
        assert_eq!(t.name, "/imu");
        assert_eq!(t.rate_limit, Duration::ZERO);
    }

    #[test]
    fn rated_topic_converts_hz_to_interval() {
        let t = parse_topic("/imu=50").unwrap();
        assert_eq!(t.name, "/imu");
        assert_eq!(t.rate_limit, Duration::from_secs_f64(0.02));
    }

    #[test]
    fn non_numeric_rate_is_rejected() {
        assert!(parse_topic("/imu=fast").is_err());
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(parse_topic("/imu=0").is_err());
    }

    #[test]
    fn size_strings_parse_binary_units() {
        assert_eq!(parse_size("queue-size", "1KB").unwrap(), 1_000);
        assert_eq!(parse_size("queue-size", "500MB").unwrap(), 500_000_000);
    }

    #[test]
    fn malformed_size_is_rejected() {
        assert!(parse_size("queue-size", "not-a-size").is_err());
    }
}
