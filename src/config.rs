//! Client configuration
//!
//! `ClientConfig` is applied once when the client is built. Broker writer and
//! reader settings are derived from it per operation.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::level_filters::LevelFilter;

/// Default upper bound on a single fetch from the broker (10 MB)
pub const DEFAULT_READER_MAX_BYTES: usize = 10_000_000;

/// Default maximum wait for one poll of the broker
pub const DEFAULT_MAX_WAIT_MS: u64 = 1_000;

/// Configuration surface of `EventStreamClient`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Broker read timeout in milliseconds (0 = adapter default)
    ///
    /// Passed to writers for adapters that read a response per write. The
    /// memory and NATS brokers ignore it.
    pub read_timeout_ms: u64,

    /// Broker write timeout in milliseconds (0 = adapter default)
    ///
    /// The NATS broker bounds each publish and its ack with it.
    pub write_timeout_ms: u64,

    /// Broker dial timeout in milliseconds (0 = adapter default)
    ///
    /// Passed to writers and readers for adapters that dial per operation.
    /// The NATS broker connects once, using `NatsConfig::connect_timeout_secs`.
    pub dial_timeout_ms: u64,

    /// Enforce the strict required-field policy on publish
    pub strict_validation: bool,

    /// `debug`, `info`, `warn` or `error`; anything else silences output
    pub log_mode: String,

    /// Retry policy for broker writes
    pub retry: RetryPolicy,

    /// Maximum bytes fetched per poll (NATS: bytes per pull batch)
    pub reader_max_bytes: usize,

    /// Maximum wait per poll in milliseconds
    pub max_wait_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            dial_timeout_ms: 0,
            strict_validation: false,
            log_mode: String::new(),
            retry: RetryPolicy::default(),
            reader_max_bytes: DEFAULT_READER_MAX_BYTES,
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
        }
    }
}

impl ClientConfig {
    /// Level filter for `log_mode`; unknown values map to `OFF`
    pub fn log_level(&self) -> LevelFilter {
        LogMode::parse(&self.log_mode).level_filter()
    }

    /// Writer settings shared by every publish; the topic is set per task
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            topic: String::new(),
            dial_timeout: non_zero_ms(self.dial_timeout_ms),
            read_timeout: non_zero_ms(self.read_timeout_ms),
            write_timeout: non_zero_ms(self.write_timeout_ms),
        }
    }

    /// Reader settings for one subscription
    pub fn reader_config(&self, topic: String, group_id: String) -> ReaderConfig {
        ReaderConfig {
            topic,
            group_id,
            start_offset: StartOffset::Latest,
            max_wait: Duration::from_millis(self.max_wait_ms.max(1)),
            max_bytes: self.reader_max_bytes,
            dial_timeout: non_zero_ms(self.dial_timeout_ms),
        }
    }
}

fn non_zero_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Discrete log verbosity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    Debug,
    Info,
    Warn,
    Error,
    /// No output at all
    Off,
}

impl LogMode {
    pub fn parse(mode: &str) -> Self {
        match mode {
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Off,
        }
    }

    pub fn level_filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warn => LevelFilter::WARN,
            Self::Error => LevelFilter::ERROR,
            Self::Off => LevelFilter::OFF,
        }
    }
}

/// Exponential backoff for broker writes
///
/// A write is tried once, then retried up to `max_retries` times. The wait
/// before retry `n` (0-indexed) is `initial_interval × multiplier^n`, capped
/// at `max_interval`, then randomized by ±`randomization_factor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_interval_ms: u64,
    pub multiplier: f64,
    pub max_interval_ms: u64,
    pub randomization_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval_ms: 500,
            multiplier: 1.5,
            max_interval_ms: 60_000,
            randomization_factor: 0.5,
        }
    }
}

/// Settings for one short-lived broker writer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterConfig {
    /// Fully-qualified topic
    pub topic: String,
    pub dial_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
}

/// Where a new consumer group starts reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartOffset {
    /// Only records written after the reader is opened
    #[default]
    Latest,
    /// Every record still retained by the broker
    Earliest,
}

/// Settings for one subscription's broker reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Fully-qualified topic
    pub topic: String,
    /// Fully-qualified consumer group
    pub group_id: String,
    pub start_offset: StartOffset,
    pub max_wait: Duration,
    pub max_bytes: usize,
    pub dial_timeout: Option<Duration>,
}
