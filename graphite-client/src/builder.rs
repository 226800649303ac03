use std::{collections::BTreeMap, time::Duration};

use crossbeam_channel::bounded;
use thiserror::Error;

use crate::{
    forwarder::{sync::Forwarder, ForwarderConfiguration, Transport},
    sender::{Backend, GraphiteSender},
    writer::{self, MessageFormatter},
};

const DEFAULT_PORT: u16 = 2003;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// Matches the queue bound of interval seconds times 100 used by other Graphite clients: roomy
// enough for bursts, small enough that an unreachable collector cannot buffer unbounded memory.
const QUEUE_CAPACITY_PER_INTERVAL_SECOND: usize = 100;
const MIN_QUEUE_CAPACITY: usize = 100;

/// Errors that could occur while building a sender.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A configuration parameter was invalid.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Details about which parameter was invalid.
        reason: String,
    },

    /// Failed to spawn the background flush scheduler thread.
    #[error("failed to spawn background thread for the flush scheduler")]
    Backend,

    /// The process-wide default sender was already initialized.
    #[error("default sender already initialized")]
    AlreadyInitialized,
}

fn invalid_config<S: Into<String>>(reason: S) -> BuildError {
    BuildError::InvalidConfig { reason: reason.into() }
}

/// Builder for a [`GraphiteSender`].
pub struct GraphiteBuilder {
    host: String,
    port: u16,
    transport: Transport,
    prefix: Option<String>,
    default_tags: BTreeMap<String, String>,
    flush_interval: Option<Duration>,
    timeout: Duration,
    queue_size: Option<usize>,
    log_sends: bool,
}

impl GraphiteBuilder {
    /// Creates a builder targeting the given host.
    ///
    /// Defaults: port 2003, TCP transport, no prefix, no default tags, synchronous mode (no
    /// flush interval), 5 second connect/send timeout, send logging disabled.
    pub fn new<H>(host: H) -> Self
    where
        H: Into<String>,
    {
        GraphiteBuilder {
            host: host.into(),
            port: DEFAULT_PORT,
            transport: Transport::Tcp,
            prefix: None,
            default_tags: BTreeMap::new(),
            flush_interval: None,
            timeout: DEFAULT_TIMEOUT,
            queue_size: None,
            log_sends: false,
        }
    }

    /// Set the collector port.
    ///
    /// Defaults to 2003, the conventional Carbon plaintext port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the transport used to reach the collector.
    ///
    /// Defaults to [`Transport::Tcp`].
    #[must_use]
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Set a prefix prepended (with a `.` separator) to every metric path sent.
    #[must_use]
    pub fn with_prefix<S>(mut self, prefix: S) -> Self
    where
        S: Into<String>,
    {
        self.prefix = Some(prefix.into());
        self
    }

    /// Add a default tag attached to every metric sent.
    ///
    /// Per-send tags with the same name override the default value.
    #[must_use]
    pub fn with_default_tag<N, V>(mut self, name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        self.default_tags.insert(name.into(), value.into());
        self
    }

    /// Enable asynchronous mode with the given flush interval.
    ///
    /// A background thread is spawned at build time; `send` calls enqueue messages and return
    /// immediately, and the background thread transmits everything queued since the previous
    /// flush as one batch, once per interval. Without a flush interval the sender is
    /// synchronous: every `send` transmits inline.
    #[must_use]
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = Some(flush_interval);
        self
    }

    /// Set the connect/send timeout.
    ///
    /// Applies to every transmission, including the final flush performed on stop.
    ///
    /// Defaults to 5 seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the capacity of the pending-message queue used in asynchronous mode.
    ///
    /// When the queue is full, further messages are dropped with a logged error until the next
    /// flush makes room.
    ///
    /// Defaults to 100 entries per second of flush interval, with a floor of 100.
    #[must_use]
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = Some(queue_size);
        self
    }

    /// Sets whether or not each successful transmission is logged at info level.
    ///
    /// Defaults to `false`.
    #[must_use]
    pub fn log_sends(mut self, log_sends: bool) -> Self {
        self.log_sends = log_sends;
        self
    }

    /// Builds the sender.
    ///
    /// In asynchronous mode, the background flush scheduler thread is spawned here; no network
    /// activity happens until the first transmission.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidConfig`] if the host is empty or contains whitespace, the
    /// port is zero, the flush interval or timeout is zero, the queue size is zero, or the
    /// prefix or a default tag contains a reserved character. Returns [`BuildError::Backend`]
    /// if the scheduler thread could not be spawned.
    pub fn build(self) -> Result<GraphiteSender, BuildError> {
        if self.host.is_empty() {
            return Err(invalid_config("host must not be empty"));
        }

        if self.host.chars().any(char::is_whitespace) {
            return Err(invalid_config("host must not contain whitespace"));
        }

        if self.port == 0 {
            return Err(invalid_config("port must be non-zero"));
        }

        if self.timeout.is_zero() {
            return Err(invalid_config("timeout must be positive"));
        }

        if let Some(flush_interval) = self.flush_interval {
            if flush_interval.is_zero() {
                return Err(invalid_config("flush interval must be positive"));
            }
        }

        if self.queue_size == Some(0) {
            return Err(invalid_config("queue size must be non-zero"));
        }

        if let Some(prefix) = &self.prefix {
            writer::validate_path(prefix)
                .map_err(|e| invalid_config(format!("invalid prefix: {e}")))?;
        }

        for (name, value) in &self.default_tags {
            writer::validate_tag(name, value)
                .map_err(|e| invalid_config(format!("invalid default tag: {e}")))?;
        }

        let formatter = MessageFormatter::new(self.prefix, self.default_tags);
        let config = ForwarderConfiguration {
            host: self.host,
            port: self.port,
            transport: self.transport,
            timeout: self.timeout,
            log_sends: self.log_sends,
        };

        let backend = match self.flush_interval {
            None => None,
            Some(flush_interval) => {
                let capacity = self.queue_size.unwrap_or_else(|| {
                    (flush_interval.as_secs() as usize * QUEUE_CAPACITY_PER_INTERVAL_SECOND)
                        .max(MIN_QUEUE_CAPACITY)
                });

                let (events_tx, events_rx) = bounded(capacity);
                let forwarder = Forwarder::new(config.clone(), flush_interval, events_rx);

                let handle = std::thread::Builder::new()
                    .name("graphite-client-flush".to_string())
                    .spawn(move || forwarder.run())
                    .map_err(|_| BuildError::Backend)?;

                Some(Backend {
                    events: events_tx,
                    handle: parking_lot::Mutex::new(Some(handle)),
                })
            }
        };

        Ok(GraphiteSender::new(formatter, config, backend))
    }
}
