use std::{
    thread::JoinHandle,
    time::{SystemTime, UNIX_EPOCH},
};

use crossbeam_channel::{Sender as ChannelSender, TrySendError};
use parking_lot::Mutex;
use tracing::error;

use crate::{
    forwarder::{self, sync::Event, ForwarderConfiguration},
    writer::{MessageFormatter, MetricValue, SendError},
};

pub(crate) struct Backend {
    pub events: ChannelSender<Event>,
    pub handle: Mutex<Option<JoinHandle<()>>>,
}

/// A client for sending metrics to a Graphite server.
///
/// A sender targets exactly one collector endpoint and operates in one of two modes, fixed at
/// construction:
///
/// - **Synchronous** (no flush interval configured): every [`send`](Self::send) formats the
///   metric and transmits it inline, returning once the transmission attempt completes.
/// - **Asynchronous** (a flush interval is configured): [`send`](Self::send) formats the metric
///   and hands it to a background flush scheduler, returning immediately. The scheduler
///   transmits everything queued since the previous flush as one batch, once per interval.
///
/// In both modes, transport failures are logged and swallowed: collector unavailability results
/// in silent metric loss, never an error or a panic in the calling application. The only errors
/// surfaced to callers are input-validation failures ([`SendError`]).
///
/// A sender is built with [`GraphiteBuilder`](crate::GraphiteBuilder).
pub struct GraphiteSender {
    formatter: MessageFormatter,
    config: ForwarderConfiguration,
    backend: Option<Backend>,
}

impl GraphiteSender {
    pub(crate) fn new(
        formatter: MessageFormatter,
        config: ForwarderConfiguration,
        backend: Option<Backend>,
    ) -> Self {
        GraphiteSender { formatter, config, backend }
    }

    /// Sends a metric with the current time as its timestamp and no per-call tags.
    ///
    /// See [`send_with`](Self::send_with).
    ///
    /// # Errors
    ///
    /// Returns an error if the metric path is empty or contains a reserved character.
    pub fn send<V>(&self, path: &str, value: V) -> Result<(), SendError>
    where
        V: Into<MetricValue>,
    {
        self.send_with(path, value, None, &[])
    }

    /// Sends a metric.
    ///
    /// The metric path is prepended with the configured prefix, if any. The timestamp is seconds
    /// since the Unix epoch, defaulting to the current time. Tags are merged over the configured
    /// default tag set (the per-call value wins on a name collision) and rendered sorted by name.
    ///
    /// In synchronous mode, this transmits inline and returns once the attempt completes. In
    /// asynchronous mode, this enqueues the formatted message and returns immediately; if the
    /// queue is full, the message is dropped with a logged error.
    ///
    /// # Errors
    ///
    /// Returns an error if the metric path or a tag is empty or contains a reserved character
    /// (space, semicolon, or newline). Transport failures are never returned: they are logged
    /// and the metric is lost, keeping collector unavailability from destabilizing the caller.
    pub fn send_with<V>(
        &self,
        path: &str,
        value: V,
        timestamp: Option<u64>,
        tags: &[(&str, &str)],
    ) -> Result<(), SendError>
    where
        V: Into<MetricValue>,
    {
        let timestamp = timestamp.unwrap_or_else(unix_timestamp);
        let message = self.formatter.format(path, value.into(), timestamp, tags)?;

        match &self.backend {
            None => forwarder::send_payload(&self.config, &message),
            Some(backend) => match backend.events.try_send(Event::Message(message)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    error!("Queue full, dropping metric.");
                }
                Err(TrySendError::Disconnected(_)) => {
                    error!("Flush scheduler has terminated, dropping metric.");
                }
            },
        }

        Ok(())
    }

    /// Stops the background flush scheduler, if one is running.
    ///
    /// Any messages still queued are flushed once, best effort, before the scheduler terminates;
    /// the final transmission obeys the configured timeout, so this does not hang on an
    /// unreachable collector. Idempotent: calling it again (or on a synchronous sender) does
    /// nothing. Dropping the sender stops it implicitly.
    pub fn stop(&self) {
        if let Some(backend) = &self.backend {
            let _ = backend.events.send(Event::Stop);
            if let Some(handle) = backend.handle.lock().take() {
                if handle.join().is_err() {
                    error!("Flush scheduler thread panicked.");
                }
            }
        }
    }
}

impl Drop for GraphiteSender {
    fn drop(&mut self) {
        self.stop();
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}
