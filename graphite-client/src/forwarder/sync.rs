use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::debug;

use super::{send_payload, ForwarderConfiguration};

/// Events accepted by the background flush scheduler.
pub(crate) enum Event {
    /// One formatted protocol line to include in the next flush.
    Message(Vec<u8>),

    /// Flush whatever is queued and terminate.
    Stop,
}

/// The background flush scheduler.
///
/// Receives formatted messages from `send()` callers over a bounded channel, accumulates them,
/// and transmits the accumulated batch as one payload on a fixed flush interval. The channel is
/// the batch queue: its FIFO order is the transmission order within a batch, and a message
/// arriving after a tick has fired belongs to the next tick's batch.
pub(crate) struct Forwarder {
    config: ForwarderConfiguration,
    flush_interval: Duration,
    events: Receiver<Event>,
}

impl Forwarder {
    pub fn new(
        config: ForwarderConfiguration,
        flush_interval: Duration,
        events: Receiver<Event>,
    ) -> Self {
        Forwarder { config, flush_interval, events }
    }

    /// Run the scheduler until stopped, flushing the accumulated batch at the configured
    /// interval.
    ///
    /// On stop (explicit [`Event::Stop`] or all senders dropped), any remaining queued messages
    /// are flushed once, best effort, before the thread terminates. The final transmission obeys
    /// the same timeout as any other; if it fails, the failure is logged and the scheduler still
    /// terminates.
    pub fn run(self) {
        let mut batch: Vec<u8> = Vec::new();
        let mut batched = 0usize;

        let mut next_flush = Instant::now() + self.flush_interval;
        loop {
            // Wait for the next message, but no longer than our target flush deadline.
            let wait = next_flush.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(wait) {
                Ok(Event::Message(message)) => {
                    batch.extend_from_slice(&message);
                    batched += 1;
                }
                Ok(Event::Stop) => break,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if Instant::now() >= next_flush {
                next_flush = Instant::now() + self.flush_interval;
                if !batch.is_empty() {
                    debug!(messages = batched, len = batch.len(), "Flushing batch.");
                    send_payload(&self.config, &batch);
                    batch.clear();
                    batched = 0;
                }
            }
        }

        // Sweep up anything that raced in ahead of the stop signal.
        while let Ok(Event::Message(message)) = self.events.try_recv() {
            batch.extend_from_slice(&message);
            batched += 1;
        }

        if !batch.is_empty() {
            debug!(messages = batched, len = batch.len(), "Flushing final batch before shutdown.");
            send_payload(&self.config, &batch);
        }
    }
}
