//! A client for sending metrics to a [Graphite][graphite] server using the
//! [Carbon plaintext protocol][plaintext].
//!
//! [graphite]: https://graphiteapp.org/
//! [plaintext]: https://graphite.readthedocs.io/en/latest/feeding-carbon.html#the-plaintext-protocol
//!
//! # Usage
//!
//! Build a sender with [`GraphiteBuilder`] and send metrics through it:
//!
//! ```no_run
//! # use std::time::Duration;
//! # use graphite_client::GraphiteBuilder;
//! // A synchronous sender: every send opens a connection and transmits inline.
//! let sender = GraphiteBuilder::new("graphite.example.com")
//!     .with_prefix("app.web")
//!     .build()
//!     .expect("failed to build sender");
//!
//! sender.send("requests.count", 42).expect("invalid metric");
//!
//! // An asynchronous sender: sends enqueue and return immediately, and a background
//! // thread flushes everything queued once per interval.
//! let sender = GraphiteBuilder::new("graphite.example.com")
//!     .with_flush_interval(Duration::from_secs(10))
//!     .build()
//!     .expect("failed to build sender");
//!
//! sender.send("requests.latency", 3.5).expect("invalid metric");
//!
//! // Flushes anything still queued and joins the background thread.
//! sender.stop();
//! ```
//!
//! Applications that don't want to thread a sender handle through call sites can initialize the
//! process-wide default sender once and use the module-level functions:
//!
//! ```no_run
//! # use graphite_client::GraphiteBuilder;
//! graphite_client::init(GraphiteBuilder::new("graphite.example.com")).unwrap();
//! graphite_client::send("foo.bar", 42).unwrap();
//! ```
//!
//! # Delivery model
//!
//! Delivery is best effort: there is no acknowledgement protocol, no persistent retry queue,
//! and no buffering beyond the in-memory batch queue. A fresh connection is opened for every
//! transmission. Transport failures (connection refused, timeout, and so on) are logged via
//! [`tracing`] and otherwise swallowed, so an unreachable collector can never crash or block
//! the host application; the only errors surfaced from [`GraphiteSender::send`] are
//! input-validation errors.
//!
//! # Protocol
//!
//! One metric per line:
//!
//! ```text
//! <path>[;<tag>=<value>;...] <numeric-value> <integer-unix-timestamp>\n
//! ```
//!
//! Tags are rendered sorted by name so the same tag set always produces byte-identical output.
//! Integer values render without a decimal point; floating-point values render in shortest
//! round-trip form, which is plain decimal notation for typical metric magnitudes.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

use std::sync::OnceLock;

mod builder;
pub use self::builder::{BuildError, GraphiteBuilder};

mod forwarder;
pub use self::forwarder::Transport;

mod sender;
pub use self::sender::GraphiteSender;

mod writer;
pub use self::writer::{MetricValue, SendError};

static DEFAULT_SENDER: OnceLock<GraphiteSender> = OnceLock::new();

/// Initializes the process-wide default sender used by [`send`] and [`send_with`].
///
/// # Errors
///
/// Returns [`BuildError::AlreadyInitialized`] if a default sender was already initialized, or
/// any error from [`GraphiteBuilder::build`].
pub fn init(builder: GraphiteBuilder) -> Result<(), BuildError> {
    let sender = builder.build()?;
    DEFAULT_SENDER.set(sender).map_err(|_| BuildError::AlreadyInitialized)
}

fn default_sender() -> &'static GraphiteSender {
    DEFAULT_SENDER
        .get()
        .expect("default sender not initialized; call graphite_client::init first")
}

/// Sends a metric via the default sender. See [`GraphiteSender::send`].
///
/// # Panics
///
/// Panics if [`init`] has not been called.
pub fn send<V>(path: &str, value: V) -> Result<(), SendError>
where
    V: Into<MetricValue>,
{
    default_sender().send(path, value)
}

/// Sends a metric with an explicit timestamp and tags via the default sender. See
/// [`GraphiteSender::send_with`].
///
/// # Panics
///
/// Panics if [`init`] has not been called.
pub fn send_with<V>(
    path: &str,
    value: V,
    timestamp: Option<u64>,
    tags: &[(&str, &str)],
) -> Result<(), SendError>
where
    V: Into<MetricValue>,
{
    default_sender().send_with(path, value, timestamp, tags)
}

/// Stops the default sender's background flush scheduler, if one is running.
///
/// Does nothing if [`init`] has not been called. See [`GraphiteSender::stop`].
pub fn stop() {
    if let Some(sender) = DEFAULT_SENDER.get() {
        sender.stop();
    }
}
