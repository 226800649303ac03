use std::{
    io::{self, Write as _},
    net::{Ipv4Addr, TcpStream, ToSocketAddrs as _, UdpSocket},
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{error, info};

pub mod sync;

/// Transport used to reach the collector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    /// Reliable stream transport (TCP). This is the default.
    Tcp,

    /// Connectionless datagram transport (UDP).
    Udp,
}

impl Transport {
    /// Returns the transport ID for this transport kind.
    pub const fn transport_id(self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
        }
    }
}

/// Forwarder configuration.
#[derive(Clone)]
pub(crate) struct ForwarderConfiguration {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
    pub timeout: Duration,
    pub log_sends: bool,
}

#[derive(Debug, Error)]
enum TransportError {
    #[error("timed out after {timeout:?} sending to {host}:{port}")]
    Timeout { host: String, port: u16, timeout: Duration },

    #[error("failed to send to {host}:{port} over {transport}: {source}")]
    Io {
        host: String,
        port: u16,
        transport: &'static str,
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    fn from_io(config: &ForwarderConfiguration, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout {
                host: config.host.clone(),
                port: config.port,
                timeout: config.timeout,
            },
            _ => TransportError::Io {
                host: config.host.clone(),
                port: config.port,
                transport: config.transport.transport_id(),
                source,
            },
        }
    }
}

enum Client {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl Client {
    fn connect(config: &ForwarderConfiguration) -> io::Result<Self> {
        match config.transport {
            Transport::Tcp => {
                let mut last_error = None;
                for addr in (config.host.as_str(), config.port).to_socket_addrs()? {
                    match TcpStream::connect_timeout(&addr, config.timeout) {
                        Ok(stream) => {
                            stream.set_write_timeout(Some(config.timeout))?;
                            return Ok(Client::Tcp(stream));
                        }
                        Err(e) => last_error = Some(e),
                    }
                }

                Err(last_error.unwrap_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::AddrNotAvailable,
                        "host resolved to no usable addresses",
                    )
                }))
            }
            Transport::Udp => UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).and_then(|socket| {
                socket.connect((config.host.as_str(), config.port))?;
                socket.set_write_timeout(Some(config.timeout))?;
                Ok(Client::Udp(socket))
            }),
        }
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Client::Tcp(stream) => stream.write_all(buf),
            Client::Udp(socket) => socket.send(buf).map(|_| ()),
        }
    }
}

/// Sends one payload to the collector, opening a fresh connection for the attempt.
///
/// Transport failures never escape this layer: the payload is dropped and the failure is logged.
/// When the log-sends flag is set, successful transmissions are logged at info level with the
/// elapsed time.
pub(crate) fn send_payload(config: &ForwarderConfiguration, payload: &[u8]) {
    let start = Instant::now();
    match try_send(config, payload) {
        Ok(()) => {
            if config.log_sends {
                info!(
                    host = %config.host,
                    port = config.port,
                    transport = config.transport.transport_id(),
                    len = payload.len(),
                    elapsed = ?start.elapsed(),
                    "Sent payload."
                );
            }
        }
        Err(e) => {
            error!(error = %e, len = payload.len(), "Failed to send payload.");
        }
    }
}

fn try_send(config: &ForwarderConfiguration, payload: &[u8]) -> Result<(), TransportError> {
    let mut client = Client::connect(config).map_err(|e| TransportError::from_io(config, e))?;
    client.send(payload).map_err(|e| TransportError::from_io(config, e))
}
