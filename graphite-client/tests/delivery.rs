use std::{
    collections::HashMap,
    io::Read,
    net::{TcpListener, UdpSocket},
    sync::{mpsc, Arc},
    thread,
    time::{Duration, Instant},
};

use graphite_client::{GraphiteBuilder, SendError, Transport};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawns a TCP collector that reads each accepted connection to EOF and yields the received
/// bytes as one string per connection (a fresh connection is opened per transmission).
fn tcp_collector() -> (u16, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let port = listener.local_addr().expect("local addr").port();

    let (payloads_tx, payloads_rx) = mpsc::channel();
    thread::spawn(move || loop {
        let (mut stream, _) = match listener.accept() {
            Ok(pair) => pair,
            Err(_) => return,
        };

        let mut buf = String::new();
        if stream.read_to_string(&mut buf).is_err() {
            continue;
        }

        if payloads_tx.send(buf).is_err() {
            return;
        }
    });

    (port, payloads_rx)
}

/// Grabs a port with nothing listening on it.
fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    listener.local_addr().expect("local addr").port()
}

#[test]
fn synchronous_tcp_delivery() {
    let (port, payloads) = tcp_collector();

    let sender = GraphiteBuilder::new("127.0.0.1")
        .with_port(port)
        .with_prefix("system.sync")
        .build()
        .expect("build should succeed");

    sender.send_with("foo.bar", 42, Some(1000), &[]).expect("send should succeed");
    assert_eq!(payloads.recv_timeout(RECV_TIMEOUT).unwrap(), "system.sync.foo.bar 42 1000\n");

    sender.send_with("bar", 43.5, Some(12346), &[]).expect("send should succeed");
    assert_eq!(payloads.recv_timeout(RECV_TIMEOUT).unwrap(), "system.sync.bar 43.5 12346\n");
}

#[test]
fn synchronous_tcp_delivery_with_tags() {
    let (port, payloads) = tcp_collector();

    let sender = GraphiteBuilder::new("127.0.0.1")
        .with_port(port)
        .with_default_tag("env", "test")
        .build()
        .expect("build should succeed");

    sender
        .send_with("x", 1, Some(1000), &[("b", "2"), ("a", "1")])
        .expect("send should succeed");
    assert_eq!(payloads.recv_timeout(RECV_TIMEOUT).unwrap(), "x;a=1;b=2;env=test 1 1000\n");
}

#[test]
fn synchronous_udp_delivery() {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind should succeed");
    socket.set_read_timeout(Some(RECV_TIMEOUT)).expect("set read timeout");
    let port = socket.local_addr().expect("local addr").port();

    let sender = GraphiteBuilder::new("127.0.0.1")
        .with_port(port)
        .with_transport(Transport::Udp)
        .build()
        .expect("build should succeed");

    sender.send_with("foo", 42, Some(12345), &[]).expect("send should succeed");

    let mut buf = [0u8; 2048];
    let (n, _) = socket.recv_from(&mut buf).expect("datagram should arrive");
    assert_eq!(&buf[..n], b"foo 42 12345\n");
}

#[test]
fn asynchronous_sends_batch_into_one_flush() {
    let (port, payloads) = tcp_collector();

    let sender = GraphiteBuilder::new("127.0.0.1")
        .with_port(port)
        .with_flush_interval(Duration::from_millis(200))
        .build()
        .expect("build should succeed");

    sender.send_with("a", 1, Some(1000), &[]).expect("send should succeed");
    sender.send_with("b", 2, Some(1000), &[]).expect("send should succeed");
    sender.send_with("c", 3, Some(1000), &[]).expect("send should succeed");

    // All three were queued well within one interval, so they arrive as a single payload, in
    // send order.
    assert_eq!(payloads.recv_timeout(RECV_TIMEOUT).unwrap(), "a 1 1000\nb 2 1000\nc 3 1000\n");

    sender.stop();
}

#[test]
fn stop_flushes_pending_messages() {
    let (port, payloads) = tcp_collector();

    // An interval long enough that no periodic flush can fire during the test: delivery can
    // only come from the final flush performed on stop.
    let sender = GraphiteBuilder::new("127.0.0.1")
        .with_port(port)
        .with_flush_interval(Duration::from_secs(3600))
        .build()
        .expect("build should succeed");

    sender.send_with("x", 1, Some(1000), &[]).expect("send should succeed");
    sender.send_with("y", 2, Some(1000), &[]).expect("send should succeed");

    sender.stop();
    assert_eq!(payloads.recv_timeout(RECV_TIMEOUT).unwrap(), "x 1 1000\ny 2 1000\n");

    // Stopping again has no additional effect.
    sender.stop();
}

#[test]
fn concurrent_sends_are_lossless() {
    const WORKERS: usize = 8;
    const SENDS_PER_WORKER: usize = 25;

    let (port, payloads) = tcp_collector();

    let sender = Arc::new(
        GraphiteBuilder::new("127.0.0.1")
            .with_port(port)
            .with_flush_interval(Duration::from_millis(100))
            .build()
            .expect("build should succeed"),
    );

    let mut workers = Vec::new();
    for worker in 0..WORKERS {
        let sender = Arc::clone(&sender);
        workers.push(thread::spawn(move || {
            for i in 0..SENDS_PER_WORKER {
                sender
                    .send_with(&format!("worker{worker}.m{i}"), 1, Some(1000), &[])
                    .expect("send should succeed");
            }
        }));
    }

    for worker in workers {
        worker.join().expect("worker should not panic");
    }
    sender.stop();

    // Messages may be spread over several flushes; collect until every line has arrived.
    let mut lines: HashMap<String, usize> = HashMap::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    while lines.values().sum::<usize>() < WORKERS * SENDS_PER_WORKER {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let payload = payloads.recv_timeout(remaining).expect("collector should receive all sends");
        for line in payload.lines() {
            *lines.entry(line.to_string()).or_default() += 1;
        }
    }

    for worker in 0..WORKERS {
        for i in 0..SENDS_PER_WORKER {
            let expected = format!("worker{worker}.m{i} 1 1000");
            assert_eq!(lines.get(&expected), Some(&1), "line {expected:?} should arrive exactly once");
        }
    }
}

#[test]
fn unreachable_collector_is_swallowed() {
    let port = unused_port();

    // Synchronous: the transmission attempt fails (connection refused), which is logged and
    // swallowed; send still returns Ok.
    let sender = GraphiteBuilder::new("127.0.0.1")
        .with_port(port)
        .with_timeout(Duration::from_secs(1))
        .build()
        .expect("build should succeed");
    sender.send_with("foo", 1, Some(1000), &[]).expect("transport failure should not surface");

    // Asynchronous: send only enqueues, and the failing final flush doesn't block stop.
    let sender = GraphiteBuilder::new("127.0.0.1")
        .with_port(port)
        .with_timeout(Duration::from_secs(1))
        .with_flush_interval(Duration::from_secs(3600))
        .build()
        .expect("build should succeed");
    sender.send_with("foo", 1, Some(1000), &[]).expect("transport failure should not surface");
    sender.stop();
}

#[test]
fn input_validation_errors_surface() {
    // Validation fails before any network activity, so the port doesn't matter.
    let sender = GraphiteBuilder::new("127.0.0.1")
        .with_port(unused_port())
        .build()
        .expect("build should succeed");

    assert!(matches!(
        sender.send("foo bar", 42),
        Err(SendError::InvalidMetricPath { .. })
    ));
    assert!(matches!(
        sender.send_with("foo", 42, None, &[("bad tag", "1")]),
        Err(SendError::InvalidTag { .. })
    ));
}
