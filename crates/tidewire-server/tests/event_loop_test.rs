//! Event loop integration tests over real loopback sockets.
//!
//! The loop runs on the test thread. Clients either use blocking std sockets
//! whose writes land in the kernel buffer immediately, or run on a helper
//! thread while the test thread keeps turning the loop.

use std::{
    cell::Cell,
    io::{self, Read, Write},
    net::TcpStream,
    rc::Rc,
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use nix::sys::signal::{Signal, raise};
use tidewire_core::{
    BottomHalf, Channel, HandlerFactory, RequestHandler, Scheduler, Suspend, TaskError,
    TaskScheduler, ThreadId,
};
use tidewire_proto::{TypeTag, WriteQueue, serialize};
use tidewire_server::{
    Connection, EventLoop, LoopState, ServerConfig, ServerError, WireEchoFactory,
};

/// Scheduler that keeps every connection it is handed and never runs them.
#[derive(Default)]
struct Recorder {
    started: Vec<Connection>,
    bottom_halves: usize,
}

impl Scheduler<Connection> for Recorder {
    fn start_thread(&mut self, mut connection: Connection) -> tidewire_core::Result<ThreadId> {
        let id = ThreadId::new(self.started.len() as u64 + 1);
        connection.attach(id);
        self.started.push(connection);
        Ok(id)
    }

    fn run_ready_threads(&mut self) -> tidewire_core::Result<BottomHalf> {
        self.bottom_halves += 1;
        Ok(BottomHalf::default())
    }

    fn resume_thread(&mut self, _: ThreadId) -> tidewire_core::Result<()> {
        Ok(())
    }

    fn has_ready_threads(&self) -> bool {
        false
    }

    fn close_all(&mut self) -> usize {
        let n = self.started.len();
        for conn in &mut self.started {
            conn.close();
        }
        self.started.clear();
        n
    }
}

fn local() -> ServerConfig {
    ServerConfig {
        poll_timeout: Duration::from_millis(10),
        ..ServerConfig::listen_on("127.0.0.1", 0)
    }
}

/// Turn the loop until `done` holds or five seconds pass.
fn turn_until<S, F>(event_loop: &mut EventLoop<S>, mut done: F)
where
    S: Scheduler<Connection>,
    F: FnMut(&EventLoop<S>) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(event_loop) {
        assert!(Instant::now() < deadline, "loop did not reach the expected condition");
        assert_eq!(event_loop.run_once().unwrap(), LoopState::Running);
    }
}

fn expect_closed(stream: &mut TcpStream) {
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut buf = [0u8; 16];
    match stream.read(&mut buf) {
        Ok(0) => {},
        Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {},
        other => panic!("expected the server to close the connection, got {other:?}"),
    }
}

#[test]
fn rapid_connections_each_start_one_thread() {
    let mut event_loop = EventLoop::bind(local(), Recorder::default()).unwrap();
    assert_eq!(event_loop.state(), LoopState::Listening);

    let addr = event_loop.local_addr();
    let clients: Vec<TcpStream> = (0..16).map(|_| TcpStream::connect(addr).unwrap()).collect();

    assert_eq!(event_loop.run_once().unwrap(), LoopState::Running);
    turn_until(&mut event_loop, |l| l.scheduler().started.len() >= clients.len());

    // A few more turns must not start anything twice.
    for _ in 0..3 {
        event_loop.run_once().unwrap();
    }
    assert_eq!(event_loop.scheduler().started.len(), 16);
    assert_eq!(event_loop.live_connections(), 16);
    assert_eq!(event_loop.open_handles(), 18);

    let mut ids: Vec<u64> = event_loop
        .scheduler()
        .started
        .iter()
        .filter_map(|c| c.thread().map(ThreadId::get))
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 16);
}

#[test]
fn bottom_half_runs_every_iteration() {
    let mut event_loop = EventLoop::bind(local(), Recorder::default()).unwrap();
    for _ in 0..5 {
        event_loop.run_once().unwrap();
    }
    assert_eq!(event_loop.scheduler().bottom_halves, 5);
}

#[test]
fn sighup_drains_to_stopped_with_no_open_handles() {
    let mut event_loop = EventLoop::bind(local(), Recorder::default()).unwrap();
    let mut client = TcpStream::connect(event_loop.local_addr()).unwrap();
    turn_until(&mut event_loop, |l| l.scheduler().started.len() == 1);

    // SIGHUP is blocked on this thread, so it stays pending for the signalfd.
    raise(Signal::SIGHUP).unwrap();

    assert_eq!(event_loop.run_once().unwrap(), LoopState::Draining);
    event_loop.drain();

    assert_eq!(event_loop.state(), LoopState::Stopped);
    assert_eq!(event_loop.open_handles(), 0);
    assert_eq!(event_loop.live_connections(), 0);
    expect_closed(&mut client);

    // The listener is gone too.
    assert!(TcpStream::connect(event_loop.local_addr()).is_err());
}

#[test]
fn shutdown_handle_works_across_threads() {
    let mut event_loop = EventLoop::bind(local(), Recorder::default()).unwrap();
    let handle = event_loop.shutdown_handle();

    thread::spawn(move || handle.shutdown().unwrap()).join().unwrap();

    event_loop.run().unwrap();
    assert_eq!(event_loop.state(), LoopState::Stopped);
}

#[test]
fn connections_over_capacity_are_dropped() {
    let config = ServerConfig { max_connections: 1, ..local() };
    let mut event_loop = EventLoop::bind(config, Recorder::default()).unwrap();
    let addr = event_loop.local_addr();

    let _first = TcpStream::connect(addr).unwrap();
    turn_until(&mut event_loop, |l| l.scheduler().started.len() == 1);

    let mut second = TcpStream::connect(addr).unwrap();
    for _ in 0..10 {
        event_loop.run_once().unwrap();
    }

    assert_eq!(event_loop.scheduler().started.len(), 1);
    assert_eq!(event_loop.state(), LoopState::Running);
    expect_closed(&mut second);
}

#[test]
fn wire_echo_round_trip() {
    let mut event_loop =
        EventLoop::bind(local(), TaskScheduler::new(WireEchoFactory::new())).unwrap();
    let addr = event_loop.local_addr();

    let mut queue = WriteQueue::new();
    queue
        .marker(TypeTag::MapStart)
        .text(TypeTag::String, "key")
        .int(TypeTag::Uint16, 300)
        .float(TypeTag::Double, 1.5)
        .int(TypeTag::Int8, -7)
        .marker(TypeTag::RecordEnd);
    let hint = queue.encoded_len();
    let request = serialize(queue, hint).unwrap();

    let (tx, rx) = mpsc::channel();
    let expected = request.clone();
    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        // Split mid-entry so the server sees a partial buffer first.
        let (head, tail) = expected.split_at(4);
        stream.write_all(head).unwrap();
        thread::sleep(Duration::from_millis(30));
        stream.write_all(tail).unwrap();

        let mut reply = vec![0u8; expected.len()];
        stream.read_exact(&mut reply).unwrap();

        stream.shutdown(std::net::Shutdown::Write).unwrap();
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        tx.send((reply, rest)).unwrap();
    });

    let deadline = Instant::now() + Duration::from_secs(10);
    let (reply, rest) = loop {
        if let Ok(result) = rx.try_recv() {
            break result;
        }
        assert!(Instant::now() < deadline, "echo did not complete");
        event_loop.run_once().unwrap();
    };
    client.join().unwrap();

    assert_eq!(reply, request.to_vec());
    assert!(rest.is_empty());

    // The thread finished on EOF and released its connection.
    turn_until(&mut event_loop, |l| l.live_connections() == 0);
    assert!(event_loop.scheduler().is_empty());
}

#[test]
fn malformed_input_disconnects_only_that_peer() {
    let mut event_loop =
        EventLoop::bind(local(), TaskScheduler::new(WireEchoFactory::new())).unwrap();
    let mut client = TcpStream::connect(event_loop.local_addr()).unwrap();
    client.write_all(&[0xEE, 0x00]).unwrap();

    // Accepted, run and finished within the same few iterations.
    for _ in 0..10 {
        assert_eq!(event_loop.run_once().unwrap(), LoopState::Running);
    }

    assert!(event_loop.scheduler().is_empty());
    assert_eq!(event_loop.live_connections(), 0);
    expect_closed(&mut client);
}

#[test]
fn failing_thread_stops_the_server() {
    let scheduler: TaskScheduler<Connection, _> = TaskScheduler::new(|_: ThreadId| {
        Ok::<_, TaskError>(|_: &mut Connection| -> Result<Suspend, TaskError> {
            Err(TaskError::Protocol("handler bug".to_string()))
        })
    });
    let mut event_loop = EventLoop::bind(local(), scheduler).unwrap();
    let mut client = TcpStream::connect(event_loop.local_addr()).unwrap();

    let err = event_loop.run().unwrap_err();
    assert!(matches!(err, ServerError::Scheduler(ref e) if e.is_fatal()));
    assert_eq!(event_loop.state(), LoopState::Stopped);
    assert_eq!(event_loop.open_handles(), 0);
    expect_closed(&mut client);
}

#[test]
fn thread_start_failure_keeps_the_server_running() {
    let scheduler: TaskScheduler<Connection, _> = TaskScheduler::new(|_: ThreadId| {
        Err::<fn(&mut Connection) -> Result<Suspend, TaskError>, _>(TaskError::Protocol(
            "no handler".to_string(),
        ))
    });
    let mut event_loop = EventLoop::bind(local(), scheduler).unwrap();
    let mut client = TcpStream::connect(event_loop.local_addr()).unwrap();

    for _ in 0..10 {
        assert_eq!(event_loop.run_once().unwrap(), LoopState::Running);
    }

    assert_eq!(event_loop.live_connections(), 0);
    expect_closed(&mut client);
}

#[test]
fn oversized_entry_is_cut_off_at_the_input_limit() {
    const LIMIT: usize = 4096;

    // Largest inbound buffer any step has left behind.
    let high_water = Rc::new(Cell::new(0usize));
    let seen = Rc::clone(&high_water);
    let mut echo = WireEchoFactory::new().with_max_buffered(LIMIT);
    let scheduler: TaskScheduler<Connection, _> = TaskScheduler::new(move |id: ThreadId| {
        let seen = Rc::clone(&seen);
        let mut handler = echo.create(id)?;
        Ok::<_, TaskError>(move |conn: &mut Connection| -> Result<Suspend, TaskError> {
            let result = handler.step(conn);
            seen.set(seen.get().max(conn.inbound().len()));
            result
        })
    });
    let mut event_loop = EventLoop::bind(local(), scheduler).unwrap();
    let addr = event_loop.local_addr();

    // HUGE_STRING announcing 1 MiB, then a stream that never completes it.
    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        let mut header = vec![TypeTag::HugeString.to_u8()];
        header.extend_from_slice(&(1u32 << 20).to_be_bytes());
        stream.write_all(&header).unwrap();

        let chunk = [0x41u8; 64 * 1024];
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if stream.write_all(&chunk).is_err() {
                return true;
            }
        }
        false
    });

    turn_until(&mut event_loop, |l| high_water.get() > 0 && l.scheduler().is_empty());

    assert!(client.join().unwrap(), "server never cut the peer off");
    assert!(high_water.get() <= LIMIT, "buffered {} past {LIMIT}", high_water.get());
    assert_eq!(event_loop.state(), LoopState::Running);
    assert_eq!(event_loop.live_connections(), 0);
}

#[test]
fn streaming_peer_does_not_stall_the_loop() {
    let scheduler = TaskScheduler::new(WireEchoFactory::new().with_max_buffered(1024));
    let mut event_loop = EventLoop::bind(local(), scheduler).unwrap();
    let addr = event_loop.local_addr();

    // Valid NIL entries as fast as the socket takes them; replies are never read.
    let stop = Instant::now() + Duration::from_millis(500);
    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        let chunk = vec![TypeTag::Nil.to_u8(); 64 * 1024];
        stream.set_write_timeout(Some(Duration::from_millis(50))).unwrap();
        while Instant::now() < stop {
            if let Err(e) = stream.write_all(&chunk) {
                if e.kind() != io::ErrorKind::WouldBlock && e.kind() != io::ErrorKind::TimedOut {
                    break;
                }
            }
        }
    });

    // Every iteration returns promptly while the peer is sending.
    let mut iterations = 0;
    while Instant::now() < stop {
        let started = Instant::now();
        assert_eq!(event_loop.run_once().unwrap(), LoopState::Running);
        assert!(started.elapsed() < Duration::from_millis(250), "iteration blocked");
        iterations += 1;
    }
    client.join().unwrap();

    assert!(iterations > 1);
    event_loop.shutdown_handle().shutdown().unwrap();
    event_loop.run().unwrap();
    assert_eq!(event_loop.open_handles(), 0);
}
