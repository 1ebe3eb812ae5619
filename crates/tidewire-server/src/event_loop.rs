//! Event-loop driver.
//!
//! One native thread, one poll. Each iteration ([`EventLoop::run_once`]) does
//! a single bounded poll, dispatches every readiness event (accepts, resumes,
//! shutdown triggers), then runs exactly one bottom half on the scheduler.
//! I/O dispatch and application code never interleave within an iteration.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ bind ┌───────────┐ run_once ┌─────────┐
//! │ Initializing │─────>│ Listening │─────────>│ Running │<──┐ run_once
//! └──────────────┘      └───────────┘          └─────────┘───┘
//!                                                   │ SIGHUP / shutdown() /
//!                                                   ↓ bottom half failed
//!                       ┌─────────┐    drain   ┌──────────┐
//!                       │ Stopped │<───────────│ Draining │
//!                       └─────────┘            └──────────┘
//! ```
//!
//! Draining closes the listener, the signal watcher and every live
//! connection, then runs one zero-timeout poll before reporting `Stopped`.

use std::{collections::HashMap, io, net::SocketAddr, time::Duration};

use mio::{
    Events, Interest, Poll, Token,
    event::Event,
    net::{TcpListener, TcpStream},
};
use tidewire_core::{Scheduler, SchedulerError, ThreadId};

use crate::{
    config::ServerConfig,
    connection::{Connection, ConnectionSlots, SlotGuard},
    error::ServerError,
    signal::{ShutdownHandle, ShutdownSignal},
};

const LISTENER: Token = Token(0);
const SIGNAL: Token = Token(1);
const WAKER: Token = Token(2);
const FIRST_CONNECTION: usize = 3;

const EVENTS_CAPACITY: usize = 1024;

/// Accept attempts per listener readiness before yielding to the bottom half.
const ACCEPT_BATCH: usize = 256;

/// Event loop lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Resolving the address and creating sockets
    Initializing,
    /// Bound and listening, loop not entered yet
    Listening,
    /// Polling and running bottom halves
    Running,
    /// Shutdown requested; handles are being closed
    Draining,
    /// Everything closed
    Stopped,
}

/// Single-threaded accept/poll/bottom-half loop.
pub struct EventLoop<S> {
    state: LoopState,
    config: ServerConfig,
    poll: Poll,
    events: Events,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    signal: Option<ShutdownSignal>,
    shutdown: ShutdownHandle,
    scheduler: S,
    slots: ConnectionSlots,
    threads: HashMap<Token, ThreadId>,
    tokens: HashMap<ThreadId, Token>,
    next_token: usize,
    backlogged: bool,
    drain_requested: bool,
    failure: Option<SchedulerError>,
}

impl<S> EventLoop<S>
where
    S: Scheduler<Connection>,
{
    /// Bind the listener and signal watcher.
    ///
    /// Must be called on the thread that will run the loop.
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` for an unusable configuration
    /// - `ServerError::Bind` if the address cannot be bound
    /// - `ServerError::Signal` / `ServerError::Io` if the poll set cannot be
    ///   built
    pub fn bind(config: ServerConfig, scheduler: S) -> Result<Self, ServerError> {
        let addr = config.bind_addr()?;
        tracing::info!("Starting server on {}", addr);

        let poll = Poll::new()?;
        let mut listener =
            TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        let mut signal = ShutdownSignal::new()?;
        let shutdown = ShutdownHandle::new(poll.registry(), WAKER)?;

        poll.registry().register(&mut listener, LISTENER, Interest::READABLE)?;
        signal.register(poll.registry(), SIGNAL)?;

        let slots = ConnectionSlots::new(config.max_connections);
        let mut this = Self {
            state: LoopState::Initializing,
            config,
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listener: Some(listener),
            local_addr,
            signal: Some(signal),
            shutdown,
            scheduler,
            slots,
            threads: HashMap::new(),
            tokens: HashMap::new(),
            next_token: FIRST_CONNECTION,
            backlogged: false,
            drain_requested: false,
            failure: None,
        };
        this.transition(LoopState::Listening);
        tracing::info!("Listening on {}", local_addr);

        Ok(this)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle that asks the loop to drain from any thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// The scheduler this loop drives.
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Connections currently open.
    pub fn live_connections(&self) -> usize {
        self.slots.in_use()
    }

    /// Open handles: listener, signal watcher and live connections.
    pub fn open_handles(&self) -> usize {
        usize::from(self.listener.is_some())
            + usize::from(self.signal.is_some())
            + self.slots.in_use()
    }

    /// One iteration: poll once, dispatch, run one bottom half.
    ///
    /// Returns the state afterwards. `Draining` means the caller should call
    /// [`EventLoop::drain`].
    ///
    /// # Errors
    ///
    /// - `ServerError::InvalidState` unless `Listening` or `Running`
    /// - `ServerError::Io` if polling fails
    pub fn run_once(&mut self) -> Result<LoopState, ServerError> {
        match self.state {
            LoopState::Listening => self.transition(LoopState::Running),
            LoopState::Running => {},
            state => return Err(ServerError::InvalidState { state, operation: "run_once" }),
        }

        let timeout = if self.scheduler.has_ready_threads() || self.backlogged {
            Duration::ZERO
        } else {
            self.config.poll_timeout
        };

        if let Err(e) = self.poll.poll(&mut self.events, Some(timeout))
            && e.kind() != io::ErrorKind::Interrupted
        {
            return Err(e.into());
        }

        let ready: Vec<Token> = self.events.iter().map(Event::token).collect();
        let mut accepted = false;
        for token in ready {
            match token {
                LISTENER => {
                    self.accept_pending();
                    accepted = true;
                },
                SIGNAL => self.check_signal(),
                WAKER => {
                    tracing::info!("Shutdown requested");
                    self.drain_requested = true;
                },
                token => self.resume(token),
            }
        }
        if self.backlogged && !accepted {
            self.accept_pending();
        }

        self.bottom_half();

        if self.drain_requested && self.state == LoopState::Running {
            self.transition(LoopState::Draining);
        }
        Ok(self.state)
    }

    /// Close every handle and stop. Idempotent.
    pub fn drain(&mut self) {
        match self.state {
            LoopState::Stopped => return,
            LoopState::Draining => {},
            _ => self.transition(LoopState::Draining),
        }

        if let Some(mut signal) = self.signal.take()
            && let Err(e) = signal.deregister(self.poll.registry())
        {
            tracing::warn!("Failed to stop signal watcher: {}", e);
        }

        if let Some(mut listener) = self.listener.take()
            && let Err(e) = self.poll.registry().deregister(&mut listener)
        {
            tracing::warn!("Failed to deregister listener: {}", e);
        }

        let closed = self.scheduler.close_all();
        self.threads.clear();
        self.tokens.clear();

        // One non-blocking pass so anything queued by the closes is flushed.
        if let Err(e) = self.poll.poll(&mut self.events, Some(Duration::ZERO)) {
            tracing::warn!("Final poll failed: {}", e);
        }

        let leftover = self.open_handles();
        if leftover > 0 {
            tracing::warn!(leftover, "Connections still open after drain");
        }
        self.transition(LoopState::Stopped);
        tracing::info!(closed, "Event loop stopped");
    }

    /// Run until shutdown, then drain.
    ///
    /// # Errors
    ///
    /// - `ServerError::Scheduler` if the loop stopped because a bottom half
    ///   failed
    /// - `ServerError::Io` if polling failed
    pub fn run(&mut self) -> Result<(), ServerError> {
        loop {
            match self.run_once() {
                Ok(LoopState::Running) => {},
                Ok(_) => break,
                Err(e) => {
                    tracing::error!("Event loop failed: {}", e);
                    self.drain();
                    return Err(e);
                },
            }
        }

        self.drain();
        match self.failure.take() {
            Some(err) => Err(ServerError::Scheduler(err)),
            None => Ok(()),
        }
    }

    fn transition(&mut self, to: LoopState) {
        debug_assert!(
            matches!(
                (self.state, to),
                (LoopState::Initializing, LoopState::Listening)
                    | (LoopState::Listening, LoopState::Running)
                    | (LoopState::Listening | LoopState::Running, LoopState::Draining)
                    | (LoopState::Draining, LoopState::Stopped)
            ),
            "invalid transition {:?} -> {:?}",
            self.state,
            to
        );
        tracing::debug!(from = ?self.state, to = ?to, "Event loop state change");
        self.state = to;
    }

    /// A signalfd that cannot be read is treated as a shutdown request.
    fn check_signal(&mut self) {
        let Some(signal) = self.signal.as_mut() else {
            return;
        };
        match signal.take_hangup() {
            Ok(false) => return,
            Ok(true) => tracing::info!("Shutdown request received (SIGHUP)"),
            Err(e) => tracing::error!("Failed to read signal watcher, shutting down: {}", e),
        }

        if let Err(e) = signal.deregister(self.poll.registry()) {
            tracing::warn!("Failed to stop signal watcher: {}", e);
        }
        self.drain_requested = true;
    }

    fn accept_pending(&mut self) {
        self.backlogged = true;
        for _ in 0..ACCEPT_BATCH {
            let Some(listener) = self.listener.as_ref() else {
                self.backlogged = false;
                return;
            };

            let slot = self.slots.try_acquire();
            match listener.accept() {
                Ok((stream, peer)) => match slot {
                    Some(slot) => self.start_connection(stream, peer, slot),
                    None => {
                        tracing::warn!(
                            peer = %peer,
                            max = self.slots.max(),
                            "Connection limit reached, dropping connection"
                        );
                    },
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.backlogged = false;
                    return;
                },
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }

    fn start_connection(&mut self, mut stream: TcpStream, peer: SocketAddr, slot: SlotGuard) {
        let token = Token(self.next_token);
        self.next_token += 1;

        if let Err(e) = self.poll.registry().register(
            &mut stream,
            token,
            Interest::READABLE | Interest::WRITABLE,
        ) {
            tracing::warn!(peer = %peer, error = %e, "Failed to register connection");
            return;
        }

        let conn = Connection::new(stream, peer, token, slot, self.config.read_chunk);
        match self.scheduler.start_thread(conn) {
            Ok(thread) => {
                tracing::debug!(peer = %peer, thread = %thread, "New connection");
                self.threads.insert(token, thread);
                self.tokens.insert(thread, token);
            },
            Err(e) => {
                tracing::error!(peer = %peer, error = %e, "Error starting request thread");
            },
        }
    }

    fn resume(&mut self, token: Token) {
        // Sporadic events for already-closed connections are expected
        let Some(&thread) = self.threads.get(&token) else {
            return;
        };

        match self.scheduler.resume_thread(thread) {
            Ok(()) => {},
            Err(SchedulerError::ThreadNotFound(_)) => self.forget(thread),
            Err(e) => tracing::warn!(thread = %thread, error = %e, "Resume failed"),
        }
    }

    fn bottom_half(&mut self) {
        match self.scheduler.run_ready_threads() {
            Ok(report) => {
                for thread in report.finished {
                    self.forget(thread);
                }
            },
            Err(e) => {
                tracing::error!("Error running user threads for bottom half processing: {}", e);
                self.failure = Some(e);
                if self.state == LoopState::Running {
                    self.transition(LoopState::Draining);
                }
            },
        }
    }

    fn forget(&mut self, thread: ThreadId) {
        if let Some(token) = self.tokens.remove(&thread) {
            self.threads.remove(&token);
        }
    }
}

#[cfg(test)]
mod tests {
    use tidewire_core::{BottomHalf, Channel};

    use super::*;

    /// Scheduler that only records what it is handed.
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

    #[test]
    fn bind_reaches_listening() {
        let event_loop = EventLoop::bind(local(), Recorder::default()).unwrap();
        assert_eq!(event_loop.state(), LoopState::Listening);
        assert_ne!(event_loop.local_addr().port(), 0);
        assert_eq!(event_loop.open_handles(), 2);
    }

    #[test]
    fn bad_address_fails_before_binding() {
        let config = ServerConfig::listen_on("not-an-ip", 0);
        let err = EventLoop::bind(config, Recorder::default()).err().unwrap();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn address_in_use_is_a_bind_error() {
        let first = EventLoop::bind(local(), Recorder::default()).unwrap();
        let config = ServerConfig::listen_on("127.0.0.1", first.local_addr().port());

        let err = EventLoop::bind(config, Recorder::default()).err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
    }

    #[test]
    fn shutdown_handle_drains() {
        let mut event_loop = EventLoop::bind(local(), Recorder::default()).unwrap();
        event_loop.shutdown_handle().shutdown().unwrap();

        assert_eq!(event_loop.run_once().unwrap(), LoopState::Draining);
        event_loop.drain();
        assert_eq!(event_loop.state(), LoopState::Stopped);
        assert_eq!(event_loop.open_handles(), 0);
    }

    #[test]
    fn hangup_still_finishes_the_iteration() {
        let mut event_loop = EventLoop::bind(local(), Recorder::default()).unwrap();
        let _client = std::net::TcpStream::connect(event_loop.local_addr()).unwrap();
        nix::sys::signal::raise(nix::sys::signal::Signal::SIGHUP).unwrap();

        assert_eq!(event_loop.run_once().unwrap(), LoopState::Draining);
        assert_eq!(event_loop.scheduler().started.len(), 1);
        assert_eq!(event_loop.scheduler().bottom_halves, 1);
        assert!(!event_loop.signal.as_ref().is_some_and(ShutdownSignal::is_watching));
    }

    #[test]
    fn run_once_after_stop_is_rejected() {
        let mut event_loop = EventLoop::bind(local(), Recorder::default()).unwrap();
        event_loop.drain();
        event_loop.drain();

        let err = event_loop.run_once().unwrap_err();
        assert!(matches!(
            err,
            ServerError::InvalidState { state: LoopState::Stopped, operation: "run_once" }
        ));
    }
}
