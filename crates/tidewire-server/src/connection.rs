//! Connection lifecycle.
//!
//! A [`Connection`] wraps one accepted, non-blocking socket. It is created by
//! the event loop at accept time, handed to the scheduler, and from then on
//! owned by exactly one request thread until it is closed. Closing shuts the
//! socket down, drops its buffers and frees its slot; dropping it releases the
//! file descriptor, which also removes it from the poll set.
//!
//! The socket is registered edge-triggered for both directions, so handlers
//! must read until [`ReadOutcome::would_block`] and flush until the socket
//! refuses more before suspending. A read that stops at its byte limit
//! ([`ReadOutcome::limited`]) has not seen would-block: the handler has to
//! come back on its own (yield) rather than wait for another edge.

use std::{
    cell::Cell,
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr},
    rc::Rc,
};

use bytes::{Buf, Bytes, BytesMut};
use mio::{Token, net::TcpStream};
use tidewire_core::{Channel, ThreadId};

/// Counter of open connections with a fixed ceiling.
///
/// Acquiring returns a [`SlotGuard`]; the slot frees itself when the guard is
/// dropped, so a connection can never leak its slot.
#[derive(Debug, Clone)]
pub struct ConnectionSlots {
    live: Rc<Cell<usize>>,
    max: usize,
}

impl ConnectionSlots {
    /// Slots for at most `max` connections.
    pub fn new(max: usize) -> Self {
        Self { live: Rc::new(Cell::new(0)), max }
    }

    /// Take a slot, or `None` at capacity.
    pub fn try_acquire(&self) -> Option<SlotGuard> {
        let live = self.live.get();
        if live >= self.max {
            return None;
        }
        self.live.set(live + 1);
        Some(SlotGuard { live: Rc::clone(&self.live) })
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.live.get()
    }

    /// Ceiling.
    pub fn max(&self) -> usize {
        self.max
    }
}

/// One held connection slot.
#[derive(Debug)]
pub struct SlotGuard {
    live: Rc<Cell<usize>>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let live = self.live.get();
        debug_assert!(live > 0);
        self.live.set(live.saturating_sub(1));
    }
}

/// Result of draining the socket into the inbound buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadOutcome {
    /// Bytes appended by this call
    pub read: usize,
    /// Peer closed its write side
    pub eof: bool,
    /// Stopped at the buffer limit; the socket may hold more
    pub limited: bool,
}

impl ReadOutcome {
    /// True if the socket ran dry without EOF.
    pub fn would_block(self) -> bool {
        !self.eof && !self.limited
    }
}

/// Connection open/closed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket usable
    Open,
    /// Closed locally; no further I/O
    Closed,
}

/// One accepted socket and its buffers.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    token: Token,
    thread: Option<ThreadId>,
    inbound: BytesMut,
    outbound: BytesMut,
    read_chunk: usize,
    state: ConnectionState,
    slot: Option<SlotGuard>,
}

impl Connection {
    /// Wrap an accepted stream that is already registered under `token`.
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        token: Token,
        slot: SlotGuard,
        read_chunk: usize,
    ) -> Self {
        Self {
            stream,
            peer,
            token,
            thread: None,
            inbound: BytesMut::with_capacity(read_chunk),
            outbound: BytesMut::new(),
            read_chunk,
            state: ConnectionState::Open,
            slot: Some(slot),
        }
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Poll token the socket is registered under.
    pub fn token(&self) -> Token {
        self.token
    }

    /// Open or closed.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Read from the socket until the inbound buffer holds `limit` bytes.
    ///
    /// Also stops at would-block or EOF. The buffer never grows past
    /// `limit`. Bytes read before an error stay buffered.
    pub fn fill_inbound(&mut self, limit: usize) -> io::Result<ReadOutcome> {
        self.ensure_open()?;

        let mut outcome = ReadOutcome::default();
        loop {
            let start = self.inbound.len();
            let room = limit.saturating_sub(start);
            if room == 0 {
                outcome.limited = true;
                return Ok(outcome);
            }
            self.inbound.resize(start + room.min(self.read_chunk), 0);

            match self.stream.read(&mut self.inbound[start..]) {
                Ok(0) => {
                    self.inbound.truncate(start);
                    outcome.eof = true;
                    return Ok(outcome);
                },
                Ok(n) => {
                    self.inbound.truncate(start + n);
                    outcome.read += n;
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.inbound.truncate(start);
                    return Ok(outcome);
                },
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    self.inbound.truncate(start);
                },
                Err(e) => {
                    self.inbound.truncate(start);
                    return Err(e);
                },
            }
        }
    }

    /// Buffered inbound bytes not yet consumed.
    pub fn inbound(&self) -> &[u8] {
        &self.inbound
    }

    /// Drop the first `n` buffered inbound bytes.
    pub fn consume_inbound(&mut self, n: usize) {
        debug_assert!(n <= self.inbound.len());
        self.inbound.advance(n.min(self.inbound.len()));
    }

    /// Take the first `n` buffered inbound bytes.
    pub fn take_inbound(&mut self, n: usize) -> Bytes {
        self.inbound.split_to(n.min(self.inbound.len())).freeze()
    }

    /// Append bytes to send on the next flush.
    pub fn queue_outbound(&mut self, bytes: &[u8]) {
        self.outbound.extend_from_slice(bytes);
    }

    /// True while queued output remains unsent.
    pub fn has_pending_output(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Write as much queued output as the socket takes.
    ///
    /// Returns `true` once everything is sent, `false` if the socket would
    /// block first.
    pub fn flush_outbound(&mut self) -> io::Result<bool> {
        self.ensure_open()?;

        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.outbound.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    fn ensure_open(&self) -> io::Result<()> {
        match self.state {
            ConnectionState::Open => Ok(()),
            ConnectionState::Closed => Err(io::ErrorKind::NotConnected.into()),
        }
    }
}

impl Channel for Connection {
    fn attach(&mut self, thread: ThreadId) {
        debug_assert!(self.thread.is_none(), "connection attached twice");
        self.thread = Some(thread);
    }

    fn thread(&self) -> Option<ThreadId> {
        self.thread
    }

    fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;

        // NotConnected is expected if the peer already reset us
        if let Err(e) = self.stream.shutdown(Shutdown::Both)
            && e.kind() != io::ErrorKind::NotConnected
        {
            tracing::debug!(peer = %self.peer, error = %e, "Shutdown failed");
        }
        self.inbound = BytesMut::new();
        self.outbound = BytesMut::new();
        self.slot = None;

        tracing::debug!(peer = %self.peer, thread = ?self.thread, "Connection closed");
    }

    fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }
}
