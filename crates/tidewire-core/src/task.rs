//! Request thread state machine.
//!
//! A request thread is a [`RequestHandler`] plus the connection it owns. Each
//! time the executor runs the thread it calls [`RequestHandler::step`] once;
//! the handler does whatever work is possible without blocking and reports
//! where it stopped.
//!
//! ```text
//!            step() ──> AwaitingInput ─────┐
//!   Ready ──┤      ──> AwaitingWritable ───┼──> Suspended ──resume──> Ready
//!     ^     │      ──> Yield ──────────────┼──> Ready (next bottom half)
//!     │     └      ──> Done / Err ─────────┴──> Closed
//!     └──────────────────────────────────────────────────────┘
//! ```

use crate::{ThreadId, error::TaskError};

/// Where a handler stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspend {
    /// Needs more bytes from the peer
    AwaitingInput,
    /// Has buffered output the socket would not take
    AwaitingWritable,
    /// Has more work; run again next bottom half without waiting on I/O
    Yield,
    /// Finished; the connection can be closed
    Done,
}

impl Suspend {
    /// True if the thread waits for an I/O readiness event.
    pub fn waits_for_io(self) -> bool {
        matches!(self, Self::AwaitingInput | Self::AwaitingWritable)
    }
}

/// Per-connection application logic.
pub trait RequestHandler<C> {
    /// Advance as far as possible without blocking.
    fn step(&mut self, connection: &mut C) -> Result<Suspend, TaskError>;
}

impl<C, F> RequestHandler<C> for F
where
    F: FnMut(&mut C) -> Result<Suspend, TaskError>,
{
    fn step(&mut self, connection: &mut C) -> Result<Suspend, TaskError> {
        self(connection)
    }
}

/// Builds one handler per started thread.
pub trait HandlerFactory<C> {
    /// Handler type produced
    type Handler: RequestHandler<C>;

    /// Create the handler for `thread`.
    fn create(&mut self, thread: ThreadId) -> Result<Self::Handler, TaskError>;
}

impl<C, H, F> HandlerFactory<C> for F
where
    F: FnMut(ThreadId) -> Result<H, TaskError>,
    H: RequestHandler<C>,
{
    type Handler = H;

    fn create(&mut self, thread: ThreadId) -> Result<H, TaskError> {
        self(thread)
    }
}
