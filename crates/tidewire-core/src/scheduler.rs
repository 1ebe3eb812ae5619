//! The scheduler bridge.
//!
//! The event loop talks to whatever runs request threads only through
//! [`Scheduler`]. The concrete scheduler is handed to the loop at
//! construction; nothing is looked up at runtime.
//!
//! # Call order within one loop iteration
//!
//! ```text
//! poll ──> accept ──> start_thread(conn)      (once per accepted connection)
//!      └─> readiness ──> resume_thread(id)    (per ready connection)
//! run_ready_threads()                         (exactly once, after dispatch)
//! ```

use std::fmt;

use crate::error::SchedulerError;

/// Result alias for bridge operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Identifier of one lightweight request thread.
///
/// Ids are never reused within a scheduler's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl ThreadId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread-{}", self.0)
    }
}

/// Outcome of one bottom half.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BottomHalf {
    /// Threads stepped during this batch
    pub ran: usize,
    /// Threads that completed and released their connection
    pub finished: Vec<ThreadId>,
}

/// Hooks the event loop consumes.
///
/// `C` is the connection handle type handed over on accept.
pub trait Scheduler<C> {
    /// Spawn a thread bound to `connection`.
    ///
    /// Called once per accepted connection. The thread owns the connection
    /// from here on. It must not run before the next bottom half.
    fn start_thread(&mut self, connection: C) -> Result<ThreadId>;

    /// Run every thread that is ready right now, once.
    ///
    /// Called once per loop iteration after I/O dispatch. An error here is
    /// fatal to the loop.
    fn run_ready_threads(&mut self) -> Result<BottomHalf>;

    /// Mark a suspended thread ready, e.g. because its socket became
    /// readable or writable.
    fn resume_thread(&mut self, thread: ThreadId) -> Result<()>;

    /// True if the next bottom half has work.
    ///
    /// Lets the loop poll without blocking when threads are waiting to run.
    fn has_ready_threads(&self) -> bool;

    /// Close every live thread's connection and forget the thread.
    ///
    /// Returns how many threads were closed.
    fn close_all(&mut self) -> usize;
}

/// A connection handle a thread can own.
pub trait Channel {
    /// Record the owning thread.
    fn attach(&mut self, thread: ThreadId);

    /// Owning thread, once attached.
    fn thread(&self) -> Option<ThreadId>;

    /// Release the underlying resource. Idempotent.
    fn close(&mut self);

    /// True once closed.
    fn is_closed(&self) -> bool;
}
