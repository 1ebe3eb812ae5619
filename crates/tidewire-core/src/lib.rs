//! Tidewire scheduler bridge.
//!
//! The event loop never runs application code directly. It hands every
//! accepted connection to a [`Scheduler`] and, once per loop iteration, asks
//! it to run whatever is ready (the "bottom half"). This crate defines that
//! bridge and ships [`TaskScheduler`], a single-threaded executor that drives
//! per-connection [`RequestHandler`] state machines.
//!
//! Nothing here performs I/O. The connection type is a generic parameter
//! implementing [`Channel`], so the executor can be exercised with in-memory
//! mocks.
//!
//! # Concurrency
//!
//! Everything runs on one native thread. Request threads are cooperative: a
//! handler runs until it returns a [`Suspend`] and is never preempted. A
//! connection belongs to exactly one thread for its whole life, so there is no
//! locking.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod executor;
mod scheduler;
mod task;

pub use error::{SchedulerError, TaskError};
pub use executor::{TaskScheduler, ThreadState};
pub use scheduler::{BottomHalf, Channel, Result, Scheduler, ThreadId};
pub use task::{HandlerFactory, RequestHandler, Suspend};
