//! Error types for the scheduler bridge.
//!
//! Two layers: [`TaskError`] is what a single request thread reports from one
//! step, [`SchedulerError`] is what the bridge reports to the event loop.
//! Connection-level task errors stay inside the executor (the thread is closed
//! and the loop keeps going); everything else escalates.

use std::io;

use thiserror::Error;
use tidewire_proto::WireError;

use crate::ThreadId;

/// Errors returned by a request handler step.
#[derive(Error, Debug)]
pub enum TaskError {
    /// Peer went away mid-request
    #[error("peer disconnected")]
    Disconnected,

    /// Socket-level failure on this thread's connection
    #[error("connection I/O error: {0}")]
    Io(#[from] io::Error),

    /// Codec failure while building a response
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Application logic failure
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TaskError {
    /// Returns true if this error only ends the thread's own connection.
    ///
    /// Disconnects and socket errors are routine for a server and never bring
    /// it down. Codec and application failures mean the handler itself is
    /// broken.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Io(_))
    }
}

/// Errors returned through the scheduler bridge.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// No live thread has this id
    #[error("{0} not found")]
    ThreadNotFound(ThreadId),

    /// The handler for a new connection could not be created
    #[error("failed to start thread: {0}")]
    StartFailed(#[source] TaskError),

    /// A thread failed during the bottom half
    #[error("{thread} failed: {source}")]
    ThreadFailed {
        /// Thread that failed
        thread: ThreadId,
        /// What it reported
        #[source]
        source: TaskError,
    },

    /// Thread limit reached
    #[error("thread capacity exhausted ({max} live threads)")]
    CapacityExhausted {
        /// Configured limit
        max: usize,
    },
}

impl SchedulerError {
    /// Returns true if the event loop must stop.
    ///
    /// Only a failed bottom half is fatal. Start failures and unknown ids are
    /// recovered by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ThreadFailed { .. })
    }
}
