//! Server error types.

use std::{fmt, io, net::SocketAddr};

use nix::errno::Errno;
use tidewire_core::SchedulerError;

use crate::{config::ConfigError, event_loop::LoopState};

/// Errors that can occur in the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (bad address, zero limits).
    ///
    /// Fatal at startup. Fix configuration and restart.
    Config(ConfigError),

    /// Could not bind or listen on the configured address.
    ///
    /// Fatal at startup (address in use, permission denied).
    Bind {
        /// Address we tried to bind
        addr: SocketAddr,
        /// OS error
        source: io::Error,
    },

    /// Could not set up the SIGHUP watcher.
    Signal(Errno),

    /// Poll or registration failure.
    ///
    /// The readiness primitive itself failed, so the loop cannot continue.
    Io(io::Error),

    /// The bottom half failed.
    ///
    /// A request thread reported an error it could not handle. The loop drains
    /// and stops; there is no isolation between threads sharing one native
    /// thread.
    Scheduler(SchedulerError),

    /// Operation not valid in the loop's current state.
    ///
    /// Calling `run_once` after the loop stopped, for example. Indicates a bug
    /// in the caller.
    InvalidState {
        /// State when the call was made
        state: LoopState,
        /// Operation that was attempted
        operation: &'static str,
    },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration error: {err}"),
            Self::Bind { addr, source } => write!(f, "failed to listen on {addr}: {source}"),
            Self::Signal(errno) => write!(f, "failed to watch SIGHUP: {errno}"),
            Self::Io(err) => write!(f, "event loop I/O error: {err}"),
            Self::Scheduler(err) => write!(f, "bottom half failed: {err}"),
            Self::InvalidState { state, operation } => {
                write!(f, "invalid state: cannot {operation} while {state:?}")
            },
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Bind { source, .. } => Some(source),
            Self::Signal(errno) => Some(errno),
            Self::Io(err) => Some(err),
            Self::Scheduler(err) => Some(err),
            Self::InvalidState { .. } => None,
        }
    }
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<io::Error> for ServerError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<Errno> for ServerError {
    fn from(errno: Errno) -> Self {
        Self::Signal(errno)
    }
}

impl From<SchedulerError> for ServerError {
    fn from(err: SchedulerError) -> Self {
        Self::Scheduler(err)
    }
}
