//! Tidewire server.
//!
//! A single-threaded TCP server built on `mio`. The [`EventLoop`] owns the
//! listening socket and the poll; every accepted socket becomes a
//! [`Connection`] handed to a [`tidewire_core::Scheduler`], which runs the
//! per-connection request threads once per loop iteration.
//!
//! # Components
//!
//! - [`EventLoop`]: accept/poll/bottom-half cycle and orderly shutdown
//! - [`Connection`]: one accepted socket with its buffers and slot
//! - [`ShutdownSignal`] / [`ShutdownHandle`]: SIGHUP and programmatic drain
//! - [`WireEcho`]: default request handler echoing decoded wire entries
//! - [`ServerConfig`]: bind address and limits
//!
//! # Example
//!
//! ```no_run
//! use tidewire_core::TaskScheduler;
//! use tidewire_server::{EventLoop, ServerConfig, WireEchoFactory};
//!
//! let scheduler = TaskScheduler::new(WireEchoFactory::new());
//! let mut server = EventLoop::bind(ServerConfig::listen_on("127.0.0.1", 8080), scheduler)?;
//! server.run()?;
//! # Ok::<(), tidewire_server::ServerError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod connection;
mod error;
mod event_loop;
mod handler;
mod signal;

pub use config::{
    ConfigError, DEFAULT_MAX_CONNECTIONS, DEFAULT_POLL_TIMEOUT, DEFAULT_READ_CHUNK,
    DEFAULT_SERVER_IP, DEFAULT_SERVER_PORT, ServerConfig,
};
pub use connection::{Connection, ConnectionSlots, ConnectionState, ReadOutcome, SlotGuard};
pub use error::ServerError;
pub use event_loop::{EventLoop, LoopState};
pub use handler::{DEFAULT_MAX_BUFFERED, WireEcho, WireEchoFactory};
pub use signal::{ShutdownHandle, ShutdownSignal};
