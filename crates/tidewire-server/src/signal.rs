//! Shutdown triggers.
//!
//! Two ways to ask a running loop to drain:
//!
//! - SIGHUP. [`ShutdownSignal`] blocks it on the loop thread and reads it from
//!   a non-blocking signalfd registered in the poll set, so delivery is just
//!   another readiness event.
//! - [`ShutdownHandle::shutdown`] from any thread, through a `mio::Waker`.
//!
//! SIGHUP is blocked only for the calling thread. Bind the loop before
//! spawning other threads so they inherit the mask and the process-wide
//! signal is always routed to the signalfd. Dropping the watcher restores
//! the thread's previous mask, so it must be dropped on the thread that
//! created it.

use std::{io, os::fd::AsRawFd, sync::Arc};

use mio::{Interest, Registry, Token, Waker, unix::SourceFd};
use nix::sys::{
    signal::{SigSet, SigmaskHow, Signal},
    signalfd::{SfdFlags, SignalFd},
};

use crate::error::ServerError;

/// SIGHUP delivered through a signalfd.
pub struct ShutdownSignal {
    fd: SignalFd,
    watching: bool,
    unblock_on_drop: bool,
}

impl ShutdownSignal {
    /// Block SIGHUP on this thread and open a signalfd for it.
    pub fn new() -> Result<Self, ServerError> {
        let mask = hangup_mask();
        let fd = SignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC)?;
        let previous = mask.thread_swap_mask(SigmaskHow::SIG_BLOCK)?;

        Ok(Self { fd, watching: false, unblock_on_drop: !previous.contains(Signal::SIGHUP) })
    }

    /// Add the signalfd to the poll set.
    pub fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(&mut SourceFd(&self.fd.as_raw_fd()), token, Interest::READABLE)?;
        self.watching = true;
        Ok(())
    }

    /// Stop watching. Idempotent.
    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        if !self.watching {
            return Ok(());
        }
        self.watching = false;
        registry.deregister(&mut SourceFd(&self.fd.as_raw_fd()))
    }

    /// True while registered.
    pub fn is_watching(&self) -> bool {
        self.watching
    }

    /// Drain pending signals. Returns true if SIGHUP was among them.
    pub fn take_hangup(&mut self) -> Result<bool, ServerError> {
        let mut hangup = false;
        while let Some(info) = self.fd.read_signal()? {
            if info.ssi_signo == Signal::SIGHUP as u32 {
                hangup = true;
            }
        }
        Ok(hangup)
    }
}

impl Drop for ShutdownSignal {
    fn drop(&mut self) {
        if !self.unblock_on_drop {
            return;
        }

        // Consume anything pending so unblocking does not deliver it with the
        // default (terminating) action.
        if let Err(e) = self.take_hangup() {
            tracing::debug!("Failed to drain signal watcher: {}", e);
        }
        if let Err(e) = hangup_mask().thread_unblock() {
            tracing::warn!("Failed to restore SIGHUP mask: {}", e);
        }
    }
}

fn hangup_mask() -> SigSet {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGHUP);
    mask
}

/// Cross-thread request to drain the loop.
#[derive(Clone)]
pub struct ShutdownHandle {
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub(crate) fn new(registry: &Registry, token: Token) -> io::Result<Self> {
        Ok(Self { waker: Arc::new(Waker::new(registry, token)?) })
    }

    /// Ask the loop to drain at its next poll.
    pub fn shutdown(&self) -> io::Result<()> {
        self.waker.wake()
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle").finish_non_exhaustive()
    }
}
