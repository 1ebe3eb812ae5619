//! Default request handler.
//!
//! [`WireEcho`] decodes every complete entry a peer sends and writes the same
//! entries back, re-encoded as one write queue. It exercises the whole path
//! (edge-triggered reads, streaming decode, bounded serialize, partial writes)
//! and is what the binary serves when no application is plugged in.

use tidewire_core::{HandlerFactory, RequestHandler, Suspend, TaskError, ThreadId};
use tidewire_proto::{WriteQueue, decode_all, serialize};

use crate::connection::Connection;

/// Default ceiling on buffered, not yet decodable input per connection.
pub const DEFAULT_MAX_BUFFERED: usize = 1024 * 1024;

/// Echoes decoded wire entries back to the peer.
#[derive(Debug)]
pub struct WireEcho {
    thread: ThreadId,
    max_buffered: usize,
    echoed: usize,
}

impl WireEcho {
    /// Handler for `thread` with the default input ceiling.
    pub fn new(thread: ThreadId) -> Self {
        Self { thread, max_buffered: DEFAULT_MAX_BUFFERED, echoed: 0 }
    }

    /// Entries echoed so far.
    pub fn echoed(&self) -> usize {
        self.echoed
    }
}

impl RequestHandler<Connection> for WireEcho {
    fn step(&mut self, conn: &mut Connection) -> Result<Suspend, TaskError> {
        if conn.has_pending_output() && !conn.flush_outbound()? {
            return Ok(Suspend::AwaitingWritable);
        }

        let outcome = conn.fill_inbound(self.max_buffered)?;

        let (consumed, entries) = match decode_all(conn.inbound()) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(thread = %self.thread, peer = %conn.peer(), error = %e, "Dropping peer");
                return Ok(Suspend::Done);
            },
        };

        if !entries.is_empty() {
            self.echoed += entries.len();
            let queue: WriteQueue = entries.into_iter().collect();
            let hint = queue.encoded_len();
            let reply = serialize(queue, hint)?;

            conn.consume_inbound(consumed);
            conn.queue_outbound(&reply);
        }

        // A full buffer with no complete entry can never make progress.
        if conn.inbound().len() >= self.max_buffered {
            tracing::warn!(
                thread = %self.thread,
                peer = %conn.peer(),
                buffered = conn.inbound().len(),
                "Dropping peer: incomplete entry exceeds input limit"
            );
            return Ok(Suspend::Done);
        }

        if !conn.flush_outbound()? {
            return Ok(Suspend::AwaitingWritable);
        }

        if outcome.eof {
            tracing::debug!(thread = %self.thread, echoed = self.echoed, "Peer finished");
            return Ok(Suspend::Done);
        }
        if outcome.limited {
            // Readiness edge already consumed; come back next tick for the rest.
            return Ok(Suspend::Yield);
        }
        Ok(Suspend::AwaitingInput)
    }
}

/// Builds a [`WireEcho`] per request thread.
#[derive(Debug, Clone)]
pub struct WireEchoFactory {
    max_buffered: usize,
}

impl WireEchoFactory {
    /// Factory with the default input ceiling.
    pub fn new() -> Self {
        Self { max_buffered: DEFAULT_MAX_BUFFERED }
    }

    /// Override the per-connection input ceiling.
    #[must_use]
    pub fn with_max_buffered(mut self, max_buffered: usize) -> Self {
        self.max_buffered = max_buffered;
        self
    }
}

impl Default for WireEchoFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerFactory<Connection> for WireEchoFactory {
    type Handler = WireEcho;

    fn create(&mut self, thread: ThreadId) -> Result<WireEcho, TaskError> {
        Ok(WireEcho { max_buffered: self.max_buffered, ..WireEcho::new(thread) })
    }
}
