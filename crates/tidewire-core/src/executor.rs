//! Single-threaded task executor.
//!
//! [`TaskScheduler`] implements the [`Scheduler`] bridge on top of
//! [`RequestHandler`] state machines. It owns every live thread together with
//! its connection and a FIFO ready queue.
//!
//! # Invariants
//!
//! - A thread id appears in the ready queue at most once, and only while the
//!   thread is in [`ThreadState::Ready`].
//! - A bottom half steps exactly the threads that were ready when it started.
//!   Threads made ready during the batch (yields) run in the next one.
//! - A thread's connection is closed before the thread is forgotten.

use std::collections::{HashMap, VecDeque};

use crate::{
    BottomHalf, Channel, HandlerFactory, RequestHandler, Scheduler, Suspend, ThreadId,
    error::{SchedulerError, TaskError},
    scheduler::Result,
};

/// Scheduling state of a live thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Queued for the next bottom half
    Ready,
    /// Waiting for `resume_thread`
    Suspended(Suspend),
}

struct Thread<C, H> {
    connection: C,
    handler: H,
    state: ThreadState,
}

/// Cooperative executor for request threads.
pub struct TaskScheduler<C, F>
where
    F: HandlerFactory<C>,
{
    factory: F,
    threads: HashMap<ThreadId, Thread<C, F::Handler>>,
    ready: VecDeque<ThreadId>,
    next_id: u64,
    max_threads: Option<usize>,
}

impl<C, F> TaskScheduler<C, F>
where
    C: Channel,
    F: HandlerFactory<C>,
{
    /// Create an executor with no thread limit.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            threads: HashMap::new(),
            ready: VecDeque::new(),
            next_id: 1,
            max_threads: None,
        }
    }

    /// Refuse new threads once `max` are live.
    #[must_use]
    pub fn with_max_threads(mut self, max: usize) -> Self {
        self.max_threads = Some(max);
        self
    }

    /// Number of live threads.
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// True if no threads are live.
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// State of a live thread, `None` once it is gone.
    pub fn state(&self, thread: ThreadId) -> Option<ThreadState> {
        self.threads.get(&thread).map(|t| t.state)
    }

    /// Connection owned by a live thread.
    pub fn connection(&self, thread: ThreadId) -> Option<&C> {
        self.threads.get(&thread).map(|t| &t.connection)
    }

    fn finish(&mut self, thread: ThreadId) {
        if let Some(mut t) = self.threads.remove(&thread) {
            t.connection.close();
        }
        self.ready.retain(|id| *id != thread);
    }

    fn step(&mut self, id: ThreadId) -> Option<std::result::Result<Suspend, TaskError>> {
        let thread = self.threads.get_mut(&id)?;
        debug_assert_eq!(thread.state, ThreadState::Ready);

        let outcome = thread.handler.step(&mut thread.connection);
        match &outcome {
            Ok(Suspend::Yield) => {
                thread.state = ThreadState::Ready;
                self.ready.push_back(id);
            },
            Ok(reason @ (Suspend::AwaitingInput | Suspend::AwaitingWritable)) => {
                thread.state = ThreadState::Suspended(*reason);
            },
            Ok(Suspend::Done) | Err(_) => {},
        }
        Some(outcome)
    }
}

impl<C, F> Scheduler<C> for TaskScheduler<C, F>
where
    C: Channel,
    F: HandlerFactory<C>,
{
    fn start_thread(&mut self, mut connection: C) -> Result<ThreadId> {
        if let Some(max) = self.max_threads
            && self.threads.len() >= max
        {
            connection.close();
            return Err(SchedulerError::CapacityExhausted { max });
        }

        let id = ThreadId::new(self.next_id);
        self.next_id += 1;

        let handler = match self.factory.create(id) {
            Ok(handler) => handler,
            Err(e) => {
                connection.close();
                return Err(SchedulerError::StartFailed(e));
            },
        };

        connection.attach(id);
        self.threads.insert(id, Thread { connection, handler, state: ThreadState::Ready });
        self.ready.push_back(id);

        tracing::debug!(thread = %id, live = self.threads.len(), "Thread started");
        Ok(id)
    }

    fn run_ready_threads(&mut self) -> Result<BottomHalf> {
        let mut batch: VecDeque<ThreadId> = self.ready.drain(..).collect();
        let mut report = BottomHalf::default();

        while let Some(id) = batch.pop_front() {
            let Some(outcome) = self.step(id) else {
                continue;
            };
            report.ran += 1;

            match outcome {
                Ok(Suspend::Done) => {
                    tracing::debug!(thread = %id, "Thread finished");
                    self.finish(id);
                    report.finished.push(id);
                },
                Ok(_) => {},
                Err(e) if e.is_connection_level() => {
                    tracing::debug!(thread = %id, error = %e, "Thread closed by connection error");
                    self.finish(id);
                    report.finished.push(id);
                },
                Err(e) => {
                    tracing::error!(thread = %id, error = %e, "Thread failed");
                    self.finish(id);

                    // Unprocessed threads stay ready for whoever drains us.
                    for pending in batch.into_iter().rev() {
                        self.ready.push_front(pending);
                    }
                    return Err(SchedulerError::ThreadFailed { thread: id, source: e });
                },
            }
        }

        debug_assert!(self.ready.iter().all(|id| self.state(*id) == Some(ThreadState::Ready)));
        Ok(report)
    }

    fn resume_thread(&mut self, thread: ThreadId) -> Result<()> {
        let entry = self.threads.get_mut(&thread).ok_or(SchedulerError::ThreadNotFound(thread))?;

        if let ThreadState::Suspended(_) = entry.state {
            entry.state = ThreadState::Ready;
            self.ready.push_back(thread);
        }
        Ok(())
    }

    fn has_ready_threads(&self) -> bool {
        !self.ready.is_empty()
    }

    fn close_all(&mut self) -> usize {
        let closed = self.threads.len();
        for (_, mut thread) in self.threads.drain() {
            thread.connection.close();
        }
        self.ready.clear();

        if closed > 0 {
            tracing::info!("Closed {} live threads", closed);
        }
        closed
    }
}
