//! Executors
//!
//! Where callbacks, delayed work and disk I/O run.
//!
//! - [`TokioExecutor`] - tasks on a tokio runtime
//! - [`SerialQueue`] - one named worker thread, strict submission order
//! - [`ImmediateExecutor`] - inline on the caller's thread

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

/// A unit of work handed to an [`Executor`]
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run jobs now or after a delay
pub trait Executor: Send + Sync {
    /// Run `job` as soon as possible
    fn execute(&self, job: Job);

    /// Run `job` once `delay` has elapsed
    fn execute_after(&self, delay: Duration, job: Job);
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, job: Job) {
        (**self).execute(job)
    }

    fn execute_after(&self, delay: Duration, job: Job) {
        (**self).execute_after(delay, job)
    }
}

// =============================================================================
// Tokio
// =============================================================================

/// Runs jobs as tasks on a tokio runtime
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Wrap an explicit runtime handle
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on, if any
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, job: Job) {
        self.handle.spawn(async move { job() });
    }

    fn execute_after(&self, delay: Duration, job: Job) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            job()
        });
    }
}

// =============================================================================
// Serial Queue
// =============================================================================

enum Message {
    Run(Job),
    RunAt(Instant, Job),
}

struct Delayed {
    deadline: Instant,
    sequence: u64,
    job: Job,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    // Reversed: BinaryHeap is a max-heap and we want the earliest deadline on top
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// A dedicated worker thread running jobs one at a time, in submission order
///
/// Delayed jobs are kept in a deadline heap by the worker itself. The thread
/// exits once every clone of the queue has been dropped and all delayed jobs
/// have run.
#[derive(Clone)]
pub struct SerialQueue {
    name: Arc<str>,
    sender: Sender<Message>,
}

impl SerialQueue {
    /// Spawn the worker thread
    pub fn new(name: impl Into<String>) -> std::io::Result<Self> {
        let name: String = name.into();
        let (sender, receiver) = channel::unbounded();
        let worker_name = name.clone();
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(&worker_name, receiver))?;

        debug!(queue = %name, "Started serial queue");
        Ok(Self {
            name: name.into(),
            sender,
        })
    }

    /// Queue name, also used as the worker thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, message: Message) {
        if self.sender.send(message).is_err() {
            warn!(queue = %self.name, "Serial queue worker stopped, dropping job");
        }
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue").field("name", &self.name).finish()
    }
}

impl Executor for SerialQueue {
    fn execute(&self, job: Job) {
        self.submit(Message::Run(job));
    }

    fn execute_after(&self, delay: Duration, job: Job) {
        self.submit(Message::RunAt(Instant::now() + delay, job));
    }
}

fn run_job(queue: &str, job: Job) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        error!(queue = %queue, "Job panicked on serial queue");
    }
}

fn run_worker(queue: &str, receiver: Receiver<Message>) {
    let mut delayed: BinaryHeap<Delayed> = BinaryHeap::new();
    let mut sequence = 0u64;

    loop {
        let now = Instant::now();
        while delayed.peek().is_some_and(|next| next.deadline <= now) {
            if let Some(due) = delayed.pop() {
                run_job(queue, due.job);
            }
        }

        let message = match delayed.peek() {
            Some(next) => {
                let wait = next.deadline.saturating_duration_since(Instant::now());
                match receiver.recv_timeout(wait) {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match receiver.recv() {
                Ok(message) => message,
                Err(_) => break,
            },
        };

        match message {
            Message::Run(job) => run_job(queue, job),
            Message::RunAt(deadline, job) => {
                sequence += 1;
                delayed.push(Delayed {
                    deadline,
                    sequence,
                    job,
                });
            }
        }
    }

    // Every handle is gone; honour the remaining timers before exiting.
    while let Some(due) = delayed.pop() {
        thread::sleep(due.deadline.saturating_duration_since(Instant::now()));
        run_job(queue, due.job);
    }
    debug!(queue = %queue, "Serial queue stopped");
}

// =============================================================================
// Immediate
// =============================================================================

/// Runs jobs inline; delayed jobs run on a short-lived timer thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateExecutor;

impl Executor for ImmediateExecutor {
    fn execute(&self, job: Job) {
        job()
    }

    fn execute_after(&self, delay: Duration, job: Job) {
        thread::spawn(move || {
            thread::sleep(delay);
            job()
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
