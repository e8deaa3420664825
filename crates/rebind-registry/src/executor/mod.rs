//! Single-threaded execution contexts.
//!
//! A [`SerialQueue`] owns one named worker thread that drains jobs in FIFO
//! order. The registry installs components on its main queue; each client
//! owner delivers listener callbacks on its own queue so notifications for a
//! listener never overlap or reorder.

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::RendezvousError;

const EXECUTOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::executor");

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Named worker thread executing jobs one at a time.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use rebind_registry::SerialQueue;
///
/// let queue = SerialQueue::spawn("example").expect("spawn queue");
/// let answer = queue
///     .run_sync(|| 6 * 7, Duration::from_secs(1))
///     .expect("rendezvous");
/// assert_eq!(answer, 42);
/// queue.shutdown();
/// ```
pub struct SerialQueue {
    name: String,
    thread_id: ThreadId,
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SerialQueue {
    /// Starts a new queue on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::Spawn`] when the thread cannot be created.
    pub fn spawn(name: impl Into<String>) -> Result<Self, RendezvousError> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })
            .map_err(|source| RendezvousError::Spawn {
                queue: name.clone(),
                source: Arc::new(source),
            })?;
        debug!(target: EXECUTOR_TARGET, queue = %name, "execution context started");
        Ok(Self {
            thread_id: worker.thread().id(),
            name,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Returns the queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` when called from the queue's own thread.
    #[must_use]
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Enqueues `job` without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::Closed`] after [`SerialQueue::shutdown`].
    pub fn post<F>(&self, job: F) -> Result<(), RendezvousError>
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = lock(&self.sender);
        let Some(sender) = guard.as_ref() else {
            return Err(self.closed());
        };
        sender.send(Box::new(job)).map_err(|_| self.closed())
    }

    /// Runs `job` on the queue and waits up to `timeout` for its result.
    ///
    /// Runs inline when already on the queue's thread.
    ///
    /// # Errors
    ///
    /// Returns [`RendezvousError::Timeout`] when the job has not finished in
    /// time and [`RendezvousError::Closed`] when the queue has shut down.
    pub fn run_sync<T, F>(&self, job: F, timeout: Duration) -> Result<T, RendezvousError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.run_sync_or_dispose(job, drop, timeout)
    }

    /// Like [`SerialQueue::run_sync`], but hands a result that arrives after
    /// the waiter gave up to `dispose`.
    ///
    /// # Errors
    ///
    /// As for [`SerialQueue::run_sync`].
    pub fn run_sync_or_dispose<T, F, D>(
        &self,
        job: F,
        dispose: D,
        timeout: Duration,
    ) -> Result<T, RendezvousError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
        D: FnOnce(T) + Send + 'static,
    {
        if self.is_current() {
            return Ok(job());
        }
        let rendezvous = Arc::new(Rendezvous::new());
        let producer = Arc::clone(&rendezvous);
        self.post(move || {
            if let Some(late) = producer.complete(job()) {
                dispose(late);
            }
        })?;
        rendezvous.wait(timeout).ok_or_else(|| {
            warn!(
                target: EXECUTOR_TARGET,
                queue = %self.name,
                timeout_ms = timeout.as_millis(),
                "rendezvous timed out"
            );
            RendezvousError::Timeout {
                queue: self.name.clone(),
                timeout_ms: timeout.as_millis(),
            }
        })
    }

    /// Stops accepting work, drains queued jobs, and joins the worker.
    ///
    /// Called from the queue's own thread, the worker is detached instead of
    /// joined. Repeated calls do nothing.
    pub fn shutdown(&self) {
        drop(lock(&self.sender).take());
        let Some(worker) = lock(&self.worker).take() else {
            return;
        };
        if self.is_current() {
            return;
        }
        if worker.join().is_err() {
            warn!(target: EXECUTOR_TARGET, queue = %self.name, "worker panicked");
        }
        debug!(target: EXECUTOR_TARGET, queue = %self.name, "execution context stopped");
    }

    fn closed(&self) -> RendezvousError {
        RendezvousError::Closed {
            queue: self.name.clone(),
        }
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

enum Slot<T> {
    Pending,
    Ready(T),
    Abandoned,
}

/// One-shot hand-off between a waiting caller and a queued job.
struct Rendezvous<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Rendezvous<T> {
    const fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Pending),
            ready: Condvar::new(),
        }
    }

    /// Stores `value`, or returns it when the waiter has already given up.
    fn complete(&self, value: T) -> Option<T> {
        let mut slot = lock(&self.slot);
        if matches!(*slot, Slot::Abandoned) {
            return Some(value);
        }
        *slot = Slot::Ready(value);
        self.ready.notify_one();
        None
    }

    fn wait(&self, timeout: Duration) -> Option<T> {
        let guard = lock(&self.slot);
        let (mut slot, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |state| matches!(state, Slot::Pending))
            .unwrap_or_else(|poison| poison.into_inner());
        match std::mem::replace(&mut *slot, Slot::Abandoned) {
            Slot::Ready(value) => Some(value),
            Slot::Pending | Slot::Abandoned => None,
        }
    }
}

/// Execution context of one client owner.
///
/// Owners are compared by `id`; reusing an id with a different queue is a
/// usage error reported by the dispatcher directory.
#[derive(Debug, Clone)]
pub struct OwnerContext {
    id: String,
    queue: Arc<SerialQueue>,
}

impl OwnerContext {
    /// Creates an owner delivering callbacks on `queue`.
    #[must_use]
    pub fn new(id: impl Into<String>, queue: Arc<SerialQueue>) -> Self {
        Self {
            id: id.into(),
            queue,
        }
    }

    /// Returns the owner identity.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the owner's callback queue.
    #[must_use]
    pub const fn queue(&self) -> &Arc<SerialQueue> {
        &self.queue
    }

    /// Returns `true` when `other` delivers on the same queue.
    #[must_use]
    pub fn shares_queue(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.queue, &other.queue)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}
