//! Write serialization and shutdown coordination
//!
//! Disk writes run one at a time, in submission order, on a dedicated
//! worker thread. Asynchronous writes are also registered with a
//! [`ShutdownCoordinator`] so process teardown can wait for them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::editor::Completion;
use super::error::{Result, StoreError};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Flush(mpsc::Sender<()>),
}

/// A single thread draining a FIFO of jobs
pub(crate) struct SerialWorker {
    name: &'static str,
    tx: Option<mpsc::Sender<Message>>,
    worker: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl SerialWorker {
    pub(crate) fn spawn(name: &'static str) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Message>();

        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(message) = rx.recv() {
                    match message {
                        Message::Run(job) => job(),
                        Message::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
            })
            .map_err(|source| StoreError::Spawn { name, source })?;

        Ok(Self {
            name,
            thread_id: worker.thread().id(),
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// True when called from the worker thread itself
    pub(crate) fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Queues a job. If the worker is gone the job runs on the caller.
    pub(crate) fn submit(&self, job: Job) {
        let job = match &self.tx {
            Some(tx) => match tx.send(Message::Run(job)) {
                Ok(()) => return,
                Err(mpsc::SendError(Message::Run(job))) => job,
                Err(_) => return,
            },
            None => job,
        };

        warn!(worker = self.name, "worker stopped, running job inline");
        job();
    }

    /// Blocks until every job queued before this call has run
    pub(crate) fn flush(&self) {
        if self.is_current() {
            return;
        }
        let Some(tx) = &self.tx else {
            return;
        };

        let (done_tx, done_rx) = mpsc::channel();
        if tx.send(Message::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }
}

impl Drop for SerialWorker {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            // The last owner may be a job running on the worker itself
            if !self.is_current() {
                let _ = worker.join();
            }
        }
    }
}

/// Single-consumer FIFO for disk writes
pub struct WriteQueue {
    worker: SerialWorker,
}

impl WriteQueue {
    pub fn new() -> Result<Self> {
        Ok(Self {
            worker: SerialWorker::spawn("prefstore-writer")?,
        })
    }

    pub(crate) fn submit(&self, job: impl FnOnce() + Send + 'static) {
        self.worker.submit(Box::new(job));
    }

    /// Blocks until every write queued before this call has finished
    pub fn flush(&self) {
        self.worker.flush();
    }
}

/// Identifies one registered asynchronous write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingWriteId(u64);

impl PendingWriteId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// An asynchronous write that teardown may need to wait for
#[derive(Clone)]
pub struct PendingWrite {
    id: PendingWriteId,
    completion: Completion,
}

impl PendingWrite {
    pub(crate) fn new(completion: Completion) -> Self {
        Self {
            id: PendingWriteId::next(),
            completion,
        }
    }

    pub fn id(&self) -> PendingWriteId {
        self.id
    }

    /// Blocks until the write has finished
    pub fn wait(&self) {
        self.completion.wait();
    }

    pub fn is_done(&self) -> bool {
        self.completion.is_done()
    }
}

/// Process-wide tracker of outstanding asynchronous writes
pub trait ShutdownCoordinator: Send + Sync {
    fn register(&self, write: PendingWrite);
    fn complete(&self, id: PendingWriteId);
}

/// Default coordinator: remembers outstanding writes until they complete
#[derive(Default)]
pub struct PendingWrites {
    outstanding: Mutex<HashMap<PendingWriteId, PendingWrite>>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes registered but not yet completed
    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().len()
    }

    /// Blocks until every write registered so far has finished
    pub fn wait_all(&self) {
        let writes: Vec<PendingWrite> = self.outstanding.lock().values().cloned().collect();
        if !writes.is_empty() {
            debug!(count = writes.len(), "waiting for pending writes");
        }
        for write in writes {
            write.wait();
        }
    }
}

impl ShutdownCoordinator for PendingWrites {
    fn register(&self, write: PendingWrite) {
        self.outstanding.lock().insert(write.id(), write);
    }

    fn complete(&self, id: PendingWriteId) {
        self.outstanding.lock().remove(&id);
    }
}
