//! The pool's ready queue: a multi-producer multi-consumer FIFO of
//! dispatchable instances, plus a null sentinel used to tell a worker to
//! exit.
//!
//! Built directly on `crossbeam-channel`'s MPMC channel, which is itself
//! lock-free on the fast path; this file only adds the sentinel-entry
//! vocabulary the pool needs on top of it.
use std::sync::Arc;

use crossbeam_channel::{Receiver, RecvError, Sender};

use crate::instance::Instance;

/// One entry in the ready queue: either an instance that is ready to be
/// resumed, or the sentinel that tells the popping worker to exit.
pub enum ReadyEntry {
    Work(Arc<Instance>),
    Exit,
}

/// A multi-producer multi-consumer FIFO of [`ReadyEntry`] values.
///
/// `push` never blocks. `pop` blocks until an entry is available. Ordering
/// is FIFO per producer; across producers only program-order-after-push
/// is guaranteed, which is all the pool's worker loop needs.
pub struct ReadyQueue {
    tx: Sender<ReadyEntry>,
    rx: Receiver<ReadyEntry>,
}

impl ReadyQueue {
    /// Creates a new, empty, unbounded ready queue.
    pub fn new() -> ReadyQueue {
        let (tx, rx) = crossbeam_channel::unbounded();
        ReadyQueue { tx, rx }
    }

    /// Pushes an instance handle onto the queue. Never blocks.
    pub fn push(&self, instance: Arc<Instance>) {
        // the channel is unbounded and only closes when every sender and
        // receiver is dropped, which cannot happen while `self` is alive.
        let _ = self.tx.send(ReadyEntry::Work(instance));
    }

    /// Pushes the exit sentinel onto the queue. The next worker to pop it
    /// will terminate.
    pub fn push_exit_sentinel(&self) {
        let _ = self.tx.send(ReadyEntry::Exit);
    }

    /// Blocks until an entry is available and returns it.
    pub fn pop(&self) -> Result<ReadyEntry, RecvError> {
        self.rx.recv()
    }

    /// Returns a cheap handle that can push into this queue from another
    /// thread without holding a reference to the pool.
    pub fn sender(&self) -> ReadyQueueSender {
        ReadyQueueSender {
            tx: self.tx.clone(),
        }
    }
}

impl Default for ReadyQueue {
    fn default() -> ReadyQueue {
        ReadyQueue::new()
    }
}

/// A cloneable producer handle for a [`ReadyQueue`].
#[derive(Clone)]
pub struct ReadyQueueSender {
    tx: Sender<ReadyEntry>,
}

impl ReadyQueueSender {
    pub fn push(&self, instance: Arc<Instance>) {
        let _ = self.tx.send(ReadyEntry::Work(instance));
    }
}
