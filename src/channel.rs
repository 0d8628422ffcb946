//! The message channel: a process's mailbox.
//!
//! Unlike a plain MPMC channel, a channel's consumers are not blocked OS
//! threads — they are parked instances. `push` therefore does not "wake a
//! receiver" in the OS-scheduler sense; it re-dispatches a parked
//! instance onto its pool's ready queue, where a worker will eventually
//! pick it up and pop the message it just pushed. Both the message queue
//! and the waiter list live behind the same lock so a push can never race
//! a park: an instance either sees the message already queued, or is
//! registered before the push that would have delivered it completes.
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::Message;
use crate::error::ProcessError;
use crate::instance::{Instance, InstanceState};

struct ChannelInner {
    messages: VecDeque<Message>,
    waiters: VecDeque<Arc<Instance>>,
}

/// A process's mailbox: an ordered queue of messages, optionally bounded.
pub struct Channel {
    inner: Mutex<ChannelInner>,
    capacity: Option<usize>,
}

impl Channel {
    /// Creates a channel with no capacity limit.
    pub fn unbounded() -> Channel {
        Channel {
            inner: Mutex::new(ChannelInner {
                messages: VecDeque::new(),
                waiters: VecDeque::new(),
            }),
            capacity: None,
        }
    }

    /// Creates a channel that rejects pushes once it holds `capacity`
    /// undelivered messages.
    pub fn bounded(capacity: usize) -> Channel {
        Channel {
            inner: Mutex::new(ChannelInner {
                messages: VecDeque::with_capacity(capacity),
                waiters: VecDeque::new(),
            }),
            capacity: Some(capacity),
        }
    }

    /// Appends `message` to the queue. If an instance is parked waiting
    /// for a message, it is re-dispatched onto its pool's ready queue so
    /// it can pick the message up.
    ///
    /// Fails if the channel is bounded and already at capacity; never
    /// blocks.
    pub fn push(&self, message: Message) -> Result<(), ProcessError> {
        let waiter = {
            let mut inner = self.inner.lock();
            if let Some(cap) = self.capacity {
                if inner.messages.len() >= cap {
                    return Err(ProcessError::invalid_argument(
                        "channel is at capacity",
                    ));
                }
            }
            inner.messages.push_back(message);
            inner.waiters.pop_front()
        };
        if let Some(waiter) = waiter {
            waiter.set_state(InstanceState::Ready);
            waiter.dispatch();
        }
        Ok(())
    }

    /// Pops the next message if one is queued. If none is available,
    /// registers `instance` as a waiter and returns `None` — the next
    /// `push` will re-dispatch it.
    pub(crate) fn try_recv_or_register(&self, instance: Arc<Instance>) -> Option<Message> {
        let mut inner = self.inner.lock();
        match inner.messages.pop_front() {
            Some(message) => Some(message),
            None => {
                inner.waiters.push_back(instance);
                None
            }
        }
    }

    /// Number of messages currently queued (not counting parked waiters).
    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    /// Returns `true` if no messages are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of instances currently parked on this channel.
    pub fn waiting(&self) -> usize {
        self.inner.lock().waiters.len()
    }
}

impl Default for Channel {
    fn default() -> Channel {
        Channel::unbounded()
    }
}
