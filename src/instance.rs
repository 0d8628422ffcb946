//! An instance: one lightweight executor multiplexed over a pool thread.
//!
//! An instance owns exactly one [`ExecutionContext`](crate::context::ExecutionContext)
//! and moves through the state machine CREATED -> READY -> RUNNING ->
//! BLOCKED -> DEAD, with RUNNING able to loop back to either READY or
//! BLOCKED after each message. An instance is never in more than one of
//! {ready queue, channel waiter list} at a time; the transitions below are
//! the only places either membership changes.
use std::cell::RefCell;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::context::{ExecutionContext, StepOutcome};
use crate::process::Process;

thread_local! {
    // The process whose instance is currently being resumed on this
    // worker thread, if any. Lets a nested `Process::spawn_new` discover
    // its creator without threading a parent handle through every entry
    // function by hand (spec §4.6: "install a registry slot pointing
    // back to the instance so nested `new` calls can discover the
    // parent").
    static CURRENT_PROCESS: RefCell<Option<Weak<Process>>> = RefCell::new(None);
}

pub(crate) fn current_process() -> Option<Arc<Process>> {
    CURRENT_PROCESS.with(|cell| cell.borrow().as_ref().and_then(Weak::upgrade))
}

/// Where an instance currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Constructed, not yet handed to a pool.
    Created,
    /// Sitting in a pool's ready queue, waiting for a worker.
    Ready,
    /// Currently being driven by a worker thread.
    Running,
    /// Parked on its process's input channel, waiting for a message.
    Blocked,
    /// Terminated; its context has been closed.
    Dead,
}

/// One lightweight executor.
pub struct Instance {
    process: Arc<Process>,
    context: Mutex<Box<dyn ExecutionContext>>,
    state: Mutex<InstanceState>,
}

impl Instance {
    /// Creates an instance bound to `process`, wrapping `context`.
    ///
    /// The new instance is immediately marked READY. If `process` already
    /// has a pool attached, the instance is also pushed onto that pool's
    /// ready queue; otherwise it waits in the READY state, unscheduled,
    /// until the process is later bound to a pool (see `Process::setpool`).
    pub fn new(process: Arc<Process>, context: Box<dyn ExecutionContext>) -> Arc<Instance> {
        let instance = Arc::new(Instance {
            process,
            context: Mutex::new(context),
            state: Mutex::new(InstanceState::Created),
        });
        instance.set_state(InstanceState::Ready);
        instance.dispatch();
        instance
    }

    /// Pushes `self` onto its process's pool's ready queue, if one is
    /// attached. No-op otherwise.
    pub(crate) fn dispatch(self: &Arc<Self>) {
        if let Some(sender) = self.process.ready_queue_sender() {
            log::trace!("instance dispatched onto ready queue");
            sender.push(self.clone());
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> InstanceState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: InstanceState) {
        *self.state.lock() = state;
        log::debug!("instance transitioned to {:?}", state);
    }

    /// Returns the process (task) this instance belongs to.
    pub fn process(&self) -> &Arc<Process> {
        &self.process
    }

    /// Runs one dispatch step. Must be called with the instance already
    /// RUNNING.
    ///
    /// Returns `None` if there was no pending message: the instance has
    /// been registered as a waiter on its process's input channel and is
    /// now BLOCKED (the caller must not touch it further). Returns
    /// `Some(outcome)` if a message was available and the context was
    /// resumed with it.
    pub(crate) fn try_step(self: &Arc<Self>) -> Option<StepOutcome> {
        let message = match self.process.input().try_recv_or_register(self.clone()) {
            Some(message) => message,
            None => {
                self.set_state(InstanceState::Blocked);
                return None;
            }
        };
        let previous = CURRENT_PROCESS
            .with(|cell| cell.replace(Some(Arc::downgrade(&self.process))));
        let outcome = self.context.lock().resume(message);
        CURRENT_PROCESS.with(|cell| *cell.borrow_mut() = previous);
        Some(outcome)
    }

    /// Marks the instance DEAD, closes its context, and removes it from
    /// its process's live instance count (spec §4.1 step 4: "mark DEAD,
    /// decrement `task.instances`, free context"). Idempotent only in the
    /// sense that closing an already-closed context is the context
    /// implementation's responsibility, not this method's; reaping an
    /// already-reaped instance (e.g. one `Process::remove` already took
    /// out of the vec) is a harmless no-op.
    pub(crate) fn mark_dead(self: &Arc<Self>) {
        self.set_state(InstanceState::Dead);
        self.context.lock().close();
        self.process.reap(self);
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{message, ClosureContext, StepDirective};
    use crate::failure::Failure;

    #[test]
    fn new_instance_without_pool_is_ready_but_undispatched() {
        let process = Process::new_empty();
        let instance = Instance::new(process, Box::new(ClosureContext::new()));
        assert_eq!(instance.state(), InstanceState::Ready);
    }

    #[test]
    fn try_step_with_no_message_parks_instance() {
        let process = Process::new_empty();
        let instance = Instance::new(process, Box::new(ClosureContext::new()));
        instance.set_state(InstanceState::Running);
        let outcome = instance.try_step();
        assert!(outcome.is_none());
        assert_eq!(instance.state(), InstanceState::Blocked);
    }

    #[test]
    fn try_step_with_message_resumes_context() {
        let process = Process::new_empty();
        let entry: crate::context::EntryFn =
            std::sync::Arc::new(|_msg| Ok(StepDirective::Continue));
        let instance = Instance::new(process, Box::new(ClosureContext::with_entry(entry)));
        instance.process().input().push(message(1u32)).unwrap();
        instance.set_state(InstanceState::Running);
        match instance.try_step() {
            Some(StepOutcome::Continue) => {}
            _ => panic!("expected Continue"),
        }
    }

    #[test]
    fn mark_dead_closes_context() {
        let process = Process::new_empty();
        let instance = Instance::new(process, Box::new(ClosureContext::new()));
        instance.mark_dead();
        assert_eq!(instance.state(), InstanceState::Dead);
    }

    #[test]
    fn failure_from_entry_is_reported_as_err() {
        let process = Process::new_empty();
        let entry: crate::context::EntryFn =
            std::sync::Arc::new(|_msg| Err(Failure::new("bad")));
        let instance = Instance::new(process, Box::new(ClosureContext::with_entry(entry)));
        instance.process().input().push(message(1u32)).unwrap();
        instance.set_state(InstanceState::Running);
        match instance.try_step() {
            Some(StepOutcome::Err(failure)) => assert_eq!(failure.message(), "bad"),
            _ => panic!("expected Err"),
        }
    }
}
