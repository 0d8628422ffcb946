//! A process: a template for a group of instances that all run the same
//! entry function and share one input channel.
//!
//! A process starts out unwrapped (no entry function installed yet) and
//! unassociated (no pool attached yet). `wrap` installs the program;
//! `setpool` attaches a pool; only once both have happened can `spawn`
//! create instances. This mirrors the teacher crate's own two-phase
//! `Builder` / `spawn` split, generalized from "build an OS command line"
//! to "build an instance template".
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use crate::channel::Channel;
use crate::codec::EnvBlob;
use crate::context::{ClosureContext, EntryFn, ErrorHandlerFn};
use crate::error::ProcessError;
use crate::failure::Failure;
use crate::instance::{Instance, InstanceState};
use crate::pool::Pool;
use crate::queue::ReadyQueueSender;
use crate::registry::Registry;

static REGISTRY: OnceLock<Registry<Process>> = OnceLock::new();

fn registry() -> &'static Registry<Process> {
    REGISTRY.get_or_init(Registry::new)
}

struct Program {
    entry: EntryFn,
    error_handler: Option<ErrorHandlerFn>,
}

/// A template for a family of instances: the program they run, the
/// channel they share, and the pool they are scheduled on.
pub struct Process {
    program: Mutex<Option<Program>>,
    env: Mutex<Option<EnvBlob>>,
    input: Mutex<Arc<Channel>>,
    instances: Mutex<Vec<Arc<Instance>>>,
    pool: Mutex<Option<Arc<Pool>>>,
    parent: Option<Weak<Process>>,
}

impl Process {
    /// Creates a new, unwrapped, unassociated process with no parent.
    pub fn new() -> Arc<Process> {
        Process::with_parent(None)
    }

    /// Creates a new process, recording `parent` as its creator via a weak
    /// link (spec §9: the parent is never kept alive by its children).
    pub fn with_parent(parent: Option<&Arc<Process>>) -> Arc<Process> {
        let process = Arc::new(Process {
            program: Mutex::new(None),
            env: Mutex::new(None),
            input: Mutex::new(Arc::new(Channel::unbounded())),
            instances: Mutex::new(Vec::new()),
            pool: Mutex::new(None),
            parent: parent.map(Arc::downgrade),
        });
        process
    }

    /// Convenience constructor for tests and standalone use: a process
    /// with no parent and no pool.
    pub fn new_empty() -> Arc<Process> {
        Process::new()
    }

    /// Returns the process whose instance is currently executing on this
    /// worker thread, if any. `None` from outside any instance's entry
    /// function.
    pub fn current() -> Option<Arc<Process>> {
        crate::instance::current_process()
    }

    /// Creates, wraps, binds to the default pool, and spawns `n`
    /// instances in one call, mirroring the external interface's
    /// combined `process.new(env_fn, err_fn, n)`. The new process's
    /// parent is whichever process is [`Process::current`] at the time
    /// of the call.
    pub fn spawn_new(
        entry: EntryFn,
        error_handler: Option<ErrorHandlerFn>,
        n: usize,
    ) -> Result<Arc<Process>, ProcessError> {
        let parent = Process::current();
        let process = Process::with_parent(parent.as_ref());
        process.wrap(entry, error_handler)?;
        process.setpool(Some(crate::pool::default_pool()));
        process.spawn(n)?;
        Ok(process)
    }

    /// Looks a process up by the address returned from an earlier
    /// [`Process::ptr`] call.
    pub fn get(address: usize) -> Option<Arc<Process>> {
        registry().get(address)
    }

    /// Removes `process` from the identity registry, if it was ever
    /// registered there. Fails if the process still has live instances:
    /// destruction is rejected rather than silently orphaning them (spec
    /// §9 mandates one of the two; this crate picks rejection since a
    /// caller can always `remove` first).
    pub fn destroy(process: &Arc<Process>) -> Result<(), ProcessError> {
        if process.size() > 0 {
            return Err(ProcessError::invalid_argument(
                "process still has live instances",
            ));
        }
        registry().remove(Arc::as_ptr(process) as usize);
        Ok(())
    }

    /// Sends `message` to this process's shared input channel. The
    /// conceptual "call a process like a function" surface from the
    /// external interface has no stable equivalent in Rust (there is no
    /// way to overload call syntax on an arbitrary struct outside
    /// closures), so it is spelled out as an ordinary method instead.
    pub fn send(&self, message: crate::context::Message) -> Result<(), ProcessError> {
        self.input().push(message)
    }

    /// Returns a stable identity for this process, registering it so that
    /// [`Process::get`] can find it again while it is alive.
    pub fn ptr(self: &Arc<Self>) -> usize {
        registry().insert(self)
    }

    /// Installs the entry function and optional error handler. Fails if
    /// the process has already been wrapped.
    pub fn wrap(
        &self,
        entry: EntryFn,
        error_handler: Option<ErrorHandlerFn>,
    ) -> Result<(), ProcessError> {
        let mut program = self.program.lock();
        if program.is_some() {
            return Err(ProcessError::already_wrapped());
        }
        *program = Some(Program {
            entry,
            error_handler,
        });
        Ok(())
    }

    /// Returns `true` once [`Process::wrap`] has succeeded.
    pub fn is_wrapped(&self) -> bool {
        self.program.lock().is_some()
    }

    /// Creates `n` new instances running this process's entry function.
    ///
    /// Fails with [`ProcessError::is_not_wrapped`] if `wrap` has not been
    /// called, or [`ProcessError::is_not_associated`] if no pool is
    /// attached yet.
    pub fn spawn(self: &Arc<Self>, n: usize) -> Result<usize, ProcessError> {
        let entry = {
            let program = self.program.lock();
            match program.as_ref() {
                Some(program) => program.entry.clone(),
                None => return Err(ProcessError::not_wrapped()),
            }
        };
        if self.pool.lock().is_none() {
            return Err(ProcessError::not_associated());
        }
        let mut instances = self.instances.lock();
        for _ in 0..n {
            let context = Box::new(ClosureContext::with_entry(entry.clone()));
            let instance = Instance::new(self.clone(), context);
            instances.push(instance);
        }
        Ok(instances.len())
    }

    /// Tears down up to `n` of this process's instances, most recently
    /// spawned first, and returns how many were actually removed. `n` is
    /// clamped to the number of live instances: removing more than exist
    /// is not an error.
    ///
    /// Removal marks an instance DEAD immediately; if it is currently
    /// running a step on a worker thread, that step still completes
    /// first. Unlike [`Pool::kill`], this decrements `size`.
    pub fn remove(&self, n: usize) -> usize {
        let drained = {
            let mut instances = self.instances.lock();
            if n > instances.len() {
                log::warn!(
                    "remove({}) clamped to {} live instances",
                    n,
                    instances.len()
                );
            }
            let n = n.min(instances.len());
            let at = instances.len() - n;
            instances.split_off(at)
        };
        for instance in &drained {
            instance.mark_dead();
        }
        drained.len()
    }

    /// Removes `instance` from this process's live instance vec, if it is
    /// still there. Called by [`Instance::mark_dead`] so that natural
    /// termination (the entry function returning or erroring) decrements
    /// `size()` exactly as `remove` does, instead of only an explicit
    /// `remove` call doing so.
    pub(crate) fn reap(&self, instance: &Arc<Instance>) {
        let mut instances = self.instances.lock();
        if let Some(pos) = instances.iter().position(|i| Arc::ptr_eq(i, instance)) {
            instances.remove(pos);
        }
    }

    /// Number of instances this process currently holds (including any
    /// that have finished running but have not yet been `remove`d).
    pub fn size(&self) -> usize {
        self.instances.lock().len()
    }

    /// Returns this process's shared input channel.
    pub fn input(&self) -> Arc<Channel> {
        self.input.lock().clone()
    }

    /// Replaces the input channel. Any instance parked on the old channel
    /// stays parked on it forever; moving waiters across channels safely
    /// is the caller's responsibility.
    pub fn setinput(&self, channel: Arc<Channel>) {
        let old = self.input.lock();
        if old.waiting() > 0 {
            log::warn!(
                "setinput replacing a channel with {} parked waiter(s); they will never be redispatched",
                old.waiting()
            );
        }
        drop(old);
        *self.input.lock() = channel;
    }

    /// Returns the pool this process is currently associated with, if
    /// any.
    pub fn pool(&self) -> Option<Arc<Pool>> {
        self.pool.lock().clone()
    }

    /// Associates this process with `pool` (or detaches it, if `None`).
    /// Any instance that was READY but undispatched (because no pool was
    /// attached yet) is dispatched onto the new pool immediately.
    pub fn setpool(&self, pool: Option<Arc<Pool>>) {
        *self.pool.lock() = pool;
        let instances = self.instances.lock();
        let parked = instances
            .iter()
            .filter(|i| i.state() == InstanceState::Blocked)
            .count();
        if parked > 0 {
            log::warn!(
                "setpool called with {} instance(s) parked on the previous pool's ready queue",
                parked
            );
        }
        for instance in instances.iter() {
            if instance.state() == InstanceState::Ready {
                instance.dispatch();
            }
        }
    }

    /// Returns this process's parent, if it has one and the parent is
    /// still alive.
    pub fn parent(&self) -> Option<Arc<Process>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Returns the process's opaque configuration blob, if one was set via
    /// [`Process::setenv`] or `ProcessBuilder::env`.
    ///
    /// This is deliberately independent of the entry function installed by
    /// [`Process::wrap`]: this crate does not serialize closures (closure
    /// serialization is explicitly out of scope), so `entry`/`error_handler`
    /// are carried as native `Program` fields and never pass through an
    /// `EnvBlob`. `env()` returning `None` on a process that only went
    /// through `wrap` is correct, not a missing round trip — see DESIGN.md.
    pub fn env(&self) -> Option<EnvBlob> {
        self.env.lock().clone()
    }

    /// Sets the process's opaque configuration blob (see [`Process::env`]
    /// for why this is unrelated to the installed entry function).
    pub fn setenv(&self, env: EnvBlob) {
        *self.env.lock() = Some(env);
    }

    /// Invokes this process's error handler, if one was installed, with
    /// the failure that terminated one of its instances. Errors with no
    /// handler registered are simply dropped by the caller (the pool's
    /// worker loop logs them instead).
    pub(crate) fn run_error_handler(&self, failure: &Failure) -> bool {
        if let Some(program) = self.program.lock().as_ref() {
            if let Some(handler) = &program.error_handler {
                handler(failure);
                return true;
            }
        }
        false
    }

    pub(crate) fn ready_queue_sender(&self) -> Option<ReadyQueueSender> {
        self.pool.lock().as_ref().map(|pool| pool.ready_queue_sender())
    }
}

impl PartialEq for Process {
    fn eq(&self, other: &Process) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Process {}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("wrapped", &self.is_wrapped())
            .field("size", &self.size())
            .finish()
    }
}

impl std::fmt::Display for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "process<{:p}>(wrapped={}, size={})",
            self,
            self.is_wrapped(),
            self.size()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{message, StepDirective};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop_entry() -> EntryFn {
        Arc::new(|_msg| Ok(StepDirective::Continue))
    }

    #[test]
    fn spawn_before_wrap_is_not_wrapped() {
        let process = Process::new();
        process.setpool(Some(Pool::builder().size(1).build()));
        let err = process.spawn(1).unwrap_err();
        assert!(err.is_not_wrapped());
    }

    #[test]
    fn spawn_without_pool_is_not_associated() {
        let process = Process::new();
        process.wrap(noop_entry(), None).unwrap();
        let err = process.spawn(1).unwrap_err();
        assert!(err.is_not_associated());
    }

    #[test]
    fn double_wrap_is_already_wrapped() {
        let process = Process::new();
        process.wrap(noop_entry(), None).unwrap();
        let err = process.wrap(noop_entry(), None).unwrap_err();
        assert!(err.is_already_wrapped());
    }

    #[test]
    fn spawn_creates_requested_instance_count() {
        let pool = Pool::builder().size(2).build();
        let process = Process::new();
        process.wrap(noop_entry(), None).unwrap();
        process.setpool(Some(pool.clone()));
        let size = process.spawn(3).unwrap();
        assert_eq!(size, 3);
        assert_eq!(process.size(), 3);
        pool.kill();
    }

    #[test]
    fn remove_clamps_at_available_instances() {
        let pool = Pool::builder().size(1).build();
        let process = Process::new();
        process.wrap(noop_entry(), None).unwrap();
        process.setpool(Some(pool.clone()));
        process.spawn(2).unwrap();
        let removed = process.remove(10);
        assert_eq!(removed, 2);
        assert_eq!(process.size(), 0);
        pool.kill();
    }

    #[test]
    fn destroy_rejects_process_with_live_instances() {
        let pool = Pool::builder().size(1).build();
        let process = Process::new();
        process.wrap(noop_entry(), None).unwrap();
        process.setpool(Some(pool.clone()));
        process.spawn(1).unwrap();
        assert!(Process::destroy(&process).is_err());
        pool.kill();
    }

    #[test]
    fn destroy_succeeds_once_drained() {
        let process = Process::new();
        assert!(Process::destroy(&process).is_ok());
    }

    #[test]
    fn send_pushes_onto_input_channel() {
        let process = Process::new();
        process.send(message(1u32)).unwrap();
        assert_eq!(process.input().len(), 1);
    }

    #[test]
    fn ptr_round_trips_through_registry() {
        let process = Process::new();
        let address = process.ptr();
        let looked_up = Process::get(address).unwrap();
        assert!(Arc::ptr_eq(&process, &looked_up));
    }

    #[test]
    fn parent_link_survives_as_weak_reference() {
        let parent = Process::new();
        let child = Process::with_parent(Some(&parent));
        assert!(Arc::ptr_eq(&child.parent().unwrap(), &parent));
        drop(parent);
        assert!(child.parent().is_none());
    }

    #[test]
    fn spawn_new_discovers_current_process_as_parent() {
        let pool = Pool::builder().size(2).build();
        let (tx, rx) = crossbeam_channel::unbounded::<bool>();
        let outer = Process::new();
        let outer_for_entry = outer.clone();
        let entry: EntryFn = Arc::new(move |_msg| {
            let found_self_as_parent =
                Process::current().map_or(false, |p| Arc::ptr_eq(&p, &outer_for_entry));
            let inner = Process::spawn_new(
                Arc::new(|_msg| Ok(StepDirective::Stop)),
                None,
                1,
            )
            .unwrap();
            tx.send(found_self_as_parent && inner.parent().is_some())
                .unwrap();
            Ok(StepDirective::Stop)
        });
        outer.wrap(entry, None).unwrap();
        outer.setpool(Some(pool.clone()));
        outer.spawn(1).unwrap();
        outer.send(message(1u32)).unwrap();

        assert!(rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap());
        pool.kill();
    }

    #[test]
    fn error_handler_runs_on_failure() {
        let pool = Pool::builder().size(1).build();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        let process = Process::new();
        let entry: EntryFn = Arc::new(|_msg| Err(Failure::new("boom")));
        let handler: ErrorHandlerFn = Arc::new(move |_failure| {
            ran2.fetch_add(1, Ordering::SeqCst);
        });
        process.wrap(entry, Some(handler)).unwrap();
        process.setpool(Some(pool.clone()));
        process.spawn(1).unwrap();
        process.input().push(message(1u32)).unwrap();
        for _ in 0..100 {
            if ran.load(Ordering::SeqCst) > 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        // spec scenario 5: `p.size()` becomes 0 after drain — natural
        // termination must decrement `instances`, not just flip state.
        for _ in 0..100 {
            if process.size() == 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(process.size(), 0);
        pool.kill();
    }

    #[test]
    fn stop_directive_decrements_size_without_an_explicit_remove() {
        let pool = Pool::builder().size(1).build();
        let process = Process::new();
        process
            .wrap(Arc::new(|_msg| Ok(StepDirective::Stop)), None)
            .unwrap();
        process.setpool(Some(pool.clone()));
        process.spawn(1).unwrap();
        assert_eq!(process.size(), 1);
        process.send(message(1u32)).unwrap();

        for _ in 0..100 {
            if process.size() == 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(process.size(), 0);
        pool.kill();
    }
}
